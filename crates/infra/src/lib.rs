//! Infrastructure for the inventory service: configuration, bootstrap and
//! durable log storage.

pub mod bootstrap;
pub mod config;
pub mod history_file;
mod jsonl;
pub mod movement_file;

pub use bootstrap::{ServiceContext, bootstrap};
pub use config::{AppConfig, ConfigError};
pub use history_file::JsonlHistoryLog;
pub use movement_file::JsonlMovementLog;
