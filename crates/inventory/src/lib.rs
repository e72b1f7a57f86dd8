//! Inventory and assembly accounting.
//!
//! This crate holds the business rules for part and plane inventory: the
//! static catalogue, the materialised stock ledger, the assembly engine that
//! converts parts into planes, and the append-only logs that make the ledger
//! auditable. It performs no network or file IO.

pub mod audit;
pub mod catalog;
pub mod engine;
pub mod history;
pub mod ledger;
pub mod movement;

pub use audit::{AuditMismatch, AuditReport};
pub use catalog::{Catalog, PartType, PlaneType, Recipe, StockScope};
pub use engine::{
    AssemblyEngine, AssemblyReceipt, InventorySnapshot, PartStockView, PlaneStockView, Recovery,
    RecyclePolicy, Shortage,
};
pub use history::{
    Actor, AssemblyDraft, AssemblyRecord, ConsumedPart, LogError, HistoryFilter, HistoryLog,
    InMemoryHistoryLog,
};
pub use ledger::{InventoryLedger, LockedRows, PartStock, StockKey};
pub use movement::{
    DEFAULT_RECENT_MOVEMENTS, InMemoryMovementLog, MovementDraft, MovementLog, MovementReason, MovementTotals,
    MovementWindow, StockMovement,
};
