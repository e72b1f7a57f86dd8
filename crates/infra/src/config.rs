//! Service configuration: TOML file, built-in default, environment overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use aeroforge_auth::DepartmentKind;
use aeroforge_core::{DepartmentId, DomainError, PartTypeId, PlaneTypeId};
use aeroforge_inventory::{LogError, PartType, RecyclePolicy};
use aeroforge_observability::LogConfig;

pub const CONFIG_PATH_ENV: &str = "AEROFORGE_CONFIG";
pub const BIND_ENV: &str = "AEROFORGE_BIND";
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";

pub const DEFAULT_CONFIG_PATH: &str = "config/aeroforge.toml";
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";
/// Movement log file name used next to `history_path` when `movements_path` is unset.
pub const DEFAULT_MOVEMENTS_FILE: &str = "stock-movements.jsonl";

const BUILTIN: &str = include_str!("../config/default.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("inventory log unavailable: {0}")]
    Log(#[from] LogError),
}

impl From<DomainError> for ConfigError {
    fn from(value: DomainError) -> Self {
        ConfigError::Invalid(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            token_ttl_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub recycle_policy: RecyclePolicy,
    /// JSON Lines file for assembly history; in-memory when unset.
    pub history_path: Option<PathBuf>,
    /// JSON Lines file for stock movements; defaults to a sibling of `history_path`.
    pub movements_path: Option<PathBuf>,
}

impl InventoryConfig {
    /// Durable log locations, or `None` for in-memory logs.
    ///
    /// Both logs are durable or neither is; a movement log without its
    /// assembly history could not be replayed.
    pub fn log_paths(&self) -> Result<Option<(PathBuf, PathBuf)>, ConfigError> {
        match (&self.history_path, &self.movements_path) {
            (None, None) => Ok(None),
            (None, Some(_)) => Err(ConfigError::Invalid(
                "inventory.movements_path requires inventory.history_path".to_string(),
            )),
            (Some(history), movements) => {
                let movements = movements
                    .clone()
                    .unwrap_or_else(|| history.with_file_name(DEFAULT_MOVEMENTS_FILE));
                if &movements == history {
                    return Err(ConfigError::Invalid(
                        "inventory.movements_path must differ from inventory.history_path".to_string(),
                    ));
                }
                Ok(Some((history.clone(), movements)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DepartmentConfig {
    pub id: DepartmentId,
    pub name: String,
    pub kind: DepartmentKind,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
pub struct RecipeLineConfig {
    pub part_id: PartTypeId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlaneConfig {
    pub id: PlaneTypeId,
    pub name: String,
    pub recipe: Vec<RecipeLineConfig>,
}

/// Opening balance for one ledger row.
///
/// `part_id` + `plane_id` targets per-plane part stock, `part_id` alone a
/// pooled part, `plane_id` alone the plane count.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
pub struct OpeningStockConfig {
    pub part_id: Option<PartTypeId>,
    pub plane_id: Option<PlaneTypeId>,
    pub quantity: u64,
}

/// A user provisioned at startup (development and demos).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub department: Option<DepartmentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub logging: LogConfig,
    pub departments: Vec<DepartmentConfig>,
    pub parts: Vec<PartType>,
    pub planes: Vec<PlaneConfig>,
    #[serde(default)]
    pub opening_stock: Vec<OpeningStockConfig>,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

impl AppConfig {
    /// Load from `$AEROFORGE_CONFIG` (or the default path), then apply env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let config = Self::load_from(Path::new(&path))?;
        Ok(config.with_env_overrides(|name| std::env::var(name).ok()))
    }

    /// Read `path`; fall back to the built-in catalogue when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                tracing::info!(path = %path.display(), "configuration loaded");
                Self::from_toml_str(&text, &path.display().to_string())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "configuration file absent, using built-in catalogue");
                Self::builtin()
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml_str(BUILTIN, "built-in configuration")
    }

    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })
    }

    /// Apply `JWT_SECRET` and `AEROFORGE_BIND` from `lookup`.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(secret) = lookup(JWT_SECRET_ENV).filter(|s| !s.is_empty()) {
            self.auth.jwt_secret = secret;
        }
        if let Some(bind) = lookup(BIND_ENV).filter(|s| !s.is_empty()) {
            self.server.bind = bind;
        }
        self
    }

    pub fn uses_default_secret(&self) -> bool {
        self.auth.jwt_secret == DEFAULT_JWT_SECRET
    }
}
