use serde::{Deserialize, Serialize};

use aeroforge_core::{DepartmentId, UserId};

/// Caller-supplied credential (a bearer token).
///
/// Passed explicitly into every guarded operation; never stored.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Authenticated identity resolved from a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
    pub username: String,
    pub department: Option<DepartmentId>,
}
