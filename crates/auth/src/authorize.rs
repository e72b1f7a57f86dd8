use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use aeroforge_core::{DepartmentId, DomainError, PartTypeId, PlaneTypeId};

use crate::department::{DepartmentDirectory, DepartmentKind};
use crate::jwt::JwtValidator;
use crate::principal::{Caller, Credential};

/// What a request wants to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
    /// List of the caller's own part stock.
    PartInventory,
    /// Produce or recycle one part type.
    Part(PartTypeId),
    PlaneInventory,
    /// Assemble or recycle one plane type.
    Plane(PlaneTypeId),
    AssemblyHistory,
    /// Department list; open to any authenticated caller.
    Departments,
}

/// What the caller's department lets them touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DepartmentScope {
    Assembly,
    Parts {
        department: DepartmentId,
        part_types: BTreeSet<PartTypeId>,
    },
    /// Authenticated user without a (known) department.
    Unassigned,
}

impl DepartmentScope {
    pub fn department(&self) -> Option<DepartmentId> {
        match self {
            DepartmentScope::Parts { department, .. } => Some(*department),
            _ => None,
        }
    }
}

/// Proof that a caller passed the guard for a given resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub caller: Caller,
    pub scope: DepartmentScope,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Unauthorized(_) => DomainError::Unauthorized,
            AuthzError::Forbidden(msg) => DomainError::Forbidden(msg),
        }
    }
}

/// Pure policy check: may `scope` touch `resource`?
///
/// - No IO
/// - No panics
pub fn check_scope(scope: &DepartmentScope, resource: &ResourceScope) -> Result<(), AuthzError> {
    match (resource, scope) {
        (ResourceScope::Departments, _) => Ok(()),

        (_, DepartmentScope::Unassigned) => Err(AuthzError::Forbidden("user is not assigned to a department".to_string())),

        (ResourceScope::PartInventory, DepartmentScope::Parts { .. }) => Ok(()),
        (ResourceScope::PartInventory, DepartmentScope::Assembly) => Err(AuthzError::Forbidden(
            "the assembly team does not manage part inventory".to_string(),
        )),

        (ResourceScope::Part(part), DepartmentScope::Parts { part_types, .. }) => {
            if part_types.contains(part) {
                Ok(())
            } else {
                Err(AuthzError::Forbidden(format!("part {part} belongs to another department")))
            }
        }
        (ResourceScope::Part(part), DepartmentScope::Assembly) => Err(AuthzError::Forbidden(format!(
            "part {part} belongs to another department"
        ))),

        (ResourceScope::PlaneInventory | ResourceScope::Plane(_) | ResourceScope::AssemblyHistory, DepartmentScope::Assembly) => Ok(()),
        (ResourceScope::PlaneInventory | ResourceScope::Plane(_) | ResourceScope::AssemblyHistory, DepartmentScope::Parts { .. }) => {
            Err(AuthzError::Forbidden("only the assembly team can access planes".to_string()))
        }
    }
}

/// Boundary check run before any inventory operation.
pub trait AccessGuard: Send + Sync {
    fn authorize(&self, credential: &Credential, resource: &ResourceScope) -> Result<Grant, AuthzError>;
}

impl<G> AccessGuard for Arc<G>
where
    G: AccessGuard + ?Sized,
{
    fn authorize(&self, credential: &Credential, resource: &ResourceScope) -> Result<Grant, AuthzError> {
        (**self).authorize(credential, resource)
    }
}

/// Token + department based guard.
///
/// The department is taken from the token; its owned part types come from the
/// directory, so re-assigning parts does not require new tokens.
pub struct DepartmentAccessGuard {
    validator: Arc<dyn JwtValidator>,
    departments: Arc<DepartmentDirectory>,
}

impl DepartmentAccessGuard {
    pub fn new(validator: Arc<dyn JwtValidator>, departments: Arc<DepartmentDirectory>) -> Self {
        Self { validator, departments }
    }

    pub fn departments(&self) -> &DepartmentDirectory {
        &self.departments
    }

    fn scope_of(&self, department: Option<DepartmentId>) -> DepartmentScope {
        match department.and_then(|id| self.departments.get(id)) {
            Some(d) if d.kind == DepartmentKind::Assembly => DepartmentScope::Assembly,
            Some(d) => DepartmentScope::Parts {
                department: d.id,
                part_types: d.part_types.clone(),
            },
            None => DepartmentScope::Unassigned,
        }
    }
}

impl AccessGuard for DepartmentAccessGuard {
    fn authorize(&self, credential: &Credential, resource: &ResourceScope) -> Result<Grant, AuthzError> {
        let claims = self
            .validator
            .validate(credential.token(), Utc::now())
            .map_err(|e| AuthzError::Unauthorized(e.to_string()))?;

        let scope = self.scope_of(claims.department);
        if let Err(err) = check_scope(&scope, resource) {
            tracing::debug!(user = %claims.username, ?resource, error = %err, "access denied");
            return Err(err);
        }

        Ok(Grant {
            caller: Caller {
                user_id: claims.sub,
                username: claims.username,
                department: claims.department,
            },
            scope,
        })
    }
}
