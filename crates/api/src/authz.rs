//! API-side access check.
//!
//! Every inventory operation authorizes its own resource scope before it
//! touches the engine; this module maps the guard's decision to an actor.

use aeroforge_auth::{AccessGuard, Credential, Grant, ResourceScope};
use aeroforge_core::{DomainError, DomainResult};
use aeroforge_inventory::Actor;

/// Run the guard for `scope`; failures become `Unauthorized` / `Forbidden`.
pub fn authorize(guard: &dyn AccessGuard, credential: &Credential, scope: ResourceScope) -> DomainResult<Grant> {
    guard.authorize(credential, &scope).map_err(DomainError::from)
}

/// Actor recorded in history and movements for a granted request.
pub fn actor_of(grant: &Grant) -> Actor {
    Actor::new(grant.caller.user_id, grant.caller.username.clone())
}
