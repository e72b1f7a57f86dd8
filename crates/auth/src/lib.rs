//! `aeroforge-auth`: access guard for the inventory service.
//!
//! Authentication (password credentials, JWT issue/validation) and
//! authorization (department scopes) live here, decoupled from HTTP and
//! storage.

pub mod authorize;
pub mod claims;
pub mod credentials;
pub mod department;
pub mod jwt;
pub mod principal;

pub use authorize::{
    AccessGuard, AuthzError, DepartmentAccessGuard, DepartmentScope, Grant, ResourceScope, check_scope,
};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use credentials::{NewUser, PasswordHash, UserAccount, UserDirectory};
pub use department::{Department, DepartmentDirectory, DepartmentKind};
pub use jwt::{Hs256JwtValidator, JwtIssuer, JwtValidator};
pub use principal::{Caller, Credential};
