//! Password credentials and the user directory.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use aeroforge_core::{DepartmentId, DomainError, DomainResult, UserId};

use crate::department::DepartmentDirectory;
use crate::jwt::JwtIssuer;

const SALT_LEN: usize = 16;

/// Salted SHA-256 digest of a password, both parts hex encoded.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash {
    salt: String,
    digest: String,
}

impl PasswordHash {
    pub fn new(password: &str) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::with_salt(password, &salt)
    }

    pub fn with_salt(password: &str, salt: &[u8]) -> Self {
        Self {
            salt: hex::encode(salt),
            digest: hex::encode(digest(salt, password)),
        }
    }

    pub fn verify(&self, password: &str) -> bool {
        let (Ok(salt), Ok(expected)) = (hex::decode(&self.salt), hex::decode(&self.digest)) else {
            return false;
        };
        constant_time_eq(&digest(&salt, password), &expected)
    }
}

impl core::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

fn digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub department: Option<DepartmentId>,
    pub password: PasswordHash,
}

/// Registration input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub department: Option<DepartmentId>,
}

/// In-process user store keyed by username.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: RwLock<HashMap<String, UserAccount>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, new_user: NewUser, departments: &DepartmentDirectory) -> DomainResult<UserAccount> {
        let username = new_user.username.trim();
        if username.is_empty() {
            return Err(DomainError::validation("username cannot be empty"));
        }
        if new_user.password.is_empty() {
            return Err(DomainError::validation("password cannot be empty"));
        }
        if let Some(department) = new_user.department {
            if departments.get(department).is_none() {
                return Err(DomainError::validation(format!("department {department} does not exist")));
            }
        }

        let mut users = self
            .users
            .write()
            .map_err(|_| DomainError::storage("user directory lock poisoned"))?;
        if users.contains_key(username) {
            return Err(DomainError::conflict(format!("username '{username}' is already taken")));
        }

        let account = UserAccount {
            id: UserId::new(),
            username: username.to_string(),
            email: new_user.email.trim().to_string(),
            department: new_user.department,
            password: PasswordHash::new(&new_user.password),
        };
        users.insert(account.username.clone(), account.clone());
        tracing::info!(user_id = %account.id, username = %account.username, "user registered");
        Ok(account)
    }

    pub fn get(&self, username: &str) -> DomainResult<Option<UserAccount>> {
        let users = self
            .users
            .read()
            .map_err(|_| DomainError::storage("user directory lock poisoned"))?;
        Ok(users.get(username).cloned())
    }

    pub fn len(&self) -> DomainResult<usize> {
        let users = self
            .users
            .read()
            .map_err(|_| DomainError::storage("user directory lock poisoned"))?;
        Ok(users.len())
    }

    pub fn is_empty(&self) -> DomainResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Check the password and issue an access token.
    ///
    /// Unknown users and wrong passwords are indistinguishable to the caller.
    pub fn login(&self, username: &str, password: &str, issuer: &JwtIssuer, now: DateTime<Utc>) -> DomainResult<String> {
        let Some(account) = self.get(username.trim())? else {
            tracing::warn!(username, "login rejected: unknown user");
            return Err(DomainError::Unauthorized);
        };
        if !account.password.verify(password) {
            tracing::warn!(username, "login rejected: bad password");
            return Err(DomainError::Unauthorized);
        }
        issuer.issue(account.id, &account.username, account.department, now)
    }
}
