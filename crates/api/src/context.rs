use aeroforge_auth::Credential;

/// Credential context for a request.
///
/// Inserted by the auth middleware; present for all protected routes. The
/// token is only checked when a handler asks the guard for a specific scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialContext {
    credential: Credential,
}

impl CredentialContext {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}
