use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::RwLock;

/// Source of the bearer credential attached to alert submissions.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// `None` when the user is signed out or the session was cleared.
    async fn bearer_token(&self) -> Option<SecretString>;
}

/// Runtime-only session credential. Never serialized.
#[derive(Default)]
pub struct SessionCredentials {
    jwt: RwLock<Option<SecretString>>,
}

impl SessionCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(token: impl Into<String>) -> Self {
        Self {
            jwt: RwLock::new(Some(SecretString::new(token.into()))),
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        if let Ok(mut jwt) = self.jwt.write() {
            *jwt = Some(SecretString::new(token.into()));
        }
    }

    /// Called after a 401 so the next attempt routes through sign-in.
    pub fn clear(&self) {
        if let Ok(mut jwt) = self.jwt.write() {
            *jwt = None;
        }
    }
}

#[async_trait]
impl CredentialSource for SessionCredentials {
    async fn bearer_token(&self) -> Option<SecretString> {
        self.jwt.read().ok().and_then(|jwt| jwt.clone())
    }
}
