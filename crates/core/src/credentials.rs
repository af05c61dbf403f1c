//! Credential lookup for authenticated downloads.
//!
//! The installers never own credential storage; they are handed a
//! [`CredentialResolver`] and ask it for an id. Passwords live in
//! [`secrecy::SecretString`], so debug output is redacted and exposure
//! is an explicit call.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::Result;

/// A resolved username/password pair.
#[derive(Clone)]
pub struct Credential {
    username: String,
    password: SecretString,
}

impl Credential {
    /// Create a credential.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// The username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Expose the password for immediate use (e.g. an auth header).
    /// Never log or persist the returned value.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Looks up credentials by an opaque id, optionally scoped to a host.
///
/// Returning `Ok(None)` means "this id is unknown"; callers treat a
/// configured-but-unknown id as a configuration error, which is a
/// different situation from having no id configured at all.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Look up a credential by id for the given host.
    async fn lookup(&self, id: &str, host: Option<&str>) -> Result<Option<Credential>>;
}

/// In-memory credential resolver keyed by id. Host scoping is ignored.
#[derive(Default)]
pub struct StaticCredentialResolver {
    credentials: HashMap<String, Credential>,
}

impl StaticCredentialResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a credential under an id, replacing any existing entry.
    #[must_use]
    pub fn with_credential(mut self, id: impl Into<String>, credential: Credential) -> Self {
        self.credentials.insert(id.into(), credential);
        self
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn lookup(&self, id: &str, _host: Option<&str>) -> Result<Option<Credential>> {
        Ok(self.credentials.get(id).cloned())
    }
}
