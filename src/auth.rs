//! Bearer token sources
//!
//! Acquiring tokens (device code, client secret, managed identity) happens outside
//! this crate. The feed client only asks a [`TokenProvider`] for a token before
//! each request.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Environment variable read by [`StaticTokenProvider::from_env`]
pub const TOKEN_ENV: &str = "AUDITFEED_ACCESS_TOKEN";

/// Source of bearer tokens for a given scope
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a bearer token valid for `scope`
    async fn token(&self, scope: &str) -> Result<String>;
}

/// Provider that hands out one pre-acquired token for every scope
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Wrap an already acquired token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Read the token from [`TOKEN_ENV`]
    pub fn from_env() -> Result<Self> {
        match std::env::var(TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => Ok(Self::new(token.trim())),
            _ => Err(Error::Auth(format!("{TOKEN_ENV} is not set"))),
        }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self, _scope: &str) -> Result<String> {
        if self.token.is_empty() {
            return Err(Error::Auth("empty access token".to_string()));
        }
        Ok(self.token.clone())
    }
}
