//! Credential collaborator for upstreams that use short-lived OAuth tokens.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::error::TranscodeError;

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// A bearer token as handed out by a [`CredentialSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    pub expiry: Option<SystemTime>,
    pub refresh_token: Option<String>,
}

impl AccessToken {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        match self.expiry {
            Some(expiry) => expiry <= now + EXPIRY_SKEW,
            None => false,
        }
    }
}

/// Credentials returned by a refresh, ready to be persisted by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: Option<SystemTime>,
}

/// Supplies upstream tokens. Implementations own storage and caching.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn get_token(&self) -> Result<AccessToken, TranscodeError>;

    async fn refresh(&self, refresh_token: &str) -> Result<StoredCredentials, TranscodeError>;
}

/// Get a usable token, refreshing only when the current one is expired.
///
/// # Errors
///
/// Returns [`TranscodeError::Auth`] when the token is expired and cannot be
/// refreshed, or whatever the source reports.
pub async fn fresh_token(source: &dyn CredentialSource) -> Result<String, TranscodeError> {
    let token = source.get_token().await?;
    if !token.is_expired() {
        return Ok(token.access_token);
    }
    let Some(refresh_token) = token.refresh_token.as_deref() else {
        return Err(TranscodeError::Auth(
            "access token expired and no refresh token is available".into(),
        ));
    };
    tracing::debug!("access token expired; refreshing");
    let stored = source.refresh(refresh_token).await?;
    if stored.access_token.trim().is_empty() {
        return Err(TranscodeError::Auth("refresh returned an empty access token".into()));
    }
    Ok(stored.access_token)
}

/// A fixed token that never expires.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    token: String,
}

impl StaticCredentials {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn get_token(&self) -> Result<AccessToken, TranscodeError> {
        Ok(AccessToken {
            access_token: self.token.clone(),
            expiry: None,
            refresh_token: None,
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<StoredCredentials, TranscodeError> {
        Err(TranscodeError::Auth("static credentials cannot be refreshed".into()))
    }
}
