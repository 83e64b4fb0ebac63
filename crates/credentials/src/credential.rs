use std::time::Duration;

use foundation::time::{TimeSpan, Timestamp};
use serde::{Deserialize, Serialize};

/// Short-lived bearer credential.
///
/// Credentials are immutable: a refresh produces a new value that supersedes the old one.
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    value: String,
    issued_at: Timestamp,
    expires_at: Timestamp,
}

impl Credential {
    pub fn new(value: impl Into<String>, issued_at: Timestamp, expires_at: Timestamp) -> Self {
        Self {
            value: value.into(),
            issued_at,
            expires_at,
        }
    }

    pub fn from_grant(grant: &TokenGrant, issued_at: Timestamp) -> Self {
        Self::new(
            grant.access_token.clone(),
            issued_at,
            issued_at.saturating_add(Duration::from_secs(grant.expires_in)),
        )
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn issued_at(&self) -> Timestamp {
        self.issued_at
    }

    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    pub fn lifetime(&self) -> TimeSpan {
        TimeSpan::new(self.issued_at, self.expires_at)
    }

    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }

    pub fn remaining(&self, now: Timestamp) -> Duration {
        self.lifetime().remaining(now)
    }

    /// True once the remaining lifetime has dropped below `margin` (or the credential expired).
    pub fn needs_refresh(&self, now: Timestamp, margin: Duration) -> bool {
        self.remaining(now) < margin
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Wire response of `POST /tokens/authorize`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    FetchFailed(String),
    FetchTimeout,
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialError::FetchFailed(msg) => write!(f, "credential fetch failed: {msg}"),
            CredentialError::FetchTimeout => write!(f, "credential fetch timed out"),
        }
    }
}

impl std::error::Error for CredentialError {}

/// Result of a successful [`crate::CredentialCache::get_credential`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialLease {
    Valid(Credential),
    /// The refresh failed and an expired credential is handed out so already-rendering
    /// overlays keep working. The next call fetches again.
    Degraded {
        credential: Credential,
        cause: CredentialError,
    },
}

impl CredentialLease {
    pub fn credential(&self) -> &Credential {
        match self {
            CredentialLease::Valid(c) => c,
            CredentialLease::Degraded { credential, .. } => credential,
        }
    }

    pub fn into_credential(self) -> Credential {
        match self {
            CredentialLease::Valid(c) => c,
            CredentialLease::Degraded { credential, .. } => credential,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, CredentialLease::Degraded { .. })
    }
}
