//! Shared-secret authentication for device callers
//!
//! The recognizer authenticates with a static key sent in the `X-API-Key`
//! header. The key must match the configured value exactly. When no key is
//! configured every request is rejected.
//!
//! Only a SHA-256 digest of the configured key is kept in memory, and a short
//! hex fingerprint of it is what gets logged.

use sha2::{Digest, Sha256};

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "X-API-Key";

// ========================================
// Error Types
// ========================================

/// Authentication error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAuthError {
    /// Server has no key configured, so no caller can authenticate
    NotConfigured,

    /// Header absent
    MissingKey,

    /// Header present but does not match
    InvalidKey,
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::NotConfigured => write!(f, "No API key configured on server"),
            ApiAuthError::MissingKey => write!(f, "Missing {} header", API_KEY_HEADER),
            ApiAuthError::InvalidKey => write!(f, "Invalid API key"),
        }
    }
}

impl std::error::Error for ApiAuthError {}

// ========================================
// Key
// ========================================

/// Configured shared secret
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    digest: [u8; 32],
    fingerprint: String,
}

impl ApiKey {
    /// Build a key from its configured value
    ///
    /// Returns `None` for an empty value, which leaves authentication closed.
    ///
    /// # Examples
    ///
    /// ```
    /// use rollcall_common::api::ApiKey;
    ///
    /// assert!(ApiKey::new("").is_none());
    /// let key = ApiKey::new("s3cret").unwrap();
    /// assert!(key.matches("s3cret"));
    /// assert!(!key.matches("s3cret "));
    /// ```
    pub fn new(secret: &str) -> Option<Self> {
        if secret.is_empty() {
            return None;
        }

        let digest = sha256(secret);
        let fingerprint = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();
        Some(Self {
            digest,
            fingerprint,
        })
    }

    /// First 8 hex characters of the key's SHA-256, safe to log
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Exact comparison against a provided value
    ///
    /// Digests are compared so the comparison time does not depend on how
    /// many leading bytes of the secret the caller guessed.
    pub fn matches(&self, provided: &str) -> bool {
        sha256(provided) == self.digest
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

fn sha256(value: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().into()
}

// ========================================
// Validation
// ========================================

/// Validate a provided header value against the configured key
pub fn validate_api_key(
    configured: Option<&ApiKey>,
    provided: Option<&str>,
) -> Result<(), ApiAuthError> {
    let configured = configured.ok_or(ApiAuthError::NotConfigured)?;
    let provided = provided.ok_or(ApiAuthError::MissingKey)?;

    if configured.matches(provided) {
        Ok(())
    } else {
        Err(ApiAuthError::InvalidKey)
    }
}

// ========================================
// Tests
// ========================================
