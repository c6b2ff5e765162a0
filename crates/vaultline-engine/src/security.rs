//! Security utilities for secret values
//!
//! Provides:
//! - SecretString with zeroize
//! - One-way fingerprints for change detection
//! - Error sanitization

use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secret value that is zeroed on drop and never printed
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString {
    inner: String,
}

impl SecretString {
    /// Wrap a secret value
    pub fn new(value: String) -> Self {
        Self { inner: value }
    }

    /// Expose the plaintext (use with caution)
    pub fn expose(&self) -> &str {
        &self.inner
    }

    /// Get length in bytes
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Content fingerprint of the value
    pub fn fingerprint(&self) -> String {
        fingerprint(self.expose())
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED {} bytes])", self.len())
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// SHA-256 hex digest of a secret value
///
/// This is the only form in which a value is ever persisted.
pub fn fingerprint(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

fn redaction_patterns() -> &'static [(regex::Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(regex::Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"(?i)(token|key|password|secret)([=:]\s*)[^\s,}]+", "$1$2[REDACTED]"),
            (r"(?i)bearer\s+[^\s,}]+", "Bearer [REDACTED]"),
            (r"gh[pousr]_[A-Za-z0-9]{20,}", "[REDACTED_TOKEN]"),
            (r"[A-Za-z0-9+/]{40,}={0,2}", "[REDACTED_BASE64]"),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| {
            regex::Regex::new(pattern).ok().map(|re| (re, replacement))
        })
        .collect()
    })
}

/// Sanitize error text so it can be stored or logged
///
/// Remote error bodies may echo request payloads; anything that looks like a
/// credential or ciphertext is replaced.
pub fn sanitize_error(error: &str) -> String {
    let mut sanitized = error.to_string();
    for (re, replacement) in redaction_patterns() {
        sanitized = re.replace_all(&sanitized, *replacement).into_owned();
    }
    sanitized
}
