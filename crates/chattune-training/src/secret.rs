//! Credential wrapper that keeps tokens out of logs and manifests.

use serde::{Serialize, Serializer};
use std::fmt;
use zeroize::Zeroize;

/// A string whose content is redacted in `Debug`, `Display` and `Serialize`.
///
/// The value is only reachable through [`SecretString::expose_secret`] and is
/// wiped from memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString {
    inner: String,
}

impl SecretString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { inner: secret.into() }
    }

    #[inline]
    pub fn expose_secret(&self) -> &str {
        &self.inner
    }
}

impl Drop for SecretString {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}
