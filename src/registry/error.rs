//! Registry error types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Why a registry operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryErrorReason {
    /// The package or version does not exist.
    NotFound,
    /// The registry could not be reached.
    Network,
    /// The registry or the filesystem refused the operation.
    Permission,
    /// Anything else.
    Unknown,
}

impl RegistryErrorReason {
    /// Stable identifier used in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::Network => "network",
            Self::Permission => "permission",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RegistryErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed registry operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("registry error ({reason}): {message}")]
pub struct RegistryError {
    /// Classified reason.
    pub reason: RegistryErrorReason,
    /// Human-readable detail.
    pub message: String,
}

impl RegistryError {
    /// Create an error with the given reason.
    pub fn new(reason: RegistryErrorReason, message: impl Into<String>) -> Self {
        Self { reason, message: message.into() }
    }

    /// Package or version does not exist.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RegistryErrorReason::NotFound, message)
    }

    /// Registry unreachable.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RegistryErrorReason::Network, message)
    }

    /// Operation refused.
    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(RegistryErrorReason::Permission, message)
    }

    /// Unclassified failure.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(RegistryErrorReason::Unknown, message)
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            return Self::network(e.to_string());
        }
        match e.status().map(|s| s.as_u16()) {
            Some(404) => Self::not_found(e.to_string()),
            Some(401 | 403) => Self::permission(e.to_string()),
            _ => Self::unknown(e.to_string()),
        }
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => Self::permission(e.to_string()),
            std::io::ErrorKind::NotFound => Self::unknown(format!("installer not found: {e}")),
            _ => Self::unknown(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_display() {
        assert_eq!(RegistryErrorReason::NotFound.to_string(), "not-found");
        assert_eq!(RegistryErrorReason::Permission.as_str(), "permission");
    }

    #[test]
    fn test_error_display() {
        let err = RegistryError::network("connection refused");
        assert_eq!(err.to_string(), "registry error (network): connection refused");
    }

    #[test]
    fn test_io_error_classification() {
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(RegistryError::from(denied).reason, RegistryErrorReason::Permission);

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "npm");
        let err = RegistryError::from(missing);
        assert_eq!(err.reason, RegistryErrorReason::Unknown);
        assert!(err.message.contains("installer not found"));
    }
}
