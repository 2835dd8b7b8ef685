//! Resolution error types and error records.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{RegistryError, RegistryErrorReason};

/// Result type for module resolution.
pub type ResolutionResult<T> = Result<T, ResolutionError>;

/// Classified failure code shared by every stage of resolution and loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Registry has no such package or version.
    RegistryNotFound,
    /// Registry unreachable.
    RegistryNetwork,
    /// Registry or filesystem refused the operation.
    RegistryPermission,
    /// Unclassified registry failure.
    RegistryUnknown,
    /// Module name cannot map to a directory under the modules tree.
    InvalidName,
    /// Module is not installed locally.
    NotInstalled,
    /// Local installation exists but is unusable.
    CorruptLocal,
    /// Local version string is not a semantic version.
    VersionUnparsable,
    /// Kit initialization failed.
    InitThrew,
    /// Module has no loadable kit entry.
    MissingEntry,
    /// No kit is selected for the project.
    NoKit,
    /// The active kit does not provide the command.
    UnknownCommand,
    /// A kit command returned an error.
    CommandFailed,
    /// Host settings or config files are invalid.
    Config,
}

impl ErrorCode {
    /// Stable identifier printed in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegistryNotFound => "not-found",
            Self::RegistryNetwork => "network",
            Self::RegistryPermission => "permission",
            Self::RegistryUnknown => "unknown",
            Self::InvalidName => "invalid-name",
            Self::NotInstalled => "not-installed",
            Self::CorruptLocal => "corrupt-local",
            Self::VersionUnparsable => "version-unparsable",
            Self::InitThrew => "init-threw",
            Self::MissingEntry => "missing-entry",
            Self::NoKit => "no-kit",
            Self::UnknownCommand => "unknown-command",
            Self::CommandFailed => "command-failed",
            Self::Config => "config",
        }
    }

    /// Whether a failure with this code may succeed when attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RegistryNetwork
            | Self::RegistryUnknown
            | Self::NotInstalled
            | Self::CorruptLocal
            | Self::VersionUnparsable => true,
            Self::RegistryNotFound
            | Self::RegistryPermission
            | Self::InvalidName
            | Self::InitThrew
            | Self::MissingEntry
            | Self::NoKit
            | Self::UnknownCommand
            | Self::CommandFailed
            | Self::Config => false,
        }
    }
}

impl From<RegistryErrorReason> for ErrorCode {
    fn from(reason: RegistryErrorReason) -> Self {
        match reason {
            RegistryErrorReason::NotFound => Self::RegistryNotFound,
            RegistryErrorReason::Network => Self::RegistryNetwork,
            RegistryErrorReason::Permission => Self::RegistryPermission,
            RegistryErrorReason::Unknown => Self::RegistryUnknown,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure kept by the error recovery registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Classified code.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
    /// Module the failure belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
    /// Whether retrying may help.
    pub retryable: bool,
}

impl ErrorRecord {
    /// Record with the default retryability of `code`.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), module_name: None, retryable: code.is_retryable() }
    }

    /// Attach the module name.
    pub fn for_module(mut self, name: impl Into<String>) -> Self {
        self.module_name = Some(name.into());
        self
    }

    /// Whether two records describe the same failure.
    pub fn same_as(&self, other: &Self) -> bool {
        self.code == other.code && self.module_name == other.module_name
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module_name {
            Some(name) => write!(f, "error[{}] {}: {}", self.code, name, self.message),
            None => write!(f, "error[{}] {}", self.code, self.message),
        }
    }
}

/// Errors from module resolution.
#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    /// The name is not a valid package name.
    #[error("Invalid module name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Module is not installed and could not be installed.
    #[error("Module '{name}' is not installed")]
    NotInstalled { name: String },

    /// Local installation is unusable.
    #[error("Module '{name}' is corrupt: {reason}")]
    CorruptLocal { name: String, reason: String },

    /// Local version string is not semver.
    #[error("Module '{name}' has an unparsable version '{version}'")]
    VersionUnparsable { name: String, version: String },

    /// The registry does not know the module.
    #[error("Module '{name}' does not exist in the registry")]
    NotFound {
        name: String,
        /// Whether the no-found policy asked the caller to offer an install.
        offer_install: bool,
    },

    /// Installing failed and retrying was not allowed or did not help.
    #[error("Failed to install '{name}' after {attempts} attempt(s): {source}")]
    Registry {
        name: String,
        attempts: u32,
        #[source]
        source: RegistryError,
    },

    /// Searching the registry failed.
    #[error("Module search failed: {0}")]
    Search(#[source] RegistryError),
}

impl ResolutionError {
    /// Classified code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidName { .. } => ErrorCode::InvalidName,
            Self::NotInstalled { .. } => ErrorCode::NotInstalled,
            Self::CorruptLocal { .. } => ErrorCode::CorruptLocal,
            Self::VersionUnparsable { .. } => ErrorCode::VersionUnparsable,
            Self::NotFound { .. } => ErrorCode::RegistryNotFound,
            Self::Registry { source, .. } | Self::Search(source) => source.reason.into(),
        }
    }

    /// Module the error belongs to.
    pub fn module_name(&self) -> Option<&str> {
        match self {
            Self::InvalidName { name, .. }
            | Self::NotInstalled { name }
            | Self::CorruptLocal { name, .. }
            | Self::VersionUnparsable { name, .. }
            | Self::NotFound { name, .. }
            | Self::Registry { name, .. } => Some(name),
            Self::Search(_) => None,
        }
    }

    /// Error record describing this failure.
    pub fn to_record(&self) -> ErrorRecord {
        let message = match self {
            Self::Registry { source, .. } => source.message.clone(),
            other => other.to_string(),
        };
        let record = ErrorRecord::new(self.code(), message);
        match self.module_name() {
            Some(name) => record.for_module(name),
            None => record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_codes() {
        assert!(ErrorCode::RegistryNetwork.is_retryable());
        assert!(ErrorCode::CorruptLocal.is_retryable());
        assert!(!ErrorCode::RegistryPermission.is_retryable());
        assert!(!ErrorCode::RegistryNotFound.is_retryable());
        assert!(!ErrorCode::InitThrew.is_retryable());
        assert!(!ErrorCode::InvalidName.is_retryable());
        assert_eq!(ErrorCode::InvalidName.as_str(), "invalid-name");
    }

    #[test]
    fn test_record_display() {
        let record = ErrorRecord::new(ErrorCode::RegistryPermission, "EACCES")
            .for_module("@kithost/kit-react");
        assert_eq!(record.to_string(), "error[permission] @kithost/kit-react: EACCES");
        assert!(!record.retryable);
    }

    #[test]
    fn test_resolution_error_to_record() {
        let err = ResolutionError::Registry {
            name: "@kithost/kit-react".to_string(),
            attempts: 3,
            source: RegistryError::network("ETIMEDOUT"),
        };
        let record = err.to_record();

        assert_eq!(record.code, ErrorCode::RegistryNetwork);
        assert_eq!(record.module_name.as_deref(), Some("@kithost/kit-react"));
        assert_eq!(record.message, "ETIMEDOUT");
        assert!(record.retryable);
    }

    #[test]
    fn test_same_as_ignores_message() {
        let a = ErrorRecord::new(ErrorCode::CorruptLocal, "missing package.json").for_module("m");
        let b = ErrorRecord::new(ErrorCode::CorruptLocal, "bad json").for_module("m");
        let c = ErrorRecord::new(ErrorCode::CorruptLocal, "bad json").for_module("n");
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
    }
}
