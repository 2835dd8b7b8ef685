//! Kit loading and dispatch error types.

use thiserror::Error;

use crate::module::{ErrorCode, ErrorRecord, ResolutionError};

/// Result type for kit loading.
pub type LoadResult<T> = Result<T, LoadError>;

/// Errors that can occur while loading a kit or running one of its commands.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The kit factory returned an error or panicked.
    #[error("Kit '{name}' failed to initialize: {message}")]
    InitThrew { name: String, message: String },

    /// Neither a compiled factory nor a `kithost` manifest section exists.
    #[error("Module '{name}' does not provide a kit entry")]
    MissingEntry { name: String },

    /// The `kithost` manifest section is invalid.
    #[error("Invalid kit manifest for '{name}': {reason}")]
    Manifest { name: String, reason: String },

    /// Resolving the kit module failed.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// No kit is bound or configured.
    #[error("No kit selected; run `kithost kit use <name>` or pass --kit")]
    NoKit,

    /// The active kit has no such command.
    #[error("Kit '{kit}' has no command '{command}' (available: {available})")]
    UnknownCommand { kit: String, command: String, available: String },

    /// The command ran and failed.
    #[error("Command '{command}' failed: {cause:#}")]
    Command { command: String, cause: anyhow::Error },
}

impl LoadError {
    /// Classified code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InitThrew { .. } => ErrorCode::InitThrew,
            Self::MissingEntry { .. } | Self::Manifest { .. } => ErrorCode::MissingEntry,
            Self::Resolution(e) => e.code(),
            Self::NoKit => ErrorCode::NoKit,
            Self::UnknownCommand { .. } => ErrorCode::UnknownCommand,
            Self::Command { .. } => ErrorCode::CommandFailed,
        }
    }

    /// Module the error belongs to.
    pub fn module_name(&self) -> Option<&str> {
        match self {
            Self::InitThrew { name, .. }
            | Self::MissingEntry { name }
            | Self::Manifest { name, .. } => Some(name),
            Self::Resolution(e) => e.module_name(),
            Self::UnknownCommand { kit, .. } => Some(kit),
            Self::NoKit | Self::Command { .. } => None,
        }
    }

    /// Error record describing this failure.
    pub fn to_record(&self) -> ErrorRecord {
        if let Self::Resolution(e) = self {
            return e.to_record();
        }
        let record = ErrorRecord::new(self.code(), self.to_string());
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
    fn test_codes() {
        let err = LoadError::InitThrew { name: "@kithost/kit-x".into(), message: "boom".into() };
        assert_eq!(err.code(), ErrorCode::InitThrew);
        assert_eq!(err.module_name(), Some("@kithost/kit-x"));
        assert!(!err.to_record().retryable);

        let err = LoadError::from(ResolutionError::NotInstalled { name: "m".into() });
        assert_eq!(err.code(), ErrorCode::NotInstalled);
        assert_eq!(err.to_record().module_name.as_deref(), Some("m"));
    }

    #[test]
    fn test_command_error_shows_cause_chain() {
        let cause = anyhow::anyhow!("exit code 2").context("bin/dev failed");
        let err = LoadError::Command { command: "dev".into(), cause };
        assert_eq!(err.to_string(), "Command 'dev' failed: bin/dev failed: exit code 2");
        assert_eq!(err.code(), ErrorCode::CommandFailed);
    }
}
