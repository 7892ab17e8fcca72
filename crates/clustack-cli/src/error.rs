//! CLI error types with exit code handling

use std::path::Path;

use clustack_engine::EngineError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Compilation failed; keeps the engine diagnostic as is
    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] EngineError),

    /// IO error (file not found, permissions, etc.)
    #[error("{action} {path}: {message}")]
    #[diagnostic(code(clustack::cli::io))]
    Io {
        action: &'static str,
        path: String,
        message: String,
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Compile(err) => match err {
                EngineError::Schema { .. }
                | EngineError::Conflict { .. }
                | EngineError::Topology { .. }
                | EngineError::Parse(_) => exit_codes::VALIDATION_ERROR,
                EngineError::Capacity { .. } => exit_codes::CAPACITY_ERROR,
                EngineError::Payload { .. } => exit_codes::PAYLOAD_ERROR,
                EngineError::Io(_) => exit_codes::IO_ERROR,
                EngineError::Reference { .. } | EngineError::Json(_) => exit_codes::ERROR,
            },
            CliError::Io { .. } => exit_codes::IO_ERROR,
        }
    }

    /// Short machine-readable category, used by `--json` output
    pub fn kind(&self) -> &'static str {
        match self {
            CliError::Compile(err) => match err {
                EngineError::Schema { .. } | EngineError::Parse(_) => "schema",
                EngineError::Conflict { .. } => "conflict",
                EngineError::Topology { .. } => "topology",
                EngineError::Capacity { .. } => "capacity",
                EngineError::Reference { .. } => "reference",
                EngineError::Payload { .. } => "payload",
                EngineError::Io(_) | EngineError::Json(_) => "io",
            },
            CliError::Io { .. } => "io",
        }
    }

    /// Path of the offending setting, when there is one
    pub fn path(&self) -> Option<&str> {
        match self {
            CliError::Compile(err) => err.path(),
            CliError::Io { .. } => None,
        }
    }

    pub fn io(action: &'static str, path: &Path, err: std::io::Error) -> Self {
        let help = match err.kind() {
            std::io::ErrorKind::NotFound if action == "Failed to read" => {
                Some("pass the cluster configuration with --config".to_string())
            }
            _ => None,
        };
        CliError::Io {
            action,
            path: path.display().to_string(),
            message: err.to_string(),
            help,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use clustack_core::CoreError;

    #[test]
    fn test_exit_codes_by_category() {
        let schema: CliError = EngineError::from(CoreError::schema("worker", "unknown key")).into();
        assert_eq!(schema.exit_code(), exit_codes::VALIDATION_ERROR);
        assert_eq!(schema.kind(), "schema");
        assert_eq!(schema.path(), Some("worker"));

        let capacity: CliError = EngineError::capacity("controller", "too many", 5, 4).into();
        assert_eq!(capacity.exit_code(), exit_codes::CAPACITY_ERROR);
        assert_eq!(capacity.kind(), "capacity");

        let payload: CliError = EngineError::payload("etcd.j2", "undefined value").into();
        assert_eq!(payload.exit_code(), exit_codes::PAYLOAD_ERROR);
    }

    #[test]
    fn test_missing_config_has_hint() {
        let err = CliError::io(
            "Failed to read",
            Path::new("cluster.yaml"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert_eq!(err.exit_code(), exit_codes::IO_ERROR);
        assert!(err.to_string().starts_with("Failed to read cluster.yaml"));
        assert!(matches!(err, CliError::Io { help: Some(_), .. }));
    }
}
