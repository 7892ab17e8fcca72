//! Engine error types with diagnostic formatting

use clustack_core::CoreError;
use miette::Diagnostic;
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error("{message}")]
    #[diagnostic(code(clustack::schema))]
    Schema {
        path: String,
        message: String,
        #[help]
        suggestion: Option<String>,
    },

    #[error("{path}: {message}")]
    #[diagnostic(
        code(clustack::conflict),
        help("remove one of the two settings; the deprecated form is named first")
    )]
    Conflict { path: String, message: String },

    #[error("{path}: {message}")]
    #[diagnostic(code(clustack::topology))]
    Topology { path: String, message: String },

    #[error("{message}")]
    #[diagnostic(
        code(clustack::capacity),
        help("the limit cannot be raised; reduce the value at the reported path")
    )]
    Capacity {
        path: String,
        message: String,
        actual: usize,
        limit: usize,
    },

    #[error("reference integrity violated: {message}")]
    #[diagnostic(
        code(clustack::reference),
        help("this is a bug in the stack assembler, please report it with your cluster.yaml")
    )]
    Reference { message: String },

    #[error("Failed to render {template} payload: {message}")]
    #[diagnostic(code(clustack::payload))]
    Payload { template: String, message: String },

    #[error("{0}")]
    #[diagnostic(code(clustack::parse))]
    Parse(String),

    #[error("IO error: {0}")]
    #[diagnostic(code(clustack::io))]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    #[diagnostic(code(clustack::json))]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn capacity(
        path: impl Into<String>,
        message: impl Into<String>,
        actual: usize,
        limit: usize,
    ) -> Self {
        Self::Capacity {
            path: path.into(),
            message: message.into(),
            actual,
            limit,
        }
    }

    pub fn payload(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Payload {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Path of the offending setting, when the error has one
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Schema { path, .. }
            | Self::Conflict { path, .. }
            | Self::Topology { path, .. }
            | Self::Capacity { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Schema {
                path,
                message,
                suggestion,
            } => Self::Schema {
                path,
                message,
                suggestion,
            },
            CoreError::Conflict { path, message } => Self::Conflict { path, message },
            CoreError::TopologyConflict { path, message } => Self::Topology { path, message },
            CoreError::CapacityExceeded {
                path,
                message,
                actual,
                limit,
            } => Self::Capacity {
                path,
                message,
                actual,
                limit,
            },
            CoreError::ReferenceIntegrity { message } => Self::Reference { message },
            other @ (CoreError::YamlParse(_)
            | CoreError::JsonParse(_)
            | CoreError::InvalidSchema { .. }) => Self::Parse(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
