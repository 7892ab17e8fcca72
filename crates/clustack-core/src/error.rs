//! Core error types
//!
//! Every failure the compiler can report is permanent: it describes a problem with the
//! input (or an internal invariant) and is surfaced before any document is serialized.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Unknown key, wrong type, missing field or malformed value
    #[error("{message}")]
    Schema {
        path: String,
        message: String,
        suggestion: Option<String>,
    },

    /// Two mutually exclusive settings were both given
    #[error("{path}: {message}")]
    Conflict { path: String, message: String },

    /// Unsatisfiable subnet, NAT gateway or etcd identity combination
    #[error("{path}: {message}")]
    TopologyConflict { path: String, message: String },

    /// A hard platform limit was exceeded
    #[error("{message}")]
    CapacityExceeded {
        path: String,
        message: String,
        actual: usize,
        limit: usize,
    },

    /// A cross-stack reference without a matching export, or the reverse
    #[error("reference integrity violated: {message}")]
    ReferenceIntegrity { message: String },

    #[error("Failed to parse cluster configuration: {0}")]
    YamlParse(String),

    #[error("Failed to decode cluster configuration: {0}")]
    JsonParse(String),

    #[error("Invalid embedded schema: {message}")]
    InvalidSchema { message: String },
}

impl CoreError {
    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn conflict(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn topology(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TopologyConflict {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn capacity(
        path: impl Into<String>,
        message: impl Into<String>,
        actual: usize,
        limit: usize,
    ) -> Self {
        Self::CapacityExceeded {
            path: path.into(),
            message: message.into(),
            actual,
            limit,
        }
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::ReferenceIntegrity {
            message: message.into(),
        }
    }

    /// Path of the offending setting, when the error has one
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Schema { path, .. }
            | Self::Conflict { path, .. }
            | Self::TopologyConflict { path, .. }
            | Self::CapacityExceeded { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlParse(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonParse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
