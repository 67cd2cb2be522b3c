use std::fmt;

use crate::api::ApiError;

/// All errors that can occur in the panel core.
#[derive(Debug)]
pub enum PanelError {
    /// A durable state record could not be written or removed.
    Storage {
        record: &'static str,
        source: std::io::Error,
    },
    /// The tuning server rejected or never answered a request.
    Api(ApiError),
    /// Attempted to delete a preset that ships with the panel.
    BuiltinImmutable { id: String },
}

impl fmt::Display for PanelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage { record, source } => {
                write!(f, "failed to persist {record}: {source}")
            }
            Self::Api(e) => write!(f, "server request failed: {e}"),
            Self::BuiltinImmutable { id } => {
                write!(f, "preset {id} is built in and cannot be deleted")
            }
        }
    }
}

impl std::error::Error for PanelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage { source, .. } => Some(source),
            Self::Api(e) => Some(e),
            Self::BuiltinImmutable { .. } => None,
        }
    }
}

impl From<ApiError> for PanelError {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}
