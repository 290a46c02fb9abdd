use serde::Serialize;
use thiserror::Error;

/// Coarse error taxonomy surfaced to callers. Several `RelayError` variants
/// collapse onto one kind (a timeout is a channel failure, for instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    ValidationError,
    ResolutionError,
    RemoteError,
    ChannelError,
}

impl ErrorKind {
    /// True for kinds that are raised before anything is sent to the host.
    pub fn is_local(self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::ValidationError | Self::ResolutionError
        )
    }
}

/// Structured error type for the relay. Serialized as `{code, detail}` so HTTP
/// clients can switch on `code` without parsing the message.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "code", content = "detail")]
pub enum RelayError {
    #[error("{what} not found (known categories: {})", .known_categories.join(", "))]
    NotFound {
        what: String,
        known_categories: Vec<String>,
    },
    #[error("{message}")]
    Validation { message: String, fields: Vec<String> },
    #[error("{message}")]
    Resolution { message: String },
    #[error("Remote error ({kind}): {message}")]
    Remote { kind: String, message: String },
    #[error("Channel error: {message}")]
    Channel { message: String },
    #[error("Operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } | Self::Config { .. } => ErrorKind::ValidationError,
            Self::Resolution { .. } => ErrorKind::ResolutionError,
            Self::Remote { .. } => ErrorKind::RemoteError,
            Self::Channel { .. } | Self::Timeout { .. } => ErrorKind::ChannelError,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn invalid_fields(message: impl Into<String>, fields: Vec<String>) -> Self {
        Self::Validation {
            message: message.into(),
            fields,
        }
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution {
            message: message.into(),
        }
    }

    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        RelayError::Config {
            message: e.to_string(),
        }
    }
}

/// Allow converting RelayError to String for CLI output.
impl From<RelayError> for String {
    fn from(e: RelayError) -> String {
        e.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_channel_kind() {
        let err = RelayError::Timeout {
            operation: "create_cube".into(),
            timeout_ms: 1500,
        };
        assert_eq!(err.kind(), ErrorKind::ChannelError);
        assert!(!err.kind().is_local());
        assert_eq!(
            err.to_string(),
            "Operation 'create_cube' timed out after 1500ms"
        );
    }

    #[test]
    fn test_not_found_lists_categories() {
        let err = RelayError::NotFound {
            what: "Operation 'explode'".into(),
            known_categories: vec!["object".into(), "shape".into()],
        };
        assert!(err.kind().is_local());
        assert_eq!(
            err.to_string(),
            "Operation 'explode' not found (known categories: object, shape)"
        );
    }

    #[test]
    fn test_serializes_with_code_and_detail() {
        let err = RelayError::Remote {
            kind: "missing_object".into(),
            message: "No object with id 7".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "Remote");
        assert_eq!(json["detail"]["kind"], "missing_object");
        assert_eq!(json["detail"]["message"], "No object with id 7");
    }
}
