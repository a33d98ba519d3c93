//! Unified error type for reelforge.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for API handlers to derive an HTTP status code via [`Error::http_status`].

use std::fmt;

/// Unified error type covering all failure modes in reelforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job", "upload").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The source artifact or the requested transformation is unusable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The operation is not legal for the entity's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The external transformation failed, timed out or produced nothing.
    #[error("Execution error: {0}")]
    Execution(String),

    /// A staging filesystem operation (copy, move, cleanup) failed.
    #[error("Resource error [{op}]: {source}")]
    Resource {
        /// The operation that failed (e.g. "stage source").
        op: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, ffprobe) could not be run.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::InvalidInput(_) => 400,
            Error::InvalidState(_) => 409,
            Error::Execution(_) => 502,
            Error::Resource { .. } => 500,
            Error::Io { .. } => 500,
            Error::Tool { .. } => 502,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    /// Convenience constructor for [`Error::Resource`].
    pub fn resource(op: impl Into<String>, source: std::io::Error) -> Self {
        Error::Resource {
            op: op.into(),
            source,
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("job", "abc-123");
        assert_eq!(err.to_string(), "job not found: abc-123");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn invalid_input_display() {
        let err = Error::invalid_input("source artifact is empty");
        assert_eq!(err.to_string(), "Invalid input: source artifact is empty");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn invalid_state_display() {
        let err = Error::InvalidState("job already succeeded".into());
        assert_eq!(err.to_string(), "Invalid state: job already succeeded");
        assert_eq!(err.http_status(), 409);
    }

    #[test]
    fn execution_display() {
        let err = Error::Execution("exit code 1".into());
        assert_eq!(err.to_string(), "Execution error: exit code 1");
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn resource_display() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = Error::resource("stage source", io);
        assert!(err.to_string().starts_with("Resource error [stage source]"));
        assert!(err.to_string().contains("read-only"));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn tool_display() {
        let err = Error::tool("ffmpeg", "failed to spawn");
        assert_eq!(err.to_string(), "Tool error [ffmpeg]: failed to spawn");
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn internal_display() {
        let err = Error::Internal("unexpected state".into());
        assert_eq!(err.to_string(), "Internal error: unexpected state");
        assert_eq!(err.http_status(), 500);
    }
}
