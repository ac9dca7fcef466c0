use std::error::Error as StdError;
use std::fmt;
use std::io;

use thiserror::Error;

/// The operation a request was issued for; used to label timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Generating,
    Chatting,
    Embedding,
    Listing,
    Deleting,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Generating => "generating",
            Phase::Chatting => "chatting",
            Phase::Embedding => "embedding",
            Phase::Listing => "listing",
            Phase::Deleting => "deleting",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug)]
pub enum OllamaError {
    #[error("Request timed out while {phase}")]
    Timeout {
        phase: Phase,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Empty response body")]
    EmptyBody,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Missing setting: {0}")]
    MissingSetting(String),
}

impl OllamaError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, OllamaError::Timeout { .. })
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            OllamaError::Timeout { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Classify a transport error, turning socket timeouts into `Timeout`.
    pub(crate) fn from_transport(err: reqwest::Error, phase: Phase) -> Self {
        if err.is_timeout() {
            OllamaError::Timeout {
                phase,
                source: Box::new(err),
            }
        } else {
            OllamaError::Transport(err)
        }
    }

    /// Classify a body read failure, turning socket timeouts into `Timeout`.
    pub(crate) fn from_io(err: io::Error, phase: Phase) -> Self {
        if is_timeout_io(&err) {
            OllamaError::Timeout {
                phase,
                source: Box::new(err),
            }
        } else {
            OllamaError::Io(err)
        }
    }
}

pub type OllamaResult<T> = Result<T, OllamaError>;

fn is_timeout_io(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::TimedOut || err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    let mut source: Option<&(dyn StdError + 'static)> =
        err.get_ref().map(|inner| inner as &(dyn StdError + 'static));
    while let Some(inner) = source {
        if let Some(reqwest_err) = inner.downcast_ref::<reqwest::Error>() {
            if reqwest_err.is_timeout() {
                return true;
            }
        }
        if let Some(io_err) = inner.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = inner.source();
    }
    false
}

/// Failures raised by an agent while executing; absorbed by the turn controller.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("Agent execution failed: {0}")]
    ExecutionError(String),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_labels() {
        assert_eq!(Phase::Generating.to_string(), "generating");
        assert_eq!(Phase::Chatting.to_string(), "chatting");
        assert_eq!(Phase::Embedding.to_string(), "embedding");
        assert_eq!(Phase::Listing.to_string(), "listing");
        assert_eq!(Phase::Deleting.to_string(), "deleting");
    }

    #[test]
    fn test_io_timeout_classification() {
        let err = OllamaError::from_io(
            io::Error::new(io::ErrorKind::TimedOut, "read timed out"),
            Phase::Chatting,
        );
        assert!(err.is_timeout());
        assert_eq!(err.phase(), Some(Phase::Chatting));
        assert_eq!(err.to_string(), "Request timed out while chatting");
    }

    #[test]
    fn test_wrapped_timeout_classification() {
        let inner = io::Error::new(io::ErrorKind::TimedOut, "deadline");
        let err = OllamaError::from_io(io::Error::new(io::ErrorKind::Other, inner), Phase::Listing);
        assert_eq!(err.phase(), Some(Phase::Listing));
    }

    #[test]
    fn test_timeout_wording_alone_is_not_a_timeout() {
        let err = OllamaError::from_io(
            io::Error::new(io::ErrorKind::Other, "operation timed out"),
            Phase::Generating,
        );
        assert!(!err.is_timeout());
        assert!(matches!(err, OllamaError::Io(_)));
    }

    #[test]
    fn test_other_io_errors_stay_generic() {
        let err = OllamaError::from_io(
            io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"),
            Phase::Embedding,
        );
        assert!(!err.is_timeout());
        assert!(matches!(err, OllamaError::Io(_)));
    }

    #[test]
    fn test_request_failed_message() {
        let err = OllamaError::RequestFailed {
            status: 404,
            body: "model not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Request failed with status 404: model not found"
        );
    }
}
