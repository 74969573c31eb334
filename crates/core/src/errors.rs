use std::path::PathBuf;

use thiserror::Error;

/// Failure while establishing a conversation with the reasoning service.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("no API key configured (set ANTHROPIC_API_KEY or CLAUDE_API_KEY)")]
    MissingCredentials,
    #[error("reasoning service unreachable: {0}")]
    Unreachable(String),
    #[error("handshake with reasoning service failed: {0}")]
    Handshake(String),
}

/// Failure while sending a query or consuming the streamed response.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("no active conversation")]
    NotConnected,
    #[error("failed to send query: {0}")]
    Request(String),
    #[error("response stream failed: {0}")]
    Stream(String),
    #[error("failed to interrupt the in-flight turn: {0}")]
    Interrupt(String),
}

/// Failure while persisting session ids, history, or run state.
///
/// Persistence errors are always non-fatal at the session level; callers
/// log them and keep the conversation alive.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("could not read `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not write `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("could not replace `{path}`: {source}")]
    Replace { path: PathBuf, source: std::io::Error },
    #[error("could not serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure while rendering a single response block. Isolated per block:
/// one bad block never aborts the rest of the batch.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("console sink failed: {0}")]
    Sink(#[from] std::io::Error),
}

/// Failure while loading the tabular dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("data file not found at {0}")]
    NotFound(PathBuf),
    #[error("could not read data file `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("malformed csv at line {line}: {message}")]
    Malformed { line: usize, message: String },
}

/// Top-level error for session operations, wrapping the closed set of
/// error kinds. Replaces blanket catch-alls: every failure mode the loop
/// survives is one of these.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl AgentError {
    /// Short operator-facing message. Full diagnostic detail goes to the
    /// log file only, keeping the interactive console clean.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Connect(_) => "Unable to connect to the reasoning service. See logs for details.",
            Self::Send(_) => {
                "Error during query or response. The session was reset; please retry."
            }
            Self::Persist(_) => "Failed to save session state. The conversation continues.",
            Self::Render(_) => "A response block could not be displayed. See logs for details.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AgentError, ConnectError, SendError};

    #[test]
    fn connect_error_has_user_safe_message() {
        let error = AgentError::from(ConnectError::MissingCredentials);
        assert_eq!(
            error.user_message(),
            "Unable to connect to the reasoning service. See logs for details."
        );
    }

    #[test]
    fn send_error_tells_operator_to_retry() {
        let error = AgentError::from(SendError::Stream("connection reset".to_owned()));
        assert!(error.user_message().contains("retry"));
    }
}
