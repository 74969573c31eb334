//! Session lifecycle state machine.
//!
//! A [`Session`] owns the connection to the reasoning service and the
//! persisted session identity. All transitions happen on the caller's
//! task; there is no background reconnect. Stream failures tear the
//! connection down so the next turn starts from a clean `Disconnected`
//! state instead of reusing a conversation in an unknown condition.

use std::io::Write;
use std::sync::Arc;

use tracing::{debug, info, warn};

use tabletalk_core::errors::{AgentError, SendError};

use crate::blocks::Message;
use crate::client::{ConnectOptions, Conversation, ReasoningClient};
use crate::render::Renderer;
use crate::session::SessionStore;

/// Connect attempts before giving up and entering `Faulted`.
const CONNECT_ATTEMPTS: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Interrupting,
    /// Connecting failed after retries. `connect` may be called again to
    /// retry from here.
    Faulted,
}

pub struct Session {
    client: Arc<dyn ReasoningClient>,
    store: SessionStore,
    state: ConnectionState,
    conversation: Option<Box<dyn Conversation>>,
    system_prompt: String,
    allowed_tools: Vec<String>,
    max_turns: u32,
}

impl Session {
    pub fn new(
        client: Arc<dyn ReasoningClient>,
        store: SessionStore,
        system_prompt: impl Into<String>,
        allowed_tools: Vec<String>,
        max_turns: u32,
    ) -> Self {
        Self {
            client,
            store,
            state: ConnectionState::Disconnected,
            conversation: None,
            system_prompt: system_prompt.into(),
            allowed_tools,
            max_turns,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Establishes a conversation, resuming the persisted session if one
    /// exists. A no-op when already connected.
    pub async fn connect(&mut self) -> Result<(), AgentError> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        let resume = self.store.resolve_resume_id();
        debug!(resume = resume.as_deref(), "connecting to reasoning service");

        let mut last_error = None;
        for attempt in 1..=CONNECT_ATTEMPTS {
            let options = ConnectOptions {
                system_prompt: self.system_prompt.clone(),
                allowed_tools: self.allowed_tools.clone(),
                resume: resume.clone(),
                max_turns: self.max_turns,
            };

            match self.client.connect(options).await {
                Ok(conversation) => {
                    self.conversation = Some(conversation);
                    self.state = ConnectionState::Connected;
                    return Ok(());
                }
                Err(error) => {
                    warn!(attempt, error = %error, "connect attempt failed");
                    last_error = Some(error);
                }
            }
        }

        self.state = ConnectionState::Faulted;
        Err(last_error.expect("at least one connect attempt ran").into())
    }

    /// Sends one query and renders the response stream to completion.
    /// A stream failure disconnects the session before returning the
    /// error, so the caller's next turn reconnects from scratch.
    pub async fn run_turn<W: Write>(
        &mut self,
        query: &str,
        renderer: &mut Renderer<W>,
    ) -> Result<(), AgentError> {
        self.connect().await?;

        let Self { conversation, store, .. } = self;
        let conversation = conversation.as_mut().ok_or(SendError::NotConnected)?;

        let result = drive_stream(conversation.as_mut(), store, renderer, query).await;
        if let Err(error) = result {
            warn!(error = %error, "turn failed; disconnecting session");
            self.disconnect().await;
            return Err(error.into());
        }
        Ok(())
    }

    /// Cooperatively cancels the in-flight turn. No-op while idle or
    /// disconnected.
    pub async fn interrupt(&mut self) -> Result<(), AgentError> {
        let Some(conversation) = self.conversation.as_mut() else {
            debug!("interrupt requested with no active conversation");
            return Ok(());
        };

        self.state = ConnectionState::Interrupting;
        let result = conversation.interrupt().await;
        self.state = ConnectionState::Connected;
        result.map_err(AgentError::from)
    }

    pub async fn disconnect(&mut self) {
        if let Some(mut conversation) = self.conversation.take() {
            conversation.close().await;
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Ends the current session, clears the persisted resume target, and
    /// reconnects fresh. Errors out before the caller announces the new
    /// session, never after.
    pub async fn reset(&mut self) -> Result<(), AgentError> {
        self.disconnect().await;
        self.store.archive_and_clear()?;
        self.connect().await?;
        info!("session reset; fresh session established");
        Ok(())
    }
}

async fn drive_stream<W: Write>(
    conversation: &mut dyn Conversation,
    store: &mut SessionStore,
    renderer: &mut Renderer<W>,
    query: &str,
) -> Result<(), SendError> {
    let mut rx = conversation.send_query(query).await?;

    while let Some(item) = rx.recv().await {
        let message = item?;

        if let Message::Init { session_id } = &message {
            // Persistence failures are logged, not fatal: the conversation
            // itself is healthy.
            if let Err(error) = store.record_new_session(session_id) {
                warn!(error = %error, "could not persist session id");
            }
        }

        let failed = renderer.render_message(&message);
        if failed > 0 {
            debug!(failed, "some blocks failed to render");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::ConnectionState;

    #[test]
    fn states_compare_by_variant() {
        assert_eq!(ConnectionState::Disconnected, ConnectionState::Disconnected);
        assert_ne!(ConnectionState::Connected, ConnectionState::Faulted);
    }
}
