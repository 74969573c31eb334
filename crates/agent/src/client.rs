//! Trait seam between the session layer and the reasoning service.
//!
//! The session state machine only sees these traits; the HTTP-backed
//! implementation lives in [`crate::anthropic`], and tests substitute a
//! scripted double.

use async_trait::async_trait;
use tokio::sync::mpsc;

use tabletalk_core::errors::{ConnectError, SendError};

use crate::blocks::Message;

/// Per-conversation settings passed at connect time.
#[derive(Clone, Debug, Default)]
pub struct ConnectOptions {
    pub system_prompt: String,
    pub allowed_tools: Vec<String>,
    /// Session id to resume; `None` starts a fresh conversation.
    pub resume: Option<String>,
    /// Upper bound on tool-use round trips inside one turn.
    pub max_turns: u32,
}

#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn connect(
        &self,
        options: ConnectOptions,
    ) -> Result<Box<dyn Conversation>, ConnectError>;
}

/// An established conversation. One query at a time: `send_query` returns
/// a receiver that yields messages in arrival order, terminated by the
/// channel closing (success) or an `Err` item (stream failure).
#[async_trait]
pub trait Conversation: Send {
    async fn send_query(
        &mut self,
        query: &str,
    ) -> Result<mpsc::Receiver<Result<Message, SendError>>, SendError>;

    /// Cooperatively cancels the in-flight turn, if any.
    async fn interrupt(&mut self) -> Result<(), SendError>;

    async fn close(&mut self);
}
