//! Conversational analysis agent: session lifecycle, message rendering,
//! and run-state persistence over a reasoning-service client.

pub mod anthropic;
pub mod atomic;
pub mod blocks;
pub mod client;
pub mod connection;
pub mod interactive;
pub mod one_shot;
pub mod prompt;
pub mod render;
pub mod session;
pub mod state;

pub use anthropic::AnthropicClient;
pub use blocks::{Block, Message};
pub use client::{ConnectOptions, Conversation, ReasoningClient};
pub use connection::{ConnectionState, Session};
pub use interactive::run_interactive;
pub use one_shot::{OneShotOutcome, OneShotRunner};
pub use render::Renderer;
pub use session::SessionStore;
pub use state::{AgentState, Intent};
