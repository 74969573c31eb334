//! One-shot question runner.
//!
//! Answers a single query over a fresh conversation, folds every tool
//! result into an [`AgentState`] record, and persists that record twice:
//! once under a timestamped archive name and once at the stable
//! latest-state path. Saving is best-effort; the answer already reached
//! the console.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use tabletalk_core::config::StateConfig;
use tabletalk_core::errors::AgentError;

use crate::blocks::{Block, Message};
use crate::client::{ConnectOptions, ReasoningClient};
use crate::render::Renderer;
use crate::state::AgentState;

pub struct OneShotRunner {
    client: Arc<dyn ReasoningClient>,
    options: ConnectOptions,
    archive_dir: PathBuf,
    latest_path: PathBuf,
}

pub struct OneShotOutcome {
    pub state: AgentState,
    pub archived_path: PathBuf,
    pub latest_path: PathBuf,
}

impl OneShotRunner {
    pub fn new(
        client: Arc<dyn ReasoningClient>,
        state: &StateConfig,
        system_prompt: impl Into<String>,
        allowed_tools: Vec<String>,
        max_turns: u32,
    ) -> Self {
        Self {
            client,
            options: ConnectOptions {
                system_prompt: system_prompt.into(),
                allowed_tools,
                resume: None,
                max_turns,
            },
            archive_dir: state.one_shot_dir(),
            latest_path: state.one_shot_latest_path(),
        }
    }

    pub async fn run<W: Write>(
        &self,
        query: &str,
        renderer: &mut Renderer<W>,
    ) -> Result<OneShotOutcome, AgentError> {
        let mut conversation = self.client.connect(self.options.clone()).await?;
        let mut rx = conversation.send_query(query).await?;

        let mut state = AgentState::new(query);

        while let Some(item) = rx.recv().await {
            let message = item?;

            match &message {
                Message::Assistant { blocks } => {
                    for block in blocks {
                        if let Block::Text { text } = block {
                            state.push_insight(text.clone());
                        }
                    }
                }
                Message::User { blocks } => {
                    for block in blocks {
                        if let Block::ToolResult { content } = block {
                            state.observe_tool_result(content);
                        }
                    }
                }
                _ => {}
            }

            renderer.render_message(&message);
        }

        conversation.close().await;
        state.classify_intent();
        state.stamp();

        let archived_path =
            self.archive_dir.join(format!("agent_state_{}.json", state.timestamp_slug()));
        for path in [&archived_path, &self.latest_path] {
            if let Err(error) = state.save(path) {
                warn!(path = %path.display(), error = %error, "could not save run state");
            }
        }
        info!(
            archived = %archived_path.display(),
            latest = %self.latest_path.display(),
            intent = ?state.intent,
            "one-shot run finished"
        );

        Ok(OneShotOutcome { state, archived_path, latest_path: self.latest_path.clone() })
    }
}
