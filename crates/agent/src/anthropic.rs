//! HTTP-backed [`ReasoningClient`] over the Anthropic Messages API.
//!
//! The Messages API is stateless, so session identity is client-issued:
//! each fresh conversation gets a UUID, and the turn-by-turn transcript
//! is persisted under that id so a later run can resume with context.
//!
//! One `send_query` drives a bounded tool-use loop: request, dispatch any
//! requested tools locally, feed the results back, repeat until the model
//! stops asking or the turn budget runs out.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tabletalk_core::config::ReasoningConfig;
use tabletalk_core::errors::{ConnectError, SendError};
use tabletalk_tools::{envelope, ToolRegistry};

use crate::atomic::write_atomic_or_plain;
use crate::blocks::{Block, Message};
use crate::client::{ConnectOptions, Conversation, ReasoningClient};

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

#[derive(Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
    registry: Arc<ToolRegistry>,
    transcripts_dir: PathBuf,
}

impl AnthropicClient {
    pub fn new(
        reasoning: &ReasoningConfig,
        registry: Arc<ToolRegistry>,
        transcripts_dir: PathBuf,
    ) -> Result<Self, ConnectError> {
        let api_key = reasoning.api_key.clone().ok_or(ConnectError::MissingCredentials)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(reasoning.timeout_secs))
            .build()
            .map_err(|error| ConnectError::Handshake(error.to_string()))?;

        Ok(Self {
            http,
            base_url: reasoning.base_url.trim_end_matches('/').to_string(),
            model: reasoning.model.clone(),
            api_key,
            registry,
            transcripts_dir,
        })
    }

    fn transcript_path(&self, session_id: &str) -> PathBuf {
        self.transcripts_dir.join(format!("{session_id}.json"))
    }
}

#[async_trait]
impl ReasoningClient for AnthropicClient {
    async fn connect(
        &self,
        options: ConnectOptions,
    ) -> Result<Box<dyn Conversation>, ConnectError> {
        let (session_id, history) = match &options.resume {
            Some(resume_id) => {
                let history = load_transcript(&self.transcript_path(resume_id));
                info!(session_id = resume_id.as_str(), turns = history.len(), "resuming session");
                (resume_id.clone(), history)
            }
            None => {
                let fresh = Uuid::new_v4().to_string();
                info!(session_id = fresh.as_str(), "starting fresh session");
                (fresh, Vec::new())
            }
        };

        let (cancel_tx, _) = watch::channel(false);
        Ok(Box::new(AnthropicConversation {
            client: self.clone(),
            options,
            session_id: session_id.clone(),
            history: Arc::new(Mutex::new(history)),
            transcript_path: self.transcript_path(&session_id),
            cancel: cancel_tx,
        }))
    }
}

struct AnthropicConversation {
    client: AnthropicClient,
    options: ConnectOptions,
    session_id: String,
    history: Arc<Mutex<Vec<ApiMessage>>>,
    transcript_path: PathBuf,
    cancel: watch::Sender<bool>,
}

#[async_trait]
impl Conversation for AnthropicConversation {
    async fn send_query(
        &mut self,
        query: &str,
    ) -> Result<mpsc::Receiver<Result<Message, SendError>>, SendError> {
        let (tx, rx) = mpsc::channel(32);

        // Reset cancellation for this turn.
        self.cancel.send_replace(false);
        let mut cancelled = self.cancel.subscribe();

        let client = self.client.clone();
        let options = self.options.clone();
        let session_id = self.session_id.clone();
        let history = Arc::clone(&self.history);
        let transcript_path = self.transcript_path.clone();
        let query = query.to_string();

        tokio::spawn(async move {
            let _ = tx.send(Ok(Message::Init { session_id })).await;

            let mut history = history.lock().await;
            history.push(ApiMessage { role: "user".to_string(), content: json!(query) });

            let outcome =
                run_turn_loop(&client, &options, &mut history, &tx, &mut cancelled).await;
            if let Err(error) = outcome {
                let _ = tx.send(Err(error)).await;
            }

            persist_transcript(&transcript_path, &history);
        });

        Ok(rx)
    }

    async fn interrupt(&mut self) -> Result<(), SendError> {
        self.cancel.send_replace(true);
        Ok(())
    }

    async fn close(&mut self) {
        let history = self.history.lock().await;
        persist_transcript(&self.transcript_path, &history);
    }
}

/// The tool-use loop for one turn. Emits assistant and user (tool result)
/// messages on `tx` as they materialize; returns `Err` only for failures
/// the caller should surface as a broken stream.
async fn run_turn_loop(
    client: &AnthropicClient,
    options: &ConnectOptions,
    history: &mut Vec<ApiMessage>,
    tx: &mpsc::Sender<Result<Message, SendError>>,
    cancelled: &mut watch::Receiver<bool>,
) -> Result<(), SendError> {
    let tools: Vec<Value> = client
        .registry
        .definitions()
        .into_iter()
        .filter(|definition| {
            definition["name"]
                .as_str()
                .is_some_and(|name| options.allowed_tools.iter().any(|allowed| allowed == name))
        })
        .collect();

    for round in 0..options.max_turns.max(1) {
        if *cancelled.borrow() {
            info!(round, "turn interrupted before request");
            return Ok(());
        }

        let response = tokio::select! {
            response = request_messages(client, options, history, &tools) => response?,
            _ = cancelled.changed() => {
                info!(round, "turn interrupted mid-request");
                return Ok(());
            }
        };

        let assistant_blocks: Vec<Block> =
            response.content.iter().map(Block::from_value).collect();
        history.push(ApiMessage {
            role: "assistant".to_string(),
            content: Value::Array(response.content.clone()),
        });
        if tx.send(Ok(Message::Assistant { blocks: assistant_blocks })).await.is_err() {
            return Ok(());
        }

        if response.stop_reason.as_deref() != Some("tool_use") {
            return Ok(());
        }

        let result_blocks = dispatch_tools(client, &response.content).await;
        if result_blocks.is_empty() {
            warn!("stop_reason was tool_use but no tool_use blocks were present");
            return Ok(());
        }

        history.push(ApiMessage {
            role: "user".to_string(),
            content: Value::Array(result_blocks.clone()),
        });
        let user_blocks: Vec<Block> = result_blocks.iter().map(Block::from_value).collect();
        if tx.send(Ok(Message::User { blocks: user_blocks })).await.is_err() {
            return Ok(());
        }
    }

    warn!(max_turns = options.max_turns, "turn budget exhausted with tools still pending");
    Ok(())
}

async fn request_messages(
    client: &AnthropicClient,
    options: &ConnectOptions,
    history: &[ApiMessage],
    tools: &[Value],
) -> Result<MessagesResponse, SendError> {
    let request = MessagesRequest {
        model: &client.model,
        max_tokens: MAX_TOKENS,
        system: &options.system_prompt,
        messages: history,
        tools,
    };

    let response = client
        .http
        .post(format!("{}/v1/messages", client.base_url))
        .header("x-api-key", client.api_key.expose_secret())
        .header("anthropic-version", API_VERSION)
        .json(&request)
        .send()
        .await
        .map_err(|error| SendError::Request(error.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SendError::Stream(format!("service returned {status}: {body}")));
    }

    response.json().await.map_err(|error| SendError::Stream(error.to_string()))
}

/// Executes every `tool_use` block in a response and shapes the results
/// as `tool_result` blocks for the follow-up request.
async fn dispatch_tools(client: &AnthropicClient, content: &[Value]) -> Vec<Value> {
    let mut results = Vec::new();

    for block in content {
        if block.get("type").and_then(Value::as_str) != Some("tool_use") {
            continue;
        }
        let Some(name) = block.get("name").and_then(Value::as_str) else {
            continue;
        };
        let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
        let input = block.get("input").cloned().unwrap_or_else(|| json!({}));

        debug!(tool = name, "dispatching tool");
        let payload = client.registry.dispatch(name, input).await;
        let wrapped = envelope(&payload);

        results.push(json!({
            "type": "tool_result",
            "tool_use_id": id,
            "content": wrapped["content"],
        }));
    }

    results
}

fn load_transcript(path: &PathBuf) -> Vec<ApiMessage> {
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(history) => history,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "transcript unreadable; resuming empty");
                Vec::new()
            }
        },
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(error) => {
            warn!(path = %path.display(), error = %error, "could not read transcript; resuming empty");
            Vec::new()
        }
    }
}

fn persist_transcript(path: &PathBuf, history: &[ApiMessage]) {
    match serde_json::to_vec_pretty(history) {
        Ok(body) => {
            if let Err(error) = write_atomic_or_plain(path, &body) {
                warn!(path = %path.display(), error = %error, "could not persist transcript");
            }
        }
        Err(error) => warn!(error = %error, "could not serialize transcript"),
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ApiMessage],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [Value],
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<Value>,
    stop_reason: Option<String>,
}
