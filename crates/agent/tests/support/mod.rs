//! Scripted reasoning-client double for session tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use tabletalk_agent::blocks::Message;
use tabletalk_agent::client::{ConnectOptions, Conversation, ReasoningClient};
use tabletalk_core::errors::{ConnectError, SendError};

pub type Script = Vec<Result<Message, SendError>>;

/// Replays pre-scripted message streams, one script per `send_query`,
/// and records every `ConnectOptions` it sees.
pub struct MockClient {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    connects: Arc<Mutex<Vec<ConnectOptions>>>,
    fail_connects: Arc<Mutex<u32>>,
}

impl MockClient {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into_iter().collect())),
            connects: Arc::new(Mutex::new(Vec::new())),
            fail_connects: Arc::new(Mutex::new(0)),
        }
    }

    /// Makes the next `count` connect calls fail.
    pub fn fail_next_connects(&self, count: u32) {
        *self.fail_connects.lock().unwrap() = count;
    }

    pub fn recorded_connects(&self) -> Vec<ConnectOptions> {
        self.connects.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningClient for MockClient {
    async fn connect(
        &self,
        options: ConnectOptions,
    ) -> Result<Box<dyn Conversation>, ConnectError> {
        self.connects.lock().unwrap().push(options);

        {
            let mut failures = self.fail_connects.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(ConnectError::Unreachable("scripted failure".to_string()));
            }
        }

        Ok(Box::new(MockConversation { scripts: Arc::clone(&self.scripts) }))
    }
}

struct MockConversation {
    scripts: Arc<Mutex<VecDeque<Script>>>,
}

#[async_trait]
impl Conversation for MockConversation {
    async fn send_query(
        &mut self,
        _query: &str,
    ) -> Result<mpsc::Receiver<Result<Message, SendError>>, SendError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SendError::Request("no script left".to_string()))?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            for item in script {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn interrupt(&mut self) -> Result<(), SendError> {
        Ok(())
    }

    async fn close(&mut self) {}
}
