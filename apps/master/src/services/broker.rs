//! Out-of-band command broker.
//!
//! TEST_CONNECTION and EXEC_COMMAND round trips correlate by a
//! `request_id` carried inside `data`. The dispatching handler parks a
//! oneshot waiter here; the session read loop completes it when the
//! matching `*_RESULT` frame arrives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tracing::warn;
use uuid::Uuid;

use datalink_wire::WireMessage;

use crate::error::{AppError, AppResult};

/// How long a handler waits for the agent's result frame.
const DEFAULT_WAIT: Duration = Duration::from_secs(60);

#[derive(Clone, Default)]
pub struct CommandBroker {
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<WireMessage>>>>,
}

impl CommandBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a request id and park a waiter for it.
    pub async fn register_request(&self) -> (String, oneshot::Receiver<WireMessage>) {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);
        (request_id, rx)
    }

    /// Complete the waiter for a result frame. Unmatched results are
    /// logged and dropped - the waiter may have timed out already.
    pub async fn complete(&self, request_id: &str, msg: WireMessage) {
        let sender = self.pending.lock().await.remove(request_id);
        match sender {
            Some(tx) => {
                let _ = tx.send(msg);
            }
            None => {
                warn!(request_id, "result frame with no pending waiter");
            }
        }
    }

    /// Await a parked waiter with the default timeout, cleaning up the
    /// entry on expiry.
    pub async fn wait(
        &self,
        request_id: &str,
        rx: oneshot::Receiver<WireMessage>,
    ) -> AppResult<WireMessage> {
        match tokio::time::timeout(DEFAULT_WAIT, rx).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_)) => Err(AppError::Agent("agent session closed".into())),
            Err(_) => {
                self.pending.lock().await.remove(request_id);
                Err(AppError::CommandTimeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalink_wire::MessageType;

    #[tokio::test]
    async fn result_frames_complete_their_waiter() {
        let broker = CommandBroker::new();
        let (request_id, rx) = broker.register_request().await;

        let broker2 = broker.clone();
        let id2 = request_id.clone();
        tokio::spawn(async move {
            broker2
                .complete(&id2, WireMessage::new(MessageType::ExecCommandResult))
                .await;
        });

        let msg = broker.wait(&request_id, rx).await.unwrap();
        assert_eq!(msg.msg_type, MessageType::ExecCommandResult);
    }

    #[tokio::test]
    async fn unmatched_results_are_dropped() {
        let broker = CommandBroker::new();
        // no waiter parked; must not panic
        broker
            .complete("nope", WireMessage::new(MessageType::TestConnectionResult))
            .await;
    }
}
