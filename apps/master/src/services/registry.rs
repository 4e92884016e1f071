//! Connection registry: logical agent name -> live session.
//!
//! Sessions are owned here; everything else holds `Arc` handles that go
//! stale harmlessly when a session is evicted. All writes to one session
//! funnel through its writer mutex - interleaved frames would corrupt
//! the stream.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::AsyncWrite;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use datalink_wire::{FrameWriter, WireMessage};

use crate::error::{AppError, AppResult};

type BoxedWriter = FrameWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// One registered agent connection.
pub struct AgentSession {
    pub agent_name: String,
    pub peer_addr: String,
    pub connected_at: DateTime<Utc>,
    writer: Mutex<BoxedWriter>,
    cancel: CancellationToken,
}

impl AgentSession {
    pub fn new(
        agent_name: String,
        peer_addr: String,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
    ) -> Self {
        Self {
            agent_name,
            peer_addr,
            connected_at: Utc::now(),
            writer: Mutex::new(FrameWriter::new(writer)),
            cancel: CancellationToken::new(),
        }
    }

    /// Write one frame, serialized against all other writers.
    pub async fn send(&self, msg: &WireMessage) -> AppResult<()> {
        let mut writer = self.writer.lock().await;
        writer
            .send(msg)
            .await
            .map_err(|e| AppError::Agent(format!("failed to write to agent: {}", e)))
    }

    /// Ask the session's read loop to shut down (registry replacement).
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Token the read loop selects on.
    pub fn closed(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Shared map of live sessions keyed by agent name.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<AgentSession>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a session, replacing (and closing) any previous session for
    /// the same name. Tenant agents reconnect after restarts; the newest
    /// connection always wins.
    pub async fn register(&self, session: Arc<AgentSession>) {
        let name = session.agent_name.clone();
        let previous = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(name.clone(), session)
        };

        if let Some(old) = previous {
            warn!(agent = %name, "replacing existing session for re-registered agent");
            old.close();
        }

        let total = self.sessions.read().await.len();
        info!(agent = %name, total, "agent session registered");
    }

    pub async fn lookup(&self, agent_name: &str) -> Option<Arc<AgentSession>> {
        self.sessions.read().await.get(agent_name).cloned()
    }

    /// Remove a session, but only if `session` is still the registered
    /// one - a disconnecting reader must not evict its replacement.
    pub async fn remove(&self, session: &Arc<AgentSession>) {
        let mut sessions = self.sessions.write().await;
        if let Some(current) = sessions.get(&session.agent_name) {
            if Arc::ptr_eq(current, session) {
                sessions.remove(&session.agent_name);
                info!(agent = %session.agent_name, "agent session removed");
            }
        }
    }

    /// Names of all connected agents.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Send a frame to a named agent. A missing session or a write
    /// failure both surface as "not connected"; write failures also
    /// evict the dead session.
    pub async fn send(&self, agent_name: &str, msg: &WireMessage) -> AppResult<()> {
        let Some(session) = self.lookup(agent_name).await else {
            return Err(AppError::Agent(format!(
                "agent '{}' is not connected",
                agent_name
            )));
        };

        if let Err(e) = session.send(msg).await {
            warn!(agent = %agent_name, error = %e, "write failed, evicting session");
            session.close();
            self.remove(&session).await;
            return Err(AppError::Agent(format!(
                "agent '{}' is not connected",
                agent_name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalink_wire::MessageType;

    fn session(name: &str) -> Arc<AgentSession> {
        let (_, server) = tokio::io::duplex(1024);
        let (_rx, tx) = tokio::io::split(server);
        Arc::new(AgentSession::new(
            name.to_string(),
            "127.0.0.1:5000".to_string(),
            Box::new(tx),
        ))
    }

    #[tokio::test]
    async fn register_lookup_remove() {
        let registry = ConnectionRegistry::new();
        let s = session("tenant-1");
        registry.register(s.clone()).await;

        assert!(registry.lookup("tenant-1").await.is_some());
        assert_eq!(registry.list().await, vec!["tenant-1".to_string()]);

        registry.remove(&s).await;
        assert!(registry.lookup("tenant-1").await.is_none());
    }

    #[tokio::test]
    async fn re_register_replaces_and_closes_old_session() {
        let registry = ConnectionRegistry::new();
        let first = session("tenant-1");
        let second = session("tenant-1");

        registry.register(first.clone()).await;
        registry.register(second.clone()).await;

        assert!(first.closed().is_cancelled());
        let current = registry.lookup("tenant-1").await.unwrap();
        assert!(Arc::ptr_eq(&current, &second));

        // the displaced reader's cleanup must not evict the replacement
        registry.remove(&first).await;
        assert!(registry.lookup("tenant-1").await.is_some());
    }

    #[tokio::test]
    async fn send_to_unknown_agent_is_not_connected() {
        let registry = ConnectionRegistry::new();
        let msg = WireMessage::new(MessageType::RunJob);
        let err = registry.send("ghost", &msg).await.unwrap_err();
        assert!(err.to_string().contains("'ghost' is not connected"));
    }
}
