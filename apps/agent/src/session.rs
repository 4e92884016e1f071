//! The master session: register, heartbeat, command dispatch, and the
//! reconnect loop.
//!
//! The agent holds exactly one session at a time. A writer task owns the
//! outbound half of the connection so every frame - heartbeats, streamed
//! batches, command results - is serialized through one mpsc channel.
//! Each inbound command runs in its own task; the reader never blocks on
//! a slow extraction.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};

use datalink_wire::{
    DbConfig, ExecCommandData, FrameReader, FrameWriter, MessageType, RegisterData, RunJobData,
    SourceConfig, WireMessage,
};

use crate::adapters::{self, BatchEmitter};
use crate::config::Config;
use crate::error::{AgentError, AgentResult};
use crate::{probe, shell, tls};

/// Heartbeat cadence.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Reconnect attempts before the process fails fatally. Backoff is
/// linear: attempt i sleeps i seconds.
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Why a session ended.
enum SessionEnd {
    /// SIGINT/SIGTERM: exit 0.
    Shutdown,
    /// Transport loss after a successful registration: reconnect.
    Lost,
}

/// Run the agent until shutdown or reconnect exhaustion.
pub async fn run(config: Config) -> AgentResult<()> {
    let runtime = Runtime {
        config,
        db_override: Arc::new(RwLock::new(None)),
    };

    let mut attempt: u32 = 0;
    loop {
        match runtime.serve().await {
            Ok(SessionEnd::Shutdown) => {
                info!("agent shut down");
                return Ok(());
            }
            Ok(SessionEnd::Lost) => {
                // the last session registered successfully; start a
                // fresh backoff ladder
                attempt = 0;
                warn!("connection to master lost");
            }
            Err(e @ AgentError::RegistrationRejected(_)) => {
                // operator intervention required; retrying cannot help
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "session attempt failed");
            }
        }

        attempt += 1;
        if attempt > MAX_RECONNECT_ATTEMPTS {
            return Err(AgentError::Master(format!(
                "failed to reconnect after {} attempts",
                MAX_RECONNECT_ATTEMPTS
            )));
        }

        let delay = Duration::from_secs(attempt as u64);
        info!(attempt, delay_s = delay.as_secs(), "reconnecting");
        tokio::time::sleep(delay).await;
    }
}

struct Runtime {
    config: Config,
    /// Source DB block pushed by the master via CONFIG_RESPONSE; wins
    /// over the env-derived default.
    db_override: Arc<RwLock<Option<DbConfig>>>,
}

impl Runtime {
    /// One full session: connect, register, steady state.
    async fn serve(&self) -> AgentResult<SessionEnd> {
        let stream = tls::connect(&self.config).await?;
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FrameReader::new(read_half);

        // single writer for the whole session
        let (tx, mut rx) = mpsc::channel::<WireMessage>(64);
        let mut writer = FrameWriter::new(write_half);
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = writer.send(&msg).await {
                    warn!(error = %e, "outbound write failed");
                    break;
                }
            }
        });

        self.send(&tx, self.register_frame()).await?;
        info!(agent = %self.config.agent_name, "REGISTER sent, awaiting acknowledgment");

        let mut registered = false;
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    let bye = self.heartbeat_frame("offline");
                    let _ = tx.send(bye).await;
                    // give the writer a beat to flush the farewell
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    return Ok(SessionEnd::Shutdown);
                }

                _ = heartbeat.tick() => {
                    if tx.send(self.heartbeat_frame("online")).await.is_err() {
                        if registered {
                            return Ok(SessionEnd::Lost);
                        }
                        return Err(AgentError::Master("connection closed before registration".into()));
                    }
                }

                frame = reader.next_frame() => match frame {
                    Ok(Some(msg)) => {
                        if let Some(end) = self.process_frame(&tx, msg, &mut registered).await? {
                            return Ok(end);
                        }
                    }
                    Ok(None) | Err(_) => {
                        if registered {
                            return Ok(SessionEnd::Lost);
                        }
                        return Err(AgentError::Master("connection closed before registration".into()));
                    }
                }
            }
        }
    }

    /// Handle one inbound frame. Long-running commands spawn their own
    /// tasks so the reader keeps draining.
    async fn process_frame(
        &self,
        tx: &mpsc::Sender<WireMessage>,
        msg: WireMessage,
        registered: &mut bool,
    ) -> AgentResult<Option<SessionEnd>> {
        match msg.msg_type {
            MessageType::RegisterAck => {
                if msg.status == "error" {
                    let reason = msg
                        .data
                        .get("error")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("unknown reason");
                    return Err(AgentError::RegistrationRejected(reason.to_string()));
                }
                *registered = true;
                info!("registration acknowledged by master");
                if self.config.sync_enabled {
                    let pull = WireMessage::new(MessageType::ConfigPull)
                        .with_agent(self.config.agent_name.clone());
                    self.send(tx, pull).await?;
                }
            }

            MessageType::ConfigResponse => {
                if let Some(db) = msg.data.get("db_config") {
                    if let Ok(db) = serde_json::from_value::<DbConfig>(db.clone()) {
                        if db.is_configured() {
                            info!(host = %db.host, db = %db.db_name, "applied database config from master");
                            *self.db_override.write().await = Some(db);
                        }
                    }
                }
            }

            MessageType::RunJob => {
                match msg.decode_data::<RunJobData>() {
                    Ok(data) => {
                        let tx = tx.clone();
                        let agent_name = self.config.agent_name.clone();
                        let default_db = self.effective_db().await;
                        tokio::spawn(async move {
                            execute_run_job(tx, agent_name, data, default_db).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "malformed RUN_JOB payload, skipping"),
                }
            }

            MessageType::TestConnection => {
                let tx = tx.clone();
                let agent_name = self.config.agent_name.clone();
                let default_db = self.effective_db().await;
                tokio::spawn(async move {
                    let result = probe::test_connection(&msg, &default_db).await;
                    let frame = WireMessage::new(MessageType::TestConnectionResult)
                        .with_agent(agent_name)
                        .with_data(&result);
                    let _ = tx.send(frame).await;
                });
            }

            MessageType::ExecCommand => {
                match msg.decode_data::<ExecCommandData>() {
                    Ok(request) => {
                        let tx = tx.clone();
                        let agent_name = self.config.agent_name.clone();
                        tokio::spawn(async move {
                            let result = shell::execute(&request).await;
                            let frame = WireMessage::new(MessageType::ExecCommandResult)
                                .with_agent(agent_name)
                                .with_data(&result);
                            let _ = tx.send(frame).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "malformed EXEC_COMMAND payload, skipping"),
                }
            }

            MessageType::Command => {
                info!("received generic command from master");
            }

            other => {
                warn!(msg_type = %other, "unexpected frame type, skipping");
            }
        }

        Ok(None)
    }

    async fn effective_db(&self) -> DbConfig {
        self.db_override
            .read()
            .await
            .clone()
            .unwrap_or_else(|| self.config.default_db.clone())
    }

    fn register_frame(&self) -> WireMessage {
        WireMessage::new(MessageType::Register)
            .with_agent(self.config.agent_name.clone())
            .with_status("online")
            .with_data(&RegisterData {
                version: env!("CARGO_PKG_VERSION").to_string(),
                sync_enabled: self.config.sync_enabled,
                token: self.config.agent_token.clone(),
            })
    }

    fn heartbeat_frame(&self, status: &str) -> WireMessage {
        WireMessage::new(MessageType::Heartbeat)
            .with_agent(self.config.agent_name.clone())
            .with_status(status)
    }

    async fn send(&self, tx: &mpsc::Sender<WireMessage>, msg: WireMessage) -> AgentResult<()> {
        tx.send(msg).await.map_err(|_| AgentError::SessionClosed)
    }
}

/// Run one extraction and stream its batches back. Every exit path
/// produces exactly one terminal frame (unless the session is gone).
async fn execute_run_job(
    tx: mpsc::Sender<WireMessage>,
    agent_name: String,
    mut data: RunJobData,
    default_db: DbConfig,
) {
    // a RUN_JOB with an empty db block falls back to the agent default
    if !data.db_config.is_configured() {
        data.db_config = default_db;
    }

    let source = SourceConfig::from_run_job(&data);
    info!(
        job_id = data.job_id,
        log_id = data.log_id,
        job = %data.name,
        source_type = source.kind(),
        "processing RUN_JOB"
    );

    let emitter = BatchEmitter::new(tx, agent_name, data.job_id, data.log_id);
    match adapters::run(source, &emitter).await {
        Ok(()) => {
            if let Err(e) = emitter.finish().await {
                error!(job_id = data.job_id, error = %e, "failed to send terminal frame");
            }
        }
        Err(AgentError::SessionClosed) => {
            warn!(job_id = data.job_id, "session closed mid-extraction");
        }
        Err(e) => {
            error!(job_id = data.job_id, error = %e, "extraction failed");
            if let Err(send_err) = emitter.fail(e.to_string()).await {
                error!(job_id = data.job_id, error = %send_err, "failed to send error frame");
            }
        }
    }
}
