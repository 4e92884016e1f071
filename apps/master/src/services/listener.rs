//! Agent listener: accepts tenant-agent connections on the agent port,
//! validates registration, and drives each session's read loop.
//!
//! Frames from one session are processed in arrival order, so
//! DATA_RESPONSE batches for a given log land in the order the adapter
//! emitted them. Writes go through the session's writer mutex.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

use datalink_wire::{
    ExecCommandResultData, FrameReader, MessageType, RegisterData, TestConnectionResultData,
    WireMessage,
};

use crate::config::AgentListenerSettings;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::NetworkStatus;
use crate::services::executor::build_config_response;
use crate::services::{agent_token, AgentSession, CommandBroker, ConnectionRegistry, JobExecutor};

pub struct AgentListener {
    pool: DbPool,
    registry: ConnectionRegistry,
    executor: Arc<JobExecutor>,
    broker: CommandBroker,
    settings: AgentListenerSettings,
}

impl AgentListener {
    pub fn new(
        pool: DbPool,
        registry: ConnectionRegistry,
        executor: Arc<JobExecutor>,
        broker: CommandBroker,
        settings: AgentListenerSettings,
    ) -> Self {
        Self {
            pool,
            registry,
            executor,
            broker,
            settings,
        }
    }

    /// Bind the agent port and accept forever. Returns only on a bind
    /// or TLS-material error, which is fatal at startup.
    pub async fn run(self) -> AppResult<()> {
        let addr = format!("0.0.0.0:{}", self.settings.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AppError::Agent(format!("failed to bind agent port {}: {}", addr, e)))?;

        let acceptor = if self.settings.tls_enabled {
            Some(build_tls_acceptor(&self.settings)?)
        } else {
            None
        };

        info!(
            port = self.settings.port,
            tls = self.settings.tls_enabled,
            "agent listener started"
        );

        self.accept_loop(listener, acceptor).await
    }

    /// Accept loop over an already-bound listener.
    pub async fn accept_loop(
        self,
        listener: TcpListener,
        acceptor: Option<TlsAcceptor>,
    ) -> AppResult<()> {
        let ctx = Arc::new(self);
        loop {
            let (stream, peer) = match accept_next(&listener).await {
                Some(pair) => pair,
                None => continue,
            };

            let ctx = ctx.clone();
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let peer = peer.to_string();
                match acceptor {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(tls_stream) => ctx.handle_connection(tls_stream, peer).await,
                        Err(e) => warn!(%peer, error = %e, "TLS handshake failed"),
                    },
                    None => ctx.handle_connection(stream, peer).await,
                }
            });
        }
    }

    /// Drive one accepted connection: registration handshake, then the
    /// steady-state frame loop.
    async fn handle_connection<S>(&self, stream: S, peer: String)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        info!(%peer, "new agent connection");

        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FrameReader::new(read_half);

        // The first frame must be REGISTER.
        let register = match reader.next_frame().await {
            Ok(Some(msg)) if msg.msg_type == MessageType::Register => msg,
            Ok(Some(msg)) => {
                warn!(%peer, msg_type = %msg.msg_type, "expected REGISTER as first frame");
                return;
            }
            Ok(None) => return,
            Err(e) => {
                warn!(%peer, error = %e, "read failed before registration");
                return;
            }
        };

        let agent_name = register.agent_name.clone();
        if agent_name.is_empty() {
            warn!(%peer, "REGISTER without agent_name");
            return;
        }

        let reg_data: RegisterData = register.decode_data().unwrap_or_default();
        let session = Arc::new(AgentSession::new(
            agent_name.clone(),
            peer.clone(),
            Box::new(write_half),
        ));

        // Token check before the session becomes routable.
        if let Err(e) = agent_token::verify_register_token(&self.pool, &agent_name, &reg_data.token).await
        {
            warn!(%peer, agent = %agent_name, error = %e, "registration rejected");
            let mut reject = WireMessage::new(MessageType::RegisterAck).with_status("error");
            reject
                .data
                .insert("error".into(), serde_json::Value::String(e.to_string()));
            let _ = session.send(&reject).await;
            return;
        }

        self.registry.register(session.clone()).await;
        if let Err(e) = self
            .pool
            .upsert_agent_status(&agent_name, NetworkStatus::Online, &peer)
            .await
        {
            error!(agent = %agent_name, error = %e, "failed to record agent online");
        }

        let mut ack = WireMessage::new(MessageType::RegisterAck).with_status("success");
        ack.data.insert(
            "message".into(),
            serde_json::Value::String("agent registered".into()),
        );
        if session.send(&ack).await.is_err() {
            self.registry.remove(&session).await;
            return;
        }

        info!(agent = %agent_name, version = %reg_data.version, sync_enabled = reg_data.sync_enabled, "agent registered");

        // Steady state: read until EOF, transport error, or replacement.
        let cancel = session.closed();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(agent = %agent_name, "session replaced by newer registration");
                    break;
                }
                frame = reader.next_frame() => match frame {
                    Ok(Some(msg)) => self.process_frame(&session, msg).await,
                    Ok(None) => {
                        info!(agent = %agent_name, "agent disconnected");
                        break;
                    }
                    Err(e) => {
                        warn!(agent = %agent_name, error = %e, "session read error");
                        break;
                    }
                }
            }
        }

        self.registry.remove(&session).await;
        if let Err(e) = self.pool.mark_agent_offline(&agent_name).await {
            error!(agent = %agent_name, error = %e, "failed to record agent offline");
        }
    }

    /// Handle one steady-state frame. Errors stay inside the session:
    /// they are logged, never propagated to the transport.
    async fn process_frame(&self, session: &Arc<AgentSession>, msg: WireMessage) {
        let agent_name = &session.agent_name;

        match msg.msg_type {
            MessageType::Heartbeat => {
                let status = if msg.status == NetworkStatus::Offline.as_str() {
                    NetworkStatus::Offline
                } else {
                    NetworkStatus::Online
                };
                if let Err(e) = self
                    .pool
                    .upsert_agent_status(agent_name, status, &session.peer_addr)
                    .await
                {
                    error!(agent = %agent_name, error = %e, "heartbeat update failed");
                }
            }
            MessageType::DataResponse => {
                if let Err(e) = self.executor.handle_data_response(&msg).await {
                    error!(agent = %agent_name, error = %e, "failed to apply DATA_RESPONSE");
                }
            }
            MessageType::TestConnectionResult => {
                let request_id = msg
                    .decode_data::<TestConnectionResultData>()
                    .map(|d| d.request_id)
                    .unwrap_or_default();
                self.broker.complete(&request_id, msg).await;
            }
            MessageType::ExecCommandResult => {
                let request_id = msg
                    .decode_data::<ExecCommandResultData>()
                    .map(|d| d.request_id)
                    .unwrap_or_default();
                self.broker.complete(&request_id, msg).await;
            }
            MessageType::ConfigPull => {
                info!(agent = %agent_name, "agent requested configuration");
                match build_config_response(&self.pool, agent_name).await {
                    Ok(response) => {
                        if let Err(e) = session.send(&response).await {
                            warn!(agent = %agent_name, error = %e, "failed to send CONFIG_RESPONSE");
                        }
                    }
                    Err(e) => error!(agent = %agent_name, error = %e, "failed to build CONFIG_RESPONSE"),
                }
            }
            MessageType::Register => {
                // already registered on this connection; refresh liveness
                let _ = self
                    .pool
                    .upsert_agent_status(agent_name, NetworkStatus::Online, &session.peer_addr)
                    .await;
            }
            other => {
                warn!(agent = %agent_name, msg_type = %other, "unexpected frame type, skipping");
            }
        }
    }
}

async fn accept_next(listener: &TcpListener) -> Option<(TcpStream, std::net::SocketAddr)> {
    match listener.accept().await {
        Ok(pair) => Some(pair),
        Err(e) => {
            warn!(error = %e, "accept failed");
            None
        }
    }
}

/// Load cert + key and build the TLS acceptor: TLS 1.2 minimum, rustls
/// default (ECDHE) suites.
fn build_tls_acceptor(settings: &AgentListenerSettings) -> AppResult<TlsAcceptor> {
    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(
        std::fs::File::open(&settings.tls_cert_path)
            .map_err(|e| AppError::Agent(format!("cannot read TLS cert: {}", e)))?,
    ))
    .collect::<Result<Vec<_>, _>>()
    .map_err(|e| AppError::Agent(format!("invalid TLS cert: {}", e)))?;

    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(
        std::fs::File::open(&settings.tls_key_path)
            .map_err(|e| AppError::Agent(format!("cannot read TLS key: {}", e)))?,
    ))
    .map_err(|e| AppError::Agent(format!("invalid TLS key: {}", e)))?
    .ok_or_else(|| AppError::Agent("no private key found in TLS key file".into()))?;

    let config = rustls::ServerConfig::builder_with_protocol_versions(&[
        &rustls::version::TLS12,
        &rustls::version::TLS13,
    ])
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .map_err(|e| AppError::Agent(format!("TLS config error: {}", e)))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
