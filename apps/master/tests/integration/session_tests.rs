//! Protocol tests: a scripted agent talks to the real listener over
//! loopback TCP.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::net::TcpStream;

use datalink_master::config::AgentListenerSettings;
use datalink_master::db::DbPool;
use datalink_master::models::CreateTokenRequest;
use datalink_master::services::listener::AgentListener;
use datalink_master::services::{
    agent_token, CommandBroker, ConnectionRegistry, JobExecutor, TargetSink,
};
use datalink_wire::{
    DataResponseData, FrameReader, FrameWriter, MessageType, RegisterData, WireMessage,
};

struct Harness {
    pool: DbPool,
    registry: ConnectionRegistry,
    addr: std::net::SocketAddr,
}

async fn start_master() -> Harness {
    let pool = DbPool::new_in_memory().await.unwrap();
    pool.run_migrations().await.unwrap();

    let registry = ConnectionRegistry::new();
    let broker = CommandBroker::new();
    let executor = Arc::new(JobExecutor::new(
        pool.clone(),
        registry.clone(),
        Arc::new(TargetSink::disabled()),
    ));

    let listener = AgentListener::new(
        pool.clone(),
        registry.clone(),
        executor,
        broker,
        AgentListenerSettings {
            port: 0,
            tls_enabled: false,
            tls_cert_path: String::new(),
            tls_key_path: String::new(),
        },
    );

    let socket = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = listener.accept_loop(socket, None).await;
    });

    Harness {
        pool,
        registry,
        addr,
    }
}

struct ScriptedAgent {
    reader: FrameReader<tokio::io::ReadHalf<TcpStream>>,
    writer: FrameWriter<tokio::io::WriteHalf<TcpStream>>,
}

impl ScriptedAgent {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (rx, tx) = tokio::io::split(stream);
        Self {
            reader: FrameReader::new(rx),
            writer: FrameWriter::new(tx),
        }
    }

    async fn register(&mut self, name: &str, token: &str) -> WireMessage {
        let msg = WireMessage::new(MessageType::Register)
            .with_agent(name)
            .with_status("online")
            .with_data(&RegisterData {
                version: "0.4.2".into(),
                sync_enabled: true,
                token: token.into(),
            });
        self.writer.send(&msg).await.unwrap();
        self.expect_frame().await
    }

    async fn expect_frame(&mut self) -> WireMessage {
        tokio::time::timeout(Duration::from_secs(5), self.reader.next_frame())
            .await
            .expect("timed out waiting for frame")
            .unwrap()
            .expect("connection closed")
    }

    async fn send(&mut self, msg: &WireMessage) {
        self.writer.send(msg).await.unwrap();
    }
}

/// Poll until the store reflects an async update.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..50 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn register_heartbeat_and_disconnect_track_network_status() {
    let master = start_master().await;

    let mut agent = ScriptedAgent::connect(master.addr).await;
    let ack = agent.register("tenant-1", "").await;
    assert_eq!(ack.msg_type, MessageType::RegisterAck);
    assert_eq!(ack.status, "success");

    eventually(|| async {
        master.registry.lookup("tenant-1").await.is_some()
    })
    .await;

    let net = master
        .pool
        .find_network_by_name("tenant-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(net.status, "online");
    assert!(net.last_seen.is_some());

    // heartbeat refreshes liveness
    agent
        .send(
            &WireMessage::new(MessageType::Heartbeat)
                .with_agent("tenant-1")
                .with_status("online"),
        )
        .await;

    // dropping the connection marks the network offline
    drop(agent);
    let pool = master.pool.clone();
    eventually(|| {
        let pool = pool.clone();
        async move {
            pool.find_network_by_name("tenant-1")
                .await
                .unwrap()
                .map(|n| n.status == "offline")
                .unwrap_or(false)
        }
    })
    .await;

    assert!(master.registry.lookup("tenant-1").await.is_none());
}

#[tokio::test]
async fn register_with_bad_token_is_rejected() {
    let master = start_master().await;

    agent_token::create_token(
        &master.pool,
        &CreateTokenRequest {
            agent_name: "tenant-1".into(),
            description: String::new(),
            expires_in: 0,
            created_by: String::new(),
        },
    )
    .await
    .unwrap();

    let mut agent = ScriptedAgent::connect(master.addr).await;
    let ack = agent.register("tenant-1", "dlk_wrong_token").await;
    assert_eq!(ack.msg_type, MessageType::RegisterAck);
    assert_eq!(ack.status, "error");

    // connection closes after the error frame
    let closed = tokio::time::timeout(Duration::from_secs(5), agent.reader.next_frame())
        .await
        .unwrap()
        .unwrap();
    assert!(closed.is_none());
    assert!(master.registry.lookup("tenant-1").await.is_none());
}

#[tokio::test]
async fn valid_token_admits_and_stamps_last_used() {
    let master = start_master().await;

    let created = agent_token::create_token(
        &master.pool,
        &CreateTokenRequest {
            agent_name: "tenant-1".into(),
            description: String::new(),
            expires_in: 30,
            created_by: String::new(),
        },
    )
    .await
    .unwrap();

    let mut agent = ScriptedAgent::connect(master.addr).await;
    let ack = agent.register("tenant-1", &created.token).await;
    assert_eq!(ack.status, "success");

    let record = master
        .pool
        .find_token_for_agent("tenant-1")
        .await
        .unwrap()
        .unwrap();
    assert!(record.last_used_at.is_some());
}

#[tokio::test]
async fn re_register_replaces_the_previous_session() {
    let master = start_master().await;

    let mut first = ScriptedAgent::connect(master.addr).await;
    first.register("tenant-1", "").await;

    let mut second = ScriptedAgent::connect(master.addr).await;
    second.register("tenant-1", "").await;

    // the first connection is closed by the replacement
    let end = tokio::time::timeout(Duration::from_secs(5), first.reader.next_frame())
        .await
        .unwrap()
        .unwrap();
    assert!(end.is_none());

    // and the name still routes to the newer session
    assert!(master.registry.lookup("tenant-1").await.is_some());
}

#[tokio::test]
async fn streamed_data_responses_update_the_job_log() {
    let master = start_master().await;

    // seed a (schema, network, job) triple bound to this agent
    let schema = master
        .pool
        .insert_schema(&datalink_master::models::UpsertSchemaRequest {
            name: "users".into(),
            source_type: datalink_master::models::SchemaSourceType::Query,
            sql_command: "SELECT id, name FROM users".into(),
            target_table: "users_copy".into(),
            unique_key_column: "id".into(),
            description: String::new(),
            file_format: "csv".into(),
            file_pattern: String::new(),
            has_header: true,
            delimiter: ",".into(),
        })
        .await
        .unwrap();
    let network = master
        .pool
        .insert_network(&datalink_master::models::UpsertNetworkRequest {
            name: "tenant-1".into(),
            source_type: datalink_master::models::SourceType::Database,
            ..Default::default()
        })
        .await
        .unwrap();
    let job = master
        .pool
        .insert_job(&datalink_master::models::CreateJobRequest {
            name: "sync-users".into(),
            schema_id: schema.id,
            network_id: network.id,
            schedule: "manual".into(),
            enabled: true,
            created_by: String::new(),
        })
        .await
        .unwrap();

    let mut agent = ScriptedAgent::connect(master.addr).await;
    agent.register("tenant-1", "").await;

    let log = master.pool.insert_running_log(job.id).await.unwrap();

    let batch = |records: Vec<datalink_wire::Record>, partial: bool| {
        let count = records.len() as i64;
        WireMessage::new(MessageType::DataResponse)
            .with_agent("tenant-1")
            .with_data(&DataResponseData {
                job_id: job.id,
                log_id: log.id,
                status: if partial { "running" } else { "completed" }.into(),
                record_count: count,
                records,
                error: String::new(),
                partial,
            })
    };

    let mut rec = datalink_wire::Record::new();
    rec.insert("id".into(), json!(1));
    rec.insert("name".into(), json!("a"));
    agent.send(&batch(vec![rec], true)).await;
    agent.send(&batch(Vec::new(), false)).await;

    let pool = master.pool.clone();
    eventually(|| {
        let pool = pool.clone();
        async move {
            pool.get_job_log(log.id)
                .await
                .unwrap()
                .map(|l| l.status == "completed" && l.record_count == 1)
                .unwrap_or(false)
        }
    })
    .await;

    let done = master.pool.get_job_log(log.id).await.unwrap().unwrap();
    assert!(done.sample_data.is_some());
    assert!(done.completed_at.is_some());

    let job = master.pool.get_job_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, "completed");
}
