//! Agent session tests against a scripted master on loopback TCP.

use std::time::Duration;

use tokio::net::TcpListener;

use datalink_agent::config::{Config, TlsSettings};
use datalink_agent::session;
use datalink_wire::{
    DbConfig, ExecCommandData, ExecCommandResultData, FrameReader, FrameWriter, MessageType,
    RegisterData, WireMessage,
};

fn agent_config(port: u16) -> Config {
    Config {
        master_host: "127.0.0.1".into(),
        master_port: port,
        agent_name: "tenant-1".into(),
        agent_token: "dlk_testtoken".into(),
        sync_enabled: false,
        tls: TlsSettings {
            enabled: false,
            ca_path: String::new(),
            skip_verify: false,
        },
        default_db: DbConfig::default(),
        log_file: None,
    }
}

async fn expect_frame<R: tokio::io::AsyncRead + Unpin>(reader: &mut FrameReader<R>) -> WireMessage {
    tokio::time::timeout(Duration::from_secs(10), reader.next_frame())
        .await
        .expect("timed out waiting for agent frame")
        .unwrap()
        .expect("agent closed the connection")
}

#[tokio::test]
async fn agent_registers_heartbeats_and_answers_exec_commands() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let agent = tokio::spawn(session::run(agent_config(port)));

    let (stream, _) = listener.accept().await.unwrap();
    let (rx, tx) = tokio::io::split(stream);
    let mut reader = FrameReader::new(rx);
    let mut writer = FrameWriter::new(tx);

    // registration comes first and carries the token
    let register = expect_frame(&mut reader).await;
    assert_eq!(register.msg_type, MessageType::Register);
    assert_eq!(register.agent_name, "tenant-1");
    let reg_data: RegisterData = register.decode_data().unwrap();
    assert_eq!(reg_data.token, "dlk_testtoken");

    writer
        .send(&WireMessage::new(MessageType::RegisterAck).with_status("success"))
        .await
        .unwrap();

    // heartbeats arrive on a 5s cadence
    let heartbeat = expect_frame(&mut reader).await;
    assert_eq!(heartbeat.msg_type, MessageType::Heartbeat);
    assert_eq!(heartbeat.status, "online");

    // remote terminal round trip
    writer
        .send(
            &WireMessage::new(MessageType::ExecCommand).with_data(&ExecCommandData {
                request_id: "req-42".into(),
                command: "echo datalink".into(),
                timeout: Some(10),
            }),
        )
        .await
        .unwrap();

    let result = loop {
        let frame = expect_frame(&mut reader).await;
        if frame.msg_type == MessageType::ExecCommandResult {
            break frame.decode_data::<ExecCommandResultData>().unwrap();
        }
        // heartbeats interleave freely with results
        assert_eq!(frame.msg_type, MessageType::Heartbeat);
    };

    assert_eq!(result.request_id, "req-42");
    assert!(result.success);
    assert!(result.output.contains("datalink"));

    agent.abort();
}

#[tokio::test]
async fn rejected_registration_is_fatal_without_retry() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let agent = tokio::spawn(session::run(agent_config(port)));

    let (stream, _) = listener.accept().await.unwrap();
    let (rx, tx) = tokio::io::split(stream);
    let mut reader = FrameReader::new(rx);
    let mut writer = FrameWriter::new(tx);

    let register = expect_frame(&mut reader).await;
    assert_eq!(register.msg_type, MessageType::Register);

    let mut reject = WireMessage::new(MessageType::RegisterAck).with_status("error");
    reject.data.insert(
        "error".into(),
        serde_json::Value::String("agent token is revoked or expired".into()),
    );
    writer.send(&reject).await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(10), agent)
        .await
        .expect("agent did not exit")
        .unwrap();
    let err = outcome.unwrap_err();
    assert!(err.to_string().contains("Registration rejected"));
}

#[tokio::test]
async fn lost_connection_triggers_reregistration() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let agent = tokio::spawn(session::run(agent_config(port)));

    // first session: ack, then drop the connection
    {
        let (stream, _) = listener.accept().await.unwrap();
        let (rx, tx) = tokio::io::split(stream);
        let mut reader = FrameReader::new(rx);
        let mut writer = FrameWriter::new(tx);

        let register = expect_frame(&mut reader).await;
        assert_eq!(register.msg_type, MessageType::Register);
        writer
            .send(&WireMessage::new(MessageType::RegisterAck).with_status("success"))
            .await
            .unwrap();
    }

    // the agent dials back with linear backoff and re-registers
    let (stream, _) = tokio::time::timeout(Duration::from_secs(10), listener.accept())
        .await
        .expect("agent never reconnected")
        .unwrap();
    let (rx, _tx) = tokio::io::split(stream);
    let mut reader = FrameReader::new(rx);
    let register = expect_frame(&mut reader).await;
    assert_eq!(register.msg_type, MessageType::Register);

    agent.abort();
}
