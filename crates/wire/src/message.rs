//! The message envelope and typed `data` payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Every frame type exchanged between master and agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Register,
    RegisterAck,
    Heartbeat,
    RunJob,
    DataResponse,
    TestConnection,
    TestConnectionResult,
    ExecCommand,
    ExecCommandResult,
    ConfigPull,
    ConfigResponse,
    Command,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "REGISTER",
            Self::RegisterAck => "REGISTER_ACK",
            Self::Heartbeat => "HEARTBEAT",
            Self::RunJob => "RUN_JOB",
            Self::DataResponse => "DATA_RESPONSE",
            Self::TestConnection => "TEST_CONNECTION",
            Self::TestConnectionResult => "TEST_CONNECTION_RESULT",
            Self::ExecCommand => "EXEC_COMMAND",
            Self::ExecCommandResult => "EXEC_COMMAND_RESULT",
            Self::ConfigPull => "CONFIG_PULL",
            Self::ConfigResponse => "CONFIG_RESPONSE",
            Self::Command => "COMMAND",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The wire envelope. JSON keys are fixed; `data` carries the
/// type-specific payload as a raw map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub status: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl WireMessage {
    /// Build a message stamped with the current time.
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            agent_name: String::new(),
            status: String::new(),
            timestamp: Utc::now(),
            data: Map::new(),
        }
    }

    pub fn with_agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = agent_name.into();
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Serialize `payload` into the `data` map. Panics only on
    /// non-object payloads, which the typed payloads below never are.
    pub fn with_data<T: Serialize>(mut self, payload: &T) -> Self {
        if let Ok(Value::Object(map)) = serde_json::to_value(payload) {
            self.data = map;
        }
        self
    }

    /// Decode the `data` map into a typed payload.
    pub fn decode_data<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.data.clone()))
    }
}

/// `REGISTER` payload sent by the agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterData {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub sync_enabled: bool,
    /// Bearer token issued from the master console; empty when the
    /// master runs without token enforcement.
    #[serde(default)]
    pub token: String,
}

/// `DATA_RESPONSE` payload streamed by the agent while a job runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataResponseData {
    pub job_id: i64,
    pub log_id: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub record_count: i64,
    #[serde(default)]
    pub records: Vec<super::Record>,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub partial: bool,
}

/// `EXEC_COMMAND` payload (master → agent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecCommandData {
    pub request_id: String,
    pub command: String,
    /// Seconds; the agent falls back to 30 when absent.
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// `EXEC_COMMAND_RESULT` payload (agent → master).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecCommandResultData {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub output: String,
    pub exit_code: i32,
    pub duration_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `TEST_CONNECTION_RESULT` payload (agent → master).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestConnectionResultData {
    pub request_id: String,
    pub success: bool,
    pub duration_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_keys_are_bit_exact() {
        let msg = WireMessage::new(MessageType::Heartbeat)
            .with_agent("tenant-1")
            .with_status("online");
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "HEARTBEAT");
        assert_eq!(json["agent_name"], "tenant-1");
        assert_eq!(json["status"], "online");
        assert!(json["timestamp"].is_string());
        // empty data is omitted entirely
        assert!(json.get("data").is_none());
    }

    #[test]
    fn parse_then_serialize_preserves_identity_fields() {
        let raw = r#"{"type":"DATA_RESPONSE","agent_name":"edge-7","status":"running","timestamp":"2025-01-01T09:00:00Z","data":{"job_id":3,"log_id":9,"partial":true}}"#;
        let msg: WireMessage = serde_json::from_str(raw).unwrap();
        let round: WireMessage =
            serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();

        assert_eq!(round.msg_type, MessageType::DataResponse);
        assert_eq!(round.agent_name, "edge-7");
        assert_eq!(round.timestamp, msg.timestamp);

        let data: DataResponseData = round.decode_data().unwrap();
        assert_eq!(data.job_id, 3);
        assert_eq!(data.log_id, 9);
        assert!(data.partial);
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let raw = r#"{"type":"SELF_DESTRUCT","timestamp":"2025-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<WireMessage>(raw).is_err());
    }
}
