//! Wire protocol shared by the datalink master and agent.
//!
//! One frame is one JSON-encoded [`WireMessage`] followed by `\n`. The
//! envelope keys are fixed (`type`, `agent_name`, `status`, `timestamp`,
//! `data`); everything type-specific lives inside `data` and is decoded
//! once at the receiving boundary into the typed payload structs.

pub mod framing;
pub mod message;
pub mod record;
pub mod source;

pub use framing::{FrameReader, FrameWriter, MAX_FRAME_BYTES};
pub use message::{
    DataResponseData, ExecCommandData, ExecCommandResultData, MessageType, RegisterData,
    TestConnectionResultData, WireMessage,
};
pub use record::{sample_records, Record, BATCH_SIZE, SAMPLE_SIZE};
pub use source::{
    ApiConfig, DbConfig, FileConfig, FtpConfig, MongoConfig, RedisConfig, RunJobData, SourceConfig,
};

/// Errors produced while encoding, decoding, or framing wire messages.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame exceeds {MAX_FRAME_BYTES} bytes")]
    FrameTooLarge,

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("connection closed")]
    Closed,
}
