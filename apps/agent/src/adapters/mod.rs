//! Source adapters behind the uniform `run(config, emitter)` contract.
//!
//! Every adapter delivers batches of at most [`BATCH_SIZE`] records
//! through the [`BatchEmitter`], then returns once the source is
//! exhausted. The session layer sends the terminal frame.

pub mod database;
pub mod ftp;
pub mod http;
pub mod mongo;
pub mod redis;
pub mod sftp;

use tokio::sync::mpsc;
use tracing::info;

use datalink_wire::{
    record::chunk_batches, DataResponseData, MessageType, Record, SourceConfig, WireMessage,
    BATCH_SIZE,
};

use crate::error::{AgentError, AgentResult};

/// Streams partial DATA_RESPONSE frames for one running job. All frames
/// funnel into the session's writer task, so emission order is wire
/// order.
pub struct BatchEmitter {
    outbound: mpsc::Sender<WireMessage>,
    agent_name: String,
    job_id: i64,
    log_id: i64,
}

impl BatchEmitter {
    pub fn new(
        outbound: mpsc::Sender<WireMessage>,
        agent_name: String,
        job_id: i64,
        log_id: i64,
    ) -> Self {
        Self {
            outbound,
            agent_name,
            job_id,
            log_id,
        }
    }

    /// Send one batch as a partial frame. Batches above [`BATCH_SIZE`]
    /// are split before sending.
    pub async fn emit(&self, records: Vec<Record>) -> AgentResult<()> {
        for chunk in chunk_batches(records) {
            let count = chunk.len() as i64;
            info!(
                job_id = self.job_id,
                log_id = self.log_id,
                batch = count,
                "sending partial batch"
            );
            self.send(chunk, count, String::new(), true).await?;
        }
        Ok(())
    }

    /// Terminal success frame: `partial=false`, no records.
    pub async fn finish(&self) -> AgentResult<()> {
        self.send(Vec::new(), 0, String::new(), false).await
    }

    /// Terminal error frame.
    pub async fn fail(&self, error: String) -> AgentResult<()> {
        self.send(Vec::new(), 0, error, false).await
    }

    async fn send(
        &self,
        records: Vec<Record>,
        record_count: i64,
        error: String,
        partial: bool,
    ) -> AgentResult<()> {
        let status = if !error.is_empty() {
            "failed"
        } else if partial {
            "running"
        } else {
            "completed"
        };

        let msg = WireMessage::new(MessageType::DataResponse)
            .with_agent(self.agent_name.clone())
            .with_status(status)
            .with_data(&DataResponseData {
                job_id: self.job_id,
                log_id: self.log_id,
                status: status.to_string(),
                record_count,
                records,
                error,
                partial,
            });

        self.outbound
            .send(msg)
            .await
            .map_err(|_| AgentError::SessionClosed)
    }
}

/// Execute one extraction against the decoded source variant.
pub async fn run(source: SourceConfig, emitter: &BatchEmitter) -> AgentResult<()> {
    match source {
        SourceConfig::Database { db, query } => database::run(&db, &query, emitter).await,
        SourceConfig::Mongo { mongo, filter } => mongo::run(&mongo, &filter, emitter).await,
        SourceConfig::Redis(redis) => redis::run(&redis, emitter).await,
        SourceConfig::Ftp { ftp, file } => ftp::run(&ftp, &file, emitter).await,
        SourceConfig::Sftp { ftp, file } => sftp::run(&ftp, &file, emitter).await,
        SourceConfig::Api(api) => http::run(&api, emitter).await,
    }
}

/// Minimal glob: `*` matches any run, `?` matches one character. Used
/// to pick a file out of a remote directory listing.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    fn matches(p: &[u8], n: &[u8]) -> bool {
        match (p.first(), n.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                matches(&p[1..], n) || (!n.is_empty() && matches(p, &n[1..]))
            }
            (Some(b'?'), Some(_)) => matches(&p[1..], &n[1..]),
            (Some(a), Some(b)) if a == b => matches(&p[1..], &n[1..]),
            _ => false,
        }
    }
    matches(pattern.as_bytes(), name.as_bytes())
}

/// Whether a file pattern needs a directory listing at all.
pub fn has_wildcard(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(n: i64) -> Record {
        let mut m = Record::new();
        m.insert("id".into(), json!(n));
        m
    }

    async fn collect_frames(
        records: Vec<Record>,
    ) -> Vec<DataResponseData> {
        let (tx, mut rx) = mpsc::channel(64);
        let emitter = BatchEmitter::new(tx, "tenant-1".into(), 1, 2);
        emitter.emit(records).await.unwrap();
        emitter.finish().await.unwrap();
        drop(emitter);

        let mut frames = Vec::new();
        while let Some(msg) = rx.recv().await {
            frames.push(msg.decode_data().unwrap());
        }
        frames
    }

    #[tokio::test]
    async fn zero_records_yield_exactly_one_terminal_frame() {
        let frames = collect_frames(Vec::new()).await;
        assert_eq!(frames.len(), 1);
        assert!(!frames[0].partial);
        assert_eq!(frames[0].record_count, 0);
    }

    #[tokio::test]
    async fn exact_batch_multiple_yields_n_partials_plus_terminal() {
        let frames = collect_frames((0..(2 * BATCH_SIZE as i64)).map(record).collect()).await;
        assert_eq!(frames.len(), 3);
        assert!(frames[0].partial && frames[1].partial && !frames[2].partial);
        assert_eq!(frames[0].record_count, BATCH_SIZE as i64);
        assert_eq!(frames[1].record_count, BATCH_SIZE as i64);
        assert_eq!(frames[2].record_count, 0);
    }

    #[tokio::test]
    async fn twelve_and_a_half_thousand_rows_stream_as_specified() {
        let frames = collect_frames((0..12_500).map(record).collect()).await;
        let counts: Vec<i64> = frames.iter().map(|f| f.record_count).collect();
        assert_eq!(counts, vec![5000, 5000, 2500, 0]);
        assert_eq!(frames.iter().filter(|f| f.partial).count(), 3);
    }

    #[test]
    fn glob_matching() {
        assert!(glob_match("*.csv", "report.csv"));
        assert!(glob_match("data_?.txt", "data_1.txt"));
        assert!(!glob_match("*.csv", "report.xlsx"));
        assert!(glob_match("*", "anything"));
        assert!(!glob_match("data_?.txt", "data_12.txt"));

        assert!(has_wildcard("*.csv"));
        assert!(!has_wildcard("exact.csv"));
    }
}
