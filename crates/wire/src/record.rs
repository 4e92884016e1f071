//! Dynamic record batches.
//!
//! Records stay `map<String, Value>` at exactly two seams: adapter output
//! on the agent and sink input on the master. Nothing else handles them
//! untyped.

use serde_json::{Map, Value};

/// One extracted row, keyed by column/field name.
pub type Record = Map<String, Value>;

/// Fixed batch size across every source adapter. One `DATA_RESPONSE`
/// frame carries at most this many records.
pub const BATCH_SIZE: usize = 5000;

/// How many records of the first non-empty batch are kept as the
/// JobLog sample.
pub const SAMPLE_SIZE: usize = 5;

/// Serialize the first [`SAMPLE_SIZE`] records for JobLog display.
/// Returns `None` for an empty batch.
pub fn sample_records(records: &[Record]) -> Option<String> {
    if records.is_empty() {
        return None;
    }
    let sample: Vec<&Record> = records.iter().take(SAMPLE_SIZE).collect();
    serde_json::to_string(&sample).ok()
}

/// Split records into wire batches. Used by adapters that materialize a
/// full result set before streaming (Mongo, Redis, files, HTTP).
pub fn chunk_batches(records: Vec<Record>) -> Vec<Vec<Record>> {
    if records.is_empty() {
        return Vec::new();
    }
    let mut chunks = Vec::with_capacity(records.len().div_ceil(BATCH_SIZE));
    let mut rest = records;
    while rest.len() > BATCH_SIZE {
        let tail = rest.split_off(BATCH_SIZE);
        chunks.push(rest);
        rest = tail;
    }
    chunks.push(rest);
    chunks
}

/// Best-effort map coercion for values arriving as `Value`.
pub fn as_record(value: Value) -> Option<Record> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(n: i64) -> Record {
        let mut m = Map::new();
        m.insert("id".into(), json!(n));
        m
    }

    #[test]
    fn sample_is_capped_at_five() {
        let records: Vec<Record> = (0..12).map(rec).collect();
        let sample = sample_records(&records).unwrap();
        let parsed: Vec<Record> = serde_json::from_str(&sample).unwrap();
        assert_eq!(parsed.len(), SAMPLE_SIZE);
        assert_eq!(parsed[0]["id"], json!(0));
    }

    #[test]
    fn empty_batch_has_no_sample() {
        assert!(sample_records(&[]).is_none());
    }

    #[test]
    fn chunking_at_exact_batch_multiples() {
        let chunks = chunk_batches((0..(2 * BATCH_SIZE as i64)).map(rec).collect());
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == BATCH_SIZE));

        let chunks = chunk_batches((0..(BATCH_SIZE as i64 + 1)).map(rec).collect());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].len(), 1);

        assert!(chunk_batches(Vec::new()).is_empty());
    }
}
