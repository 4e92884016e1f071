//! Newline-delimited JSON framing.
//!
//! Readers tolerate frames up to [`MAX_FRAME_BYTES`]; a single
//! `DATA_RESPONSE` can carry thousands of records. Oversized or
//! malformed frames are skipped without tearing down the session -
//! only a transport error ends the stream.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

use crate::{WireError, WireMessage};

/// Maximum size of one frame on the wire: 10 MiB.
pub const MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

/// Reads `\n`-terminated [`WireMessage`] frames from one half of a
/// connection.
pub struct FrameReader<R> {
    inner: FramedRead<R, LinesCodec>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(read_half: R) -> Self {
        Self {
            inner: FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_FRAME_BYTES)),
        }
    }

    /// Next well-formed frame. Malformed JSON and over-length lines are
    /// logged and skipped; `Ok(None)` means clean EOF.
    pub async fn next_frame(&mut self) -> Result<Option<WireMessage>, WireError> {
        loop {
            match self.inner.next().await {
                None => return Ok(None),
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    // the codec discards to the next newline and keeps
                    // going; only a transport error ends the session
                    tracing::warn!(max = MAX_FRAME_BYTES, "dropping oversized frame");
                    continue;
                }
                Some(Err(LinesCodecError::Io(e))) => return Err(WireError::Io(e)),
                Some(Ok(line)) => match serde_json::from_str::<WireMessage>(&line) {
                    Ok(msg) => return Ok(Some(msg)),
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping malformed frame");
                        continue;
                    }
                },
            }
        }
    }
}

/// Writes [`WireMessage`] frames to one half of a connection. Callers
/// must serialize access (one writer per session).
pub struct FrameWriter<W> {
    inner: FramedWrite<W, LinesCodec>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(write_half: W) -> Self {
        Self {
            inner: FramedWrite::new(write_half, LinesCodec::new()),
        }
    }

    pub async fn send(&mut self, msg: &WireMessage) -> Result<(), WireError> {
        let line = serde_json::to_string(msg)?;
        self.inner.send(line).await.map_err(|e| match e {
            LinesCodecError::Io(io) => WireError::Io(io),
            LinesCodecError::MaxLineLengthExceeded => WireError::FrameTooLarge,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageType;

    #[tokio::test]
    async fn frames_round_trip_over_a_duplex_pipe() {
        let (client, server) = tokio::io::duplex(64 * 1024);

        let mut writer = FrameWriter::new(client);
        let mut reader = FrameReader::new(server);

        let msg = WireMessage::new(MessageType::Register).with_agent("tenant-1");
        writer.send(&msg).await.unwrap();
        drop(writer);

        let got = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(got.msg_type, MessageType::Register);
        assert_eq!(got.agent_name, "tenant-1");
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped_not_fatal() {
        let (mut client, server) = tokio::io::duplex(4096);
        let (server_rx, _tx) = tokio::io::split(server);
        let mut reader = FrameReader::new(server_rx);

        use tokio::io::AsyncWriteExt;
        client.write_all(b"this is not json\n").await.unwrap();
        client
            .write_all(b"{\"type\":\"HEARTBEAT\",\"timestamp\":\"2025-01-01T00:00:00Z\"}\n")
            .await
            .unwrap();
        drop(client);

        let got = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(got.msg_type, MessageType::Heartbeat);
    }
}
