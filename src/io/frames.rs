//! Frame ingestion from the external detector+tracker boundary
//!
//! The detector and tracker live outside this system; they hand us one JSON
//! object per frame with the tracked objects still alive in that frame.
//! `JsonlFrameSource` reads that feed from a file or named pipe, one frame
//! per line.

use crate::domain::types::{BoundingBox, TrackId, TrackedObservation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::warn;

/// Wire format for one tracked object in a frame
#[derive(Debug, Deserialize)]
pub struct WireObject {
    pub track_id: i64,
    /// [x1, y1, x2, y2]
    pub bbox: [f64; 4],
    pub confidence: f64,
}

/// Wire format for one frame of tracker output
#[derive(Debug, Deserialize)]
pub struct WireFrame {
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub tracked_objects: Vec<WireObject>,
}

/// One decoded frame ready for the state machine
#[derive(Debug, Clone)]
pub struct Frame {
    pub captured_at: DateTime<Utc>,
    pub observations: Vec<TrackedObservation>,
}

impl From<WireFrame> for Frame {
    fn from(wire: WireFrame) -> Self {
        let observations = wire
            .tracked_objects
            .into_iter()
            .map(|o| TrackedObservation {
                track_id: TrackId(o.track_id),
                bbox: BoundingBox::new(o.bbox[0], o.bbox[1], o.bbox[2], o.bbox[3]),
                confidence: o.confidence,
                captured_at: wire.time,
            })
            .collect();
        Self { captured_at: wire.time, observations }
    }
}

/// Source of per-frame tracker output for one stream
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or None when the stream ends
    async fn next_frame(&mut self) -> Option<Frame>;
}

/// Reads frames from a JSONL file or named pipe
pub struct JsonlFrameSource {
    lines: Lines<BufReader<File>>,
    stream_id: String,
}

impl JsonlFrameSource {
    pub async fn open(path: &str, stream_id: &str) -> anyhow::Result<Self> {
        let file = File::open(path).await.map_err(|e| {
            anyhow::anyhow!("failed to open frames file {} for stream {}: {}", path, stream_id, e)
        })?;
        Ok(Self { lines: BufReader::new(file).lines(), stream_id: stream_id.to_string() })
    }
}

#[async_trait]
impl FrameSource for JsonlFrameSource {
    async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    warn!(stream_id = %self.stream_id, error = %e, "frame_read_failed");
                    return None;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<WireFrame>(&line) {
                Ok(wire) => return Some(wire.into()),
                Err(e) => {
                    // Malformed frames are skipped, not fatal to the stream
                    warn!(stream_id = %self.stream_id, error = %e, "frame_parse_failed");
                }
            }
        }
    }
}
