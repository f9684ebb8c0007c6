//! Per-stream processing loop
//!
//! Each stream runs one pipeline task that owns its frame source and its
//! ROI tracker; streams share nothing but the dispatch sender. Frames are
//! processed strictly in arrival order, so per-stream state never needs a
//! lock.

use crate::domain::region::Region;
use crate::domain::types::{ActionType, TrackedObservation};
use crate::infra::Metrics;
use crate::io::{EventSender, FrameSource};
use crate::services::event_builder::EventBuilder;
use crate::services::roi_tracker::{RegionTransition, RoiTracker};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant};
use tracing::{info, warn};

const PROGRESS_EVERY: u64 = 100;

pub struct StreamPipeline<S: FrameSource> {
    stream_id: String,
    source: S,
    regions: Vec<Region>,
    tracker: RoiTracker,
    builder: EventBuilder,
    sender: EventSender,
    metrics: Arc<Metrics>,
    heartbeat: Duration,
    frames: u64,
}

impl<S: FrameSource> StreamPipeline<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stream_id: &str,
        source: S,
        regions: Vec<Region>,
        min_hits: u32,
        max_age: u32,
        confidence_threshold: f64,
        sender: EventSender,
        metrics: Arc<Metrics>,
        heartbeat: Duration,
    ) -> Self {
        let tracker = RoiTracker::new(regions.clone(), min_hits, max_age, confidence_threshold);
        Self {
            stream_id: stream_id.to_string(),
            source,
            regions,
            tracker,
            builder: EventBuilder::new(),
            sender,
            metrics,
            heartbeat,
            frames: 0,
        }
    }

    /// Consume frames until the source ends or shutdown is signalled, then
    /// flush every open interaction as a terminal event.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            stream_id = %self.stream_id,
            regions = self.regions.len(),
            "stream_pipeline_started"
        );
        let mut heartbeat = interval_at(Instant::now() + self.heartbeat, self.heartbeat);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(stream_id = %self.stream_id, "stream_shutdown_requested");
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    info!(
                        stream_id = %self.stream_id,
                        frames = self.frames,
                        active_tracks = self.tracker.active_tracks(),
                        "stream_heartbeat"
                    );
                }
                frame = self.source.next_frame() => {
                    match frame {
                        Some(frame) => self.process_frame_observations(&frame.observations),
                        None => {
                            info!(stream_id = %self.stream_id, frames = self.frames, "stream_ended");
                            break;
                        }
                    }
                }
            }
        }

        self.flush();
    }

    fn process_frame_observations(&mut self, observations: &[TrackedObservation]) {
        self.frames += 1;
        self.metrics.record_frame(observations.len() as u64);

        let transitions = self.tracker.observe_frame(observations);
        for transition in &transitions {
            self.emit(transition);
        }

        if self.frames % PROGRESS_EVERY == 0 {
            info!(
                stream_id = %self.stream_id,
                frames = self.frames,
                active_tracks = self.tracker.active_tracks(),
                "stream_progress"
            );
        }
    }

    fn emit(&self, transition: &RegionTransition) {
        let region = match self.regions.get(transition.region_index) {
            Some(region) => region,
            None => {
                warn!(
                    stream_id = %self.stream_id,
                    region_index = transition.region_index,
                    "unknown_region_index"
                );
                return;
            }
        };
        let event = self.builder.build(transition, region);
        match event.action_type {
            ActionType::Entered => self.metrics.record_entered(),
            ActionType::Passed => self.metrics.record_passed(),
        }
        info!(
            stream_id = %self.stream_id,
            track_id = %event.track_id,
            region_id = %event.region_id,
            action = event.action_type.as_str(),
            dwell = event.dwell_time_seconds,
            "movement_event"
        );
        self.sender.send(event);
    }

    /// Force-close open interactions and hand them to the dispatcher
    fn flush(&mut self) {
        let transitions = self.tracker.close_all(Utc::now());
        let flushed = transitions.len();
        for transition in &transitions {
            self.emit(transition);
        }
        if flushed > 0 {
            info!(stream_id = %self.stream_id, flushed, "stream_flushed_open_states");
        }
    }
}
