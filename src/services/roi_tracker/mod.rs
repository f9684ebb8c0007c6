//! Per-track, per-region interaction state machine
//!
//! Converts noisy, intermittent per-frame observations into clean terminal
//! transitions. Each (track, region) pair advances through an explicit
//! tagged phase:
//!
//! - `Tracking`: track observed, no region contact yet
//! - `Candidate`: geometry test passed, waiting for `min_hits` consecutive
//!   confirming frames to suppress single-frame jitter
//! - `InRegion`: entry confirmed
//!
//! Terminal outcomes are returned to the caller, never dispatched from here:
//! a Candidate that leaves (or is lost) before confirming becomes `Passed`;
//! a confirmed presence that leaves or is lost for more than `max_age`
//! frames becomes `Entered` with its dwell interval. A track that never
//! reached Candidate is discarded silently.
//!
//! All timestamps are observation capture times; the state machine never
//! reads the wall clock.


use crate::domain::geometry::Point;
use crate::domain::region::{Region, RegionKind};
use crate::domain::types::{ActionType, TrackId, TrackedObservation};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use tracing::debug;

/// One terminal outcome for one (track, region) lifecycle
#[derive(Debug, Clone, PartialEq)]
pub struct RegionTransition {
    pub region_index: usize,
    pub track_id: TrackId,
    pub action: ActionType,
    pub enter_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub confidence_avg: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Tracking,
    Candidate,
    InRegion,
}

/// State for one (track, region) pair. Reset to a fresh lifecycle after a
/// terminal transition - a lifecycle never re-enters an earlier phase.
#[derive(Debug)]
struct RegionInteraction {
    phase: Phase,
    /// Capture time of the first Candidate frame
    entered_at: Option<DateTime<Utc>>,
    /// Capture time of the last frame the track tested inside
    last_inside_at: Option<DateTime<Utc>>,
    consecutive_hits: u32,
    frames_outside: u32,
    /// For lines: the side of the line that counts as inside after crossing
    dest_side: i8,
}

impl RegionInteraction {
    fn new() -> Self {
        Self {
            phase: Phase::Tracking,
            entered_at: None,
            last_inside_at: None,
            consecutive_hits: 0,
            frames_outside: 0,
            dest_side: 0,
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Per-track bookkeeping shared across that track's region interactions
struct TrackState {
    last_seen: DateTime<Utc>,
    last_center: Option<Point>,
    confidence_sum: f64,
    confidence_count: u64,
    frames_since_seen: u32,
    /// Indexed by region index
    interactions: Vec<RegionInteraction>,
}

impl TrackState {
    fn new(first_seen: DateTime<Utc>, region_count: usize) -> Self {
        Self {
            last_seen: first_seen,
            last_center: None,
            confidence_sum: 0.0,
            confidence_count: 0,
            frames_since_seen: 0,
            interactions: (0..region_count).map(|_| RegionInteraction::new()).collect(),
        }
    }

    fn confidence_avg(&self) -> Option<f64> {
        if self.confidence_count == 0 {
            None
        } else {
            Some(self.confidence_sum / self.confidence_count as f64)
        }
    }
}

/// ROI interaction state machine for one stream's regions
pub struct RoiTracker {
    regions: Vec<Region>,
    tracks: FxHashMap<TrackId, TrackState>,
    min_hits: u32,
    max_age: u32,
    confidence_threshold: f64,
}

impl RoiTracker {
    pub fn new(regions: Vec<Region>, min_hits: u32, max_age: u32, confidence_threshold: f64) -> Self {
        Self { regions, tracks: FxHashMap::default(), min_hits, max_age, confidence_threshold }
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Process one frame's observations. Returns the terminal transitions
    /// this frame produced, in deterministic order.
    pub fn observe_frame(&mut self, observations: &[TrackedObservation]) -> Vec<RegionTransition> {
        let mut transitions = Vec::new();
        let mut seen: Vec<TrackId> = Vec::with_capacity(observations.len());

        for obs in observations {
            if obs.confidence < self.confidence_threshold {
                continue;
            }
            seen.push(obs.track_id);
            self.observe_track(obs, &mut transitions);
        }

        self.sweep_absent(&seen, &mut transitions);
        transitions
    }

    fn observe_track(&mut self, obs: &TrackedObservation, out: &mut Vec<RegionTransition>) {
        let ts = obs.captured_at;
        let center = obs.bbox.center();
        let state = self
            .tracks
            .entry(obs.track_id)
            .or_insert_with(|| TrackState::new(ts, self.regions.len()));

        let prev_center = state.last_center;
        state.frames_since_seen = 0;
        state.last_seen = ts;
        state.last_center = Some(center);
        state.confidence_sum += obs.confidence;
        state.confidence_count += 1;
        let confidence_avg = state.confidence_avg();

        for (idx, region) in self.regions.iter().enumerate() {
            let inter = &mut state.interactions[idx];
            let hit = region_hit(region, inter, prev_center, center);

            if hit {
                inter.frames_outside = 0;
                inter.last_inside_at = Some(ts);
                match inter.phase {
                    Phase::Tracking => {
                        inter.phase = Phase::Candidate;
                        inter.entered_at = Some(ts);
                        inter.consecutive_hits = 1;
                        debug!(track_id = %obs.track_id, region = %region.id, "roi_candidate");
                        if inter.consecutive_hits >= self.min_hits {
                            inter.phase = Phase::InRegion;
                        }
                    }
                    Phase::Candidate => {
                        inter.consecutive_hits += 1;
                        if inter.consecutive_hits >= self.min_hits {
                            inter.phase = Phase::InRegion;
                            debug!(track_id = %obs.track_id, region = %region.id, "roi_confirmed");
                        }
                    }
                    Phase::InRegion => {}
                }
            } else {
                match inter.phase {
                    Phase::Tracking => {}
                    Phase::Candidate => {
                        // Left before min_hits: brief contact only
                        out.push(RegionTransition {
                            region_index: idx,
                            track_id: obs.track_id,
                            action: ActionType::Passed,
                            enter_time: inter.entered_at.unwrap_or(ts),
                            exit_time: ts,
                            confidence_avg,
                        });
                        inter.reset();
                    }
                    Phase::InRegion => {
                        inter.frames_outside += 1;
                        if inter.frames_outside > self.max_age {
                            out.push(RegionTransition {
                                region_index: idx,
                                track_id: obs.track_id,
                                action: ActionType::Entered,
                                enter_time: inter.entered_at.unwrap_or(ts),
                                exit_time: inter.last_inside_at.unwrap_or(ts),
                                confidence_avg,
                            });
                            inter.reset();
                        }
                    }
                }
            }
        }
    }

    /// Age out tracks absent from this frame. A track unseen for more than
    /// `max_age` frames is finalized: open interactions become terminal
    /// events, never-candidate ones disappear silently.
    fn sweep_absent(&mut self, seen: &[TrackId], out: &mut Vec<RegionTransition>) {
        let mut expired: Vec<TrackId> = Vec::new();
        for (&track_id, state) in self.tracks.iter_mut() {
            if seen.contains(&track_id) {
                continue;
            }
            state.frames_since_seen += 1;
            if state.frames_since_seen > self.max_age {
                expired.push(track_id);
            }
        }
        expired.sort_unstable_by_key(|t| t.0);

        for track_id in expired {
            let state = match self.tracks.remove(&track_id) {
                Some(state) => state,
                None => continue,
            };
            let confidence_avg = state.confidence_avg();
            for (idx, inter) in state.interactions.iter().enumerate() {
                let action = match inter.phase {
                    Phase::Tracking => continue,
                    Phase::Candidate => ActionType::Passed,
                    Phase::InRegion => ActionType::Entered,
                };
                out.push(RegionTransition {
                    region_index: idx,
                    track_id,
                    action,
                    enter_time: inter.entered_at.unwrap_or(state.last_seen),
                    exit_time: state.last_seen,
                    confidence_avg,
                });
            }
            debug!(track_id = %track_id, "track_expired");
        }
    }

    /// Force every open interaction to its terminal transition. Used on
    /// shutdown; confirmed presences close at `now`, unconfirmed candidates
    /// close at their last observation.
    pub fn close_all(&mut self, now: DateTime<Utc>) -> Vec<RegionTransition> {
        let mut out = Vec::new();
        let mut track_ids: Vec<TrackId> = self.tracks.keys().copied().collect();
        track_ids.sort_unstable_by_key(|t| t.0);

        for track_id in track_ids {
            let state = match self.tracks.remove(&track_id) {
                Some(state) => state,
                None => continue,
            };
            let confidence_avg = state.confidence_avg();
            for (idx, inter) in state.interactions.iter().enumerate() {
                match inter.phase {
                    Phase::Tracking => {}
                    Phase::Candidate => out.push(RegionTransition {
                        region_index: idx,
                        track_id,
                        action: ActionType::Passed,
                        enter_time: inter.entered_at.unwrap_or(state.last_seen),
                        exit_time: state.last_seen,
                        confidence_avg,
                    }),
                    Phase::InRegion => out.push(RegionTransition {
                        region_index: idx,
                        track_id,
                        action: ActionType::Entered,
                        enter_time: inter.entered_at.unwrap_or(state.last_seen),
                        exit_time: now,
                        confidence_avg,
                    }),
                }
            }
        }
        out
    }
}

/// Geometry test for one frame. Zones use containment; lines count as
/// "inside" once crossed in the configured direction, for as long as the
/// track stays on the far side.
fn region_hit(
    region: &Region,
    inter: &mut RegionInteraction,
    prev_center: Option<Point>,
    center: Point,
) -> bool {
    match &region.kind {
        RegionKind::Zone { .. } => region.contains(center),
        RegionKind::Line { .. } => match inter.phase {
            Phase::Tracking => {
                if let Some(side) = region.crossed(prev_center, center) {
                    inter.dest_side = side;
                    true
                } else {
                    false
                }
            }
            _ => region.line_side(center) == Some(inter.dest_side),
        },
    }
}
