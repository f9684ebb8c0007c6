//! KPI aggregation
//!
//! Pure window math: one call computes the seven operational metrics for one
//! (branch, window) from the movement events in that window plus trailing
//! per-window visitor counts. No clock, no IO, no config lookup beyond the
//! coefficients passed in, so recomputing a window with the same inputs is
//! bit-identical.
//!
//! Metrics are `None` when the inputs cannot support them (no trailing
//! history, zero capacity, zero required staff). A window with zero events is
//! valid data, not an error: conversion and congestion report 0.

use crate::domain::event::{Branch, KpiSnapshot, MovementEvent};
use crate::domain::types::ActionType;
use crate::infra::config::KpiConfig;
use chrono::{DateTime, Utc};

/// Compute one branch's snapshot for `[window_start, window_end)`.
///
/// `events` are the branch's movement events with `enter_time` inside the
/// window. `history` holds trailing per-window visitor counts in
/// chronological order (oldest first, current window excluded); the baseline
/// and momentum lookbacks are cut from its tail.
pub fn compute_snapshot(
    branch: &Branch,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    events: &[MovementEvent],
    history: &[u64],
    kpi: &KpiConfig,
) -> KpiSnapshot {
    let entered = events.iter().filter(|e| e.action_type == ActionType::Entered).count() as f64;
    let passed = events.iter().filter(|e| e.action_type == ActionType::Passed).count() as f64;
    let visitors = entered as u64;

    let traffic_index = baseline_mean(history, kpi.baseline_periods as usize)
        .filter(|mean| *mean > 0.0)
        .map(|mean| entered / mean);

    let conversion_proxy =
        if entered + passed == 0.0 { Some(0.0) } else { Some(entered / (entered + passed)) };

    // Occupancy sampled at the window midpoint: events whose [enter, exit)
    // interval covers it. Open events (no exit yet) count.
    let midpoint = window_start + (window_end - window_start) / 2;
    let occupancy = events
        .iter()
        .filter(|e| {
            e.action_type == ActionType::Entered
                && e.enter_time <= midpoint
                && e.exit_time.map_or(true, |exit| exit > midpoint)
        })
        .count() as f64;

    let capacity = branch.capacity as f64;
    let congestion_level = if capacity > 0.0 { Some(occupancy / capacity) } else { None };
    let utilization_ratio = if capacity > 0.0 { Some(entered / capacity) } else { None };

    let growth_momentum = momentum_slope(history, visitors, kpi.momentum_windows as usize);

    let staffing_adequacy_index = if branch.required_staff > 0 {
        Some(branch.staff_on_duty as f64 / branch.required_staff as f64)
    } else {
        None
    };

    // Monotonic load indicator. Unknown congestion contributes nothing;
    // unknown adequacy counts as neutral 0.5.
    let bottleneck_score = Some(
        kpi.congestion_weight * congestion_level.unwrap_or(0.0)
            + kpi.staffing_weight * (1.0 - staffing_adequacy_index.unwrap_or(0.5)),
    );

    KpiSnapshot {
        branch_id: branch.id.clone(),
        window_start,
        window_end,
        traffic_index,
        conversion_proxy,
        congestion_level,
        growth_momentum,
        utilization_ratio,
        staffing_adequacy_index,
        bottleneck_score,
    }
}

/// Mean of the trailing `periods` visitor counts, None with no history
fn baseline_mean(history: &[u64], periods: usize) -> Option<f64> {
    if history.is_empty() || periods == 0 {
        return None;
    }
    let tail = &history[history.len().saturating_sub(periods)..];
    Some(tail.iter().sum::<u64>() as f64 / tail.len() as f64)
}

/// Least-squares slope of visitor counts over the last `windows` windows,
/// current window included. None with fewer than two points.
fn momentum_slope(history: &[u64], current: u64, windows: usize) -> Option<f64> {
    if windows < 2 {
        return None;
    }
    let tail = &history[history.len().saturating_sub(windows - 1)..];
    let n = tail.len() + 1;
    if n < 2 {
        return None;
    }
    let series = tail.iter().copied().chain(std::iter::once(current));

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;
    for (i, y) in series.enumerate() {
        let x = i as f64;
        let y = y as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }
    let n = n as f64;
    let denom = n * sum_xx - sum_x * sum_x;
    if denom == 0.0 {
        return None;
    }
    Some((n * sum_xy - sum_x * sum_y) / denom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::TrackId;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn branch(capacity: u32, staff: u32, required: u32) -> Branch {
        Branch {
            id: "branch-1".to_string(),
            name: "Downtown".to_string(),
            capacity,
            staff_on_duty: staff,
            required_staff: required,
        }
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2026, 2, 8, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 8, 11, 0, 0).unwrap(),
        )
    }

    fn event(action: ActionType, enter_min: u32, exit_min: Option<u32>) -> MovementEvent {
        let enter = Utc.with_ymd_and_hms(2026, 2, 8, 10, enter_min, 0).unwrap();
        MovementEvent {
            event_id: Uuid::now_v7(),
            customer_id: Uuid::now_v7(),
            branch_id: "branch-1".to_string(),
            region_id: "roi_1".to_string(),
            camera_id: "cam_1".to_string(),
            action_type: action,
            enter_time: enter,
            exit_time: exit_min.map(|m| Utc.with_ymd_and_hms(2026, 2, 8, 10, m, 0).unwrap()),
            dwell_time_seconds: None,
            confidence_avg: None,
            track_id: TrackId(1),
        }
    }

    #[test]
    fn zero_events_is_valid_data() {
        let (start, end) = window();
        let snap =
            compute_snapshot(&branch(100, 2, 3), start, end, &[], &[], &KpiConfig::default());

        assert_eq!(snap.conversion_proxy, Some(0.0));
        assert_eq!(snap.congestion_level, Some(0.0));
        assert_eq!(snap.utilization_ratio, Some(0.0));
        assert_eq!(snap.traffic_index, None);
        assert_eq!(snap.growth_momentum, None);
    }

    #[test]
    fn conversion_counts_only_entered_in_numerator() {
        let (start, end) = window();
        let events = vec![
            event(ActionType::Entered, 5, Some(10)),
            event(ActionType::Passed, 6, None),
            event(ActionType::Passed, 7, None),
            event(ActionType::Passed, 8, None),
        ];
        let snap =
            compute_snapshot(&branch(100, 2, 3), start, end, &events, &[], &KpiConfig::default());
        assert_eq!(snap.conversion_proxy, Some(0.25));
    }

    #[test]
    fn utilization_exceeds_one_when_over_capacity() {
        let (start, end) = window();
        let events: Vec<_> =
            (0..120).map(|i| event(ActionType::Entered, i % 60, Some(59))).collect();
        let snap =
            compute_snapshot(&branch(100, 2, 3), start, end, &events, &[], &KpiConfig::default());
        assert_eq!(snap.utilization_ratio, Some(1.2));
    }

    #[test]
    fn occupancy_samples_the_window_midpoint() {
        let (start, end) = window();
        // Midpoint is 10:30. Covering: enters 10:05 exits 10:45; open event
        // entered 10:20. Not covering: exited 10:10; entered 10:40.
        let events = vec![
            event(ActionType::Entered, 5, Some(45)),
            event(ActionType::Entered, 20, None),
            event(ActionType::Entered, 5, Some(10)),
            event(ActionType::Entered, 40, Some(50)),
            event(ActionType::Passed, 29, None),
        ];
        let snap =
            compute_snapshot(&branch(10, 2, 3), start, end, &events, &[], &KpiConfig::default());
        assert_eq!(snap.congestion_level, Some(0.2));
    }

    #[test]
    fn congestion_is_unclamped_and_none_without_capacity() {
        let (start, end) = window();
        let events: Vec<_> = (0..6).map(|_| event(ActionType::Entered, 5, Some(55))).collect();
        let snap =
            compute_snapshot(&branch(4, 2, 3), start, end, &events, &[], &KpiConfig::default());
        assert_eq!(snap.congestion_level, Some(1.5));

        let snap =
            compute_snapshot(&branch(0, 2, 3), start, end, &events, &[], &KpiConfig::default());
        assert_eq!(snap.congestion_level, None);
        assert_eq!(snap.utilization_ratio, None);
    }

    #[test]
    fn traffic_index_against_baseline_mean() {
        let (start, end) = window();
        let events: Vec<_> = (0..8).map(|_| event(ActionType::Entered, 5, Some(55))).collect();
        let history = vec![4, 4, 4, 4];
        let snap = compute_snapshot(
            &branch(100, 2, 3),
            start,
            end,
            &events,
            &history,
            &KpiConfig::default(),
        );
        assert_eq!(snap.traffic_index, Some(2.0));
    }

    #[test]
    fn momentum_is_the_least_squares_slope() {
        let (start, end) = window();
        // History 2, 4, 6 and current 8: perfectly linear, slope 2
        let events: Vec<_> = (0..8).map(|_| event(ActionType::Entered, 5, Some(55))).collect();
        let snap = compute_snapshot(
            &branch(100, 2, 3),
            start,
            end,
            &events,
            &[2, 4, 6],
            &KpiConfig::default(),
        );
        assert!((snap.growth_momentum.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn staffing_and_bottleneck() {
        let (start, end) = window();
        let kpi = KpiConfig::default();
        let snap = compute_snapshot(&branch(10, 2, 4), start, end, &[], &[], &kpi);
        assert_eq!(snap.staffing_adequacy_index, Some(0.5));
        // congestion 0, adequacy 0.5: 0.6*0 + 0.4*0.5
        assert!((snap.bottleneck_score.unwrap() - 0.2).abs() < 1e-12);

        // Unknown adequacy counts as neutral 0.5
        let snap = compute_snapshot(&branch(10, 2, 0), start, end, &[], &[], &kpi);
        assert_eq!(snap.staffing_adequacy_index, None);
        assert!((snap.bottleneck_score.unwrap() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn recomputation_is_bit_identical() {
        let (start, end) = window();
        let events = vec![
            event(ActionType::Entered, 5, Some(45)),
            event(ActionType::Passed, 6, None),
            event(ActionType::Entered, 20, None),
        ];
        let history = vec![3, 7, 5, 9];
        let kpi = KpiConfig::default();
        let a = compute_snapshot(&branch(50, 3, 4), start, end, &events, &history, &kpi);
        let b = compute_snapshot(&branch(50, 3, 4), start, end, &events, &history, &kpi);
        assert_eq!(a, b);
    }
}
