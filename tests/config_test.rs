//! Integration tests for configuration loading

use std::io::Write;
use storesight::domain::region::{CrossingDirection, RegionKind};
use storesight::infra::config::{DispatchMode, DropPolicy};
use storesight::infra::Config;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[test]
fn test_load_config_from_file() {
    let temp_file = write_config(
        r#"
[site]
id = "test-site"

[tracking]
min_hits = 5
max_age = 20
confidence_threshold = 0.6

[[streams]]
id = "stream-1"
branch_id = "branch_001"
camera_id = "cam_1"
frames_file = "/tmp/frames.jsonl"

[[regions]]
id = "electronics"
branch_id = "branch_001"
camera_id = "cam_1"
kind = "zone"
points = [[0.0, 0.0], [100.0, 0.0], [100.0, 50.0], [0.0, 50.0]]

[[regions]]
id = "entrance"
branch_id = "branch_001"
camera_id = "cam_1"
kind = "line"
points = [[50.0, 0.0], [50.0, 50.0]]
direction = "forward"

[dispatch]
mode = "local"
endpoint = "http://test-ingest/cv/events"
max_attempts = 5
drop_policy = "newest"

[kpi]
window_minutes = 30
congestion_weight = 0.7
staffing_weight = 0.3

[[branches]]
id = "branch_001"
name = "Downtown"
capacity = 150
staff_on_duty = 4
required_staff = 6
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "test-site");
    assert_eq!(config.min_hits(), 5);
    assert_eq!(config.max_age(), 20);
    assert_eq!(config.confidence_threshold(), 0.6);
    assert_eq!(config.streams().len(), 1);
    assert_eq!(config.dispatch().mode, DispatchMode::Local);
    assert_eq!(config.dispatch().max_attempts, 5);
    assert_eq!(config.dispatch().drop_policy, DropPolicy::Newest);
    assert_eq!(config.kpi().window_minutes, 30);
    assert_eq!(config.branch("branch_001").unwrap().capacity, 150);

    let regions = config.regions_for_camera("cam_1");
    assert_eq!(regions.len(), 2);
    assert!(matches!(regions[0].kind, RegionKind::Zone { .. }));
    match &regions[1].kind {
        RegionKind::Line { direction, .. } => {
            assert_eq!(*direction, CrossingDirection::Forward)
        }
        other => panic!("expected line region, got {:?}", other),
    }
}

#[test]
fn test_defaults_applied_for_missing_sections() {
    let temp_file = write_config(
        r#"
[site]
id = "minimal"
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.min_hits(), 3);
    assert_eq!(config.max_age(), 30);
    assert_eq!(config.confidence_threshold(), 0.5);
    assert_eq!(config.dispatch().mode, DispatchMode::Http);
    assert_eq!(config.dispatch().max_attempts, 3);
    assert_eq!(config.dispatch().batch_max_size, 20);
    assert_eq!(config.kpi().window_minutes, 60);
    assert_eq!(config.kpi().congestion_weight, 0.6);
    assert_eq!(config.kpi().staffing_weight, 0.4);
}

#[test]
fn test_self_intersecting_polygon_rejected() {
    let temp_file = write_config(
        r#"
[[regions]]
id = "bowtie"
branch_id = "branch_001"
camera_id = "cam_1"
kind = "zone"
points = [[0.0, 0.0], [10.0, 10.0], [10.0, 0.0], [0.0, 10.0]]
"#,
    );

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(err.to_string().contains("bowtie"), "unexpected error: {err:#}");
}

#[test]
fn test_degenerate_line_rejected() {
    let temp_file = write_config(
        r#"
[[regions]]
id = "point"
branch_id = "branch_001"
camera_id = "cam_1"
kind = "line"
points = [[5.0, 5.0], [5.0, 5.0]]
"#,
    );

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_stream_without_branch_rejected() {
    let temp_file = write_config(
        r#"
[[streams]]
id = "stream-1"
branch_id = "ghost"
camera_id = "cam_1"
frames_file = "/tmp/frames.jsonl"
"#,
    );

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(err.to_string().contains("ghost"), "unexpected error: {err:#}");
}

#[test]
fn test_zero_min_hits_rejected() {
    let temp_file = write_config(
        r#"
[tracking]
min_hits = 0
"#,
    );

    assert!(Config::from_file(temp_file.path()).is_err());
}
