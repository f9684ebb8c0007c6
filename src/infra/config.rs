//! Configuration loading from TOML files
//!
//! Everything the core consumes is validated here, at startup: region
//! geometry, noise-suppression thresholds, dispatch policy, KPI coefficients
//! and branch metadata. Nothing is re-read per frame.

use crate::domain::event::Branch;
use crate::domain::geometry::Point;
use crate::domain::region::{CrossingDirection, Region};
use crate::infra::error::Error;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// POST events to the external ingestion endpoint
    Http,
    /// Deliver into the in-process event store (single-node deployments)
    Local,
}

/// What to discard when the outbound queue hits its high-water mark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropPolicy {
    #[default]
    Oldest,
    Newest,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "storesight".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Consecutive confirming frames before an entry is confirmed
    #[serde(default = "default_min_hits")]
    pub min_hits: u32,
    /// Frames of absence before a track is considered gone
    #[serde(default = "default_max_age")]
    pub max_age: u32,
    /// Observations below this confidence are ignored
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_hits: default_min_hits(),
            max_age: default_max_age(),
            confidence_threshold: default_confidence_threshold(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

fn default_min_hits() -> u32 {
    3
}

fn default_max_age() -> u32 {
    30
}

fn default_confidence_threshold() -> f64 {
    0.5
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

/// One camera stream: an independent pipeline reading detector output
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSource {
    pub id: String,
    pub branch_id: String,
    pub camera_id: String,
    /// JSONL file (or named pipe) of per-frame tracker output
    pub frames_file: String,
}

/// Raw region spec as written in TOML; converted to a validated `Region`
#[derive(Debug, Clone, Deserialize)]
pub struct RegionSpec {
    pub id: String,
    pub branch_id: String,
    pub camera_id: String,
    pub kind: String,
    pub points: Vec<[f64; 2]>,
    #[serde(default)]
    pub direction: CrossingDirection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_dispatch_mode")]
    pub mode: DispatchMode,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_batch_max_size")]
    pub batch_max_size: usize,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub drop_policy: DropPolicy,
    #[serde(default = "default_dead_letter_file")]
    pub dead_letter_file: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: default_dispatch_mode(),
            endpoint: default_endpoint(),
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            batch_max_size: default_batch_max_size(),
            flush_interval_secs: default_flush_interval_secs(),
            queue_capacity: default_queue_capacity(),
            drop_policy: DropPolicy::Oldest,
            dead_letter_file: default_dead_letter_file(),
        }
    }
}

fn default_dispatch_mode() -> DispatchMode {
    DispatchMode::Http
}

fn default_endpoint() -> String {
    "http://localhost:8000/cv/events".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    2_000
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_batch_max_size() -> usize {
    20
}

fn default_flush_interval_secs() -> u64 {
    5
}

fn default_queue_capacity() -> usize {
    1_000
}

fn default_dead_letter_file() -> String {
    "dead_letter.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct KpiConfig {
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,
    /// Trailing windows used for the traffic baseline
    #[serde(default = "default_baseline_periods")]
    pub baseline_periods: u32,
    /// Trailing windows used for the growth-momentum slope
    #[serde(default = "default_momentum_windows")]
    pub momentum_windows: u32,
    #[serde(default = "default_congestion_weight")]
    pub congestion_weight: f64,
    #[serde(default = "default_staffing_weight")]
    pub staffing_weight: f64,
    /// Interval between scheduled ETL runs (0 disables the scheduler)
    #[serde(default = "default_etl_interval_secs")]
    pub etl_interval_secs: u64,
}

impl Default for KpiConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            baseline_periods: default_baseline_periods(),
            momentum_windows: default_momentum_windows(),
            congestion_weight: default_congestion_weight(),
            staffing_weight: default_staffing_weight(),
            etl_interval_secs: default_etl_interval_secs(),
        }
    }
}

fn default_window_minutes() -> u32 {
    60
}

fn default_baseline_periods() -> u32 {
    30
}

fn default_momentum_windows() -> u32 {
    12
}

fn default_congestion_weight() -> f64 {
    0.6
}

fn default_staffing_weight() -> f64 {
    0.4
}

fn default_etl_interval_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub streams: Vec<StreamSource>,
    #[serde(default)]
    pub regions: Vec<RegionSpec>,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub kpi: KpiConfig,
    #[serde(default)]
    pub branches: Vec<Branch>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    config_file: String,
    tracking: TrackingConfig,
    streams: Vec<StreamSource>,
    regions: Vec<Region>,
    dispatch: DispatchConfig,
    kpi: KpiConfig,
    branches: HashMap<String, Branch>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            config_file: "default".to_string(),
            tracking: TrackingConfig::default(),
            streams: Vec::new(),
            regions: Vec::new(),
            dispatch: DispatchConfig::default(),
            kpi: KpiConfig::default(),
            branches: HashMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, validating everything the core
    /// consumes. Invalid region geometry or KPI coefficients fail the load.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let regions = build_regions(&toml_config.regions)?;
        validate_tracking(&toml_config.tracking)?;
        validate_kpi(&toml_config.kpi)?;

        let branches =
            toml_config.branches.into_iter().map(|b| (b.id.clone(), b)).collect::<HashMap<_, _>>();

        for stream in &toml_config.streams {
            if !branches.contains_key(&stream.branch_id) {
                return Err(Error::MissingBranch(stream.branch_id.clone()).into());
            }
        }

        Ok(Self {
            site_id: toml_config.site.id,
            config_file: path.display().to_string(),
            tracking: toml_config.tracking,
            streams: toml_config.streams,
            regions,
            dispatch: toml_config.dispatch,
            kpi: toml_config.kpi,
            branches,
        })
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn min_hits(&self) -> u32 {
        self.tracking.min_hits
    }

    pub fn max_age(&self) -> u32 {
        self.tracking.max_age
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.tracking.confidence_threshold
    }

    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.tracking.heartbeat_interval_secs
    }

    pub fn streams(&self) -> &[StreamSource] {
        &self.streams
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Regions visible to one camera
    pub fn regions_for_camera(&self, camera_id: &str) -> Vec<Region> {
        self.regions.iter().filter(|r| r.camera_id == camera_id).cloned().collect()
    }

    pub fn dispatch(&self) -> &DispatchConfig {
        &self.dispatch
    }

    pub fn kpi(&self) -> &KpiConfig {
        &self.kpi
    }

    pub fn branches(&self) -> &HashMap<String, Branch> {
        &self.branches
    }

    pub fn branch(&self, branch_id: &str) -> Option<&Branch> {
        self.branches.get(branch_id)
    }
}

fn build_regions(specs: &[RegionSpec]) -> anyhow::Result<Vec<Region>> {
    let mut regions = Vec::with_capacity(specs.len());
    for spec in specs {
        let points: Vec<Point> = spec.points.iter().map(|&p| Point::from(p)).collect();
        let region = match spec.kind.as_str() {
            "zone" => Region::zone(&spec.id, &spec.branch_id, &spec.camera_id, points),
            "line" => {
                if points.len() != 2 {
                    return Err(Error::InvalidConfig(format!(
                        "line region '{}' requires exactly 2 points, got {}",
                        spec.id,
                        points.len()
                    ))
                    .into());
                }
                Region::line(
                    &spec.id,
                    &spec.branch_id,
                    &spec.camera_id,
                    points[0],
                    points[1],
                    spec.direction,
                )
            }
            other => {
                return Err(Error::InvalidConfig(format!(
                    "region '{}' has unsupported kind '{}'",
                    spec.id, other
                ))
                .into())
            }
        }
        .map_err(|source| Error::InvalidGeometry { region_id: spec.id.clone(), source })?;
        regions.push(region);
    }
    Ok(regions)
}

fn validate_tracking(tracking: &TrackingConfig) -> anyhow::Result<()> {
    if tracking.min_hits == 0 {
        return Err(Error::InvalidConfig("tracking.min_hits must be at least 1".into()).into());
    }
    if !(0.0..=1.0).contains(&tracking.confidence_threshold) {
        return Err(Error::InvalidConfig(
            "tracking.confidence_threshold must be within [0, 1]".into(),
        )
        .into());
    }
    Ok(())
}

fn validate_kpi(kpi: &KpiConfig) -> anyhow::Result<()> {
    if kpi.window_minutes == 0 {
        return Err(Error::InvalidConfig("kpi.window_minutes must be at least 1".into()).into());
    }
    if kpi.congestion_weight < 0.0 || kpi.staffing_weight < 0.0 {
        return Err(Error::InvalidConfig("kpi bottleneck weights must be >= 0".into()).into());
    }
    if kpi.congestion_weight + kpi.staffing_weight <= 0.0 {
        return Err(Error::InvalidConfig("kpi bottleneck weights must not both be 0".into()).into());
    }
    Ok(())
}
