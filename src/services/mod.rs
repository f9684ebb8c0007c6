//! Stream processing, event construction, KPI aggregation and ETL

pub mod aggregation;
pub mod etl;
pub mod event_builder;
pub mod pipeline;
pub mod roi_tracker;

pub use etl::{EtlRunner, EtlSummary, EventStore, InMemoryEventStore, InMemoryKpiStore, KpiStore};
pub use event_builder::EventBuilder;
pub use pipeline::StreamPipeline;
pub use roi_tracker::{RegionTransition, RoiTracker};
