//! Infrastructure - configuration, error taxonomy, metrics

pub mod config;
pub mod error;
pub mod metrics;

pub use config::{Config, DispatchMode, DropPolicy};
pub use error::Error;
pub use metrics::Metrics;
