//! Error taxonomy
//!
//! Three classes, with different blast radii:
//! - configuration errors are fatal to the affected stream or branch only
//! - transient delivery errors are retried, then dead-lettered
//! - data integrity conflicts are resolved defensively and logged
//!
//! Zero denominators and missing history are not errors at all; the
//! aggregation engine resolves them to documented null/zero defaults.

use crate::domain::geometry::GeometryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid region geometry for '{region_id}': {source}")]
    InvalidGeometry {
        region_id: String,
        #[source]
        source: GeometryError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("branch '{0}' has no metadata configured")]
    MissingBranch(String),

    #[error("delivery to ingestion boundary failed: {0}")]
    Delivery(String),

    #[error("duplicate open event for customer {customer_id} in region '{region_id}'")]
    DuplicateOpenEvent { customer_id: uuid::Uuid, region_id: String },
}

impl Error {
    /// True for errors that should be retried with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Delivery(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Delivery(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
