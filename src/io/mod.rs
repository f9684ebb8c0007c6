//! IO modules - external system interfaces
//!
//! - `frames` - per-frame tracker output ingestion (JSONL)
//! - `ingest` - movement-event delivery to the ingestion boundary
//! - `dispatch` - outbound queue, delivery worker, dead-lettering

pub mod dispatch;
pub mod frames;
pub mod ingest;

pub use dispatch::{create_dispatcher, DeadLetter, DispatchWorker, EventSender};
pub use frames::{Frame, FrameSource, JsonlFrameSource};
pub use ingest::{HttpIngestionClient, IngestionClient};
