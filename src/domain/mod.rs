//! Domain models - core business types
//!
//! This module contains the canonical data types used throughout the system:
//! - `MovementEvent` - terminal track-region interactions handed to ingestion
//! - `KpiSnapshot` - one window's operational metrics per branch
//! - `Region` - configured zone polygon or crossing line
//! - `TrackedObservation` - one tracked detection per frame
//! - geometry primitives (containment, crossing, validation)

pub mod event;
pub mod geometry;
pub mod region;
pub mod types;
