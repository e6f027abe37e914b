//! Core data model definitions shared across Orion crates.
#![allow(missing_docs)]

pub mod analytics;
pub mod error;
pub mod files;
pub mod payload;
pub mod status;
pub mod units;

// Intentionally curated re-exports for downstream consumers.
pub use analytics::{AnalyticsFrame, MetricSeries, TimeSeriesPoint};
pub use error::{ModelError, Result as ModelResult};
pub use files::{FileRef, ItemLocation, ThumbnailSize};
pub use payload::{
    bool_field, f64_field, first_present, i64_field, str_field, FieldAliases,
    ALIASES,
};
pub use status::{
    Canonical, LatchState, PhysicalState, PrintData, PrintStatus,
    StatusSnapshot,
};
pub use units::{normalize_z_mm, ticks_to_mm, TICKS_PER_MM, Z_TRAVEL_MAX_MM};
