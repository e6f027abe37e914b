//! Backend reconciliation core for the Orion printer front-end.
//!
//! Unifies the two printer backends behind one UI-consumable status model:
//! [`StatusProvider`] owns transport selection (SSE vs polling), backoff,
//! transitional flags and change suppression; [`AnalyticsProvider`] keeps
//! bounded telemetry series; [`ThumbnailCache`] deduplicates preview
//! fetches behind a single-flight TTL cache.
#![allow(missing_docs)]

pub mod analytics;
pub mod retry;
pub mod status;
pub mod thumbnails;

pub use analytics::AnalyticsProvider;
pub use retry::RetryBudget;
pub use status::{StatusProvider, StatusView};
pub use thumbnails::{Thumbnail, ThumbnailCache};
