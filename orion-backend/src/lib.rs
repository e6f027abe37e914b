//! Backend adapters for the Orion printer front-end.
//!
//! Two production backends exist: Odyssey (REST with an SSE status stream)
//! and NanoDLP (polling-only, loosely-typed JSON). Both are hidden behind
//! the [`BackendClient`] capability trait so the reconciliation layer never
//! branches on backend flavor. A deterministic simulated backend backs
//! developer mode and tests.
#![allow(missing_docs)]

pub mod client;
pub mod error;
pub mod http;
pub mod nanodlp;
pub mod odyssey;
pub mod select;
pub mod simulated;

pub use client::{BackendClient, MetricReading, StatusStream, StreamEvent};
pub use error::BackendError;
pub use nanodlp::NanoDlpClient;
pub use odyssey::OdysseyClient;
pub use select::select_backend;
pub use simulated::SimulatedBackend;
