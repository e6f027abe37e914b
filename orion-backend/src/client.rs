//! The capability surface every backend adapter implements.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use orion_model::{FileRef, ItemLocation, StatusSnapshot};

use crate::error::BackendError;

/// One event from a backend status stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The subscription is established; the engine may suspend polling.
    Open,
    /// A raw status payload, identical in shape to `get_status` output.
    Status(Value),
}

/// Boxed stream of status events. Ends when the connection closes.
pub type StatusStream =
    Pin<Box<dyn Stream<Item = Result<StreamEvent, BackendError>> + Send>>;

/// A single scalar telemetry reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricReading {
    pub metric_id: i64,
    pub value: f64,
}

/// Capability contract for a printer backend.
///
/// Every call may fail with a transport error; no call is idempotent unless
/// its doc says so. Adapters do no local caching; that is the
/// reconciliation layer's job.
#[async_trait]
pub trait BackendClient: Send + Sync + std::fmt::Debug {
    /// Short human-readable backend name for logs.
    fn kind(&self) -> &'static str;

    /// Fetch the raw status payload. Idempotent.
    async fn get_status(&self) -> Result<Value, BackendError>;

    /// Open a push status stream, or return
    /// [`BackendError::StreamUnsupported`] so the engine permanently stops
    /// trying for this session. Adapters that cannot push natively may
    /// wrap a fixed-interval poll as a stream instead.
    fn get_status_stream(&self) -> Result<StatusStream, BackendError>;

    /// Parse a raw payload (from `get_status` or a stream event) into the
    /// canonical snapshot. Stateful for backends that need latching memory
    /// across polls; call [`BackendClient::reset_session`] to clear it.
    fn parse_status(&self, raw: &Value) -> StatusSnapshot;

    /// Drop any per-session latching memory.
    fn reset_session(&self) {}

    /// Pull scalar telemetry out of a raw status payload. Used by the
    /// analytics layer when it rides the status stream instead of polling.
    fn extract_metrics(&self, _raw: &Value) -> Vec<MetricReading> {
        Vec::new()
    }

    /// List printable files under a subdirectory of a location. Idempotent.
    async fn list_items(
        &self,
        location: ItemLocation,
        subdirectory: &str,
    ) -> Result<Vec<FileRef>, BackendError>;

    /// Fetch metadata for one file by path. Idempotent.
    async fn get_file_metadata(
        &self,
        location: ItemLocation,
        path: &str,
    ) -> Result<FileRef, BackendError>;

    /// Download the raw preview image bytes for a file. Idempotent.
    async fn get_file_thumbnail(
        &self,
        file: &FileRef,
    ) -> Result<Vec<u8>, BackendError>;

    async fn start_print(&self, file: &FileRef) -> Result<(), BackendError>;

    async fn cancel_print(&self) -> Result<(), BackendError>;

    async fn pause_print(&self) -> Result<(), BackendError>;

    async fn resume_print(&self) -> Result<(), BackendError>;

    /// Move the Z axis to an absolute height in millimeters.
    async fn move_to(&self, z_mm: f64) -> Result<(), BackendError>;

    /// Move the Z axis by a signed delta in millimeters.
    async fn move_delta(&self, delta_mm: f64) -> Result<(), BackendError>;

    async fn manual_home(&self) -> Result<(), BackendError>;

    /// Switch the cure light on or off.
    async fn manual_cure(&self, on: bool) -> Result<(), BackendError>;

    /// Send a raw device command string.
    async fn manual_command(&self, command: &str)
        -> Result<(), BackendError>;

    /// Latest values for up to `count` metrics. Idempotent.
    async fn get_analytics(
        &self,
        count: u32,
    ) -> Result<Vec<MetricReading>, BackendError>;

    /// Latest value of one metric via its scalar endpoint. Idempotent.
    async fn get_analytic_value(
        &self,
        metric_id: i64,
    ) -> Result<f64, BackendError>;
}
