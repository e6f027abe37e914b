use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which backend flavor the device runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Push-capable REST + SSE service. The default.
    #[default]
    Odyssey,
    /// Polling-only HTTP service with scraped JSON payloads.
    Nanodlp,
}

// An unrecognized name falls back to the default with a warning instead of
// failing the whole file; a typo here should not brick the touchscreen.
impl<'de> Deserialize<'de> for BackendKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.to_ascii_lowercase().as_str() {
            "odyssey" => Ok(BackendKind::Odyssey),
            "nanodlp" => Ok(BackendKind::Nanodlp),
            other => {
                log::warn!(
                    "[Config] unknown backend {other:?}, using odyssey"
                );
                Ok(BackendKind::default())
            }
        }
    }
}

impl BackendKind {
    /// Whether streaming status is known to be impossible for this flavor,
    /// letting the provider skip SSE attempts entirely.
    pub fn polling_only(&self) -> bool {
        matches!(self, BackendKind::Nanodlp)
    }
}

/// Developer overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DeveloperConfig {
    /// Replace the real backend with the deterministic simulated one.
    pub simulated: bool,
}

/// Status provider cadence and timing knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusTuning {
    /// Poll interval while the backend is healthy, in milliseconds.
    pub poll_interval_ms: u64,
    /// First backoff step after a failure, in milliseconds.
    pub backoff_base_ms: u64,
    /// Backoff ceiling, in milliseconds.
    pub backoff_cap_ms: u64,
    /// Consecutive poll errors above which opening a stream is not
    /// attempted.
    pub stream_error_threshold: u32,
    /// How long the awaiting-new-print gate may hold after a reset, in
    /// milliseconds.
    pub awaiting_timeout_ms: u64,
    /// Minimum time the loading spinner stays up after a reset, in
    /// milliseconds.
    pub min_spinner_ms: u64,
}

impl Default for StatusTuning {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            backoff_base_ms: 500,
            backoff_cap_ms: 15_000,
            stream_error_threshold: 3,
            awaiting_timeout_ms: 12_000,
            min_spinner_ms: 400,
        }
    }
}

impl StatusTuning {
    /// Poll interval, clamped to 100ms so a zero in the file cannot turn
    /// the engine into a busy loop.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }

    pub fn awaiting_timeout(&self) -> Duration {
        Duration::from_millis(self.awaiting_timeout_ms)
    }

    pub fn min_spinner(&self) -> Duration {
        Duration::from_millis(self.min_spinner_ms)
    }
}

/// Analytics sampler knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsTuning {
    /// Fast-path sample frequency for the latency-sensitive metric, Hz.
    pub fast_hz: f64,
    /// The fast metric's id (pressure sensor on current hardware).
    pub fast_metric_id: i64,
    /// The batched fetch runs every Nth fast cycle.
    pub batch_every: u32,
    /// Rolling window retained per metric, seconds.
    pub window_seconds: f64,
    /// How many metrics the batched endpoint is asked for.
    pub batch_size: u32,
}

impl Default for AnalyticsTuning {
    fn default() -> Self {
        Self {
            fast_hz: 4.0,
            fast_metric_id: 0,
            batch_every: 8,
            window_seconds: 60.0,
            batch_size: 16,
        }
    }
}

/// HTTP transport knobs shared by both adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTuning {
    /// Per-request timeout, in milliseconds. Slow calls become timeout
    /// errors instead of hanging the engine.
    pub request_timeout_ms: u64,
}

impl Default for HttpTuning {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
        }
    }
}

impl HttpTuning {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Top-level configuration snapshot consumed by the core.
///
/// The provider and adapters receive this by constructor injection; nothing
/// in the core reads configuration from ambient state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OrionConfig {
    pub backend: BackendKind,
    /// Base URL of the active backend, e.g. `http://127.0.0.1:12357`.
    pub base_url: String,
    pub developer: DeveloperConfig,
    /// Whether file browsing starts on the USB location.
    pub use_usb_by_default: bool,
    pub status: StatusTuning,
    pub analytics: AnalyticsTuning,
    pub http: HttpTuning,
}
