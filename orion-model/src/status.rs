use serde::{Deserialize, Serialize};

use crate::files::FileRef;

/// Unified print status produced from any backend's raw payload.
///
/// Exactly one variant holds at a time; the transitional `Pausing` and
/// `Canceling` variants exist because both backends briefly report
/// ambiguous intermediate states that the UI must render distinctly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
pub enum PrintStatus {
    #[default]
    Idle,
    Printing,
    Paused,
    Pausing,
    Canceling,
    Unknown,
}

impl PrintStatus {
    pub fn is_printing(&self) -> bool {
        matches!(self, PrintStatus::Printing)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, PrintStatus::Paused)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, PrintStatus::Idle)
    }

    /// A job is on the build plate, whether progressing or held.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PrintStatus::Printing | PrintStatus::Paused | PrintStatus::Pausing
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrintStatus::Idle => "idle",
            PrintStatus::Printing => "printing",
            PrintStatus::Paused => "paused",
            PrintStatus::Pausing => "pausing",
            PrintStatus::Canceling => "canceling",
            PrintStatus::Unknown => "unknown",
        }
    }
}

/// Canonical tuple produced by a backend's state canonicalizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Canonical {
    pub status: PrintStatus,
    pub paused: bool,
    /// A cancel request was observed this session and has not yet been
    /// cleared by a fresh print start. Held across intermediate Idle
    /// reports so the UI never shows "ready" while a cancel is finishing.
    pub cancel_latched: bool,
    pub pause_latched: bool,
    /// Heuristic: an otherwise-idle payload that still carries layer or
    /// file metadata is treated as "a job just finished" rather than
    /// "nothing ever happened". The upstream device is genuinely ambiguous
    /// here; do not strengthen or weaken this without a product decision.
    pub finished: bool,
    /// Raw state code the tuple was resolved from, for diagnostics.
    pub state_code: i64,
}

/// Latching memory carried across polls by a canonicalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatchState {
    pub cancel_latched: bool,
    pub last_observed_code: i64,
}

impl LatchState {
    pub fn new() -> Self {
        Self {
            cancel_latched: false,
            last_observed_code: -1,
        }
    }

    /// Drop all latched memory, e.g. when the provider is reset.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Physical axis state, backend-normalized to millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PhysicalState {
    pub z: f64,
}

/// Data about the job currently (or last) on the plate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PrintData {
    pub file_data: Option<FileRef>,
}

/// Immutable per-poll/per-event status result.
///
/// Constructed fresh on every successful fetch or stream event, never
/// mutated, and superseded atomically by the next snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StatusSnapshot {
    pub status: PrintStatus,
    pub layer: Option<i64>,
    pub layer_count: Option<i64>,
    pub physical_state: PhysicalState,
    pub print_data: PrintData,
    pub cancel_latched: Option<bool>,
    pub pause_latched: Option<bool>,
    pub finished: Option<bool>,
}

impl StatusSnapshot {
    pub fn is_printing(&self) -> bool {
        self.status.is_printing()
    }

    pub fn is_paused(&self) -> bool {
        self.status.is_paused()
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self.status, PrintStatus::Canceling)
            || self.cancel_latched == Some(true)
    }

    pub fn is_idle(&self) -> bool {
        self.status.is_idle()
    }

    /// Fractional progress, only meaningful when the layer count is known
    /// and positive.
    pub fn progress(&self) -> Option<f64> {
        match (self.layer, self.layer_count) {
            (Some(layer), Some(count)) if count > 0 => {
                Some((layer as f64 / count as f64).clamp(0.0, 1.0))
            }
            _ => None,
        }
    }

    /// Whether this snapshot carries any evidence of a job: layer numbers
    /// or an attached file. Drives the finished heuristic and the
    /// awaiting-new-print gate.
    pub fn has_job_data(&self) -> bool {
        self.layer.is_some()
            || self.layer_count.is_some()
            || self.print_data.file_data.is_some()
    }
}
