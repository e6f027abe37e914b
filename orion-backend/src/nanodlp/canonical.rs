//! State canonicalization for the polling-only NanoDLP backend.
//!
//! NanoDLP reports an ambiguous numeric state code plus assorted boolean
//! and textual convenience fields, and briefly reports Idle while a cancel
//! is still finishing. This module is the pure function that turns
//! `(raw payload, previous latch state)` into the canonical tuple; the
//! client wrapper around it only handles locking and change logging.
//! Keeping it a free function of explicit inputs is what makes the latch
//! rules testable in isolation.

use serde_json::Value;

use orion_model::payload::{aliases, bool_field, i64_field, str_field};
use orion_model::{Canonical, LatchState, PrintStatus};

/// NanoDLP state codes the canonicalizer understands.
pub mod code {
    pub const IDLE: i64 = 0;
    pub const STARTING: i64 = 1;
    pub const PAUSING: i64 = 2;
    pub const PAUSED: i64 = 3;
    pub const CANCEL_REQUEST: i64 = 4;
    pub const PRINTING: i64 = 5;
    pub const UNKNOWN: i64 = -1;
}

/// Resolve a numeric state code from the payload: prefer the explicit
/// field, else infer from textual/boolean hints.
pub fn resolve_state_code(raw: &Value) -> i64 {
    if let Some(explicit) = i64_field(raw, &aliases::STATE_CODE) {
        return explicit;
    }
    if bool_field(raw, &aliases::PRINTING) == Some(true) {
        return code::PRINTING;
    }
    if bool_field(raw, &aliases::PAUSED) == Some(true) {
        return code::PAUSED;
    }
    match str_field(raw, &aliases::STATUS_TEXT)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("printing") => code::PRINTING,
        Some("paused") => code::PAUSED,
        Some("idle") => code::IDLE,
        _ => code::UNKNOWN,
    }
}

/// Canonicalize one raw NanoDLP payload.
///
/// Latch rules:
/// - code 4 (cancel request) sets `cancel_latched` unconditionally;
/// - a fresh print start observed as a `0 -> 1` code transition clears it;
/// - unknown/negative codes never change the latch, and do not count as an
///   observed code for the transition rule.
pub fn canonicalize(raw: &Value, latch: &mut LatchState) -> Canonical {
    let state_code = resolve_state_code(raw);

    if state_code == code::CANCEL_REQUEST {
        latch.cancel_latched = true;
    } else if state_code == code::STARTING
        && latch.last_observed_code == code::IDLE
    {
        latch.cancel_latched = false;
    }
    if state_code >= 0 {
        latch.last_observed_code = state_code;
    }

    let paused_hint = bool_field(raw, &aliases::PAUSED) == Some(true);
    let printing_hint = bool_field(raw, &aliases::PRINTING) == Some(true);

    let mut canonical = Canonical {
        state_code,
        ..Canonical::default()
    };

    if state_code == code::IDLE && latch.cancel_latched {
        // The device reports Idle while the cancel is still finishing; hold
        // the latch so the UI doesn't show "ready" prematurely.
        canonical.status = PrintStatus::Idle;
        canonical.cancel_latched = true;
        canonical.finished = false;
    } else if latch.cancel_latched {
        canonical.status = PrintStatus::Canceling;
        canonical.cancel_latched = true;
    } else {
        match state_code {
            code::PAUSED => {
                canonical.status = PrintStatus::Paused;
                canonical.paused = true;
            }
            code::STARTING | code::PRINTING => {
                canonical.status = PrintStatus::Printing;
            }
            code::PAUSING => {
                canonical.status = PrintStatus::Pausing;
                canonical.pause_latched = true;
            }
            _ if paused_hint => {
                canonical.status = PrintStatus::Paused;
                canonical.paused = true;
            }
            _ if printing_hint => {
                canonical.status = PrintStatus::Printing;
            }
            _ => {
                canonical.status = PrintStatus::Idle;
                canonical.finished = idle_payload_looks_finished(raw);
            }
        }
    }

    canonical
}

/// Finished heuristic: an otherwise-idle payload that still carries layer
/// or file metadata is treated as "a job just finished" rather than
/// "nothing ever happened". The device is genuinely ambiguous here; do not
/// strengthen or weaken this without a product decision.
fn idle_payload_looks_finished(raw: &Value) -> bool {
    i64_field(raw, &aliases::LAYER).is_some_and(|l| l > 0)
        || i64_field(raw, &aliases::LAYER_COUNT).is_some_and(|c| c > 0)
        || str_field(raw, &aliases::FILE_PATH).is_some_and(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn canon_code(state: i64, latch: &mut LatchState) -> Canonical {
        canonicalize(&json!({ "Status": state }), latch)
    }

    #[test]
    fn explicit_code_wins_over_hints() {
        let raw = json!({ "Status": 3, "Printing": true });
        assert_eq!(resolve_state_code(&raw), 3);
    }

    #[test]
    fn hints_fill_in_for_missing_code() {
        assert_eq!(resolve_state_code(&json!({ "Printing": true })), 5);
        assert_eq!(resolve_state_code(&json!({ "Paused": true })), 3);
        assert_eq!(resolve_state_code(&json!({ "status": "Idle" })), 0);
        assert_eq!(resolve_state_code(&json!({})), -1);
    }

    #[test]
    fn cancel_request_latches_through_idle() {
        let mut latch = LatchState::new();
        canon_code(4, &mut latch);
        assert!(latch.cancel_latched);

        let idle = canon_code(0, &mut latch);
        assert_eq!(idle.status, PrintStatus::Idle);
        assert!(idle.cancel_latched);
        assert!(!idle.finished);
    }

    #[test]
    fn fresh_start_clears_the_latch() {
        let mut latch = LatchState::new();
        canon_code(4, &mut latch);
        canon_code(0, &mut latch);
        let started = canon_code(1, &mut latch);
        assert!(!started.cancel_latched);
        assert_eq!(started.status, PrintStatus::Printing);
    }

    #[test]
    fn unknown_codes_do_not_touch_the_latch() {
        let mut latch = LatchState::new();
        canon_code(4, &mut latch);
        canon_code(0, &mut latch);
        // An unknown report between 0 and 1 must not defeat the 0->1 rule
        // either way: the latch survives the unknown and clears on start.
        let unknown = canon_code(-3, &mut latch);
        assert!(unknown.cancel_latched);
        let started = canon_code(1, &mut latch);
        assert!(!started.cancel_latched);
    }

    #[test]
    fn pausing_code_sets_pause_latch() {
        let mut latch = LatchState::new();
        let pausing = canon_code(2, &mut latch);
        assert_eq!(pausing.status, PrintStatus::Pausing);
        assert!(pausing.pause_latched);
    }

    #[test]
    fn idle_with_layer_data_reads_as_finished() {
        let mut latch = LatchState::new();
        let finished = canonicalize(
            &json!({ "Status": 0, "LayerID": 120, "Path": "/a/b.sl1" }),
            &mut latch,
        );
        assert_eq!(finished.status, PrintStatus::Idle);
        assert!(finished.finished);

        let empty = canonicalize(&json!({ "Status": 0 }), &mut latch);
        assert!(!empty.finished);
    }

    #[test]
    fn canonicalize_is_pure_given_equal_inputs() {
        let raw = json!({ "Status": 5, "LayerID": 10 });
        let mut a = LatchState {
            cancel_latched: true,
            last_observed_code: 4,
        };
        let mut b = a;
        assert_eq!(canonicalize(&raw, &mut a), canonicalize(&raw, &mut b));
        assert_eq!(a, b);
    }
}
