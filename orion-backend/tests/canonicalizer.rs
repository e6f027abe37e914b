//! Latch behavior of the NanoDLP state canonicalizer over whole sessions.

use orion_backend::nanodlp::canonical::canonicalize;
use orion_model::{LatchState, PrintStatus};
use serde_json::json;

fn run_sequence(codes: &[i64]) -> Vec<(PrintStatus, bool)> {
    let mut latch = LatchState::new();
    codes
        .iter()
        .map(|code| {
            let canonical =
                canonicalize(&json!({ "Status": code }), &mut latch);
            (canonical.status, canonical.cancel_latched)
        })
        .collect()
}

#[test]
fn cancel_session_scenario() {
    let results = run_sequence(&[0, 0, 4, 4, 0, 0, 1, 5, 5, 0]);

    let expected_status = [
        PrintStatus::Idle,
        PrintStatus::Idle,
        PrintStatus::Canceling,
        PrintStatus::Canceling,
        PrintStatus::Idle,
        PrintStatus::Idle,
        PrintStatus::Printing,
        PrintStatus::Printing,
        PrintStatus::Printing,
        PrintStatus::Idle,
    ];
    let statuses: Vec<_> = results.iter().map(|(s, _)| *s).collect();
    assert_eq!(statuses, expected_status);

    for (index, (_, latched)) in results.iter().enumerate() {
        let expected = (2..=5).contains(&index);
        assert_eq!(
            *latched, expected,
            "cancel latch wrong at index {index}"
        );
    }
}

#[test]
fn latch_holds_until_fresh_start_for_any_sequence() {
    // Once a 4 appears, every result is latched until a 0 -> 1 transition;
    // after that it stays clear until another 4.
    let codes = [5, 4, 5, 3, 0, 0, 1, 5, 0, 4, 0, 1];
    let mut latch = LatchState::new();
    let mut seen_cancel = false;

    for (index, code) in codes.iter().enumerate() {
        let previous = latch.last_observed_code;
        let canonical = canonicalize(&json!({ "Status": code }), &mut latch);
        if *code == 4 {
            seen_cancel = true;
        }
        if seen_cancel && previous == 0 && *code == 1 {
            seen_cancel = false;
        }
        assert_eq!(
            canonical.cancel_latched, seen_cancel,
            "latch mismatch at index {index} (code {code})"
        );
    }
}

#[test]
fn repeated_canonicalize_is_deterministic() {
    let raw = json!({ "Status": 0, "LayerID": 55, "Path": "/p/x.sl1" });
    let mut first_latch = LatchState {
        cancel_latched: false,
        last_observed_code: 5,
    };
    let mut second_latch = first_latch;

    let first = canonicalize(&raw, &mut first_latch);
    let second = canonicalize(&raw, &mut second_latch);
    assert_eq!(first, second);
    assert_eq!(first_latch, second_latch);
    assert!(first.finished);
}
