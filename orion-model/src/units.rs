//! Z-height unit normalization.
//!
//! The two backends report the current Z position in different units:
//! Odyssey reports raw motor ticks, NanoDLP reports a bare number that may
//! already be millimeters, or microns, or nanometers depending on firmware
//! version. Everything downstream works in millimeters, so conversion lives
//! here as pure functions. The magnitude thresholds are load-bearing
//! business logic, not formatting.

/// Motor ticks per millimeter of Z travel on the Odyssey stack.
pub const TICKS_PER_MM: f64 = 6400.0;

/// Maximum plausible Z travel of any supported machine, in millimeters.
/// Anything above this after a candidate conversion means the candidate
/// unit was wrong.
pub const Z_TRAVEL_MAX_MM: f64 = 300.0;

/// Convert a raw tick count to millimeters. Fixture: 320 ticks -> 0.05 mm.
pub fn ticks_to_mm(raw_ticks: f64) -> f64 {
    raw_ticks / TICKS_PER_MM
}

/// Normalize a raw Z value of unknown unit to millimeters.
///
/// Heuristic, in order:
/// 1. values <= 1000 are assumed to already be millimeters;
/// 2. otherwise try microns: if `raw / 1e3` lands within the machine's
///    travel, take it;
/// 3. otherwise try nanometers: if `raw / 1e6` lands within travel, take it;
/// 4. otherwise fall back to the micron conversion.
pub fn normalize_z_mm(raw: f64) -> f64 {
    if raw <= 1000.0 {
        return raw;
    }
    let as_microns = raw / 1_000.0;
    if as_microns <= Z_TRAVEL_MAX_MM {
        return as_microns;
    }
    let as_nanometers = raw / 1_000_000.0;
    if as_nanometers <= Z_TRAVEL_MAX_MM {
        return as_nanometers;
    }
    as_microns
}
