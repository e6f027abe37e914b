//! Candidate-key resolution for loosely-typed backend payloads.
//!
//! Neither backend has a stable, documented schema: NanoDLP renames fields
//! between firmware versions and Odyssey nests the same value at different
//! depths depending on endpoint. Rather than scattering `if let` chains
//! through the adapters, each canonical attribute has an ordered list of
//! candidate key paths and a single "first present wins" lookup. Adding a
//! new backend quirk is a table edit, not new control flow.

use serde_json::Value;

/// Ordered candidate key paths for one canonical attribute. Each candidate
/// is a `/`-separated path into the JSON object.
#[derive(Debug, Clone, Copy)]
pub struct FieldAliases {
    pub field: &'static str,
    pub candidates: &'static [&'static str],
}

/// Alias tables for every canonical attribute the core reads.
///
/// Order matters: earlier candidates are the modern/preferred spellings,
/// later ones are legacy fallbacks. Preserve the order when porting.
pub mod aliases {
    use super::FieldAliases;

    pub const STATE_CODE: FieldAliases = FieldAliases {
        field: "state_code",
        candidates: &["Status", "State", "state"],
    };
    pub const PRINTING: FieldAliases = FieldAliases {
        field: "printing",
        candidates: &["Printing", "printing", "is_printing"],
    };
    pub const PAUSED: FieldAliases = FieldAliases {
        field: "paused",
        candidates: &["Paused", "paused", "is_paused"],
    };
    pub const STATUS_TEXT: FieldAliases = FieldAliases {
        field: "status_text",
        candidates: &["status", "StatusText", "state_text"],
    };
    pub const LAYER: FieldAliases = FieldAliases {
        field: "layer",
        candidates: &["layer", "LayerID", "CurrentLayer"],
    };
    pub const LAYER_COUNT: FieldAliases = FieldAliases {
        field: "layer_count",
        candidates: &[
            "layer_count",
            "LayersCount",
            "TotalLayers",
            "print_data/layer_count",
        ],
    };
    pub const Z_HEIGHT: FieldAliases = FieldAliases {
        field: "z",
        candidates: &[
            "physical_state/z",
            "CurrentHeight",
            "ZHeight",
            "z",
        ],
    };
    pub const Z_MICRONS: FieldAliases = FieldAliases {
        field: "z_microns",
        candidates: &["physical_state/z_microns"],
    };
    pub const FILE_PATH: FieldAliases = FieldAliases {
        field: "file_path",
        candidates: &[
            "print_data/file_data/path",
            "path",
            "Path",
            "FilePath",
            "file",
        ],
    };
    pub const FILE_NAME: FieldAliases = FieldAliases {
        field: "file_name",
        candidates: &[
            "print_data/file_data/name",
            "name",
            "FileName",
            "filename",
        ],
    };
    pub const PLATE_ID: FieldAliases = FieldAliases {
        field: "plate_id",
        candidates: &["PlateID", "plate_id", "print_data/plate_id"],
    };
    pub const FILE_MODIFIED: FieldAliases = FieldAliases {
        field: "file_modified",
        candidates: &[
            "print_data/file_data/last_modified",
            "last_modified",
            "UpdatedAt",
            "modified",
        ],
    };
    pub const FILE_SIZE: FieldAliases = FieldAliases {
        field: "file_size",
        candidates: &[
            "print_data/file_data/file_size",
            "file_size",
            "FileSize",
            "size",
        ],
    };
}

/// Flat list of every alias table, mostly useful for diagnostics.
pub const ALIASES: &[FieldAliases] = &[
    aliases::STATE_CODE,
    aliases::PRINTING,
    aliases::PAUSED,
    aliases::STATUS_TEXT,
    aliases::LAYER,
    aliases::LAYER_COUNT,
    aliases::Z_HEIGHT,
    aliases::Z_MICRONS,
    aliases::FILE_PATH,
    aliases::FILE_NAME,
    aliases::PLATE_ID,
    aliases::FILE_MODIFIED,
    aliases::FILE_SIZE,
];

fn lookup_path<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = root;
    for segment in path.split('/') {
        current = current.get(segment)?;
    }
    if current.is_null() { None } else { Some(current) }
}

/// Resolve the first present, non-null candidate for an attribute.
pub fn first_present<'v>(
    payload: &'v Value,
    spec: &FieldAliases,
) -> Option<&'v Value> {
    spec.candidates
        .iter()
        .find_map(|path| lookup_path(payload, path))
}

/// Resolve an attribute as a string slice.
pub fn str_field<'v>(payload: &'v Value, spec: &FieldAliases) -> Option<&'v str> {
    first_present(payload, spec).and_then(Value::as_str)
}

/// Resolve an attribute as an `f64`. Numeric strings are accepted because
/// NanoDLP occasionally quotes numbers.
pub fn f64_field(payload: &Value, spec: &FieldAliases) -> Option<f64> {
    let value = first_present(payload, spec)?;
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Resolve an attribute as an `i64`, tolerating quoted numbers.
pub fn i64_field(payload: &Value, spec: &FieldAliases) -> Option<i64> {
    let value = first_present(payload, spec)?;
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Resolve an attribute as a bool. Accepts real booleans, 0/1 numerics, and
/// "true"/"false" strings.
pub fn bool_field(payload: &Value, spec: &FieldAliases) -> Option<bool> {
    let value = first_present(payload, spec)?;
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim() {
            "true" | "True" | "1" => Some(true),
            "false" | "False" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_candidate_wins() {
        let payload = json!({"Status": 5, "State": 3});
        assert_eq!(i64_field(&payload, &aliases::STATE_CODE), Some(5));
    }

    #[test]
    fn falls_through_null_candidates() {
        let payload = json!({"Status": null, "State": 3});
        assert_eq!(i64_field(&payload, &aliases::STATE_CODE), Some(3));
    }

    #[test]
    fn nested_paths_resolve() {
        let payload = json!({
            "physical_state": {"z": 1.25},
            "print_data": {"file_data": {"path": "a/b.sl1"}}
        });
        assert_eq!(f64_field(&payload, &aliases::Z_HEIGHT), Some(1.25));
        assert_eq!(str_field(&payload, &aliases::FILE_PATH), Some("a/b.sl1"));
    }

    #[test]
    fn quoted_numbers_are_tolerated() {
        let payload = json!({"LayerID": "42"});
        assert_eq!(i64_field(&payload, &aliases::LAYER), Some(42));
    }

    #[test]
    fn boolean_spellings() {
        assert_eq!(
            bool_field(&json!({"Paused": 1}), &aliases::PAUSED),
            Some(true)
        );
        assert_eq!(
            bool_field(&json!({"paused": "false"}), &aliases::PAUSED),
            Some(false)
        );
        assert_eq!(bool_field(&json!({}), &aliases::PAUSED), None);
    }
}
