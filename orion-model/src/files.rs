use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Storage location a printable file lives on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ItemLocation {
    #[default]
    Local,
    Usb,
}

impl ItemLocation {
    /// Parse a backend location string (`"local"`, `"usb"`, or a raw mount
    /// path containing `usb`).
    pub fn parse(raw: &str) -> Result<Self> {
        let lowered = raw.to_ascii_lowercase();
        if lowered == "local" {
            Ok(ItemLocation::Local)
        } else if lowered == "usb" || lowered.contains("/usb") {
            Ok(ItemLocation::Usb)
        } else {
            Err(ModelError::UnknownLocation(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemLocation::Local => "local",
            ItemLocation::Usb => "usb",
        }
    }
}

/// Requested thumbnail size class. Pixel dimensions are fixed per class so
/// cache entries for different consumers never alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThumbnailSize {
    /// 400x400, file listing tiles.
    Small,
    /// 800x480, the full-screen print status backdrop.
    Large,
}

impl ThumbnailSize {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ThumbnailSize::Small => (400, 400),
            ThumbnailSize::Large => (800, 480),
        }
    }
}

/// Reference to a printable file as reported by a backend.
///
/// Identity for caching purposes prefers `path` + `modified_at` + `size`
/// over `plate_id`: NanoDLP reassigns plate ids when a file is replaced, so
/// the numeric id is not stable enough to key a cache on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FileRef {
    pub location: ItemLocation,
    /// Path relative to the location root, without a leading slash.
    pub path: String,
    /// Display name (last path component).
    pub name: String,
    /// Backend-assigned numeric id, when the backend has one.
    pub plate_id: Option<i64>,
    /// Last modification time, seconds since the epoch.
    pub modified_at: Option<i64>,
    /// File size in bytes.
    pub size: Option<u64>,
    /// Layer height in millimeters, when known.
    pub layer_height_mm: Option<f64>,
    /// Whether the backend claims a preview image exists for this file.
    pub has_thumbnail: bool,
}

impl FileRef {
    /// Normalized path candidates used when matching this reference against
    /// a backend listing: as-is, without a leading slash, and bare name.
    /// Comparison is case-insensitive on the caller's side.
    pub fn path_candidates(&self) -> Vec<String> {
        let mut candidates = vec![self.path.clone()];
        if let Some(stripped) = self.path.strip_prefix('/') {
            candidates.push(stripped.to_string());
        } else {
            candidates.push(format!("/{}", self.path));
        }
        if !self.name.is_empty() && self.name != self.path {
            candidates.push(self.name.clone());
        }
        candidates
    }

    /// Subdirectory component of `path`, or the empty string for files at
    /// the location root.
    pub fn subdirectory(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[..idx],
            None => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_parses_mount_paths() {
        assert_eq!(ItemLocation::parse("local").unwrap(), ItemLocation::Local);
        assert_eq!(ItemLocation::parse("USB").unwrap(), ItemLocation::Usb);
        assert_eq!(
            ItemLocation::parse("/mnt/usb0").unwrap(),
            ItemLocation::Usb
        );
        assert!(ItemLocation::parse("sdcard").is_err());
    }

    #[test]
    fn path_candidates_cover_slash_variants() {
        let file = FileRef {
            path: "prints/benchy.sl1".to_string(),
            name: "benchy.sl1".to_string(),
            ..Default::default()
        };
        let candidates = file.path_candidates();
        assert!(candidates.contains(&"prints/benchy.sl1".to_string()));
        assert!(candidates.contains(&"/prints/benchy.sl1".to_string()));
        assert!(candidates.contains(&"benchy.sl1".to_string()));
    }

    #[test]
    fn subdirectory_of_root_file_is_empty() {
        let file = FileRef {
            path: "benchy.sl1".to_string(),
            ..Default::default()
        };
        assert_eq!(file.subdirectory(), "");

        let nested = FileRef {
            path: "a/b/benchy.sl1".to_string(),
            ..Default::default()
        };
        assert_eq!(nested.subdirectory(), "a/b");
    }
}
