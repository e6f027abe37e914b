//! NanoDLP adapter: polling-only HTTP service with loosely-typed JSON
//! payloads scraped from the machine's web UI endpoints.

pub mod canonical;

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use orion_config::OrionConfig;
use orion_model::payload::{aliases, bool_field, f64_field, i64_field, str_field};
use orion_model::{
    normalize_z_mm, Canonical, FileRef, ItemLocation, LatchState,
    PhysicalState, PrintData, StatusSnapshot,
};

use crate::client::{BackendClient, MetricReading, StatusStream};
use crate::error::BackendError;
use crate::http::HttpTransport;

/// Adapter for a NanoDLP machine.
///
/// Holds the cancel latch for the session plus the last reported canonical
/// tuple so state changes are logged exactly once. The canonicalization
/// itself is the pure function in [`canonical`].
#[derive(Debug)]
pub struct NanoDlpClient {
    transport: HttpTransport,
    latch: Mutex<LatchState>,
    last_reported: Mutex<Option<Canonical>>,
}

impl NanoDlpClient {
    pub fn new(config: &OrionConfig) -> Result<Self, BackendError> {
        let transport = HttpTransport::new(
            &config.base_url,
            config.http.request_timeout(),
        )?;
        Ok(Self {
            transport,
            latch: Mutex::new(LatchState::new()),
            last_reported: Mutex::new(None),
        })
    }

    fn plate_from_value(value: &Value) -> Option<FileRef> {
        let path = str_field(value, &aliases::FILE_PATH)?;
        let name = str_field(value, &aliases::FILE_NAME)
            .map(str::to_string)
            .unwrap_or_else(|| {
                path.rsplit('/').next().unwrap_or(path).to_string()
            });
        Some(FileRef {
            location: ItemLocation::Local,
            path: path.trim_start_matches('/').to_string(),
            name,
            plate_id: i64_field(value, &aliases::PLATE_ID),
            modified_at: i64_field(value, &aliases::FILE_MODIFIED),
            size: i64_field(value, &aliases::FILE_SIZE)
                .and_then(|s| u64::try_from(s).ok()),
            layer_height_mm: value
                .get("LayerThickness")
                .and_then(Value::as_f64),
            has_thumbnail: bool_field(value, &HAS_IMAGE_ALIASES)
                .unwrap_or(false),
        })
    }
}

const HAS_IMAGE_ALIASES: orion_model::FieldAliases =
    orion_model::FieldAliases {
        field: "has_image",
        candidates: &["HasImage", "ImageGenerated", "has_thumbnail"],
    };

#[async_trait]
impl BackendClient for NanoDlpClient {
    fn kind(&self) -> &'static str {
        "nanodlp"
    }

    async fn get_status(&self) -> Result<Value, BackendError> {
        self.transport.get_json("json/status").await
    }

    fn get_status_stream(&self) -> Result<StatusStream, BackendError> {
        // NanoDLP has no push channel at all; tell the engine to stop
        // asking for the rest of the session.
        Err(BackendError::StreamUnsupported)
    }

    fn parse_status(&self, raw: &Value) -> StatusSnapshot {
        let canonical = {
            let mut latch = self.latch.lock().unwrap();
            canonical::canonicalize(raw, &mut latch)
        };

        {
            let mut last = self.last_reported.lock().unwrap();
            if *last != Some(canonical) {
                log::debug!(
                    "[NanoDlp] state change: code={} status={} cancel_latched={} pause_latched={} finished={}",
                    canonical.state_code,
                    canonical.status.as_str(),
                    canonical.cancel_latched,
                    canonical.pause_latched,
                    canonical.finished,
                );
                *last = Some(canonical);
            }
        }

        let file_data = str_field(raw, &aliases::FILE_PATH)
            .filter(|p| !p.is_empty())
            .map(|path| FileRef {
                location: ItemLocation::Local,
                path: path.trim_start_matches('/').to_string(),
                name: path.rsplit('/').next().unwrap_or(path).to_string(),
                plate_id: i64_field(raw, &aliases::PLATE_ID),
                modified_at: i64_field(raw, &aliases::FILE_MODIFIED),
                size: None,
                layer_height_mm: None,
                has_thumbnail: false,
            });

        StatusSnapshot {
            status: canonical.status,
            layer: i64_field(raw, &aliases::LAYER),
            layer_count: i64_field(raw, &aliases::LAYER_COUNT),
            physical_state: PhysicalState {
                z: f64_field(raw, &aliases::Z_HEIGHT)
                    .map(normalize_z_mm)
                    .unwrap_or(0.0),
            },
            print_data: PrintData { file_data },
            cancel_latched: Some(canonical.cancel_latched),
            pause_latched: Some(canonical.pause_latched),
            finished: Some(canonical.finished),
        }
    }

    fn reset_session(&self) {
        self.latch.lock().unwrap().reset();
        *self.last_reported.lock().unwrap() = None;
    }

    async fn list_items(
        &self,
        location: ItemLocation,
        subdirectory: &str,
    ) -> Result<Vec<FileRef>, BackendError> {
        if location != ItemLocation::Local {
            return Err(BackendError::Unsupported("USB browsing"));
        }
        let raw = self.transport.get_json("json/plates").await?;
        let plates = raw.as_array().cloned().unwrap_or_default();
        let prefix = subdirectory.trim_matches('/');
        Ok(plates
            .iter()
            .filter_map(Self::plate_from_value)
            .filter(|file| {
                prefix.is_empty()
                    || file
                        .path
                        .to_ascii_lowercase()
                        .starts_with(&prefix.to_ascii_lowercase())
            })
            .collect())
    }

    async fn get_file_metadata(
        &self,
        location: ItemLocation,
        path: &str,
    ) -> Result<FileRef, BackendError> {
        let wanted = path.trim_start_matches('/').to_ascii_lowercase();
        let items = self.list_items(location, "").await?;
        items
            .into_iter()
            .find(|item| item.path.to_ascii_lowercase() == wanted)
            .ok_or_else(|| BackendError::Http {
                status: 404,
                body: format!("no plate matches {path}"),
            })
    }

    async fn get_file_thumbnail(
        &self,
        file: &FileRef,
    ) -> Result<Vec<u8>, BackendError> {
        let plate_id = file.plate_id.ok_or(BackendError::Http {
            status: 404,
            body: "file has no plate id".to_string(),
        })?;
        self.transport
            .get_bytes(&format!("static/plates/{plate_id}/3d.png"))
            .await
    }

    async fn start_print(&self, file: &FileRef) -> Result<(), BackendError> {
        let plate_id = file.plate_id.ok_or(BackendError::Http {
            status: 404,
            body: "file has no plate id".to_string(),
        })?;
        self.transport
            .post_empty(&format!("printer/start/{plate_id}"))
            .await
    }

    async fn cancel_print(&self) -> Result<(), BackendError> {
        self.transport.post_empty("printer/stop").await
    }

    async fn pause_print(&self) -> Result<(), BackendError> {
        self.transport.post_empty("printer/pause").await
    }

    async fn resume_print(&self) -> Result<(), BackendError> {
        self.transport.post_empty("printer/resume").await
    }

    async fn move_to(&self, z_mm: f64) -> Result<(), BackendError> {
        // NanoDLP's motion endpoint takes microns.
        let microns = (z_mm * 1_000.0).round() as i64;
        self.transport
            .post_empty(&format!("z-axis/move/{microns}"))
            .await
    }

    async fn move_delta(&self, delta_mm: f64) -> Result<(), BackendError> {
        let microns = (delta_mm * 1_000.0).round() as i64;
        self.transport
            .post_empty(&format!("z-axis/move-by/{microns}"))
            .await
    }

    async fn manual_home(&self) -> Result<(), BackendError> {
        self.transport.post_empty("z-axis/calibrate").await
    }

    async fn manual_cure(&self, on: bool) -> Result<(), BackendError> {
        let state = if on { "on" } else { "off" };
        self.transport
            .post_empty(&format!("projector/{state}"))
            .await
    }

    async fn manual_command(
        &self,
        command: &str,
    ) -> Result<(), BackendError> {
        self.transport
            .post_json("printer/gcode", &json!({ "gcode": command }))
            .await
    }

    async fn get_analytics(
        &self,
        count: u32,
    ) -> Result<Vec<MetricReading>, BackendError> {
        let raw = self
            .transport
            .get_json(&format!("json/analytics?count={count}"))
            .await?;
        let entries = raw.as_array().cloned().unwrap_or_default();
        Ok(entries
            .iter()
            .filter_map(|entry| {
                let metric_id = entry.get("SensorID")?.as_i64()?;
                let value = entry.get("Value")?.as_f64()?;
                Some(MetricReading { metric_id, value })
            })
            .collect())
    }

    async fn get_analytic_value(
        &self,
        metric_id: i64,
    ) -> Result<f64, BackendError> {
        let raw = self
            .transport
            .get_json(&format!("json/analytics/{metric_id}"))
            .await?;
        raw.get("Value")
            .and_then(Value::as_f64)
            .or_else(|| raw.as_f64())
            .ok_or(BackendError::Http {
                status: 200,
                body: "analytics payload missing Value".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orion_model::PrintStatus;
    use serde_json::json;

    fn client() -> NanoDlpClient {
        let mut config = OrionConfig::default();
        config.base_url = "http://127.0.0.1:1".to_string();
        NanoDlpClient::new(&config).unwrap()
    }

    #[test]
    fn parse_status_normalizes_micron_heights() {
        let client = client();
        let snapshot = client.parse_status(&json!({
            "Status": 5,
            "LayerID": 10,
            "LayersCount": 100,
            "CurrentHeight": 52_500,
            "Path": "/prints/benchy.sl1",
        }));
        assert_eq!(snapshot.status, PrintStatus::Printing);
        assert_eq!(snapshot.physical_state.z, 52.5);
        assert_eq!(snapshot.progress(), Some(0.1));
        let file = snapshot.print_data.file_data.unwrap();
        assert_eq!(file.path, "prints/benchy.sl1");
        assert_eq!(file.name, "benchy.sl1");
    }

    #[test]
    fn parse_status_latches_across_calls() {
        let client = client();
        client.parse_status(&json!({ "Status": 4 }));
        let idle = client.parse_status(&json!({ "Status": 0 }));
        assert_eq!(idle.status, PrintStatus::Idle);
        assert_eq!(idle.cancel_latched, Some(true));

        client.reset_session();
        let idle = client.parse_status(&json!({ "Status": 0 }));
        assert_eq!(idle.cancel_latched, Some(false));
    }

    #[test]
    fn stream_is_reported_unsupported() {
        let client = client();
        assert!(matches!(
            client.get_status_stream(),
            Err(BackendError::StreamUnsupported)
        ));
    }

    #[test]
    fn plates_parse_with_alias_fallbacks() {
        let plate = NanoDlpClient::plate_from_value(&json!({
            "PlateID": 7,
            "Path": "/prints/tower.sl1",
            "UpdatedAt": 1_700_000_000,
            "FileSize": 123_456,
            "LayerThickness": 0.05,
            "HasImage": true,
        }))
        .unwrap();
        assert_eq!(plate.plate_id, Some(7));
        assert_eq!(plate.path, "prints/tower.sl1");
        assert_eq!(plate.name, "tower.sl1");
        assert!(plate.has_thumbnail);
        assert_eq!(plate.layer_height_mm, Some(0.05));
    }
}
