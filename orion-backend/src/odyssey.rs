//! Odyssey adapter: push-capable REST service with an SSE status stream.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use orion_config::OrionConfig;
use orion_model::payload::{aliases, bool_field, f64_field, i64_field, str_field};
use orion_model::{
    ticks_to_mm, FieldAliases, FileRef, ItemLocation, PhysicalState,
    PrintData, PrintStatus, StatusSnapshot,
};

use crate::client::{BackendClient, MetricReading, StatusStream, StreamEvent};
use crate::error::BackendError;
use crate::http::HttpTransport;

/// Metric ids Odyssey exposes through its status payload. The analytics
/// layer rides the status stream for this backend, so samples come from
/// here rather than a separate endpoint.
pub mod metric {
    pub const PRESSURE: i64 = 0;
    pub const Z_HEIGHT: i64 = 1;
}

const PRESSURE_ALIASES: FieldAliases = FieldAliases {
    field: "pressure",
    candidates: &["physical_state/pressure", "pressure"],
};

/// Pull scalar telemetry out of an Odyssey-shaped payload. Shared with the
/// simulated backend.
pub fn extract_metrics_payload(raw: &Value) -> Vec<MetricReading> {
    let mut readings = Vec::new();
    if let Some(pressure) = f64_field(raw, &PRESSURE_ALIASES) {
        readings.push(MetricReading {
            metric_id: metric::PRESSURE,
            value: pressure,
        });
    }
    if let Some(z) = f64_field(raw, &aliases::Z_HEIGHT) {
        readings.push(MetricReading {
            metric_id: metric::Z_HEIGHT,
            value: ticks_to_mm(z),
        });
    }
    readings
}

/// Parse an Odyssey-shaped status payload into the canonical snapshot.
/// Shared with the simulated backend, which emits the same shape.
pub fn parse_status_payload(raw: &Value) -> StatusSnapshot {
    let paused = bool_field(raw, &aliases::PAUSED) == Some(true);
    let status_text = str_field(raw, &aliases::STATUS_TEXT)
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let status = match status_text.as_str() {
        "printing" if paused => PrintStatus::Paused,
        "printing" => PrintStatus::Printing,
        "paused" => PrintStatus::Paused,
        "pausing" => PrintStatus::Pausing,
        "canceling" => PrintStatus::Canceling,
        "idle" | "shutdown" => PrintStatus::Idle,
        _ => PrintStatus::Unknown,
    };

    let layer = i64_field(raw, &aliases::LAYER);
    let layer_count = i64_field(raw, &aliases::LAYER_COUNT);
    let file_data = raw
        .pointer("/print_data/file_data")
        .and_then(OdysseyClient::file_from_value);
    let finished = status == PrintStatus::Idle
        && (layer.is_some_and(|l| l > 0) || file_data.is_some());

    StatusSnapshot {
        status,
        layer,
        layer_count,
        physical_state: PhysicalState {
            // Odyssey reports raw motor ticks.
            z: f64_field(raw, &aliases::Z_HEIGHT)
                .map(ticks_to_mm)
                .unwrap_or(0.0),
        },
        print_data: PrintData { file_data },
        cancel_latched: None,
        pause_latched: None,
        finished: Some(finished),
    }
}

/// Adapter for an Odyssey print engine.
///
/// Stateless beyond the HTTP client: Odyssey reports unambiguous status
/// strings, so no latching memory is needed on this side.
#[derive(Debug)]
pub struct OdysseyClient {
    transport: HttpTransport,
    base_url: String,
}

impl OdysseyClient {
    pub fn new(config: &OrionConfig) -> Result<Self, BackendError> {
        let transport = HttpTransport::new(
            &config.base_url,
            config.http.request_timeout(),
        )?;
        Ok(Self {
            transport,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn file_from_value(value: &Value) -> Option<FileRef> {
        let path = str_field(value, &aliases::FILE_PATH)?;
        let location = value
            .get("location_category")
            .and_then(Value::as_str)
            .and_then(|raw| ItemLocation::parse(raw).ok())
            .unwrap_or_default();
        Some(FileRef {
            location,
            path: path.trim_start_matches('/').to_string(),
            name: str_field(value, &aliases::FILE_NAME)
                .map(str::to_string)
                .unwrap_or_else(|| {
                    path.rsplit('/').next().unwrap_or(path).to_string()
                }),
            plate_id: None,
            modified_at: i64_field(value, &aliases::FILE_MODIFIED),
            size: i64_field(value, &aliases::FILE_SIZE)
                .and_then(|s| u64::try_from(s).ok()),
            layer_height_mm: value
                .get("layer_height")
                .and_then(Value::as_f64),
            has_thumbnail: value
                .get("has_thumbnail")
                .and_then(Value::as_bool)
                .unwrap_or(true),
        })
    }
}

#[async_trait]
impl BackendClient for OdysseyClient {
    fn kind(&self) -> &'static str {
        "odyssey"
    }

    async fn get_status(&self) -> Result<Value, BackendError> {
        self.transport.get_json("status").await
    }

    fn get_status_stream(&self) -> Result<StatusStream, BackendError> {
        let url = format!("{}/status/events", self.base_url);
        log::info!("[Odyssey] opening SSE connection to {}", url);

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut source = reqwest_eventsource::EventSource::get(&url);
            while let Some(event) = source.next().await {
                let forwarded = match event {
                    Ok(reqwest_eventsource::Event::Open) => {
                        Ok(StreamEvent::Open)
                    }
                    Ok(reqwest_eventsource::Event::Message(msg)) => {
                        // Keepalives carry no payload; skip them silently.
                        if msg.data.is_empty() || msg.data == "keepalive" {
                            continue;
                        }
                        match serde_json::from_str::<Value>(&msg.data) {
                            Ok(value) => Ok(StreamEvent::Status(value)),
                            Err(err) => {
                                log::warn!(
                                    "[Odyssey] unparseable SSE payload: {}",
                                    err
                                );
                                continue;
                            }
                        }
                    }
                    Err(err) => Err(BackendError::Stream(err.to_string())),
                };
                let errored = forwarded.is_err();
                if tx.send(forwarded).is_err() {
                    // Receiver dropped; the engine moved on.
                    break;
                }
                if errored {
                    // The engine owns reconnection policy; one error ends
                    // this subscription rather than letting EventSource
                    // retry behind its back.
                    break;
                }
            }
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    fn parse_status(&self, raw: &Value) -> StatusSnapshot {
        parse_status_payload(raw)
    }

    fn extract_metrics(&self, raw: &Value) -> Vec<MetricReading> {
        extract_metrics_payload(raw)
    }

    async fn list_items(
        &self,
        location: ItemLocation,
        subdirectory: &str,
    ) -> Result<Vec<FileRef>, BackendError> {
        let raw = self
            .transport
            .get_json(&format!(
                "files/{}?subdirectory={}",
                location.as_str(),
                subdirectory.trim_matches('/'),
            ))
            .await?;
        let entries = raw
            .get("files")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(entries.iter().filter_map(Self::file_from_value).collect())
    }

    async fn get_file_metadata(
        &self,
        location: ItemLocation,
        path: &str,
    ) -> Result<FileRef, BackendError> {
        let raw = self
            .transport
            .get_json(&format!(
                "files/{}/metadata?path={}",
                location.as_str(),
                path.trim_start_matches('/'),
            ))
            .await?;
        Self::file_from_value(&raw).ok_or(BackendError::Http {
            status: 200,
            body: "metadata payload missing file fields".to_string(),
        })
    }

    async fn get_file_thumbnail(
        &self,
        file: &FileRef,
    ) -> Result<Vec<u8>, BackendError> {
        self.transport
            .get_bytes(&format!(
                "files/{}/thumbnail?path={}",
                file.location.as_str(),
                file.path,
            ))
            .await
    }

    async fn start_print(&self, file: &FileRef) -> Result<(), BackendError> {
        self.transport
            .post_json(
                "print/start",
                &json!({
                    "location": file.location.as_str(),
                    "path": file.path,
                }),
            )
            .await
    }

    async fn cancel_print(&self) -> Result<(), BackendError> {
        self.transport.post_empty("print/cancel").await
    }

    async fn pause_print(&self) -> Result<(), BackendError> {
        self.transport.post_empty("print/pause").await
    }

    async fn resume_print(&self) -> Result<(), BackendError> {
        self.transport.post_empty("print/resume").await
    }

    async fn move_to(&self, z_mm: f64) -> Result<(), BackendError> {
        self.transport
            .post_json("manual/move", &json!({ "z": z_mm }))
            .await
    }

    async fn move_delta(&self, delta_mm: f64) -> Result<(), BackendError> {
        self.transport
            .post_json("manual/move_delta", &json!({ "delta": delta_mm }))
            .await
    }

    async fn manual_home(&self) -> Result<(), BackendError> {
        self.transport.post_empty("manual/home").await
    }

    async fn manual_cure(&self, on: bool) -> Result<(), BackendError> {
        self.transport
            .post_json("manual/cure", &json!({ "cure": on }))
            .await
    }

    async fn manual_command(
        &self,
        command: &str,
    ) -> Result<(), BackendError> {
        self.transport
            .post_json("manual/command", &json!({ "command": command }))
            .await
    }

    async fn get_analytics(
        &self,
        count: u32,
    ) -> Result<Vec<MetricReading>, BackendError> {
        // Odyssey has no separate analytics endpoint; the freshest status
        // payload is the source of truth.
        let raw = self.get_status().await?;
        let mut readings = self.extract_metrics(&raw);
        readings.truncate(count as usize);
        Ok(readings)
    }

    async fn get_analytic_value(
        &self,
        metric_id: i64,
    ) -> Result<f64, BackendError> {
        let raw = self.get_status().await?;
        self.extract_metrics(&raw)
            .into_iter()
            .find(|reading| reading.metric_id == metric_id)
            .map(|reading| reading.value)
            .ok_or(BackendError::Unsupported("unknown metric id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> OdysseyClient {
        let mut config = OrionConfig::default();
        config.base_url = "http://127.0.0.1:1".to_string();
        OdysseyClient::new(&config).unwrap()
    }

    #[test]
    fn parse_status_converts_ticks_to_mm() {
        let snapshot = client().parse_status(&json!({
            "status": "Printing",
            "paused": false,
            "layer": 4,
            "layer_count": 40,
            "physical_state": { "z": 320 },
        }));
        assert_eq!(snapshot.status, PrintStatus::Printing);
        assert_eq!(snapshot.physical_state.z, 0.05);
    }

    #[test]
    fn paused_bool_overrides_printing_text() {
        let snapshot = client().parse_status(&json!({
            "status": "Printing",
            "paused": true,
        }));
        assert_eq!(snapshot.status, PrintStatus::Paused);
    }

    #[test]
    fn idle_with_job_evidence_is_finished() {
        let snapshot = client().parse_status(&json!({
            "status": "Idle",
            "layer": 100,
        }));
        assert_eq!(snapshot.finished, Some(true));

        let fresh = client().parse_status(&json!({ "status": "Idle" }));
        assert_eq!(fresh.finished, Some(false));
    }

    #[test]
    fn metrics_come_from_the_status_payload() {
        let readings = client().extract_metrics(&json!({
            "physical_state": { "z": 6400, "pressure": 1.5 },
        }));
        assert!(readings.contains(&MetricReading {
            metric_id: metric::PRESSURE,
            value: 1.5,
        }));
        assert!(readings.contains(&MetricReading {
            metric_id: metric::Z_HEIGHT,
            value: 1.0,
        }));
    }
}
