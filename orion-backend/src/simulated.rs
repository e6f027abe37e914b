//! Deterministic simulated backend for developer mode and tests.
//!
//! Emits Odyssey-shaped payloads so the shared parser applies. Every
//! `get_status` call advances a scripted job by one layer; there is no
//! wall-clock dependence, which keeps tests reproducible.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use orion_model::{FileRef, ItemLocation, StatusSnapshot};

use crate::client::{BackendClient, MetricReading, StatusStream, StreamEvent};
use crate::error::BackendError;
use crate::odyssey::{self, parse_status_payload};

const SIM_LAYER_COUNT: i64 = 60;
const SIM_LAYER_HEIGHT_MM: f64 = 0.05;
const STREAM_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
struct SimState {
    step: u64,
    job: Option<SimJob>,
}

#[derive(Debug, Clone)]
struct SimJob {
    file: FileRef,
    layer: i64,
    paused: bool,
    canceling: bool,
}

/// Simulated printer backend.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBackend {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn demo_files() -> Vec<FileRef> {
        vec![
            FileRef {
                location: ItemLocation::Local,
                path: "demo/benchy.sl1".to_string(),
                name: "benchy.sl1".to_string(),
                plate_id: Some(1),
                modified_at: Some(1_700_000_000),
                size: Some(4_194_304),
                layer_height_mm: Some(SIM_LAYER_HEIGHT_MM),
                has_thumbnail: true,
            },
            FileRef {
                location: ItemLocation::Usb,
                path: "tower.sl1".to_string(),
                name: "tower.sl1".to_string(),
                plate_id: Some(2),
                modified_at: Some(1_700_000_100),
                size: Some(8_388_608),
                layer_height_mm: Some(SIM_LAYER_HEIGHT_MM),
                has_thumbnail: false,
            },
        ]
    }

    fn build_payload(state: &mut SimState) -> Value {
        state.step += 1;
        match &mut state.job {
            Some(job) if job.canceling => {
                let payload = json!({
                    "status": "Canceling",
                    "paused": false,
                    "layer": job.layer,
                    "layer_count": SIM_LAYER_COUNT,
                    "physical_state": { "z": job.layer * 320 },
                });
                state.job = None;
                payload
            }
            Some(job) => {
                if !job.paused && job.layer < SIM_LAYER_COUNT {
                    job.layer += 1;
                }
                let finished = job.layer >= SIM_LAYER_COUNT;
                let payload = json!({
                    "status": if finished { "Idle" } else { "Printing" },
                    "paused": job.paused,
                    "layer": job.layer,
                    "layer_count": SIM_LAYER_COUNT,
                    "physical_state": {
                        "z": job.layer * 320,
                        "pressure": ((state.step % 20) as f64 - 10.0) / 10.0,
                    },
                    "print_data": { "file_data": {
                        "path": job.file.path,
                        "name": job.file.name,
                        "location_category": job.file.location.as_str(),
                        "last_modified": job.file.modified_at,
                        "file_size": job.file.size,
                    }},
                });
                if finished {
                    state.job = None;
                }
                payload
            }
            None => json!({
                "status": "Idle",
                "paused": false,
                "physical_state": {
                    "z": 0,
                    "pressure": ((state.step % 20) as f64 - 10.0) / 10.0,
                },
            }),
        }
    }
}

#[async_trait]
impl BackendClient for SimulatedBackend {
    fn kind(&self) -> &'static str {
        "simulated"
    }

    async fn get_status(&self) -> Result<Value, BackendError> {
        let mut state = self.state.lock().unwrap();
        Ok(Self::build_payload(&mut state))
    }

    fn get_status_stream(&self) -> Result<StatusStream, BackendError> {
        // No push channel to simulate; a fixed-interval poll wrapped as a
        // stream satisfies the contract.
        let state = Arc::clone(&self.state);
        Ok(Box::pin(async_stream::stream! {
            yield Ok(StreamEvent::Open);
            loop {
                tokio::time::sleep(STREAM_INTERVAL).await;
                let payload = {
                    let mut state = state.lock().unwrap();
                    SimulatedBackend::build_payload(&mut state)
                };
                yield Ok(StreamEvent::Status(payload));
            }
        }))
    }

    fn parse_status(&self, raw: &Value) -> StatusSnapshot {
        parse_status_payload(raw)
    }

    fn extract_metrics(&self, raw: &Value) -> Vec<MetricReading> {
        // Same payload shape as Odyssey, same extraction.
        odyssey::extract_metrics_payload(raw)
    }

    async fn list_items(
        &self,
        location: ItemLocation,
        subdirectory: &str,
    ) -> Result<Vec<FileRef>, BackendError> {
        let prefix = subdirectory.trim_matches('/').to_ascii_lowercase();
        Ok(Self::demo_files()
            .into_iter()
            .filter(|file| file.location == location)
            .filter(|file| {
                prefix.is_empty()
                    || file.path.to_ascii_lowercase().starts_with(&prefix)
            })
            .collect())
    }

    async fn get_file_metadata(
        &self,
        location: ItemLocation,
        path: &str,
    ) -> Result<FileRef, BackendError> {
        let wanted = path.trim_start_matches('/').to_ascii_lowercase();
        Self::demo_files()
            .into_iter()
            .filter(|file| file.location == location)
            .find(|file| file.path.to_ascii_lowercase() == wanted)
            .ok_or(BackendError::Http {
                status: 404,
                body: format!("no simulated file at {path}"),
            })
    }

    async fn get_file_thumbnail(
        &self,
        file: &FileRef,
    ) -> Result<Vec<u8>, BackendError> {
        if !file.has_thumbnail {
            return Err(BackendError::Http {
                status: 404,
                body: "no preview for this file".to_string(),
            });
        }
        // Deterministic fake image bytes; nothing downstream decodes them.
        Ok(file.path.bytes().cycle().take(256).collect())
    }

    async fn start_print(&self, file: &FileRef) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.job = Some(SimJob {
            file: file.clone(),
            layer: 0,
            paused: false,
            canceling: false,
        });
        Ok(())
    }

    async fn cancel_print(&self) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = &mut state.job {
            job.canceling = true;
        }
        Ok(())
    }

    async fn pause_print(&self) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = &mut state.job {
            job.paused = true;
        }
        Ok(())
    }

    async fn resume_print(&self) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = &mut state.job {
            job.paused = false;
        }
        Ok(())
    }

    async fn move_to(&self, _z_mm: f64) -> Result<(), BackendError> {
        Ok(())
    }

    async fn move_delta(&self, _delta_mm: f64) -> Result<(), BackendError> {
        Ok(())
    }

    async fn manual_home(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn manual_cure(&self, _on: bool) -> Result<(), BackendError> {
        Ok(())
    }

    async fn manual_command(
        &self,
        _command: &str,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    async fn get_analytics(
        &self,
        count: u32,
    ) -> Result<Vec<MetricReading>, BackendError> {
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
    use orion_model::PrintStatus;

    #[tokio::test]
    async fn scripted_job_progresses_and_finishes() {
        let backend = SimulatedBackend::new();
        let file = backend
            .get_file_metadata(ItemLocation::Local, "demo/benchy.sl1")
            .await
            .unwrap();
        backend.start_print(&file).await.unwrap();

        let first = backend.parse_status(&backend.get_status().await.unwrap());
        assert_eq!(first.status, PrintStatus::Printing);
        assert_eq!(first.layer, Some(1));

        for _ in 0..SIM_LAYER_COUNT {
            backend.get_status().await.unwrap();
        }
        let done = backend.parse_status(&backend.get_status().await.unwrap());
        assert_eq!(done.status, PrintStatus::Idle);
    }

    #[tokio::test]
    async fn pause_freezes_layer_progress() {
        let backend = SimulatedBackend::new();
        let file = backend
            .get_file_metadata(ItemLocation::Local, "demo/benchy.sl1")
            .await
            .unwrap();
        backend.start_print(&file).await.unwrap();
        backend.get_status().await.unwrap();
        backend.pause_print().await.unwrap();

        let a = backend.parse_status(&backend.get_status().await.unwrap());
        let b = backend.parse_status(&backend.get_status().await.unwrap());
        assert_eq!(a.status, PrintStatus::Paused);
        assert_eq!(a.layer, b.layer);
    }

    #[tokio::test]
    async fn manual_controls_accept_commands() {
        let backend = SimulatedBackend::new();
        backend.move_to(50.0).await.unwrap();
        backend.move_delta(-0.05).await.unwrap();
        backend.manual_home().await.unwrap();
        backend.manual_cure(true).await.unwrap();
        backend.manual_command("G28").await.unwrap();
    }

    #[tokio::test]
    async fn cancel_drains_to_idle() {
        let backend = SimulatedBackend::new();
        let file = backend
            .get_file_metadata(ItemLocation::Local, "demo/benchy.sl1")
            .await
            .unwrap();
        backend.start_print(&file).await.unwrap();
        backend.cancel_print().await.unwrap();

        let canceling =
            backend.parse_status(&backend.get_status().await.unwrap());
        assert_eq!(canceling.status, PrintStatus::Canceling);

        let idle = backend.parse_status(&backend.get_status().await.unwrap());
        assert_eq!(idle.status, PrintStatus::Idle);
    }
}
