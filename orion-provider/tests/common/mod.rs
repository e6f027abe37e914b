//! Scripted in-memory backend for provider integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use orion_backend::{
    BackendClient, BackendError, MetricReading, StatusStream, StreamEvent,
};
use orion_model::{FileRef, ItemLocation, StatusSnapshot};

/// How the scripted backend answers `get_status_stream`.
#[derive(Debug, Clone)]
pub enum StreamScript {
    /// Report streaming as permanently unsupported.
    Unsupported,
    /// Hand out a stream that closes without ever opening.
    EndsImmediately,
    /// Open, then push each payload at 100ms spacing, then stay silent.
    Pushes(Vec<Value>),
}

#[derive(Debug, Default)]
pub struct Counters {
    pub status: AtomicU32,
    pub pause: AtomicU32,
    pub resume: AtomicU32,
    pub cancel: AtomicU32,
    pub thumbnail: AtomicU32,
    pub list: AtomicU32,
}

/// Backend whose responses are scripted by the test. Status payloads are
/// Odyssey-shaped so parsing goes through the real parser.
#[derive(Debug)]
pub struct ScriptedBackend {
    pub counters: Counters,
    status: Mutex<Value>,
    status_fails: AtomicBool,
    stream: Mutex<StreamScript>,
    /// Popped per thumbnail fetch; `true` means succeed with PNG-ish
    /// bytes, `false` means fail. Empty queue repeats the last behavior.
    thumb_script: Mutex<VecDeque<bool>>,
    thumb_last: AtomicBool,
    thumb_delay: Duration,
    pause_fails: AtomicBool,
    cancel_fails: AtomicBool,
    op_delay: Duration,
    files: Mutex<Vec<FileRef>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            counters: Counters::default(),
            status: Mutex::new(idle_payload()),
            status_fails: AtomicBool::new(false),
            stream: Mutex::new(StreamScript::Unsupported),
            thumb_script: Mutex::new(VecDeque::new()),
            thumb_last: AtomicBool::new(true),
            thumb_delay: Duration::from_millis(50),
            pause_fails: AtomicBool::new(false),
            cancel_fails: AtomicBool::new(false),
            op_delay: Duration::from_millis(20),
            files: Mutex::new(Vec::new()),
        }
    }
}

#[allow(dead_code)]
impl ScriptedBackend {
    pub fn set_status(&self, payload: Value) {
        *self.status.lock().unwrap() = payload;
    }

    pub fn set_status_fails(&self, fails: bool) {
        self.status_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_stream(&self, script: StreamScript) {
        *self.stream.lock().unwrap() = script;
    }

    pub fn script_thumbnails(&self, outcomes: &[bool]) {
        let mut script = self.thumb_script.lock().unwrap();
        script.clear();
        script.extend(outcomes.iter().copied());
    }

    pub fn set_pause_fails(&self, fails: bool) {
        self.pause_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_cancel_fails(&self, fails: bool) {
        self.cancel_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_files(&self, files: Vec<FileRef>) {
        *self.files.lock().unwrap() = files;
    }

    pub fn status_calls(&self) -> u32 {
        self.counters.status.load(Ordering::SeqCst)
    }

    pub fn pause_calls(&self) -> u32 {
        self.counters.pause.load(Ordering::SeqCst)
    }

    pub fn resume_calls(&self) -> u32 {
        self.counters.resume.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> u32 {
        self.counters.cancel.load(Ordering::SeqCst)
    }

    pub fn thumbnail_calls(&self) -> u32 {
        self.counters.thumbnail.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendClient for ScriptedBackend {
    fn kind(&self) -> &'static str {
        "scripted"
    }

    async fn get_status(&self) -> Result<Value, BackendError> {
        self.counters.status.fetch_add(1, Ordering::SeqCst);
        if self.status_fails.load(Ordering::SeqCst) {
            return Err(BackendError::Timeout);
        }
        Ok(self.status.lock().unwrap().clone())
    }

    fn get_status_stream(&self) -> Result<StatusStream, BackendError> {
        match self.stream.lock().unwrap().clone() {
            StreamScript::Unsupported => Err(BackendError::StreamUnsupported),
            StreamScript::EndsImmediately => {
                Ok(Box::pin(futures::stream::empty()))
            }
            StreamScript::Pushes(payloads) => {
                let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
                tokio::spawn(async move {
                    if tx.send(Ok(StreamEvent::Open)).is_err() {
                        return;
                    }
                    for payload in payloads {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        if tx.send(Ok(StreamEvent::Status(payload))).is_err()
                        {
                            return;
                        }
                    }
                    // Hold the sender so the stream stays open.
                    std::future::pending::<()>().await;
                });
                Ok(Box::pin(
                    tokio_stream::wrappers::UnboundedReceiverStream::new(rx),
                ))
            }
        }
    }

    fn parse_status(&self, raw: &Value) -> StatusSnapshot {
        orion_backend::odyssey::parse_status_payload(raw)
    }

    fn extract_metrics(&self, raw: &Value) -> Vec<MetricReading> {
        orion_backend::odyssey::extract_metrics_payload(raw)
    }

    async fn list_items(
        &self,
        _location: ItemLocation,
        _subdirectory: &str,
    ) -> Result<Vec<FileRef>, BackendError> {
        self.counters.list.fetch_add(1, Ordering::SeqCst);
        Ok(self.files.lock().unwrap().clone())
    }

    async fn get_file_metadata(
        &self,
        _location: ItemLocation,
        path: &str,
    ) -> Result<FileRef, BackendError> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .find(|f| f.path == path)
            .cloned()
            .ok_or(BackendError::Http {
                status: 404,
                body: "no such file".to_string(),
            })
    }

    async fn get_file_thumbnail(
        &self,
        _file: &FileRef,
    ) -> Result<Vec<u8>, BackendError> {
        self.counters.thumbnail.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.thumb_delay).await;
        let ok = self
            .thumb_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.thumb_last.load(Ordering::SeqCst));
        self.thumb_last.store(ok, Ordering::SeqCst);
        if ok {
            Ok(vec![0x89, b'P', b'N', b'G', 1, 2, 3, 4])
        } else {
            Err(BackendError::Timeout)
        }
    }

    async fn start_print(&self, _file: &FileRef) -> Result<(), BackendError> {
        Ok(())
    }

    async fn cancel_print(&self) -> Result<(), BackendError> {
        self.counters.cancel.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.op_delay).await;
        if self.cancel_fails.load(Ordering::SeqCst) {
            Err(BackendError::Timeout)
        } else {
            Ok(())
        }
    }

    async fn pause_print(&self) -> Result<(), BackendError> {
        self.counters.pause.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.op_delay).await;
        if self.pause_fails.load(Ordering::SeqCst) {
            Err(BackendError::Timeout)
        } else {
            Ok(())
        }
    }

    async fn resume_print(&self) -> Result<(), BackendError> {
        self.counters.resume.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.op_delay).await;
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
        _count: u32,
    ) -> Result<Vec<MetricReading>, BackendError> {
        Ok(Vec::new())
    }

    async fn get_analytic_value(
        &self,
        _metric_id: i64,
    ) -> Result<f64, BackendError> {
        Ok(0.0)
    }
}

/// Odyssey-shaped payload with no job evidence.
#[allow(dead_code)]
pub fn idle_payload() -> Value {
    json!({ "status": "Idle" })
}

/// Odyssey-shaped payload for an in-progress print with a file attached.
#[allow(dead_code)]
pub fn printing_payload(layer: i64) -> Value {
    json!({
        "status": "Printing",
        "paused": false,
        "layer": layer,
        "layer_count": 100,
        "physical_state": { "z": layer * 320 },
        "print_data": {
            "file_data": {
                "path": "prints/benchy.sl1",
                "name": "benchy.sl1",
                "last_modified": 1_700_000_000,
                "file_size": 4096,
                "location_category": "local",
                "has_thumbnail": true,
            }
        }
    })
}

/// Like `printing_payload` but reporting the paused flag.
#[allow(dead_code)]
pub fn paused_payload(layer: i64) -> Value {
    let mut payload = printing_payload(layer);
    payload["paused"] = json!(true);
    payload
}

#[allow(dead_code)]
pub fn sample_file() -> FileRef {
    FileRef {
        location: ItemLocation::Local,
        path: "prints/benchy.sl1".to_string(),
        name: "benchy.sl1".to_string(),
        plate_id: None,
        modified_at: Some(1_700_000_000),
        size: Some(4096),
        layer_height_mm: Some(0.05),
        has_thumbnail: true,
    }
}
