//! The status reconciliation engine.
//!
//! One background task per provider keeps a [`StatusView`] current by
//! streaming when the backend supports push and polling otherwise, with
//! exponential backoff on failures. Consumers subscribe to a watch channel;
//! notifications are suppressed when nothing visible changed, except while
//! a job is active, where every cycle emits so elapsed-time displays stay
//! live.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use orion_backend::{BackendClient, BackendError, StreamEvent};
use orion_config::StatusTuning;
use orion_model::{FileRef, StatusSnapshot, ThumbnailSize};

use crate::retry::RetryBudget;
use crate::thumbnails::{Thumbnail, ThumbnailCache};

/// Placeholder thumbnails are retried a few times per job, then left alone.
const MAX_THUMB_ATTEMPTS: u32 = 3;

/// Everything a status screen needs to render, superseded atomically on
/// each emission.
#[derive(Debug, Clone, Default)]
pub struct StatusView {
    pub snapshot: StatusSnapshot,
    /// Preview image for the job on the plate, when one has been fetched.
    pub thumbnail: Option<Thumbnail>,
    /// True while the first result (or a post-reset result) is pending.
    pub loading: bool,
    /// Human-readable description of the most recent fetch failure.
    pub error: Option<String>,
    pub consecutive_errors: u32,
    /// When the next poll retry is due, while backing off.
    pub next_retry_at: Option<Instant>,
    /// `None` until streaming support has been determined this session.
    pub sse_supported: Option<bool>,
    /// A pause or resume request is in flight and unconfirmed.
    pub is_pausing: bool,
    /// A cancel request is in flight or unconfirmed. Deliberately sticky:
    /// it stays up even if the cancel call fails, until a snapshot settles
    /// what actually happened on the device.
    pub is_canceling: bool,
    /// Set after a reset; stale job data is suppressed until fresh
    /// evidence of the new print arrives or the gate times out.
    pub awaiting_new_print: bool,
}

/// The visible subset of a snapshot used for change suppression. Z is
/// rounded to the millimeter thousandth so sub-micron jitter from tick
/// conversion does not defeat suppression.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    status: orion_model::PrintStatus,
    paused: bool,
    layer: Option<i64>,
    layer_count: Option<i64>,
    z_thousandths: i64,
}

impl Fingerprint {
    fn of(snapshot: &StatusSnapshot) -> Self {
        Self {
            status: snapshot.status,
            paused: snapshot.is_paused(),
            layer: snapshot.layer,
            layer_count: snapshot.layer_count,
            z_thousandths: (snapshot.physical_state.z * 1_000.0).round()
                as i64,
        }
    }
}

/// Non-snapshot view fields that also warrant a notification on change.
type Meta = (
    Option<String>,
    u32,
    bool,
    Option<bool>,
    bool,
    bool,
    bool,
);

fn meta_of(view: &StatusView) -> Meta {
    (
        view.error.clone(),
        view.consecutive_errors,
        view.loading,
        view.sse_supported,
        view.is_pausing,
        view.is_canceling,
        view.awaiting_new_print,
    )
}

#[derive(Debug)]
struct EngineState {
    view: StatusView,
    last_fingerprint: Option<Fingerprint>,
    last_meta: Option<Meta>,
    /// Instant the awaiting gate was armed; identity check for the expiry
    /// task so a newer reset is not clobbered by an older timer.
    awaiting_since: Option<Instant>,
    spinner_deadline: Option<Instant>,
    /// Target of the in-flight pause/resume request, when one is pending.
    pause_target: Option<bool>,
    has_real_thumbnail: bool,
    thumb_attempts: u32,
    last_thumb_path: Option<String>,
    got_first_result: bool,
    poll_budget: RetryBudget,
    stream_budget: RetryBudget,
    next_stream_attempt: Option<Instant>,
}

#[derive(Debug)]
struct Inner {
    backend: Arc<dyn BackendClient>,
    thumbnails: Arc<ThumbnailCache>,
    tuning: StatusTuning,
    polling_only: bool,
    disposed: AtomicBool,
    fetch_in_flight: AtomicBool,
    thumb_in_flight: AtomicBool,
    state: Mutex<EngineState>,
    tx: watch::Sender<StatusView>,
    wake: Notify,
}

/// Owns the reconciliation task. Dropping the provider stops it.
#[derive(Debug)]
pub struct StatusProvider {
    inner: Arc<Inner>,
    driver: JoinHandle<()>,
}

impl StatusProvider {
    /// `polling_only` short-circuits stream attempts for backends known to
    /// have no push channel, sparing the detection heuristic.
    pub fn new(
        backend: Arc<dyn BackendClient>,
        thumbnails: Arc<ThumbnailCache>,
        tuning: StatusTuning,
        polling_only: bool,
    ) -> Self {
        let base = Duration::from_millis(tuning.backoff_base_ms);
        let cap = Duration::from_millis(tuning.backoff_cap_ms);
        let view = StatusView {
            loading: true,
            sse_supported: if polling_only { Some(false) } else { None },
            ..Default::default()
        };
        let (tx, _rx) = watch::channel(view.clone());
        let inner = Arc::new(Inner {
            backend,
            thumbnails,
            tuning,
            polling_only,
            disposed: AtomicBool::new(false),
            fetch_in_flight: AtomicBool::new(false),
            thumb_in_flight: AtomicBool::new(false),
            state: Mutex::new(EngineState {
                view,
                last_fingerprint: None,
                last_meta: None,
                awaiting_since: None,
                spinner_deadline: None,
                pause_target: None,
                has_real_thumbnail: false,
                thumb_attempts: 0,
                last_thumb_path: None,
                got_first_result: false,
                poll_budget: RetryBudget::new(base, cap),
                stream_budget: RetryBudget::new(base, cap),
                next_stream_attempt: None,
            }),
            tx,
            wake: Notify::new(),
        });
        let driver = tokio::spawn(drive(Arc::clone(&inner)));
        Self { inner, driver }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusView> {
        self.inner.tx.subscribe()
    }

    pub fn current(&self) -> StatusView {
        self.inner.tx.borrow().clone()
    }

    /// Direct access to the underlying adapter, for call-through surfaces
    /// like manual motion that carry no reconciliation state.
    pub fn backend(&self) -> &Arc<dyn BackendClient> {
        &self.inner.backend
    }

    /// Fetch and process one status immediately, outside the poll cadence.
    /// Collapses into an already in-flight fetch.
    pub async fn refresh(&self) {
        if let Some(Err(message)) = fetch_once(&self.inner).await {
            note_poll_error(&self.inner, message);
        }
    }

    /// Toggle pause: resume when paused, pause otherwise. A second call
    /// while one is unconfirmed is a no-op, so double taps on the touch
    /// panel do not race a pause against a resume.
    pub async fn pause_or_resume(&self) -> Result<(), BackendError> {
        let currently_paused = {
            let mut state = lock_state(&self.inner);
            if state.view.is_pausing {
                return Ok(());
            }
            let paused = state.view.snapshot.is_paused();
            state.view.is_pausing = true;
            state.pause_target = Some(!paused);
            emit_locked(&self.inner, &mut state, false);
            paused
        };

        let result = if currently_paused {
            self.inner.backend.resume_print().await
        } else {
            self.inner.backend.pause_print().await
        };

        if let Err(err) = &result {
            log::warn!("[StatusProvider] pause/resume failed: {err}");
            let mut state = lock_state(&self.inner);
            state.view.is_pausing = false;
            state.pause_target = None;
            state.view.error = Some(err.to_string());
            emit_locked(&self.inner, &mut state, false);
        }

        // Confirm against a fresh snapshot either way.
        let _ = fetch_once(&self.inner).await;
        result
    }

    /// Request a cancel. The canceling flag is raised before the call and
    /// intentionally kept raised on failure; the device may have acted on
    /// the request anyway, and the next snapshots settle the truth.
    pub async fn cancel(&self) -> Result<(), BackendError> {
        {
            let mut state = lock_state(&self.inner);
            if state.view.is_canceling {
                return Ok(());
            }
            state.view.is_canceling = true;
            emit_locked(&self.inner, &mut state, false);
        }

        let result = self.inner.backend.cancel_print().await;
        if let Err(err) = &result {
            log::warn!("[StatusProvider] cancel request failed: {err}");
        }

        let _ = fetch_once(&self.inner).await;
        result
    }

    /// Start a print and pull a confirming snapshot.
    pub async fn start_print(
        &self,
        file: &FileRef,
    ) -> Result<(), BackendError> {
        let result = self.inner.backend.start_print(file).await;
        if let Err(err) = &result {
            log::warn!("[StatusProvider] start failed: {err}");
        }
        let _ = fetch_once(&self.inner).await;
        result
    }

    /// Purge session state ahead of a new print: clears the snapshot and
    /// backend latches, arms the awaiting-new-print gate, and keeps the
    /// loading spinner up for at least the configured minimum so the UI
    /// does not flash. `cached_thumbnail` seeds the view when the caller
    /// already holds the upcoming job's preview.
    pub async fn reset_status(&self, cached_thumbnail: Option<Thumbnail>) {
        self.inner.backend.reset_session();

        let armed_at;
        let spinner_until;
        {
            let mut state = lock_state(&self.inner);
            let now = Instant::now();
            armed_at = now;
            spinner_until = now + self.inner.tuning.min_spinner();

            state.has_real_thumbnail = cached_thumbnail
                .as_ref()
                .is_some_and(|t| !t.placeholder);
            state.thumb_attempts = 0;
            state.last_thumb_path = None;
            state.pause_target = None;
            state.got_first_result = false;
            state.awaiting_since = Some(armed_at);
            state.spinner_deadline = Some(spinner_until);

            state.view.snapshot = StatusSnapshot::default();
            state.view.thumbnail = cached_thumbnail;
            state.view.error = None;
            state.view.consecutive_errors = 0;
            state.view.next_retry_at = None;
            state.view.is_pausing = false;
            state.view.is_canceling = false;
            state.view.awaiting_new_print = true;
            emit_locked(&self.inner, &mut state, true);
        }

        let gate_inner = Arc::clone(&self.inner);
        let timeout = self.inner.tuning.awaiting_timeout();
        tokio::spawn(async move {
            tokio::time::sleep_until(armed_at + timeout).await;
            let mut state = lock_state(&gate_inner);
            if state.awaiting_since == Some(armed_at)
                && state.view.awaiting_new_print
            {
                log::warn!(
                    "[StatusProvider] awaiting-new-print gate timed out"
                );
                state.view.awaiting_new_print = false;
                state.awaiting_since = None;
                emit_locked(&gate_inner, &mut state, false);
            }
        });

        let spinner_inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep_until(spinner_until).await;
            let mut state = lock_state(&spinner_inner);
            if state.spinner_deadline == Some(spinner_until) {
                state.spinner_deadline = None;
                emit_locked(&spinner_inner, &mut state, false);
            }
        });

        // Kick the driver for an immediate fetch.
        self.inner.wake.notify_one();
    }

    pub fn shutdown(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.driver.abort();
    }
}

impl Drop for StatusProvider {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock_state(inner: &Inner) -> MutexGuard<'_, EngineState> {
    match inner.state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn compute_loading(state: &EngineState) -> bool {
    let spinner = state
        .spinner_deadline
        .is_some_and(|deadline| Instant::now() < deadline);
    spinner || !state.got_first_result
}

/// Send the view if anything visible changed, or unconditionally while a
/// job is active. A disposed provider never publishes: the gate, spinner,
/// and thumbnail tasks outlive the driver and all funnel through here.
fn emit_locked(inner: &Inner, state: &mut EngineState, force: bool) {
    if inner.disposed.load(Ordering::SeqCst) {
        return;
    }
    state.view.loading = compute_loading(state);
    let fingerprint = Fingerprint::of(&state.view.snapshot);
    let meta = meta_of(&state.view);
    let changed = state.last_fingerprint.as_ref() != Some(&fingerprint)
        || state.last_meta.as_ref() != Some(&meta);
    let active = state.view.snapshot.status.is_active();
    if force || active || changed {
        state.last_fingerprint = Some(fingerprint);
        state.last_meta = Some(meta);
        let _ = inner.tx.send_replace(state.view.clone());
    }
}

async fn drive(inner: Arc<Inner>) {
    loop {
        if inner.disposed.load(Ordering::SeqCst) {
            return;
        }

        if should_try_stream(&inner) {
            run_stream(&inner).await;
            if inner.disposed.load(Ordering::SeqCst) {
                return;
            }
        }

        let delay = poll_cycle(&inner).await;
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = inner.wake.notified() => {}
        }
    }
}

fn should_try_stream(inner: &Inner) -> bool {
    if inner.polling_only {
        return false;
    }
    let state = lock_state(inner);
    if state.view.sse_supported == Some(false) {
        return false;
    }
    if state.view.consecutive_errors > inner.tuning.stream_error_threshold {
        return false;
    }
    state
        .next_stream_attempt
        .is_none_or(|at| Instant::now() >= at)
}

/// Open the stream and consume it until it ends. Returns with the poll
/// loop responsible again.
async fn run_stream(inner: &Arc<Inner>) {
    let mut stream = match inner.backend.get_status_stream() {
        Ok(stream) => stream,
        Err(BackendError::StreamUnsupported) => {
            mark_stream_unsupported(inner);
            return;
        }
        Err(err) => {
            log::debug!("[StatusProvider] stream open failed: {err}");
            schedule_stream_retry(inner);
            return;
        }
    };

    let mut opened = false;
    while let Some(event) = stream.next().await {
        if inner.disposed.load(Ordering::SeqCst) {
            return;
        }
        match event {
            Ok(StreamEvent::Open) => {
                opened = true;
                let mut state = lock_state(inner);
                state.view.sse_supported = Some(true);
                state.stream_budget.reset();
                state.next_stream_attempt = None;
                emit_locked(inner, &mut state, false);
                log::info!(
                    "[StatusProvider] {} status stream open",
                    inner.backend.kind()
                );
            }
            Ok(StreamEvent::Status(raw)) => process_raw(inner, &raw).await,
            Err(err) => {
                log::debug!("[StatusProvider] stream error: {err}");
                break;
            }
        }
    }

    // The stream never opening while plain polling works is the signature
    // of a backend without push support behind a proxy that does not
    // reject the subscription outright.
    let (healthy, got_first) = {
        let state = lock_state(inner);
        (state.view.consecutive_errors == 0, state.got_first_result)
    };
    if !opened && healthy && got_first {
        log::info!(
            "[StatusProvider] stream never delivered while polling is \
             healthy, treating push as unsupported this session"
        );
        mark_stream_unsupported(inner);
    } else {
        schedule_stream_retry(inner);
    }
}

fn mark_stream_unsupported(inner: &Inner) {
    let mut state = lock_state(inner);
    state.view.sse_supported = Some(false);
    state.next_stream_attempt = None;
    emit_locked(inner, &mut state, false);
}

fn schedule_stream_retry(inner: &Inner) {
    let mut state = lock_state(inner);
    let delay = state.stream_budget.next_delay();
    state.next_stream_attempt = Some(Instant::now() + delay);
}

/// One poll pass. Returns the delay before the next pass.
async fn poll_cycle(inner: &Arc<Inner>) -> Duration {
    match fetch_once(inner).await {
        Some(Ok(())) | None => inner.tuning.poll_interval(),
        Some(Err(message)) => note_poll_error(inner, message),
    }
}

/// Fetch and process one status. `None` when a fetch was already in
/// flight; the concurrent caller's result stands for both.
async fn fetch_once(inner: &Arc<Inner>) -> Option<Result<(), String>> {
    if inner.fetch_in_flight.swap(true, Ordering::SeqCst) {
        return None;
    }
    let outcome = match inner.backend.get_status().await {
        Ok(raw) => {
            process_raw(inner, &raw).await;
            Ok(())
        }
        Err(err) => Err(err.to_string()),
    };
    inner.fetch_in_flight.store(false, Ordering::SeqCst);
    Some(outcome)
}

fn note_poll_error(inner: &Arc<Inner>, message: String) -> Duration {
    let mut state = lock_state(inner);
    state.view.consecutive_errors =
        state.view.consecutive_errors.saturating_add(1);
    let delay = state.poll_budget.next_delay();
    state.view.next_retry_at = Some(Instant::now() + delay);
    if state.view.consecutive_errors == 1 {
        log::warn!("[StatusProvider] status fetch failed: {message}");
    } else {
        log::debug!(
            "[StatusProvider] status fetch failed ({} consecutive): \
             {message}",
            state.view.consecutive_errors
        );
    }
    state.view.error = Some(message);
    emit_locked(inner, &mut state, false);
    delay
}

/// Fold one raw payload into the view. Shared by the poll and stream
/// paths.
async fn process_raw(inner: &Arc<Inner>, raw: &Value) {
    let snapshot = inner.backend.parse_status(raw);

    let thumbnail_fetch = {
        let mut state = lock_state(inner);
        state.got_first_result = true;
        state.poll_budget.reset();
        state.view.error = None;
        state.view.consecutive_errors = 0;
        state.view.next_retry_at = None;

        if let Some(target) = state.pause_target {
            if snapshot.is_paused() == target {
                state.view.is_pausing = false;
                state.pause_target = None;
            }
        }
        if snapshot.is_idle() || snapshot.is_canceled() {
            // The job is gone or going; pending toggles are moot.
            state.view.is_pausing = false;
            state.pause_target = None;
        }
        if state.view.is_canceling
            && (snapshot.is_canceled()
                || snapshot.is_idle()
                || snapshot.finished == Some(true))
        {
            state.view.is_canceling = false;
        }

        if state.view.awaiting_new_print {
            let fresh_evidence = snapshot.status.is_active()
                || snapshot.is_canceled()
                || (snapshot.is_idle() && snapshot.has_job_data());
            if fresh_evidence {
                state.view.awaiting_new_print = false;
                state.awaiting_since = None;
            } else {
                // Stale pre-reset data; keep the purged view but record
                // that the backend is reachable.
                emit_locked(inner, &mut state, false);
                return;
            }
        }

        state.view.snapshot = snapshot;

        let fetch = match state.view.snapshot.print_data.file_data.clone() {
            Some(file) => {
                let path_changed = state.last_thumb_path.as_deref()
                    != Some(file.path.as_str());
                if path_changed {
                    state.thumb_attempts = 0;
                    state.has_real_thumbnail = false;
                    state.last_thumb_path = Some(file.path.clone());
                }
                let wants = state.view.thumbnail.is_none()
                    || path_changed
                    || (!state.has_real_thumbnail
                        && state.thumb_attempts < MAX_THUMB_ATTEMPTS);
                wants.then_some(file)
            }
            None => None,
        };

        emit_locked(inner, &mut state, false);
        fetch
    };

    if let Some(file) = thumbnail_fetch {
        spawn_thumbnail_fetch(inner, file);
    }
}

fn spawn_thumbnail_fetch(inner: &Arc<Inner>, file: FileRef) {
    if inner.thumb_in_flight.swap(true, Ordering::SeqCst) {
        return;
    }
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        let thumb = inner
            .thumbnails
            .get_for_file(&file, ThumbnailSize::Large, false)
            .await;
        let mut state = lock_state(&inner);
        if thumb.placeholder {
            state.thumb_attempts = state.thumb_attempts.saturating_add(1);
            // A real image already on screen wins over a fresh placeholder.
            if !state.has_real_thumbnail {
                state.view.thumbnail = Some(thumb);
                emit_locked(&inner, &mut state, true);
            }
        } else {
            state.thumb_attempts = 0;
            state.has_real_thumbnail = true;
            state.view.thumbnail = Some(thumb);
            emit_locked(&inner, &mut state, true);
        }
        drop(state);
        inner.thumb_in_flight.store(false, Ordering::SeqCst);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use orion_model::{PhysicalState, PrintStatus};

    fn snapshot(status: PrintStatus, z: f64) -> StatusSnapshot {
        StatusSnapshot {
            status,
            layer: Some(10),
            layer_count: Some(100),
            physical_state: PhysicalState { z },
            ..Default::default()
        }
    }

    #[test]
    fn fingerprint_ignores_submicron_z_jitter() {
        let a = Fingerprint::of(&snapshot(PrintStatus::Printing, 1.2500002));
        let b = Fingerprint::of(&snapshot(PrintStatus::Printing, 1.2499999));
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_sees_visible_z_motion() {
        let a = Fingerprint::of(&snapshot(PrintStatus::Printing, 1.250));
        let b = Fingerprint::of(&snapshot(PrintStatus::Printing, 1.300));
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_sees_status_and_layer_changes() {
        let base = snapshot(PrintStatus::Printing, 1.0);
        let mut layered = base.clone();
        layered.layer = Some(11);
        assert_ne!(Fingerprint::of(&base), Fingerprint::of(&layered));

        let mut paused = base.clone();
        paused.status = PrintStatus::Paused;
        assert_ne!(Fingerprint::of(&base), Fingerprint::of(&paused));
    }
}
