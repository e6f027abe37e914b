//! Telemetry sampler feeding the live charts.
//!
//! One latency-sensitive metric is polled fast (the pressure trace during a
//! peel); everything else rides a cheaper batched fetch every Nth cycle.
//! When the backend exposes a status stream the sampler rides that instead
//! of polling, extracting readings from each pushed payload.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use orion_backend::{BackendClient, MetricReading, StreamEvent};
use orion_config::AnalyticsTuning;
use orion_model::{AnalyticsFrame, MetricSeries, TimeSeriesPoint};

#[derive(Debug)]
struct SamplerState {
    frame: AnalyticsFrame,
    fast_cycles: u64,
    seq: i64,
}

#[derive(Debug)]
struct AnalyticsInner {
    backend: Arc<dyn BackendClient>,
    tuning: AnalyticsTuning,
    disposed: AtomicBool,
    cycle_in_flight: AtomicBool,
    state: Mutex<SamplerState>,
    tx: watch::Sender<AnalyticsFrame>,
}

/// Background sampler publishing [`AnalyticsFrame`] snapshots over a watch
/// channel. Dropping the provider stops the sampling task.
#[derive(Debug)]
pub struct AnalyticsProvider {
    inner: Arc<AnalyticsInner>,
    driver: JoinHandle<()>,
}

impl AnalyticsProvider {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        tuning: AnalyticsTuning,
    ) -> Self {
        let (tx, _rx) = watch::channel(AnalyticsFrame::default());
        let inner = Arc::new(AnalyticsInner {
            backend,
            tuning,
            disposed: AtomicBool::new(false),
            cycle_in_flight: AtomicBool::new(false),
            state: Mutex::new(SamplerState {
                frame: AnalyticsFrame::default(),
                fast_cycles: 0,
                seq: 0,
            }),
            tx,
        });
        let driver = tokio::spawn(drive(Arc::clone(&inner)));
        Self { inner, driver }
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalyticsFrame> {
        self.inner.tx.subscribe()
    }

    pub fn current(&self) -> AnalyticsFrame {
        match self.inner.state.lock() {
            Ok(state) => state.frame.clone(),
            Err(poisoned) => poisoned.into_inner().frame.clone(),
        }
    }

    /// Run one sample cycle immediately, on top of whatever cadence the
    /// driver keeps. Overlapping calls collapse into the in-flight one.
    pub async fn refresh(&self) {
        poll_cycle(&self.inner).await;
    }

    pub fn shutdown(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.driver.abort();
    }
}

impl Drop for AnalyticsProvider {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn drive(inner: Arc<AnalyticsInner>) {
    // Prefer the push stream when the backend has one; a failed or closed
    // stream drops us into polling for good. The status engine owns stream
    // health heuristics, so the sampler keeps this simple.
    match inner.backend.get_status_stream() {
        Ok(stream) => {
            log::info!(
                "[Analytics] riding {} status stream",
                inner.backend.kind()
            );
            consume_stream(&inner, stream).await;
            if inner.disposed.load(Ordering::SeqCst) {
                return;
            }
            log::info!("[Analytics] stream ended, switching to polling");
        }
        Err(err) => {
            log::debug!("[Analytics] no stream ({err}), polling instead");
        }
    }

    let interval = fast_interval(&inner.tuning);
    loop {
        if inner.disposed.load(Ordering::SeqCst) {
            return;
        }
        let started = Instant::now();
        poll_cycle(&inner).await;
        let elapsed = started.elapsed();
        tokio::time::sleep(interval.saturating_sub(elapsed)).await;
    }
}

async fn consume_stream(inner: &Arc<AnalyticsInner>, mut stream: orion_backend::StatusStream) {
    while let Some(event) = stream.next().await {
        if inner.disposed.load(Ordering::SeqCst) {
            return;
        }
        match event {
            Ok(StreamEvent::Status(raw)) => {
                let readings = inner.backend.extract_metrics(&raw);
                if !readings.is_empty() {
                    record_readings(inner, &readings);
                }
            }
            Ok(StreamEvent::Open) => {}
            Err(err) => {
                log::debug!("[Analytics] stream error: {err}");
                return;
            }
        }
    }
}

async fn poll_cycle(inner: &Arc<AnalyticsInner>) {
    if inner.cycle_in_flight.swap(true, Ordering::SeqCst) {
        return;
    }
    let batched = {
        let mut state = match inner.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.fast_cycles += 1;
        state.fast_cycles % u64::from(inner.tuning.batch_every.max(1)) == 1
            || inner.tuning.batch_every <= 1
    };

    let mut readings = Vec::new();
    match inner
        .backend
        .get_analytic_value(inner.tuning.fast_metric_id)
        .await
    {
        Ok(value) => readings.push(MetricReading {
            metric_id: inner.tuning.fast_metric_id,
            value,
        }),
        // Failed cycles leave a gap in the series rather than a stale
        // repeat.
        Err(err) => log::debug!("[Analytics] fast sample failed: {err}"),
    }

    if batched {
        match inner.backend.get_analytics(inner.tuning.batch_size).await {
            Ok(batch) => {
                for reading in batch {
                    if reading.metric_id != inner.tuning.fast_metric_id {
                        readings.push(reading);
                    }
                }
            }
            Err(err) => {
                log::debug!("[Analytics] batched sample failed: {err}")
            }
        }
    }

    if !readings.is_empty() {
        record_readings(inner, &readings);
    }
    inner.cycle_in_flight.store(false, Ordering::SeqCst);
}

fn record_readings(inner: &Arc<AnalyticsInner>, readings: &[MetricReading]) {
    let frame = {
        let mut state = match inner.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.seq += 1;
        let seq = state.seq;
        for reading in readings {
            let capacity = series_capacity(&inner.tuning, reading.metric_id);
            state
                .frame
                .series
                .entry(reading.metric_id)
                .or_insert_with(|| MetricSeries::with_capacity(capacity))
                .push(TimeSeriesPoint {
                    id: seq,
                    v: reading.value,
                });
        }
        state.frame.clone()
    };
    let _ = inner.tx.send_replace(frame);
}

fn fast_interval(tuning: &AnalyticsTuning) -> Duration {
    let hz = if tuning.fast_hz.is_finite() && tuning.fast_hz > 0.0 {
        tuning.fast_hz
    } else {
        1.0
    };
    Duration::from_secs_f64(1.0 / hz)
}

/// The fast metric keeps window*hz points; batched metrics arrive once per
/// `batch_every` cycles, so they keep proportionally fewer.
fn series_capacity(tuning: &AnalyticsTuning, metric_id: i64) -> usize {
    let fast = (tuning.window_seconds * tuning.fast_hz).ceil().max(1.0);
    if metric_id == tuning.fast_metric_id {
        fast as usize
    } else {
        (fast / f64::from(tuning.batch_every.max(1))).ceil().max(1.0) as usize
    }
}
