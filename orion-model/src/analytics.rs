use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One telemetry sample: a timestamp (or monotonic sequence number) and a
/// numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub id: i64,
    pub v: f64,
}

/// Bounded rolling time series for one metric.
///
/// Capacity is `window_seconds * frequency_hz`; inserting past capacity
/// evicts the oldest point first. Gaps are expected; failed sample cycles
/// are skipped, not backfilled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    capacity: usize,
    points: Vec<TimeSeriesPoint>,
}

impl MetricSeries {
    pub fn new(window_seconds: f64, frequency_hz: f64) -> Self {
        let capacity = (window_seconds * frequency_hz).ceil().max(1.0) as usize;
        Self {
            capacity,
            points: Vec::with_capacity(capacity),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            points: Vec::new(),
        }
    }

    pub fn push(&mut self, point: TimeSeriesPoint) {
        if self.points.len() >= self.capacity {
            self.points.remove(0);
        }
        self.points.push(point);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&TimeSeriesPoint> {
        self.points.last()
    }

    pub fn points(&self) -> &[TimeSeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

/// Snapshot of every tracked metric's recent series, keyed by metric id.
/// `BTreeMap` keeps iteration order stable for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalyticsFrame {
    pub series: BTreeMap<i64, MetricSeries>,
}

impl AnalyticsFrame {
    pub fn latest(&self, metric_id: i64) -> Option<TimeSeriesPoint> {
        self.series
            .get(&metric_id)
            .and_then(|s| s.latest())
            .copied()
    }
}
