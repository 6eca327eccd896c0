//! Per-run detection metrics
//!
//! Keeps the last few runs in memory for inspection. Nothing is persisted.

use crate::resolution::ResolutionTier;
use crate::template::StrategyKind;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

pub const MAX_RUNS: usize = 100;

/// What happened in one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub timestamp_ms: u64,
    pub width: u32,
    pub height: u32,
    pub resolution_tier: ResolutionTier,
    pub strategies: Vec<StrategyKind>,
    pub cells_scanned: usize,
    pub detections: usize,
    pub uncertain: usize,
    pub avg_confidence: f64,
    pub duration_ms: u64,
}

impl RunRecord {
    /// Milliseconds since the Unix epoch, 0 if the clock is before it
    pub fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedMetrics {
    pub total_runs: usize,
    pub total_detections: usize,
    pub avg_detections: f64,
    pub avg_confidence: f64,
    pub avg_duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub enabled: bool,
    pub runs: Vec<RunRecord>,
    pub aggregated: AggregatedMetrics,
}

#[derive(Debug)]
struct State {
    enabled: bool,
    runs: VecDeque<RunRecord>,
}

/// Bounded, thread-safe store of recent runs
#[derive(Debug)]
pub struct MetricsRecorder {
    state: Mutex<State>,
}

impl MetricsRecorder {
    pub fn new(enabled: bool) -> Self {
        Self {
            state: Mutex::new(State {
                enabled,
                runs: VecDeque::with_capacity(MAX_RUNS),
            }),
        }
    }

    /// Store a run, dropping the oldest past [`MAX_RUNS`]. Ignored while disabled.
    pub fn record(&self, run: RunRecord) {
        let mut state = self.state.lock();
        if !state.enabled {
            return;
        }
        if state.runs.len() == MAX_RUNS {
            state.runs.pop_front();
        }
        state.runs.push_back(run);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.lock().enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn reset(&self) {
        self.state.lock().runs.clear();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock();
        let runs: Vec<RunRecord> = state.runs.iter().cloned().collect();

        MetricsSnapshot {
            enabled: state.enabled,
            aggregated: aggregate(&runs),
            runs,
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new(true)
    }
}

fn aggregate(runs: &[RunRecord]) -> AggregatedMetrics {
    if runs.is_empty() {
        return AggregatedMetrics::default();
    }
    let n = runs.len() as f64;
    let total_detections: usize = runs.iter().map(|r| r.detections).sum();

    // Confidence is averaged over detections, not runs.
    let weighted_confidence: f64 = runs.iter().map(|r| r.avg_confidence * r.detections as f64).sum();

    AggregatedMetrics {
        total_runs: runs.len(),
        total_detections,
        avg_detections: total_detections as f64 / n,
        avg_confidence: if total_detections > 0 {
            weighted_confidence / total_detections as f64
        } else {
            0.0
        },
        avg_duration_ms: runs.iter().map(|r| r.duration_ms as f64).sum::<f64>() / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(detections: usize, avg_confidence: f64, duration_ms: u64) -> RunRecord {
        RunRecord {
            timestamp_ms: RunRecord::now_ms(),
            width: 1920,
            height: 1080,
            resolution_tier: ResolutionTier::Medium,
            strategies: vec![StrategyKind::Standard],
            cells_scanned: 12,
            detections,
            uncertain: 0,
            avg_confidence,
            duration_ms,
        }
    }

    #[test]
    fn test_aggregates_runs() {
        let recorder = MetricsRecorder::default();
        recorder.record(run(2, 0.8, 10));
        recorder.record(run(0, 0.0, 30));
        recorder.record(run(6, 0.6, 20));

        let snapshot = recorder.snapshot();
        assert!(snapshot.enabled);
        assert_eq!(snapshot.runs.len(), 3);
        assert_eq!(snapshot.aggregated.total_detections, 8);
        assert!((snapshot.aggregated.avg_confidence - 0.65).abs() < 1e-9);
        assert!((snapshot.aggregated.avg_duration_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounded_to_last_runs() {
        let recorder = MetricsRecorder::default();
        for i in 0..(MAX_RUNS + 5) {
            recorder.record(run(i, 0.5, 1));
        }
        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.runs.len(), MAX_RUNS);
        assert_eq!(snapshot.runs[0].detections, 5);
    }

    #[test]
    fn test_disabled_recorder_ignores_runs() {
        let recorder = MetricsRecorder::new(false);
        recorder.record(run(1, 0.9, 5));
        assert!(recorder.snapshot().runs.is_empty());

        recorder.set_enabled(true);
        recorder.record(run(1, 0.9, 5));
        recorder.reset();
        assert!(recorder.snapshot().runs.is_empty());
        assert_eq!(recorder.snapshot().aggregated, AggregatedMetrics::default());
    }
}
