use crate::world::Tick;
use serde::Serialize;

/// Summary of one wait-time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SeriesSummary {
    NoData,
    Ok { count: usize, mean: f64, p95: Tick },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub floor_wait: SeriesSummary,
    pub arrival_wait: SeriesSummary,
}

impl Default for MetricsSummary {
    fn default() -> Self {
        Self {
            floor_wait: SeriesSummary::NoData,
            arrival_wait: SeriesSummary::NoData,
        }
    }
}

/// Completed wait durations, in ticks, for the current run.
#[derive(Debug, Default, Clone)]
pub struct MetricsAggregator {
    floor_waits: Vec<Tick>,
    arrival_waits: Vec<Tick>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation tick to pickup tick.
    pub fn record_floor_wait(&mut self, duration: Tick) {
        self.floor_waits.push(duration);
    }

    /// Creation tick to delivery tick.
    pub fn record_arrival_wait(&mut self, duration: Tick) {
        self.arrival_waits.push(duration);
    }

    pub fn floor_waits(&self) -> &[Tick] {
        &self.floor_waits
    }

    pub fn arrival_waits(&self) -> &[Tick] {
        &self.arrival_waits
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            floor_wait: summarize(&self.floor_waits),
            arrival_wait: summarize(&self.arrival_waits),
        }
    }
}

fn summarize(samples: &[Tick]) -> SeriesSummary {
    if samples.is_empty() {
        return SeriesSummary::NoData;
    }
    let count = samples.len();
    let total: f64 = samples.iter().map(|&value| value as f64).sum();
    SeriesSummary::Ok {
        count,
        mean: total / count as f64,
        p95: nearest_rank(samples, 95),
    }
}

// Nearest-rank percentile: the smallest sample with at least `percent`% of
// the series at or below it. `samples` must be non-empty.
fn nearest_rank(samples: &[Tick], percent: usize) -> Tick {
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let rank = (percent * sorted.len()).div_ceil(100).max(1);
    sorted[rank - 1]
}
