use crate::metrics::MetricsSummary;
use crate::policy::model::DirectiveSet;
use crate::world::Tick;
use serde::Serialize;
use std::time::SystemTime;
use tokio::sync::watch;

/// How a dispatch run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RunOutcome {
    Stopped,
    Completed,
    Failed(String),
}

/// Progress of the current (or last) dispatch run as published by the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerStatus {
    pub running: bool,
    pub policy: Option<String>,
    pub tick: Tick,
    pub ticks_processed: u64,
    pub pending_calls: usize,
    pub claimed_calls: usize,
    pub waiting_passengers: usize,
    pub delivered_passengers: usize,
    pub last_directives: DirectiveSet,
    pub last_outcome: Option<RunOutcome>,
    pub updated_at: SystemTime,
}

impl ControllerStatus {
    pub fn idle() -> Self {
        Self {
            running: false,
            policy: None,
            tick: 0,
            ticks_processed: 0,
            pending_calls: 0,
            claimed_calls: 0,
            waiting_passengers: 0,
            delivered_passengers: 0,
            last_directives: DirectiveSet::new(),
            last_outcome: None,
            updated_at: SystemTime::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub summary: MetricsSummary,
    pub updated_at: SystemTime,
}

#[derive(Debug)]
pub struct AppState {
    status: ControllerStatus,
    status_tx: watch::Sender<ControllerStatus>,
    metrics: MetricsSnapshot,
    metrics_tx: watch::Sender<MetricsSnapshot>,
}

impl AppState {
    pub fn new() -> Self {
        let status = ControllerStatus::idle();
        let metrics = MetricsSnapshot {
            summary: MetricsSummary::default(),
            updated_at: status.updated_at,
        };
        let (status_tx, _status_rx) = watch::channel(status.clone());
        let (metrics_tx, _metrics_rx) = watch::channel(metrics.clone());
        Self {
            status,
            status_tx,
            metrics,
            metrics_tx,
        }
    }

    pub fn status(&self) -> &ControllerStatus {
        &self.status
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ControllerStatus> {
        self.status_tx.subscribe()
    }

    pub fn set_status(&mut self, status: ControllerStatus) {
        self.status = status.clone();
        // send_replace keeps the channel current even with no subscribers.
        self.status_tx.send_replace(status);
    }

    pub fn metrics(&self) -> &MetricsSnapshot {
        &self.metrics
    }

    pub fn subscribe_metrics(&self) -> watch::Receiver<MetricsSnapshot> {
        self.metrics_tx.subscribe()
    }

    pub fn set_metrics(&mut self, summary: MetricsSummary) {
        let snapshot = MetricsSnapshot {
            summary,
            updated_at: SystemTime::now(),
        };
        self.metrics = snapshot.clone();
        self.metrics_tx.send_replace(snapshot);
    }

    /// Clear published progress for a fresh run.
    pub fn begin_run(&mut self, policy: &str) {
        self.set_status(ControllerStatus {
            running: true,
            policy: Some(policy.to_string()),
            ..ControllerStatus::idle()
        });
        self.set_metrics(MetricsSummary::default());
    }

    pub fn finish_run(&mut self, outcome: RunOutcome) {
        let mut status = self.status.clone();
        status.running = false;
        status.last_outcome = Some(outcome);
        status.updated_at = SystemTime::now();
        self.set_status(status);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
