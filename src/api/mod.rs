use crate::dispatch::service::ControlSurface;
use crate::state::{AppState, ControllerStatus, MetricsSnapshot};
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio::sync::watch;

pub mod handlers;
pub mod responses;

/// Reads go through the watch receivers, so request handlers never wait on
/// the state lock or on a start/stop in progress.
#[derive(Clone)]
pub struct ApiState {
    pub status: watch::Receiver<ControllerStatus>,
    pub metrics: watch::Receiver<MetricsSnapshot>,
    pub control: Arc<dyn ControlSurface>,
}

impl ApiState {
    pub fn new(state: &AppState, control: Arc<dyn ControlSurface>) -> Self {
        Self {
            status: state.subscribe_status(),
            metrics: state.subscribe_metrics(),
            control,
        }
    }
}

pub fn router(api: ApiState) -> Router {
    Router::new()
        .route("/api/start", post(handlers::post_start))
        .route("/api/stop", post(handlers::post_stop))
        .route("/api/status", get(handlers::get_status))
        .route("/api/metrics", get(handlers::get_metrics))
        .with_state(api)
}
