use crate::metrics::SeriesSummary;
use crate::policy::model::Directive;
use crate::state::RunOutcome;
use crate::world::{ElevatorId, Tick};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ControlResponseBody {
    pub success: bool,
    pub message: String,
    pub controller_running: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct StatusSuccessResponse {
    pub controller_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    pub tick: Tick,
    pub ticks_processed: u64,
    pub pending_calls: usize,
    pub claimed_calls: usize,
    pub waiting_passengers: usize,
    pub delivered_passengers: usize,
    pub last_directives: BTreeMap<ElevatorId, Directive>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<RunOutcome>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsSuccessResponse {
    pub floor_wait: SeriesSummary,
    pub arrival_wait: SeriesSummary,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ApiErrorResponse {
    pub error_code: ApiErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    InternalError,
}
