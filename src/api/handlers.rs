use crate::api::ApiState;
use crate::api::responses::{
    ApiErrorCode, ApiErrorResponse, ControlResponseBody, MetricsSuccessResponse,
    StatusSuccessResponse,
};
use crate::dispatch::service::ControlReply;
use crate::state::{ControllerStatus, MetricsSnapshot};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub struct ControlResponse {
    status: StatusCode,
    body: ControlResponseBody,
}

impl IntoResponse for ControlResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub enum StatusResponse {
    Success(StatusSuccessResponse),
    Error {
        status: StatusCode,
        body: ApiErrorResponse,
    },
}

impl IntoResponse for StatusResponse {
    fn into_response(self) -> Response {
        match self {
            StatusResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            StatusResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub enum MetricsResponse {
    Success(MetricsSuccessResponse),
    Error {
        status: StatusCode,
        body: ApiErrorResponse,
    },
}

impl IntoResponse for MetricsResponse {
    fn into_response(self) -> Response {
        match self {
            MetricsResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            MetricsResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

// Start and stop block on the worker thread, so they run off the async runtime.
pub async fn post_start(State(api): State<ApiState>) -> impl IntoResponse {
    let control = Arc::clone(&api.control);
    match tokio::task::spawn_blocking(move || control.start()).await {
        Ok(reply) => build_control_response(reply),
        Err(err) => control_task_failed("start", &err, api.status.borrow().running),
    }
}

pub async fn post_stop(State(api): State<ApiState>) -> impl IntoResponse {
    let control = Arc::clone(&api.control);
    match tokio::task::spawn_blocking(move || control.stop()).await {
        Ok(reply) => build_control_response(reply),
        Err(err) => control_task_failed("stop", &err, api.status.borrow().running),
    }
}

pub async fn get_status(State(api): State<ApiState>) -> impl IntoResponse {
    let status = api.status.borrow().clone();
    build_status_response(status, SystemTime::now())
}

pub async fn get_metrics(State(api): State<ApiState>) -> impl IntoResponse {
    let snapshot = api.metrics.borrow().clone();
    build_metrics_response(snapshot, SystemTime::now())
}

fn build_control_response(reply: ControlReply) -> ControlResponse {
    let status = if reply.success {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };
    ControlResponse {
        status,
        body: ControlResponseBody {
            success: reply.success,
            message: reply.message,
            controller_running: reply.controller_running,
        },
    }
}

fn control_task_failed(action: &str, err: &tokio::task::JoinError, running: bool) -> ControlResponse {
    error!(action, error = %err, "Control task failed");
    ControlResponse {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ControlResponseBody {
            success: false,
            message: INTERNAL_ERROR_MESSAGE.to_string(),
            controller_running: running,
        },
    }
}

fn build_status_response(status: ControllerStatus, now: SystemTime) -> StatusResponse {
    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => {
            return StatusResponse::Error {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: internal_error_body("/api/status", "timestamp formatting failure"),
            };
        }
    };

    StatusResponse::Success(StatusSuccessResponse {
        controller_running: status.running,
        policy: status.policy,
        tick: status.tick,
        ticks_processed: status.ticks_processed,
        pending_calls: status.pending_calls,
        claimed_calls: status.claimed_calls,
        waiting_passengers: status.waiting_passengers,
        delivered_passengers: status.delivered_passengers,
        last_directives: status.last_directives,
        last_outcome: status.last_outcome,
        timestamp,
    })
}

fn build_metrics_response(snapshot: MetricsSnapshot, now: SystemTime) -> MetricsResponse {
    match format_timestamp(now) {
        Ok(timestamp) => MetricsResponse::Success(MetricsSuccessResponse {
            floor_wait: snapshot.summary.floor_wait,
            arrival_wait: snapshot.summary.arrival_wait,
            timestamp,
        }),
        Err(_) => MetricsResponse::Error {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: internal_error_body("/api/metrics", "timestamp formatting failure"),
        },
    }
}

fn internal_error_body(route: &str, message: &str) -> ApiErrorResponse {
    error!(route, message, "Internal error while handling request");
    let formatted = format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    });
    ApiErrorResponse {
        error_code: ApiErrorCode::InternalError,
        error_message: INTERNAL_ERROR_MESSAGE.to_string(),
        timestamp: formatted,
    }
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiState;
    use crate::dispatch::service::ControlSurface;
    use crate::metrics::{MetricsSummary, SeriesSummary};
    use crate::policy::model::Directive;
    use crate::state::{AppState, RunOutcome};
    use std::collections::BTreeMap;
    use std::time::{Duration, UNIX_EPOCH};

    struct IdleControl;

    impl ControlSurface for IdleControl {
        fn start(&self) -> ControlReply {
            ControlReply {
                success: true,
                message: "Controller started".to_string(),
                controller_running: true,
            }
        }

        fn stop(&self) -> ControlReply {
            ControlReply {
                success: false,
                message: "Controller is not running".to_string(),
                controller_running: false,
            }
        }
    }

    #[test]
    fn control_reply_maps_to_ok_or_conflict() {
        let accepted = build_control_response(ControlReply {
            success: true,
            message: "Controller started".to_string(),
            controller_running: true,
        });
        let refused = build_control_response(ControlReply {
            success: false,
            message: "controller is already running".to_string(),
            controller_running: true,
        });

        assert_eq!(accepted.status, StatusCode::OK);
        assert_eq!(refused.status, StatusCode::CONFLICT);
        assert!(refused.body.controller_running);
    }

    #[test]
    fn status_handler_reports_published_progress() {
        let status = ControllerStatus {
            running: true,
            policy: Some("greedy_nearest".to_string()),
            tick: 57,
            ticks_processed: 57,
            pending_calls: 3,
            claimed_calls: 2,
            waiting_passengers: 2,
            delivered_passengers: 9,
            last_directives: BTreeMap::from([(0, Directive::GoTo(4)), (1, Directive::NoChange)]),
            last_outcome: None,
            updated_at: UNIX_EPOCH,
        };

        let response = build_status_response(status, UNIX_EPOCH + Duration::from_secs(1));

        match response {
            StatusResponse::Success(body) => {
                assert!(body.controller_running);
                assert_eq!(body.tick, 57);
                assert_eq!(body.pending_calls, 3);
                assert_eq!(body.waiting_passengers, 2);
                assert_eq!(body.delivered_passengers, 9);
                assert_eq!(body.last_directives[&0], Directive::GoTo(4));
                assert_eq!(body.timestamp, "1970-01-01T00:00:01Z");
            }
            StatusResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn status_body_serializes_outcome_and_directives() -> Result<(), serde_json::Error> {
        let status = ControllerStatus {
            last_directives: BTreeMap::from([(2, Directive::GoTo(7))]),
            last_outcome: Some(RunOutcome::Failed("connect error".to_string())),
            ..ControllerStatus::idle()
        };

        let StatusResponse::Success(body) = build_status_response(status, UNIX_EPOCH) else {
            panic!("expected success response");
        };
        let json = serde_json::to_value(&body)?;

        assert_eq!(json["controller_running"], false);
        assert_eq!(json["last_directives"]["2"]["kind"], "go_to");
        assert_eq!(json["last_directives"]["2"]["floor"], 7);
        assert_eq!(json["last_outcome"]["status"], "failed");
        assert_eq!(json["last_outcome"]["reason"], "connect error");
        Ok(())
    }

    #[test]
    fn api_state_follows_updates_published_after_subscribing() {
        let mut app_state = AppState::new();
        let api = ApiState::new(&app_state, Arc::new(IdleControl));

        app_state.begin_run("capacity_aware");
        app_state.set_metrics(MetricsSummary {
            arrival_wait: SeriesSummary::Ok {
                count: 1,
                mean: 6.0,
                p95: 6,
            },
            ..MetricsSummary::default()
        });

        let status = api.status.borrow().clone();
        assert!(status.running);
        assert_eq!(status.policy.as_deref(), Some("capacity_aware"));
        let MetricsResponse::Success(body) =
            build_metrics_response(api.metrics.borrow().clone(), UNIX_EPOCH)
        else {
            panic!("expected success response");
        };
        assert_eq!(
            body.arrival_wait,
            SeriesSummary::Ok {
                count: 1,
                mean: 6.0,
                p95: 6
            }
        );

        app_state.finish_run(RunOutcome::Completed);
        assert!(!api.status.borrow().running);
    }

    #[test]
    fn metrics_handler_reports_no_data_before_any_trip() -> Result<(), serde_json::Error> {
        let snapshot = AppState::new().metrics().clone();

        let MetricsResponse::Success(body) = build_metrics_response(snapshot, UNIX_EPOCH) else {
            panic!("expected success response");
        };

        assert_eq!(body.floor_wait, SeriesSummary::NoData);
        assert_eq!(serde_json::to_value(&body)?["arrival_wait"]["status"], "no_data");
        Ok(())
    }

    #[test]
    fn metrics_handler_reports_summary() {
        let snapshot = MetricsSnapshot {
            summary: MetricsSummary {
                floor_wait: SeriesSummary::Ok {
                    count: 4,
                    mean: 2.5,
                    p95: 4,
                },
                arrival_wait: SeriesSummary::NoData,
            },
            updated_at: UNIX_EPOCH,
        };

        let MetricsResponse::Success(body) = build_metrics_response(snapshot, UNIX_EPOCH) else {
            panic!("expected success response");
        };

        assert_eq!(
            body.floor_wait,
            SeriesSummary::Ok {
                count: 4,
                mean: 2.5,
                p95: 4
            }
        );
        assert_eq!(body.arrival_wait, SeriesSummary::NoData);
    }
}
