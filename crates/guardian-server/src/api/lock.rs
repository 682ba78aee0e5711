//! Lock API endpoints.
//!
//! A local diagnostics surface over the same access controller the BLE
//! peripheral drives. Submitting a code here behaves exactly like a GATT
//! write: the lock opens after the settle delay and closes on its own.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use guardian_core::{StatusReport, StatusSnapshot};

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Routes mounted under `/api`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/otp", post(submit_otp))
        .route("/lock/close", post(close_lock))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Current controller state and its wire encoding.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "otp_verified": false,
    "lock": "locked",
    "health": {
        "battery_percent": 100,
        "voltage_tenths": 120,
        "safety": "active"
    },
    "frame": [0, 0, 100, 1, 0, 120],
    "frame_hex": "000064010078"
}))]
pub struct StatusResponse {
    /// Typed state.
    #[serde(flatten)]
    pub snapshot: StatusSnapshot,

    /// The six byte status frame as served over BLE.
    #[schema(example = json!([0, 0, 100, 1, 0, 120]))]
    pub frame: Vec<u8>,

    /// Same frame as lowercase hex.
    #[schema(example = "000064010078")]
    pub frame_hex: String,
}

impl From<StatusReport> for StatusResponse {
    fn from(report: StatusReport) -> Self {
        Self {
            snapshot: report.snapshot,
            frame: report.frame.to_vec(),
            frame_hex: report.frame.to_hex(),
        }
    }
}

/// OTP submission.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({ "code": "123456" }))]
pub struct OtpRequest {
    /// Six ASCII digits.
    #[schema(example = "123456")]
    pub code: String,
}

/// Accepted OTP.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "verified": true }))]
pub struct OtpResponse {
    /// Always `true`; rejections are returned as errors.
    pub verified: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Read the current status.
#[utoipa::path(
    get,
    path = "/api/status",
    tag = "lock",
    operation_id = "getStatus",
    summary = "Get lock status",
    description = "Returns verification state, lock state and health, together \
        with the exact status frame a BLE client would read.",
    responses(
        (status = 200, description = "Current status", body = StatusResponse),
        (status = 503, description = "Controller not running", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn get_status(State(state): State<SharedState>) -> ApiResult<Json<StatusResponse>> {
    let report = state.controller().status().await?;
    Ok(Json(report.into()))
}

/// Submit an OTP.
#[utoipa::path(
    post,
    path = "/api/otp",
    tag = "lock",
    operation_id = "submitOtp",
    summary = "Submit a one-time passcode",
    description = "Accepts exactly six ASCII digits. On success the lock opens \
        after a 2 second settle delay and closes again 15 seconds later unless \
        another code is submitted.",
    request_body = OtpRequest,
    responses(
        (status = 200, description = "Code accepted", body = OtpResponse),
        (status = 400, description = "Malformed code", body = crate::api::error::ErrorResponse),
        (status = 503, description = "Controller not running", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn submit_otp(
    State(state): State<SharedState>,
    Json(request): Json<OtpRequest>,
) -> ApiResult<Json<OtpResponse>> {
    state.controller().submit_otp(request.code.as_bytes()).await?;
    info!("OTP accepted over HTTP");
    Ok(Json(OtpResponse { verified: true }))
}

/// Close the lock immediately.
#[utoipa::path(
    post,
    path = "/api/lock/close",
    tag = "lock",
    operation_id = "closeLock",
    summary = "Close the lock",
    description = "Closes the lock now and clears verification. Safe to call \
        when already closed.",
    responses(
        (status = 200, description = "Lock closed", body = StatusResponse),
        (status = 503, description = "Controller not running", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn close_lock(State(state): State<SharedState>) -> ApiResult<Json<StatusResponse>> {
    let report = state.controller().close().await?;
    info!("lock closed over HTTP");
    Ok(Json(report.into()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use guardian_core::simulated::{RecordingDisplay, RelayCommand};
    use guardian_core::{
        AccessController, Config, LockState, NotificationHub, SimulatedRelay, SETTLE_DELAY,
    };
    use serde_json::json;

    use super::*;
    use crate::api::create_router;
    use crate::api::error::ErrorResponse;
    use crate::state::AppState;

    fn server() -> (TestServer, AppState, SimulatedRelay) {
        let relay = SimulatedRelay::new();
        let controller = AccessController::spawn(
            relay.clone(),
            RecordingDisplay::new(),
            NotificationHub::default(),
        );
        let state = AppState::new(controller, Config::default());
        let server = TestServer::new(create_router(state.clone())).unwrap();
        (server, state, relay)
    }

    #[tokio::test]
    async fn test_boot_status() {
        let (server, _, _) = server();

        let response = server.get("/api/status").await;
        response.assert_status_ok();

        let body: StatusResponse = response.json();
        assert_eq!(body.frame, vec![0, 0, 100, 1, 0, 120]);
        assert_eq!(body.frame_hex, "000064010078");
        assert_eq!(body.snapshot.lock, LockState::Locked);
        assert!(!body.snapshot.otp_verified);
    }

    #[tokio::test]
    async fn test_status_json_shape() {
        let (server, _, _) = server();

        let body: serde_json::Value = server.get("/api/status").await.json();
        assert_eq!(body["lock"], "locked");
        assert_eq!(body["otp_verified"], false);
        assert_eq!(body["health"]["battery_percent"], 100);
    }

    #[tokio::test]
    async fn test_malformed_otp_rejected() {
        let (server, state, relay) = server();

        let response = server.post("/api/otp").json(&json!({ "code": "12a456" })).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json();
        assert_eq!(body.error, "invalid_otp");

        let report = state.controller().status().await.unwrap();
        assert!(!report.snapshot.otp_verified);
        assert!(relay.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_valid_otp_opens_after_settle() {
        let (server, _, relay) = server();

        let response = server.post("/api/otp").json(&json!({ "code": "123456" })).await;
        response.assert_status_ok();
        let body: OtpResponse = response.json();
        assert!(body.verified);

        let body: StatusResponse = server.get("/api/status").await.json();
        assert_eq!(body.frame[..2], [1, 0]);

        tokio::time::sleep(SETTLE_DELAY + Duration::from_millis(1)).await;
        let body: StatusResponse = server.get("/api/status").await.json();
        assert_eq!(body.frame[..2], [1, 1]);
        assert_eq!(relay.commands(), vec![RelayCommand::Open]);
    }

    #[tokio::test]
    async fn test_close_endpoint() {
        let (server, _, relay) = server();
        server
            .post("/api/otp")
            .json(&json!({ "code": "654321" }))
            .await
            .assert_status_ok();

        let response = server.post("/api/lock/close").await;
        response.assert_status_ok();
        let body: StatusResponse = response.json();
        assert_eq!(body.snapshot.lock, LockState::Locked);
        assert!(!body.snapshot.otp_verified);
        assert_eq!(
            relay.commands(),
            vec![RelayCommand::Open, RelayCommand::Close]
        );
    }

    #[tokio::test]
    async fn test_stopped_controller_returns_503() {
        let (server, state, _) = server();
        state.controller().shutdown().await;

        let response = server.get("/api/status").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: ErrorResponse = response.json();
        assert_eq!(body.error, "controller_stopped");
    }

    #[test]
    fn test_otp_request_deserialization() {
        let request: OtpRequest = serde_json::from_str(r#"{"code": "000000"}"#).unwrap();
        assert_eq!(request.code, "000000");
    }
}
