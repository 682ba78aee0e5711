//! OpenAPI specification generation for the guardian API.

use axum::Json;
use utoipa::OpenApi;

use guardian_core::{HealthReading, LockState, SafetyStatus, StatusSnapshot};

use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::lock::{OtpRequest, OtpResponse, StatusResponse};

/// Serve the OpenAPI specification as JSON at `/api/openapi.json`.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// The OpenAPI specification as pretty JSON, for the gen-openapi binary.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for guardian.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "guardian API",
        version = "0.1.0",
        description = r#"
# guardian API

Local diagnostics API for the guardian lockbox controller.

The controller is normally driven over Bluetooth LE: a phone writes a six
digit one-time passcode to the OTP characteristic and reads or subscribes to
the six byte status characteristic. This API exposes the same operations on
the loopback interface for bench testing.

## Lock cycle

1. A valid code marks the session verified and energises the relay.
2. After a 2 second settle delay the lock reports open.
3. 15 seconds later the lock closes on its own, unless another code re-arms it.

## Status frame

| Byte | Meaning |
|------|---------|
| 0 | OTP verified (0/1) |
| 1 | Lock open (0/1) |
| 2 | Battery percent (0-100) |
| 3 | Safety status (0 inactive, 1 active, 2 maintenance, 3 offline) |
| 4-5 | Supply voltage in tenths of a volt, big-endian |
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local guardian server")
    ),
    tags(
        (
            name = "system",
            description = "Health checks"
        ),
        (
            name = "lock",
            description = "Lock status, OTP submission and manual close"
        )
    ),
    paths(
        super::health::health_check,
        super::lock::get_status,
        super::lock::submit_otp,
        super::lock::close_lock,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            StatusResponse,
            OtpRequest,
            OtpResponse,
            StatusSnapshot,
            HealthReading,
            LockState,
            SafetyStatus,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "guardian API");
        assert!(spec.paths.paths.contains_key("/api/otp"));
        assert!(spec.paths.paths.contains_key("/api/lock/close"));
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = get_openapi_json().unwrap();
        assert!(json.contains("\"openapi\":"));
        assert!(json.contains("\"guardian API\""));
        assert!(json.contains("submitOtp"));
    }
}
