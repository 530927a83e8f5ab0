use http::StatusCode;

/// Liveness probe. Kept out of the access log.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}
