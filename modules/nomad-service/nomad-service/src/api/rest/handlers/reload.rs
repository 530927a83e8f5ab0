use axum::Extension;
use axum::extract::Path;
use axum::response::Response;
use bytes::Bytes;

use crate::api::rest::dto::ReloadRequestDto;
use crate::api::rest::error::ApiError;
use crate::api::rest::stream::event_stream;
use crate::module::AppState;

/// `POST /reload/{service}/{key}`.
///
/// # Errors
/// `ApiError::NotFound` for an unknown service, a wrong key or a body
/// without a secret.
pub async fn reload(
    Extension(state): Extension<AppState>,
    Path((service, key)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    if !state.credentials.verify(&service, &key) {
        return Err(ApiError::NotFound);
    }
    let request = ReloadRequestDto::parse(&body).ok_or(ApiError::NotFound)?;

    let reloader = state.reload.clone();
    Ok(event_stream("reload", state.gateway.stream_buffer, move |progress| async move {
        reloader.reload(&service, &request.secret, &progress).await;
    }))
}
