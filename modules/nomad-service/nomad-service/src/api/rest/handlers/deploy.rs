use axum::Extension;
use axum::extract::Path;
use axum::response::Response;
use bytes::Bytes;

use crate::api::rest::dto::DeployRequestDto;
use crate::api::rest::error::ApiError;
use crate::api::rest::stream::event_stream;
use crate::module::AppState;

/// `POST /deploy/{service}/{key}`: stream a full deploy of `version`.
///
/// # Errors
/// `ApiError::NotFound` for an unknown service, a wrong key or a body
/// without a version. Deploy failures are reported inside the stream.
pub async fn deploy(
    Extension(state): Extension<AppState>,
    Path((service, key)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    if !state.credentials.verify(&service, &key) {
        return Err(ApiError::NotFound);
    }
    let request = DeployRequestDto::parse(&body).ok_or(ApiError::NotFound)?;

    tracing::info!(%service, version = %request.version, "Deploy requested");
    let deployer = state.deploy.clone();
    Ok(event_stream("deploy", state.gateway.stream_buffer, move |progress| async move {
        match deployer.deploy(&service, &request.version, &progress).await {
            Ok(path) => {
                tracing::info!(%service, version = %request.version, jobspec = %path.display(), "Deploy finished");
            }
            Err(err) => {
                tracing::error!(%service, version = %request.version, error = %err, "Deploy failed");
                progress.fail(&err).await;
            }
        }
    }))
}
