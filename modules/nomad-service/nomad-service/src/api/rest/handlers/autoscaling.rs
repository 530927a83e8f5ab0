use axum::Extension;
use axum::extract::Path;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use nomad_service_sdk::{LifecycleEvent, ProgressSink};

use crate::api::rest::dto::{SNS_TOPIC_HEADER, decode_autoscaling};
use crate::api::rest::error::ApiError;
use crate::api::rest::stream::event_stream;
use crate::domain::autoscaling::AutoscalingRequest;
use crate::module::AppState;

/// `POST /autoscaling/{service}/{key}`.
///
/// Deliveries carrying the SNS topic header are acknowledged with a plain
/// status code. Direct calls stream their progress like a deploy.
///
/// # Errors
/// `ApiError::NotFound` for bad credentials or an unusable body,
/// `ApiError::Internal` when draining a terminating node fails.
pub async fn autoscaling(
    Extension(state): Extension<AppState>,
    Path((service, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if !state.credentials.verify(&service, &key) {
        return Err(ApiError::NotFound);
    }
    let push = headers.contains_key(SNS_TOPIC_HEADER);
    if push {
        tracing::info!(%service, payload = %String::from_utf8_lossy(&body), "SNS delivery");
    }

    let request = decode_autoscaling(push, &body).map_err(|err| {
        tracing::debug!(%service, error = %err, "Rejected autoscaling payload");
        ApiError::NotFound
    })?;

    match request {
        AutoscalingRequest::PushConfirmation { subscribe_url } => {
            state.autoscaling.confirm_subscription(&subscribe_url).await;
            Ok(StatusCode::OK.into_response())
        }
        AutoscalingRequest::PushIgnored { reason } => {
            tracing::info!(%service, %reason, "Ignoring SNS message");
            Ok(StatusCode::OK.into_response())
        }
        AutoscalingRequest::PushNotification(event) => {
            lifecycle_notification(&state, event).await.map(IntoResponse::into_response)
        }
        AutoscalingRequest::DirectHealth { instance, health } => {
            let scaler = state.autoscaling.clone();
            Ok(event_stream("autoscaling", state.gateway.stream_buffer, move |progress| async move {
                if let Err(err) = scaler.set_health(&instance, health, &progress).await {
                    tracing::error!(%instance, error = %err, "Setting instance health failed");
                    progress.fail(&err).await;
                }
            }))
        }
        AutoscalingRequest::DirectContinue { instance, hook_name } => {
            let scaler = state.autoscaling.clone();
            Ok(event_stream("autoscaling", state.gateway.stream_buffer, move |progress| async move {
                if let Err(err) = scaler
                    .continue_lifecycle(&instance, &hook_name, &service, &progress)
                    .await
                {
                    tracing::error!(%instance, %hook_name, error = %err, "Completing lifecycle action failed");
                    progress.fail(&err).await;
                }
            }))
        }
    }
}

/// Drain the node in its own task so an impatient SNS connection cannot
/// cancel it halfway. A failure answers 500 and SNS redelivers.
async fn lifecycle_notification(
    state: &AppState,
    event: LifecycleEvent,
) -> Result<StatusCode, ApiError> {
    let scaler = state.autoscaling.clone();
    let task = tokio::spawn(async move {
        let progress = ProgressSink::log_only("autoscaling");
        scaler.handle_lifecycle(&event, &progress).await
    });

    match task.await {
        Ok(Ok(outcome)) => {
            tracing::info!(%outcome, "Lifecycle notification handled");
            Ok(StatusCode::OK)
        }
        Ok(Err(err)) => {
            tracing::error!(error = %err, "Lifecycle notification failed");
            Err(ApiError::Internal(err.to_string()))
        }
        Err(join) => Err(ApiError::Internal(join.to_string())),
    }
}
