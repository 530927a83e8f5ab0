use std::future::Future;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::header::{CACHE_CONTROL, CONTENT_TYPE};
use nomad_service_sdk::ProgressSink;
use tokio_stream::wrappers::ReceiverStream;

/// Start `work` in its own task and return a `text/event-stream` response
/// that carries whatever it writes to its sink.
///
/// The task is detached from the connection: if the client goes away the work
/// still runs to the end, only its output is discarded. A sink failure ends
/// the body without the terminating chunk.
#[must_use]
pub fn event_stream<F, Fut>(operation: &str, buffer: usize, work: F) -> Response
where
    F: FnOnce(ProgressSink) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (sink, rx) = ProgressSink::channel(operation, buffer);
    tokio::spawn(work(sink));

    (
        [(CONTENT_TYPE, "text/event-stream"), (CACHE_CONTROL, "no-cache")],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response()
}
