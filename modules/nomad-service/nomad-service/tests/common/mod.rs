#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::response::Response;
use futures::StreamExt;
use http::{Request, StatusCode};
use tower::ServiceExt;

/// Read a streamed body to the end. Returns the text received and whether
/// the stream ended in an error instead of cleanly.
pub async fn read_stream(response: Response) -> (String, bool) {
    let mut stream = response.into_body().into_data_stream();
    let mut text = Vec::new();
    let mut aborted = false;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => text.extend_from_slice(&bytes),
            Err(_) => {
                aborted = true;
                break;
            }
        }
    }
    (String::from_utf8_lossy(&text).into_owned(), aborted)
}

pub async fn post_json(app: &Router, uri: &str, body: &str) -> Response {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_sns(app: &Router, uri: &str, body: &str) -> Response {
    let request = Request::post(uri)
        .header("content-type", "text/plain; charset=UTF-8")
        .header("x-amz-sns-message-type", "Notification")
        .header("x-amz-sns-topic-arn", "arn:aws:sns:eu-west-1:123456789012:workers")
        .body(Body::from(body.to_owned()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub fn assert_event_stream(response: &Response) {
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
}

pub async fn body_len(response: Response) -> usize {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .len()
}
