use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::HeaderMap;

use crate::module::GatewaySettings;

/// Routes whose last path segment is a service key.
const KEYED_ROUTES: [&str; 3] = ["deploy", "autoscaling", "reload"];

pub const HEALTH_PATH: &str = "/healthz";

/// Resolve the caller address. The trusted proxy header wins over the socket
/// peer when present and non-empty.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, header_name: &str) -> String {
    headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "-".to_owned())
}

/// Mask the key segment of `/{route}/{service}/{key}` paths.
#[must_use]
pub fn redact_path(path: &str) -> String {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match segments.as_slice() {
        [route, service, _key] if KEYED_ROUTES.contains(route) => {
            format!("/{route}/{service}/***")
        }
        _ => path.to_owned(),
    }
}

/// One line per request on the `nomad_service::access` target.
pub async fn access_log(
    State(settings): State<GatewaySettings>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    if path == HEALTH_PATH {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_ip = client_ip(req.headers(), peer, &settings.trusted_ip_header);
    let method = req.method().clone();
    let started = Instant::now();

    let response = next.run(req).await;

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    tracing::info!(
        target: "nomad_service::access",
        %client_ip,
        %method,
        path = %redact_path(&path),
        status = response.status().as_u16(),
        elapsed_ms,
        "request"
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::HeaderValue;
    use tower::ServiceExt;
    use tracing_test::traced_test;

    use crate::api::rest::routes::test_router;
    use crate::test_support::TestStateBuilder;

    #[test]
    fn proxy_header_wins_over_peer() {
        let peer: SocketAddr = "10.1.2.3:55000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer), "cf-connecting-ip"), "10.1.2.3");

        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(client_ip(&headers, Some(peer), "cf-connecting-ip"), "203.0.113.9");

        headers.insert("cf-connecting-ip", HeaderValue::from_static("  "));
        assert_eq!(client_ip(&headers, Some(peer), "cf-connecting-ip"), "10.1.2.3");
        assert_eq!(client_ip(&headers, None, "cf-connecting-ip"), "-");
    }

    #[test]
    fn keys_are_masked() {
        assert_eq!(redact_path("/deploy/wiki/s3cr3t"), "/deploy/wiki/***");
        assert_eq!(redact_path("/reload/wiki/s3cr3t"), "/reload/wiki/***");
        assert_eq!(redact_path("/autoscaling/workers/k"), "/autoscaling/workers/***");
        assert_eq!(redact_path("/healthz"), "/healthz");
        assert_eq!(redact_path("/other/a/b"), "/other/a/b");
    }

    #[tokio::test]
    #[traced_test]
    async fn access_lines_skip_health_checks() {
        let app = test_router(TestStateBuilder::new().build());

        let health = http::Request::get("/healthz").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(health).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
        assert!(!logs_contain("path=/healthz"));

        let deploy = http::Request::post("/deploy/wiki/topsecret")
            .header("cf-connecting-ip", "198.51.100.7")
            .body(Body::from(r#"{"version":"v1"}"#))
            .unwrap();
        let response = app.oneshot(deploy).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);

        assert!(logs_contain("client_ip=198.51.100.7"));
        assert!(logs_contain("path=/deploy/wiki/***"));
        assert!(logs_contain("status=404"));
        assert!(!logs_contain("topsecret"));
    }
}
