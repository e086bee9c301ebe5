//! Axum middleware for the HTTP face.
//!
//! Small composable layers attached to the router: request id and request
//! observation (logging plus metrics), CORS, security headers and the optional
//! bearer-token check. They hold no state beyond the shared metrics registry
//! and the configured secret.
use std::{sync::Arc, time::Instant};

use axum::{
    Json,
    extract::{MatchedPath, Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::Instrument;

use crate::{metrics::GatewayMetrics, tracing_setup::create_request_span};

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Assign a request id, run the request inside a span carrying it, then log
/// and count the outcome. The metrics `path` label is the matched route
/// template, so `/api/v1/publish/orders` counts as `/api/v1/publish/{topic}`.
pub async fn observe_request_middleware(
    State(metrics): State<Arc<GatewayMetrics>>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let span = create_request_span(method.as_str(), &path, &request_id);
    let mut response = next.run(req).instrument(span.clone()).await;
    let duration = start.elapsed();
    let status = response.status();

    span.record("http.status_code", status.as_u16());
    span.record("duration_ms", duration.as_millis() as u64);
    span.in_scope(|| {
        tracing::info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            latency_ms = duration.as_millis() as u64,
            "HTTP request"
        );
    });

    metrics
        .record_http_request(method.as_str(), &path, status.as_u16(), duration)
        .await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }

    response
}

/// Add common security hardening headers.
pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}

/// Permissive CORS. Preflight requests are answered with 204 directly.
pub async fn cors_middleware(req: Request, next: Next) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };
    let headers = response.headers_mut();

    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS, GET, PUT, DELETE"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(
            "Content-Type, Content-Length, Accept-Encoding, Authorization, Accept, Origin, Cache-Control, X-Requested-With",
        ),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );

    response
}

/// Require `Authorization: Bearer <secret>` on every route except `/health`.
pub async fn bearer_auth_middleware(
    State(secret): State<Arc<str>>,
    req: Request,
    next: Next,
) -> Response {
    if req.uri().path() == "/health" || req.method() == Method::OPTIONS {
        return next.run(req).await;
    }

    let Some(value) = req.headers().get(header::AUTHORIZATION) else {
        return unauthorized("Authorization header is required");
    };
    let Some(token) = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        return unauthorized("Invalid authorization header format");
    };
    if token != &*secret {
        return unauthorized("Invalid token");
    }

    next.run(req).await
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}
