mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use chrono::{DateTime, Utc};
use common::{FakeCluster, MemoryMirror, service, service_without_broker};
use kafka_gateway::{adapters::http_face::router, config::models::AuthConfig};
use serde_json::{Value, json};
use tower::ServiceExt; // for oneshot

fn no_auth() -> AuthConfig {
    AuthConfig::default()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_degraded_state() {
    let app = router(service_without_broker(), &no_auth());

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["broker_connected"], false);
    assert_eq!(body["mirror_attached"], false);
}

#[tokio::test]
async fn test_broker_routes_absent_without_broker() {
    let app = router(service_without_broker(), &no_auth());

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/publish/orders", json!({ "value": "x" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.clone().oneshot(get("/api/v1/topics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Metrics stay available
    let (status, body) = send(&app, get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["counters"].is_object());
}

#[tokio::test]
async fn test_publish_success() {
    let cluster = FakeCluster::new().with_topic("orders", &[0, 1, 2]);
    let app = router(service(&cluster, None).await, &no_auth());

    let (status, body) = send(
        &app,
        post_json("/api/v1/publish/orders", json!({ "key": "k1", "value": "hello" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Message published successfully");
    assert_eq!(body["topic"], "orders");
    assert!(body["partition"].as_i64().unwrap() >= 0);
    assert_eq!(body["offset"], 0);

    let sent = cluster.sent();
    assert_eq!(sent[0].key.as_deref(), Some(b"k1".as_slice()));
    assert_eq!(sent[0].value, b"hello");
}

#[tokio::test]
async fn test_publish_without_key_sends_no_key() {
    let cluster = FakeCluster::new().with_topic("orders", &[0]);
    let app = router(service(&cluster, None).await, &no_auth());

    let (status, _) = send(&app, post_json("/api/v1/publish/orders", json!({ "value": "v" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cluster.sent()[0].key, None);
}

#[tokio::test]
async fn test_publish_validation_errors_are_bad_request() {
    let cluster = FakeCluster::new().with_topic("orders", &[0]);
    let app = router(service(&cluster, None).await, &no_auth());

    let (status, body) = send(&app, post_json("/api/v1/publish/orders", json!({ "key": "k" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("value"));

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/publish/orders")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    assert!(cluster.sent().is_empty());
}

#[tokio::test]
async fn test_publish_to_unknown_topic_is_server_error() {
    let cluster = FakeCluster::new();
    let app = router(service(&cluster, None).await, &no_auth());

    let (status, body) = send(&app, post_json("/api/v1/publish/missing", json!({ "value": "v" }))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_topic_lifecycle() {
    let cluster = FakeCluster::new().with_topic("orders", &[0]);
    let app = router(service(&cluster, None).await, &no_auth());

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/topics/payments",
            json!({ "numPartitions": 3, "replicationFactor": 1 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "success");
    assert_eq!(body["topic"], "payments");

    let (status, body) = send(&app, get("/api/v1/topics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topics"], json!(["orders", "payments"]));

    let (status, body) = send(&app, get("/api/v1/topics/payments/partitions")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "topic": "payments", "partitions": [0, 1, 2] }));

    let (status, _) = send(
        &app,
        post_json(
            "/api/v1/topics/payments",
            json!({ "numPartitions": 3, "replicationFactor": 1 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_create_topic_rejects_out_of_range_values() {
    let cluster = FakeCluster::new();
    let app = router(service(&cluster, None).await, &no_auth());

    for body in [
        json!({ "numPartitions": 0, "replicationFactor": 1 }),
        json!({ "numPartitions": 3, "replicationFactor": 40000 }),
    ] {
        let (status, _) = send(&app, post_json("/api/v1/topics/payments", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    assert!(cluster.topic_partitions("payments").is_none());
}

#[tokio::test]
async fn test_partitions_of_unknown_topic_is_server_error() {
    let cluster = FakeCluster::new();
    let app = router(service(&cluster, None).await, &no_auth());

    let (status, _) = send(&app, get("/api/v1/topics/missing/partitions")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_messages_route_requires_mirror() {
    let cluster = FakeCluster::new().with_topic("orders", &[0]);
    let app = router(service(&cluster, None).await, &no_auth());

    let response = app.clone().oneshot(get("/api/v1/messages/orders")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_messages_newest_first_with_paging() {
    let cluster = FakeCluster::new().with_topic("orders", &[0]);
    let mirror = MemoryMirror::new();
    let app = router(service(&cluster, Some(mirror.clone())).await, &no_auth());

    for value in ["first", "second", "third"] {
        let (status, _) = send(&app, post_json("/api/v1/publish/orders", json!({ "value": value }))).await;
        assert_eq!(status, StatusCode::OK);
    }
    mirror.wait_for_records(3).await;

    let (status, body) = send(&app, get("/api/v1/messages/orders?limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"], "orders");
    assert_eq!(body["count"], 2);
    assert_eq!(body["total"], 3);
    assert_eq!(body["messages"][0]["value"], "third");
    assert_eq!(body["messages"][1]["value"], "second");

    let (_, body) = send(&app, get("/api/v1/messages/orders?limit=2&offset=2")).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["messages"][0]["value"], "first");

    let (status, _) = send(&app, get("/api/v1/messages/orders?limit=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, get("/api/v1/messages/orders?limit=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bearer_auth() {
    let cluster = FakeCluster::new().with_topic("orders", &[0]);
    let auth = AuthConfig {
        enabled: true,
        secret: "s3cret".to_string(),
    };
    let app = router(service(&cluster, None).await, &auth);

    let (status, body) = send(&app, get("/api/v1/topics")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authorization header is required");

    let wrong = Request::builder()
        .uri("/api/v1/topics")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token");

    let right = Request::builder()
        .uri("/api/v1/topics")
        .header(header::AUTHORIZATION, "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, right).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_request_id_and_metrics() {
    let cluster = FakeCluster::new().with_topic("orders", &[0]);
    let gateway = service(&cluster, None).await;
    let app = router(gateway.clone(), &no_auth());

    let response = app.clone().oneshot(get("/api/v1/topics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );

    send(&app, post_json("/api/v1/publish/orders", json!({ "value": "v" }))).await;

    let counters = gateway.metrics().snapshot();
    assert_eq!(
        counters[r#"gateway_http_requests_total{method="GET",path="/api/v1/topics",status="200"}"#],
        1
    );
    assert_eq!(
        counters[r#"gateway_http_requests_total{method="POST",path="/api/v1/publish/{topic}",status="200"}"#],
        1
    );
    assert_eq!(
        counters[r#"gateway_broker_operations_total{operation="publish",outcome="success"}"#],
        1
    );
}

#[tokio::test]
async fn test_preflight_is_answered_directly() {
    let app = router(service_without_broker(), &no_auth());
    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/publish/orders")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(preflight).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_keyed_publish_lands_in_mirror_as_published() {
    let cluster = FakeCluster::new().with_topic("orders", &[0, 1, 2]);
    let mirror = MemoryMirror::new();
    let app = router(service(&cluster, Some(mirror.clone())).await, &no_auth());

    let t0 = Utc::now();
    let (status, published) = send(
        &app,
        post_json(
            "/api/v1/publish/orders",
            json!({ "key": "user-42", "value": "{\"amount\":10}" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    mirror.wait_for_records(1).await;

    let (status, body) = send(&app, get("/api/v1/messages/orders?limit=10&offset=0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    let message = &body["messages"][0];
    assert_eq!(message["topic"], "orders");
    assert_eq!(message["key"], "user-42");
    assert_eq!(message["value"], "{\"amount\":10}");
    assert_eq!(message["partition"], published["partition"]);
    assert_eq!(message["offset"], published["offset"]);

    let timestamp: DateTime<Utc> = message["timestamp"].as_str().unwrap().parse().unwrap();
    assert!(timestamp >= t0, "{timestamp} is before {t0}");
}

#[tokio::test]
async fn test_messages_total_counts_only_the_requested_topic() {
    let cluster = FakeCluster::new()
        .with_topic("orders", &[0])
        .with_topic("payments", &[0]);
    let mirror = MemoryMirror::new();
    let app = router(service(&cluster, Some(mirror.clone())).await, &no_auth());

    for (topic, value) in [("orders", "a"), ("payments", "b"), ("payments", "c")] {
        let uri = format!("/api/v1/publish/{topic}");
        let (status, _) = send(&app, post_json(&uri, json!({ "value": value }))).await;
        assert_eq!(status, StatusCode::OK);
    }
    mirror.wait_for_records(3).await;

    let (_, body) = send(&app, get("/api/v1/messages/orders")).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["total"], 1);

    let (_, body) = send(&app, get("/api/v1/messages/payments?limit=1")).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["total"], 2);

    let (_, body) = send(&app, get("/api/v1/messages/unknown")).await;
    assert_eq!(body["count"], 0);
    assert_eq!(body["total"], 0);
}
