//! Webhook endpoint handlers.
//!
//! The POST handler only verifies, parses and dispatches: each opt-in event
//! runs in its own detached task, so the platform gets its 200 well inside
//! the 20 second delivery window regardless of how slow the collaborators are.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{CatalogClient, GraphClient};
use crate::events::WebhookPayload;
use crate::pipeline::Pipeline;
use crate::web::signature::verify_request_signature;
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(config: Config, client: Client) -> Self {
        let graph = GraphClient::new(client.clone(), &config);
        let catalog = CatalogClient::new(client, &config);
        let pipeline = Pipeline::new(graph, catalog, &config);

        Self {
            config: Arc::new(config),
            pipeline,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Subscription Verification
// =============================================================================

/// Query sent by the platform when the webhook is (re)subscribed.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(default, rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(default, rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(default, rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Echo the challenge back iff the verify token matches.
pub fn check_subscription(query: &VerifyQuery, validation_token: &str) -> Option<String> {
    let mode_ok = query.mode.as_deref() == Some("subscribe");
    let token_ok = query.verify_token.as_deref() == Some(validation_token);

    if mode_ok && token_ok {
        Some(query.challenge.clone().unwrap_or_default())
    } else {
        None
    }
}

/// `GET /webhook`
pub async fn verify_subscription(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    match check_subscription(&query, &state.config.validation_token) {
        Some(challenge) => {
            info!("webhook_subscription_validated");
            (StatusCode::OK, challenge).into_response()
        }
        None => {
            warn!(
                mode = ?query.mode,
                has_token = query.verify_token.is_some(),
                "webhook_subscription_rejected"
            );
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

// =============================================================================
// Event Delivery
// =============================================================================

/// Webhook response.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched: Option<usize>,
}

impl WebhookResponse {
    fn new(status: &str, dispatched: Option<usize>) -> Json<Self> {
        Json(Self {
            status: status.to_string(),
            dispatched,
        })
    }
}

/// `POST /webhook`
///
/// 1. Verify the signature over the raw body (401 on failure)
/// 2. Parse the payload (400 if it is not JSON of the expected shape)
/// 3. Ignore anything that is not a page subscription (404)
/// 4. Spawn a pipeline per opt-in event and return 200 without waiting
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = verify_request_signature(&state.config.app_secret, &headers, &body) {
        warn!(error = %e, body_length = body.len(), "webhook_signature_rejected");
        return (
            StatusCode::UNAUTHORIZED,
            WebhookResponse::new("unauthorized", None),
        )
            .into_response();
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "webhook_payload_invalid");
            return (
                StatusCode::BAD_REQUEST,
                WebhookResponse::new("invalid_payload", None),
            )
                .into_response();
        }
    };

    if !payload.is_page() {
        warn!(object = %payload.object, "webhook_object_unsupported");
        return (
            StatusCode::NOT_FOUND,
            WebhookResponse::new("unsupported_object", None),
        )
            .into_response();
    }

    let dispatched = state.pipeline.dispatch(&payload).len();

    info!(
        entries = payload.entry.len(),
        dispatched = dispatched,
        "webhook_dispatched"
    );

    (
        StatusCode::OK,
        WebhookResponse::new("received", Some(dispatched)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::router;
    use crate::web::signature::{sign_sha1, SIGNATURE_HEADER};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state_for(server: &MockServer) -> AppState {
        AppState::new(Config::for_test(&server.uri()), Client::new())
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn signed_post(secret: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, sign_sha1(secret, body.as_bytes()))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_check_subscription() {
        let query = VerifyQuery {
            mode: Some("subscribe".to_string()),
            verify_token: Some("tok".to_string()),
            challenge: Some("12345".to_string()),
        };
        assert_eq!(check_subscription(&query, "tok"), Some("12345".to_string()));
        assert_eq!(check_subscription(&query, "other"), None);

        let query = VerifyQuery {
            mode: Some("unsubscribe".to_string()),
            ..query
        };
        assert_eq!(check_subscription(&query, "tok"), None);
        assert_eq!(check_subscription(&VerifyQuery::default(), "tok"), None);
    }

    #[tokio::test]
    async fn test_verify_subscription_echoes_challenge() {
        let server = MockServer::start().await;
        let app = router(state_for(&server));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/webhook?hub.mode=subscribe&hub.verify_token=test-validation-token&hub.challenge=CHALLENGE_ACCEPTED")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "CHALLENGE_ACCEPTED");
    }

    #[tokio::test]
    async fn test_verify_subscription_wrong_token() {
        let server = MockServer::start().await;

        for uri in [
            "/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=c",
            "/webhook?hub.mode=other&hub.verify_token=test-validation-token&hub.challenge=c",
            "/webhook",
        ] {
            let response = router(state_for(&server))
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_post_without_signature_rejected() {
        let server = MockServer::start().await;
        let body = json!({"object": "page", "entry": []}).to_string();

        let response = router(state_for(&server))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_post_with_bad_signature_rejected() {
        let server = MockServer::start().await;
        let body = json!({
            "object": "page",
            "entry": [{"id": "PAGE", "messaging": [{"sender": {"id": "U1"}, "optin": {"ref": "P1"}}]}]
        })
        .to_string();

        let response = router(state_for(&server))
            .oneshot(signed_post("not-the-app-secret", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let reply: WebhookResponse = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(reply.status, "unauthorized");
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_post_invalid_json() {
        let server = MockServer::start().await;

        let response = router(state_for(&server))
            .oneshot(signed_post("test-app-secret", "{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_post_non_page_object_makes_no_calls() {
        let server = MockServer::start().await;
        let body = json!({
            "object": "user",
            "entry": [{"id": "X", "messaging": [{"sender": {"id": "U1"}, "optin": {"ref": "P1"}}]}]
        })
        .to_string();

        let response = router(state_for(&server))
            .oneshot(signed_post("test-app-secret", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_post_page_dispatches_optins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/U1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"first_name": "Ada"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/products/P1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_id": "P1", "title": "Scarpe", "imageUrl": "http://img/p1.jpg"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/me/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let body = json!({
            "object": "page",
            "entry": [{
                "id": "PAGE",
                "time": 1458692752478i64,
                "messaging": [
                    {"sender": {"id": "U1"}, "recipient": {"id": "PAGE"}, "timestamp": 1, "optin": {"ref": "P1"}},
                    {"sender": {"id": "U1"}, "recipient": {"id": "PAGE"}, "delivery": {"watermark": 1}}
                ]
            }]
        })
        .to_string();

        let response = router(state_for(&server))
            .oneshot(signed_post("test-app-secret", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let reply: WebhookResponse = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(reply.dispatched, Some(1));

        // The pipeline runs detached; wait for it to drain.
        let mut seen = 0;
        for _ in 0..100 {
            seen = server.received_requests().await.unwrap().len();
            if seen == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(seen, 5);
    }

    #[tokio::test]
    async fn test_post_answers_before_pipeline_finishes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/U1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"first_name": "Ada"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/me/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let body = json!({
            "object": "page",
            "entry": [{
                "id": "PAGE",
                "messaging": [{"sender": {"id": "U1"}, "timestamp": 1, "optin": {"ref": "P1"}}]
            }]
        })
        .to_string();

        let response = tokio::time::timeout(
            Duration::from_millis(500),
            router(state_for(&server)).oneshot(signed_post("test-app-secret", &body)),
        )
        .await
        .expect("webhook reply waited on the pipeline")
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let sends = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.url.path() == "/me/messages")
            .count();
        assert_eq!(sends, 0);
    }

    #[tokio::test]
    async fn test_health() {
        let server = MockServer::start().await;

        let response = router(state_for(&server))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, r#"{"status":"ok"}"#);
    }
}
