//! Router assembly

use super::handlers::{self, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Build the relay router
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    let api_routes = Router::new()
        .route("/api/v1/chat", post(handlers::relay_chat))
        .route("/api/v1/models", get(handlers::list_models))
        .route("/api/v1/models/refresh", post(handlers::refresh_models))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .merge(api_routes)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{
        builtin_families, TokenCounter, TokenEstimator, WordBasedEstimator, CL100K_BASE,
    };
    use crate::registry::ModelRegistry;
    use crate::relay::{DispatcherConfig, Relay, RequestDispatcher};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn router(dir: &Path) -> Router {
        let estimator: Arc<dyn TokenEstimator> = Arc::new(WordBasedEstimator::new(1.0));
        let counter = Arc::new(
            TokenCounter::from_parts(
                builtin_families(),
                HashMap::from([(CL100K_BASE.to_string(), estimator)]),
            )
            .unwrap(),
        );
        let registry = Arc::new(ModelRegistry::load(dir, Arc::clone(&counter)).unwrap());
        let dispatcher = RequestDispatcher::new(DispatcherConfig::default()).unwrap();
        let state = AppState {
            relay: Arc::new(Relay::new(registry, counter, dispatcher)),
        };
        build_router(state, 64 * 1024)
    }

    fn write_record(dir: &Path, model: &str, api_base: &str) {
        let record = json!({
            "model_name": model,
            "api_base": api_base,
            "deployment_name": "chat",
            "api_key": "k",
            "max_response_tokens": 100,
        });
        fs::write(dir.join(format!("{}.json", model)), record.to_string()).unwrap();
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let (status, body) = send(
            router(dir.path()),
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_list_and_refresh_models() {
        let dir = TempDir::new().unwrap();
        write_record(dir.path(), "gpt-4", "https://example.openai.azure.com");
        let router = router(dir.path());

        let (status, body) = send(
            router.clone(),
            Request::get("/api/v1/models").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["support_list"], json!(["gpt-4"]));

        write_record(dir.path(), "gpt-35-turbo", "https://example.openai.azure.com");
        let (status, body) = send(
            router,
            Request::post("/api/v1/models/refresh").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["support_list"], json!(["gpt-35-turbo", "gpt-4"]));
    }

    #[tokio::test]
    async fn test_failed_refresh_reports_config_error() {
        let dir = TempDir::new().unwrap();
        write_record(dir.path(), "gpt-4", "https://example.openai.azure.com");
        let router = router(dir.path());

        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let (status, body) = send(
            router,
            Request::post("/api/v1/models/refresh").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["data"]["error"], "CONFIG_ERROR");
    }

    #[tokio::test]
    async fn test_chat_unknown_model() {
        let dir = TempDir::new().unwrap();
        let (status, body) = send(
            router(dir.path()),
            post_json(
                "/api/v1/chat",
                json!({"model_name": "gpt-4", "messages": [{"role": "user", "content": "hi"}]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
        assert_eq!(body["status"], "error");
        assert_eq!(body["data"]["error"], "UNSUPPORTED_MODEL");
    }

    #[tokio::test]
    async fn test_chat_body_without_model_name_gets_envelope() {
        let dir = TempDir::new().unwrap();
        let (status, body) = send(
            router(dir.path()),
            post_json(
                "/api/v1/chat",
                json!({"messages": [{"role": "user", "content": "hi"}]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
        assert_eq!(body["status"], "error");
        assert_eq!(body["data"]["error"], "MALFORMED_REQUEST");
        assert!(body["data"]["detail"].as_str().unwrap().contains("model_name"));
    }

    #[tokio::test]
    async fn test_chat_non_string_content_gets_envelope() {
        let dir = TempDir::new().unwrap();
        write_record(dir.path(), "gpt-4", "http://127.0.0.1:9");
        let (status, body) = send(
            router(dir.path()),
            post_json(
                "/api/v1/chat",
                json!({"model_name": "gpt-4", "messages": [{"role": "user", "content": 5}]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert_eq!(body["data"]["error"], "MALFORMED_REQUEST");
    }

    #[tokio::test]
    async fn test_chat_parameter_range_details() {
        let dir = TempDir::new().unwrap();
        write_record(dir.path(), "gpt-4", "http://127.0.0.1:9");
        let (status, body) = send(
            router(dir.path()),
            post_json(
                "/api/v1/chat",
                json!({
                    "model_name": "gpt-4",
                    "messages": [{"role": "user", "content": "hi"}],
                    "temperature": 2.1
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["data"]["error"], "PARAMETER_RANGE");
        assert_eq!(body["data"]["field"], "temperature");
        assert_eq!(body["data"]["max"], 2.0);
    }

    #[tokio::test]
    async fn test_chat_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/openai/deployments/chat/chat/completions")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "usage": {"total_tokens": 9},
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        write_record(dir.path(), "gpt-4", &server.url());
        let request = Request::post("/api/v1/chat")
            .header("content-type", "application/json")
            .header("x-caller-id", "alice")
            .body(Body::from(
                json!({"model_name": "gpt-4", "messages": [{"role": "user", "content": "hi"}]})
                    .to_string(),
            ))
            .unwrap();

        let (status, body) = send(router(dir.path()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["token_usage"], 9);
        assert_eq!(body["data"]["messages"][0]["message"]["content"], "hello");
        assert_eq!(body["data"]["trimmed_messages"], 0);
        // 3 framing + 1 word + 1 reply primer
        assert_eq!(body["data"]["prompt_tokens"], 5);
    }
}
