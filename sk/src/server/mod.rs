//! HTTP boundary
//!
//! Thin axum layer over the pipeline and the chat pass-through. Handlers
//! validate, delegate, and map errors onto status codes; no state is kept
//! between requests.

mod error;
mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::{debug, info};

pub use error::ApiError;
pub use handlers::{DONE_SENTINEL, sse_frame, vote_score};

use crate::chat::ChatService;
use crate::pipeline::RecommendationPipeline;

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RecommendationPipeline>,
    pub chat: Arc<ChatService>,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    debug!("router: called");
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/recommendations", post(handlers::recommendations_handler))
        .route("/recommendations/:id/vote", post(handlers::vote_handler))
        .route("/chat", post(handlers::chat_handler))
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChatConfig, PipelineConfig};
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::LlmClient;
    use crate::prompts::PromptLoader;
    use serde_json::{Value, json};
    use std::net::SocketAddr;
    use tokio::sync::oneshot;

    async fn spawn(llm: MockLlmClient) -> (SocketAddr, oneshot::Sender<()>) {
        spawn_shared(Arc::new(llm)).await
    }

    async fn spawn_shared(llm: Arc<MockLlmClient>) -> (SocketAddr, oneshot::Sender<()>) {
        let llm: Arc<dyn LlmClient> = llm;
        let prompts = Arc::new(PromptLoader::embedded_only());
        let state = AppState {
            pipeline: Arc::new(RecommendationPipeline::new(
                llm.clone(),
                prompts.clone(),
                PipelineConfig::default(),
            )),
            chat: Arc::new(ChatService::new(llm, prompts, ChatConfig::default())),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = serve(listener, state, async {
                let _ = rx.await;
            })
            .await;
        });
        (addr, tx)
    }

    #[tokio::test]
    async fn test_health() {
        let (addr, _shutdown) = spawn(MockLlmClient::default()).await;
        let body = reqwest::get(format!("http://{addr}/health")).await.unwrap().text().await.unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_invalid_recommendation_request() {
        let llm = MockLlmClient::default();
        let (addr, _shutdown) = spawn(llm).await;

        let response = reqwest::Client::new()
            .post(format!("http://{addr}/recommendations"))
            .json(&json!({"context": "   ", "preferences": "growth"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Invalid request data");
        let fields: Vec<&str> = body["details"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["context", "preferences"]);
    }

    #[tokio::test]
    async fn test_truncated_bodies_are_rejected_before_the_pipeline() {
        let llm = Arc::new(MockLlmClient::default());
        let (addr, _shutdown) = spawn_shared(llm.clone()).await;
        let client = reqwest::Client::new();
        let truncated = r#"{"context": "Should I sell my hou", "preferences": ["gro"#;

        for (path, error) in [
            ("recommendations", "Invalid request data"),
            ("recommendations/sell_house/vote", "Invalid vote data"),
            ("chat", "Invalid request data"),
        ] {
            let response = client
                .post(format!("http://{addr}/{path}"))
                .header("content-type", "application/json")
                .body(truncated)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 400, "{path}");
            let body: Value = response.json().await.unwrap();
            assert_eq!(body["error"], error);
            assert_eq!(body["details"][0]["field"], "body");
        }
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_orchestrator_failure_is_500_with_stage() {
        let llm = MockLlmClient::default().reply("planning stage", "no json here");
        let (addr, _shutdown) = spawn(llm).await;

        let response = reqwest::Client::new()
            .post(format!("http://{addr}/recommendations"))
            .json(&json!({"context": "Rent or buy?", "preferences": [], "constraints": []}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 500);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["stage"], "orchestrator");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_vote() {
        let (addr, _shutdown) = spawn(MockLlmClient::default()).await;
        let client = reqwest::Client::new();

        let ok = client
            .post(format!("http://{addr}/recommendations/negotiate_first/vote"))
            .json(&json!({"score": 1}))
            .send()
            .await
            .unwrap();
        assert_eq!(ok.status(), 200);
        assert_eq!(ok.json::<Value>().await.unwrap(), json!({"success": true}));

        let bad = client
            .post(format!("http://{addr}/recommendations/negotiate_first/vote"))
            .json(&json!({"score": 3}))
            .send()
            .await
            .unwrap();
        assert_eq!(bad.status(), 400);
        assert_eq!(bad.json::<Value>().await.unwrap()["error"], "Invalid vote data");
    }

    #[tokio::test]
    async fn test_chat_streams_sse_frames() {
        let llm = MockLlmClient::default().reply("Clarity", "Which city feels like home?");
        let (addr, _shutdown) = spawn(llm).await;

        let response = reqwest::Client::new()
            .post(format!("http://{addr}/chat"))
            .json(&json!({"message": "Help me choose", "context": "Moving", "previousMessages": []}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(
            response.headers()["content-type"]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );

        let body = response.text().await.unwrap();
        let frames: Vec<&str> = body.lines().filter_map(|l| l.strip_prefix("data: ")).collect();
        assert_eq!(frames.last(), Some(&DONE_SENTINEL));

        let text: String = frames[..frames.len() - 1]
            .iter()
            .map(|f| serde_json::from_str::<Value>(f).unwrap()["content"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(text, "Which city feels like home?");
    }

    #[tokio::test]
    async fn test_chat_errors() {
        let llm = MockLlmClient::default().fail("Clarity", 503, "overloaded");
        let (addr, _shutdown) = spawn(llm).await;
        let client = reqwest::Client::new();

        let invalid = client
            .post(format!("http://{addr}/chat"))
            .json(&json!({"context": "no message"}))
            .send()
            .await
            .unwrap();
        assert_eq!(invalid.status(), 400);

        let upstream = client
            .post(format!("http://{addr}/chat"))
            .json(&json!({"message": "hello"}))
            .send()
            .await
            .unwrap();
        assert_eq!(upstream.status(), 503);
        assert!(upstream.json::<Value>().await.unwrap()["error"].is_string());
    }
}
