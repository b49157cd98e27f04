//! HTTP surface for Rusty Digest.
//!
//! - `POST /summarize` – Run the map-reduce pipeline over a document, optionally merging
//!   analysis sections into the final synthesis. Per-request overrides replace the server's
//!   default `PipelineConfig` fields.
//! - `GET /metrics` – Observe run counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use crate::metrics::MetricsSnapshot;
use crate::pipeline::{AnalysisSection, DigestApi, FinalSummary, PipelineError, PipelineOverrides};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Build the HTTP router exposing the digest API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: DigestApi + 'static,
{
    Router::new()
        .route("/summarize", post(summarize_document::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Request body for the `POST /summarize` endpoint.
#[derive(Deserialize)]
struct SummarizeRequest {
    /// Raw document contents.
    document: String,
    /// Externally produced analysis sections merged at finalize time.
    #[serde(default)]
    sections: Vec<AnalysisSection>,
    /// Optional replacements for the default pipeline configuration.
    #[serde(flatten)]
    overrides: PipelineOverrides,
}

/// Summarize a document and return the synthesis with run statistics.
async fn summarize_document<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<SummarizeRequest>,
) -> Result<Json<FinalSummary>, AppError>
where
    S: DigestApi,
{
    let SummarizeRequest {
        document,
        sections,
        overrides,
    } = request;
    let summary = service.summarize(document, sections, overrides).await?;
    tracing::info!(
        chunks = summary.chunk_count,
        rounds = summary.rounds,
        summarizer_calls = summary.summarizer_calls,
        "Summarize request completed"
    );
    Ok(Json(summary))
}

/// Return the current run counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: DigestApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "summarize",
                method: "POST",
                path: "/summarize",
                description: "Chunk a document, summarize each chunk, collapse summaries until they fit token_max, and return one final synthesis with run statistics.",
                request_example: Some(json!({
                    "document": "Long document contents",
                    "sections": [
                        { "category": "visual", "content": "Hero banner dominates the fold" },
                        { "category": "functional", "content": "Checkout completes in 3 steps" }
                    ],
                    "token_max": 1000,
                    "chunk_count_limit": 10,
                    "recursion_limit": 10
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return run counters: started, completed, failed, cancelled, chunks, rounds and summarizer calls.",
                request_example: None,
            },
            CommandDescriptor {
                name: "commands",
                method: "GET",
                path: "/commands",
                description: "List the commands exposed by this server.",
                request_example: None,
            },
        ],
    })
}

struct AppError(PipelineError);

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            PipelineError::EmptyInput | PipelineError::NoInput | PipelineError::InvalidConfig(_) => {
                StatusCode::BAD_REQUEST
            }
            PipelineError::CollapseBudgetExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Summarizer { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Cancelled { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": self.0.to_string(),
            "stage": self.0.stage(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{create_router, get_commands};
    use crate::metrics::MetricsSnapshot;
    use crate::pipeline::{
        AnalysisCategory, AnalysisSection, DigestApi, FinalSummary, PipelineError,
        PipelineOverrides, PipelineState,
    };
    use crate::summarization::SummarizerError;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[tokio::test]
    async fn commands_catalog_exposes_summarize_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let summarize = commands
            .iter()
            .find(|cmd| cmd.name == "summarize")
            .expect("summarize command present");

        assert_eq!(summarize.method, "POST");
        assert_eq!(summarize.path, "/summarize");
        assert!(summarize.description.contains("token_max"));
    }

    #[tokio::test]
    async fn summarize_route_forwards_sections_and_overrides() {
        let service = Arc::new(StubDigestService::succeeding());
        let app = create_router(service.clone());

        let payload = json!({
            "document": "Document body",
            "sections": [{ "category": "textual", "content": "Clear headings" }],
            "token_max": 300,
            "chunk_overlap": 0
        });

        let response = app
            .oneshot(post_json("/summarize", payload))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["final_summary"], "stub synthesis");
        assert_eq!(json["chunk_count"], 1);
        assert_eq!(json["rounds"], 0);

        let calls = service.calls.lock().await;
        assert_eq!(calls.len(), 1);
        let (document, sections, overrides) = &calls[0];
        assert_eq!(document, "Document body");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].category, AnalysisCategory::Textual);
        assert_eq!(overrides.token_max, Some(300));
        assert_eq!(overrides.chunk_overlap, Some(0));
        assert_eq!(overrides.chunk_size, None);
    }

    #[tokio::test]
    async fn budget_failures_map_to_unprocessable_entity() {
        let service = Arc::new(StubDigestService::failing(|| {
            PipelineError::CollapseBudgetExceeded {
                rounds: 10,
                total_size: 4000,
                token_max: 1000,
            }
        }));
        let response = create_router(service)
            .oneshot(post_json("/summarize", json!({ "document": "text" })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["stage"], "collapsing");
        assert!(json["error"].as_str().unwrap().contains("10 collapse rounds"));
    }

    #[tokio::test]
    async fn summarizer_failures_map_to_bad_gateway() {
        let service = Arc::new(StubDigestService::failing(|| PipelineError::Summarizer {
            stage: PipelineState::Mapping,
            round: None,
            source: SummarizerError::ProviderUnavailable("offline".into()),
        }));
        let response = create_router(service)
            .oneshot(post_json("/summarize", json!({ "document": "text" })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(response).await["stage"], "mapping");
    }

    #[tokio::test]
    async fn empty_documents_are_bad_requests() {
        let service = Arc::new(StubDigestService::failing(|| PipelineError::EmptyInput));
        let response = create_router(service)
            .oneshot(post_json("/summarize", json!({ "document": "  " })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["stage"], "chunking");
    }

    #[tokio::test]
    async fn metrics_route_returns_snapshot() {
        let service = Arc::new(StubDigestService::succeeding());
        let response = create_router(service)
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["runs_completed"], 3);
        assert_eq!(json["collapse_rounds"], 2);
    }

    fn post_json(uri: &str, payload: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request")
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    type SummarizeCall = (String, Vec<AnalysisSection>, PipelineOverrides);

    struct StubDigestService {
        calls: Mutex<Vec<SummarizeCall>>,
        failure: Option<fn() -> PipelineError>,
    }

    impl StubDigestService {
        fn succeeding() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failure: None,
            }
        }

        fn failing(failure: fn() -> PipelineError) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failure: Some(failure),
            }
        }
    }

    #[async_trait]
    impl DigestApi for StubDigestService {
        async fn summarize(
            &self,
            document: String,
            sections: Vec<AnalysisSection>,
            overrides: PipelineOverrides,
        ) -> Result<FinalSummary, PipelineError> {
            self.calls.lock().await.push((document, sections, overrides));
            if let Some(failure) = self.failure {
                return Err(failure());
            }
            Ok(FinalSummary {
                final_summary: "stub synthesis".into(),
                chunk_count: 1,
                dropped_chunks: 0,
                rounds: 0,
                summarizer_calls: 2,
            })
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                runs_started: 3,
                runs_completed: 3,
                collapse_rounds: 2,
                ..MetricsSnapshot::default()
            }
        }
    }
}
