//! HTTP route handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use futures::StreamExt;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::llm::OpenAiClient;
use crate::summarize::{EventBus, PromptTemplates, Summarizer, SummaryRun};

use super::error::{failure_status, ValidationError};
use super::types::{HealthResponse, SummaryRequest, SummaryResponse};

/// Shared application state.
pub struct AppState {
    pub summarizer: Arc<Summarizer>,
    /// Default instruction texts, loaded at startup.
    pub templates: PromptTemplates,
}

/// Build the versioned router around `state`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let v1 = Router::new()
        .route("/summarize", post(summarize))
        .route("/health", get(health));

    Router::new()
        .nest("/summarizer/v1", v1)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let templates = PromptTemplates::load(&config.templates_dir)?;
    let llm = Arc::new(OpenAiClient::new(
        config.base_url.clone(),
        config.api_key.clone(),
        config.model.clone(),
        config.request_timeout,
    )?);
    tracing::info!("Using model {} at {}", llm.model(), config.base_url);

    let summarizer = Arc::new(Summarizer::new(llm, Arc::new(EventBus::new())));
    let state = Arc::new(AppState {
        summarizer,
        templates,
    });
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining open streams");
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Summarize a document, streamed as SSE or folded into one JSON answer.
async fn summarize(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SummaryRequest>, JsonRejection>,
) -> Result<Response, ValidationError> {
    let Json(request) = payload?;
    request.validate()?;

    let task_id = Uuid::new_v4();
    let span = tracing::info_span!("summarize", %task_id);
    let stream = request.wants_stream();
    let job = span.in_scope(|| {
        let job = request.into_job(task_id, &state.templates);
        tracing::info!(
            paragraphs = job.paragraphs.len(),
            primary_chunk_size = job.config.primary_chunk_size,
            secondary_chunk_size = job.config.secondary_chunk_size,
            max_parallel_requests = job.config.max_parallel_requests,
            temperature = job.config.temperature,
            max_tokens_per_request = job.config.max_tokens_per_request,
            stream,
            "Summarization requested"
        );
        job
    });

    let run = span.in_scope(|| SummaryRun::start(Arc::clone(&state.summarizer), job));

    if stream {
        let events = span
            .in_scope(|| run.into_stream())
            .map(|event| Event::default().json_data(&event));
        let sse = Sse::new(events).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keep-alive"),
        );
        return Ok(sse.into_response());
    }

    let result = run.aggregate().instrument(span).await;
    let status = result
        .error
        .as_ref()
        .map(failure_status)
        .unwrap_or(StatusCode::OK);
    let body = SummaryResponse {
        summary: result.summary,
        time_taken_sec: result.time_taken.as_secs_f64(),
    };
    Ok((status, Json(body)).into_response())
}
