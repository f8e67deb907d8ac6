//! HTTP API for submitting summarization requests.
//!
//! ## Endpoints
//!
//! - `POST /summarizer/v1/summarize` - summarize paragraphs, streamed (SSE) or aggregated
//! - `GET /summarizer/v1/health` - liveness

mod error;
mod routes;
pub mod types;

pub use error::{failure_status, ValidationError};
pub use routes::{build_router, serve, AppState};
