//! # Summarizer
//!
//! Streaming map-reduce summarization of long documents.
//!
//! This library provides:
//! - An HTTP API that accepts a document as a list of paragraphs
//! - A three-stage reduction pipeline over an OpenAI-compatible backend
//! - Real-time progress and token streaming over SSE, or one aggregated answer
//!
//! ## Pipeline
//!
//! ```text
//!   paragraphs ──▶ primary groups ──▶ primary summaries ──┐
//!                  (N per group,      (concurrent,        │
//!                   skipped if 1)      bounded)           ▼
//!                                       secondary groups of 3 ──▶ secondary summaries
//!                                                                        │
//!                                                                        ▼
//!                                                        final summary (token stream)
//! ```
//!
//! Every stage publishes events on a per-task [`summarize::EventBus`]; the
//! HTTP handler subscribes before the pipeline starts and relays or folds
//! them until `completed` or `error`.
//!
//! ## Modules
//! - `api`: axum routes, request validation, SSE relay
//! - `llm`: generation backend trait and HTTP client
//! - `summarize`: planner, event bus, stage executor, stream adapter
//! - `config`: environment configuration

pub mod api;
pub mod config;
pub mod llm;
pub mod summarize;

pub use config::Config;
