#![deny(missing_docs)]

//! Core library for Rusty Digest, a recursive map-reduce document summarizer.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline run counters.
pub mod metrics;
/// Chunk, map, collapse and finalize stages plus the run orchestrator.
pub mod pipeline;
/// Summarizer capability and its adapters.
pub mod summarization;
