//! Utility functions and helpers for filechat.
//!
//! This module provides cross-cutting concerns like structured logging,
//! credential sanitization, and the backoff gate used by the metric batcher.
//!
//! # Submodules
//!
//! - `logging`: Tracing and logging initialization with security filters.
//! - `retry`: Capped exponential backoff for failing remote calls.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod logging;
pub mod retry;
