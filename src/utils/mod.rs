//! Utility functions and helpers for the generation guard.
//!
//! This module provides cross-cutting concerns like structured logging,
//! identity redaction, controllable time and retry logic with backoff.
//!
//! # Submodules
//!
//! - `backoff`: Jittered exponential delay computation.
//! - `clock`: Wall-clock abstraction with a manual clock for tests.
//! - `logging`: Tracing initialization and log redaction.
//! - `retry`: Retry executor with per-attempt timeouts.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod backoff;
pub mod clock;
pub mod logging;
pub mod retry;
