#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Caravan Resilience
//!
//! The retry-with-classification policy used around every upstream
//! operation in the caravan route engine.
//!
//! - [`FailureKind`] and [`DomainFault`] — the failure taxonomy
//! - [`RetryPolicy`] — bounded retry with per-classification handling
//! - [`FailureSink`] — the seam through which retries report failures to
//!   whatever tracks the active endpoint (rotation lives in
//!   `caravan-resource`; this crate only talks to the trait)
//! - [`RetryContext`] — per-attempt context handed to the wrapped
//!   operation so it can adjust parameters after a recoverable fault

pub mod classify;
pub mod retry;

pub use classify::{DomainFault, FailureKind};
pub use retry::{FailureSink, NoopSink, RetryContext, RetryError, RetryPolicy};
