#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Caravan Action
//!
//! The contract between the route engine and the domain operations it
//! drives:
//!
//! - [`ActionHandler`] — one action kind's implementation
//! - [`ActionContext`] — the per-account execution context handed to
//!   every handler invocation
//! - [`ActionOutcome`] — success (optionally with data) or soft failure
//! - [`ActionError`] — the classified error surface
//! - [`ActionRegistry`] — the explicit kind → handler map, validated
//!   before a run starts
//!
//! The engine treats handlers as black boxes: an outcome of
//! [`ActionOutcome::Failed`] is a soft failure, an `Err` is classified by
//! the retry policy via [`ActionError::failure_kind`].

pub mod builtin;
pub mod context;
pub mod error;
pub mod handler;
pub mod outcome;
pub mod registry;

pub use context::{AccountProfile, ActionContext};
pub use error::ActionError;
pub use handler::ActionHandler;
pub use outcome::ActionOutcome;
pub use registry::ActionRegistry;
