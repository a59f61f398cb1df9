#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Caravan Route
//!
//! Persisted data model for the caravan route engine:
//!
//! - [`RouteStatus`] — the four-state lifecycle shared by routes and actions
//! - [`Account`], [`Route`], [`RouteAction`] — the three persisted records
//! - Status transitions validated by the [`transition`] module
//! - [`RoutePreset`] — creation-time route generation from a preset file

pub mod error;
pub mod model;
pub mod preset;
pub mod status;
pub mod transition;

pub use error::RouteError;
pub use model::{Account, Route, RouteAction};
pub use preset::{PresetAction, RepeatRange, RoutePreset};
pub use status::RouteStatus;
