//! Route model error types.

use thiserror::Error;

use crate::status::RouteStatus;

/// Errors from the route data model and preset generation.
#[derive(Debug, Error)]
pub enum RouteError {
    /// A status transition is not valid for the current status.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: RouteStatus,
        /// Attempted target status.
        to: RouteStatus,
    },

    /// A preset declared no actions.
    #[error("preset `{0}` declares no actions")]
    EmptyPreset(String),

    /// A repeat range has `min > max`.
    #[error("preset `{preset}`: repeat range for `{kind}` has min {min} > max {max}")]
    InvalidRepeatRange {
        /// Preset name.
        preset: String,
        /// Action kind the range applies to.
        kind: String,
        /// Lower bound.
        min: u32,
        /// Upper bound.
        max: u32,
    },

    /// A repeat range references an action kind the preset does not declare.
    #[error("preset `{preset}`: repeat range for unknown action kind `{kind}`")]
    UnknownRepeatKind {
        /// Preset name.
        preset: String,
        /// Unmatched action kind.
        kind: String,
    },

    /// The preset file could not be parsed.
    #[error("preset parse: {0}")]
    PresetParse(#[from] toml::de::Error),
}
