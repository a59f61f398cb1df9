//! The explicit action kind → handler map.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ActionError;
use crate::handler::ActionHandler;

/// Registry of action handlers keyed by kind.
///
/// Built once before a run; a lookup miss is a fatal error, never a
/// retried one. `validate_kinds` lets the engine reject a route set
/// referencing unregistered kinds before any account starts.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("kinds", &self.kinds().collect::<Vec<_>>())
            .finish()
    }
}

impl ActionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own kind. Replaces any previous
    /// handler for that kind.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(handler.kind().to_owned(), handler);
    }

    /// Look up the handler for a kind.
    pub fn get(&self, kind: &str) -> Result<Arc<dyn ActionHandler>, ActionError> {
        self.handlers
            .get(kind)
            .cloned()
            .ok_or_else(|| ActionError::UnknownKind(kind.to_owned()))
    }

    /// Registered kinds.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Check that every kind in `kinds` has a handler.
    pub fn validate_kinds<'a>(
        &self,
        kinds: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ActionError> {
        for kind in kinds {
            if !self.handlers.contains_key(kind) {
                return Err(ActionError::UnknownKind(kind.to_owned()));
            }
        }
        Ok(())
    }
}
