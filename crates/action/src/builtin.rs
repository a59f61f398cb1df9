//! Built-in handlers.
//!
//! Domain operations (swaps, bridges, transfers) live with their own
//! integrations outside this workspace; the handlers here are the
//! generic ones every deployment wants.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::context::ActionContext;
use crate::error::ActionError;
use crate::handler::ActionHandler;
use crate::outcome::ActionOutcome;

/// Parameters for [`SleepAction`], read from the `sleep` section of the
/// route's parameter blob.
#[derive(Debug, Clone, Copy, Deserialize)]
struct SleepParams {
    #[serde(default = "default_min")]
    min_secs: f64,
    #[serde(default = "default_max")]
    max_secs: f64,
}

fn default_min() -> f64 {
    1.0
}

fn default_max() -> f64 {
    3.0
}

impl Default for SleepParams {
    fn default() -> Self {
        Self {
            min_secs: default_min(),
            max_secs: default_max(),
        }
    }
}

/// Sleeps a random duration within a configured range.
///
/// Used as a cooldown slot inside routes and as the demo action for dry
/// runs. Cancellation interrupts the sleep immediately.
#[derive(Debug, Default)]
pub struct SleepAction;

#[async_trait]
impl ActionHandler for SleepAction {
    fn kind(&self) -> &str {
        "sleep"
    }

    async fn execute(
        &self,
        params: &serde_json::Value,
        ctx: &ActionContext,
    ) -> Result<ActionOutcome, ActionError> {
        let params: SleepParams = params
            .get("sleep")
            .map(|section| serde_json::from_value(section.clone()))
            .transpose()
            .map_err(|e| ActionError::invariant(format!("bad sleep params: {e}")))?
            .unwrap_or_default();

        if params.min_secs < 0.0 || params.max_secs < params.min_secs {
            return Err(ActionError::invariant(format!(
                "bad sleep range: min {} max {}",
                params.min_secs, params.max_secs
            )));
        }

        let span = params.max_secs - params.min_secs;
        let secs = params.min_secs + span * fastrand::f64();
        info!(account = %ctx.account.name, secs, "sleeping");

        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs_f64(secs)) => Ok(ActionOutcome::Done),
            () = ctx.cancellation.cancelled() => Err(ActionError::Cancelled),
        }
    }
}
