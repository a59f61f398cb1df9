//! The per-account route state machine.
//!
//! One [`advance`](RouteRunner::advance) call executes exactly one
//! eligible action; [`run`](RouteRunner::run) — what the flow scheduler
//! launches — drives `advance` until the remaining action list drains,
//! then derives and writes the route's terminal status exactly once.
//! Every status transition is written back through the store as it
//! happens, so an interrupted run resumes from its last committed state.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use caravan_action::{ActionContext, ActionError};
use caravan_core::{AccountId, ActionId};
use caravan_route::{Account, Route, RouteStatus};
use caravan_storage::RouteStore;

use crate::dispatch::ActionDispatcher;
use crate::error::EngineError;
use crate::settings::DelayRange;

/// Result of a single state-machine step.
#[derive(Debug)]
pub enum StepOutcome {
    /// One action was executed.
    Processed(StepResult),
    /// Every remaining action was skipped; nothing left to execute.
    Drained,
    /// Cancellation surfaced mid-action. The action keeps its last
    /// committed status (possibly `InProgress`) and resumes next run.
    Cancelled,
}

/// Details of one executed action.
#[derive(Debug)]
pub struct StepResult {
    /// The executed action.
    pub action_id: ActionId,
    /// Its display name.
    pub name: String,
    /// Whether it completed successfully.
    pub succeeded: bool,
    /// The action raised a non-fatal error; the rest of the route is
    /// abandoned for this run.
    pub abort_route: bool,
    /// Eligible actions left after this step.
    pub remaining: usize,
}

/// What one account's run produced.
#[derive(Debug)]
pub struct AccountRunReport {
    /// The account.
    pub account_id: AccountId,
    /// Its display name.
    pub account_name: String,
    /// Its address.
    pub address: String,
    /// The route was marked `InProgress` before any terminal write —
    /// the completion ledger's double-count guard.
    pub was_in_progress: bool,
    /// The run was cancelled before reaching a terminal state.
    pub cancelled: bool,
    /// Terminal status written this run, if one was reached.
    pub final_status: Option<RouteStatus>,
    /// Executed actions in order: display name and success.
    pub results: Vec<(String, bool)>,
    /// The error that ended the run early, if any. Whether it aborts the
    /// owning flow is [`EngineError::aborts_flow`]'s call.
    pub error: Option<EngineError>,
}

impl AccountRunReport {
    fn new(account: &Account) -> Self {
        Self {
            account_id: account.id,
            account_name: account.name.clone(),
            address: account.address.clone(),
            was_in_progress: false,
            cancelled: false,
            final_status: None,
            results: Vec::new(),
            error: None,
        }
    }

    /// Count of successfully executed actions.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|(_, ok)| *ok).count()
    }

    /// Count of failed actions.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// Advances one account's route action-by-action.
pub struct RouteRunner {
    store: Arc<dyn RouteStore>,
    dispatcher: Arc<ActionDispatcher>,
    action_delay: DelayRange,
    strict_route_status: bool,
}

impl std::fmt::Debug for RouteRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteRunner")
            .field("action_delay", &self.action_delay)
            .field("strict_route_status", &self.strict_route_status)
            .finish_non_exhaustive()
    }
}

impl RouteRunner {
    /// Create a runner.
    #[must_use]
    pub fn new(
        store: Arc<dyn RouteStore>,
        dispatcher: Arc<ActionDispatcher>,
        action_delay: DelayRange,
        strict_route_status: bool,
    ) -> Self {
        Self {
            store,
            dispatcher,
            action_delay,
            strict_route_status,
        }
    }

    /// Mark the route `InProgress`, stamping `started_at` the first time
    /// only. Resumed routes re-enter silently; a `Completed` route being
    /// rerun for its failed actions is reopened outside the single-run
    /// transition table.
    pub async fn start(&self, route: &mut Route, rerun_failed: bool) -> Result<(), EngineError> {
        let newly_started = route.started_at.is_none();

        if rerun_failed && route.status == RouteStatus::Completed {
            route.status = RouteStatus::InProgress;
            route.updated_at = Some(chrono::Utc::now());
        } else {
            route.transition_to(RouteStatus::InProgress)?;
        }
        self.store
            .set_route_status(route.id, RouteStatus::InProgress)
            .await?;

        if newly_started
            && let Some(at) = route.started_at
        {
            self.store.set_route_started(route.id, at).await?;
        }
        Ok(())
    }

    /// Execute the first eligible action of the route, if any.
    ///
    /// Exactly one action per call; the caller decides whether to keep
    /// stepping. Skipped actions (terminal for the mode) are passed over
    /// silently.
    pub async fn advance(
        &self,
        route: &mut Route,
        ctx: &ActionContext,
        rerun_failed: bool,
    ) -> Result<StepOutcome, EngineError> {
        let Some(pos) = route
            .actions
            .iter()
            .position(|a| !a.is_skipped(rerun_failed))
        else {
            return Ok(StepOutcome::Drained);
        };

        let skipped = route.actions[..pos]
            .iter()
            .filter(|a| a.is_skipped(rerun_failed))
            .count();
        if skipped > 0 {
            debug!(skipped, "skipped already-terminal actions");
        }

        {
            let action = &mut route.actions[pos];
            action.transition_to(RouteStatus::InProgress)?;
            self.store
                .set_action_status(action.id, RouteStatus::InProgress)
                .await?;
            if let Some(at) = action.started_at {
                self.store.set_action_started(action.id, at).await?;
            }
        }

        let snapshot = route.actions[pos].clone();
        info!(action = %snapshot.name, kind = %snapshot.kind, "executing action");

        match self.dispatcher.execute(&snapshot, ctx).await {
            Ok(outcome) => {
                let succeeded = outcome.succeeded();
                let status = if succeeded {
                    RouteStatus::Completed
                } else {
                    RouteStatus::Failed
                };
                self.settle_action(route, pos, status).await?;
                Ok(StepOutcome::Processed(StepResult {
                    action_id: snapshot.id,
                    name: snapshot.name,
                    succeeded,
                    abort_route: false,
                    remaining: route.remaining(rerun_failed),
                }))
            }

            Err(ActionError::Cancelled) => Ok(StepOutcome::Cancelled),

            Err(err) => {
                warn!(action = %snapshot.name, error = %err, "action raised, marking failed");
                self.settle_action(route, pos, RouteStatus::Failed).await?;
                if err.aborts_flow() {
                    return Err(err.into());
                }
                Ok(StepOutcome::Processed(StepResult {
                    action_id: snapshot.id,
                    name: snapshot.name,
                    succeeded: false,
                    abort_route: true,
                    remaining: route.remaining(rerun_failed),
                }))
            }
        }
    }

    async fn settle_action(
        &self,
        route: &mut Route,
        pos: usize,
        status: RouteStatus,
    ) -> Result<(), EngineError> {
        let action = &mut route.actions[pos];
        action.transition_to(status)?;
        self.store.set_action_status(action.id, status).await?;
        if let Some(at) = action.completed_at {
            self.store.set_action_completed(action.id, at).await?;
        }
        Ok(())
    }

    /// Derive and write the route's terminal status.
    async fn finalize(
        &self,
        route: &mut Route,
        any_failed: bool,
    ) -> Result<RouteStatus, EngineError> {
        let failed = any_failed || (self.strict_route_status && route.has_failed_actions());
        let status = if failed {
            RouteStatus::Failed
        } else {
            RouteStatus::Completed
        };
        route.transition_to(status)?;
        self.store.set_route_status(route.id, status).await?;
        if let Some(at) = route.completed_at {
            self.store.set_route_completed(route.id, at).await?;
        }
        Ok(status)
    }

    /// Process the account's entire remaining action list, then settle
    /// the route.
    ///
    /// Never returns an error: everything that goes wrong is folded into
    /// the report, and [`AccountRunReport::error`] tells the scheduler
    /// whether the flow must abort.
    pub async fn run(
        &self,
        account: &Account,
        mut route: Route,
        ctx: &ActionContext,
        rerun_failed: bool,
    ) -> AccountRunReport {
        let mut report = AccountRunReport::new(account);

        if let Err(err) = self.start(&mut route, rerun_failed).await {
            warn!(account = %account.name, error = %err, "could not start route");
            report.error = Some(err);
            return report;
        }
        report.was_in_progress = true;

        let mut any_failed = false;
        loop {
            if ctx.cancellation.is_cancelled() {
                report.cancelled = true;
                return report;
            }

            match self.advance(&mut route, ctx, rerun_failed).await {
                Ok(StepOutcome::Drained) => break,

                Ok(StepOutcome::Cancelled) => {
                    report.cancelled = true;
                    return report;
                }

                Ok(StepOutcome::Processed(step)) => {
                    report.results.push((step.name, step.succeeded));
                    any_failed |= !step.succeeded;
                    if step.abort_route {
                        break;
                    }
                    if step.remaining > 0 {
                        let delay = self.action_delay.sample();
                        info!(
                            account = %account.name,
                            secs = delay.as_secs_f64(),
                            "sleeping before next action"
                        );
                        tokio::select! {
                            () = sleep(delay) => {}
                            () = ctx.cancellation.cancelled() => {
                                report.cancelled = true;
                                return report;
                            }
                        }
                    }
                }

                Err(err) => {
                    any_failed = true;
                    if err.aborts_flow() {
                        // Best-effort terminal write, then surface the
                        // abort to the scheduler.
                        if let Ok(status) = self.finalize(&mut route, true).await {
                            report.final_status = Some(status);
                        }
                        report.error = Some(err);
                        return report;
                    }
                    warn!(account = %account.name, error = %err, "run aborted by infrastructure error");
                    report.error = Some(err);
                    break;
                }
            }
        }

        match self.finalize(&mut route, any_failed).await {
            Ok(status) => report.final_status = Some(status),
            Err(err) => {
                warn!(account = %account.name, error = %err, "could not settle route status");
                if report.error.is_none() {
                    report.error = Some(err);
                }
            }
        }
        report
    }
}
