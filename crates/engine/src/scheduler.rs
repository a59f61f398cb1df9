//! The flow scheduler.
//!
//! Flows execute strictly sequentially; accounts within a flow execute
//! concurrently after cumulative randomized stagger offsets. Every task
//! of a flow is joined before the next flow starts, with a random
//! cooldown in between. Cancellation stops new launches, cancels
//! outstanding tasks and awaits them before returning.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use caravan_action::{AccountProfile, ActionContext};
use caravan_resource::EndpointDirectory;
use caravan_route::{Account, Route, RouteStatus};
use caravan_storage::RouteStore;

use crate::error::EngineError;
use crate::ledger::CompletionLedger;
use crate::report::{AccountReport, ProgressReporter, RunSummary};
use crate::runner::RouteRunner;
use crate::settings::EngineSettings;

/// Deterministic contiguous chunking: groups of at most `group_size`,
/// covering every item exactly once, preserving relative order.
#[must_use]
pub fn partition<T>(items: Vec<T>, group_size: usize) -> Vec<Vec<T>> {
    let group_size = group_size.max(1);
    let mut flows = Vec::with_capacity(items.len().div_ceil(group_size));
    let mut current = Vec::with_capacity(group_size);
    for item in items {
        current.push(item);
        if current.len() == group_size {
            flows.push(std::mem::replace(&mut current, Vec::with_capacity(group_size)));
        }
    }
    if !current.is_empty() {
        flows.push(current);
    }
    flows
}

/// Runs the whole account set, flow by flow.
pub struct FlowScheduler {
    store: Arc<dyn RouteStore>,
    runner: Arc<RouteRunner>,
    reporter: Arc<dyn ProgressReporter>,
    endpoints: Arc<EndpointDirectory>,
    ledger: Arc<CompletionLedger>,
    settings: EngineSettings,
    cancel: CancellationToken,
}

impl std::fmt::Debug for FlowScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowScheduler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl FlowScheduler {
    /// Create a scheduler.
    #[must_use]
    pub fn new(
        store: Arc<dyn RouteStore>,
        runner: Arc<RouteRunner>,
        reporter: Arc<dyn ProgressReporter>,
        endpoints: Arc<EndpointDirectory>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            runner,
            reporter,
            endpoints,
            ledger: Arc::new(CompletionLedger::new()),
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// The token callers wire to an external shutdown signal.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The completion ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<CompletionLedger> {
        &self.ledger
    }

    /// Load eligible accounts, build flows, run them all, and report the
    /// final completion count.
    ///
    /// Normal runs pick up routes in `Pending`/`InProgress`; rerun-failed
    /// runs pick up routes containing failed actions and execute exactly
    /// that failed subset.
    pub async fn launch(&self, rerun_failed: bool) -> Result<RunSummary, EngineError> {
        let routes = if rerun_failed {
            self.store.routes_with_failed_actions().await?
        } else {
            self.store
                .routes_by_status(&[RouteStatus::Pending, RouteStatus::InProgress])
                .await?
        };

        let mut pairs = Vec::with_capacity(routes.len());
        for route in routes {
            let account = self.store.account(route.account_id).await?;
            pairs.push((account, route));
        }
        if self.settings.shuffle_accounts {
            fastrand::shuffle(&mut pairs);
        }

        let total = pairs.len();
        info!(total, rerun_failed, "loaded accounts with eligible routes");

        let flows = partition(pairs, self.settings.accounts_per_flow);
        let flow_count = flows.len();
        info!(
            flows = flow_count,
            per_flow = self.settings.accounts_per_flow,
            "created flows"
        );

        for (flow_index, flow) in flows.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("run cancelled, not starting further flows");
                break;
            }

            self.run_flow(flow, flow_index, total, rerun_failed).await?;

            let more_flows_remain = flow_index + 1 < flow_count;
            if more_flows_remain && !self.cancel.is_cancelled() {
                let delay = self.settings.flow_delay.sample();
                info!(
                    secs = delay.as_secs_f64(),
                    "all accounts in flow finished, cooling down before next flow"
                );
                tokio::select! {
                    () = sleep(delay) => {}
                    () = self.cancel.cancelled() => {}
                }
            }
        }

        let summary = RunSummary {
            total_accounts: total,
            completed_accounts: self.ledger.total(),
        };
        self.reporter.run_done(&summary).await;
        Ok(summary)
    }

    /// Launch every account of one flow and join them all.
    ///
    /// A failing account never aborts its siblings; only an error for
    /// which [`EngineError::aborts_flow`] holds cancels the flow and
    /// propagates, after every outstanding task has been awaited.
    async fn run_flow(
        &self,
        flow: Vec<(Account, Route)>,
        flow_index: usize,
        total_accounts: usize,
        rerun_failed: bool,
    ) -> Result<(), EngineError> {
        let mut join_set = JoinSet::new();
        let mut start_offset = Duration::ZERO;

        for (position, (account, route)) in flow.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            if !start_offset.is_zero() {
                info!(
                    account = %account.name,
                    secs = start_offset.as_secs_f64(),
                    "account sleeping before start"
                );
            }

            let task = AccountTask {
                runner: Arc::clone(&self.runner),
                reporter: Arc::clone(&self.reporter),
                endpoints: Arc::clone(&self.endpoints),
                ledger: Arc::clone(&self.ledger),
                cancel: self.cancel.clone(),
                account,
                route,
                start_delay: start_offset,
                rerun_failed,
                total_accounts,
            };
            let span = info_span!(
                "account",
                name = %task.account.name,
                flow = flow_index,
                slot = position,
            );
            join_set.spawn(task.run().instrument(span));

            start_offset += self.settings.account_delay.sample();
        }

        let mut abort: Option<EngineError> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(error = %err, "account task aborted the flow");
                    self.cancel.cancel();
                    if abort.is_none() {
                        abort = Some(err);
                    }
                }
                Err(join_err) => {
                    error!(?join_err, "account task panicked");
                    self.cancel.cancel();
                    if abort.is_none() {
                        abort = Some(EngineError::invariant(format!(
                            "account task panicked: {join_err}"
                        )));
                    }
                }
            }
        }

        match abort {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// One account's task inside a flow.
struct AccountTask {
    runner: Arc<RouteRunner>,
    reporter: Arc<dyn ProgressReporter>,
    endpoints: Arc<EndpointDirectory>,
    ledger: Arc<CompletionLedger>,
    cancel: CancellationToken,
    account: Account,
    route: Route,
    start_delay: Duration,
    rerun_failed: bool,
    total_accounts: usize,
}

impl AccountTask {
    /// Sleep the stagger offset, run the route, finalize accounting.
    ///
    /// Only flow-aborting errors escape; everything else ends as a failed
    /// route plus a best-effort report.
    async fn run(self) -> Result<(), EngineError> {
        tokio::select! {
            () = sleep(self.start_delay) => {}
            () = self.cancel.cancelled() => return Ok(()),
        }

        let profile = AccountProfile {
            id: self.account.id,
            name: self.account.name.clone(),
            address: self.account.address.clone(),
            private_key: self.account.private_key.clone(),
        };
        let mut ctx = ActionContext::new(profile, Arc::clone(&self.endpoints))
            .with_cancellation(self.cancel.child_token());
        if let Some(proxy) = &self.account.proxy {
            ctx = ctx.with_proxy(proxy.clone());
        }

        let report = self
            .runner
            .run(&self.account, self.route, &ctx, self.rerun_failed)
            .await;

        if report.cancelled {
            // No terminal state was reached; nothing to account for.
            return Ok(());
        }

        let completed = self
            .ledger
            .record_if_first_terminal(report.account_id, report.was_in_progress);
        info!(account = %self.account.name, completed, "completed accounts");
        self.reporter
            .account_done(&AccountReport::from_run(
                &report,
                completed,
                self.total_accounts,
            ))
            .await;

        match report.error {
            Some(err) if err.aborts_flow() => Err(err),
            Some(err) => {
                error!(account = %self.account.name, error = %err, "error processing account");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use caravan_action::{
        ActionError, ActionHandler, ActionOutcome, ActionRegistry,
    };
    use caravan_resilience::RetryPolicy;
    use caravan_route::RouteAction;
    use caravan_storage::MemoryStore;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use crate::dispatch::ActionDispatcher;
    use crate::settings::DelayRange;

    #[test]
    fn partition_covers_everything_in_order() {
        let flows = partition((0..7).collect(), 3);
        assert_eq!(flows, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
    }

    #[test]
    fn partition_handles_exact_multiples_and_empty() {
        assert_eq!(partition::<u8>(vec![], 3), Vec::<Vec<u8>>::new());
        let flows = partition((0..6).collect(), 3);
        assert_eq!(flows.len(), 2);
        assert!(flows.iter().all(|f| f.len() == 3));
    }

    #[test]
    fn partition_group_size_floor_is_one() {
        let flows = partition(vec![1, 2], 0);
        assert_eq!(flows, vec![vec![1], vec![2]]);
    }

    /// Records flow-membership events so tests can assert the barrier.
    #[derive(Default)]
    struct EventLog {
        events: Mutex<Vec<(String, &'static str)>>,
    }

    struct LoggingHandler {
        log: Arc<EventLog>,
        fail_accounts: HashSet<String>,
    }

    #[async_trait]
    impl ActionHandler for LoggingHandler {
        fn kind(&self) -> &str {
            "probe"
        }

        async fn execute(
            &self,
            _params: &serde_json::Value,
            ctx: &ActionContext,
        ) -> Result<ActionOutcome, ActionError> {
            self.log
                .events
                .lock()
                .push((ctx.account.name.clone(), "run"));
            tokio::task::yield_now().await;
            if self.fail_accounts.contains(&ctx.account.name) {
                Ok(ActionOutcome::Failed)
            } else {
                Ok(ActionOutcome::Done)
            }
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        scheduler: FlowScheduler,
        log: Arc<EventLog>,
    }

    async fn fixture(
        account_names: &[&str],
        per_flow: usize,
        fail_accounts: &[&str],
    ) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let log = Arc::new(EventLog::default());

        for name in account_names {
            let account = Account::new(*name, format!("0x{name}"));
            let mut route = Route::new(account.id);
            route.actions.push(RouteAction::new(
                route.id,
                "probe",
                "Probe",
                0,
                Arc::new(serde_json::json!({})),
            ));
            store.add_account(account).await.unwrap();
            store.insert_route(route).await.unwrap();
        }

        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(LoggingHandler {
            log: Arc::clone(&log),
            fail_accounts: fail_accounts.iter().map(|s| (*s).to_owned()).collect(),
        }));

        let endpoints = Arc::new(EndpointDirectory::default());
        let dispatcher = Arc::new(ActionDispatcher::new(
            registry,
            RetryPolicy::new(1, Duration::ZERO),
            Arc::clone(&endpoints),
        ));
        let runner = Arc::new(RouteRunner::new(
            Arc::clone(&store) as Arc<dyn RouteStore>,
            dispatcher,
            DelayRange::zero(),
            false,
        ));

        let settings = EngineSettings {
            accounts_per_flow: per_flow,
            shuffle_accounts: false,
            strict_route_status: false,
            account_delay: DelayRange::zero(),
            action_delay: DelayRange::zero(),
            flow_delay: DelayRange::zero(),
            retry: RetryPolicy::new(1, Duration::ZERO),
        };

        let scheduler = FlowScheduler::new(
            Arc::clone(&store) as Arc<dyn RouteStore>,
            runner,
            Arc::new(crate::report::LogReporter),
            endpoints,
            settings,
        );

        Fixture {
            store,
            scheduler,
            log,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn seven_accounts_three_per_flow() {
        let names = ["a1", "a2", "a3", "b1", "b2", "b3", "c1"];
        let f = fixture(&names, 3, &[]).await;

        let summary = f.scheduler.launch(false).await.unwrap();
        assert_eq!(summary.total_accounts, 7);
        assert_eq!(summary.completed_accounts, 7);

        // Flow barrier: every account of flow 1 ran before any of flow 2,
        // and so on (accounts are ordered by id, so recover flows from
        // the recorded event order).
        let events = f.log.events.lock();
        assert_eq!(events.len(), 7);
        let first_flow: HashSet<&str> =
            events[..3].iter().map(|(n, _)| n.as_str()).collect();
        let second_flow: HashSet<&str> =
            events[3..6].iter().map(|(n, _)| n.as_str()).collect();
        assert!(first_flow.is_disjoint(&second_flow));

        // No route is left pending or in progress.
        assert_eq!(
            f.store
                .count_by_status(&[RouteStatus::Pending, RouteStatus::InProgress])
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failing_account_does_not_abort_siblings() {
        let f = fixture(&["a1", "a2", "a3"], 3, &["a2"]).await;

        let summary = f.scheduler.launch(false).await.unwrap();
        assert_eq!(summary.completed_accounts, 3);

        assert_eq!(
            f.store
                .count_by_status(&[RouteStatus::Completed])
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            f.store.count_by_status(&[RouteStatus::Failed]).await.unwrap(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn completed_routes_are_not_reloaded() {
        let f = fixture(&["a1"], 3, &[]).await;
        f.scheduler.launch(false).await.unwrap();

        // A second launch finds nothing eligible.
        let summary = f.scheduler.launch(false).await.unwrap();
        assert_eq!(summary.total_accounts, 0);
        // The ledger still remembers the first run's completions.
        assert_eq!(summary.completed_accounts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_before_launch_runs_nothing() {
        let f = fixture(&["a1", "a2"], 1, &[]).await;
        f.scheduler.cancellation().cancel();

        let summary = f.scheduler.launch(false).await.unwrap();
        assert_eq!(summary.completed_accounts, 0);
        assert!(f.log.events.lock().is_empty());

        // Routes keep their last written status and stay resumable.
        assert_eq!(
            f.store
                .count_by_status(&[RouteStatus::Pending])
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rerun_failed_only_picks_up_failed_routes() {
        let f = fixture(&["a1", "a2"], 2, &["a1"]).await;
        f.scheduler.launch(false).await.unwrap();

        // a1 failed (soft failure, single-attempt policy). Rerun-failed
        // mode reloads only a1's route.
        let failed = f.store.routes_with_failed_actions().await.unwrap();
        assert_eq!(failed.len(), 1);

        let summary = f.scheduler.launch(true).await.unwrap();
        assert_eq!(summary.total_accounts, 1);
    }

    struct InvariantHandler;

    #[async_trait]
    impl ActionHandler for InvariantHandler {
        fn kind(&self) -> &str {
            "probe"
        }

        async fn execute(
            &self,
            _params: &serde_json::Value,
            _ctx: &ActionContext,
        ) -> Result<ActionOutcome, ActionError> {
            Err(ActionError::invariant("determinism violated"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn invariant_error_aborts_the_run() {
        let store = Arc::new(MemoryStore::new());
        let account = Account::new("a1", "0xa1");
        let mut route = Route::new(account.id);
        route.actions.push(RouteAction::new(
            route.id,
            "probe",
            "Probe",
            0,
            Arc::new(serde_json::json!({})),
        ));
        store.add_account(account).await.unwrap();
        store.insert_route(route).await.unwrap();

        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(InvariantHandler));
        let endpoints = Arc::new(EndpointDirectory::default());
        let dispatcher = Arc::new(ActionDispatcher::new(
            registry,
            RetryPolicy::new(1, Duration::ZERO),
            Arc::clone(&endpoints),
        ));
        let runner = Arc::new(RouteRunner::new(
            Arc::clone(&store) as Arc<dyn RouteStore>,
            dispatcher,
            DelayRange::zero(),
            false,
        ));
        let settings = EngineSettings {
            accounts_per_flow: 1,
            account_delay: DelayRange::zero(),
            action_delay: DelayRange::zero(),
            flow_delay: DelayRange::zero(),
            ..EngineSettings::default()
        };

        let scheduler = FlowScheduler::new(
            Arc::clone(&store) as Arc<dyn RouteStore>,
            runner,
            Arc::new(crate::report::LogReporter),
            endpoints,
            settings,
        );

        let err = scheduler.launch(false).await.unwrap_err();
        assert!(err.aborts_flow());

        // The route still settled as failed before the abort surfaced.
        assert_eq!(
            store.count_by_status(&[RouteStatus::Failed]).await.unwrap(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn accountant_counts_each_account_once() {
        let f = fixture(&["a1", "a2", "a3", "a4"], 2, &[]).await;
        let summary = f.scheduler.launch(false).await.unwrap();
        assert_eq!(summary.completed_accounts, 4);
        assert_eq!(f.scheduler.ledger().total(), 4);
    }
}
