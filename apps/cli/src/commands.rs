//! Subcommand implementations.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{info, warn};

use caravan_action::builtin::SleepAction;
use caravan_action::ActionRegistry;
use caravan_config::Settings;
use caravan_engine::{
    AccountReport, ActionDispatcher, FlowScheduler, LogReporter, ProgressReporter, RouteRunner,
    RunSummary, TelegramReporter,
};
use caravan_resource::{ProxyRotator, ProxyStore};
use caravan_route::{RoutePreset, RouteStatus};
use caravan_storage::{RouteStore, SqliteStore};

use crate::accounts::AccountsFile;

async fn open_store(settings: &Settings) -> anyhow::Result<Arc<SqliteStore>> {
    let store = SqliteStore::connect(&settings.database.path)
        .await
        .with_context(|| format!("opening database {}", settings.database.path.display()))?;
    Ok(Arc::new(store))
}

/// `caravan import`
pub async fn import(settings: &Settings, accounts_path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(accounts_path)
        .with_context(|| format!("reading {}", accounts_path.display()))?;
    let file = AccountsFile::from_toml_str(&raw).context("parsing accounts file")?;

    let store = open_store(settings).await?;
    let existing: HashSet<String> = store
        .accounts()
        .await?
        .into_iter()
        .map(|a| a.name)
        .collect();

    let mut imported = 0usize;
    let mut skipped = 0usize;
    for entry in file.accounts {
        if existing.contains(&entry.name) {
            warn!(account = %entry.name, "account already imported, skipping");
            skipped += 1;
            continue;
        }
        store.add_account(entry.into()).await?;
        imported += 1;
    }
    let proxies = file.spare_proxies.len();
    store.add_spare_proxies(file.spare_proxies).await?;

    info!(imported, skipped, proxies, "import finished");
    Ok(())
}

/// `caravan generate`
pub async fn generate(settings: &Settings, preset_path: &Path, fresh: bool) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(preset_path)
        .with_context(|| format!("reading {}", preset_path.display()))?;
    let preset = RoutePreset::from_toml_str(&raw).context("parsing preset")?;

    let store = open_store(settings).await?;
    if fresh {
        warn!("deleting all existing routes");
        store.delete_all_routes().await?;
    }

    let mut generated = 0usize;
    let mut skipped = 0usize;
    for account in store.accounts().await? {
        if store.route_for_account(account.id).await?.is_some() {
            warn!(account = %account.name, "account already has a route, skipping");
            skipped += 1;
            continue;
        }
        let route = preset.build_route(account.id);
        info!(account = %account.name, actions = route.actions.len(), "generated route");
        store.insert_route(route).await?;
        generated += 1;
    }

    info!(preset = %preset.name, generated, skipped, "route generation finished");
    Ok(())
}

/// Fans one report out to several reporters.
struct FanoutReporter(Vec<Arc<dyn ProgressReporter>>);

#[async_trait]
impl ProgressReporter for FanoutReporter {
    async fn account_done(&self, report: &AccountReport) {
        for reporter in &self.0 {
            reporter.account_done(report).await;
        }
    }

    async fn run_done(&self, summary: &RunSummary) {
        for reporter in &self.0 {
            reporter.run_done(summary).await;
        }
    }
}

fn build_reporter(settings: &Settings) -> Arc<dyn ProgressReporter> {
    let mut reporters: Vec<Arc<dyn ProgressReporter>> = vec![Arc::new(LogReporter)];
    if settings.telegram.enabled {
        reporters.push(Arc::new(TelegramReporter::new(
            settings.telegram.bot_token.clone(),
            settings.telegram.chat_id.clone(),
        )));
    }
    Arc::new(FanoutReporter(reporters))
}

fn build_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register(Arc::new(SleepAction));
    registry
}

/// `caravan run`
pub async fn run(settings: &Settings, rerun_failed: bool) -> anyhow::Result<()> {
    let store = open_store(settings).await?;
    let endpoints = Arc::new(settings.endpoint_directory()?);
    let registry = build_registry();

    // Reject routes referencing unregistered kinds before anything runs.
    let eligible = if rerun_failed {
        store.routes_with_failed_actions().await?
    } else {
        store
            .routes_by_status(&[RouteStatus::Pending, RouteStatus::InProgress])
            .await?
    };
    let kinds: HashSet<&str> = eligible
        .iter()
        .flat_map(|r| r.actions.iter().map(|a| a.kind.as_str()))
        .collect();
    registry
        .validate_kinds(kinds.iter().copied())
        .context("route references an unregistered action kind")?;

    let dispatcher = Arc::new(
        ActionDispatcher::new(
            registry,
            settings.engine.retry.clone(),
            Arc::clone(&endpoints),
        )
        .with_proxies(ProxyRotator::new(
            Arc::clone(&store) as Arc<dyn ProxyStore>
        )),
    );
    let runner = Arc::new(RouteRunner::new(
        Arc::clone(&store) as Arc<dyn RouteStore>,
        dispatcher,
        settings.engine.action_delay,
        settings.engine.strict_route_status,
    ));
    let scheduler = FlowScheduler::new(
        Arc::clone(&store) as Arc<dyn RouteStore>,
        runner,
        build_reporter(settings),
        endpoints,
        settings.engine.clone(),
    );

    // Ctrl-C stops launching, cancels outstanding tasks, and the
    // scheduler drains them before returning.
    let cancel = scheduler.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("shutdown signal received, cancelling run");
            cancel.cancel();
        }
    });

    let summary = scheduler.launch(rerun_failed).await?;
    info!(
        completed = summary.completed_accounts,
        total = summary.total_accounts,
        "run finished"
    );
    Ok(())
}

/// `caravan status`
pub async fn status(settings: &Settings, page: u32, per_page: u32) -> anyhow::Result<()> {
    let store = open_store(settings).await?;

    for status in [
        RouteStatus::Pending,
        RouteStatus::InProgress,
        RouteStatus::Completed,
        RouteStatus::Failed,
    ] {
        let count = store.count_by_status(&[status]).await?;
        println!("{:>12}: {count}", status.to_string());
    }

    let page = page.max(1);
    let per_page = per_page.max(1);
    let offset = (page - 1) * per_page;
    let routes = store
        .routes_by_status_paged(
            &[
                RouteStatus::Pending,
                RouteStatus::InProgress,
                RouteStatus::Completed,
                RouteStatus::Failed,
            ],
            per_page,
            offset,
        )
        .await?;

    println!("\npage {page} ({} routes):", routes.len());
    for route in routes {
        let account = store.account(route.account_id).await?;
        let done = route
            .actions
            .iter()
            .filter(|a| a.status == RouteStatus::Completed)
            .count();
        println!(
            "  {:<20} {:<12} {}/{} actions done",
            account.name,
            route.status.to_string(),
            done,
            route.actions.len()
        );
    }
    Ok(())
}
