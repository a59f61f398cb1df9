//! Progress reporting.
//!
//! The engine emits one report per account reaching a terminal state and
//! one summary after the last flow. Delivery is behind the
//! [`ProgressReporter`] seam: the tracing implementation is always on,
//! the Telegram one is wired in by deployments that want pings.

use async_trait::async_trait;
use tracing::{error, info};

use caravan_route::RouteStatus;

use crate::runner::AccountRunReport;

/// Per-action-name success/fail tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionTally {
    /// Successful invocations.
    pub success: u32,
    /// Failed invocations.
    pub fail: u32,
}

/// One account's completion report.
#[derive(Debug, Clone)]
pub struct AccountReport {
    /// Account display name.
    pub account_name: String,
    /// Account address.
    pub address: String,
    /// Terminal route status, if one was reached this run.
    pub status: Option<RouteStatus>,
    /// Per-action-name tallies in execution order.
    pub tallies: Vec<(String, ActionTally)>,
    /// Global completion count after this account.
    pub completed_accounts: u64,
    /// Accounts in this run.
    pub total_accounts: usize,
}

impl AccountReport {
    /// Build a report from a finished run, grouping repeated action names.
    #[must_use]
    pub fn from_run(run: &AccountRunReport, completed_accounts: u64, total_accounts: usize) -> Self {
        let mut tallies: Vec<(String, ActionTally)> = Vec::new();
        for (name, succeeded) in &run.results {
            let idx = match tallies.iter().position(|(n, _)| n == name) {
                Some(i) => i,
                None => {
                    tallies.push((name.clone(), ActionTally::default()));
                    tallies.len() - 1
                }
            };
            let tally = &mut tallies[idx].1;
            if *succeeded {
                tally.success += 1;
            } else {
                tally.fail += 1;
            }
        }
        Self {
            account_name: run.account_name.clone(),
            address: run.address.clone(),
            status: run.final_status,
            tallies,
            completed_accounts,
            total_accounts,
        }
    }

    /// Total successful actions.
    #[must_use]
    pub fn succeeded(&self) -> u32 {
        self.tallies.iter().map(|(_, t)| t.success).sum()
    }

    /// Total failed actions.
    #[must_use]
    pub fn failed(&self) -> u32 {
        self.tallies.iter().map(|(_, t)| t.fail).sum()
    }
}

/// End-of-run summary.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    /// Accounts loaded for the run.
    pub total_accounts: usize,
    /// Accounts that reached a terminal state.
    pub completed_accounts: u64,
}

/// Where progress reports go.
///
/// Implementations must never fail the run: delivery problems are theirs
/// to log and swallow.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// One account reached a terminal state.
    async fn account_done(&self, report: &AccountReport);

    /// All flows finished (some accounts may have ended `Failed`).
    async fn run_done(&self, summary: &RunSummary);
}

/// Reports through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

#[async_trait]
impl ProgressReporter for LogReporter {
    async fn account_done(&self, report: &AccountReport) {
        info!(
            account = %report.account_name,
            status = ?report.status,
            succeeded = report.succeeded(),
            failed = report.failed(),
            completed = report.completed_accounts,
            total = report.total_accounts,
            "account finished"
        );
    }

    async fn run_done(&self, summary: &RunSummary) {
        info!(
            completed = summary.completed_accounts,
            total = summary.total_accounts,
            "all flows finished"
        );
    }
}

/// Reports through the Telegram Bot API.
pub struct TelegramReporter {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl std::fmt::Debug for TelegramReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramReporter")
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

impl TelegramReporter {
    /// Create a reporter for the given bot and chat.
    #[must_use]
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    fn render_account(report: &AccountReport) -> String {
        let mut text = format!(
            "{} ({})\nstatus: {}\n",
            report.account_name,
            report.address,
            report
                .status
                .map_or_else(|| "interrupted".to_owned(), |s| s.to_string()),
        );
        for (name, tally) in &report.tallies {
            text.push_str(&format!(
                "  {name}: {} ok / {} failed\n",
                tally.success, tally.fail
            ));
        }
        text.push_str(&format!(
            "done {} of {}",
            report.completed_accounts, report.total_accounts
        ));
        text
    }

    async fn send(&self, text: String) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });
        match self.client.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!("sent telegram notification");
            }
            Ok(response) => {
                error!(status = %response.status(), "telegram rejected notification");
            }
            Err(err) => {
                error!(error = %err, "failed to send telegram notification");
            }
        }
    }
}

#[async_trait]
impl ProgressReporter for TelegramReporter {
    async fn account_done(&self, report: &AccountReport) {
        self.send(Self::render_account(report)).await;
    }

    async fn run_done(&self, summary: &RunSummary) {
        self.send(format!(
            "run finished: {} of {} accounts completed",
            summary.completed_accounts, summary.total_accounts
        ))
        .await;
    }
}
