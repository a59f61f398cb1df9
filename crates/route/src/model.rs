//! Persisted records: accounts, routes and route actions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use caravan_core::{AccountId, ActionId, RouteId};

use crate::error::RouteError;
use crate::status::RouteStatus;
use crate::transition::validate_transition;

/// An account driven along a route.
///
/// Immutable once loaded for a run — the engine holds a read handle and
/// never mutates account rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier.
    pub id: AccountId,
    /// Human-readable account label.
    pub name: String,
    /// On-chain address the account operates as.
    pub address: String,
    /// Signing secret. Absent for watch-only accounts.
    #[serde(default)]
    pub private_key: Option<String>,
    /// Egress proxy assigned to this account, `host:port` or full URL.
    #[serde(default)]
    pub proxy: Option<String>,
    /// User agent presented by this account's HTTP traffic.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// When the account row was created.
    pub created_at: DateTime<Utc>,
    /// When the account row was last updated.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Create a new account record with a fresh identifier.
    #[must_use]
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: AccountId::v4(),
            name: name.into(),
            address: address.into(),
            private_key: None,
            proxy: None,
            user_agent: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Attach a signing secret.
    #[must_use]
    pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    /// Attach an egress proxy.
    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }
}

/// One discrete unit of work within a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteAction {
    /// Unique identifier.
    pub id: ActionId,
    /// The route this action belongs to.
    pub route_id: RouteId,
    /// Machine-readable action kind, resolved against the action registry.
    pub kind: String,
    /// Human-readable action name for logs and reports.
    pub name: String,
    /// Current status.
    pub status: RouteStatus,
    /// Position within the route. Assigned once at creation; execution
    /// never reorders.
    pub order_index: u32,
    /// Shared parameter blob for the whole preset run.
    pub params: Arc<serde_json::Value>,
    /// When the action row was created.
    pub created_at: DateTime<Utc>,
    /// When the action entered `InProgress`.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the action reached a terminal status.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// When the action row was last updated.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RouteAction {
    /// Create a new pending action.
    #[must_use]
    pub fn new(
        route_id: RouteId,
        kind: impl Into<String>,
        name: impl Into<String>,
        order_index: u32,
        params: Arc<serde_json::Value>,
    ) -> Self {
        Self {
            id: ActionId::v4(),
            route_id,
            kind: kind.into(),
            name: name.into(),
            status: RouteStatus::Pending,
            order_index,
            params,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            updated_at: None,
        }
    }

    /// Whether a run should skip this action instead of executing it.
    ///
    /// Normal runs execute only `Pending`/`InProgress` leftovers; rerun-failed
    /// runs additionally re-enter `Failed` actions while still skipping
    /// `Completed` ones.
    #[must_use]
    pub fn is_skipped(&self, rerun_failed: bool) -> bool {
        if rerun_failed {
            self.status == RouteStatus::Completed
        } else {
            self.status.is_terminal()
        }
    }

    /// Transition to a new status, validating the transition and stamping
    /// the lifecycle timestamps.
    pub fn transition_to(&mut self, new_status: RouteStatus) -> Result<(), RouteError> {
        validate_transition(self.status, new_status)?;
        self.status = new_status;
        let now = Utc::now();
        self.updated_at = Some(now);

        if new_status == RouteStatus::InProgress && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if new_status.is_terminal() {
            self.completed_at = Some(now);
        }

        Ok(())
    }
}

/// The full ordered action plan for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    /// Unique identifier.
    pub id: RouteId,
    /// The account this route belongs to (one-to-one).
    pub account_id: AccountId,
    /// Current status.
    pub status: RouteStatus,
    /// Actions in execution order.
    pub actions: Vec<RouteAction>,
    /// When the route row was created.
    pub created_at: DateTime<Utc>,
    /// When the route entered `InProgress` for the first time.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the route reached a terminal status.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// When the route row was last updated.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Route {
    /// Create a new pending route with no actions.
    #[must_use]
    pub fn new(account_id: AccountId) -> Self {
        Self {
            id: RouteId::v4(),
            account_id,
            status: RouteStatus::Pending,
            actions: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            updated_at: None,
        }
    }

    /// Sort the action list by order index.
    pub fn sort_actions(&mut self) {
        self.actions.sort_by_key(|a| a.order_index);
    }

    /// The next action a run with the given mode would execute, if any.
    #[must_use]
    pub fn next_eligible(&self, rerun_failed: bool) -> Option<&RouteAction> {
        self.actions.iter().find(|a| !a.is_skipped(rerun_failed))
    }

    /// Count of actions a run with the given mode would still execute.
    #[must_use]
    pub fn remaining(&self, rerun_failed: bool) -> usize {
        self.actions
            .iter()
            .filter(|a| !a.is_skipped(rerun_failed))
            .count()
    }

    /// Returns `true` if any action in the full list is `Failed`.
    #[must_use]
    pub fn has_failed_actions(&self) -> bool {
        self.actions.iter().any(|a| a.status == RouteStatus::Failed)
    }

    /// Transition to a new status, validating the transition and stamping
    /// the lifecycle timestamps.
    pub fn transition_to(&mut self, new_status: RouteStatus) -> Result<(), RouteError> {
        validate_transition(self.status, new_status)?;
        self.status = new_status;
        let now = Utc::now();
        self.updated_at = Some(now);

        if new_status == RouteStatus::InProgress && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if new_status.is_terminal() {
            self.completed_at = Some(now);
        }

        Ok(())
    }
}
