//! The store contract consumed by the engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use caravan_core::{AccountId, ActionId, RouteId};
use caravan_resource::ProxyStore;
use caravan_route::{Account, Route, RouteStatus};

use crate::error::StoreError;

/// Durable store of accounts, routes and actions.
///
/// Listings eager-load actions sorted by order index. Column updates are
/// per-object, touch `updated_at`, and commit independently — no
/// cross-object transaction spans multiple accounts. Implementations
/// must be safe under concurrent updates of different entities and
/// surface conflicts as [`StoreError::Backend`].
///
/// The [`ProxyStore`] supertrait exposes the spare proxy pool.
#[async_trait]
pub trait RouteStore: ProxyStore {
    /// Insert an account row.
    async fn add_account(&self, account: Account) -> Result<(), StoreError>;

    /// Add spare proxies to the pool. Duplicates are ignored.
    async fn add_spare_proxies(&self, proxies: Vec<String>) -> Result<(), StoreError>;

    /// All account rows.
    async fn accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// One account row.
    async fn account(&self, id: AccountId) -> Result<Account, StoreError>;

    /// Insert a route and its actions.
    async fn insert_route(&self, route: Route) -> Result<(), StoreError>;

    /// The route belonging to an account, if one exists.
    async fn route_for_account(&self, account_id: AccountId)
    -> Result<Option<Route>, StoreError>;

    /// Routes whose status is in `statuses`, actions eager-loaded,
    /// ordered by account id.
    async fn routes_by_status(&self, statuses: &[RouteStatus]) -> Result<Vec<Route>, StoreError>;

    /// Routes containing at least one `Failed` action, actions
    /// eager-loaded. Feeds rerun-failed mode.
    async fn routes_with_failed_actions(&self) -> Result<Vec<Route>, StoreError>;

    /// Count of routes whose status is in `statuses`.
    async fn count_by_status(&self, statuses: &[RouteStatus]) -> Result<u64, StoreError>;

    /// Paginated variant of [`routes_by_status`](Self::routes_by_status),
    /// ordered by account id for stable pages.
    async fn routes_by_status_paged(
        &self,
        statuses: &[RouteStatus],
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Route>, StoreError>;

    /// Update a route's status.
    async fn set_route_status(&self, id: RouteId, status: RouteStatus)
    -> Result<(), StoreError>;

    /// Stamp a route's start time.
    async fn set_route_started(&self, id: RouteId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Stamp a route's completion time.
    async fn set_route_completed(&self, id: RouteId, at: DateTime<Utc>)
    -> Result<(), StoreError>;

    /// Update an action's status.
    async fn set_action_status(
        &self,
        id: ActionId,
        status: RouteStatus,
    ) -> Result<(), StoreError>;

    /// Stamp an action's start time.
    async fn set_action_started(&self, id: ActionId, at: DateTime<Utc>)
    -> Result<(), StoreError>;

    /// Stamp an action's completion time.
    async fn set_action_completed(
        &self,
        id: ActionId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Delete every route and its actions, keeping accounts and proxies.
    async fn delete_all_routes(&self) -> Result<(), StoreError>;

    /// Wipe everything: routes, actions, accounts and spare proxies.
    async fn wipe(&self) -> Result<(), StoreError>;
}
