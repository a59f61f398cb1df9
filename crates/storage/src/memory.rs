//! In-memory store for tests and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use caravan_core::{AccountId, ActionId, RouteId};
use caravan_resource::{ProxyStore, ResourceError};
use caravan_route::{Account, Route, RouteStatus};

use crate::error::StoreError;
use crate::store::RouteStore;

#[derive(Debug, Default)]
struct Inner {
    accounts: Vec<Account>,
    routes: Vec<Route>,
    proxies: Vec<ProxyRow>,
}

#[derive(Debug)]
struct ProxyRow {
    proxy: String,
    in_use: bool,
}

/// An in-memory [`RouteStore`].
///
/// One `RwLock` over all tables. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn touch_route<R>(
        &self,
        id: RouteId,
        f: impl FnOnce(&mut Route) -> R,
    ) -> Result<R, StoreError> {
        let mut inner = self.inner.write();
        let route = inner
            .routes
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::not_found("route", id))?;
        let result = f(route);
        route.updated_at = Some(Utc::now());
        Ok(result)
    }

    fn touch_action<R>(
        &self,
        id: ActionId,
        f: impl FnOnce(&mut caravan_route::RouteAction) -> R,
    ) -> Result<R, StoreError> {
        let mut inner = self.inner.write();
        let action = inner
            .routes
            .iter_mut()
            .flat_map(|r| r.actions.iter_mut())
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::not_found("action", id))?;
        let result = f(action);
        action.updated_at = Some(Utc::now());
        Ok(result)
    }

    fn sorted_by_account(mut routes: Vec<Route>) -> Vec<Route> {
        routes.sort_by_key(|r| r.account_id.to_string());
        routes
    }
}

#[async_trait]
impl RouteStore for MemoryStore {
    async fn add_account(&self, account: Account) -> Result<(), StoreError> {
        self.inner.write().accounts.push(account);
        Ok(())
    }

    async fn add_spare_proxies(&self, proxies: Vec<String>) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        for proxy in proxies {
            if !inner.proxies.iter().any(|p| p.proxy == proxy) {
                inner.proxies.push(ProxyRow {
                    proxy,
                    in_use: false,
                });
            }
        }
        Ok(())
    }

    async fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.inner.read().accounts.clone())
    }

    async fn account(&self, id: AccountId) -> Result<Account, StoreError> {
        self.inner
            .read()
            .accounts
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("account", id))
    }

    async fn insert_route(&self, mut route: Route) -> Result<(), StoreError> {
        route.sort_actions();
        self.inner.write().routes.push(route);
        Ok(())
    }

    async fn route_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Option<Route>, StoreError> {
        Ok(self
            .inner
            .read()
            .routes
            .iter()
            .find(|r| r.account_id == account_id)
            .cloned())
    }

    async fn routes_by_status(&self, statuses: &[RouteStatus]) -> Result<Vec<Route>, StoreError> {
        let routes = self
            .inner
            .read()
            .routes
            .iter()
            .filter(|r| statuses.contains(&r.status))
            .cloned()
            .collect();
        Ok(Self::sorted_by_account(routes))
    }

    async fn routes_with_failed_actions(&self) -> Result<Vec<Route>, StoreError> {
        let routes = self
            .inner
            .read()
            .routes
            .iter()
            .filter(|r| r.has_failed_actions())
            .cloned()
            .collect();
        Ok(Self::sorted_by_account(routes))
    }

    async fn count_by_status(&self, statuses: &[RouteStatus]) -> Result<u64, StoreError> {
        Ok(self
            .inner
            .read()
            .routes
            .iter()
            .filter(|r| statuses.contains(&r.status))
            .count() as u64)
    }

    async fn routes_by_status_paged(
        &self,
        statuses: &[RouteStatus],
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Route>, StoreError> {
        let routes = self.routes_by_status(statuses).await?;
        Ok(routes
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn set_route_status(
        &self,
        id: RouteId,
        status: RouteStatus,
    ) -> Result<(), StoreError> {
        self.touch_route(id, |route| route.status = status)
    }

    async fn set_route_started(&self, id: RouteId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.touch_route(id, |route| route.started_at = Some(at))
    }

    async fn set_route_completed(
        &self,
        id: RouteId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.touch_route(id, |route| route.completed_at = Some(at))
    }

    async fn set_action_status(
        &self,
        id: ActionId,
        status: RouteStatus,
    ) -> Result<(), StoreError> {
        self.touch_action(id, |action| action.status = status)
    }

    async fn set_action_started(
        &self,
        id: ActionId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.touch_action(id, |action| action.started_at = Some(at))
    }

    async fn set_action_completed(
        &self,
        id: ActionId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.touch_action(id, |action| action.completed_at = Some(at))
    }

    async fn delete_all_routes(&self) -> Result<(), StoreError> {
        self.inner.write().routes.clear();
        Ok(())
    }

    async fn wipe(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.routes.clear();
        inner.accounts.clear();
        inner.proxies.clear();
        Ok(())
    }
}

#[async_trait]
impl ProxyStore for MemoryStore {
    async fn lease_free(&self) -> Result<Option<String>, ResourceError> {
        let mut inner = self.inner.write();
        for row in &mut inner.proxies {
            if !row.in_use {
                row.in_use = true;
                return Ok(Some(row.proxy.clone()));
            }
        }
        Ok(None)
    }

    async fn release(&self, proxy: &str) -> Result<(), ResourceError> {
        let mut inner = self.inner.write();
        if let Some(row) = inner.proxies.iter_mut().find(|p| p.proxy == proxy) {
            row.in_use = false;
        }
        Ok(())
    }

    async fn reset_all(&self) -> Result<(), ResourceError> {
        for row in &mut self.inner.write().proxies {
            row.in_use = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn account() -> Account {
        Account::new("wallet-01", "0xabc")
    }

    fn route_with_actions(account_id: AccountId, statuses: &[RouteStatus]) -> Route {
        let mut route = Route::new(account_id);
        let params = Arc::new(serde_json::json!({}));
        for (i, status) in statuses.iter().enumerate() {
            let mut action = caravan_route::RouteAction::new(
                route.id,
                "swap",
                "Swap",
                u32::try_from(i).unwrap(),
                Arc::clone(&params),
            );
            action.status = *status;
            route.actions.push(action);
        }
        route
    }

    #[tokio::test]
    async fn add_and_list_accounts() {
        let store = MemoryStore::new();
        store.add_account(account()).await.unwrap();
        assert_eq!(store.accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_account_is_not_found() {
        let store = MemoryStore::new();
        let err = store.account(AccountId::v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "account", .. }));
    }

    #[tokio::test]
    async fn routes_by_status_filters() {
        let store = MemoryStore::new();
        let a1 = AccountId::v4();
        let a2 = AccountId::v4();

        store
            .insert_route(route_with_actions(a1, &[RouteStatus::Pending]))
            .await
            .unwrap();
        let mut done = route_with_actions(a2, &[RouteStatus::Completed]);
        done.status = RouteStatus::Completed;
        store.insert_route(done).await.unwrap();

        let pending = store
            .routes_by_status(&[RouteStatus::Pending, RouteStatus::InProgress])
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].account_id, a1);

        assert_eq!(
            store
                .count_by_status(&[RouteStatus::Completed])
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn routes_with_failed_actions() {
        let store = MemoryStore::new();
        store
            .insert_route(route_with_actions(
                AccountId::v4(),
                &[RouteStatus::Completed, RouteStatus::Failed],
            ))
            .await
            .unwrap();
        store
            .insert_route(route_with_actions(
                AccountId::v4(),
                &[RouteStatus::Completed],
            ))
            .await
            .unwrap();

        let failed = store.routes_with_failed_actions().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].actions.len(), 2);
    }

    #[tokio::test]
    async fn pagination_is_stable() {
        let store = MemoryStore::new();
        for _ in 0..5 {
            store
                .insert_route(route_with_actions(AccountId::v4(), &[RouteStatus::Pending]))
                .await
                .unwrap();
        }

        let page1 = store
            .routes_by_status_paged(&[RouteStatus::Pending], 2, 0)
            .await
            .unwrap();
        let page2 = store
            .routes_by_status_paged(&[RouteStatus::Pending], 2, 2)
            .await
            .unwrap();
        let page3 = store
            .routes_by_status_paged(&[RouteStatus::Pending], 2, 4)
            .await
            .unwrap();

        assert_eq!(page1.len(), 2);
        assert_eq!(page2.len(), 2);
        assert_eq!(page3.len(), 1);

        let mut ids: Vec<_> = page1
            .iter()
            .chain(&page2)
            .chain(&page3)
            .map(|r| r.id)
            .collect();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }

    #[tokio::test]
    async fn status_update_touches_updated_at() {
        let store = MemoryStore::new();
        let route = route_with_actions(AccountId::v4(), &[RouteStatus::Pending]);
        let route_id = route.id;
        let action_id = route.actions[0].id;
        store.insert_route(route).await.unwrap();

        store
            .set_route_status(route_id, RouteStatus::InProgress)
            .await
            .unwrap();
        store
            .set_action_status(action_id, RouteStatus::InProgress)
            .await
            .unwrap();

        let reloaded = store
            .routes_by_status(&[RouteStatus::InProgress])
            .await
            .unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded[0].updated_at.is_some());
        assert_eq!(reloaded[0].actions[0].status, RouteStatus::InProgress);
        assert!(reloaded[0].actions[0].updated_at.is_some());
    }

    #[tokio::test]
    async fn updating_missing_route_errors() {
        let store = MemoryStore::new();
        let err = store
            .set_route_status(RouteId::v4(), RouteStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "route", .. }));
    }

    #[tokio::test]
    async fn proxy_pool_round_trip() {
        let store = MemoryStore::new();
        store
            .add_spare_proxies(vec!["a:1".into(), "b:2".into(), "a:1".into()])
            .await
            .unwrap();

        assert_eq!(store.lease_free().await.unwrap().as_deref(), Some("a:1"));
        assert_eq!(store.lease_free().await.unwrap().as_deref(), Some("b:2"));
        assert_eq!(store.lease_free().await.unwrap(), None);

        store.release("a:1").await.unwrap();
        assert_eq!(store.lease_free().await.unwrap().as_deref(), Some("a:1"));

        store.reset_all().await.unwrap();
        assert_eq!(store.lease_free().await.unwrap().as_deref(), Some("a:1"));
    }

    #[tokio::test]
    async fn delete_routes_keeps_accounts() {
        let store = MemoryStore::new();
        store.add_account(account()).await.unwrap();
        store
            .insert_route(route_with_actions(AccountId::v4(), &[RouteStatus::Pending]))
            .await
            .unwrap();

        store.delete_all_routes().await.unwrap();
        assert!(store.routes_by_status(&[RouteStatus::Pending]).await.unwrap().is_empty());
        assert_eq!(store.accounts().await.unwrap().len(), 1);

        store.wipe().await.unwrap();
        assert!(store.accounts().await.unwrap().is_empty());
    }
}
