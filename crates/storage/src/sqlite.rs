//! Durable sqlite store.
//!
//! One file, four tables. Parameter blobs are denormalized into the
//! action rows as JSON text; sharing is an in-memory concern.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::debug;

use caravan_core::{AccountId, ActionId, RouteId};
use caravan_resource::{ProxyStore, ResourceError};
use caravan_route::{Account, Route, RouteAction, RouteStatus};

use crate::error::StoreError;
use crate::store::RouteStore;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS accounts (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        address TEXT NOT NULL,
        private_key TEXT,
        proxy TEXT,
        user_agent TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS routes (
        id TEXT PRIMARY KEY,
        account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT,
        updated_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS route_actions (
        id TEXT PRIMARY KEY,
        route_id TEXT NOT NULL REFERENCES routes(id) ON DELETE CASCADE,
        kind TEXT NOT NULL,
        name TEXT NOT NULL,
        status TEXT NOT NULL,
        order_index INTEGER NOT NULL,
        params TEXT NOT NULL,
        created_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT,
        updated_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS spare_proxies (
        proxy TEXT PRIMARY KEY,
        in_use INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_routes_status ON routes(status)",
    "CREATE INDEX IF NOT EXISTS idx_actions_route ON route_actions(route_id, order_index)",
];

/// A sqlite-backed [`RouteStore`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database file and run the schema.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Open an in-memory database. A single pooled connection is pinned
    /// so the database survives for the pool's lifetime.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        debug!("sqlite schema ready");
        Ok(Self { pool })
    }

    fn status_list(statuses: &[RouteStatus]) -> String {
        statuses
            .iter()
            .map(|s| format!("'{s}'"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    async fn actions_for_route(&self, route_id: RouteId) -> Result<Vec<RouteAction>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM route_actions WHERE route_id = ? ORDER BY order_index",
        )
        .bind(route_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(action_from_row).collect()
    }

    async fn routes_from_rows(&self, rows: Vec<SqliteRow>) -> Result<Vec<Route>, StoreError> {
        let mut routes = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut route = route_from_row(row)?;
            route.actions = self.actions_for_route(route.id).await?;
            routes.push(route);
        }
        Ok(routes)
    }
}

fn corrupt_id(err: impl std::fmt::Display) -> StoreError {
    StoreError::CorruptId(err.to_string())
}

fn parse_status(raw: &str) -> Result<RouteStatus, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::CorruptStatus(raw.to_owned()))
}

fn account_from_row(row: &SqliteRow) -> Result<Account, StoreError> {
    let id: String = row.try_get("id")?;
    Ok(Account {
        id: AccountId::parse(&id).map_err(corrupt_id)?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        private_key: row.try_get("private_key")?,
        proxy: row.try_get("proxy")?,
        user_agent: row.try_get("user_agent")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<Option<DateTime<Utc>>, _>("updated_at")?,
    })
}

fn route_from_row(row: &SqliteRow) -> Result<Route, StoreError> {
    let id: String = row.try_get("id")?;
    let account_id: String = row.try_get("account_id")?;
    let status: String = row.try_get("status")?;
    Ok(Route {
        id: RouteId::parse(&id).map_err(corrupt_id)?,
        account_id: AccountId::parse(&account_id).map_err(corrupt_id)?,
        status: parse_status(&status)?,
        actions: Vec::new(),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        started_at: row.try_get::<Option<DateTime<Utc>>, _>("started_at")?,
        completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
        updated_at: row.try_get::<Option<DateTime<Utc>>, _>("updated_at")?,
    })
}

fn action_from_row(row: &SqliteRow) -> Result<RouteAction, StoreError> {
    let id: String = row.try_get("id")?;
    let route_id: String = row.try_get("route_id")?;
    let status: String = row.try_get("status")?;
    let params: String = row.try_get("params")?;
    Ok(RouteAction {
        id: ActionId::parse(&id).map_err(corrupt_id)?,
        route_id: RouteId::parse(&route_id).map_err(corrupt_id)?,
        kind: row.try_get("kind")?,
        name: row.try_get("name")?,
        status: parse_status(&status)?,
        order_index: row.try_get::<i64, _>("order_index")? as u32,
        params: Arc::new(serde_json::from_str(&params)?),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        started_at: row.try_get::<Option<DateTime<Utc>>, _>("started_at")?,
        completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
        updated_at: row.try_get::<Option<DateTime<Utc>>, _>("updated_at")?,
    })
}

#[async_trait]
impl RouteStore for SqliteStore {
    async fn add_account(&self, account: Account) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO accounts
             (id, name, address, private_key, proxy, user_agent, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(account.id.to_string())
        .bind(&account.name)
        .bind(&account.address)
        .bind(&account.private_key)
        .bind(&account.proxy)
        .bind(&account.user_agent)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_spare_proxies(&self, proxies: Vec<String>) -> Result<(), StoreError> {
        for proxy in proxies {
            sqlx::query("INSERT OR IGNORE INTO spare_proxies (proxy, in_use) VALUES (?, 0)")
                .bind(proxy)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query("SELECT * FROM accounts ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn account(&self, id: AccountId) -> Result<Account, StoreError> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("account", id))?;
        account_from_row(&row)
    }

    async fn insert_route(&self, mut route: Route) -> Result<(), StoreError> {
        route.sort_actions();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO routes
             (id, account_id, status, created_at, started_at, completed_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(route.id.to_string())
        .bind(route.account_id.to_string())
        .bind(route.status.to_string())
        .bind(route.created_at)
        .bind(route.started_at)
        .bind(route.completed_at)
        .bind(route.updated_at)
        .execute(&mut *tx)
        .await?;

        for action in &route.actions {
            sqlx::query(
                "INSERT INTO route_actions
                 (id, route_id, kind, name, status, order_index, params,
                  created_at, started_at, completed_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(action.id.to_string())
            .bind(action.route_id.to_string())
            .bind(&action.kind)
            .bind(&action.name)
            .bind(action.status.to_string())
            .bind(i64::from(action.order_index))
            .bind(serde_json::to_string(action.params.as_ref())?)
            .bind(action.created_at)
            .bind(action.started_at)
            .bind(action.completed_at)
            .bind(action.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn route_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Option<Route>, StoreError> {
        let row = sqlx::query("SELECT * FROM routes WHERE account_id = ?")
            .bind(account_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let mut route = route_from_row(&row)?;
                route.actions = self.actions_for_route(route.id).await?;
                Ok(Some(route))
            }
            None => Ok(None),
        }
    }

    async fn routes_by_status(&self, statuses: &[RouteStatus]) -> Result<Vec<Route>, StoreError> {
        let sql = format!(
            "SELECT * FROM routes WHERE status IN ({}) ORDER BY account_id",
            Self::status_list(statuses)
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        self.routes_from_rows(rows).await
    }

    async fn routes_with_failed_actions(&self) -> Result<Vec<Route>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT r.* FROM routes r
             JOIN route_actions a ON a.route_id = r.id
             WHERE a.status = 'failed'
             ORDER BY r.account_id",
        )
        .fetch_all(&self.pool)
        .await?;
        self.routes_from_rows(rows).await
    }

    async fn count_by_status(&self, statuses: &[RouteStatus]) -> Result<u64, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM routes WHERE status IN ({})",
            Self::status_list(statuses)
        );
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    async fn routes_by_status_paged(
        &self,
        statuses: &[RouteStatus],
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Route>, StoreError> {
        let sql = format!(
            "SELECT * FROM routes WHERE status IN ({})
             ORDER BY account_id LIMIT ? OFFSET ?",
            Self::status_list(statuses)
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await?;
        self.routes_from_rows(rows).await
    }

    async fn set_route_status(
        &self,
        id: RouteId,
        status: RouteStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE routes SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("route", id));
        }
        Ok(())
    }

    async fn set_route_started(&self, id: RouteId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE routes SET started_at = ?, updated_at = ? WHERE id = ?")
            .bind(at)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("route", id));
        }
        Ok(())
    }

    async fn set_route_completed(
        &self,
        id: RouteId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE routes SET completed_at = ?, updated_at = ? WHERE id = ?")
                .bind(at)
                .bind(Utc::now())
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("route", id));
        }
        Ok(())
    }

    async fn set_action_status(
        &self,
        id: ActionId,
        status: RouteStatus,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE route_actions SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.to_string())
                .bind(Utc::now())
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("action", id));
        }
        Ok(())
    }

    async fn set_action_started(
        &self,
        id: ActionId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE route_actions SET started_at = ?, updated_at = ? WHERE id = ?")
                .bind(at)
                .bind(Utc::now())
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("action", id));
        }
        Ok(())
    }

    async fn set_action_completed(
        &self,
        id: ActionId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE route_actions SET completed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(at)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("action", id));
        }
        Ok(())
    }

    async fn delete_all_routes(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM routes").execute(&self.pool).await?;
        Ok(())
    }

    async fn wipe(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM routes").execute(&self.pool).await?;
        sqlx::query("DELETE FROM accounts")
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM spare_proxies")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProxyStore for SqliteStore {
    async fn lease_free(&self) -> Result<Option<String>, ResourceError> {
        sqlx::query_scalar::<_, String>(
            "UPDATE spare_proxies SET in_use = 1
             WHERE proxy = (SELECT proxy FROM spare_proxies WHERE in_use = 0
                            ORDER BY rowid LIMIT 1)
             RETURNING proxy",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(ResourceError::store)
    }

    async fn release(&self, proxy: &str) -> Result<(), ResourceError> {
        sqlx::query("UPDATE spare_proxies SET in_use = 0 WHERE proxy = ?")
            .bind(proxy)
            .execute(&self.pool)
            .await
            .map_err(ResourceError::store)?;
        Ok(())
    }

    async fn reset_all(&self) -> Result<(), ResourceError> {
        sqlx::query("UPDATE spare_proxies SET in_use = 0")
            .execute(&self.pool)
            .await
            .map_err(ResourceError::store)?;
        Ok(())
    }
}
