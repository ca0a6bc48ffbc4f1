/// PostgreSQL-backed BM25 search store
///
/// Uses sqlx with PgPool. The pool belongs to the caller: the store only
/// borrows connections from it and never closes it.

use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::FromRow;
use std::time::Duration;

use crate::capability::{CapabilityReport, CapabilitySnapshot, Requirements};
use crate::catalog::PgCatalog;
use crate::decorate::ScoredRows;
use crate::errors::Bm25Error;
use crate::schema::TableSchema;
use crate::score::ScoreExpression;
use crate::search::{FilterRequest, Planner, QueryPlan, SearchRequest};

/// BM25 search over one server, with its capability snapshot cached.
pub struct Bm25Store {
    pool: PgPool,
    planner: Planner<PgCatalog>,
}

impl Bm25Store {
    /// Wrap an existing pool. Nothing is sent to the server until the first
    /// operation that needs it.
    pub fn new(pool: PgPool, requirements: Requirements) -> Self {
        let planner = Planner::new(PgCatalog::new(pool.clone()), requirements);
        Bm25Store { pool, planner }
    }

    /// Create a lazily connecting pool for `database_url`.
    ///
    /// Connections are opened on first use, so an empty search never needs a
    /// reachable server.
    pub fn connect_lazy(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
        requirements: Requirements,
    ) -> Result<Self, Bm25Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(Duration::from_secs(300))    // 5 min idle cleanup
            .connect_lazy(database_url)
            .map_err(|e| Bm25Error::Storage(format!("Invalid database URL: {}", e)))?;

        Ok(Self::new(pool, requirements))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn planner(&self) -> &Planner<PgCatalog> {
        &self.planner
    }

    pub async fn capabilities(&self) -> Result<CapabilitySnapshot, Bm25Error> {
        self.planner.capabilities().await
    }

    pub async fn capability_report(&self) -> Result<CapabilityReport, Bm25Error> {
        let snapshot = self.planner.capabilities().await?;
        Ok(snapshot.report(self.planner.requirements()))
    }

    pub async fn reprobe(&self) -> Result<CapabilitySnapshot, Bm25Error> {
        self.planner.reprobe().await
    }

    /// Load a table's column allowlist (`name` or `schema.name`).
    pub async fn table(&self, table: &str) -> Result<TableSchema, Bm25Error> {
        self.planner.table(table).await
    }

    /// Score expression for use in caller-built queries (projection,
    /// ordering, filtering). Fails if the server lacks bm25 support.
    pub async fn score_expression(
        &self,
        table: &TableSchema,
        field: &str,
        query_text: &str,
    ) -> Result<ScoreExpression, Bm25Error> {
        let snapshot = self.planner.capabilities().await?;
        snapshot.verify(self.planner.requirements())?;
        table.score_expression(field, query_text)
    }

    /// Ranked search, best match first.
    ///
    /// Empty `query_text` returns no rows without contacting the server.
    pub async fn search<R>(
        &self,
        table: &TableSchema,
        request: &SearchRequest,
    ) -> Result<ScoredRows<R>, Bm25Error>
    where
        R: for<'r> FromRow<'r, PgRow>,
    {
        let plan = self.planner.plan_search(table, request).await?;
        self.execute(plan).await
    }

    /// Rows scoring at or below `request.threshold`, unordered.
    pub async fn filter<R>(
        &self,
        table: &TableSchema,
        request: &FilterRequest,
    ) -> Result<ScoredRows<R>, Bm25Error>
    where
        R: for<'r> FromRow<'r, PgRow>,
    {
        let plan = self.planner.plan_filter(table, request).await?;
        self.execute(plan).await
    }

    async fn execute<R>(&self, plan: QueryPlan) -> Result<ScoredRows<R>, Bm25Error>
    where
        R: for<'r> FromRow<'r, PgRow>,
    {
        let fragment = match plan {
            QueryPlan::Empty => return Ok(ScoredRows::default()),
            QueryPlan::Sql(fragment) => fragment,
        };

        tracing::debug!(sql = %fragment.sql, params = fragment.params.len(), "Executing bm25 query");

        let rows = fragment
            .to_query()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Bm25Error::Storage(format!("bm25 query failed: {}", e)))?;

        let scored = ScoredRows::from_pg_rows(&rows);
        if scored.failed() > 0 {
            tracing::warn!(failed = scored.failed(), total = scored.len(), "Some rows had undecodable scores");
        }
        Ok(scored)
    }
}
