/// Capability-gated planning over a Catalog.
///
/// Order of checks for every request: empty-query short-circuit (search
/// only), cached capability probe, local field validation, index lookup
/// (filter only). Nothing bm25-specific is sent to the server until all of
/// them pass.

use crate::capability::{CapabilityCache, CapabilitySnapshot, Requirements};
use crate::catalog::Catalog;
use crate::errors::Bm25Error;
use crate::schema::TableSchema;
use crate::search::{build_filter, build_search, validate_threshold, FilterRequest, QueryPlan, SearchRequest};
use crate::sql::TableRef;

/// Schema used for index lookups on tables built without one.
const DEFAULT_SCHEMA: &str = "public";

pub struct Planner<C> {
    catalog: C,
    requirements: Requirements,
    capabilities: CapabilityCache,
}

impl<C: Catalog> Planner<C> {
    pub fn new(catalog: C, requirements: Requirements) -> Self {
        Planner {
            catalog,
            requirements,
            capabilities: CapabilityCache::new(),
        }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    /// Cached snapshot, probing on first use.
    pub async fn capabilities(&self) -> Result<CapabilitySnapshot, Bm25Error> {
        self.capabilities
            .get_or_probe(&self.catalog, &self.requirements)
            .await
    }

    /// Discard the cached snapshot and probe again.
    pub async fn reprobe(&self) -> Result<CapabilitySnapshot, Bm25Error> {
        self.capabilities
            .refresh(&self.catalog, &self.requirements)
            .await
    }

    /// Load the column allowlist for `table` (`name` or `schema.name`).
    pub async fn table(&self, table: &str) -> Result<TableSchema, Bm25Error> {
        TableSchema::load(&self.catalog, &TableRef::parse(table)?).await
    }

    pub async fn plan_search(
        &self,
        table: &TableSchema,
        request: &SearchRequest,
    ) -> Result<QueryPlan, Bm25Error> {
        if request.query_text.is_empty() {
            tracing::debug!(table = %table.table(), field = %request.field, "Empty search query, returning no rows");
            return Ok(QueryPlan::Empty);
        }

        let snapshot = self.capabilities().await?;
        let supported = snapshot.verify(&self.requirements)?;
        build_search(supported, table, request)
    }

    pub async fn plan_filter(
        &self,
        table: &TableSchema,
        request: &FilterRequest,
    ) -> Result<QueryPlan, Bm25Error> {
        let snapshot = self.capabilities().await?;
        let supported = snapshot.verify(&self.requirements)?;

        // Local checks first so a bad field never costs an index lookup
        validate_threshold(request.threshold)?;
        table.text_column(&request.field)?;

        let index = match request.index.as_deref() {
            Some(name) => {
                let schema = table.schema_name().unwrap_or(DEFAULT_SCHEMA);
                self.catalog.find_index(schema, name).await?
            }
            None => None,
        };

        build_filter(supported, table, request, index.as_ref())
    }
}
