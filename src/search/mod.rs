/// BM25 search and threshold-filter query construction.
///
/// Builders are synchronous and side-effect free: they take a verified
/// capability token, a validated table schema and (for filters) the catalog
/// entry of the requested index, and return a `QueryPlan`. `Planner` does the
/// catalog round-trips that feed them.

pub mod planner;

pub use planner::Planner;

use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

use crate::capability::Supported;
use crate::catalog::IndexInfo;
use crate::errors::Bm25Error;
use crate::schema::TableSchema;
use crate::score::{quoted_alias, Relevance};
use crate::sql::{BindValue, Expr, Params, SqlFragment, TableRef};
use crate::sql::expr::Prerendered;

/// Ranked search: best matches first, optionally limited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query_text: String,
    pub field: String,
    /// Maximum rows to return. No implicit cap is applied.
    #[serde(default)]
    pub limit: Option<NonZeroU32>,
    /// Secondary sort column for deterministic ordering of equal scores.
    #[serde(default)]
    pub then_by: Option<String>,
}

impl SearchRequest {
    pub fn new(query_text: impl Into<String>, field: impl Into<String>) -> Self {
        SearchRequest {
            query_text: query_text.into(),
            field: field.into(),
            limit: None,
            then_by: None,
        }
    }

    /// Set the row limit; zero is rejected.
    pub fn limit(mut self, limit: u32) -> Result<Self, Bm25Error> {
        let limit = NonZeroU32::new(limit)
            .ok_or_else(|| Bm25Error::validation("limit", "Limit must be a positive integer"))?;
        self.limit = Some(limit);
        Ok(self)
    }

    pub fn then_by(mut self, column: impl Into<String>) -> Self {
        self.then_by = Some(column.into());
        self
    }
}

/// Threshold filter: rows scoring at or below `threshold` (lower is better,
/// same scale as search).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    pub query_text: String,
    pub field: String,
    /// bm25 index to score through, so the planner uses it.
    #[serde(default)]
    pub index: Option<String>,
    pub threshold: f64,
}

impl FilterRequest {
    pub fn new(query_text: impl Into<String>, field: impl Into<String>, threshold: f64) -> Self {
        FilterRequest {
            query_text: query_text.into(),
            field: field.into(),
            index: None,
            threshold,
        }
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }
}

/// What to run for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    /// Known to return no rows; nothing needs to be sent to the server.
    Empty,
    Sql(SqlFragment),
}

impl QueryPlan {
    pub fn is_empty(&self) -> bool {
        matches!(self, QueryPlan::Empty)
    }

    pub fn fragment(&self) -> Option<&SqlFragment> {
        match self {
            QueryPlan::Empty => None,
            QueryPlan::Sql(fragment) => Some(fragment),
        }
    }
}

/// Build a ranked search.
///
/// Empty query text yields `QueryPlan::Empty`: an empty query matches
/// nothing and must never turn into a scan of the whole table. This is an
/// accepted input, not an error.
///
/// Rows are those with a matching score (below `Relevance::MATCH_CEILING`),
/// ordered best first. Equal scores keep the server's natural order unless
/// `then_by` adds a secondary key; that order is not stable across runs.
pub fn build_search(
    _supported: Supported<'_>,
    table: &TableSchema,
    request: &SearchRequest,
) -> Result<QueryPlan, Bm25Error> {
    if request.query_text.is_empty() {
        return Ok(QueryPlan::Empty);
    }

    let score = table.score_expression(&request.field, &request.query_text)?;
    let then_by = request
        .then_by
        .as_deref()
        .map(|column| table.column(column))
        .transpose()?;

    let mut params = Params::new();
    let score_sql = score.to_expr().render(&mut params);
    let matches = Relevance::match_predicate(Expr::Prerendered(Prerendered::new(score_sql.clone())))
        .render(&mut params);

    let relation = table.table().quoted();
    let mut sql = format!(
        "SELECT {relation}.*, {score_sql} AS {alias} FROM {relation} WHERE {matches} ORDER BY {order}",
        relation = relation,
        score_sql = score_sql,
        alias = quoted_alias(),
        matches = matches,
        order = Relevance::order_by_alias(),
    );
    if let Some(column) = then_by {
        sql.push_str(&format!(", {} ASC", column.quoted()));
    }
    if let Some(limit) = request.limit {
        let placeholder = params.push(BindValue::Int(i64::from(limit.get())));
        sql.push_str(&format!(" LIMIT {}", placeholder));
    }

    Ok(QueryPlan::Sql(SqlFragment::new(sql, params)))
}

/// Check that `found` (the catalog entry for `name`) is a usable bm25 index
/// on `field` of `table`.
///
/// Returns the index qualified by the schema it was found in, so the server
/// resolves exactly the index that was checked, whatever its search_path.
pub fn check_index(
    supported: Supported<'_>,
    table: &TableSchema,
    field: &str,
    name: &str,
    found: Option<&IndexInfo>,
) -> Result<TableRef, Bm25Error> {
    let invalid = |reason: String| Bm25Error::InvalidIndex {
        index: name.to_string(),
        reason,
    };

    let info = found.ok_or_else(|| invalid("index does not exist".to_string()))?;

    let access_method = &supported.requirements().access_method;
    if &info.access_method != access_method {
        return Err(invalid(format!(
            "index uses access method '{}', expected '{}'",
            info.access_method, access_method
        )));
    }

    let same_table = table.table().name.as_str() == info.table_name
        && table.schema_name().map_or(true, |s| s == info.table_schema);
    if !same_table {
        return Err(invalid(format!(
            "index belongs to {}.{}, not {}",
            info.table_schema,
            info.table_name,
            table.table()
        )));
    }

    if !info.covers(field) {
        let covered = match info.columns.as_slice() {
            [] => "an expression".to_string(),
            columns => columns.join(", "),
        };
        return Err(invalid(format!("index covers {}, not {}", covered, field)));
    }

    TableRef::qualified(&info.table_schema, &info.name)
}

/// Build a threshold filter. `index` must be the catalog lookup result for
/// `request.index` when one is named.
pub fn build_filter(
    supported: Supported<'_>,
    table: &TableSchema,
    request: &FilterRequest,
    index: Option<&IndexInfo>,
) -> Result<QueryPlan, Bm25Error> {
    validate_threshold(request.threshold)?;

    let mut score = table.score_expression(&request.field, &request.query_text)?;
    if let Some(name) = request.index.as_deref() {
        score = score.with_index(check_index(supported, table, &request.field, name, index)?);
    }

    let mut params = Params::new();
    let score_sql = score.to_expr().render(&mut params);
    let within = Relevance::threshold_predicate(
        Expr::Prerendered(Prerendered::new(score_sql.clone())),
        request.threshold,
    )
    .render(&mut params);

    let relation = table.table().quoted();
    let sql = format!(
        "SELECT {relation}.*, {score_sql} AS {alias} FROM {relation} WHERE {within}",
        relation = relation,
        score_sql = score_sql,
        alias = quoted_alias(),
        within = within,
    );

    Ok(QueryPlan::Sql(SqlFragment::new(sql, params)))
}

pub(crate) fn validate_threshold(threshold: f64) -> Result<(), Bm25Error> {
    if threshold.is_nan() {
        return Err(Bm25Error::validation("threshold", "Threshold must be a number, got NaN"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilitySnapshot, Requirements};
    use crate::catalog::ColumnInfo;
    use crate::sql::TableRef;

    static SNAPSHOT: CapabilitySnapshot = CapabilitySnapshot {
        extension_present: true,
        access_method_present: true,
        server_version: 170002,
    };

    fn articles_in(schema: &str) -> TableSchema {
        TableSchema::new(
            TableRef::qualified(schema, "articles").unwrap(),
            vec![
                ColumnInfo { name: "id".into(), udt_name: "int8".into() },
                ColumnInfo { name: "title".into(), udt_name: "varchar".into() },
                ColumnInfo { name: "content".into(), udt_name: "text".into() },
            ],
        )
    }

    fn articles() -> TableSchema {
        articles_in("public")
    }

    fn bm25_index(name: &str, table: &str) -> IndexInfo {
        IndexInfo {
            name: name.into(),
            table_schema: "public".into(),
            table_name: table.into(),
            access_method: "bm25".into(),
            columns: vec!["content".into()],
        }
    }

    #[test]
    fn test_search_sql_shape() {
        let req = Requirements::default();
        let supported = SNAPSHOT.verify(&req).unwrap();
        let request = SearchRequest::new("postgresql", "content").limit(2).unwrap();

        let plan = build_search(supported, &articles(), &request).unwrap();
        let fragment = plan.fragment().unwrap();
        let score = "bm25_score(\"public\".\"articles\".\"content\", $1)";
        assert_eq!(
            fragment.sql,
            format!(
                "SELECT \"public\".\"articles\".*, {score} AS \"bm25_score\" \
                 FROM \"public\".\"articles\" WHERE ({score} < $2) \
                 ORDER BY \"bm25_score\" ASC LIMIT $3"
            )
        );
        assert_eq!(
            fragment.params,
            vec![
                BindValue::Text("postgresql".into()),
                BindValue::Float(0.0),
                BindValue::Int(2),
            ]
        );
    }

    #[test]
    fn test_search_without_limit_and_with_tie_breaker() {
        let req = Requirements::default();
        let supported = SNAPSHOT.verify(&req).unwrap();
        let request = SearchRequest::new("database", "content").then_by("id");

        let plan = build_search(supported, &articles(), &request).unwrap();
        let fragment = plan.fragment().unwrap();
        assert!(fragment
            .sql
            .ends_with("ORDER BY \"bm25_score\" ASC, \"public\".\"articles\".\"id\" ASC"));
        assert!(!fragment.sql.contains("LIMIT"));
        assert_eq!(fragment.params.len(), 2);
    }

    #[test]
    fn test_search_empty_query_is_empty_plan() {
        let req = Requirements::default();
        let supported = SNAPSHOT.verify(&req).unwrap();
        for request in [
            SearchRequest::new("", "content"),
            SearchRequest::new("", "content").limit(5).unwrap(),
        ] {
            assert!(build_search(supported, &articles(), &request).unwrap().is_empty());
        }
    }

    #[test]
    fn test_search_rejects_unknown_field_and_zero_limit() {
        let req = Requirements::default();
        let supported = SNAPSHOT.verify(&req).unwrap();

        let err = build_search(supported, &articles(), &SearchRequest::new("q", "body")).unwrap_err();
        assert!(matches!(err, Bm25Error::InvalidField { .. }));

        let err = build_search(supported, &articles(), &SearchRequest::new("q", "id")).unwrap_err();
        assert!(matches!(err, Bm25Error::InvalidField { .. }));

        let err = build_search(
            supported,
            &articles(),
            &SearchRequest::new("q", "content").then_by("missing"),
        )
        .unwrap_err();
        assert!(matches!(err, Bm25Error::InvalidField { .. }));

        assert!(matches!(
            SearchRequest::new("q", "content").limit(0),
            Err(Bm25Error::Validation { .. })
        ));
    }

    #[test]
    fn test_filter_sql_shape() {
        let req = Requirements::default();
        let supported = SNAPSHOT.verify(&req).unwrap();
        let request = FilterRequest::new("database", "content", -0.5);

        let plan = build_filter(supported, &articles(), &request, None).unwrap();
        let fragment = plan.fragment().unwrap();
        let score = "bm25_score(\"public\".\"articles\".\"content\", $1)";
        assert_eq!(
            fragment.sql,
            format!(
                "SELECT \"public\".\"articles\".*, {score} AS \"bm25_score\" \
                 FROM \"public\".\"articles\" WHERE ({score} <= $2)"
            )
        );
        assert_eq!(fragment.params[1], BindValue::Float(-0.5));
    }

    #[test]
    fn test_filter_with_index_uses_scoped_operator() {
        let req = Requirements::default();
        let supported = SNAPSHOT.verify(&req).unwrap();
        let request = FilterRequest::new("database", "content", -0.5).index("article_content_bm25");
        let index = bm25_index("article_content_bm25", "articles");

        let plan = build_filter(supported, &articles(), &request, Some(&index)).unwrap();
        let fragment = plan.fragment().unwrap();
        assert!(fragment
            .sql
            .contains("(\"public\".\"articles\".\"content\" <@> to_bm25query($1, $2))"));
        assert!(fragment.sql.ends_with("<= $3)"));
        assert_eq!(
            fragment.params,
            vec![
                BindValue::Text("database".into()),
                BindValue::Text("\"public\".\"article_content_bm25\"".into()),
                BindValue::Float(-0.5),
            ]
        );
    }

    #[test]
    fn test_filter_index_is_bound_with_its_schema() {
        let req = Requirements::default();
        let supported = SNAPSHOT.verify(&req).unwrap();
        let request = FilterRequest::new("database", "content", -0.5).index("article_content_bm25");
        let mut index = bm25_index("article_content_bm25", "articles");
        index.table_schema = "search".into();

        let plan = build_filter(supported, &articles_in("search"), &request, Some(&index)).unwrap();
        assert_eq!(
            plan.fragment().unwrap().params[1],
            BindValue::Text("\"search\".\"article_content_bm25\"".into())
        );
    }

    #[test]
    fn test_filter_index_must_cover_field() {
        let req = Requirements::default();
        let supported = SNAPSHOT.verify(&req).unwrap();
        let request = FilterRequest::new("database", "title", -0.5).index("article_content_bm25");
        let index = bm25_index("article_content_bm25", "articles");

        let err = build_filter(supported, &articles(), &request, Some(&index)).unwrap_err();
        assert!(matches!(
            err,
            Bm25Error::InvalidIndex { ref reason, .. } if reason == "index covers content, not title"
        ));

        let mut expression = bm25_index("article_content_bm25", "articles");
        expression.columns.clear();
        let request = FilterRequest::new("database", "content", -0.5).index("article_content_bm25");
        let err = build_filter(supported, &articles(), &request, Some(&expression)).unwrap_err();
        assert!(matches!(err, Bm25Error::InvalidIndex { ref reason, .. } if reason.contains("expression")));
    }

    #[test]
    fn test_filter_invalid_indexes() {
        let req = Requirements::default();
        let supported = SNAPSHOT.verify(&req).unwrap();
        let request = FilterRequest::new("database", "content", -0.5).index("idx");

        // missing
        let err = build_filter(supported, &articles(), &request, None).unwrap_err();
        assert!(matches!(err, Bm25Error::InvalidIndex { ref reason, .. } if reason.contains("does not exist")));

        // wrong access method
        let mut btree = bm25_index("idx", "articles");
        btree.access_method = "btree".into();
        let err = build_filter(supported, &articles(), &request, Some(&btree)).unwrap_err();
        assert!(matches!(err, Bm25Error::InvalidIndex { ref reason, .. } if reason.contains("btree")));

        // other table
        let other = bm25_index("idx", "comments");
        let err = build_filter(supported, &articles(), &request, Some(&other)).unwrap_err();
        assert!(matches!(err, Bm25Error::InvalidIndex { ref reason, .. } if reason.contains("comments")));
    }

    #[test]
    fn test_filter_rejects_nan_threshold() {
        let req = Requirements::default();
        let supported = SNAPSHOT.verify(&req).unwrap();
        let request = FilterRequest::new("database", "content", f64::NAN);
        assert!(matches!(
            build_filter(supported, &articles(), &request, None),
            Err(Bm25Error::Validation { .. })
        ));
    }
}
