/// BM25 score expression and the lower-is-better relevance convention
///
/// The server's bm25_score() returns lower values for more relevant rows
/// (matching documents score below zero, non-matching ones score zero).
/// `Relevance` is the single place that encodes this: SQL direction, the
/// match ceiling, threshold predicates and in-memory comparison. Every
/// operation touching scores goes through it.

use std::cmp::Ordering;

use crate::sql::{BinaryOp, BindValue, ColumnRef, Expr, Params, SqlFragment, TableRef};

/// Server-side scoring function.
pub const SCORE_FUNCTION: &str = "bm25_score";

/// Output column carrying the score in projected queries.
pub const SCORE_ALIAS: &str = "bm25_score";

/// Builds a bm25query bound to a named index (pg_textsearch).
const INDEX_QUERY_FUNCTION: &str = "to_bm25query";

/// The score ordering convention: lower is more relevant.
pub struct Relevance;

impl Relevance {
    /// ORDER BY direction that puts the best match first.
    pub const SQL_DIRECTION: &'static str = "ASC";

    /// Rows scoring at or above this value did not match the query.
    pub const MATCH_CEILING: f64 = 0.0;

    /// Best-first comparison for already materialized scores.
    pub fn cmp(a: f64, b: f64) -> Ordering {
        a.total_cmp(&b)
    }

    /// `score <= $threshold`
    pub fn threshold_predicate(score: Expr, threshold: f64) -> Expr {
        Expr::binary(score, BinaryOp::LtEq, Expr::Param(BindValue::Float(threshold)))
    }

    /// `score < 0`: the row matched at least one query term.
    pub fn match_predicate(score: Expr) -> Expr {
        Expr::binary(score, BinaryOp::Lt, Expr::Param(BindValue::Float(Self::MATCH_CEILING)))
    }

    /// ORDER BY item for the score alias, best first.
    pub fn order_by_alias() -> String {
        format!("{} {}", quoted_alias(), Self::SQL_DIRECTION)
    }
}

pub(crate) fn quoted_alias() -> String {
    format!("\"{}\"", SCORE_ALIAS)
}

/// `bm25_score(column, query)` for one validated text column.
///
/// Obtained from `TableSchema::score_expression`, which checks the column
/// against the relation's allowlist. The query text is always bound as a
/// parameter; empty text is allowed and still renders valid SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreExpression {
    column: ColumnRef,
    query_text: String,
    index: Option<TableRef>,
}

impl ScoreExpression {
    pub(crate) fn new(column: ColumnRef, query_text: &str) -> Self {
        ScoreExpression {
            column,
            query_text: query_text.to_string(),
            index: None,
        }
    }

    /// Scope scoring to a schema-qualified bm25 index. The index must
    /// already have been checked against the catalog.
    pub(crate) fn with_index(mut self, index: TableRef) -> Self {
        self.index = Some(index);
        self
    }

    pub fn column(&self) -> &ColumnRef {
        &self.column
    }

    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    pub fn index(&self) -> Option<&TableRef> {
        self.index.as_ref()
    }

    /// Expression node, for embedding into larger expressions.
    ///
    /// Without an index this is `bm25_score(col, $q)`. With one it is the
    /// index-scoped operator form `(col <@> to_bm25query($q, $index))`,
    /// which scores on the same scale and lets the planner pick that index.
    /// `$index` is the quoted `"schema"."index"` name.
    pub fn to_expr(&self) -> Expr {
        let query = Expr::Param(BindValue::Text(self.query_text.clone()));
        match &self.index {
            None => Expr::Function {
                name: SCORE_FUNCTION,
                args: vec![Expr::Column(self.column.clone()), query],
            },
            Some(index) => Expr::binary(
                Expr::Column(self.column.clone()),
                BinaryOp::Bm25Distance,
                Expr::Function {
                    name: INDEX_QUERY_FUNCTION,
                    args: vec![query, Expr::Param(BindValue::Text(index.quoted()))],
                },
            ),
        }
    }

    /// Standalone fragment with placeholders starting at `$first_param`.
    pub fn render_at(&self, first_param: usize) -> SqlFragment {
        let mut params = Params::starting_at(first_param);
        let sql = self.to_expr().render(&mut params);
        SqlFragment::new(sql, params)
    }

    pub fn to_fragment(&self) -> SqlFragment {
        self.render_at(1)
    }
}
