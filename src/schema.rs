/// Relation metadata used to validate field references before any SQL is built.

use crate::catalog::{Catalog, ColumnInfo};
use crate::errors::Bm25Error;
use crate::score::ScoreExpression;
use crate::sql::{ColumnRef, Ident, TableRef};

/// A resolved relation and its column allowlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    table: TableRef,
    columns: Vec<ColumnInfo>,
}

impl TableSchema {
    /// Build from known columns. `table` should be schema-qualified so
    /// index ownership can be checked.
    pub fn new(table: TableRef, columns: Vec<ColumnInfo>) -> Self {
        TableSchema { table, columns }
    }

    /// Load columns from the catalog, resolving an unqualified name against
    /// the server's current schema.
    pub async fn load<C: Catalog + ?Sized>(catalog: &C, table: &TableRef) -> Result<Self, Bm25Error> {
        let relation = catalog
            .relation_columns(table)
            .await?
            .ok_or_else(|| Bm25Error::UnknownTable { table: table.to_string() })?;

        let resolved = TableRef::qualified(&relation.schema, table.name.as_str())?;
        tracing::debug!(table = %resolved, columns = relation.columns.len(), "Loaded table schema");
        Ok(TableSchema::new(resolved, relation.columns))
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.table.schema.as_ref().map(Ident::as_str)
    }

    /// Any existing column (used for secondary sort keys).
    pub fn column(&self, field: &str) -> Result<ColumnRef, Bm25Error> {
        self.lookup(field)?;
        self.column_ref(field)
    }

    /// An existing text-bearing column (required for scoring).
    pub fn text_column(&self, field: &str) -> Result<ColumnRef, Bm25Error> {
        let info = self.lookup(field)?;
        if !info.is_text() {
            return Err(self.invalid_field(
                field,
                format!("column type '{}' is not text-bearing", info.udt_name),
            ));
        }
        self.column_ref(field)
    }

    /// Score expression for `field` against `query_text`.
    pub fn score_expression(&self, field: &str, query_text: &str) -> Result<ScoreExpression, Bm25Error> {
        Ok(ScoreExpression::new(self.text_column(field)?, query_text))
    }

    fn lookup(&self, field: &str) -> Result<&ColumnInfo, Bm25Error> {
        self.columns
            .iter()
            .find(|c| c.name == field)
            .ok_or_else(|| self.invalid_field(field, "no such column".to_string()))
    }

    fn column_ref(&self, field: &str) -> Result<ColumnRef, Bm25Error> {
        Ok(ColumnRef {
            table: self.table.clone(),
            column: Ident::new(field)?,
        })
    }

    fn invalid_field(&self, field: &str, reason: String) -> Bm25Error {
        Bm25Error::InvalidField {
            field: field.to_string(),
            table: self.table.to_string(),
            reason,
        }
    }
}
