/// PostgreSQL-backed implementation of Catalog
///
/// Every query here is a read against the system catalogs or
/// information_schema; user-supplied names are always bound parameters.

use async_trait::async_trait;
use sqlx::{
    postgres::{PgPool, PgRow},
    Row,
};

use crate::catalog::{Catalog, ColumnInfo, IndexInfo, RelationColumns};
use crate::sql::TableRef;

/// Catalog queries over a shared sqlx connection pool.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        PgCatalog { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_index(row: &PgRow) -> Result<IndexInfo, sqlx::Error> {
    Ok(IndexInfo {
        name: row.try_get("index_name")?,
        table_schema: row.try_get("table_schema")?,
        table_name: row.try_get("table_name")?,
        access_method: row.try_get("access_method")?,
        columns: row.try_get("columns")?,
    })
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn extension_installed(&self, name: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = $1)")
            .bind(name)
            .fetch_one(&self.pool)
            .await
    }

    async fn access_method_exists(&self, name: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_am WHERE amname = $1 AND amtype = 'i')")
            .bind(name)
            .fetch_one(&self.pool)
            .await
    }

    async fn server_version_num(&self) -> Result<i32, sqlx::Error> {
        sqlx::query_scalar("SELECT current_setting('server_version_num')::int4")
            .fetch_one(&self.pool)
            .await
    }

    async fn relation_columns(&self, table: &TableRef) -> Result<Option<RelationColumns>, sqlx::Error> {
        // information_schema exposes sql_identifier domains; cast to text for decoding
        let rows = sqlx::query(
            "SELECT table_schema::text AS table_schema, column_name::text AS column_name, \
                    udt_name::text AS udt_name \
             FROM information_schema.columns \
             WHERE table_name::text = $1 \
               AND table_schema::text = COALESCE($2::text, current_schema()::text) \
             ORDER BY ordinal_position",
        )
        .bind(table.name.as_str())
        .bind(table.schema.as_ref().map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };
        let schema: String = first.try_get("table_schema")?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            columns.push(ColumnInfo {
                name: row.try_get("column_name")?,
                udt_name: row.try_get("udt_name")?,
            });
        }

        Ok(Some(RelationColumns { schema, columns }))
    }

    async fn find_index(&self, schema: &str, name: &str) -> Result<Option<IndexInfo>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT ic.relname::text AS index_name, n.nspname::text AS table_schema, \
                    t.relname::text AS table_name, am.amname::text AS access_method, \
                    ARRAY( \
                        SELECT a.attname::text \
                        FROM unnest(i.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) \
                        JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = k.attnum \
                        WHERE k.ord <= i.indnkeyatts \
                        ORDER BY k.ord \
                    ) AS columns \
             FROM pg_class ic \
             JOIN pg_namespace n ON n.oid = ic.relnamespace \
             JOIN pg_index i ON i.indexrelid = ic.oid \
             JOIN pg_class t ON t.oid = i.indrelid \
             JOIN pg_am am ON am.oid = ic.relam \
             WHERE ic.relkind IN ('i', 'I') AND ic.relname = $1 AND n.nspname = $2",
        )
        .bind(name)
        .bind(schema)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_index).transpose()
    }
}
