/// Server metadata abstraction layer
///
/// Provides the Catalog trait: the read-only questions the query builders ask
/// the server before emitting any bm25-specific SQL. The trait keeps planning
/// testable without a live server; `PgCatalog` answers from PostgreSQL's
/// system catalogs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::sql::TableRef;

pub mod postgres;

pub use postgres::PgCatalog;

/// Column metadata used as the field allowlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Underlying type name as in pg_type.typname (e.g. "text", "varchar")
    pub udt_name: String,
}

impl ColumnInfo {
    /// True for column types bm25_score() can read.
    pub fn is_text(&self) -> bool {
        matches!(self.udt_name.as_str(), "text" | "varchar" | "bpchar" | "citext")
    }
}

/// Columns of a relation, with the schema it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationColumns {
    pub schema: String,
    pub columns: Vec<ColumnInfo>,
}

/// An index as found in pg_class/pg_index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub table_schema: String,
    pub table_name: String,
    pub access_method: String,
    /// Indexed columns in key order; expression keys are left out.
    pub columns: Vec<String>,
}

impl IndexInfo {
    pub fn covers(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// Read-only server metadata queries.
///
/// Errors are raw sqlx errors; callers decide whether they mean a failed
/// capability probe or an ordinary storage failure.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// True iff pg_extension has a row for `name`.
    async fn extension_installed(&self, name: &str) -> Result<bool, sqlx::Error>;

    /// True iff pg_am has an index access method called `name`.
    async fn access_method_exists(&self, name: &str) -> Result<bool, sqlx::Error>;

    /// server_version_num, e.g. 170002 for 17.2.
    async fn server_version_num(&self) -> Result<i32, sqlx::Error>;

    /// Columns of `table`, or None if the relation does not exist.
    /// An unqualified table resolves against current_schema().
    async fn relation_columns(&self, table: &TableRef) -> Result<Option<RelationColumns>, sqlx::Error>;

    /// Look up an index by name within `schema`.
    async fn find_index(&self, schema: &str, name: &str) -> Result<Option<IndexInfo>, sqlx::Error>;
}

#[async_trait]
impl<C: Catalog + ?Sized> Catalog for Arc<C> {
    async fn extension_installed(&self, name: &str) -> Result<bool, sqlx::Error> {
        (**self).extension_installed(name).await
    }

    async fn access_method_exists(&self, name: &str) -> Result<bool, sqlx::Error> {
        (**self).access_method_exists(name).await
    }

    async fn server_version_num(&self) -> Result<i32, sqlx::Error> {
        (**self).server_version_num().await
    }

    async fn relation_columns(&self, table: &TableRef) -> Result<Option<RelationColumns>, sqlx::Error> {
        (**self).relation_columns(table).await
    }

    async fn find_index(&self, schema: &str, name: &str) -> Result<Option<IndexInfo>, sqlx::Error> {
        (**self).find_index(schema, name).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory catalog that counts every query it answers.

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct FakeCatalog {
        pub extension: bool,
        pub access_method: bool,
        pub version: i32,
        pub fail_probe: bool,
        pub tables: HashMap<String, RelationColumns>,
        pub indexes: Vec<IndexInfo>,
        queries: AtomicUsize,
    }

    impl FakeCatalog {
        /// A fully capable server with `public.articles(id int8, title text, content text, views int4)`.
        pub fn supported() -> Self {
            let mut tables = HashMap::new();
            tables.insert(
                "articles".to_string(),
                RelationColumns {
                    schema: "public".to_string(),
                    columns: vec![
                        ColumnInfo { name: "id".into(), udt_name: "int8".into() },
                        ColumnInfo { name: "title".into(), udt_name: "varchar".into() },
                        ColumnInfo { name: "content".into(), udt_name: "text".into() },
                        ColumnInfo { name: "views".into(), udt_name: "int4".into() },
                    ],
                },
            );
            FakeCatalog {
                extension: true,
                access_method: true,
                version: 170002,
                fail_probe: false,
                tables,
                indexes: vec![
                    IndexInfo {
                        name: "article_content_bm25".into(),
                        table_schema: "public".into(),
                        table_name: "articles".into(),
                        access_method: "bm25".into(),
                        columns: vec!["content".into()],
                    },
                    IndexInfo {
                        name: "article_title_btree".into(),
                        table_schema: "public".into(),
                        table_name: "articles".into(),
                        access_method: "btree".into(),
                        columns: vec!["title".into()],
                    },
                    IndexInfo {
                        name: "comments_body_bm25".into(),
                        table_schema: "public".into(),
                        table_name: "comments".into(),
                        access_method: "bm25".into(),
                        columns: vec!["body".into()],
                    },
                ],
                queries: AtomicUsize::new(0),
            }
        }

        pub fn query_count(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }

        fn record(&self) {
            self.queries.fetch_add(1, Ordering::SeqCst);
        }

        fn probe_result<T>(&self, value: T) -> Result<T, sqlx::Error> {
            if self.fail_probe {
                Err(sqlx::Error::Protocol("permission denied for pg_extension".into()))
            } else {
                Ok(value)
            }
        }
    }

    #[async_trait]
    impl Catalog for FakeCatalog {
        async fn extension_installed(&self, _name: &str) -> Result<bool, sqlx::Error> {
            self.record();
            self.probe_result(self.extension)
        }

        async fn access_method_exists(&self, _name: &str) -> Result<bool, sqlx::Error> {
            self.record();
            self.probe_result(self.access_method)
        }

        async fn server_version_num(&self) -> Result<i32, sqlx::Error> {
            self.record();
            self.probe_result(self.version)
        }

        async fn relation_columns(&self, table: &TableRef) -> Result<Option<RelationColumns>, sqlx::Error> {
            self.record();
            let found = self.tables.get(table.name.as_str()).cloned();
            Ok(found.filter(|rel| {
                table.schema.as_ref().map_or(true, |s| s.as_str() == rel.schema)
            }))
        }

        async fn find_index(&self, schema: &str, name: &str) -> Result<Option<IndexInfo>, sqlx::Error> {
            self.record();
            Ok(self
                .indexes
                .iter()
                .find(|idx| idx.name == name && idx.table_schema == schema)
                .cloned())
        }
    }
}
