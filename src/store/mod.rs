/// Query execution against PostgreSQL
///
/// `Bm25Store` binds planned fragments to a sqlx pool and decorates the rows
/// it gets back. Planning itself lives in `search`; this layer only runs what
/// the planner produced.

pub mod postgres;
pub mod row;

pub use postgres::Bm25Store;
pub use row::DynamicRow;
