pub mod capability;
pub mod catalog;
pub mod config;
pub mod decorate;
pub mod errors;
pub mod logging;
pub mod schema;
pub mod score;
pub mod search;
pub mod sql;
pub mod store;

pub use capability::{CapabilityReport, CapabilitySnapshot, MissingCapability, Requirements};
pub use decorate::{ScoredRow, ScoredRows};
pub use errors::Bm25Error;
pub use schema::TableSchema;
pub use score::{Relevance, ScoreExpression};
pub use search::{FilterRequest, QueryPlan, SearchRequest};
pub use store::Bm25Store;
