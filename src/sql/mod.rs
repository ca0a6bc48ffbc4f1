/// SQL building blocks: quoted identifiers, bound parameter values and
/// rendered fragments.
///
/// Nothing user-supplied reaches SQL text except through `Ident::quoted()`
/// (double-quote escaping) or as a `$n` placeholder backed by a `BindValue`.

pub mod expr;

pub use expr::{BinaryOp, Expr};

use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use std::fmt;

use crate::errors::Bm25Error;

/// A PostgreSQL identifier, rendered double-quoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    /// Validate a raw identifier. Empty names and NUL bytes are rejected;
    /// everything else is made safe by quoting.
    pub fn new(name: &str) -> Result<Self, Bm25Error> {
        if name.is_empty() {
            return Err(Bm25Error::validation("identifier", "Identifier cannot be empty"));
        }
        if name.contains('\0') {
            return Err(Bm25Error::validation("identifier", "Identifier cannot contain NUL bytes"));
        }
        Ok(Ident(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form with embedded quotes doubled.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0.replace('"', "\"\""))
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A relation, optionally schema-qualified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: Option<Ident>,
    pub name: Ident,
}

impl TableRef {
    /// Parse `table` or `schema.table`. Names containing dots must be built
    /// with `TableRef::qualified` instead.
    pub fn parse(raw: &str) -> Result<Self, Bm25Error> {
        match raw.split_once('.') {
            Some((schema, name)) => Self::qualified(schema, name),
            None => Ok(TableRef { schema: None, name: Ident::new(raw)? }),
        }
    }

    pub fn qualified(schema: &str, name: &str) -> Result<Self, Bm25Error> {
        Ok(TableRef {
            schema: Some(Ident::new(schema)?),
            name: Ident::new(name)?,
        })
    }

    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema.quoted(), self.name.quoted()),
            None => self.name.quoted(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A column qualified by its relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: TableRef,
    pub column: Ident,
}

impl ColumnRef {
    pub fn quoted(&self) -> String {
        format!("{}.{}", self.table.quoted(), self.column.quoted())
    }
}

/// A value sent as a bound parameter, never inlined.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Float(f64),
    Int(i64),
}

/// Parameter accumulator handing out `$n` placeholders.
#[derive(Debug, Clone)]
pub struct Params {
    first: usize,
    values: Vec<BindValue>,
}

impl Default for Params {
    fn default() -> Self {
        Self::new()
    }
}

impl Params {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Start numbering at `$first`, for composing into a query that already
    /// binds `first - 1` parameters.
    pub fn starting_at(first: usize) -> Self {
        Params { first: first.max(1), values: Vec::new() }
    }

    /// Register a value and return its placeholder.
    pub fn push(&mut self, value: BindValue) -> String {
        self.values.push(value);
        format!("${}", self.first + self.values.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<BindValue> {
        self.values
    }
}

/// Rendered SQL text plus the values for its placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<BindValue>,
}

impl SqlFragment {
    pub fn new(sql: String, params: Params) -> Self {
        SqlFragment { sql, params: params.into_values() }
    }

    /// Build an executable query with every parameter bound in order.
    pub fn to_query(&self) -> Query<'_, Postgres, PgArguments> {
        bind_all(sqlx::query(&self.sql), &self.params)
    }
}

/// Bind `params` onto `query` in order.
pub fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [BindValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            BindValue::Text(s) => query.bind(s.as_str()),
            BindValue::Float(f) => query.bind(*f),
            BindValue::Int(i) => query.bind(*i),
        };
    }
    query
}
