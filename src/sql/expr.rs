/// Minimal expression tree rendered to parameterized SQL.
///
/// Projection, ordering and filtering all consume the same nodes, so quoting
/// and placeholder allocation live in exactly one place (`Expr::render`).

use super::{BindValue, ColumnRef, Params};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Lt,
    LtEq,
    /// pg_textsearch index-scoped scoring operator.
    Bm25Distance,
}

impl BinaryOp {
    fn as_sql(self) -> &'static str {
        match self {
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Bm25Distance => "<@>",
        }
    }
}

/// SQL text already rendered by this crate, reused verbatim so the same
/// placeholders can appear in several clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct Prerendered(String);

impl Prerendered {
    pub(crate) fn new(sql: String) -> Self {
        Prerendered(sql)
    }

    pub fn as_sql(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Param(BindValue),
    /// Call of a function known to this crate; the name is never user input.
    Function {
        name: &'static str,
        args: Vec<Expr>,
    },
    Binary {
        lhs: Box<Expr>,
        op: BinaryOp,
        rhs: Box<Expr>,
    },
    Prerendered(Prerendered),
}

impl Expr {
    pub fn binary(lhs: Expr, op: BinaryOp, rhs: Expr) -> Self {
        Expr::Binary {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        }
    }

    /// Render into SQL text, registering parameter values in `params`.
    ///
    /// Binary nodes are always parenthesized so the result can be embedded
    /// anywhere without precedence surprises.
    pub fn render(&self, params: &mut Params) -> String {
        match self {
            Expr::Column(column) => column.quoted(),
            Expr::Param(value) => params.push(value.clone()),
            Expr::Function { name, args } => {
                let args: Vec<String> = args.iter().map(|a| a.render(params)).collect();
                format!("{}({})", name, args.join(", "))
            }
            Expr::Binary { lhs, op, rhs } => {
                let lhs = lhs.render(params);
                let rhs = rhs.render(params);
                format!("({} {} {})", lhs, op.as_sql(), rhs)
            }
            Expr::Prerendered(sql) => sql.as_sql().to_string(),
        }
    }
}
