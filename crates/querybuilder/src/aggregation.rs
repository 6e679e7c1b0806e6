/// Aggregation expression rewriting
///
/// An aggregation such as `p99(duration_ms)` or `countIf(status >= 500)` is
/// parsed as the projection of `SELECT <expr>` with the ClickHouse dialect.
/// Calls to registered aggregate functions are renamed to their ClickHouse
/// form, field keys in their arguments become column expressions, and the
/// predicate of an `...If` function is compiled as a filter expression.
/// Anything else passes through untouched.
use crate::collision::adjust_key;
use crate::error::{Diagnostic, QueryBuilderError, Result};
use crate::functions::{self, AggrFunc};
use crate::where_clause::{prepare_where_clause, WhereClauseOptions};
use datafusion::sql::sqlparser::ast::{
    Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, Ident, ObjectName, SelectItem,
    SetExpr, Statement,
};
use datafusion::sql::sqlparser::dialect::ClickHouseDialect;
use datafusion::sql::sqlparser::parser::Parser;
use filterql::{parse_key, FieldDataType, TelemetryFieldKey, Value};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

pub const DEFAULT_RATE_INTERVAL_SECONDS: u64 = 60;

/// A rewritten aggregation and the values bound to its placeholders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewrittenAggregation {
    pub expression: String,
    pub args: Vec<Value>,
    pub warnings: Vec<Diagnostic>,
}

pub struct AggregateRewriter<'a> {
    where_options: &'a WhereClauseOptions<'a>,
    rate_interval_seconds: u64,
    intrinsic_fields: HashMap<String, TelemetryFieldKey>,
}

#[derive(Default)]
struct RewriteState {
    args: Vec<Value>,
    warnings: Vec<Diagnostic>,
    changed: bool,
    rate: bool,
}

impl<'a> AggregateRewriter<'a> {
    pub fn new(where_options: &'a WhereClauseOptions<'a>) -> Self {
        Self {
            where_options,
            rate_interval_seconds: DEFAULT_RATE_INTERVAL_SECONDS,
            intrinsic_fields: HashMap::new(),
        }
    }

    pub fn with_rate_interval(mut self, seconds: u64) -> Self {
        self.rate_interval_seconds = seconds;
        self
    }

    /// Fields that exist on every record, preferred over metadata keys of
    /// the same name
    pub fn with_intrinsic_fields(mut self, fields: impl IntoIterator<Item = TelemetryFieldKey>) -> Self {
        self.intrinsic_fields = fields.into_iter().map(|f| (f.name.clone(), f)).collect();
        self
    }

    /// Rewrite one aggregation expression.
    ///
    /// Returns the expression unchanged when it calls no registered
    /// aggregate function.
    pub fn rewrite(&self, expression: &str) -> Result<RewrittenAggregation> {
        debug!(expression = %expression, "rewriting aggregation");
        let mut expr = parse_expression(expression)?;
        let mut state = RewriteState::default();
        self.rewrite_expr(&mut expr, &mut state)?;

        if !state.changed {
            return Ok(RewrittenAggregation {
                expression: expression.to_string(),
                args: Vec::new(),
                warnings: Vec::new(),
            });
        }

        let mut rewritten = expr.to_string();
        if state.rate {
            rewritten = format!("{}/{}", rewritten, self.rate_interval_seconds);
        }
        debug!(rewritten = %rewritten, args = state.args.len(), "rewrote aggregation");
        Ok(RewrittenAggregation {
            expression: rewritten,
            args: state.args,
            warnings: state.warnings,
        })
    }

    fn rewrite_expr(&self, expr: &mut Expr, state: &mut RewriteState) -> Result<()> {
        match expr {
            Expr::Function(function) => self.rewrite_function(function, state),
            Expr::BinaryOp { left, right, .. } => {
                self.rewrite_expr(left, state)?;
                self.rewrite_expr(right, state)
            }
            Expr::Nested(inner) | Expr::UnaryOp { expr: inner, .. } => self.rewrite_expr(inner, state),
            _ => Ok(()),
        }
    }

    fn rewrite_function(&self, function: &mut Function, state: &mut RewriteState) -> Result<()> {
        let name = function.name.to_string();
        let Some(definition) = functions::lookup(&name) else {
            if let FunctionArguments::List(list) = &mut function.args {
                for arg in list.args.iter_mut() {
                    if let Some(expr) = arg_expr_mut(arg) {
                        self.rewrite_expr(expr, state)?;
                    }
                }
            }
            return Ok(());
        };

        let count = match &function.args {
            FunctionArguments::List(list) => list.args.len(),
            FunctionArguments::None => 0,
            FunctionArguments::Subquery(_) => {
                return Err(QueryBuilderError::InvalidArgument(format!(
                    "function `{}` does not accept a subquery",
                    definition.name
                )))
            }
        };
        definition
            .check_arity(count)
            .map_err(QueryBuilderError::InvalidArgument)?;

        if let FunctionArguments::List(list) = &mut function.args {
            let last = list.args.len().saturating_sub(1);
            for (i, arg) in list.args.iter_mut().enumerate() {
                let Some(expr) = arg_expr_mut(arg) else {
                    continue;
                };
                if definition.combinator && i == last {
                    self.rewrite_predicate(expr, state)?;
                } else {
                    self.rewrite_column_refs(expr, definition)?;
                }
            }
        }

        function.name = ObjectName::from(vec![Ident::new(definition.sql_name.clone())]);
        state.changed = true;
        state.rate |= definition.rate;
        Ok(())
    }

    fn rewrite_predicate(&self, expr: &mut Expr, state: &mut RewriteState) -> Result<()> {
        let predicate = expr.to_string();
        let prepared = prepare_where_clause(&predicate, self.where_options)?;
        state.args.extend(prepared.args);
        state.warnings.extend(prepared.warnings);
        *expr = Expr::Identifier(Ident::new(prepared.where_clause));
        Ok(())
    }

    fn rewrite_column_refs(&self, expr: &mut Expr, definition: &AggrFunc) -> Result<()> {
        let key_text = match expr {
            Expr::Identifier(ident) => Some(ident.value.clone()),
            Expr::CompoundIdentifier(parts) => Some(
                parts
                    .iter()
                    .map(|part| part.value.as_str())
                    .collect::<Vec<_>>()
                    .join("."),
            ),
            _ => None,
        };
        if let Some(text) = key_text {
            let column = self.column_for(&text, definition.numeric_only)?;
            *expr = Expr::Identifier(Ident::new(column));
            return Ok(());
        }

        match expr {
            Expr::BinaryOp { left, right, .. } => {
                self.rewrite_column_refs(left, definition)?;
                self.rewrite_column_refs(right, definition)
            }
            Expr::Nested(inner) | Expr::UnaryOp { expr: inner, .. } => {
                self.rewrite_column_refs(inner, definition)
            }
            Expr::Function(function) => {
                if let FunctionArguments::List(list) = &mut function.args {
                    for arg in list.args.iter_mut() {
                        if let Some(inner) = arg_expr_mut(arg) {
                            self.rewrite_column_refs(inner, definition)?;
                        }
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Column expression for a field key written in an aggregation
    fn column_for(&self, text: &str, numeric_only: bool) -> Result<String> {
        let mut key = parse_key(text);
        let intrinsic = self.intrinsic_fields.get(&key.name).cloned();
        adjust_key(&mut key, self.where_options.field_keys, intrinsic.as_ref());
        let column = self.where_options.field_mapper.field_for(&key)?;
        if numeric_only && key.field_data_type != FieldDataType::Number {
            return Ok(format!("toFloat64OrNull({})", column));
        }
        Ok(column)
    }
}

fn arg_expr_mut(arg: &mut FunctionArg) -> Option<&mut Expr> {
    match arg {
        FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => Some(expr),
        FunctionArg::Named {
            arg: FunctionArgExpr::Expr(expr),
            ..
        } => Some(expr),
        _ => None,
    }
}

/// Parse `expression` as the single projection of a `SELECT`
fn parse_expression(expression: &str) -> Result<Expr> {
    let sql = format!("SELECT {}", expression);
    let mut statements = Parser::parse_sql(&ClickHouseDialect {}, &sql)
        .map_err(|e| QueryBuilderError::SqlParse(e.to_string()))?;
    let not_an_expression =
        || QueryBuilderError::SqlParse(format!("expected a single expression: {}", expression));
    if statements.len() != 1 {
        return Err(not_an_expression());
    }
    let Statement::Query(query) = statements.remove(0) else {
        return Err(not_an_expression());
    };
    let SetExpr::Select(select) = *query.body else {
        return Err(not_an_expression());
    };
    let mut projection = select.projection;
    if projection.len() != 1 {
        return Err(not_an_expression());
    }
    match projection.remove(0) {
        SelectItem::UnnamedExpr(expr) => Ok(expr),
        SelectItem::ExprWithAlias { expr, .. } => Ok(expr),
        _ => Err(not_an_expression()),
    }
}
