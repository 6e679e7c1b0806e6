/// SQL generation for filter, aggregation and `Having` expressions
///
/// Builds ClickHouse SQL fragments from the expression languages parsed by
/// `filterql`. Storage-specific decisions (which column a key lives in, how
/// a condition is rendered) are delegated to the `FieldMapper` and
/// `ConditionBuilder` services; reference implementations for the
/// ClickHouse logs schema live in `clickhouse.rs`.
///
/// # Architecture
///
/// 1. **Errors** (`error.rs`) - Diagnostics and the error taxonomy shared by all passes
/// 2. **SQL builder** (`sql.rs`) - Positional `?` arguments and CTE assembly
/// 3. **Services** (`services.rs`) - Injected field mapping and condition rendering
/// 4. **Collisions** (`collision.rs`) - Resolves field keys that match several metadata keys
/// 5. **Where clause** (`where_clause.rs`) - Filter expression to SQL predicate
/// 6. **Functions** (`functions.rs`) - Aggregate function registry
/// 7. **Aggregations** (`aggregation.rs`) - Aggregation expression rewriting
/// 8. **Having** (`having.rs`) - Post-aggregation filter validation and rewriting
///
/// # Usage
///
/// ```rust,ignore
/// use querybuilder::{prepare_where_clause, ClickHouseConditionBuilder, ClickHouseFieldMapper, WhereClauseOptions};
///
/// let mapper = ClickHouseFieldMapper::logs();
/// let builder = ClickHouseConditionBuilder::new(mapper.clone());
/// let opts = WhereClauseOptions::new(&mapper, &builder, &field_keys);
/// let prepared = prepare_where_clause("service.name = 'redis'", &opts)?;
/// ```
pub mod aggregation;
pub mod clickhouse;
pub mod collision;
pub mod error;
pub mod functions;
pub mod having;
pub mod services;
pub mod sql;
pub mod where_clause;

pub use aggregation::{AggregateRewriter, RewrittenAggregation};
pub use clickhouse::{ClickHouseConditionBuilder, ClickHouseFieldMapper};
pub use error::{Diagnostic, DiagnosticKind, QueryBuilderError, Severity};
pub use having::{Aggregation, MetricAggregation, SpaceAggregation, TimeAggregation};
pub use services::{ConditionBuilder, FieldKeys, FieldMapper};
pub use sql::SqlBuilder;
pub use where_clause::{prepare_where_clause, PreparedWhereClause, WhereClauseOptions};

use anyhow::{Context, Result};

/// Compile a filter expression into a WHERE predicate
///
/// # Errors
///
/// Returns an error listing every syntax or semantic problem in the expression
pub fn compile_filter(expression: &str, opts: &WhereClauseOptions<'_>) -> Result<PreparedWhereClause> {
    let prepared = prepare_where_clause(expression, opts)
        .with_context(|| format!("Failed to compile filter expression: {}", expression))?;
    Ok(prepared)
}

/// Rewrite an aggregation expression into ClickHouse SQL
pub fn compile_aggregation(
    expression: &str,
    opts: &WhereClauseOptions<'_>,
    rate_interval_seconds: u64,
) -> Result<RewrittenAggregation> {
    let rewritten = AggregateRewriter::new(opts)
        .with_rate_interval(rate_interval_seconds)
        .rewrite(expression)
        .with_context(|| format!("Failed to rewrite aggregation: {}", expression))?;
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_filter_context() {
        let mapper = ClickHouseFieldMapper::logs();
        let builder = ClickHouseConditionBuilder::new(mapper.clone());
        let keys = FieldKeys::new();
        let opts = WhereClauseOptions::new(&mapper, &builder, &keys);
        let err = compile_filter("a = ", &opts).unwrap_err();
        assert_eq!(err.to_string(), "Failed to compile filter expression: a = ");
        assert!(err.downcast_ref::<QueryBuilderError>().is_some());
    }

    #[test]
    fn test_compile_aggregation_rate_interval() {
        let mapper = ClickHouseFieldMapper::logs();
        let builder = ClickHouseConditionBuilder::new(mapper.clone());
        let keys = FieldKeys::new();
        let opts = WhereClauseOptions::new(&mapper, &builder, &keys);
        let rewritten = compile_aggregation("rate()", &opts, 300).unwrap();
        assert_eq!(rewritten.expression, "count()/300");
    }
}
