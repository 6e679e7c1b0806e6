/// Filter expression language for telemetry queries
///
/// This crate parses the filter and `Having` expression languages and
/// provides the analyses that do not depend on SQL.
///
/// # Architecture
///
/// 1. **Lexer** (`lexer.rs`) - Tokenizes filter expressions
/// 2. **Parser** (`parser.rs`) - Builds the parse tree (`ast.rs`), reporting every syntax error with friendly token names (`error.rs`)
/// 3. **Field keys** (`keys.rs`) - Parses `context.name:type` key tokens into `TelemetryFieldKey`s
/// 4. **Filter tree** (`filter_tree.rs`) - Extracts a logical AND/OR/leaf tree for introspection
/// 5. **Contradictions** (`contradictions.rs`) - Finds conditions that can never be true together
/// 6. **Variables** (`variables.rs`) - Substitutes dashboard variables into expressions
/// 7. **Having** (`having.rs`) - Grammar for post-aggregation filters
///
/// # Usage
///
/// ```rust,ignore
/// use filterql::{extract_filter_tree, contradictions::detect_contradictions};
///
/// let tree = extract_filter_tree("service.name = 'redis' AND http.status_code >= 500")?;
/// let problems = detect_contradictions("a = 1 AND a = 2")?;
/// ```
pub mod ast;
pub mod contradictions;
pub mod error;
pub mod filter_tree;
pub mod having;
pub mod keys;
pub mod lexer;
pub mod operator;
pub mod parser;
pub mod value;
pub mod variables;

pub use error::{ParseError, SyntaxError};
pub use filter_tree::{ConditionValue, FilterCondition, FilterExprNode, FilterOp};
pub use keys::{parse_key, FieldContext, FieldDataType, JsonDataType, Signal, TelemetryFieldKey};
pub use operator::FilterOperator;
pub use value::Value;
pub use variables::{VariableItem, VariableResolver, VariableType};

use anyhow::{Context, Result};

/// Parse a filter expression and extract its logical tree
///
/// Blank expressions produce an empty leaf, which matches everything.
///
/// # Errors
///
/// Returns an error listing every syntax error if the expression does not parse
pub fn extract_filter_tree(expression: &str) -> Result<FilterExprNode> {
    let tree = filter_tree::extract(expression)
        .with_context(|| format!("Failed to parse filter expression: {}", expression))?;
    Ok(tree)
}

/// Whether an expression has nothing to filter on
pub fn is_blank(expression: &str) -> bool {
    expression.trim().is_empty()
}
