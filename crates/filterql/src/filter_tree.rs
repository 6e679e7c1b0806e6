/// Logical filter trees
///
/// Extracts a SQL-independent AND/OR/leaf tree from a filter expression so
/// callers can inspect which keys and operators a filter uses. Full-text
/// terms, bare keys and function calls have no logical counterpart and are
/// left out of the tree.
use crate::ast::*;
use crate::error::ParseError;
use crate::keys::{parse_key, TelemetryFieldKey};
use crate::lexer::trim_quotes;
use crate::operator::FilterOperator;
use crate::parser::parse;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterOp {
    And,
    Or,
    Leaf,
}

/// Value of a filter condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionValue {
    Scalar(Value),
    Range(Value, Value),
    List(Vec<Value>),
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub key: TelemetryFieldKey,
    pub op: FilterOperator,
    pub value: ConditionValue,
}

/// A node of the logical filter tree
///
/// Leaves carry exactly one condition, except the empty leaf produced for a
/// blank expression. AND/OR nodes carry at least two children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExprNode {
    pub op: FilterOp,
    pub negated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FilterExprNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<FilterCondition>,
}

impl FilterExprNode {
    /// The constant-true filter
    pub fn empty() -> Self {
        Self {
            op: FilterOp::Leaf,
            negated: false,
            children: Vec::new(),
            conditions: Vec::new(),
        }
    }

    pub fn leaf(condition: FilterCondition) -> Self {
        Self {
            op: FilterOp::Leaf,
            negated: false,
            children: Vec::new(),
            conditions: vec![condition],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.op == FilterOp::Leaf && self.conditions.is_empty()
    }

    /// Every condition in the tree, left to right
    pub fn conditions(&self) -> Vec<&FilterCondition> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a FilterCondition>) {
        out.extend(self.conditions.iter());
        for child in &self.children {
            child.collect_conditions(out);
        }
    }
}

/// Parse `expression` and extract its logical tree.
///
/// A blank expression yields the empty leaf.
pub fn extract(expression: &str) -> Result<FilterExprNode, ParseError> {
    let query = parse(expression)?;
    Ok(from_query(&query))
}

/// Build the logical tree of an already parsed query
pub fn from_query(query: &Query) -> FilterExprNode {
    query
        .expression
        .as_ref()
        .and_then(visit_or)
        .unwrap_or_else(FilterExprNode::empty)
}

fn visit_or(expr: &OrExpression) -> Option<FilterExprNode> {
    let children: Vec<FilterExprNode> = expr.branches.iter().filter_map(visit_and).collect();
    combine(FilterOp::Or, children)
}

fn visit_and(expr: &AndExpression) -> Option<FilterExprNode> {
    let children: Vec<FilterExprNode> = expr.terms.iter().filter_map(visit_unary).collect();
    combine(FilterOp::And, children)
}

fn combine(op: FilterOp, mut children: Vec<FilterExprNode>) -> Option<FilterExprNode> {
    match children.len() {
        0 => None,
        1 => children.pop(),
        _ => Some(FilterExprNode {
            op,
            negated: false,
            children,
            conditions: Vec::new(),
        }),
    }
}

fn visit_unary(expr: &UnaryExpression) -> Option<FilterExprNode> {
    let mut node = match &expr.primary {
        Primary::Group(inner) => visit_or(inner)?,
        Primary::Comparison(comparison) => FilterExprNode::leaf(condition_for(comparison)),
        Primary::FunctionCall(_) | Primary::FullText(_) | Primary::Key(_) | Primary::Value(_) => {
            return None
        }
    };
    if expr.negated {
        node.negated = !node.negated;
    }
    Some(node)
}

fn condition_for(comparison: &Comparison) -> FilterCondition {
    let key = parse_key(&comparison.key.text);
    let (op, value) = match &comparison.kind {
        ComparisonKind::Binary { op, value } => {
            let op = match op {
                CompareOp::Equals => FilterOperator::Equal,
                CompareOp::NotEquals | CompareOp::Neq => FilterOperator::NotEqual,
                CompareOp::Lt => FilterOperator::LessThan,
                CompareOp::Le => FilterOperator::LessThanOrEq,
                CompareOp::Gt => FilterOperator::GreaterThan,
                CompareOp::Ge => FilterOperator::GreaterThanOrEq,
                CompareOp::Like { negated: false } => FilterOperator::Like,
                CompareOp::Like { negated: true } => FilterOperator::NotLike,
                CompareOp::ILike { negated: false } => FilterOperator::ILike,
                CompareOp::ILike { negated: true } => FilterOperator::NotILike,
                CompareOp::Regexp { negated: false } => FilterOperator::Regexp,
                CompareOp::Regexp { negated: true } => FilterOperator::NotRegexp,
                CompareOp::Contains { negated: false } => FilterOperator::Contains,
                CompareOp::Contains { negated: true } => FilterOperator::NotContains,
            };
            (op, ConditionValue::Scalar(literal_value(value)))
        }
        ComparisonKind::Between { negated, low, high } => {
            let op = if *negated {
                FilterOperator::NotBetween
            } else {
                FilterOperator::Between
            };
            (op, ConditionValue::Range(literal_value(low), literal_value(high)))
        }
        ComparisonKind::In { negated, values } => {
            let op = if *negated {
                FilterOperator::NotIn
            } else {
                FilterOperator::In
            };
            let values = values.values().iter().map(literal_value).collect();
            (op, ConditionValue::List(values))
        }
        ComparisonKind::Exists { negated } => {
            let op = if *negated {
                FilterOperator::NotExists
            } else {
                FilterOperator::Exists
            };
            (op, ConditionValue::None)
        }
    };
    FilterCondition { key, op, value }
}

/// Convert a source literal into a value: quoted text is unquoted, numbers
/// become `f64`, and a bare key stays as its text.
pub fn literal_value(literal: &ValueLiteral) -> Value {
    match literal {
        ValueLiteral::Quoted(raw) => Value::String(trim_quotes(raw)),
        ValueLiteral::Number(raw) => raw
            .parse::<f64>()
            .map(Value::Number)
            .unwrap_or_else(|_| Value::String(raw.clone())),
        ValueLiteral::Bool(raw) => Value::Bool(raw.eq_ignore_ascii_case("true")),
        ValueLiteral::Key(raw) => Value::String(raw.clone()),
    }
}

impl fmt::Display for FilterCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = self.key.to_key_text();
        match &self.value {
            ConditionValue::Scalar(v) => write!(f, "{} {} {}", key, self.op, v.to_expression_literal()),
            ConditionValue::Range(low, high) => write!(
                f,
                "{} {} {} AND {}",
                key,
                self.op,
                low.to_expression_literal(),
                high.to_expression_literal()
            ),
            ConditionValue::List(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_expression_literal()).collect();
                write!(f, "{} {} ({})", key, self.op, parts.join(", "))
            }
            ConditionValue::None => write!(f, "{} {}", key, self.op),
        }
    }
}

/// Renders the tree as a filter expression that parses back to the same
/// logical shape.
impl fmt::Display for FilterExprNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match self.op {
            FilterOp::Leaf => match self.conditions.first() {
                Some(condition) => condition.to_string(),
                None => String::new(),
            },
            FilterOp::And | FilterOp::Or => {
                let sep = if self.op == FilterOp::And { " AND " } else { " OR " };
                self.children
                    .iter()
                    .map(|child| match child.op {
                        FilterOp::Leaf => child.to_string(),
                        _ if child.negated => child.to_string(),
                        _ => format!("({})", child),
                    })
                    .collect::<Vec<_>>()
                    .join(sep)
            }
        };
        if self.negated && !body.is_empty() {
            write!(f, "NOT ({})", body)
        } else {
            write!(f, "{}", body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::FieldContext;

    fn shape(node: &FilterExprNode) -> String {
        match node.op {
            FilterOp::Leaf => {
                let c = &node.conditions[0];
                format!("{}{}:{}", if node.negated { "!" } else { "" }, c.key.name, c.op)
            }
            op => {
                let inner: Vec<String> = node.children.iter().map(shape).collect();
                format!(
                    "{}{:?}[{}]",
                    if node.negated { "!" } else { "" },
                    op,
                    inner.join(",")
                )
            }
        }
    }

    #[test]
    fn test_blank_is_empty_leaf() {
        let node = extract("  ").unwrap();
        assert!(node.is_empty());
        assert_eq!(node.op, FilterOp::Leaf);
    }

    #[test]
    fn test_single_comparison() {
        let node = extract("resource.service.name = 'redis'").unwrap();
        assert_eq!(node.op, FilterOp::Leaf);
        let c = &node.conditions[0];
        assert_eq!(c.key.name, "service.name");
        assert_eq!(c.key.field_context, FieldContext::Resource);
        assert_eq!(c.op, FilterOperator::Equal);
        assert_eq!(c.value, ConditionValue::Scalar(Value::from("redis")));
    }

    #[test]
    fn test_single_child_groups_collapse() {
        let node = extract("((a = 1))").unwrap();
        assert_eq!(node.op, FilterOp::Leaf);
    }

    #[test]
    fn test_shape() {
        let node = extract("a = 1 AND (b = 2 OR c = 3) AND NOT d EXISTS").unwrap();
        assert_eq!(shape(&node), "And[a:=,Or[b:=,c:=],!d:EXISTS]");
    }

    #[test]
    fn test_double_negation_cancels() {
        let node = extract("NOT (NOT (a = 1 OR b = 2))").unwrap();
        assert_eq!(node.op, FilterOp::Or);
        assert!(!node.negated);
    }

    #[test]
    fn test_in_and_between_values() {
        let node = extract("a IN ('x', 'x', 2) AND b BETWEEN 1 AND 5").unwrap();
        let conditions = node.conditions();
        assert_eq!(
            conditions[0].value,
            ConditionValue::List(vec![Value::from("x"), Value::from("x"), Value::Number(2.0)])
        );
        assert_eq!(
            conditions[1].value,
            ConditionValue::Range(Value::Number(1.0), Value::Number(5.0))
        );
    }

    #[test]
    fn test_non_logical_terms_are_skipped() {
        let node = extract("'timeout' AND a = 1 AND has(body.tags, 'x')").unwrap();
        assert_eq!(node.op, FilterOp::Leaf);
        assert!(extract("'timeout'").unwrap().is_empty());
    }

    #[test]
    fn test_stringify_reparses_to_same_shape() {
        for input in [
            "a = 1 AND (b = 2 OR c = 3)",
            "NOT (a = 'x' AND b != 'y') OR c NOT IN ('p', 'q')",
            "d BETWEEN 1 AND 2 e EXISTS",
            "attribute.http.status_code:number >= 500 AND NOT f LIKE '%x%'",
        ] {
            let node = extract(input).unwrap();
            let again = extract(&node.to_string()).unwrap();
            assert_eq!(shape(&node), shape(&again), "{}", node);
            assert_eq!(node, again);
        }
    }

    #[test]
    fn test_syntax_error() {
        assert!(extract("a = ").is_err());
    }
}
