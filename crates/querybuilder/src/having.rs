/// `Having` expression rewriting and validation
///
/// Users write post-aggregation filters in terms of what they asked for:
/// an alias (`total_count > 100`), the aggregation itself
/// (`count() > 100`) or, for metrics, the metric and its aggregations
/// (`avg(cpu_usage) > 80`). The query runs with internal result column
/// names, so every reference is mapped to its column before the
/// expression reaches SQL.
///
/// Substitution order matters:
/// 1. Quoted literals are swapped for placeholders so their contents are
///    never rewritten.
/// 2. References are replaced longest first, so a short alias cannot
///    match inside a longer expression.
/// 3. Placeholders are restored.
use crate::error::{QueryBuilderError, Result};
use crate::functions;
use filterql::having::{parse_having, HavingReference};
use filterql::SyntaxError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Column every metric aggregation is selected into
pub const METRIC_VALUE_COLUMN: &str = "value";

static QUOTED_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*""#).unwrap());
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new("\x00([0-9]+)\x00").unwrap());
static LITERAL_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new("\x01([0-9]+)\x01").unwrap());

/// One aggregation of a traces or logs query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    pub expression: String,
    #[serde(default)]
    pub alias: Option<String>,
}

impl Aggregation {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.alias = (!alias.is_empty()).then_some(alias);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeAggregation {
    #[default]
    Unspecified,
    Latest,
    Sum,
    Avg,
    Min,
    Max,
    Count,
    CountDistinct,
    Rate,
    Increase,
}

impl TimeAggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeAggregation::Unspecified => "",
            TimeAggregation::Latest => "latest",
            TimeAggregation::Sum => "sum",
            TimeAggregation::Avg => "avg",
            TimeAggregation::Min => "min",
            TimeAggregation::Max => "max",
            TimeAggregation::Count => "count",
            TimeAggregation::CountDistinct => "count_distinct",
            TimeAggregation::Rate => "rate",
            TimeAggregation::Increase => "increase",
        }
    }

    pub fn from_name(name: &str) -> Option<TimeAggregation> {
        [
            TimeAggregation::Latest,
            TimeAggregation::Sum,
            TimeAggregation::Avg,
            TimeAggregation::Min,
            TimeAggregation::Max,
            TimeAggregation::Count,
            TimeAggregation::CountDistinct,
            TimeAggregation::Rate,
            TimeAggregation::Increase,
        ]
        .into_iter()
        .find(|agg| agg.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for TimeAggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceAggregation {
    #[default]
    Unspecified,
    Sum,
    Avg,
    Min,
    Max,
    Count,
    P50,
    P75,
    P90,
    P95,
    P99,
}

impl SpaceAggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpaceAggregation::Unspecified => "",
            SpaceAggregation::Sum => "sum",
            SpaceAggregation::Avg => "avg",
            SpaceAggregation::Min => "min",
            SpaceAggregation::Max => "max",
            SpaceAggregation::Count => "count",
            SpaceAggregation::P50 => "p50",
            SpaceAggregation::P75 => "p75",
            SpaceAggregation::P90 => "p90",
            SpaceAggregation::P95 => "p95",
            SpaceAggregation::P99 => "p99",
        }
    }

    pub fn from_name(name: &str) -> Option<SpaceAggregation> {
        [
            SpaceAggregation::Sum,
            SpaceAggregation::Avg,
            SpaceAggregation::Min,
            SpaceAggregation::Max,
            SpaceAggregation::Count,
            SpaceAggregation::P50,
            SpaceAggregation::P75,
            SpaceAggregation::P90,
            SpaceAggregation::P95,
            SpaceAggregation::P99,
        ]
        .into_iter()
        .find(|agg| agg.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for SpaceAggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The aggregation of a metrics query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricAggregation {
    pub metric_name: String,
    #[serde(default)]
    pub time_aggregation: TimeAggregation,
    #[serde(default)]
    pub space_aggregation: SpaceAggregation,
}

/// Reference text to result column
pub type ColumnMap = BTreeMap<String, String>;

pub fn traces_column_map(aggregations: &[Aggregation]) -> ColumnMap {
    let mut map = ColumnMap::new();
    for (i, aggregation) in aggregations.iter().enumerate() {
        let column = format!("__result_{}", i);
        map.entry(aggregation.expression.clone())
            .or_insert_with(|| column.clone());
        if let Some(alias) = &aggregation.alias {
            map.insert(alias.clone(), column.clone());
        }
        map.insert(format!("__result{}", i), column);
    }
    if aggregations.len() == 1 {
        map.insert("__result".to_string(), "__result_0".to_string());
    }
    map
}

pub fn metrics_column_map(aggregation: &MetricAggregation) -> ColumnMap {
    let metric = &aggregation.metric_name;
    let time = aggregation.time_aggregation;
    let space = aggregation.space_aggregation;
    let value = METRIC_VALUE_COLUMN.to_string();

    let mut map = ColumnMap::new();
    if time != TimeAggregation::Unspecified {
        map.insert(format!("{}({})", time, metric), value.clone());
    }
    if space != SpaceAggregation::Unspecified {
        map.insert(format!("{}({})", space, metric), value.clone());
    }
    if time != TimeAggregation::Unspecified && space != SpaceAggregation::Unspecified {
        map.insert(format!("{}({}({}))", space, time, metric), value.clone());
    }
    map.insert(metric.clone(), value.clone());
    map.insert("__result".to_string(), value.clone());
    map.insert("__result0".to_string(), value);
    map
}

/// Rewrite a `Having` expression of a traces query
pub fn rewrite_for_traces(expression: &str, aggregations: &[Aggregation]) -> Result<String> {
    rewrite(expression, &traces_column_map(aggregations))
}

/// Rewrite a `Having` expression of a logs query
pub fn rewrite_for_logs(expression: &str, aggregations: &[Aggregation]) -> Result<String> {
    rewrite(expression, &traces_column_map(aggregations))
}

/// Rewrite a `Having` expression of a metrics query
pub fn rewrite_for_metrics(expression: &str, aggregation: &MetricAggregation) -> Result<String> {
    rewrite(expression, &metrics_column_map(aggregation))
}

/// Validate `expression` against `columns` and substitute every reference
/// with its result column
pub fn rewrite(expression: &str, columns: &ColumnMap) -> Result<String> {
    if expression.trim().is_empty() {
        return Ok(String::new());
    }
    if expression.contains('\'') || expression.contains('"') {
        return Err(QueryBuilderError::validation(
            "`Having` expression contains string literals",
            vec!["Aggregator results are numeric".to_string()],
        ));
    }

    let tree = parse_having(expression).map_err(syntax_error)?;
    if let Some(tree) = &tree {
        validate_references(&tree.references(), columns)?;
    }

    let rewritten = substitute(expression, columns)?;
    parse_having(&rewritten).map_err(syntax_error)?;
    debug!(expression = %expression, rewritten = %rewritten, "rewrote having expression");
    Ok(rewritten)
}

fn syntax_error(errors: Vec<SyntaxError>) -> QueryBuilderError {
    let messages = errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    QueryBuilderError::validation("Syntax error in `Having` expression", vec![messages])
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn validate_references(references: &[HavingReference], columns: &ColumnMap) -> Result<()> {
    let targets: BTreeSet<&str> = columns.values().map(String::as_str).collect();
    let canonical: BTreeSet<String> = columns.keys().map(|k| strip_whitespace(k)).collect();

    let mut invalid: Vec<&str> = Vec::new();
    let mut has_function = false;
    for reference in references {
        let valid = match reference {
            HavingReference::Identifier(name) => {
                columns.contains_key(name) || targets.contains(name.as_str())
            }
            HavingReference::Call { text, .. } => canonical.contains(&strip_whitespace(text)),
        };
        if valid {
            continue;
        }
        if let HavingReference::Call { name, .. } = reference {
            has_function |= functions::is_aggregate(name);
        }
        let text = reference.text();
        if !invalid.contains(&text) {
            invalid.push(text);
        }
    }

    if invalid.is_empty() {
        return Ok(());
    }
    if has_function {
        return Err(QueryBuilderError::validation(
            "Functions are not allowed in `Having` expression",
            Vec::new(),
        ));
    }
    let valid: Vec<&str> = columns
        .keys()
        .map(String::as_str)
        .filter(|k| !targets.contains(k))
        .collect();
    Err(QueryBuilderError::validation(
        format!(
            "Invalid references in `Having` expression: [{}]",
            invalid.join(", ")
        ),
        vec![format!("Valid references are: [{}]", valid.join(", "))],
    ))
}

/// Pattern matching a reference. Call-shaped references tolerate
/// whitespace around their punctuation and have no trailing boundary.
fn reference_pattern(reference: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut pattern = String::new();
    if reference.chars().next().is_some_and(is_word) {
        pattern.push_str(r"\b");
    }
    if reference.contains('(') {
        for c in strip_whitespace(reference).chars() {
            match c {
                '(' => pattern.push_str(r"\s*\(\s*"),
                ')' => pattern.push_str(r"\s*\)"),
                ',' => pattern.push_str(r"\s*,\s*"),
                _ => pattern.push_str(&regex::escape(&c.to_string())),
            }
        }
    } else {
        pattern.push_str(&regex::escape(reference));
        if reference.chars().last().is_some_and(is_word) {
            pattern.push_str(r"\b");
        }
    }
    pattern
}

fn substitute(expression: &str, columns: &ColumnMap) -> Result<String> {
    let mut literals: Vec<String> = Vec::new();
    let mut text = QUOTED_LITERAL
        .replace_all(expression, |caps: &regex::Captures| {
            literals.push(caps[0].to_string());
            format!("\x01{}\x01", literals.len() - 1)
        })
        .into_owned();

    let mut references: Vec<(&String, &String)> = columns.iter().collect();
    references.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

    for (i, (reference, _)) in references.iter().enumerate() {
        let re = Regex::new(&reference_pattern(reference))
            .map_err(|e| QueryBuilderError::InvalidArgument(e.to_string()))?;
        text = re
            .replace_all(&text, format!("\x00{}\x00", i).as_str())
            .into_owned();
    }

    let text = PLACEHOLDER.replace_all(&text, |caps: &regex::Captures| {
        caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|i| references.get(i))
            .map(|(_, column)| column.to_string())
            .unwrap_or_default()
    });
    let text = LITERAL_PLACEHOLDER.replace_all(&text, |caps: &regex::Captures| {
        caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|i| literals.get(i))
            .cloned()
            .unwrap_or_default()
    });
    Ok(text.into_owned())
}
