/// Dashboard variable substitution
///
/// Filters may reference variables as `{{name}}`, `[[name]]` or `$name`
/// (the first two also accept a leading dot). A dynamic variable set to the
/// sentinel `__all__` means "match everything", so the filter that uses it is
/// dropped rather than rendered.
use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::trim_quotes;
use crate::parser::parse;
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Sentinel value of a dynamic variable that selects everything
pub const ALL_VALUES: &str = "__all__";

static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*\.?([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}|\[\[\s*\.?([A-Za-z_][A-Za-z0-9_.\-]*)\s*\]\]|\$([A-Za-z_][A-Za-z0-9_]*)")
        .unwrap()
});

static EXACT_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\{\{\s*\.?([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}|\[\[\s*\.?([A-Za-z_][A-Za-z0-9_.\-]*)\s*\]\]|\$([A-Za-z_][A-Za-z0-9_]*))$")
        .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    Query,
    Custom,
    #[serde(rename = "text")]
    TextBox,
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableItem {
    #[serde(rename = "type")]
    pub kind: VariableType,
    pub value: Value,
}

impl VariableItem {
    pub fn new(kind: VariableType, value: impl Into<Value>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// Whether the variable selects every value, making filters on it moot
    pub fn selects_all(&self) -> bool {
        if self.kind != VariableType::Dynamic {
            return false;
        }
        match &self.value {
            Value::String(s) => s == ALL_VALUES,
            Value::List(items) => {
                matches!(items.as_slice(), [Value::String(s)] if s == ALL_VALUES)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VariableError {
    #[error("variable `{0}` not found")]
    NotFound(String),
}

/// Returns the variable name when `text` is exactly one variable reference.
pub fn is_variable_reference(text: &str) -> Option<String> {
    EXACT_REFERENCE.captures(text).as_ref().and_then(reference_name)
}

fn reference_name(caps: &Captures<'_>) -> Option<String> {
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().to_string())
}

/// Format a value for textual substitution: strings are single-quoted with
/// embedded quotes doubled, lists are bracketed.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", parts.join(", "))
        }
        other => other.to_string(),
    }
}

/// Resolves variable references against a table of variables
#[derive(Debug, Clone, Default)]
pub struct VariableResolver {
    variables: HashMap<String, VariableItem>,
}

impl VariableResolver {
    pub fn new(variables: HashMap<String, VariableItem>) -> Self {
        Self { variables }
    }

    /// Look up a variable. The flag is true when the filter using it must be
    /// skipped.
    pub fn resolve_variable(&self, name: &str) -> Result<(Value, bool), VariableError> {
        let item = self
            .variables
            .get(name)
            .ok_or_else(|| VariableError::NotFound(name.to_string()))?;
        Ok((item.value.clone(), item.selects_all()))
    }

    /// Substitute every variable reference in `expression`.
    ///
    /// Returns the resolved text and whether the whole filter must be
    /// skipped; a skip yields an empty string. References to unknown
    /// variables inside a larger expression are left untouched.
    pub fn resolve_filter_expression(
        &self,
        expression: &str,
    ) -> Result<(String, bool), VariableError> {
        let trimmed = expression.trim();

        if let Some(name) = is_variable_reference(trimmed) {
            let (value, skip) = self.resolve_variable(&name)?;
            if skip {
                return Ok((String::new(), true));
            }
            return Ok((format_value(&value), false));
        }

        let mut skip = false;
        let resolved = REFERENCE.replace_all(expression, |caps: &Captures<'_>| {
            let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            let Some(name) = reference_name(caps) else {
                return whole.to_string();
            };
            match self.resolve_variable(&name) {
                Ok((_, true)) => {
                    skip = true;
                    whole.to_string()
                }
                Ok((value, false)) => format_value(&value),
                Err(_) => whole.to_string(),
            }
        });

        if skip {
            debug!(expression, "filter skipped by variable selecting all values");
            return Ok((String::new(), true));
        }
        Ok((resolved.into_owned(), false))
    }
}

/// Rewrite a filter, replacing `$name` keys and values with variable values.
///
/// Comparisons that use a variable selecting all values are removed, and
/// AND/OR groups left empty disappear with them. Returns an empty string when
/// nothing remains.
pub fn replace_in_filter(
    expression: &str,
    variables: &HashMap<String, VariableItem>,
) -> Result<String, ParseError> {
    let query = parse(expression)?;
    let replacer = Replacer { variables };
    Ok(query
        .expression
        .as_ref()
        .and_then(|expr| replacer.or_expr(expr))
        .unwrap_or_default())
}

enum Substitution {
    Skip,
    Value(Value),
    Unbound,
}

struct Replacer<'a> {
    variables: &'a HashMap<String, VariableItem>,
}

impl Replacer<'_> {
    fn lookup(&self, text: &str) -> Substitution {
        if !text.starts_with('$') {
            return Substitution::Unbound;
        }
        let item = self
            .variables
            .get(text)
            .or_else(|| self.variables.get(&text[1..]));
        match item {
            Some(item) if item.selects_all() => Substitution::Skip,
            Some(item) => Substitution::Value(item.value.clone()),
            None => Substitution::Unbound,
        }
    }

    fn or_expr(&self, expr: &OrExpression) -> Option<String> {
        let parts: Vec<String> = expr.branches.iter().filter_map(|b| self.and_expr(b)).collect();
        (!parts.is_empty()).then(|| parts.join(" OR "))
    }

    fn and_expr(&self, expr: &AndExpression) -> Option<String> {
        let parts: Vec<String> = expr.terms.iter().filter_map(|t| self.unary(t)).collect();
        (!parts.is_empty()).then(|| parts.join(" AND "))
    }

    fn unary(&self, expr: &UnaryExpression) -> Option<String> {
        let inner = self.primary(&expr.primary)?;
        Some(if expr.negated {
            format!("NOT {}", inner)
        } else {
            inner
        })
    }

    fn primary(&self, primary: &Primary) -> Option<String> {
        match primary {
            Primary::Group(inner) => Some(format!("({})", self.or_expr(inner)?)),
            Primary::Comparison(comparison) => self.comparison(comparison),
            Primary::FunctionCall(call) => self.function_call(call),
            Primary::Key(key) => self.key(&key.text),
            Primary::Value(value) => self.value(value),
            Primary::FullText(_) => Some(primary.to_string()),
        }
    }

    fn key(&self, text: &str) -> Option<String> {
        match self.lookup(text) {
            Substitution::Skip => None,
            Substitution::Value(value) => Some(value.to_expression_literal()),
            Substitution::Unbound => Some(text.to_string()),
        }
    }

    fn value(&self, literal: &ValueLiteral) -> Option<String> {
        let text = match literal {
            ValueLiteral::Quoted(raw) => trim_quotes(raw),
            other => other.raw().to_string(),
        };
        match self.lookup(&text) {
            Substitution::Skip => None,
            Substitution::Value(value) => Some(value.to_expression_literal()),
            Substitution::Unbound => Some(literal.raw().to_string()),
        }
    }

    /// Values of a list, splicing in list-valued variables
    fn value_list(&self, literals: &[ValueLiteral]) -> Option<Vec<String>> {
        let mut out = Vec::new();
        for literal in literals {
            let text = match literal {
                ValueLiteral::Quoted(raw) => trim_quotes(raw),
                other => other.raw().to_string(),
            };
            match self.lookup(&text) {
                Substitution::Skip => return None,
                Substitution::Value(Value::List(items)) => {
                    out.extend(items.iter().map(Value::to_expression_literal))
                }
                Substitution::Value(value) => out.push(value.to_expression_literal()),
                Substitution::Unbound => out.push(literal.raw().to_string()),
            }
        }
        Some(out)
    }

    fn comparison(&self, comparison: &Comparison) -> Option<String> {
        let key = self.key(&comparison.key.text)?;
        let rendered = match &comparison.kind {
            ComparisonKind::Binary { op, value } => {
                format!("{} {} {}", key, op.as_str(), self.value(value)?)
            }
            ComparisonKind::Between { negated, low, high } => format!(
                "{} {}BETWEEN {} AND {}",
                key,
                if *negated { "NOT " } else { "" },
                self.value(low)?,
                self.value(high)?
            ),
            ComparisonKind::In { negated, values } => {
                let not = if *negated { "NOT " } else { "" };
                let list = match values {
                    InValues::Single(value) => self.value(value)?,
                    InValues::Paren(values) | InValues::Bracket(values) => {
                        format!("({})", self.value_list(values)?.join(", "))
                    }
                };
                format!("{} {}IN {}", key, not, list)
            }
            ComparisonKind::Exists { negated } => format!(
                "{}{} EXISTS",
                key,
                if *negated { " NOT" } else { "" }
            ),
        };
        Some(rendered)
    }

    fn function_call(&self, call: &FunctionCall) -> Option<String> {
        let mut params = Vec::new();
        for param in &call.params {
            params.push(match param {
                FunctionParam::Key(key) => self.key(&key.text)?,
                FunctionParam::Value(value) => self.value(value)?,
                FunctionParam::Array(values) => format!("[{}]", self.value_list(values)?.join(", ")),
            });
        }
        Some(format!("{}({})", call.name.as_str(), params.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: Vec<(&str, VariableItem)>) -> HashMap<String, VariableItem> {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_reference_syntaxes() {
        assert_eq!(is_variable_reference("{{service}}").as_deref(), Some("service"));
        assert_eq!(is_variable_reference("{{.service}}").as_deref(), Some("service"));
        assert_eq!(is_variable_reference("[[env]]").as_deref(), Some("env"));
        assert_eq!(is_variable_reference("$env").as_deref(), Some("env"));
        assert_eq!(is_variable_reference("x = $env"), None);
        assert_eq!(is_variable_reference("{{a}} {{b}}"), None);
    }

    #[test]
    fn test_selects_all() {
        assert!(VariableItem::new(VariableType::Dynamic, "__all__").selects_all());
        assert!(VariableItem::new(VariableType::Dynamic, vec!["__all__"]).selects_all());
        assert!(!VariableItem::new(VariableType::Custom, "__all__").selects_all());
        assert!(!VariableItem::new(VariableType::Dynamic, vec!["__all__", "x"]).selects_all());
    }

    #[test]
    fn test_resolve_unknown_variable() {
        let resolver = VariableResolver::default();
        assert_eq!(
            resolver.resolve_variable("missing"),
            Err(VariableError::NotFound("missing".to_string()))
        );
    }

    #[test]
    fn test_resolve_skips_all() {
        let resolver = VariableResolver::new(table(vec![(
            "all",
            VariableItem::new(VariableType::Dynamic, "__all__"),
        )]));
        assert_eq!(
            resolver
                .resolve_filter_expression("service.name = {{all}}")
                .unwrap(),
            (String::new(), true)
        );
    }

    #[test]
    fn test_resolve_substitutes_every_syntax() {
        let resolver = VariableResolver::new(table(vec![
            ("svc", VariableItem::new(VariableType::Query, "o'brien")),
            ("envs", VariableItem::new(VariableType::Custom, vec!["prod", "dev"])),
            ("limit", VariableItem::new(VariableType::TextBox, 10.0)),
        ]));
        let (resolved, skip) = resolver
            .resolve_filter_expression(
                "service.name = {{.svc}} AND env IN [[envs]] AND n > $limit AND x = $unknown",
            )
            .unwrap();
        assert!(!skip);
        assert_eq!(
            resolved,
            "service.name = 'o''brien' AND env IN ['prod', 'dev'] AND n > 10 AND x = $unknown"
        );
    }

    #[test]
    fn test_resolve_whole_expression() {
        let resolver = VariableResolver::new(table(vec![(
            "svc",
            VariableItem::new(VariableType::Query, "redis"),
        )]));
        assert_eq!(
            resolver.resolve_filter_expression("  $svc ").unwrap(),
            ("'redis'".to_string(), false)
        );
        assert!(resolver.resolve_filter_expression("$other").is_err());
    }

    #[test]
    fn test_replace_in_filter() {
        let vars = table(vec![
            ("service", VariableItem::new(VariableType::Query, "redis")),
            ("$envs", VariableItem::new(VariableType::Custom, vec!["prod", "dev"])),
            ("all", VariableItem::new(VariableType::Dynamic, "__all__")),
        ]);

        assert_eq!(
            replace_in_filter("service.name = $service AND env IN $envs", &vars).unwrap(),
            "service.name = 'redis' AND env IN ['prod', 'dev']"
        );
        assert_eq!(
            replace_in_filter("service.name = $all AND status = 200", &vars).unwrap(),
            "status = 200"
        );
        assert_eq!(
            replace_in_filter("(a IN ($all, 'x')) OR b = 1", &vars).unwrap(),
            "b = 1"
        );
        assert_eq!(replace_in_filter("a = $all", &vars).unwrap(), "");
        assert_eq!(
            replace_in_filter("env IN ($envs, 'qa')", &vars).unwrap(),
            "env IN ('prod', 'dev', 'qa')"
        );
        assert_eq!(
            replace_in_filter("x = '$nothing' AND NOT y EXISTS", &vars).unwrap(),
            "x = '$nothing' AND NOT y EXISTS"
        );
    }
}
