/// WHERE-clause compilation
///
/// Walks the filter parse tree once, post-order, returning a SQL fragment
/// per node. Values are bound through a shared `SqlBuilder`, so the
/// positional args line up with the `?` placeholders of the final clause.
///
/// A key may resolve to several physical fields. Each candidate gets its own
/// condition and the conditions are ORed (ANDed for negative operators), so
/// a search covers every column the name could mean.
use crate::error::{
    Diagnostic, DiagnosticKind, QueryBuilderError, Result, BODY_ONLY_FUNCTION_URL, FIELD_CONTEXT_URL,
    HAS_TOKEN_URL, KEY_NOT_FOUND_URL, STRING_MATCHING_URL,
};
use crate::services::{ConditionBuilder, FieldKeys, FieldMapper};
use crate::sql::SqlBuilder;
use filterql::ast::{
    AndExpression, CompareOp, Comparison, ComparisonKind, FullText, FunctionCall, FunctionName,
    FunctionParam, Key, OrExpression, Primary, UnaryExpression, ValueLiteral,
};
use filterql::filter_tree::literal_value;
use filterql::lexer::trim_quotes;
use filterql::parser::Parser;
use filterql::{parse_key, FieldContext, FilterOperator, TelemetryFieldKey, Value, VariableItem};
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

pub const DEFAULT_SUGGESTION_THRESHOLD: f64 = 0.75;

/// Inputs of one WHERE-clause compilation
#[derive(Clone)]
pub struct WhereClauseOptions<'a> {
    pub field_mapper: &'a dyn FieldMapper,
    pub condition_builder: &'a dyn ConditionBuilder,
    pub field_keys: &'a FieldKeys,
    /// Column searched by full-text terms; `None` disables full-text search
    pub full_text_column: Option<TelemetryFieldKey>,
    /// Drop resource conditions, which a resource sub-query already applies
    pub skip_resource_filter: bool,
    pub skip_full_text_filter: bool,
    pub skip_function_calls: bool,
    /// Drop comparisons on unknown keys instead of failing
    pub ignore_not_found_keys: bool,
    pub variables: HashMap<String, VariableItem>,
    /// Minimum similarity for a "Did you mean" suggestion
    pub suggestion_threshold: f64,
}

impl<'a> WhereClauseOptions<'a> {
    pub fn new(
        field_mapper: &'a dyn FieldMapper,
        condition_builder: &'a dyn ConditionBuilder,
        field_keys: &'a FieldKeys,
    ) -> Self {
        Self {
            field_mapper,
            condition_builder,
            field_keys,
            full_text_column: None,
            skip_resource_filter: false,
            skip_full_text_filter: false,
            skip_function_calls: false,
            ignore_not_found_keys: false,
            variables: HashMap::new(),
            suggestion_threshold: DEFAULT_SUGGESTION_THRESHOLD,
        }
    }

    pub fn with_full_text_column(mut self, column: TelemetryFieldKey) -> Self {
        self.full_text_column = Some(column);
        self
    }

    pub fn with_variables(mut self, variables: HashMap<String, VariableItem>) -> Self {
        self.variables = variables;
        self
    }
}

/// A compiled WHERE clause and the values bound to its placeholders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedWhereClause {
    pub where_clause: String,
    pub args: Vec<Value>,
    pub warnings: Vec<Diagnostic>,
}

impl PreparedWhereClause {
    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(|w| w.to_string()).collect()
    }

    /// Documentation page for the first warning that names one
    pub fn warnings_doc_url(&self) -> Option<&'static str> {
        self.warnings.iter().find_map(|w| w.doc_url)
    }
}

/// Compile a filter expression into a WHERE clause.
///
/// Syntax errors are reported all at once, before any SQL is generated.
/// Semantic errors (unknown keys, bad function calls) are likewise
/// collected over the whole expression. An expression that filters nothing
/// compiles to `true`.
pub fn prepare_where_clause(query: &str, opts: &WhereClauseOptions<'_>) -> Result<PreparedWhereClause> {
    debug!(expression = %query, "preparing where clause");
    let output = Parser::new(query).parse();
    if !output.errors.is_empty() {
        return Err(QueryBuilderError::syntax(
            output.errors.iter().map(Diagnostic::from).collect(),
        ));
    }

    let skip_resource_filter = opts.skip_resource_filter && !output.has_or();
    let mut visitor = WhereClauseVisitor::new(opts, skip_resource_filter);
    let condition = match &output.query.expression {
        Some(expr) => visitor.visit_or(expr),
        None => String::new(),
    };

    if !visitor.errors.is_empty() {
        return Err(QueryBuilderError::semantic(visitor.errors));
    }

    let where_clause = if condition.is_empty() {
        "true".to_string()
    } else {
        condition
    };
    let args = visitor.builder.into_args();
    debug!(args = args.len(), "prepared where clause");
    Ok(PreparedWhereClause {
        where_clause,
        args,
        warnings: visitor.warnings,
    })
}

/// Full-text terms are regular expressions; text that does not compile as
/// one is searched literally.
pub fn format_full_text_search(text: &str) -> String {
    if Regex::new(text).is_ok() {
        text.to_string()
    } else {
        regex::escape(text)
    }
}

struct WhereClauseVisitor<'a> {
    opts: &'a WhereClauseOptions<'a>,
    builder: SqlBuilder,
    skip_resource_filter: bool,
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
    keys_with_warnings: HashSet<String>,
}

impl<'a> WhereClauseVisitor<'a> {
    fn new(opts: &'a WhereClauseOptions<'a>, skip_resource_filter: bool) -> Self {
        Self {
            opts,
            builder: SqlBuilder::new(),
            skip_resource_filter,
            errors: Vec::new(),
            warnings: Vec::new(),
            keys_with_warnings: HashSet::new(),
        }
    }

    fn error(&mut self, kind: DiagnosticKind, message: String) {
        self.errors.push(Diagnostic::error(kind, message));
    }

    fn visit_or(&mut self, expr: &OrExpression) -> String {
        let parts: Vec<String> = expr
            .branches
            .iter()
            .map(|branch| self.visit_and(branch))
            .filter(|part| !part.is_empty())
            .collect();
        self.builder.or(&parts)
    }

    fn visit_and(&mut self, expr: &AndExpression) -> String {
        let parts: Vec<String> = expr
            .terms
            .iter()
            .map(|term| self.visit_unary(term))
            .filter(|part| !part.is_empty())
            .collect();
        self.builder.and(&parts)
    }

    fn visit_unary(&mut self, expr: &UnaryExpression) -> String {
        let result = self.visit_primary(&expr.primary);
        if expr.negated && !result.is_empty() {
            format!("NOT ({})", result)
        } else {
            result
        }
    }

    fn visit_primary(&mut self, primary: &Primary) -> String {
        match primary {
            Primary::Group(inner) => {
                let condition = self.visit_or(inner);
                if condition.is_empty() {
                    condition
                } else {
                    format!("({})", condition)
                }
            }
            Primary::Comparison(comparison) => self.visit_comparison(comparison),
            Primary::FunctionCall(call) => self.visit_function_call(call),
            Primary::FullText(FullText::Quoted(raw)) => self.full_text_condition(&trim_quotes(raw)),
            Primary::FullText(FullText::Free(text)) => self.full_text_condition(text),
            Primary::Key(key) => self.full_text_condition(&key.text),
            Primary::Value(ValueLiteral::Quoted(raw)) => self.full_text_condition(&trim_quotes(raw)),
            Primary::Value(literal) => self.full_text_condition(literal.raw()),
        }
    }

    fn full_text_condition(&mut self, text: &str) -> String {
        let opts = self.opts;
        if opts.skip_full_text_filter {
            return String::new();
        }
        let Some(column) = &opts.full_text_column else {
            self.error(
                DiagnosticKind::FullTextUnsupported,
                "full text search is not supported".to_string(),
            );
            return String::new();
        };
        let value = Value::String(format_full_text_search(text));
        match opts.condition_builder.condition_for(
            column,
            FilterOperator::Regexp,
            &value,
            &mut self.builder,
        ) {
            Ok(condition) => condition,
            Err(err) => {
                self.error(
                    DiagnosticKind::ConditionFailed,
                    format!("failed to build full text search condition: {}", err),
                );
                String::new()
            }
        }
    }

    fn visit_comparison(&mut self, comparison: &Comparison) -> String {
        let mut keys = self.visit_key(&comparison.key);
        if keys.is_empty() && self.opts.ignore_not_found_keys {
            return String::new();
        }
        if self.skip_resource_filter {
            keys.retain(|k| k.field_context != FieldContext::Resource);
            if keys.is_empty() {
                return String::new();
            }
        }

        let opts = self.opts;
        match &comparison.kind {
            ComparisonKind::Exists { negated } => {
                let op = if *negated {
                    FilterOperator::NotExists
                } else {
                    FilterOperator::Exists
                };
                self.conditions(&keys, op, &Value::Null)
            }
            ComparisonKind::In { negated, values } => {
                let mut values: Vec<Value> = values.values().iter().map(literal_value).collect();
                if let [Value::String(name)] = values.as_slice() {
                    if let Some((var_name, item)) = lookup_variable(&opts.variables, name) {
                        if item.selects_all() {
                            return String::new();
                        }
                        values = match &item.value {
                            Value::List(items) if items.is_empty() => {
                                self.error(DiagnosticKind::EmptyVariable, empty_variable_message(&var_name));
                                return String::new();
                            }
                            Value::List(items) => items.clone(),
                            other => vec![other.clone()],
                        };
                    }
                }
                let op = if *negated {
                    FilterOperator::NotIn
                } else {
                    FilterOperator::In
                };
                self.conditions(&keys, op, &Value::List(values))
            }
            ComparisonKind::Between { negated, low, high } => {
                let op = if *negated {
                    FilterOperator::NotBetween
                } else {
                    FilterOperator::Between
                };
                let bounds = Value::List(vec![literal_value(low), literal_value(high)]);
                self.conditions(&keys, op, &bounds)
            }
            ComparisonKind::Binary { op, value } => {
                let mut value = literal_value(value);
                if let Value::String(name) = &value {
                    if let Some((var_name, item)) = lookup_variable(&opts.variables, name) {
                        value = match &item.value {
                            Value::List(items) => match items.first() {
                                Some(first) => first.clone(),
                                None => {
                                    self.error(
                                        DiagnosticKind::EmptyVariable,
                                        empty_variable_message(&var_name),
                                    );
                                    return String::new();
                                }
                            },
                            other => other.clone(),
                        };
                    }
                }
                let op = filter_operator(*op);
                if matches!(
                    op,
                    FilterOperator::Like
                        | FilterOperator::NotLike
                        | FilterOperator::ILike
                        | FilterOperator::NotILike
                ) {
                    self.warn_if_like_without_wildcards(op, &value);
                }
                self.conditions(&keys, op, &value)
            }
        }
    }

    fn warn_if_like_without_wildcards(&mut self, op: FilterOperator, value: &Value) {
        let has_wildcards = value
            .as_str()
            .map(|s| s.contains('%') || s.contains('_'))
            .unwrap_or(false);
        if has_wildcards {
            return;
        }
        let name = match op {
            FilterOperator::ILike | FilterOperator::NotILike => "ILIKE",
            _ => "LIKE",
        };
        self.warnings.push(
            Diagnostic::warning(
                DiagnosticKind::LikeWithoutWildcards,
                format!(
                    "{} operator used without wildcards (% or _). Consider using = operator for exact matches or add wildcards for pattern matching.",
                    name
                ),
            )
            .with_doc_url(STRING_MATCHING_URL),
        );
    }

    /// One condition per candidate key
    fn conditions(&mut self, keys: &[TelemetryFieldKey], op: FilterOperator, value: &Value) -> String {
        let mut conditions = Vec::with_capacity(keys.len());
        for key in keys {
            match self
                .opts
                .condition_builder
                .condition_for(key, op, value, &mut self.builder)
            {
                Ok(condition) => conditions.push(condition),
                Err(err) => {
                    self.error(
                        DiagnosticKind::ConditionFailed,
                        format!("failed to build condition: {}", err),
                    );
                    return String::new();
                }
            }
        }
        if op.is_negative() {
            self.builder.and(&conditions)
        } else {
            self.builder.or(&conditions)
        }
    }

    fn visit_function_call(&mut self, call: &FunctionCall) -> String {
        if self.opts.skip_function_calls {
            return String::new();
        }
        let name = call.name.as_str();
        if call.params.len() < 2 {
            self.error(
                DiagnosticKind::FunctionArguments,
                format!("function `{}` expects key and value parameters", name),
            );
            return String::new();
        }
        let FunctionParam::Key(key_param) = &call.params[0] else {
            self.error(
                DiagnosticKind::FunctionArguments,
                format!("function `{}` expects key parameter to be a field key", name),
            );
            return String::new();
        };
        let keys = self.visit_key(key_param);

        let values: Vec<Value> = call.params[1..]
            .iter()
            .map(|param| match param {
                FunctionParam::Key(key) => Value::String(key.text.clone()),
                FunctionParam::Value(literal) => literal_value(literal),
                FunctionParam::Array(items) => Value::List(items.iter().map(literal_value).collect()),
            })
            .collect();
        let list = match values.as_slice() {
            [Value::List(items)] => Value::List(items.clone()),
            _ => Value::List(values.clone()),
        };

        let mut conditions = Vec::new();
        for key in &keys {
            if call.name == FunctionName::HasToken {
                if key.name != "body" {
                    self.errors.push(
                        Diagnostic::error(
                            DiagnosticKind::UnsupportedFunction,
                            format!("function `{}` only supports body field as first parameter", name),
                        )
                        .with_doc_url(HAS_TOKEN_URL),
                    );
                }
                let Some(token @ Value::String(_)) = values.first() else {
                    self.errors.push(
                        Diagnostic::error(
                            DiagnosticKind::FunctionArguments,
                            format!("function `{}` expects value parameter to be a string", name),
                        )
                        .with_doc_url(HAS_TOKEN_URL),
                    );
                    return String::new();
                };
                let placeholder = self.builder.var(token.clone());
                conditions.push(format!("hasToken(LOWER({}), LOWER({}))", key.name, placeholder));
                continue;
            }

            if key.field_context != FieldContext::Body {
                self.errors.push(
                    Diagnostic::error(
                        DiagnosticKind::UnsupportedFunction,
                        format!("function `{}` supports only body JSON search", name),
                    )
                    .with_doc_url(BODY_ONLY_FUNCTION_URL),
                );
                return String::new();
            }
            let field = match self.opts.field_mapper.json_key_to_field(key) {
                Ok(field) => field,
                Err(err) => {
                    self.error(
                        DiagnosticKind::ConditionFailed,
                        format!("failed to build condition: {}", err),
                    );
                    return String::new();
                }
            };
            let condition = match call.name {
                FunctionName::Has => {
                    let value = values.first().cloned().unwrap_or_default();
                    format!("has({}, {})", field, self.builder.var(value))
                }
                FunctionName::HasAny => format!("hasAny({}, {})", field, self.builder.var(list.clone())),
                FunctionName::HasAll | FunctionName::HasToken => {
                    format!("hasAll({}, {})", field, self.builder.var(list.clone()))
                }
            };
            conditions.push(condition);
        }
        self.builder.or(&conditions)
    }

    /// Candidate field keys for a key token
    fn visit_key(&mut self, token: &Key) -> Vec<TelemetryFieldKey> {
        let field_key = parse_key(&token.text);
        let name = field_key.name.clone();

        let mut candidates: Vec<TelemetryFieldKey> = self
            .opts
            .field_keys
            .get(&name)
            .cloned()
            .unwrap_or_default();
        if field_key.field_context.is_specified() {
            candidates.retain(|k| k.field_context == field_key.field_context);
        }
        if field_key.field_data_type.is_specified() {
            candidates.retain(|k| k.field_data_type == field_key.field_data_type);
        }
        if field_key.field_context == FieldContext::Body && !name.is_empty() {
            candidates.push(field_key.clone());
        }

        if candidates.is_empty() {
            let with_context = format!("{}.{}", field_key.field_context, name);
            if let Some(found) = self.opts.field_keys.get(&with_context) {
                if !found.is_empty() {
                    return found.clone();
                }
            }

            if field_key.field_context == FieldContext::Body && name.is_empty() {
                self.errors.push(
                    Diagnostic::error(
                        DiagnosticKind::MissingBodyKey,
                        "missing key for body json search - expected key of the form `body.key` (ex: `body.status`)",
                    )
                    .at(token.line, token.column),
                );
            } else if !self.opts.ignore_not_found_keys {
                let mut message = format!("key `{}` not found", name);
                if let Some(suggestion) = self.suggest(&name) {
                    message.push_str(&format!(" Did you mean `{}`?", suggestion));
                }
                self.errors.push(
                    Diagnostic::error(DiagnosticKind::UnknownKey, message)
                        .with_doc_url(KEY_NOT_FOUND_URL)
                        .at(token.line, token.column),
                );
            }
            return candidates;
        }

        if candidates.len() > 1 {
            let listed: Vec<String> = candidates.iter().map(|k| k.to_string()).collect();
            let mut message = format!(
                "Key `{}` is ambiguous, found {} different combinations of field context / data type: [{}].",
                name,
                candidates.len(),
                listed.join(" ")
            );
            let has_resource = candidates.iter().any(|k| k.field_context == FieldContext::Resource);
            let has_attribute = candidates.iter().any(|k| k.field_context == FieldContext::Attribute);
            if has_resource && has_attribute {
                candidates.retain(|k| k.field_context == FieldContext::Resource);
                message.push_str(&format!(
                    " Using `resource` context by default. To query attributes explicitly, use the fully qualified name (e.g., 'attribute.{}')",
                    name
                ));
            }
            if self.keys_with_warnings.insert(name.clone()) {
                self.warnings.push(
                    Diagnostic::warning(DiagnosticKind::AmbiguousKey, message)
                        .with_doc_url(FIELD_CONTEXT_URL)
                        .at(token.line, token.column),
                );
            }
            warn!(field_key_name = %name, "ambiguous key");
        }

        candidates
    }

    fn suggest(&self, name: &str) -> Option<String> {
        let mut best: Option<(f64, &String)> = None;
        let mut known: Vec<&String> = self.opts.field_keys.keys().collect();
        known.sort();
        for candidate in known {
            let score = similarity(name, candidate);
            if score < self.opts.suggestion_threshold {
                continue;
            }
            if best.map(|(top, _)| score > top).unwrap_or(true) {
                best = Some((score, candidate));
            }
        }
        best.map(|(_, candidate)| candidate.clone())
    }
}

/// Look a value up as a variable name, verbatim first and then without its
/// `$` prefix.
fn lookup_variable<'v>(
    variables: &'v HashMap<String, VariableItem>,
    text: &str,
) -> Option<(String, &'v VariableItem)> {
    if let Some(item) = variables.get(text) {
        return Some((text.trim_start_matches('$').to_string(), item));
    }
    let name = text.strip_prefix('$')?;
    variables.get(name).map(|item| (name.to_string(), item))
}

fn empty_variable_message(name: &str) -> String {
    format!(
        "malformed request payload: variable `{}` used in expression has an empty list value",
        name
    )
}

fn filter_operator(op: CompareOp) -> FilterOperator {
    match op {
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
    }
}

/// Edit distance over chars
fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Normalized similarity in `[0, 1]`; identical strings score 1.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clickhouse::{ClickHouseConditionBuilder, ClickHouseFieldMapper};
    use filterql::{FieldDataType, VariableType};

    fn field_keys() -> FieldKeys {
        let mut keys = FieldKeys::new();
        let mut add = |key: TelemetryFieldKey| keys.entry(key.name.clone()).or_default().push(key);
        add(TelemetryFieldKey::new("service.name")
            .with_context(FieldContext::Resource)
            .with_data_type(FieldDataType::String));
        add(TelemetryFieldKey::new("http.status_code")
            .with_context(FieldContext::Attribute)
            .with_data_type(FieldDataType::Number));
        add(TelemetryFieldKey::new("duration")
            .with_context(FieldContext::Attribute)
            .with_data_type(FieldDataType::Number));
        add(TelemetryFieldKey::new("duration")
            .with_context(FieldContext::Attribute)
            .with_data_type(FieldDataType::String));
        add(TelemetryFieldKey::new("env")
            .with_context(FieldContext::Resource)
            .with_data_type(FieldDataType::String));
        add(TelemetryFieldKey::new("env")
            .with_context(FieldContext::Attribute)
            .with_data_type(FieldDataType::String));
        add(TelemetryFieldKey::new("body")
            .with_context(FieldContext::Log)
            .with_data_type(FieldDataType::String));
        keys
    }

    fn compile(expr: &str, configure: impl FnOnce(&mut WhereClauseOptions<'_>)) -> Result<PreparedWhereClause> {
        let mapper = ClickHouseFieldMapper::logs();
        let builder = ClickHouseConditionBuilder::new(mapper.clone());
        let keys = field_keys();
        let mut opts = WhereClauseOptions::new(&mapper, &builder, &keys)
            .with_full_text_column(TelemetryFieldKey::new("body").with_context(FieldContext::Log));
        configure(&mut opts);
        prepare_where_clause(expr, &opts)
    }

    fn messages(err: &QueryBuilderError) -> Vec<String> {
        err.additional()
    }

    #[test]
    fn test_simple_equality() {
        let prepared = compile("service.name = 'redis'", |_| {}).unwrap();
        assert_eq!(
            prepared.where_clause,
            "(resources_string['service.name'] = ? AND mapContains(resources_string, 'service.name') = ?)"
        );
        assert_eq!(
            prepared.args,
            vec![Value::String("redis".to_string()), Value::Bool(true)]
        );
        assert!(prepared.warnings.is_empty());
    }

    #[test]
    fn test_blank_is_true() {
        let prepared = compile("   ", |_| {}).unwrap();
        assert_eq!(prepared.where_clause, "true");
        assert!(prepared.args.is_empty());
    }

    #[test]
    fn test_colliding_key_searches_every_column() {
        let prepared = compile("duration > 100", |_| {}).unwrap();
        assert_eq!(
            prepared.where_clause,
            "((attributes_number['duration'] > ? AND mapContains(attributes_number, 'duration') = ?) OR (toFloat64OrNull(attributes_string['duration']) > ? AND mapContains(attributes_string, 'duration') = ?))"
        );
        assert_eq!(prepared.args.len(), 4);
        assert_eq!(prepared.warnings.len(), 1);
        assert!(prepared.warnings[0]
            .message
            .starts_with("Key `duration` is ambiguous, found 2 different combinations"));
    }

    #[test]
    fn test_negative_operator_joins_with_and() {
        let prepared = compile("duration != 100", |_| {}).unwrap();
        assert_eq!(
            prepared.where_clause,
            "(attributes_number['duration'] <> ? AND toFloat64OrNull(attributes_string['duration']) <> ?)"
        );
    }

    #[test]
    fn test_resource_preferred_over_attribute() {
        let prepared = compile("env = 'prod' AND env = 'prod'", |_| {}).unwrap();
        assert_eq!(
            prepared.where_clause,
            "((resources_string['env'] = ? AND mapContains(resources_string, 'env') = ?) AND (resources_string['env'] = ? AND mapContains(resources_string, 'env') = ?))"
        );
        assert_eq!(prepared.warnings.len(), 1, "warned once per key");
        assert_eq!(prepared.warnings_doc_url(), Some(FIELD_CONTEXT_URL));
        assert!(prepared.warnings[0]
            .message
            .ends_with("use the fully qualified name (e.g., 'attribute.env')"));
    }

    #[test]
    fn test_not_and_groups() {
        let prepared = compile(
            "NOT (service.name = 'a' OR http.status_code >= 500)",
            |_| {},
        )
        .unwrap();
        assert_eq!(
            prepared.where_clause,
            "NOT ((((resources_string['service.name'] = ? AND mapContains(resources_string, 'service.name') = ?) OR (attributes_number['http.status_code'] >= ? AND mapContains(attributes_number, 'http.status_code') = ?))))"
        );
    }

    #[test]
    fn test_unknown_key_with_suggestion() {
        let err = compile("servce.name = 'a' AND nothing_like_it = 1", |_| {}).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Found 2 errors while parsing the search expression."
        );
        assert_eq!(
            messages(&err),
            vec![
                "key `servce.name` not found Did you mean `service.name`?",
                "key `nothing_like_it` not found",
            ]
        );
        assert_eq!(err.url(), Some(KEY_NOT_FOUND_URL));
    }

    #[test]
    fn test_ignore_not_found_keys() {
        let prepared = compile("missing = 1 AND service.name = 'a'", |opts| {
            opts.ignore_not_found_keys = true;
        })
        .unwrap();
        assert_eq!(
            prepared.where_clause,
            "(resources_string['service.name'] = ? AND mapContains(resources_string, 'service.name') = ?)"
        );
    }

    #[test]
    fn test_skip_resource_filter() {
        let prepared = compile("service.name = 'a' AND http.status_code = 200", |opts| {
            opts.skip_resource_filter = true;
        })
        .unwrap();
        assert_eq!(
            prepared.where_clause,
            "(attributes_number['http.status_code'] = ? AND mapContains(attributes_number, 'http.status_code') = ?)"
        );

        let prepared = compile("service.name = 'a' OR http.status_code = 200", |opts| {
            opts.skip_resource_filter = true;
        })
        .unwrap();
        assert!(prepared.where_clause.contains("resources_string"));
    }

    #[test]
    fn test_syntax_errors() {
        let err = compile("service.name = ", |_| {}).unwrap_err();
        assert!(matches!(err, QueryBuilderError::Syntax { count: 1, .. }));
    }

    #[test]
    fn test_full_text() {
        let prepared = compile("'connection refused'", |_| {}).unwrap();
        assert_eq!(prepared.where_clause, "match(body, ?)");
        assert_eq!(
            prepared.args,
            vec![Value::String("connection refused".to_string())]
        );

        let prepared = compile("'(unclosed'", |_| {}).unwrap();
        assert_eq!(prepared.args, vec![Value::String("\\(unclosed".to_string())]);

        let prepared = compile("'x' AND service.name = 'a'", |opts| {
            opts.skip_full_text_filter = true;
        })
        .unwrap();
        assert_eq!(
            prepared.where_clause,
            "(resources_string['service.name'] = ? AND mapContains(resources_string, 'service.name') = ?)"
        );

        let err = compile("'x'", |opts| opts.full_text_column = None).unwrap_err();
        assert_eq!(messages(&err), vec!["full text search is not supported"]);
    }

    #[test]
    fn test_in_with_variables() {
        let mut variables = HashMap::new();
        variables.insert(
            "envs".to_string(),
            VariableItem::new(
                VariableType::Custom,
                Value::List(vec![
                    Value::String("prod".to_string()),
                    Value::String("dev".to_string()),
                ]),
            ),
        );
        variables.insert(
            "services".to_string(),
            VariableItem::new(VariableType::Dynamic, Value::String("__all__".to_string())),
        );
        variables.insert(
            "empty".to_string(),
            VariableItem::new(VariableType::Custom, Value::List(Vec::new())),
        );

        let vars = variables.clone();
        let prepared = compile("service.name IN $envs", move |opts| opts.variables = vars).unwrap();
        assert_eq!(
            prepared.where_clause,
            "(resources_string['service.name'] IN (?, ?) AND mapContains(resources_string, 'service.name') = ?)"
        );
        assert_eq!(prepared.args.len(), 3);

        let vars = variables.clone();
        let prepared = compile(
            "service.name IN $services AND http.status_code = 200",
            move |opts| opts.variables = vars,
        )
        .unwrap();
        assert_eq!(
            prepared.where_clause,
            "(attributes_number['http.status_code'] = ? AND mapContains(attributes_number, 'http.status_code') = ?)"
        );

        let vars = variables.clone();
        let err = compile("service.name IN $empty", move |opts| opts.variables = vars).unwrap_err();
        assert_eq!(
            messages(&err),
            vec!["malformed request payload: variable `empty` used in expression has an empty list value"]
        );

        let prepared = compile("service.name = $envs", move |opts| opts.variables = variables).unwrap();
        assert_eq!(
            prepared.args,
            vec![Value::String("prod".to_string()), Value::Bool(true)]
        );
    }

    #[test]
    fn test_like_without_wildcards_warns() {
        let prepared = compile("service.name LIKE 'redis'", |_| {}).unwrap();
        assert_eq!(
            prepared.warning_messages(),
            vec!["LIKE operator used without wildcards (% or _). Consider using = operator for exact matches or add wildcards for pattern matching."]
        );
        assert_eq!(prepared.warnings_doc_url(), Some(STRING_MATCHING_URL));
        let prepared = compile("service.name ILIKE 'red%'", |_| {}).unwrap();
        assert!(prepared.warnings.is_empty());
        assert_eq!(prepared.warnings_doc_url(), None);
    }

    #[test]
    fn test_function_calls() {
        let prepared = compile("has(body.tags, 'db')", |_| {}).unwrap();
        assert_eq!(prepared.where_clause, "has(JSON_VALUE(body, '$.tags'), ?)");

        let prepared = compile("hasAny(body.ids, [1, 2])", |_| {}).unwrap();
        assert_eq!(prepared.where_clause, "hasAny(JSON_VALUE(body, '$.ids'), ?)");
        assert_eq!(
            prepared.args,
            vec![Value::List(vec![Value::Number(1.0), Value::Number(2.0)])]
        );

        let prepared = compile("hasToken(body, 'timeout')", |_| {}).unwrap();
        assert_eq!(prepared.where_clause, "hasToken(LOWER(body), LOWER(?))");

        let err = compile("has(service.name, 'x')", |_| {}).unwrap_err();
        assert_eq!(
            messages(&err),
            vec!["function `has` supports only body JSON search"]
        );
        assert_eq!(err.url(), Some(BODY_ONLY_FUNCTION_URL));

        let err = compile("hasToken(body, 1)", |_| {}).unwrap_err();
        assert_eq!(
            messages(&err),
            vec!["function `hasToken` expects value parameter to be a string"]
        );
        assert_eq!(err.url(), Some(HAS_TOKEN_URL));

        let prepared = compile("has(body.tags, 'db') AND service.name = 'a'", |opts| {
            opts.skip_function_calls = true;
        })
        .unwrap();
        assert_eq!(
            prepared.where_clause,
            "(resources_string['service.name'] = ? AND mapContains(resources_string, 'service.name') = ?)"
        );
    }

    #[test]
    fn test_missing_body_key() {
        let mapper = ClickHouseFieldMapper::logs();
        let builder = ClickHouseConditionBuilder::new(mapper.clone());
        let keys = field_keys();
        let opts = WhereClauseOptions::new(&mapper, &builder, &keys);
        let mut visitor = WhereClauseVisitor::new(&opts, false);
        let token = Key {
            text: "body.".to_string(),
            line: 1,
            column: 0,
        };
        assert!(visitor.visit_key(&token).is_empty());
        assert_eq!(
            visitor.errors[0].message,
            "missing key for body json search - expected key of the form `body.key` (ex: `body.status`)"
        );
        assert_eq!(visitor.errors[0].kind, DiagnosticKind::MissingBodyKey);
    }

    #[test]
    fn test_similarity() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert!(similarity("servce.name", "service.name") >= DEFAULT_SUGGESTION_THRESHOLD);
        assert!(similarity("status", "service.name") < DEFAULT_SUGGESTION_THRESHOLD);
    }
}
