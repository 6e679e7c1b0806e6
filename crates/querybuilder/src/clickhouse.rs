/// ClickHouse field mapper and condition builder for the logs schema
///
/// Attributes live in typed maps (`attributes_string`, `attributes_number`,
/// `attributes_bool`), resource attributes in `resources_string`, and the
/// log body is a JSON string column. Materialized keys have a dedicated
/// column named `{context}_{type}_{name}` with dots replaced by `$$`.
use crate::error::{QueryBuilderError, Result};
use crate::services::{ConditionBuilder, FieldKeys, FieldMapper};
use crate::sql::SqlBuilder;
use filterql::{FieldContext, FieldDataType, FilterOperator, TelemetryFieldKey, Value};

/// Top-level columns of the logs table
pub const LOGS_INTRINSIC_COLUMNS: &[&str] = &[
    "timestamp",
    "id",
    "trace_id",
    "span_id",
    "trace_flags",
    "severity_text",
    "severity_number",
    "body",
    "scope_name",
    "scope_version",
];

#[derive(Debug, Clone)]
pub struct ClickHouseFieldMapper {
    intrinsic_columns: Vec<String>,
}

impl Default for ClickHouseFieldMapper {
    fn default() -> Self {
        Self::logs()
    }
}

impl ClickHouseFieldMapper {
    pub fn new(intrinsic_columns: Vec<String>) -> Self {
        Self { intrinsic_columns }
    }

    pub fn logs() -> Self {
        Self::new(LOGS_INTRINSIC_COLUMNS.iter().map(|c| c.to_string()).collect())
    }

    /// Definition of an intrinsic column, if `name` is one
    pub fn intrinsic_key(&self, name: &str) -> Option<TelemetryFieldKey> {
        if !self.is_intrinsic_name(name) {
            return None;
        }
        let data_type = match name {
            "timestamp" | "severity_number" | "trace_flags" => FieldDataType::Number,
            _ => FieldDataType::String,
        };
        Some(
            TelemetryFieldKey::new(name)
                .with_context(FieldContext::Log)
                .with_data_type(data_type),
        )
    }

    fn is_intrinsic_name(&self, name: &str) -> bool {
        self.intrinsic_columns.iter().any(|c| c == name)
    }

    fn is_intrinsic(&self, key: &TelemetryFieldKey) -> bool {
        matches!(
            key.field_context,
            FieldContext::Unspecified | FieldContext::Log | FieldContext::Span
        ) && self.is_intrinsic_name(&key.name)
    }

    /// Map column and map key for keys stored in a map
    fn map_location(&self, key: &TelemetryFieldKey) -> Option<(String, String)> {
        if key.materialized || self.is_intrinsic(key) {
            return None;
        }
        let map = match key.field_context {
            FieldContext::Resource => "resources_string".to_string(),
            FieldContext::Scope => "scope_string".to_string(),
            FieldContext::Attribute
            | FieldContext::Unspecified
            | FieldContext::Log
            | FieldContext::Span => format!("attributes_{}", map_type(key.field_data_type)),
            _ => return None,
        };
        Some((map, escape(&key.name)))
    }
}

fn map_type(data_type: FieldDataType) -> &'static str {
    match data_type {
        FieldDataType::Number => "number",
        FieldDataType::Bool => "bool",
        FieldDataType::String | FieldDataType::Unspecified => "string",
    }
}

fn escape(name: &str) -> String {
    name.replace('\\', "\\\\").replace('\'', "\\'")
}

fn json_path(name: &str) -> String {
    format!("$.{}", escape(name))
}

impl FieldMapper for ClickHouseFieldMapper {
    fn field_for(&self, key: &TelemetryFieldKey) -> Result<String> {
        if self.is_intrinsic(key) {
            return Ok(key.name.clone());
        }
        if key.field_context == FieldContext::Body {
            return self.json_key_to_field(key);
        }
        if key.materialized {
            let context = match key.field_context {
                FieldContext::Resource => "resource",
                _ => "attribute",
            };
            return Ok(format!(
                "`{}_{}_{}`",
                context,
                map_type(key.field_data_type),
                key.name.replace('.', "$$")
            ));
        }
        match self.map_location(key) {
            Some((map, name)) => Ok(format!("{}['{}']", map, name)),
            None => Err(QueryBuilderError::ColumnNotFound(key.name.clone())),
        }
    }

    fn column_expression_for(&self, key: &TelemetryFieldKey, keys: &FieldKeys) -> Result<String> {
        let resolved = if key.field_context.is_specified() || self.is_intrinsic(key) {
            key.clone()
        } else {
            keys.get(&key.name)
                .and_then(|candidates| candidates.first())
                .cloned()
                .unwrap_or_else(|| key.clone())
        };
        let column = self.field_for(&resolved)?;
        Ok(format!("{} AS `{}`", column, key.name))
    }

    fn json_key_to_field(&self, key: &TelemetryFieldKey) -> Result<String> {
        if key.name.is_empty() {
            return Ok("body".to_string());
        }
        Ok(format!("JSON_VALUE(body, '{}')", json_path(&key.name)))
    }
}

/// Renders filter conditions against the logs table
#[derive(Debug, Clone, Default)]
pub struct ClickHouseConditionBuilder {
    mapper: ClickHouseFieldMapper,
}

impl ClickHouseConditionBuilder {
    pub fn new(mapper: ClickHouseFieldMapper) -> Self {
        Self { mapper }
    }

    fn exists_condition(&self, key: &TelemetryFieldKey, column: &str, negated: bool) -> String {
        let not = if negated { "NOT " } else { "" };
        if key.field_context == FieldContext::Body {
            return format!("{}JSON_EXISTS(body, '{}')", not, json_path(&key.name));
        }
        if let Some((map, name)) = self.mapper.map_location(key) {
            return format!("{}mapContains({}, '{}')", not, map, name);
        }
        let is_string = matches!(
            key.field_data_type,
            FieldDataType::String | FieldDataType::Unspecified
        );
        match (is_string, negated) {
            (true, false) => format!("{} <> ''", column),
            (true, true) => format!("{} = ''", column),
            (false, false) => format!("{} IS NOT NULL", column),
            (false, true) => format!("{} IS NULL", column),
        }
    }
}

/// Cast the column or the value when the value's type disagrees with the
/// key's data type, so the comparison is still meaningful.
///
/// A range comparison between a number column and a string that holds a
/// number stays numeric: the string is bound as a number.
pub fn data_type_collision_handled(
    key: &TelemetryFieldKey,
    column: String,
    op: FilterOperator,
    value: &Value,
) -> (String, Value) {
    match (key.field_data_type, value) {
        (FieldDataType::Number, Value::String(s)) if op.is_comparison() => {
            match s.trim().parse::<f64>() {
                Ok(n) => (column, Value::Number(n)),
                Err(_) => (format!("toString({})", column), value.clone()),
            }
        }
        (FieldDataType::String, Value::Number(_)) => {
            (format!("toFloat64OrNull({})", column), value.clone())
        }
        (FieldDataType::String, Value::List(items))
            if !items.is_empty() && items.iter().all(Value::is_number) =>
        {
            (format!("toFloat64OrNull({})", column), value.clone())
        }
        (FieldDataType::String, Value::Bool(b)) => (column, Value::String(b.to_string())),
        (FieldDataType::Number | FieldDataType::Bool, Value::String(_)) => {
            (format!("toString({})", column), value.clone())
        }
        _ => (column, value.clone()),
    }
}

fn list_values(value: &Value) -> Vec<Value> {
    match value {
        Value::List(items) => items.clone(),
        other => vec![other.clone()],
    }
}

impl ConditionBuilder for ClickHouseConditionBuilder {
    fn condition_for(
        &self,
        key: &TelemetryFieldKey,
        op: FilterOperator,
        value: &Value,
        sb: &mut SqlBuilder,
    ) -> Result<String> {
        use FilterOperator::*;

        let mapped = self.mapper.field_for(key)?;
        let (column, value) = data_type_collision_handled(key, mapped.clone(), op, value);

        let condition = match op {
            Equal => format!("{} = {}", column, sb.var(value)),
            NotEqual => format!("{} <> {}", column, sb.var(value)),
            GreaterThan => format!("{} > {}", column, sb.var(value)),
            GreaterThanOrEq => format!("{} >= {}", column, sb.var(value)),
            LessThan => format!("{} < {}", column, sb.var(value)),
            LessThanOrEq => format!("{} <= {}", column, sb.var(value)),
            Like => format!("{} LIKE {}", column, sb.var(value)),
            NotLike => format!("{} NOT LIKE {}", column, sb.var(value)),
            ILike => format!("LOWER({}) LIKE LOWER({})", column, sb.var(value)),
            NotILike => format!("LOWER({}) NOT LIKE LOWER({})", column, sb.var(value)),
            Contains | NotContains => {
                let column = if key.field_data_type == FieldDataType::Number
                    && !column.starts_with("toString(")
                {
                    format!("toString({})", column)
                } else {
                    column
                };
                let pattern = Value::String(format!("%{}%", value));
                let like = if op == Contains { "LIKE" } else { "NOT LIKE" };
                format!("LOWER({}) {} LOWER({})", column, like, sb.var(pattern))
            }
            Regexp => format!("match({}, {})", column, sb.var(value)),
            NotRegexp => format!("NOT match({}, {})", column, sb.var(value)),
            Between | NotBetween => {
                let bounds = match &value {
                    Value::List(items) if items.len() == 2 => items.clone(),
                    _ => {
                        return Err(QueryBuilderError::InvalidArgument(format!(
                            "{} operator requires two values",
                            op
                        )))
                    }
                };
                let low = sb.var(bounds[0].clone());
                let high = sb.var(bounds[1].clone());
                let keyword = if op == Between { "BETWEEN" } else { "NOT BETWEEN" };
                format!("{} {} {} AND {}", column, keyword, low, high)
            }
            In | NotIn => {
                let values = list_values(&value);
                if values.is_empty() {
                    return Err(QueryBuilderError::InvalidArgument(format!(
                        "{} operator requires at least one value",
                        op
                    )));
                }
                let placeholders: Vec<String> = values.into_iter().map(|v| sb.var(v)).collect();
                let keyword = if op == In { "IN" } else { "NOT IN" };
                format!("{} {} ({})", column, keyword, placeholders.join(", "))
            }
            Exists | NotExists => self.exists_condition(key, &mapped, op == NotExists),
            Unknown => {
                return Err(QueryBuilderError::Condition(format!(
                    "unsupported operator: {}",
                    op
                )))
            }
        };

        // a missing map key reads as the map's default value
        if op.implies_existence() {
            if let Some((map, name)) = self.mapper.map_location(key) {
                let guard = sb.var(Value::Bool(true));
                return Ok(format!(
                    "({} AND mapContains({}, '{}') = {})",
                    condition, map, name, guard
                ));
            }
        }
        Ok(condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attribute(name: &str, data_type: FieldDataType) -> TelemetryFieldKey {
        TelemetryFieldKey::new(name)
            .with_context(FieldContext::Attribute)
            .with_data_type(data_type)
    }

    fn render(key: &TelemetryFieldKey, op: FilterOperator, value: Value) -> (String, Vec<Value>) {
        let builder = ClickHouseConditionBuilder::default();
        let mut sb = SqlBuilder::new();
        let condition = builder.condition_for(key, op, &value, &mut sb).unwrap();
        (condition, sb.into_args())
    }

    #[test]
    fn test_field_for() {
        let mapper = ClickHouseFieldMapper::logs();
        let resource = TelemetryFieldKey::new("service.name").with_context(FieldContext::Resource);
        assert_eq!(
            mapper.field_for(&resource).unwrap(),
            "resources_string['service.name']"
        );
        assert_eq!(
            mapper.field_for(&resource.clone().with_materialized(true)).unwrap(),
            "`resource_string_service$$name`"
        );
        assert_eq!(
            mapper
                .field_for(&attribute("http.status_code", FieldDataType::Number))
                .unwrap(),
            "attributes_number['http.status_code']"
        );
        assert_eq!(
            mapper.field_for(&TelemetryFieldKey::new("severity_text")).unwrap(),
            "severity_text"
        );
        let body = TelemetryFieldKey::new("user.id").with_context(FieldContext::Body);
        assert_eq!(
            mapper.field_for(&body).unwrap(),
            "JSON_VALUE(body, '$.user.id')"
        );
        let metric = TelemetryFieldKey::new("cpu").with_context(FieldContext::Metric);
        assert!(matches!(
            mapper.field_for(&metric),
            Err(QueryBuilderError::ColumnNotFound(name)) if name == "cpu"
        ));
    }

    #[test]
    fn test_column_expression_for() {
        let mapper = ClickHouseFieldMapper::logs();
        let mut keys = FieldKeys::new();
        keys.insert(
            "service.name".to_string(),
            vec![TelemetryFieldKey::new("service.name").with_context(FieldContext::Resource)],
        );
        assert_eq!(
            mapper
                .column_expression_for(&TelemetryFieldKey::new("service.name"), &keys)
                .unwrap(),
            "resources_string['service.name'] AS `service.name`"
        );
    }

    #[test]
    fn test_string_key_with_number_value() {
        let (sql, args) = render(
            &attribute("code", FieldDataType::String),
            FilterOperator::GreaterThan,
            Value::Number(200.0),
        );
        assert_eq!(
            sql,
            "(toFloat64OrNull(attributes_string['code']) > ? AND mapContains(attributes_string, 'code') = ?)"
        );
        assert_eq!(args, vec![Value::Number(200.0), Value::Bool(true)]);
    }

    #[test]
    fn test_string_key_with_bool_value() {
        let (sql, args) = render(
            &attribute("flag", FieldDataType::String),
            FilterOperator::Equal,
            Value::Bool(true),
        );
        assert_eq!(
            sql,
            "(attributes_string['flag'] = ? AND mapContains(attributes_string, 'flag') = ?)"
        );
        assert_eq!(args, vec![Value::String("true".to_string()), Value::Bool(true)]);
    }

    #[test]
    fn test_number_key_with_string_value() {
        let (sql, args) = render(
            &attribute("code", FieldDataType::Number),
            FilterOperator::Equal,
            Value::String("200".to_string()),
        );
        assert_eq!(
            sql,
            "(toString(attributes_number['code']) = ? AND mapContains(attributes_number, 'code') = ?)"
        );
        assert_eq!(args, vec![Value::String("200".to_string()), Value::Bool(true)]);
    }

    #[test]
    fn test_number_key_with_numeric_string_in_range() {
        let key = attribute("http.status_code", FieldDataType::Number);
        let (sql, args) = render(&key, FilterOperator::GreaterThan, Value::String("200".to_string()));
        assert_eq!(
            sql,
            "(attributes_number['http.status_code'] > ? AND mapContains(attributes_number, 'http.status_code') = ?)"
        );
        assert_eq!(args, vec![Value::Number(200.0), Value::Bool(true)]);

        let (sql, args) = render(&key, FilterOperator::LessThanOrEq, Value::String(" 1e3 ".to_string()));
        assert!(sql.starts_with("(attributes_number['http.status_code'] <= ?"));
        assert_eq!(args[0], Value::Number(1000.0));

        // not a number, so the comparison stays textual
        let (sql, args) = render(&key, FilterOperator::GreaterThan, Value::String("open".to_string()));
        assert!(sql.starts_with("(toString(attributes_number['http.status_code']) > ?"));
        assert_eq!(args[0], Value::String("open".to_string()));
    }

    #[test]
    fn test_contains_on_number_column() {
        let (sql, args) = render(
            &attribute("code", FieldDataType::Number),
            FilterOperator::Contains,
            Value::Number(20.0),
        );
        assert_eq!(
            sql,
            "(LOWER(toString(attributes_number['code'])) LIKE LOWER(?) AND mapContains(attributes_number, 'code') = ?)"
        );
        assert_eq!(args, vec![Value::String("%20%".to_string()), Value::Bool(true)]);
    }

    #[test]
    fn test_between_and_in() {
        let key = attribute("latency", FieldDataType::Number);
        let (sql, args) = render(
            &key,
            FilterOperator::NotBetween,
            Value::List(vec![Value::Number(1.0), Value::Number(5.0)]),
        );
        assert_eq!(sql, "attributes_number['latency'] NOT BETWEEN ? AND ?");
        assert_eq!(args.len(), 2);

        let (sql, args) = render(
            &key,
            FilterOperator::In,
            Value::List(vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]),
        );
        assert_eq!(
            sql,
            "(attributes_number['latency'] IN (?, ?, ?) AND mapContains(attributes_number, 'latency') = ?)"
        );
        assert_eq!(args.len(), 4);
        assert_eq!(args[3], Value::Bool(true));
    }

    #[test]
    fn test_existence_guard() {
        let resource = TelemetryFieldKey::new("service.name").with_context(FieldContext::Resource);
        let (sql, args) = render(&resource, FilterOperator::Like, Value::String("api%".to_string()));
        assert_eq!(
            sql,
            "(resources_string['service.name'] LIKE ? AND mapContains(resources_string, 'service.name') = ?)"
        );
        assert_eq!(args, vec![Value::String("api%".to_string()), Value::Bool(true)]);

        // negative operators, columns and body fields carry no guard
        let (sql, args) = render(&resource, FilterOperator::NotEqual, Value::String("api".to_string()));
        assert_eq!(sql, "resources_string['service.name'] <> ?");
        assert_eq!(args.len(), 1);

        let (sql, _) = render(
            &TelemetryFieldKey::new("severity_text"),
            FilterOperator::Equal,
            Value::String("ERROR".to_string()),
        );
        assert_eq!(sql, "severity_text = ?");

        let (sql, _) = render(
            &resource.clone().with_materialized(true),
            FilterOperator::Equal,
            Value::String("api".to_string()),
        );
        assert_eq!(sql, "`resource_string_service$$name` = ?");

        let (sql, _) = render(
            &TelemetryFieldKey::new("status").with_context(FieldContext::Body),
            FilterOperator::Equal,
            Value::String("ok".to_string()),
        );
        assert_eq!(sql, "JSON_VALUE(body, '$.status') = ?");
    }

    #[test]
    fn test_between_requires_two_values() {
        let builder = ClickHouseConditionBuilder::default();
        let mut sb = SqlBuilder::new();
        let err = builder
            .condition_for(
                &attribute("latency", FieldDataType::Number),
                FilterOperator::Between,
                &Value::Number(1.0),
                &mut sb,
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "BETWEEN operator requires two values");
    }

    #[test]
    fn test_exists() {
        let (sql, args) = render(
            &attribute("user", FieldDataType::String),
            FilterOperator::Exists,
            Value::Null,
        );
        assert_eq!(sql, "mapContains(attributes_string, 'user')");
        assert!(args.is_empty());

        let (sql, _) = render(
            &TelemetryFieldKey::new("trace_id"),
            FilterOperator::NotExists,
            Value::Null,
        );
        assert_eq!(sql, "trace_id = ''");

        let (sql, _) = render(
            &TelemetryFieldKey::new("status").with_context(FieldContext::Body),
            FilterOperator::Exists,
            Value::Null,
        );
        assert_eq!(sql, "JSON_EXISTS(body, '$.status')");
    }

    #[test]
    fn test_ilike_and_regexp() {
        let key = TelemetryFieldKey::new("body");
        let (sql, _) = render(&key, FilterOperator::ILike, Value::String("%err%".to_string()));
        assert_eq!(sql, "LOWER(body) LIKE LOWER(?)");
        let (sql, _) = render(&key, FilterOperator::NotRegexp, Value::String("^a".to_string()));
        assert_eq!(sql, "NOT match(body, ?)");
    }
}
