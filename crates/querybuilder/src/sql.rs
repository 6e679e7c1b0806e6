/// Positional-argument SQL building
///
/// Fragments carry `?` placeholders; the values bound to them are collected
/// in the order the placeholders are written, so `args[i]` always belongs to
/// the i-th `?` of the rendered text.
use filterql::Value;

#[derive(Debug, Clone, Default)]
pub struct SqlBuilder {
    args: Vec<Value>,
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value and return its placeholder
    pub fn var(&mut self, value: Value) -> String {
        self.args.push(value);
        "?".to_string()
    }

    pub fn and(&self, parts: &[String]) -> String {
        join("AND", parts)
    }

    pub fn or(&self, parts: &[String]) -> String {
        join("OR", parts)
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn into_args(self) -> Vec<Value> {
        self.args
    }
}

fn join(op: &str, parts: &[String]) -> String {
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => format!("({})", parts.join(&format!(" {} ", op))),
    }
}

/// A common table expression with its own positional args
#[derive(Debug, Clone)]
pub struct CteFragment {
    pub name: String,
    pub sql: String,
    pub args: Vec<Value>,
}

impl CteFragment {
    pub fn new(name: impl Into<String>, sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            args,
        }
    }
}

/// Prefix a statement with its CTEs.
///
/// CTE placeholders come first in the rendered text, so their args are
/// concatenated in declaration order ahead of the main statement's args.
pub fn with_ctes(ctes: &[CteFragment], sql: &str, args: Vec<Value>) -> (String, Vec<Value>) {
    if ctes.is_empty() {
        return (sql.to_string(), args);
    }
    let clauses: Vec<String> = ctes
        .iter()
        .map(|cte| format!("{} AS ({})", cte.name, cte.sql))
        .collect();
    let mut combined: Vec<Value> = ctes.iter().flat_map(|cte| cte.args.iter().cloned()).collect();
    combined.extend(args);
    (format!("WITH {} {}", clauses.join(", "), sql), combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_collects_in_order() {
        let mut sb = SqlBuilder::new();
        let a = format!("a = {}", sb.var(Value::Number(1.0)));
        let b = format!("b = {}", sb.var(Value::String("x".to_string())));
        assert_eq!(sb.and(&[a, b]), "(a = ? AND b = ?)");
        assert_eq!(
            sb.args(),
            &[Value::Number(1.0), Value::String("x".to_string())]
        );
    }

    #[test]
    fn test_single_part_is_unwrapped() {
        let sb = SqlBuilder::new();
        assert_eq!(sb.or(&["a = 1".to_string()]), "a = 1");
        assert_eq!(sb.or(&[]), "");
    }

    #[test]
    fn test_cte_args_come_first() {
        let ctes = vec![
            CteFragment::new("first", "SELECT 1 WHERE a = ?", vec![Value::Number(1.0)]),
            CteFragment::new("second", "SELECT 2 WHERE b = ?", vec![Value::Number(2.0)]),
        ];
        let (sql, args) = with_ctes(&ctes, "SELECT * FROM first WHERE c = ?", vec![Value::Number(3.0)]);
        assert_eq!(
            sql,
            "WITH first AS (SELECT 1 WHERE a = ?), second AS (SELECT 2 WHERE b = ?) SELECT * FROM first WHERE c = ?"
        );
        assert_eq!(
            args,
            vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]
        );
    }
}
