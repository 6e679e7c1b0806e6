/// Aggregate function registry
///
/// Built once on first use and read-only afterwards. Lookups are
/// case-insensitive on the function name and its aliases.
use once_cell::sync::Lazy;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggrFunc {
    pub name: String,
    /// Name of the ClickHouse function the call is rewritten to
    pub sql_name: String,
    pub aliases: Vec<String>,
    pub require_args: bool,
    /// Arguments must be numeric; string columns are cast
    pub numeric_only: bool,
    /// `...If` variant whose last argument is a filter expression
    pub combinator: bool,
    /// Result is divided by the rate interval
    pub rate: bool,
    pub min_args: usize,
    pub max_args: usize,
}

impl AggrFunc {
    fn new(name: &str, sql_name: &str, min_args: usize, max_args: usize) -> Self {
        Self {
            name: name.to_string(),
            sql_name: sql_name.to_string(),
            aliases: Vec::new(),
            require_args: min_args > 0,
            numeric_only: false,
            combinator: false,
            rate: false,
            min_args,
            max_args,
        }
    }

    fn numeric(mut self) -> Self {
        self.numeric_only = true;
        self
    }

    fn combinator(mut self) -> Self {
        self.combinator = true;
        self
    }

    fn rate(mut self) -> Self {
        self.rate = true;
        self
    }

    fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    /// Check the number of arguments a call passes
    pub fn check_arity(&self, count: usize) -> Result<(), String> {
        if !self.require_args && self.max_args == 0 && count > 0 {
            return Err(format!("function `{}` expects no arguments", self.name));
        }
        if count < self.min_args || count > self.max_args {
            return Err(format!(
                "function `{}` expects between {} and {} arguments",
                self.name, self.min_args, self.max_args
            ));
        }
        Ok(())
    }
}

const PERCENTILES: [(&str, &str); 9] = [
    ("p05", "0.05"),
    ("p10", "0.10"),
    ("p20", "0.20"),
    ("p25", "0.25"),
    ("p50", "0.50"),
    ("p75", "0.75"),
    ("p90", "0.90"),
    ("p95", "0.95"),
    ("p99", "0.99"),
];

fn builtin_functions() -> Vec<AggrFunc> {
    let mut functions = vec![
        AggrFunc::new("count", "count", 0, 1),
        AggrFunc::new("countDistinct", "countDistinct", 1, 1).alias("count_distinct"),
        AggrFunc::new("sum", "sum", 1, 1).numeric(),
        AggrFunc::new("avg", "avg", 1, 1).numeric(),
        AggrFunc::new("min", "min", 1, 1).numeric(),
        AggrFunc::new("max", "max", 1, 1).numeric(),
        AggrFunc::new("rate", "count", 0, 0).rate(),
        AggrFunc::new("rate_sum", "sum", 1, 1).numeric().rate(),
        AggrFunc::new("rate_avg", "avg", 1, 1).numeric().rate(),
        AggrFunc::new("rate_min", "min", 1, 1).numeric().rate(),
        AggrFunc::new("rate_max", "max", 1, 1).numeric().rate(),
        AggrFunc::new("countIf", "countIf", 1, 1).combinator(),
        AggrFunc::new("countDistinctIf", "countDistinctIf", 2, 2).combinator(),
        AggrFunc::new("sumIf", "sumIf", 2, 2).numeric().combinator(),
        AggrFunc::new("avgIf", "avgIf", 2, 2).numeric().combinator(),
        AggrFunc::new("minIf", "minIf", 2, 2).numeric().combinator(),
        AggrFunc::new("maxIf", "maxIf", 2, 2).numeric().combinator(),
        AggrFunc::new("rateIf", "countIf", 1, 1).combinator().rate(),
    ];
    for (name, level) in PERCENTILES {
        functions.push(
            AggrFunc::new(name, &format!("quantile({})", level), 1, 1)
                .numeric()
                .alias(&name.replace('p', "percentile")),
        );
        functions.push(
            AggrFunc::new(&format!("{}If", name), &format!("quantileIf({})", level), 2, 2)
                .numeric()
                .combinator(),
        );
    }
    functions
}

static REGISTRY: Lazy<HashMap<String, AggrFunc>> = Lazy::new(|| {
    let mut registry = HashMap::new();
    for function in builtin_functions() {
        for alias in &function.aliases {
            registry.insert(alias.to_lowercase(), function.clone());
        }
        registry.insert(function.name.to_lowercase(), function);
    }
    registry
});

/// Look up an aggregate function by name or alias
pub fn lookup(name: &str) -> Option<&'static AggrFunc> {
    REGISTRY.get(&name.to_lowercase())
}

pub fn is_aggregate(name: &str) -> bool {
    lookup(name).is_some()
}
