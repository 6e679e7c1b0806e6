/// Compiler session shared by one-shot and REPL use
///
/// Holds the field key catalogue, the configured compiler options and the
/// aggregations a `Having` expression is checked against.
use anyhow::{Context, Result};
use clap::ValueEnum;
use config::CompilerConfig;
use filterql::contradictions::detect_contradictions;
use filterql::{extract_filter_tree, FieldDataType, TelemetryFieldKey};
use once_cell::sync::Lazy;
use querybuilder::clickhouse::LOGS_INTRINSIC_COLUMNS;
use querybuilder::having::{rewrite_for_logs, rewrite_for_metrics, rewrite_for_traces};
use querybuilder::{
    AggregateRewriter, Aggregation, ClickHouseConditionBuilder, ClickHouseFieldMapper, FieldKeys,
    MetricAggregation, QueryBuilderError, WhereClauseOptions,
};
use regex::Regex;
use std::fmt;
use std::path::Path;
use tracing::debug;

static ALIAS_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+as\s+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Compile a filter expression into a WHERE clause
    Where,
    /// Print the logical tree of a filter expression
    Tree,
    /// Report conditions that can never hold together
    Contradictions,
    /// Rewrite an aggregation expression
    Aggregate,
    /// Validate and rewrite a `Having` expression
    Having,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Where => "where",
            Mode::Tree => "tree",
            Mode::Contradictions => "contradictions",
            Mode::Aggregate => "aggregate",
            Mode::Having => "having",
        };
        f.write_str(name)
    }
}

pub struct Session {
    config: CompilerConfig,
    keys: FieldKeys,
    mapper: ClickHouseFieldMapper,
    builder: ClickHouseConditionBuilder,
    aggregations: Vec<Aggregation>,
    metric: Option<MetricAggregation>,
    pub json: bool,
}

impl Session {
    pub fn new(config: CompilerConfig, keys: FieldKeys) -> Self {
        let mapper = ClickHouseFieldMapper::logs();
        Self {
            config,
            keys,
            builder: ClickHouseConditionBuilder::new(mapper.clone()),
            mapper,
            aggregations: Vec::new(),
            metric: None,
            json: false,
        }
    }

    pub fn with_aggregations(mut self, aggregations: Vec<Aggregation>) -> Self {
        self.aggregations = aggregations;
        self
    }

    pub fn with_metric(mut self, metric: Option<MetricAggregation>) -> Self {
        self.metric = metric;
        self
    }

    pub fn keys(&self) -> Vec<&TelemetryFieldKey> {
        let mut keys: Vec<&TelemetryFieldKey> = self.keys.values().flatten().collect();
        keys.sort_by(|a, b| a.name.cmp(&b.name).then(a.field_context.cmp(&b.field_context)));
        keys
    }

    fn where_options(&self) -> WhereClauseOptions<'_> {
        let mut opts = WhereClauseOptions::new(&self.mapper, &self.builder, &self.keys);
        if self.config.full_text_enabled() {
            let column = &self.config.full_text_column;
            let key = self.mapper.intrinsic_key(column).unwrap_or_else(|| {
                TelemetryFieldKey::new(column.as_str()).with_data_type(FieldDataType::String)
            });
            opts = opts.with_full_text_column(key);
        }
        opts.skip_resource_filter = self.config.skip_resource_filter;
        opts.skip_full_text_filter = self.config.skip_full_text_filter;
        opts.skip_function_calls = self.config.skip_function_calls;
        opts.ignore_not_found_keys = self.config.ignore_not_found_keys;
        opts.suggestion_threshold = self.config.suggestion_threshold;
        opts
    }

    /// Run `expression` through the pass selected by `mode` and render the result
    pub fn run(&self, mode: Mode, expression: &str) -> Result<String> {
        debug!(mode = %mode, expression = %expression, "running expression");
        match mode {
            Mode::Where => self.compile_where(expression),
            Mode::Tree => {
                let tree = extract_filter_tree(expression)?;
                if self.json {
                    Ok(serde_json::to_string_pretty(&tree)?)
                } else {
                    Ok(tree.to_string())
                }
            }
            Mode::Contradictions => {
                let found = detect_contradictions(expression)
                    .with_context(|| format!("Failed to parse filter expression: {}", expression))?;
                if found.is_empty() {
                    Ok("no contradictions".to_string())
                } else {
                    Ok(found.join("\n"))
                }
            }
            Mode::Aggregate => self.compile_aggregate(expression),
            Mode::Having => self.compile_having(expression),
        }
    }

    fn compile_where(&self, expression: &str) -> Result<String> {
        let opts = self.where_options();
        let prepared = querybuilder::prepare_where_clause(expression, &opts).map_err(describe)?;
        if self.json {
            return Ok(serde_json::to_string_pretty(&prepared)?);
        }
        let mut out = format!(
            "{}\nargs: {}",
            prepared.where_clause,
            serde_json::to_string(&prepared.args)?
        );
        for warning in prepared.warning_messages() {
            out.push_str(&format!("\nwarning: {}", warning));
        }
        if let Some(url) = prepared.warnings_doc_url() {
            out.push_str(&format!("\nSee {}", url));
        }
        Ok(out)
    }

    fn compile_aggregate(&self, expression: &str) -> Result<String> {
        let opts = self.where_options();
        let rewritten = AggregateRewriter::new(&opts)
            .with_rate_interval(self.config.rate_interval_seconds)
            .with_intrinsic_fields(
                LOGS_INTRINSIC_COLUMNS
                    .iter()
                    .filter_map(|name| self.mapper.intrinsic_key(name)),
            )
            .rewrite(expression)
            .map_err(describe)?;
        if self.json {
            return Ok(serde_json::to_string_pretty(&rewritten)?);
        }
        Ok(format!(
            "{}\nargs: {}",
            rewritten.expression,
            serde_json::to_string(&rewritten.args)?
        ))
    }

    fn compile_having(&self, expression: &str) -> Result<String> {
        let rewritten = match self.config.signal.as_str() {
            "metrics" => {
                let metric = self
                    .metric
                    .as_ref()
                    .context("`Having` on metrics needs --metric")?;
                rewrite_for_metrics(expression, metric)
            }
            "traces" => rewrite_for_traces(expression, &self.aggregations),
            _ => rewrite_for_logs(expression, &self.aggregations),
        };
        rewritten.map_err(describe)
    }
}

/// Render a compiler error with each of its individual problems
fn describe(err: QueryBuilderError) -> anyhow::Error {
    let additional = err.additional();
    if additional.is_empty() {
        return anyhow::Error::new(err);
    }
    let mut message = format!("{}\n  {}", err, additional.join("\n  "));
    if let Some(url) = err.url() {
        message.push_str(&format!("\nSee {}", url));
    }
    anyhow::anyhow!(message)
}

/// Parse `count() AS total` into an aggregation with an optional alias
pub fn parse_aggregation(text: &str) -> Aggregation {
    match ALIAS_SEPARATOR.find_iter(text).last() {
        Some(m) => Aggregation::new(text[..m.start()].trim()).with_alias(text[m.end()..].trim()),
        None => Aggregation::new(text.trim()),
    }
}

/// Load a JSON array of field keys
pub fn load_catalog(path: &Path) -> Result<FieldKeys> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog: {}", path.display()))?;
    let entries: Vec<TelemetryFieldKey> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse catalog: {}", path.display()))?;
    let mut keys = FieldKeys::new();
    for key in entries {
        keys.entry(key.name.clone()).or_default().push(key);
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filterql::FieldContext;
    use querybuilder::{SpaceAggregation, TimeAggregation};

    fn session() -> Session {
        let mut keys = FieldKeys::new();
        for key in [
            TelemetryFieldKey::new("service.name")
                .with_context(FieldContext::Resource)
                .with_data_type(FieldDataType::String),
            TelemetryFieldKey::new("http.status_code")
                .with_context(FieldContext::Attribute)
                .with_data_type(FieldDataType::Number),
        ] {
            keys.entry(key.name.clone()).or_default().push(key);
        }
        Session::new(CompilerConfig::default(), keys)
    }

    #[test]
    fn test_where() {
        let out = session().run(Mode::Where, "service.name = 'redis'").unwrap();
        assert_eq!(
            out,
            "(resources_string['service.name'] = ? AND mapContains(resources_string, 'service.name') = ?)\nargs: [\"redis\",true]"
        );
    }

    #[test]
    fn test_where_error_lists_problems() {
        let err = session().run(Mode::Where, "servce.name = 'redis'").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Found 1 errors while parsing the search expression."));
        assert!(message.contains("Did you mean `service.name`?"));
        assert!(message.ends_with("See https://signoz.io/docs/userguide/search-troubleshooting/#key-fieldname-not-found"));
    }

    #[test]
    fn test_contradictions() {
        let out = session().run(Mode::Contradictions, "a = 1 AND a = 2").unwrap();
        assert_eq!(out, "Field 'a' cannot equal multiple different values");
        let out = session().run(Mode::Contradictions, "a = 1").unwrap();
        assert_eq!(out, "no contradictions");
    }

    #[test]
    fn test_aggregate() {
        let out = session().run(Mode::Aggregate, "rate()").unwrap();
        assert_eq!(out, "count()/60\nargs: []");
    }

    #[test]
    fn test_having() {
        let session = session().with_aggregations(vec![parse_aggregation("count() AS total")]);
        assert_eq!(session.run(Mode::Having, "total > 10").unwrap(), "__result_0 > 10");
    }

    #[test]
    fn test_having_metrics() {
        let mut config = CompilerConfig::default();
        config.signal = "metrics".to_string();
        let session = Session::new(config, FieldKeys::new());
        assert!(session.run(Mode::Having, "cpu > 1").is_err());

        let session = session.with_metric(Some(MetricAggregation {
            metric_name: "cpu".to_string(),
            time_aggregation: TimeAggregation::Avg,
            space_aggregation: SpaceAggregation::Max,
        }));
        assert_eq!(
            session.run(Mode::Having, "max(avg(cpu)) > 1").unwrap(),
            "value > 1"
        );
    }

    #[test]
    fn test_parse_aggregation() {
        assert_eq!(
            parse_aggregation("count() AS total"),
            Aggregation::new("count()").with_alias("total")
        );
        assert_eq!(
            parse_aggregation("avg(duration) as avg_duration"),
            Aggregation::new("avg(duration)").with_alias("avg_duration")
        );
        assert_eq!(parse_aggregation("count()"), Aggregation::new("count()"));
    }

    #[test]
    fn test_parse_aggregation_non_ascii() {
        // `İ` grows from two to three bytes when lowercased
        assert_eq!(
            parse_aggregation("countIf(city = 'İstanbul') AS total"),
            Aggregation::new("countIf(city = 'İstanbul')").with_alias("total")
        );
        assert_eq!(
            parse_aggregation("sum(größe)  As  gesamt"),
            Aggregation::new("sum(größe)").with_alias("gesamt")
        );
    }

    #[test]
    fn test_keys_sorted() {
        let session = session();
        let names: Vec<&str> = session.keys().iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["http.status_code", "service.name"]);
    }
}
