/// Layered configuration for the expression compiler
///
/// Values are resolved in order: built-in defaults, an optional TOML file,
/// then `FILTERQL_*` environment variables (e.g. `FILTERQL_COMPILER__SIGNAL=traces`).
use anyhow::{Context, Result};
use config_rs::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub compiler: CompilerConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Options applied to every compiled expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Column searched by free text terms; empty disables full text search
    #[serde(default = "default_full_text_column")]
    pub full_text_column: String,

    #[serde(default)]
    pub skip_resource_filter: bool,

    #[serde(default)]
    pub skip_full_text_filter: bool,

    #[serde(default)]
    pub skip_function_calls: bool,

    /// Drop conditions on unknown keys instead of failing
    #[serde(default)]
    pub ignore_not_found_keys: bool,

    /// Divisor applied by the `rate*` aggregate functions
    #[serde(default = "default_rate_interval_seconds")]
    pub rate_interval_seconds: u64,

    /// Minimum similarity for a "did you mean" suggestion
    #[serde(default = "default_suggestion_threshold")]
    pub suggestion_threshold: f64,

    /// Signal the expressions are compiled for: logs, traces or metrics
    #[serde(default = "default_signal")]
    pub signal: String,
}

/// Field key catalogue used by the CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// JSON file holding an array of field keys
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_full_text_column() -> String {
    "body".to_string()
}

fn default_rate_interval_seconds() -> u64 {
    60
}

fn default_suggestion_threshold() -> f64 {
    0.75
}

fn default_signal() -> String {
    "logs".to_string()
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            full_text_column: default_full_text_column(),
            skip_resource_filter: false,
            skip_full_text_filter: false,
            skip_function_calls: false,
            ignore_not_found_keys: false,
            rate_interval_seconds: default_rate_interval_seconds(),
            suggestion_threshold: default_suggestion_threshold(),
            signal: default_signal(),
        }
    }
}

impl Config {
    /// Load Config from defaults, an optional TOML file and the environment
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder()
            .set_default("compiler.full_text_column", default_full_text_column())?
            .set_default("compiler.skip_resource_filter", false)?
            .set_default("compiler.skip_full_text_filter", false)?
            .set_default("compiler.skip_function_calls", false)?
            .set_default("compiler.ignore_not_found_keys", false)?
            .set_default("compiler.rate_interval_seconds", default_rate_interval_seconds())?
            .set_default("compiler.suggestion_threshold", default_suggestion_threshold())?
            .set_default("compiler.signal", default_signal())?;

        if let Some(path) = config_file {
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            builder = builder.add_source(File::from(path));
        }

        // nested keys use `__`, e.g. FILTERQL_COMPILER__RATE_INTERVAL_SECONDS
        builder = builder.add_source(
            Environment::with_prefix("FILTERQL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;
        let app_config: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(Some(path.as_ref()))
    }

    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    pub fn validate(&self) -> Result<()> {
        self.compiler.validate()?;
        self.catalog.validate()?;
        Ok(())
    }
}

impl CompilerConfig {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.rate_interval_seconds > 0,
            "compiler.rate_interval_seconds must be greater than 0"
        );
        anyhow::ensure!(
            self.suggestion_threshold > 0.0 && self.suggestion_threshold <= 1.0,
            "compiler.suggestion_threshold must be in (0, 1], got {}",
            self.suggestion_threshold
        );
        anyhow::ensure!(
            matches!(self.signal.as_str(), "logs" | "traces" | "metrics"),
            "compiler.signal must be one of logs, traces, metrics, got `{}`",
            self.signal
        );
        Ok(())
    }

    pub fn full_text_enabled(&self) -> bool {
        !self.full_text_column.is_empty()
    }
}

impl CatalogConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.path {
            anyhow::ensure!(
                path.exists(),
                "Catalog file not found: {}",
                path.display()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.compiler.full_text_column, "body");
        assert_eq!(config.compiler.rate_interval_seconds, 60);
        assert_eq!(config.compiler.suggestion_threshold, 0.75);
        assert_eq!(config.compiler.signal, "logs");
        assert!(config.compiler.full_text_enabled());
        assert!(config.catalog.path.is_none());
    }

    #[test]
    fn test_load_with_defaults() {
        let config = Config::load(None).expect("Failed to load config");
        assert_eq!(config.compiler.full_text_column, "body");
        assert!(!config.compiler.skip_resource_filter);
        assert_eq!(config.compiler.rate_interval_seconds, 60);
    }

    #[test]
    fn test_load_from_env() {
        // no other test reads this key
        std::env::set_var("FILTERQL_COMPILER__SKIP_FUNCTION_CALLS", "true");
        let config = Config::load(None);
        std::env::remove_var("FILTERQL_COMPILER__SKIP_FUNCTION_CALLS");
        assert!(config.unwrap().compiler.skip_function_calls);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("filterql-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[compiler]\nsignal = \"traces\"\nrate_interval_seconds = 300\nfull_text_column = \"\""
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.compiler.signal, "traces");
        assert_eq!(config.compiler.rate_interval_seconds, 300);
        assert!(!config.compiler.full_text_enabled());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/filterql.toml").unwrap_err();
        assert!(err.to_string().starts_with("Configuration file not found"));
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rate_interval() {
        let mut config = Config::default();
        config.compiler.rate_interval_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_suggestion_threshold() {
        let mut config = Config::default();
        config.compiler.suggestion_threshold = 1.5;
        assert!(config.validate().is_err());
        config.compiler.suggestion_threshold = 0.0;
        assert!(config.validate().is_err());
        config.compiler.suggestion_threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_signal() {
        let mut config = Config::default();
        config.compiler.signal = "events".to_string();
        assert!(config.validate().is_err());
    }
}
