/// Error handling for query compilation
///
/// Problems found while walking one expression are collected as
/// `Diagnostic`s and reported together, so a caller sees every problem in a
/// single round trip. They are rendered to text only when the error is
/// displayed.
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Troubleshooting guide for filter expressions
pub const SEARCH_TROUBLESHOOTING_URL: &str = "https://signoz.io/docs/userguide/search-troubleshooting/";
pub const KEY_NOT_FOUND_URL: &str =
    "https://signoz.io/docs/userguide/search-troubleshooting/#key-fieldname-not-found";
pub const BODY_ONLY_FUNCTION_URL: &str =
    "https://signoz.io/docs/userguide/search-troubleshooting/#function-supports-only-body-json-search";
pub const HAS_TOKEN_URL: &str = "https://signoz.io/docs/userguide/functions-reference/#hastoken-function";
pub const STRING_MATCHING_URL: &str =
    "https://signoz.io/docs/userguide/operators-reference/#string-matching-operators";
pub const FIELD_CONTEXT_URL: &str = "https://signoz.io/docs/userguide/field-context-data-types/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Machine-readable category of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Syntax,
    UnknownKey,
    AmbiguousKey,
    MissingBodyKey,
    UnsupportedFunction,
    FunctionArguments,
    EmptyVariable,
    FullTextUnsupported,
    ConditionFailed,
    LikeWithoutWildcards,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    /// `(line, column)` of the token the diagnostic is about, when known
    pub location: Option<(usize, usize)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_url: Option<&'static str>,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            message: message.into(),
            location: None,
            doc_url: None,
        }
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            message: message.into(),
            location: None,
            doc_url: None,
        }
    }

    pub fn with_doc_url(mut self, url: &'static str) -> Self {
        self.doc_url = Some(url);
        self
    }

    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.location = Some((line, column));
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&filterql::SyntaxError> for Diagnostic {
    fn from(err: &filterql::SyntaxError) -> Self {
        Diagnostic::error(DiagnosticKind::Syntax, err.to_string()).at(err.line, err.column)
    }
}

/// Errors raised while compiling filter, aggregation and `Having` expressions
#[derive(Debug, Clone, Error)]
pub enum QueryBuilderError {
    #[error("Found {count} syntax errors while parsing the search expression.")]
    Syntax {
        count: usize,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("Found {count} errors while parsing the search expression.")]
    Semantic {
        count: usize,
        diagnostics: Vec<Diagnostic>,
    },

    /// A `Having` expression that cannot be applied to the aggregation results
    #[error("{message}")]
    Validation {
        message: String,
        additional: Vec<String>,
    },

    #[error("column not found for key `{0}`")]
    ColumnNotFound(String),

    #[error("{0}")]
    Condition(String),

    #[error("failed to parse expression: {0}")]
    SqlParse(String),

    #[error("{0}")]
    InvalidArgument(String),
}

impl QueryBuilderError {
    pub fn syntax(diagnostics: Vec<Diagnostic>) -> Self {
        QueryBuilderError::Syntax {
            count: diagnostics.len(),
            diagnostics,
        }
    }

    pub fn semantic(diagnostics: Vec<Diagnostic>) -> Self {
        QueryBuilderError::Semantic {
            count: diagnostics.len(),
            diagnostics,
        }
    }

    pub fn validation(message: impl Into<String>, additional: Vec<String>) -> Self {
        QueryBuilderError::Validation {
            message: message.into(),
            additional,
        }
    }

    /// Individual messages that explain the top-level error
    pub fn additional(&self) -> Vec<String> {
        match self {
            QueryBuilderError::Syntax { diagnostics, .. }
            | QueryBuilderError::Semantic { diagnostics, .. } => {
                diagnostics.iter().map(|d| d.to_string()).collect()
            }
            QueryBuilderError::Validation { additional, .. } => additional.clone(),
            _ => Vec::new(),
        }
    }

    /// Documentation page for the first diagnostic that names one, falling
    /// back to the troubleshooting guide for expression errors
    pub fn url(&self) -> Option<&'static str> {
        match self {
            QueryBuilderError::Syntax { diagnostics, .. }
            | QueryBuilderError::Semantic { diagnostics, .. } => Some(
                diagnostics
                    .iter()
                    .find_map(|d| d.doc_url)
                    .unwrap_or(SEARCH_TROUBLESHOOTING_URL),
            ),
            _ => None,
        }
    }
}

impl From<filterql::ParseError> for QueryBuilderError {
    fn from(err: filterql::ParseError) -> Self {
        QueryBuilderError::syntax(err.errors.iter().map(Diagnostic::from).collect())
    }
}

pub type Result<T> = std::result::Result<T, QueryBuilderError>;
