/// Syntax errors and the friendly rendering of expected tokens
use crate::lexer::TokenKind;
use std::collections::BTreeSet;
use thiserror::Error;

/// A single syntax error reported by the lexer or a parser
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}:{column} {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    /// Text of the offending token, `None` at end of input
    pub offending: Option<String>,
    /// Friendly names of the tokens the parser could have accepted
    pub expected: Vec<String>,
    /// Grammar rules active when the error was raised, outermost first
    pub rule_stack: Vec<&'static str>,
    pub message: String,
}

impl SyntaxError {
    pub fn new(
        line: usize,
        column: usize,
        offending: Option<String>,
        expected: Vec<String>,
        message: String,
    ) -> Self {
        Self {
            line,
            column,
            offending,
            expected,
            rule_stack: Vec::new(),
            message,
        }
    }

    pub fn with_rule_stack(mut self, rule_stack: Vec<&'static str>) -> Self {
        self.rule_stack = rule_stack;
        self
    }
}

/// All syntax errors found in one expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Found {} syntax errors while parsing the search expression.", .errors.len())]
pub struct ParseError {
    pub errors: Vec<SyntaxError>,
}

impl ParseError {
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}

/// Human-readable name of a filter grammar token
pub fn friendly_token_name(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::LParen => "(",
        TokenKind::RParen => ")",
        TokenKind::LBrack => "[",
        TokenKind::RBrack => "]",
        TokenKind::Comma => ",",
        TokenKind::Equals => "=",
        TokenKind::NotEquals => "!=",
        TokenKind::Neq => "<>",
        TokenKind::Lt => "<",
        TokenKind::Le => "<=",
        TokenKind::Gt => ">",
        TokenKind::Ge => ">=",
        TokenKind::Like => "LIKE",
        TokenKind::ILike => "ILIKE",
        TokenKind::Between => "BETWEEN",
        TokenKind::Exists => "EXISTS",
        TokenKind::Regexp => "REGEXP",
        TokenKind::Contains => "CONTAINS",
        TokenKind::In => "IN",
        TokenKind::Not => "NOT",
        TokenKind::And => "AND",
        TokenKind::Or => "OR",
        TokenKind::HasToken => "hasToken",
        TokenKind::Has => "has",
        TokenKind::HasAny => "hasAny",
        TokenKind::HasAll => "hasAll",
        TokenKind::Bool => "boolean",
        TokenKind::Number => "number",
        TokenKind::QuotedText => "quoted text",
        TokenKind::Key => "field name (ex: service.name)",
        TokenKind::FreeText => "free text",
        TokenKind::Eof => "EOF",
    }
}

/// Render an expected-token set as sorted friendly names.
///
/// When literal tokens are expected next to `KEY` the key is shown in its
/// short form; when other, non-literal tokens are expected it is dropped.
pub fn render_expected(expected: &BTreeSet<TokenKind>) -> Vec<String> {
    let has_literal = expected.iter().any(|k| {
        matches!(
            k,
            TokenKind::Number | TokenKind::Bool | TokenKind::QuotedText
        )
    });
    let mut names: Vec<String> = expected
        .iter()
        .filter_map(|&kind| match kind {
            TokenKind::Key if has_literal => Some("field name".to_string()),
            TokenKind::Key if expected.len() > 1 => None,
            other => Some(friendly_token_name(other).to_string()),
        })
        .collect();
    names.sort();
    names.dedup();
    names
}

/// `expecting one of {..} but got X`, or the single-token form.
pub fn expecting_message(names: &[String], got: &str) -> String {
    if names.len() == 1 {
        format!("mismatched input {} expecting {}", got, names[0])
    } else {
        format!("expecting one of {{{}}} but got {}", names.join(", "), got)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shown_short_next_to_literals() {
        let expected: BTreeSet<TokenKind> = [
            TokenKind::QuotedText,
            TokenKind::Number,
            TokenKind::Bool,
            TokenKind::Key,
        ]
        .into_iter()
        .collect();
        assert_eq!(
            render_expected(&expected),
            vec!["boolean", "field name", "number", "quoted text"]
        );
    }

    #[test]
    fn test_key_dropped_next_to_structural_tokens() {
        let expected: BTreeSet<TokenKind> = [TokenKind::LParen, TokenKind::Not, TokenKind::Key]
            .into_iter()
            .collect();
        assert_eq!(render_expected(&expected), vec!["(", "NOT"]);
    }

    #[test]
    fn test_key_alone() {
        let expected: BTreeSet<TokenKind> = [TokenKind::Key].into_iter().collect();
        assert_eq!(
            render_expected(&expected),
            vec!["field name (ex: service.name)"]
        );
    }

    #[test]
    fn test_display() {
        let err = SyntaxError::new(
            1,
            7,
            None,
            vec![")".to_string(), ",".to_string()],
            expecting_message(&[")".to_string(), ",".to_string()], "EOF"),
        );
        assert_eq!(err.to_string(), "line 1:7 expecting one of {), ,} but got EOF");
        let all = ParseError { errors: vec![err] };
        assert_eq!(
            all.to_string(),
            "Found 1 syntax errors while parsing the search expression."
        );
    }
}
