/// Parser for filter expressions
///
/// Recursive descent over the token stream produced by the lexer. Errors do
/// not stop the parse: each one is recorded and the parser skips ahead to
/// the next `AND`, `OR`, `)` or end of input before continuing, so a single
/// pass reports every problem in the expression.
use crate::ast::*;
use crate::error::{expecting_message, render_expected, ParseError, SyntaxError};
use crate::lexer::{Lexer, Token, TokenKind};
use std::collections::BTreeSet;
use tracing::debug;

type PResult<T> = Result<T, SyntaxError>;

const PRIMARY_START: &[TokenKind] = &[
    TokenKind::LParen,
    TokenKind::Key,
    TokenKind::QuotedText,
    TokenKind::Number,
    TokenKind::Bool,
    TokenKind::FreeText,
    TokenKind::Has,
    TokenKind::HasAny,
    TokenKind::HasAll,
    TokenKind::HasToken,
];

const VALUE_START: &[TokenKind] = &[
    TokenKind::QuotedText,
    TokenKind::Number,
    TokenKind::Bool,
    TokenKind::Key,
];

/// Result of parsing with every diagnostic the parser produced
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub query: Query,
    pub tokens: Vec<Token>,
    pub errors: Vec<SyntaxError>,
    /// Places where the input could be read more than one way, with the
    /// reading that was chosen
    pub ambiguities: Vec<String>,
}

impl ParseOutput {
    pub fn into_result(self) -> Result<Query, ParseError> {
        if self.errors.is_empty() {
            Ok(self.query)
        } else {
            Err(ParseError {
                errors: self.errors,
            })
        }
    }

    /// Whether the expression contains an `OR` anywhere
    pub fn has_or(&self) -> bool {
        self.tokens.iter().any(|t| t.kind == TokenKind::Or)
    }
}

/// Parser for filter expressions
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    errors: Vec<SyntaxError>,
    rules: Vec<&'static str>,
    ambiguities: Vec<String>,
}

impl Parser {
    /// Create a new parser from a filter expression
    pub fn new(input: &str) -> Self {
        let (tokens, errors) = Lexer::new(input).tokenize();
        Self {
            tokens,
            position: 0,
            errors,
            rules: Vec::new(),
            ambiguities: Vec::new(),
        }
    }

    /// Parse the whole expression, collecting errors instead of stopping
    pub fn parse(mut self) -> ParseOutput {
        let query = self.parse_query();
        if !self.errors.is_empty() {
            debug!(errors = self.errors.len(), "filter expression has syntax errors");
        }
        ParseOutput {
            query,
            tokens: self.tokens,
            errors: self.errors,
            ambiguities: self.ambiguities,
        }
    }

    fn parse_query(&mut self) -> Query {
        self.rules.push("query");
        if self.current_token().is(TokenKind::Eof) {
            self.rules.pop();
            return Query { expression: None };
        }

        let expression = self.parse_or_expr();

        if !self.current_token().is(TokenKind::Eof) {
            let token = self.current_token().clone();
            let kind = if token.is(TokenKind::RParen) {
                "extraneous"
            } else {
                "mismatched"
            };
            let message = format!("{} input {} expecting <EOF>", kind, token);
            let err = SyntaxError::new(
                token.line,
                token.column,
                Some(token.text.clone()),
                vec!["EOF".to_string()],
                message,
            )
            .with_rule_stack(self.rules.clone());
            self.errors.push(err);
        }
        self.rules.pop();

        Query {
            expression: Some(expression),
        }
    }

    /// Parse OR expression (lowest precedence)
    fn parse_or_expr(&mut self) -> OrExpression {
        self.rules.push("orExpression");
        let mut branches = vec![self.parse_and_expr()];
        while self.current_token().is(TokenKind::Or) {
            self.advance();
            branches.push(self.parse_and_expr());
        }
        self.rules.pop();
        OrExpression { branches }
    }

    /// Parse AND expression. Adjacent terms without an operator are joined
    /// with an implicit AND.
    fn parse_and_expr(&mut self) -> AndExpression {
        self.rules.push("andExpression");
        let mut terms = Vec::new();
        loop {
            match self.parse_unary_expr() {
                Ok(term) => terms.push(term),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }

            if self.current_token().is(TokenKind::And) {
                self.advance();
                continue;
            }
            if self.starts_unary(self.current_token().kind) {
                continue;
            }
            break;
        }
        self.rules.pop();
        AndExpression { terms }
    }

    fn parse_unary_expr(&mut self) -> PResult<UnaryExpression> {
        self.rule("unaryExpression", |p| {
            let negated = if p.current_token().is(TokenKind::Not) {
                p.advance();
                true
            } else {
                false
            };
            let primary = p.parse_primary()?;
            Ok(UnaryExpression { negated, primary })
        })
    }

    fn parse_primary(&mut self) -> PResult<Primary> {
        self.rule("primary", |p| {
            let token = p.current_token().clone();
            match token.kind {
                TokenKind::LParen => {
                    p.advance();
                    let expr = p.parse_or_expr();
                    if !p.current_token().is(TokenKind::RParen) {
                        return Err(p.error_expected(&[
                            TokenKind::RParen,
                            TokenKind::And,
                            TokenKind::Or,
                        ]));
                    }
                    p.advance();
                    Ok(Primary::Group(expr))
                }
                TokenKind::Has | TokenKind::HasAny | TokenKind::HasAll | TokenKind::HasToken => {
                    Ok(Primary::FunctionCall(p.parse_function_call()?))
                }
                TokenKind::Key => {
                    if p.starts_comparison() {
                        return Ok(Primary::Comparison(p.parse_comparison()?));
                    }
                    p.advance();
                    p.ambiguities.push(format!(
                        "line {}:{} '{}' has no operator and is read as a search term",
                        token.line, token.column, token.text
                    ));
                    Ok(Primary::Key(Key {
                        text: token.text,
                        line: token.line,
                        column: token.column,
                    }))
                }
                TokenKind::QuotedText => {
                    p.advance();
                    Ok(Primary::FullText(FullText::Quoted(token.text)))
                }
                TokenKind::FreeText => {
                    p.advance();
                    Ok(Primary::FullText(FullText::Free(token.text)))
                }
                TokenKind::Number => {
                    p.advance();
                    Ok(Primary::Value(ValueLiteral::Number(token.text)))
                }
                TokenKind::Bool => {
                    p.advance();
                    Ok(Primary::Value(ValueLiteral::Bool(token.text)))
                }
                _ => Err(p.error_expected(PRIMARY_START)),
            }
        })
    }

    fn starts_comparison(&self) -> bool {
        match self.peek_kind(1) {
            TokenKind::Equals
            | TokenKind::NotEquals
            | TokenKind::Neq
            | TokenKind::Lt
            | TokenKind::Le
            | TokenKind::Gt
            | TokenKind::Ge
            | TokenKind::Like
            | TokenKind::ILike
            | TokenKind::Between
            | TokenKind::Exists
            | TokenKind::Regexp
            | TokenKind::Contains
            | TokenKind::In => true,
            TokenKind::Not => matches!(
                self.peek_kind(2),
                TokenKind::Like
                    | TokenKind::ILike
                    | TokenKind::Between
                    | TokenKind::Exists
                    | TokenKind::Regexp
                    | TokenKind::Contains
                    | TokenKind::In
            ),
            _ => false,
        }
    }

    fn parse_comparison(&mut self) -> PResult<Comparison> {
        self.rule("comparison", |p| {
            let key = p.parse_key()?;

            let negated = if p.current_token().is(TokenKind::Not) {
                p.advance();
                true
            } else {
                false
            };

            let op = p.current_token().kind;
            let kind = match op {
                TokenKind::Between => {
                    p.advance();
                    let low = p.parse_value()?;
                    p.expect_token(TokenKind::And)?;
                    let high = p.parse_value()?;
                    ComparisonKind::Between { negated, low, high }
                }
                TokenKind::Exists => {
                    p.advance();
                    ComparisonKind::Exists { negated }
                }
                TokenKind::In => {
                    let values = p.parse_in_clause()?;
                    ComparisonKind::In { negated, values }
                }
                _ => {
                    let op = match (op, negated) {
                        (TokenKind::Equals, false) => CompareOp::Equals,
                        (TokenKind::NotEquals, false) => CompareOp::NotEquals,
                        (TokenKind::Neq, false) => CompareOp::Neq,
                        (TokenKind::Lt, false) => CompareOp::Lt,
                        (TokenKind::Le, false) => CompareOp::Le,
                        (TokenKind::Gt, false) => CompareOp::Gt,
                        (TokenKind::Ge, false) => CompareOp::Ge,
                        (TokenKind::Like, negated) => CompareOp::Like { negated },
                        (TokenKind::ILike, negated) => CompareOp::ILike { negated },
                        (TokenKind::Regexp, negated) => CompareOp::Regexp { negated },
                        (TokenKind::Contains, negated) => CompareOp::Contains { negated },
                        _ => {
                            return Err(p.error_expected(&[
                                TokenKind::Like,
                                TokenKind::ILike,
                                TokenKind::Between,
                                TokenKind::Exists,
                                TokenKind::Regexp,
                                TokenKind::Contains,
                                TokenKind::In,
                            ]))
                        }
                    };
                    p.advance();
                    let value = p.parse_value()?;
                    ComparisonKind::Binary { op, value }
                }
            };

            Ok(Comparison { key, kind })
        })
    }

    fn parse_in_clause(&mut self) -> PResult<InValues> {
        self.rule("inClause", |p| {
            p.expect_token(TokenKind::In)?;
            match p.current_token().kind {
                TokenKind::LParen => {
                    p.advance();
                    let values = p.parse_value_list(TokenKind::RParen)?;
                    Ok(InValues::Paren(values))
                }
                TokenKind::LBrack => {
                    p.advance();
                    let values = p.parse_value_list(TokenKind::RBrack)?;
                    Ok(InValues::Bracket(values))
                }
                kind if VALUE_START.contains(&kind) => Ok(InValues::Single(p.parse_value()?)),
                _ => {
                    let mut expected = vec![TokenKind::LParen, TokenKind::LBrack];
                    expected.extend_from_slice(VALUE_START);
                    Err(p.error_expected(&expected))
                }
            }
        })
    }

    /// Parse `value (, value)*` followed by the closing token
    fn parse_value_list(&mut self, close: TokenKind) -> PResult<Vec<ValueLiteral>> {
        self.rule("valueList", |p| {
            let mut values = vec![p.parse_value()?];
            loop {
                match p.current_token().kind {
                    TokenKind::Comma => {
                        p.advance();
                        values.push(p.parse_value()?);
                    }
                    kind if kind == close => {
                        p.advance();
                        return Ok(values);
                    }
                    _ => return Err(p.error_expected(&[close, TokenKind::Comma])),
                }
            }
        })
    }

    fn parse_function_call(&mut self) -> PResult<FunctionCall> {
        self.rule("functionCall", |p| {
            let name = match p.current_token().kind {
                TokenKind::Has => FunctionName::Has,
                TokenKind::HasAny => FunctionName::HasAny,
                TokenKind::HasAll => FunctionName::HasAll,
                _ => FunctionName::HasToken,
            };
            p.advance();
            p.expect_token(TokenKind::LParen)?;

            let mut params = vec![p.parse_function_param()?];
            loop {
                match p.current_token().kind {
                    TokenKind::Comma => {
                        p.advance();
                        params.push(p.parse_function_param()?);
                    }
                    TokenKind::RParen => {
                        p.advance();
                        return Ok(FunctionCall { name, params });
                    }
                    _ => return Err(p.error_expected(&[TokenKind::RParen, TokenKind::Comma])),
                }
            }
        })
    }

    fn parse_function_param(&mut self) -> PResult<FunctionParam> {
        self.rule("functionParam", |p| match p.current_token().kind {
            TokenKind::Key => Ok(FunctionParam::Key(p.parse_key()?)),
            TokenKind::LBrack => {
                p.advance();
                Ok(FunctionParam::Array(p.parse_value_list(TokenKind::RBrack)?))
            }
            kind if VALUE_START.contains(&kind) => Ok(FunctionParam::Value(p.parse_value()?)),
            _ => {
                let mut expected = vec![TokenKind::LBrack];
                expected.extend_from_slice(VALUE_START);
                Err(p.error_expected(&expected))
            }
        })
    }

    fn parse_key(&mut self) -> PResult<Key> {
        let token = self.current_token().clone();
        if !token.is(TokenKind::Key) {
            return Err(self.error_expected(&[TokenKind::Key]));
        }
        self.advance();
        Ok(Key {
            text: token.text,
            line: token.line,
            column: token.column,
        })
    }

    fn parse_value(&mut self) -> PResult<ValueLiteral> {
        self.rule("value", |p| {
            let token = p.current_token().clone();
            let value = match token.kind {
                TokenKind::QuotedText => ValueLiteral::Quoted(token.text),
                TokenKind::Number => ValueLiteral::Number(token.text),
                TokenKind::Bool => ValueLiteral::Bool(token.text),
                TokenKind::Key => ValueLiteral::Key(token.text),
                _ => return Err(p.error_expected(VALUE_START)),
            };
            p.advance();
            Ok(value)
        })
    }

    fn rule<T>(&mut self, name: &'static str, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        self.rules.push(name);
        let result = f(self);
        self.rules.pop();
        result
    }

    fn starts_unary(&self, kind: TokenKind) -> bool {
        kind == TokenKind::Not || PRIMARY_START.contains(&kind)
    }

    /// Skip to a token the enclosing rules can resume from
    fn synchronize(&mut self) {
        while !matches!(
            self.current_token().kind,
            TokenKind::And | TokenKind::Or | TokenKind::RParen | TokenKind::Eof
        ) {
            self.advance();
        }
    }

    fn current_token(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.position.min(last)]
    }

    fn peek_kind(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.position + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn expect_token(&mut self, expected: TokenKind) -> PResult<()> {
        if self.current_token().is(expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_expected(&[expected]))
        }
    }

    fn error_expected(&self, expected: &[TokenKind]) -> SyntaxError {
        let token = self.current_token();
        let set: BTreeSet<TokenKind> = expected.iter().copied().collect();
        let names = render_expected(&set);
        let got = token.to_string();
        let offending = (!token.is(TokenKind::Eof)).then(|| token.text.clone());
        SyntaxError::new(
            token.line,
            token.column,
            offending,
            names.clone(),
            expecting_message(&names, &got),
        )
        .with_rule_stack(self.rules.clone())
    }
}

/// Parse a filter expression, failing with every syntax error found
pub fn parse(input: &str) -> Result<Query, ParseError> {
    Parser::new(input).parse().into_result()
}
