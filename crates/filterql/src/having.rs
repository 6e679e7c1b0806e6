/// Grammar for `Having` expressions
///
/// A having expression filters aggregated rows, so its operands are numeric:
/// aggregate references (aliases, expressions such as `count()`, result
/// columns), numbers and arithmetic over them. Unlike filter expressions
/// there is no implicit AND, `NOT` must be followed by a parenthesized
/// expression, and booleans are not values.
use crate::error::{expecting_message, SyntaxError};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HavingTokenKind {
    LParen,
    RParen,
    Comma,
    Equals,
    NotEquals,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    And,
    Or,
    Bool,
    Number,
    QuotedText,
    Identifier,
    Eof,
}

impl HavingTokenKind {
    pub fn friendly_name(&self) -> &'static str {
        match self {
            HavingTokenKind::LParen => "(",
            HavingTokenKind::RParen => ")",
            HavingTokenKind::Comma => ",",
            HavingTokenKind::Equals => "=",
            HavingTokenKind::NotEquals => "!=",
            HavingTokenKind::Neq => "<>",
            HavingTokenKind::Lt => "<",
            HavingTokenKind::Le => "<=",
            HavingTokenKind::Gt => ">",
            HavingTokenKind::Ge => ">=",
            HavingTokenKind::Plus => "+",
            HavingTokenKind::Minus => "-",
            HavingTokenKind::Star => "*",
            HavingTokenKind::Slash => "/",
            HavingTokenKind::Percent => "%",
            HavingTokenKind::Not => "NOT",
            HavingTokenKind::And => "AND",
            HavingTokenKind::Or => "OR",
            HavingTokenKind::Bool => "boolean",
            HavingTokenKind::Number => "number",
            HavingTokenKind::QuotedText => "quoted text",
            HavingTokenKind::Identifier => "IDENTIFIER",
            HavingTokenKind::Eof => "EOF",
        }
    }

    fn is_comparison(&self) -> bool {
        matches!(
            self,
            HavingTokenKind::Equals
                | HavingTokenKind::NotEquals
                | HavingTokenKind::Neq
                | HavingTokenKind::Lt
                | HavingTokenKind::Le
                | HavingTokenKind::Gt
                | HavingTokenKind::Ge
        )
    }

    fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            HavingTokenKind::Plus
                | HavingTokenKind::Minus
                | HavingTokenKind::Star
                | HavingTokenKind::Slash
                | HavingTokenKind::Percent
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HavingToken {
    pub kind: HavingTokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for HavingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == HavingTokenKind::Eof {
            write!(f, "EOF")
        } else {
            write!(f, "'{}'", self.text)
        }
    }
}

const COMPARISON_OPS: &[HavingTokenKind] = &[
    HavingTokenKind::Equals,
    HavingTokenKind::NotEquals,
    HavingTokenKind::Neq,
    HavingTokenKind::Lt,
    HavingTokenKind::Le,
    HavingTokenKind::Gt,
    HavingTokenKind::Ge,
];

const ARITHMETIC_OPS: &[HavingTokenKind] = &[
    HavingTokenKind::Plus,
    HavingTokenKind::Minus,
    HavingTokenKind::Star,
    HavingTokenKind::Slash,
    HavingTokenKind::Percent,
];

const OPERAND_START: &[HavingTokenKind] = &[
    HavingTokenKind::LParen,
    HavingTokenKind::Plus,
    HavingTokenKind::Minus,
    HavingTokenKind::Identifier,
    HavingTokenKind::Number,
    HavingTokenKind::QuotedText,
];

/// Tokenizer for having expressions
struct HavingLexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl HavingLexer {
    fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 0,
        }
    }

    fn tokenize(mut self) -> (Vec<HavingToken>, Vec<SyntaxError>) {
        let mut tokens = Vec::new();
        let mut errors = Vec::new();
        loop {
            while self.current_char().is_some_and(char::is_whitespace) {
                self.advance();
            }
            let at = (self.line, self.column);
            let Some(ch) = self.current_char() else {
                tokens.push(self.token(HavingTokenKind::Eof, String::new(), at));
                break;
            };
            match self.scan(ch) {
                Some((kind, text)) => tokens.push(self.token(kind, text, at)),
                None => {
                    self.advance();
                    errors.push(SyntaxError::new(
                        at.0,
                        at.1,
                        Some(ch.to_string()),
                        Vec::new(),
                        format!("token recognition error at: '{}'", ch),
                    ));
                }
            }
        }
        (tokens, errors)
    }

    fn token(&self, kind: HavingTokenKind, text: String, at: (usize, usize)) -> HavingToken {
        HavingToken {
            kind,
            text,
            line: at.0,
            column: at.1,
        }
    }

    fn scan(&mut self, ch: char) -> Option<(HavingTokenKind, String)> {
        let two: String = self.input[self.position..].iter().take(2).collect();
        let double = match two.as_str() {
            "==" => Some(HavingTokenKind::Equals),
            "!=" => Some(HavingTokenKind::NotEquals),
            "<>" => Some(HavingTokenKind::Neq),
            "<=" => Some(HavingTokenKind::Le),
            ">=" => Some(HavingTokenKind::Ge),
            _ => None,
        };
        if let Some(kind) = double {
            self.advance();
            self.advance();
            return Some((kind, two));
        }

        let single = match ch {
            '(' => Some(HavingTokenKind::LParen),
            ')' => Some(HavingTokenKind::RParen),
            ',' => Some(HavingTokenKind::Comma),
            '=' => Some(HavingTokenKind::Equals),
            '<' => Some(HavingTokenKind::Lt),
            '>' => Some(HavingTokenKind::Gt),
            '+' => Some(HavingTokenKind::Plus),
            '-' => Some(HavingTokenKind::Minus),
            '*' => Some(HavingTokenKind::Star),
            '/' => Some(HavingTokenKind::Slash),
            '%' => Some(HavingTokenKind::Percent),
            _ => None,
        };
        if let Some(kind) = single {
            self.advance();
            return Some((kind, ch.to_string()));
        }

        if ch == '\'' || ch == '"' {
            return self.scan_quoted(ch);
        }
        if ch.is_ascii_digit() || (ch == '.' && self.peek().is_some_and(|c| c.is_ascii_digit())) {
            return Some((HavingTokenKind::Number, self.scan_number()));
        }
        if ch.is_alphabetic() || ch == '_' {
            let text = self.take_while(|c| c.is_alphanumeric() || c == '_' || c == '.');
            let kind = match text.to_ascii_lowercase().as_str() {
                "and" => HavingTokenKind::And,
                "or" => HavingTokenKind::Or,
                "not" => HavingTokenKind::Not,
                "true" | "false" => HavingTokenKind::Bool,
                _ => HavingTokenKind::Identifier,
            };
            return Some((kind, text));
        }
        None
    }

    fn scan_quoted(&mut self, quote: char) -> Option<(HavingTokenKind, String)> {
        let start = self.position;
        self.advance();
        while let Some(c) = self.current_char() {
            self.advance();
            if c == '\\' {
                self.advance();
            } else if c == quote {
                let text: String = self.input[start..self.position].iter().collect();
                return Some((HavingTokenKind::QuotedText, text));
            }
        }
        // Unterminated: rewind so the quote is reported on its own
        self.position = start;
        None
    }

    fn scan_number(&mut self) -> String {
        let mut text = self.take_while(|c| c.is_ascii_digit());
        if self.current_char() == Some('.') {
            self.advance();
            text.push('.');
            text.push_str(&self.take_while(|c| c.is_ascii_digit()));
        }
        if matches!(self.current_char(), Some('e' | 'E')) {
            let sign = matches!(self.peek(), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self
                .input
                .get(self.position + digit_at)
                .is_some_and(|c| c.is_ascii_digit())
            {
                for _ in 0..digit_at {
                    if let Some(c) = self.current_char() {
                        text.push(c);
                    }
                    self.advance();
                }
                text.push_str(&self.take_while(|c| c.is_ascii_digit()));
            }
        }
        text
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.current_char() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.advance();
        }
        out
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        if let Some(c) = self.current_char() {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
            self.position += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HavingExpr {
    Or(Vec<HavingExpr>),
    And(Vec<HavingExpr>),
    /// `NOT ( expr )`
    Not(Box<HavingExpr>),
    Group(Box<HavingExpr>),
    Comparison {
        left: Operand,
        op: HavingTokenKind,
        right: Operand,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Binary {
        left: Box<Operand>,
        op: HavingTokenKind,
        right: Box<Operand>,
    },
    Unary {
        op: HavingTokenKind,
        operand: Box<Operand>,
    },
    Paren(Box<Operand>),
    Call {
        name: String,
        args: Vec<Operand>,
    },
    Identifier(String),
    Number(String),
    Quoted(String),
}

/// An aggregate reference used by a having expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HavingReference {
    Identifier(String),
    /// A function call, with its text rendered as `name(arg, ...)`
    Call { name: String, text: String },
}

impl HavingReference {
    pub fn text(&self) -> &str {
        match self {
            HavingReference::Identifier(name) => name,
            HavingReference::Call { text, .. } => text,
        }
    }
}

impl HavingExpr {
    /// Identifiers and function calls referenced by the expression, in
    /// order of appearance. Arguments of a call are part of the call and
    /// are not reported separately.
    pub fn references(&self) -> Vec<HavingReference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<HavingReference>) {
        match self {
            HavingExpr::Or(children) | HavingExpr::And(children) => {
                children.iter().for_each(|c| c.collect_references(out))
            }
            HavingExpr::Not(inner) | HavingExpr::Group(inner) => inner.collect_references(out),
            HavingExpr::Comparison { left, right, .. } => {
                left.collect_references(out);
                right.collect_references(out);
            }
        }
    }
}

impl Operand {
    fn collect_references(&self, out: &mut Vec<HavingReference>) {
        match self {
            Operand::Binary { left, right, .. } => {
                left.collect_references(out);
                right.collect_references(out);
            }
            Operand::Unary { operand, .. } | Operand::Paren(operand) => {
                operand.collect_references(out)
            }
            Operand::Call { name, .. } => out.push(HavingReference::Call {
                name: name.clone(),
                text: self.to_string(),
            }),
            Operand::Identifier(name) => out.push(HavingReference::Identifier(name.clone())),
            Operand::Number(_) | Operand::Quoted(_) => {}
        }
    }
}

impl fmt::Display for HavingExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HavingExpr::Or(children) => write_joined(f, children, " OR "),
            HavingExpr::And(children) => write_joined(f, children, " AND "),
            HavingExpr::Not(inner) => write!(f, "NOT ({})", inner),
            HavingExpr::Group(inner) => write!(f, "({})", inner),
            HavingExpr::Comparison { left, op, right } => {
                write!(f, "{} {} {}", left, op.friendly_name(), right)
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Binary { left, op, right } => {
                write!(f, "{} {} {}", left, op.friendly_name(), right)
            }
            Operand::Unary { op, operand } => write!(f, "{}{}", op.friendly_name(), operand),
            Operand::Paren(inner) => write!(f, "({})", inner),
            Operand::Call { name, args } => {
                write!(f, "{}(", name)?;
                write_joined(f, args, ", ")?;
                write!(f, ")")
            }
            Operand::Identifier(s) | Operand::Number(s) | Operand::Quoted(s) => f.write_str(s),
        }
    }
}

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

type PResult<T> = Result<T, SyntaxError>;

/// Recursive descent parser for having expressions
pub struct HavingParser {
    tokens: Vec<HavingToken>,
    position: usize,
    errors: Vec<SyntaxError>,
}

impl HavingParser {
    pub fn new(input: &str) -> Self {
        let (tokens, errors) = HavingLexer::new(input).tokenize();
        Self {
            tokens,
            position: 0,
            errors,
        }
    }

    /// Parse the expression. Blank input yields `Ok(None)`.
    pub fn parse(mut self) -> Result<Option<HavingExpr>, Vec<SyntaxError>> {
        if self.current_token().kind == HavingTokenKind::Eof {
            return if self.errors.is_empty() {
                Ok(None)
            } else {
                Err(self.errors)
            };
        }

        let expr = self.parse_or_expr();

        let token = self.current_token().clone();
        if token.kind != HavingTokenKind::Eof {
            let kind = if token.kind == HavingTokenKind::RParen {
                "extraneous"
            } else {
                "mismatched"
            };
            self.errors.push(SyntaxError::new(
                token.line,
                token.column,
                Some(token.text.clone()),
                vec!["EOF".to_string()],
                format!("{} input {} expecting <EOF>", kind, token),
            ));
        }

        if self.errors.is_empty() {
            Ok(Some(expr))
        } else {
            Err(self.errors)
        }
    }

    fn parse_or_expr(&mut self) -> HavingExpr {
        let mut branches = vec![self.parse_and_expr()];
        while self.current_token().kind == HavingTokenKind::Or {
            self.advance();
            branches.push(self.parse_and_expr());
        }
        collapse(branches, HavingExpr::Or)
    }

    fn parse_and_expr(&mut self) -> HavingExpr {
        let mut terms = Vec::new();
        loop {
            match self.parse_primary() {
                Ok(term) => terms.push(term),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
            if self.current_token().kind != HavingTokenKind::And {
                break;
            }
            self.advance();
        }
        collapse(terms, HavingExpr::And)
    }

    fn parse_primary(&mut self) -> PResult<HavingExpr> {
        match self.current_token().kind {
            HavingTokenKind::Not => {
                self.advance();
                self.expect_token(HavingTokenKind::LParen)?;
                let inner = self.parse_or_expr();
                self.expect_token(HavingTokenKind::RParen)?;
                Ok(HavingExpr::Not(Box::new(inner)))
            }
            HavingTokenKind::LParen if !self.paren_starts_operand() => {
                self.advance();
                let inner = self.parse_or_expr();
                self.expect_token(HavingTokenKind::RParen)?;
                Ok(HavingExpr::Group(Box::new(inner)))
            }
            kind if OPERAND_START.contains(&kind) => self.parse_comparison(),
            _ => {
                let mut expected = vec![HavingTokenKind::Not];
                expected.extend_from_slice(OPERAND_START);
                Err(self.error_expected(&expected))
            }
        }
    }

    /// Whether the `(` at the cursor opens an arithmetic operand such as
    /// `(a + b) > 5` rather than a boolean group
    fn paren_starts_operand(&self) -> bool {
        let mut depth = 0usize;
        for (offset, token) in self.tokens[self.position..].iter().enumerate() {
            match token.kind {
                HavingTokenKind::LParen => depth += 1,
                HavingTokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        let next = self
                            .tokens
                            .get(self.position + offset + 1)
                            .map(|t| t.kind)
                            .unwrap_or(HavingTokenKind::Eof);
                        return next.is_comparison() || next.is_arithmetic();
                    }
                }
                HavingTokenKind::Eof => return false,
                _ => {}
            }
        }
        false
    }

    fn parse_comparison(&mut self) -> PResult<HavingExpr> {
        let left = self.parse_operand()?;
        let op = self.current_token().kind;
        if !op.is_comparison() {
            let mut expected = COMPARISON_OPS.to_vec();
            expected.extend_from_slice(ARITHMETIC_OPS);
            return Err(self.error_expected(&expected));
        }
        self.advance();
        let right = self.parse_operand()?;
        Ok(HavingExpr::Comparison { left, op, right })
    }

    /// Additive level of an arithmetic operand
    fn parse_operand(&mut self) -> PResult<Operand> {
        let mut left = self.parse_term()?;
        while matches!(
            self.current_token().kind,
            HavingTokenKind::Plus | HavingTokenKind::Minus
        ) {
            let op = self.current_token().kind;
            self.advance();
            let right = self.parse_term()?;
            left = Operand::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> PResult<Operand> {
        let mut left = self.parse_factor()?;
        while matches!(
            self.current_token().kind,
            HavingTokenKind::Star | HavingTokenKind::Slash | HavingTokenKind::Percent
        ) {
            let op = self.current_token().kind;
            self.advance();
            let right = self.parse_factor()?;
            left = Operand::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> PResult<Operand> {
        let token = self.current_token().clone();
        match token.kind {
            HavingTokenKind::Plus | HavingTokenKind::Minus => {
                self.advance();
                let operand = self.parse_factor()?;
                Ok(Operand::Unary {
                    op: token.kind,
                    operand: Box::new(operand),
                })
            }
            HavingTokenKind::LParen => {
                self.advance();
                let inner = self.parse_operand()?;
                self.expect_token(HavingTokenKind::RParen)?;
                Ok(Operand::Paren(Box::new(inner)))
            }
            HavingTokenKind::Identifier => {
                self.advance();
                if self.current_token().kind == HavingTokenKind::LParen {
                    self.advance();
                    let args = self.parse_function_args()?;
                    Ok(Operand::Call {
                        name: token.text,
                        args,
                    })
                } else {
                    Ok(Operand::Identifier(token.text))
                }
            }
            HavingTokenKind::Number => {
                self.advance();
                Ok(Operand::Number(token.text))
            }
            HavingTokenKind::QuotedText => {
                self.advance();
                Ok(Operand::Quoted(token.text))
            }
            _ => Err(self.error_expected(OPERAND_START)),
        }
    }

    /// Arguments after the opening parenthesis, through the closing one
    fn parse_function_args(&mut self) -> PResult<Vec<Operand>> {
        let mut args = Vec::new();
        if self.current_token().kind == HavingTokenKind::RParen {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_operand()?);
            match self.current_token().kind {
                HavingTokenKind::Comma => self.advance(),
                HavingTokenKind::RParen => {
                    self.advance();
                    return Ok(args);
                }
                _ => {
                    let mut expected = vec![HavingTokenKind::RParen, HavingTokenKind::Comma];
                    expected.extend_from_slice(ARITHMETIC_OPS);
                    return Err(self.error_expected(&expected));
                }
            }
        }
    }

    fn synchronize(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.current_token().kind {
                HavingTokenKind::Eof => return,
                HavingTokenKind::And | HavingTokenKind::Or if depth == 0 => return,
                HavingTokenKind::RParen if depth == 0 => return,
                HavingTokenKind::LParen => depth += 1,
                HavingTokenKind::RParen => depth -= 1,
                _ => {}
            }
            self.advance();
        }
    }

    fn current_token(&self) -> &HavingToken {
        let last = self.tokens.len() - 1;
        &self.tokens[self.position.min(last)]
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn expect_token(&mut self, expected: HavingTokenKind) -> PResult<()> {
        if self.current_token().kind == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error_expected(&[expected]))
        }
    }

    fn error_expected(&self, expected: &[HavingTokenKind]) -> SyntaxError {
        let token = self.current_token();
        let names: Vec<String> = expected
            .iter()
            .map(|k| k.friendly_name())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();
        let offending = (token.kind != HavingTokenKind::Eof).then(|| token.text.clone());
        SyntaxError::new(
            token.line,
            token.column,
            offending,
            names.clone(),
            expecting_message(&names, &token.to_string()),
        )
    }
}

fn collapse(mut items: Vec<HavingExpr>, wrap: fn(Vec<HavingExpr>) -> HavingExpr) -> HavingExpr {
    if items.len() == 1 {
        items.remove(0)
    } else {
        wrap(items)
    }
}

/// Parse a having expression, returning every syntax error on failure
pub fn parse_having(input: &str) -> Result<Option<HavingExpr>, Vec<SyntaxError>> {
    HavingParser::new(input).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(input: &str) -> Vec<String> {
        parse_having(input)
            .unwrap_err()
            .iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn test_blank() {
        assert_eq!(parse_having("   ").unwrap(), None);
    }

    #[test]
    fn test_boolean_structure() {
        let expr = parse_having("(total > 100 AND avg_duration < 500) OR total > 10000")
            .unwrap()
            .unwrap();
        assert!(matches!(expr, HavingExpr::Or(ref b) if b.len() == 2));
        assert_eq!(
            expr.to_string(),
            "(total > 100 AND avg_duration < 500) OR total > 10000"
        );
    }

    #[test]
    fn test_arithmetic_operands() {
        let expr = parse_having("(sum_a + sum_b) * 2 > -10 AND cnt % 10 = 0")
            .unwrap()
            .unwrap();
        let refs: Vec<String> = expr.references().iter().map(|r| r.text().to_string()).collect();
        assert_eq!(refs, vec!["sum_a", "sum_b", "cnt"]);
    }

    #[test]
    fn test_call_references() {
        let expr = parse_having("avg(sum(cpu_usage)) > 50 AND count( ) < 3")
            .unwrap()
            .unwrap();
        assert_eq!(
            expr.references(),
            vec![
                HavingReference::Call {
                    name: "avg".to_string(),
                    text: "avg(sum(cpu_usage))".to_string()
                },
                HavingReference::Call {
                    name: "count".to_string(),
                    text: "count()".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let expr = parse_having("total > 500.5 AND total > 1e6").unwrap().unwrap();
        assert_eq!(expr.to_string(), "total > 500.5 AND total > 1e6");
    }

    #[test]
    fn test_not_requires_parentheses() {
        assert!(parse_having("NOT (total > 100)").is_ok());
        let errs = messages("NOT total > 100");
        assert_eq!(errs[0], "line 1:4 mismatched input 'total' expecting (");
    }

    #[test]
    fn test_trailing_tokens() {
        assert_eq!(
            messages("total_logs > 100)"),
            vec!["line 1:16 extraneous input ')' expecting <EOF>"]
        );
        assert_eq!(
            messages("total > 100 count() < 500"),
            vec!["line 1:12 mismatched input 'count' expecting <EOF>"]
        );
    }

    #[test]
    fn test_missing_comparison() {
        assert_eq!(
            messages("total_logs"),
            vec!["line 1:10 expecting one of {!=, %, *, +, -, /, <, <=, <>, =, >, >=} but got EOF"]
        );
        assert_eq!(
            messages("count() >"),
            vec!["line 1:9 expecting one of {(, +, -, IDENTIFIER, number, quoted text} but got EOF"]
        );
    }

    #[test]
    fn test_boolean_literal_rejected() {
        assert_eq!(
            messages("count() > true"),
            vec!["line 1:10 expecting one of {(, +, -, IDENTIFIER, number, quoted text} but got 'true'"]
        );
    }

    #[test]
    fn test_dangling_connectives() {
        let errs = messages("total > 100 AND");
        assert_eq!(
            errs,
            vec!["line 1:15 expecting one of {(, +, -, IDENTIFIER, NOT, number, quoted text} but got EOF"]
        );
        assert_eq!(messages("OR total > 1").len(), 1);
    }
}
