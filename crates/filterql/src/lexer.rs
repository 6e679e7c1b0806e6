/// Lexer for filter expressions
///
/// Converts a filter expression into a stream of tokens. Unrecognised
/// characters are reported and skipped so the parser still sees the rest of
/// the input.
use crate::error::SyntaxError;
use std::fmt;

/// Token kinds of the filter grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenKind {
    LParen,
    RParen,
    LBrack,
    RBrack,
    Comma,
    Equals,
    NotEquals,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    ILike,
    Between,
    Exists,
    Regexp,
    Contains,
    In,
    Not,
    And,
    Or,
    HasToken,
    Has,
    HasAny,
    HasAll,
    Bool,
    Number,
    QuotedText,
    Key,
    FreeText,
    Eof,
}

impl TokenKind {
    /// Symbolic grammar name of the token
    pub fn symbolic_name(&self) -> &'static str {
        match self {
            TokenKind::LParen => "LPAREN",
            TokenKind::RParen => "RPAREN",
            TokenKind::LBrack => "LBRACK",
            TokenKind::RBrack => "RBRACK",
            TokenKind::Comma => "COMMA",
            TokenKind::Equals => "EQUALS",
            TokenKind::NotEquals => "NOT_EQUALS",
            TokenKind::Neq => "NEQ",
            TokenKind::Lt => "LT",
            TokenKind::Le => "LE",
            TokenKind::Gt => "GT",
            TokenKind::Ge => "GE",
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
            TokenKind::HasToken => "HASTOKEN",
            TokenKind::Has => "HAS",
            TokenKind::HasAny => "HASANY",
            TokenKind::HasAll => "HASALL",
            TokenKind::Bool => "BOOL",
            TokenKind::Number => "NUMBER",
            TokenKind::QuotedText => "QUOTED_TEXT",
            TokenKind::Key => "KEY",
            TokenKind::FreeText => "FREETEXT",
            TokenKind::Eof => "EOF",
        }
    }

    fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word.to_ascii_lowercase().as_str() {
            "like" => TokenKind::Like,
            "ilike" => TokenKind::ILike,
            "between" => TokenKind::Between,
            "exists" | "exist" => TokenKind::Exists,
            "regexp" => TokenKind::Regexp,
            "contains" | "contain" => TokenKind::Contains,
            "in" => TokenKind::In,
            "not" => TokenKind::Not,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "hastoken" => TokenKind::HasToken,
            "has" => TokenKind::Has,
            "hasany" => TokenKind::HasAny,
            "hasall" => TokenKind::HasAll,
            "true" | "false" => TokenKind::Bool,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbolic_name())
    }
}

/// A lexed token with its source location
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// 1-based line
    pub line: usize,
    /// 0-based column within the line
    pub column: usize,
    /// Character offsets into the input
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == TokenKind::Eof {
            write!(f, "EOF")
        } else {
            write!(f, "'{}'", self.text)
        }
    }
}

/// Lexer for filter expressions
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    line_start: usize,
    errors: Vec<SyntaxError>,
}

impl Lexer {
    /// Create a new lexer from input string
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            line_start: 0,
            errors: Vec::new(),
        }
    }

    /// Tokenize the entire input. The returned stream always ends with `Eof`.
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<SyntaxError>) {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        (tokens, self.errors)
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Token {
        loop {
            self.skip_trivia();

            let start = self.position;
            let (line, column) = (self.line, start - self.line_start);

            if self.is_eof() {
                return self.make_token(TokenKind::Eof, start, (line, column), "<EOF>".to_string());
            }

            let ch = self.current_char();

            let single = match ch {
                '(' => Some(TokenKind::LParen),
                ')' => Some(TokenKind::RParen),
                '[' => Some(TokenKind::LBrack),
                ']' => Some(TokenKind::RBrack),
                ',' => Some(TokenKind::Comma),
                _ => None,
            };
            if let Some(kind) = single {
                self.advance();
                return self.make_token(kind, start, (line, column), ch.to_string());
            }

            match ch {
                '=' => {
                    self.advance();
                    if self.current_char() == '=' {
                        self.advance();
                    }
                    return self.token_from(TokenKind::Equals, start, (line, column));
                }
                '!' if self.peek() == Some('=') => {
                    self.advance();
                    self.advance();
                    return self.token_from(TokenKind::NotEquals, start, (line, column));
                }
                '<' => {
                    self.advance();
                    let kind = match self.current_char() {
                        '=' => {
                            self.advance();
                            TokenKind::Le
                        }
                        '>' => {
                            self.advance();
                            TokenKind::Neq
                        }
                        _ => TokenKind::Lt,
                    };
                    return self.token_from(kind, start, (line, column));
                }
                '>' => {
                    self.advance();
                    let kind = if self.current_char() == '=' {
                        self.advance();
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    };
                    return self.token_from(kind, start, (line, column));
                }
                '\'' | '"' => {
                    if let Some(end) = self.scan_quoted(start, ch) {
                        self.advance_to(end);
                        return self.token_from(TokenKind::QuotedText, start, (line, column));
                    }
                    self.report_unrecognised(start);
                    continue;
                }
                _ => {}
            }

            // Longest match between number, key and free text; on a tie the
            // number wins over the key, and both win over free text.
            let number_end = self.scan_number(start);
            let key_end = self.scan_key(start);
            let free_end = self.scan_free_text(start);

            let (kind, end) = if number_end >= key_end && number_end > start {
                (TokenKind::Number, number_end)
            } else if key_end > start {
                (TokenKind::Key, key_end)
            } else {
                (TokenKind::FreeText, free_end)
            };
            let (kind, end) = if free_end > end {
                (TokenKind::FreeText, free_end)
            } else {
                (kind, end)
            };

            if end == start {
                self.report_unrecognised(start);
                continue;
            }

            self.advance_to(end);
            let text: String = self.input[start..end].iter().collect();
            let kind = match kind {
                TokenKind::Key => TokenKind::keyword(&text).unwrap_or(TokenKind::Key),
                other => other,
            };
            return self.make_token(kind, start, (line, column), text);
        }
    }

    fn token_from(&self, kind: TokenKind, start: usize, at: (usize, usize)) -> Token {
        let text: String = self.input[start..self.position].iter().collect();
        self.make_token(kind, start, at, text)
    }

    fn make_token(&self, kind: TokenKind, start: usize, at: (usize, usize), text: String) -> Token {
        Token {
            kind,
            text,
            line: at.0,
            column: at.1,
            start,
            end: self.position,
        }
    }

    fn report_unrecognised(&mut self, start: usize) {
        let ch = self.input[start];
        self.errors.push(SyntaxError::new(
            self.line,
            start - self.line_start,
            Some(ch.to_string()),
            Vec::new(),
            format!("token recognition error at: '{}'", ch),
        ));
        self.advance();
    }

    fn current_char(&self) -> char {
        if self.is_eof() {
            '\0'
        } else {
            self.input[self.position]
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn char_at(&self, pos: usize) -> Option<char> {
        self.input.get(pos).copied()
    }

    fn advance(&mut self) {
        if self.current_char() == '\n' {
            self.line += 1;
            self.line_start = self.position + 1;
        }
        self.position += 1;
    }

    fn advance_to(&mut self, end: usize) {
        while self.position < end {
            self.advance();
        }
    }

    fn is_eof(&self) -> bool {
        self.position >= self.input.len()
    }

    fn skip_trivia(&mut self) {
        loop {
            while !self.is_eof() && self.current_char().is_whitespace() {
                self.advance();
            }
            if self.current_char() == '/' && self.peek() == Some('*') {
                self.advance();
                self.advance();
                while !self.is_eof() && !(self.current_char() == '*' && self.peek() == Some('/')) {
                    self.advance();
                }
                if !self.is_eof() {
                    self.advance();
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    /// Returns the offset just past the closing quote, if there is one.
    fn scan_quoted(&self, start: usize, quote: char) -> Option<usize> {
        let mut pos = start + 1;
        while let Some(c) = self.char_at(pos) {
            if c == '\\' {
                pos += 2;
                continue;
            }
            if c == quote {
                return Some(pos + 1);
            }
            pos += 1;
        }
        None
    }

    fn scan_number(&self, start: usize) -> usize {
        let mut pos = start;
        if self.char_at(pos) == Some('-') {
            pos += 1;
        }
        let int_start = pos;
        while self.char_at(pos).is_some_and(|c| c.is_ascii_digit()) {
            pos += 1;
        }
        let mut digits = pos > int_start;
        if self.char_at(pos) == Some('.') && self.char_at(pos + 1).is_some_and(|c| c.is_ascii_digit()) {
            pos += 1;
            while self.char_at(pos).is_some_and(|c| c.is_ascii_digit()) {
                pos += 1;
            }
            digits = true;
        }
        if !digits {
            return start;
        }
        if matches!(self.char_at(pos), Some('e') | Some('E')) {
            let mut exp = pos + 1;
            if matches!(self.char_at(exp), Some('+') | Some('-')) {
                exp += 1;
            }
            if self.char_at(exp).is_some_and(|c| c.is_ascii_digit()) {
                while self.char_at(exp).is_some_and(|c| c.is_ascii_digit()) {
                    exp += 1;
                }
                pos = exp;
            }
        }
        pos
    }

    fn scan_key(&self, start: usize) -> usize {
        let is_first = |c: char| c.is_alphabetic() || matches!(c, '_' | '$' | '@');
        let is_rest = |c: char| c.is_alphanumeric() || matches!(c, '_' | '$' | '@' | ':' | '/' | '-' | '*');

        match self.char_at(start) {
            Some(c) if is_first(c) => {}
            _ => return start,
        }
        let mut pos = start + 1;
        loop {
            while self.char_at(pos).is_some_and(is_rest) {
                pos += 1;
            }
            match self.char_at(pos) {
                Some('.') if self.char_at(pos + 1).is_some_and(|c| is_first(c) || c.is_ascii_digit()) => {
                    pos += 2;
                }
                Some('[') if self.char_at(pos + 1) == Some(']') => {
                    pos += 2;
                }
                Some('[') if self.char_at(pos + 1) == Some('*') && self.char_at(pos + 2) == Some(']') => {
                    pos += 3;
                }
                _ => return pos,
            }
        }
    }

    fn scan_free_text(&self, start: usize) -> usize {
        let mut pos = start;
        while let Some(c) = self.char_at(pos) {
            if c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | ',' | '\'' | '"' | '=' | '!' | '<' | '>') {
                break;
            }
            pos += 1;
        }
        pos
    }
}

/// Remove the surrounding quotes of a quoted-text token and unescape `\\`
/// and `\'`.
pub fn trim_quotes(text: &str) -> String {
    let inner = if text.len() >= 2
        && ((text.starts_with('\'') && text.ends_with('\''))
            || (text.starts_with('"') && text.ends_with('"')))
    {
        &text[1..text.len() - 1]
    } else {
        text
    };
    inner.replace("\\\\", "\\").replace("\\'", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let (tokens, errors) = Lexer::new(input).tokenize();
        assert!(errors.is_empty(), "{:?}", errors);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_comparison_tokens() {
        assert_eq!(
            kinds("a = 1 b == 2 c != 3 d <> 4 e <= 5 f >= 6 g < 7 h > 8"),
            vec![
                TokenKind::Key,
                TokenKind::Equals,
                TokenKind::Number,
                TokenKind::Key,
                TokenKind::Equals,
                TokenKind::Number,
                TokenKind::Key,
                TokenKind::NotEquals,
                TokenKind::Number,
                TokenKind::Key,
                TokenKind::Neq,
                TokenKind::Number,
                TokenKind::Key,
                TokenKind::Le,
                TokenKind::Number,
                TokenKind::Key,
                TokenKind::Ge,
                TokenKind::Number,
                TokenKind::Key,
                TokenKind::Lt,
                TokenKind::Number,
                TokenKind::Key,
                TokenKind::Gt,
                TokenKind::Number,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(
            kinds("x not Like 'a%' AND y EXIST or z contain TRUE"),
            vec![
                TokenKind::Key,
                TokenKind::Not,
                TokenKind::Like,
                TokenKind::QuotedText,
                TokenKind::And,
                TokenKind::Key,
                TokenKind::Exists,
                TokenKind::Or,
                TokenKind::Key,
                TokenKind::Contains,
                TokenKind::Bool,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keyword_prefix_is_a_key() {
        assert_eq!(kinds("notes"), vec![TokenKind::Key, TokenKind::Eof]);
        assert_eq!(kinds("in.flight"), vec![TokenKind::Key, TokenKind::Eof]);
    }

    #[test]
    fn test_key_shapes() {
        let (tokens, _) = Lexer::new("resource.k8s.pod.name:string body.items[*].id tags[] a.0").tokenize();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["resource.k8s.pod.name:string", "body.items[*].id", "tags[]", "a.0", "<EOF>"]
        );
        assert!(tokens[..4].iter().all(|t| t.kind == TokenKind::Key));
    }

    #[test]
    fn test_numbers() {
        let (tokens, _) = Lexer::new("-10 500.5 1e6 .5").tokenize();
        let numbers: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Number)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(numbers, vec!["-10", "500.5", "1e6", ".5"]);
    }

    #[test]
    fn test_free_text() {
        assert_eq!(
            kinds("~oops 5xx"),
            vec![TokenKind::FreeText, TokenKind::FreeText, TokenKind::Eof]
        );
    }

    #[test]
    fn test_comments_and_positions() {
        let (tokens, _) = Lexer::new("/* note */ a =\n  'b'").tokenize();
        assert_eq!(tokens[0].text, "a");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 11));
        assert_eq!(tokens[2].text, "'b'");
        assert_eq!((tokens[2].line, tokens[2].column), (2, 2));
    }

    #[test]
    fn test_unterminated_quote_is_reported() {
        let (tokens, errors) = Lexer::new("a = 'open").tokenize();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "token recognition error at: '''");
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn test_trim_quotes() {
        assert_eq!(trim_quotes(r"'it\'s'"), "it's");
        assert_eq!(trim_quotes(r#""a\\b""#), r"a\b");
        assert_eq!(trim_quotes("bare"), "bare");
    }
}
