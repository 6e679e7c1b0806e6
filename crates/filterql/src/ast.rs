/// Parse tree for filter expressions
///
/// The tree mirrors the grammar: an expression is an OR of ANDs of
/// (optionally negated) primaries. Every node renders back to expression
/// text through `Display`.
use std::fmt;

/// A parsed filter expression. `expression` is `None` for blank input.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub expression: Option<OrExpression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrExpression {
    pub branches: Vec<AndExpression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AndExpression {
    pub terms: Vec<UnaryExpression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpression {
    pub negated: bool,
    pub primary: Primary,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primary {
    /// `( expression )`
    Group(OrExpression),
    Comparison(Comparison),
    FunctionCall(FunctionCall),
    FullText(FullText),
    /// A key with no operator
    Key(Key),
    /// A number or boolean with no operator
    Value(ValueLiteral),
}

/// Key token as written, with its position
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    pub text: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub key: Key,
    pub kind: ComparisonKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonKind {
    Binary { op: CompareOp, value: ValueLiteral },
    Between { negated: bool, low: ValueLiteral, high: ValueLiteral },
    In { negated: bool, values: InValues },
    Exists { negated: bool },
}

/// Operators of single-value comparisons, as spelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equals,
    NotEquals,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Like { negated: bool },
    ILike { negated: bool },
    Regexp { negated: bool },
    Contains { negated: bool },
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Equals => "=",
            CompareOp::NotEquals => "!=",
            CompareOp::Neq => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Like { negated: false } => "LIKE",
            CompareOp::Like { negated: true } => "NOT LIKE",
            CompareOp::ILike { negated: false } => "ILIKE",
            CompareOp::ILike { negated: true } => "NOT ILIKE",
            CompareOp::Regexp { negated: false } => "REGEXP",
            CompareOp::Regexp { negated: true } => "NOT REGEXP",
            CompareOp::Contains { negated: false } => "CONTAINS",
            CompareOp::Contains { negated: true } => "NOT CONTAINS",
        }
    }
}

/// Values of an IN clause, keeping the list syntax used
#[derive(Debug, Clone, PartialEq)]
pub enum InValues {
    Paren(Vec<ValueLiteral>),
    Bracket(Vec<ValueLiteral>),
    Single(ValueLiteral),
}

impl InValues {
    pub fn values(&self) -> &[ValueLiteral] {
        match self {
            InValues::Paren(values) | InValues::Bracket(values) => values,
            InValues::Single(value) => std::slice::from_ref(value),
        }
    }
}

/// A literal as written in the source
#[derive(Debug, Clone, PartialEq)]
pub enum ValueLiteral {
    /// Raw text including the quotes
    Quoted(String),
    Number(String),
    Bool(String),
    /// A bare key token in value position
    Key(String),
}

impl ValueLiteral {
    pub fn raw(&self) -> &str {
        match self {
            ValueLiteral::Quoted(s)
            | ValueLiteral::Number(s)
            | ValueLiteral::Bool(s)
            | ValueLiteral::Key(s) => s,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionName {
    Has,
    HasAny,
    HasAll,
    HasToken,
}

impl FunctionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionName::Has => "has",
            FunctionName::HasAny => "hasAny",
            FunctionName::HasAll => "hasAll",
            FunctionName::HasToken => "hasToken",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: FunctionName,
    pub params: Vec<FunctionParam>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionParam {
    Key(Key),
    Value(ValueLiteral),
    Array(Vec<ValueLiteral>),
}

/// A full-text search term
#[derive(Debug, Clone, PartialEq)]
pub enum FullText {
    /// Raw quoted text including the quotes
    Quoted(String),
    Free(String),
}

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expression {
            Some(expr) => write!(f, "{}", expr),
            None => Ok(()),
        }
    }
}

impl fmt::Display for OrExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", join(&self.branches, " OR "))
    }
}

impl fmt::Display for AndExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", join(&self.terms, " AND "))
    }
}

impl fmt::Display for UnaryExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "NOT ")?;
        }
        write!(f, "{}", self.primary)
    }
}

impl fmt::Display for Primary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primary::Group(expr) => write!(f, "({})", expr),
            Primary::Comparison(c) => write!(f, "{}", c),
            Primary::FunctionCall(call) => write!(f, "{}", call),
            Primary::FullText(FullText::Quoted(s)) | Primary::FullText(FullText::Free(s)) => {
                write!(f, "{}", s)
            }
            Primary::Key(key) => write!(f, "{}", key.text),
            Primary::Value(v) => write!(f, "{}", v),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = &self.key.text;
        match &self.kind {
            ComparisonKind::Binary { op, value } => write!(f, "{} {} {}", key, op.as_str(), value),
            ComparisonKind::Between { negated, low, high } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{} {}BETWEEN {} AND {}", key, not, low, high)
            }
            ComparisonKind::In { negated, values } => {
                let not = if *negated { "NOT " } else { "" };
                match values {
                    InValues::Paren(vs) => write!(f, "{} {}IN ({})", key, not, join(vs, ", ")),
                    InValues::Bracket(vs) => write!(f, "{} {}IN [{}]", key, not, join(vs, ", ")),
                    InValues::Single(v) => write!(f, "{} {}IN {}", key, not, v),
                }
            }
            ComparisonKind::Exists { negated: false } => write!(f, "{} EXISTS", key),
            ComparisonKind::Exists { negated: true } => write!(f, "{} NOT EXISTS", key),
        }
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name.as_str(), join(&self.params, ", "))
    }
}

impl fmt::Display for FunctionParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionParam::Key(key) => write!(f, "{}", key.text),
            FunctionParam::Value(v) => write!(f, "{}", v),
            FunctionParam::Array(vs) => write!(f, "[{}]", join(vs, ", ")),
        }
    }
}

impl fmt::Display for ValueLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw())
    }
}
