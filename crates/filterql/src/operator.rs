/// Filter operators
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operator of a single filter condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    #[default]
    Unknown,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEq,
    LessThan,
    LessThanOrEq,
    Like,
    NotLike,
    ILike,
    NotILike,
    Between,
    NotBetween,
    In,
    NotIn,
    Exists,
    NotExists,
    Regexp,
    NotRegexp,
    Contains,
    NotContains,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 21] = [
        FilterOperator::Unknown,
        FilterOperator::Equal,
        FilterOperator::NotEqual,
        FilterOperator::GreaterThan,
        FilterOperator::GreaterThanOrEq,
        FilterOperator::LessThan,
        FilterOperator::LessThanOrEq,
        FilterOperator::Like,
        FilterOperator::NotLike,
        FilterOperator::ILike,
        FilterOperator::NotILike,
        FilterOperator::Between,
        FilterOperator::NotBetween,
        FilterOperator::In,
        FilterOperator::NotIn,
        FilterOperator::Exists,
        FilterOperator::NotExists,
        FilterOperator::Regexp,
        FilterOperator::NotRegexp,
        FilterOperator::Contains,
        FilterOperator::NotContains,
    ];

    /// Logical negation. Applying it twice yields the original operator.
    pub fn negate(self) -> FilterOperator {
        use FilterOperator::*;
        match self {
            Unknown => Unknown,
            Equal => NotEqual,
            NotEqual => Equal,
            LessThan => GreaterThanOrEq,
            GreaterThanOrEq => LessThan,
            LessThanOrEq => GreaterThan,
            GreaterThan => LessThanOrEq,
            Like => NotLike,
            NotLike => Like,
            ILike => NotILike,
            NotILike => ILike,
            Between => NotBetween,
            NotBetween => Between,
            In => NotIn,
            NotIn => In,
            Exists => NotExists,
            NotExists => Exists,
            Regexp => NotRegexp,
            NotRegexp => Regexp,
            Contains => NotContains,
            NotContains => Contains,
        }
    }

    pub fn is_positive(self) -> bool {
        use FilterOperator::*;
        matches!(
            self,
            Equal
                | GreaterThan
                | GreaterThanOrEq
                | LessThan
                | LessThanOrEq
                | Like
                | ILike
                | Between
                | In
                | Exists
                | Regexp
                | Contains
        )
    }

    pub fn is_negative(self) -> bool {
        !self.is_positive()
    }

    /// Whether a match on this operator can only happen when the field is
    /// present on the record.
    pub fn implies_existence(self) -> bool {
        self.is_positive() && self != FilterOperator::Exists
    }

    /// `>`, `>=`, `<` and `<=`
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            FilterOperator::GreaterThan
                | FilterOperator::GreaterThanOrEq
                | FilterOperator::LessThan
                | FilterOperator::LessThanOrEq
        )
    }

    pub fn is_pattern(self) -> bool {
        matches!(
            self,
            FilterOperator::Like
                | FilterOperator::NotLike
                | FilterOperator::ILike
                | FilterOperator::NotILike
        )
    }

    pub fn as_str(&self) -> &'static str {
        use FilterOperator::*;
        match self {
            Unknown => "UNKNOWN",
            Equal => "=",
            NotEqual => "!=",
            GreaterThan => ">",
            GreaterThanOrEq => ">=",
            LessThan => "<",
            LessThanOrEq => "<=",
            Like => "LIKE",
            NotLike => "NOT LIKE",
            ILike => "ILIKE",
            NotILike => "NOT ILIKE",
            Between => "BETWEEN",
            NotBetween => "NOT BETWEEN",
            In => "IN",
            NotIn => "NOT IN",
            Exists => "EXISTS",
            NotExists => "NOT EXISTS",
            Regexp => "REGEXP",
            NotRegexp => "NOT REGEXP",
            Contains => "CONTAINS",
            NotContains => "NOT CONTAINS",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negation_is_an_involution() {
        for op in FilterOperator::ALL {
            assert_eq!(op.negate().negate(), op, "{}", op);
        }
    }

    #[test]
    fn test_not_pairs_flip_polarity() {
        use FilterOperator::*;
        for op in [Equal, Like, ILike, Between, In, Exists, Regexp, Contains] {
            assert!(op.is_positive(), "{}", op);
            assert!(!op.negate().is_positive(), "{}", op.negate());
        }
        // range operators stay positive under negation
        assert!(GreaterThan.negate().is_positive());
        assert!(LessThanOrEq.negate().is_positive());
    }

    #[test]
    fn test_range_negation() {
        assert_eq!(
            FilterOperator::LessThan.negate(),
            FilterOperator::GreaterThanOrEq
        );
        assert_eq!(
            FilterOperator::LessThanOrEq.negate(),
            FilterOperator::GreaterThan
        );
    }

    #[test]
    fn test_existence() {
        assert!(FilterOperator::Equal.implies_existence());
        assert!(FilterOperator::Between.implies_existence());
        assert!(!FilterOperator::Exists.implies_existence());
        assert!(!FilterOperator::NotEqual.implies_existence());
    }
}
