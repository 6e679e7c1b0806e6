/// Static detection of filters that can never match
///
/// Walks a filter expression collecting per-field constraints for each
/// AND-conjoined scope and reports combinations that no record can satisfy.
/// Every OR branch starts from a copy of the constraints in force before the
/// OR, so alternatives never contradict each other. The checks are
/// heuristics: an empty result does not prove the filter satisfiable.
use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::trim_quotes;
use crate::operator::FilterOperator;
use crate::parser::parse;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone)]
struct FieldConstraint {
    op: FilterOperator,
    value: Option<String>,
    values: Vec<String>,
}

impl FieldConstraint {
    fn value_text(&self) -> &str {
        self.value.as_deref().unwrap_or_default()
    }
}

/// Constraints of one AND scope, keyed by raw key text
#[derive(Debug, Clone, Default)]
struct ConstraintSet {
    fields: BTreeMap<String, Vec<FieldConstraint>>,
}

/// Report contradictions in `expression`. The result is deduplicated and in
/// discovery order.
pub fn detect_contradictions(expression: &str) -> Result<Vec<String>, ParseError> {
    let query = parse(expression)?;
    let mut detector = ContradictionDetector::default();
    detector.visit_query(&query);

    let mut seen = HashSet::new();
    Ok(detector
        .contradictions
        .into_iter()
        .filter(|c| seen.insert(c.clone()))
        .collect())
}

#[derive(Default)]
struct ContradictionDetector {
    current: ConstraintSet,
    contradictions: Vec<String>,
}

impl ContradictionDetector {
    fn visit_query(&mut self, query: &Query) {
        if let Some(expr) = &query.expression {
            self.visit_or(expr, false);
        }
        let set = self.current.clone();
        self.check(&set);
    }

    fn visit_or(&mut self, expr: &OrExpression, negated: bool) {
        if expr.branches.len() == 1 {
            self.visit_and(&expr.branches[0], negated);
            return;
        }
        for branch in &expr.branches {
            let saved = self.current.clone();
            self.visit_and(branch, negated);
            self.current = saved;
        }
    }

    fn visit_and(&mut self, expr: &AndExpression, negated: bool) {
        for term in &expr.terms {
            let negated = negated ^ term.negated;
            match &term.primary {
                Primary::Group(inner) => self.visit_or(inner, negated),
                Primary::Comparison(comparison) => self.visit_comparison(comparison, negated),
                _ => {}
            }
        }
    }

    fn visit_comparison(&mut self, comparison: &Comparison, negated: bool) {
        let field = comparison.key.text.clone();
        let apply = |op: FilterOperator| if negated { op.negate() } else { op };

        let constraint = match &comparison.kind {
            ComparisonKind::Exists { negated: not } => FieldConstraint {
                op: apply(if *not {
                    FilterOperator::NotExists
                } else {
                    FilterOperator::Exists
                }),
                value: None,
                values: Vec::new(),
            },
            ComparisonKind::In { negated: not, values } => FieldConstraint {
                op: apply(if *not {
                    FilterOperator::NotIn
                } else {
                    FilterOperator::In
                }),
                value: None,
                values: values.values().iter().map(constraint_text).collect(),
            },
            ComparisonKind::Between {
                negated: not,
                low,
                high,
            } => FieldConstraint {
                op: apply(if *not {
                    FilterOperator::NotBetween
                } else {
                    FilterOperator::Between
                }),
                value: None,
                values: vec![constraint_text(low), constraint_text(high)],
            },
            ComparisonKind::Binary { op, value } => {
                let op = match op {
                    CompareOp::Equals => FilterOperator::Equal,
                    CompareOp::NotEquals | CompareOp::Neq => FilterOperator::NotEqual,
                    CompareOp::Lt => FilterOperator::LessThan,
                    CompareOp::Le => FilterOperator::LessThanOrEq,
                    CompareOp::Gt => FilterOperator::GreaterThan,
                    CompareOp::Ge => FilterOperator::GreaterThanOrEq,
                    CompareOp::Like { negated } => pick(*negated, FilterOperator::Like),
                    CompareOp::ILike { negated } => pick(*negated, FilterOperator::ILike),
                    CompareOp::Regexp { negated } => pick(*negated, FilterOperator::Regexp),
                    CompareOp::Contains { negated } => pick(*negated, FilterOperator::Contains),
                };
                FieldConstraint {
                    op: apply(op),
                    value: Some(constraint_text(value)),
                    values: Vec::new(),
                }
            }
        };

        self.add_constraint(field, constraint);
        let set = self.current.clone();
        self.check(&set);
    }

    fn add_constraint(&mut self, field: String, constraint: FieldConstraint) {
        let entry = self.current.fields.entry(field).or_default();
        if constraint.op.implies_existence() {
            entry.push(FieldConstraint {
                op: FilterOperator::Exists,
                value: None,
                values: Vec::new(),
            });
        }
        entry.push(constraint);
    }

    fn check(&mut self, set: &ConstraintSet) {
        for (field, constraints) in &set.fields {
            if constraints.len() < 2 {
                continue;
            }
            let found = find_contradictions(field, constraints);
            self.contradictions.extend(found);
        }
    }
}

fn pick(negated: bool, op: FilterOperator) -> FilterOperator {
    if negated {
        op.negate()
    } else {
        op
    }
}

fn constraint_text(literal: &ValueLiteral) -> String {
    match literal {
        ValueLiteral::Quoted(raw) => trim_quotes(raw),
        other => other.raw().to_string(),
    }
}

fn numeric(text: &str) -> Option<f64> {
    text.parse::<f64>().ok()
}

fn find_contradictions(field: &str, constraints: &[FieldConstraint]) -> Vec<String> {
    let mut out = Vec::new();

    let equal = with_op(constraints, FilterOperator::Equal);
    let not_equal = with_op(constraints, FilterOperator::NotEqual);
    let in_lists = with_op(constraints, FilterOperator::In);
    let not_in_lists = with_op(constraints, FilterOperator::NotIn);
    let exists = with_op(constraints, FilterOperator::Exists);
    let not_exists = with_op(constraints, FilterOperator::NotExists);
    let between = with_op(constraints, FilterOperator::Between);
    let not_between = with_op(constraints, FilterOperator::NotBetween);
    let ranges: Vec<&FieldConstraint> = constraints.iter().filter(|c| c.op.is_comparison()).collect();
    let likes: Vec<&FieldConstraint> = constraints
        .iter()
        .filter(|c| matches!(c.op, FilterOperator::Like | FilterOperator::ILike))
        .collect();

    let distinct: HashSet<&str> = equal.iter().map(|c| c.value_text()).collect();
    if distinct.len() > 1 {
        out.push(format!(
            "Field '{}' cannot equal multiple different values",
            field
        ));
    }

    for eq in &equal {
        for neq in &not_equal {
            if eq.value_text() == neq.value_text() {
                out.push(format!(
                    "Field '{}' cannot both equal and not equal '{}'",
                    field,
                    eq.value_text()
                ));
            }
        }
    }

    for eq in &equal {
        let value = eq.value_text();
        for not_in in &not_in_lists {
            for v in &not_in.values {
                if v == value {
                    out.push(format!(
                        "Field '{}' equals '{}' but is in NOT IN list",
                        field, value
                    ));
                }
            }
        }
        for in_list in &in_lists {
            if !in_list.values.iter().any(|v| v == value) {
                out.push(format!(
                    "Field '{}' equals '{}' but is not in IN list",
                    field, value
                ));
            }
        }
    }

    for in_list in &in_lists {
        for not_in in &not_in_lists {
            let overlap: Vec<&str> = in_list
                .values
                .iter()
                .filter(|v| not_in.values.contains(v))
                .map(String::as_str)
                .collect();
            if !overlap.is_empty() {
                out.push(format!(
                    "Field '{}' has overlapping IN and NOT IN values: [{}]",
                    field,
                    overlap.join(", ")
                ));
            }
        }
    }

    if !ranges.is_empty() && ranges_are_infeasible(&ranges) {
        out.push(format!(
            "Field '{}' has contradictory range constraints",
            field
        ));
    }

    for eq in &equal {
        if !satisfies_ranges(eq.value_text(), &ranges) {
            out.push(format!(
                "Field '{}' equals '{}' which violates range constraints",
                field,
                eq.value_text()
            ));
        }
    }

    if !exists.is_empty() && !not_exists.is_empty() {
        out.push(format!("Field '{}' cannot both exist and not exist", field));
    }

    if !not_exists.is_empty() {
        if let Some(c) = constraints.iter().find(|c| c.op.implies_existence()) {
            out.push(format!(
                "Field '{}' has NOT EXISTS but also has {} which implies existence",
                field, c.op
            ));
        }
    }

    if between.len() >= 2 && !have_common_intersection(&between) {
        out.push(format!(
            "Field '{}' has non-overlapping BETWEEN ranges",
            field
        ));
    }

    for eq in &equal {
        let value = eq.value_text();
        if !between.is_empty() && !between.iter().any(|b| within_between(value, b)) {
            out.push(format!(
                "Field '{}' equals '{}' which is outside BETWEEN range(s)",
                field, value
            ));
        }
    }

    for eq in &equal {
        let value = eq.value_text();
        for nb in &not_between {
            if within_between(value, nb) {
                out.push(format!(
                    "Field '{}' equals '{}' which is excluded by NOT BETWEEN range",
                    field, value
                ));
            }
        }
    }

    if !not_between.is_empty() {
        for b in &between {
            if let Some((low, high)) = numeric_bounds(b) {
                // Only the endpoints and the midpoint are sampled.
                let has_valid = [low, high, (low + high) / 2.0]
                    .iter()
                    .any(|&probe| !not_between.iter().any(|nb| number_within(probe, nb)));
                if !has_valid {
                    out.push(format!(
                        "Field '{}' has BETWEEN and NOT BETWEEN ranges that exclude all values",
                        field
                    ));
                }
            }
        }
    }

    for eq in &equal {
        for like in &likes {
            let pattern = like.value_text();
            if !matches_like(eq.value_text(), pattern) {
                out.push(format!(
                    "Field '{}' equals '{}' which doesn't match LIKE pattern '{}'",
                    field,
                    eq.value_text(),
                    pattern
                ));
            }
        }
    }

    out
}

fn with_op(constraints: &[FieldConstraint], op: FilterOperator) -> Vec<&FieldConstraint> {
    constraints.iter().filter(|c| c.op == op).collect()
}

fn numeric_bounds(between: &FieldConstraint) -> Option<(f64, f64)> {
    match between.values.as_slice() {
        [low, high] => Some((numeric(low)?, numeric(high)?)),
        _ => None,
    }
}

fn have_common_intersection(betweens: &[&FieldConstraint]) -> bool {
    let mut intersection: Option<(f64, f64)> = None;
    for b in betweens {
        let Some((low, high)) = numeric_bounds(b) else {
            continue;
        };
        intersection = Some(match intersection {
            None => (low, high),
            Some((cur_low, cur_high)) => (cur_low.max(low), cur_high.min(high)),
        });
    }
    intersection.map_or(true, |(low, high)| low <= high)
}

fn ranges_are_infeasible(ranges: &[&FieldConstraint]) -> bool {
    let mut lower: Option<(f64, bool)> = None;
    let mut upper: Option<(f64, bool)> = None;

    for c in ranges {
        let Some(value) = numeric(c.value_text()) else {
            continue;
        };
        match c.op {
            FilterOperator::GreaterThan | FilterOperator::GreaterThanOrEq => {
                let inclusive = c.op == FilterOperator::GreaterThanOrEq;
                let tighter = match lower {
                    None => true,
                    Some((cur, cur_inclusive)) => {
                        value > cur || (value == cur && !inclusive && cur_inclusive)
                    }
                };
                if tighter {
                    lower = Some((value, inclusive));
                }
            }
            FilterOperator::LessThan | FilterOperator::LessThanOrEq => {
                let inclusive = c.op == FilterOperator::LessThanOrEq;
                let tighter = match upper {
                    None => true,
                    Some((cur, cur_inclusive)) => {
                        value < cur || (value == cur && !inclusive && cur_inclusive)
                    }
                };
                if tighter {
                    upper = Some((value, inclusive));
                }
            }
            _ => {}
        }
    }

    match (lower, upper) {
        (Some((low, low_inclusive)), Some((high, high_inclusive))) => {
            low > high || (low == high && !(low_inclusive && high_inclusive))
        }
        _ => false,
    }
}

/// Non-numeric values cannot be checked and are treated as satisfying.
fn satisfies_ranges(value: &str, ranges: &[&FieldConstraint]) -> bool {
    let Some(value) = numeric(value) else {
        return true;
    };
    ranges.iter().all(|c| {
        let Some(bound) = numeric(c.value_text()) else {
            return true;
        };
        match c.op {
            FilterOperator::GreaterThan => value > bound,
            FilterOperator::GreaterThanOrEq => value >= bound,
            FilterOperator::LessThan => value < bound,
            FilterOperator::LessThanOrEq => value <= bound,
            _ => true,
        }
    })
}

fn within_between(value: &str, between: &FieldConstraint) -> bool {
    if between.values.len() != 2 {
        return false;
    }
    match numeric(value) {
        Some(v) => number_within(v, between),
        None => true,
    }
}

fn number_within(value: f64, between: &FieldConstraint) -> bool {
    match numeric_bounds(between) {
        Some((low, high)) => value >= low && value <= high,
        None => between.values.len() == 2,
    }
}

/// `%x%` is a substring match, `%x` a suffix, `x%` a prefix and anything
/// else an exact match.
fn matches_like(value: &str, pattern: &str) -> bool {
    if pattern == "%" {
        return true;
    }
    match (pattern.strip_prefix('%'), pattern.strip_suffix('%')) {
        (Some(rest), Some(_)) => value.contains(&rest[..rest.len() - 1]),
        (Some(suffix), None) => value.ends_with(suffix),
        (None, Some(prefix)) => value.starts_with(prefix),
        (None, None) => value == pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_contradiction(query: &str) -> bool {
        !detect_contradictions(query).unwrap().is_empty()
    }

    #[test]
    fn test_multiple_equalities() {
        let found =
            detect_contradictions("service.name='redis' AND service.name='mysql'").unwrap();
        assert_eq!(
            found,
            vec!["Field 'service.name' cannot equal multiple different values"]
        );
        assert!(!has_contradiction(
            "service.name='redis' OR service.name='mysql'"
        ));
    }

    #[test]
    fn test_ranges() {
        let found =
            detect_contradictions("http.status_code > 500 AND http.status_code < 400").unwrap();
        assert_eq!(
            found,
            vec!["Field 'http.status_code' has contradictory range constraints"]
        );
        assert!(!has_contradiction(
            "http.status_code >= 200 AND http.status_code < 300"
        ));
        assert!(has_contradiction("value > 5 AND value < 5"));
        assert!(!has_contradiction("value >= 5 AND value <= 5"));
        assert!(has_contradiction(
            "value > 100 AND value < 200 AND value > 300 AND value < 400"
        ));
        assert!(!has_contradiction(
            "value > 100 AND value < 400 AND value > 200 AND value < 300"
        ));
    }

    #[test]
    fn test_equal_and_not_equal() {
        let found =
            detect_contradictions("service.name = 'redis' AND service.name != 'redis'").unwrap();
        assert_eq!(
            found,
            vec!["Field 'service.name' cannot both equal and not equal 'redis'"]
        );
    }

    #[test]
    fn test_negation_context() {
        assert!(has_contradiction(
            "NOT (service.name = 'redis') AND service.name = 'redis'"
        ));
        assert!(has_contradiction(
            "NOT (NOT (service.name = 'redis')) AND service.name = 'mysql'"
        ));
    }

    #[test]
    fn test_in_lists() {
        let found = detect_contradictions(
            "service.name IN ('redis', 'mysql') AND service.name NOT IN ('redis', 'postgres')",
        )
        .unwrap();
        assert_eq!(
            found,
            vec!["Field 'service.name' has overlapping IN and NOT IN values: [redis]"]
        );
        assert!(has_contradiction(
            "service.name = 'redis' AND service.name NOT IN ('redis', 'mysql')"
        ));
        assert!(has_contradiction(
            "service.name = 'redis' AND service.name IN ('mysql')"
        ));
        assert!(!has_contradiction(
            "service.name IN ('redis', 'mysql', 'postgres') AND service.name NOT IN ('mongodb', 'cassandra')"
        ));
    }

    #[test]
    fn test_existence() {
        let found = detect_contradictions("custom.tag EXISTS AND custom.tag NOT EXISTS").unwrap();
        assert_eq!(
            found,
            vec!["Field 'custom.tag' cannot both exist and not exist"]
        );

        let found = detect_contradictions("custom.tag = 'v' AND custom.tag NOT EXISTS").unwrap();
        assert!(found.contains(
            &"Field 'custom.tag' has NOT EXISTS but also has = which implies existence".to_string()
        ));
    }

    #[test]
    fn test_between() {
        assert!(has_contradiction(
            "http.status_code BETWEEN 200 AND 299 AND http.status_code BETWEEN 400 AND 499"
        ));
        assert!(!has_contradiction(
            "http.status_code BETWEEN 200 AND 299 AND http.status_code BETWEEN 250 AND 350"
        ));
        let found = detect_contradictions(
            "http.status_code = 500 AND http.status_code BETWEEN 200 AND 299",
        )
        .unwrap();
        assert!(found.contains(
            &"Field 'http.status_code' equals '500' which is outside BETWEEN range(s)".to_string()
        ));
        assert!(has_contradiction(
            "latency = 150 AND latency NOT BETWEEN 100 AND 200"
        ));
        let found = detect_contradictions(
            "latency BETWEEN 120 AND 180 AND latency NOT BETWEEN 100 AND 200",
        )
        .unwrap();
        assert_eq!(
            found,
            vec!["Field 'latency' has BETWEEN and NOT BETWEEN ranges that exclude all values"]
        );
    }

    #[test]
    fn test_like_patterns() {
        let found = detect_contradictions(
            "service.name = 'redis-cache-01' AND service.name LIKE 'mysql%'",
        )
        .unwrap();
        assert_eq!(
            found,
            vec!["Field 'service.name' equals 'redis-cache-01' which doesn't match LIKE pattern 'mysql%'"]
        );
        assert!(!has_contradiction(
            "service.name = 'redis-cache-01' AND service.name LIKE '%cache%'"
        ));
    }

    #[test]
    fn test_or_branches_are_isolated() {
        assert!(has_contradiction(
            "(service.name = 'redis' AND service.name = 'mysql') OR http.status_code = 200"
        ));
        assert!(!has_contradiction(
            "http.status_code = 200 AND (service.name = 'redis' OR service.name = 'mysql')"
        ));
        assert!(!has_contradiction(
            "(service.name = 'redis' OR service.name = 'mysql') AND http.status_code = 200"
        ));
    }

    #[test]
    fn test_implicit_and() {
        assert!(has_contradiction(
            "service.name='redis' (http.status_code > 500 http.status_code < 400)"
        ));
    }

    #[test]
    fn test_quoted_and_numeric_literals_compare_as_text() {
        assert!(!has_contradiction(
            "http.status_code = '200' AND http.status_code = 200"
        ));
    }

    #[test]
    fn test_syntax_error() {
        assert!(detect_contradictions("a = ").is_err());
    }
}
