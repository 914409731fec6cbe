//! Comparison operators and tuple predicates.

use std::fmt;

use crate::datum::Field;
use crate::tuple::Tuple;

/// The six comparison operators understood by filters, joins, and the
/// selectivity estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Equals,
    GreaterThan,
    LessThan,
    LessThanOrEq,
    GreaterThanOrEq,
    NotEquals,
}

impl CompareOp {
    /// Compares two field values under this operator.
    ///
    /// Values of different types never compare true: the planner is expected
    /// to only pair like-typed operands, and a silent coercion would hide
    /// its mistakes.
    pub fn compare(self, lhs: &Field, rhs: &Field) -> bool {
        match (lhs, rhs) {
            (Field::Int(a), Field::Int(b)) => self.compare_ord(a, b),
            (Field::Text(a), Field::Text(b)) => self.compare_ord(a, b),
            _ => false,
        }
    }

    fn compare_ord<T: Ord>(self, lhs: &T, rhs: &T) -> bool {
        match self {
            CompareOp::Equals => lhs == rhs,
            CompareOp::GreaterThan => lhs > rhs,
            CompareOp::LessThan => lhs < rhs,
            CompareOp::LessThanOrEq => lhs <= rhs,
            CompareOp::GreaterThanOrEq => lhs >= rhs,
            CompareOp::NotEquals => lhs != rhs,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Equals => "=",
            CompareOp::GreaterThan => ">",
            CompareOp::LessThan => "<",
            CompareOp::LessThanOrEq => "<=",
            CompareOp::GreaterThanOrEq => ">=",
            CompareOp::NotEquals => "<>",
        };
        f.write_str(symbol)
    }
}

/// Compares one tuple field against a constant.
#[derive(Debug, Clone)]
pub struct Predicate {
    /// Index of the field to test.
    pub field: usize,
    /// Comparison operator.
    pub op: CompareOp,
    /// Constant to compare against.
    pub operand: Field,
}

impl Predicate {
    /// Creates a predicate `tuple[field] op operand`.
    pub fn new(field: usize, op: CompareOp, operand: Field) -> Self {
        Self { field, op, operand }
    }

    /// Returns true if `tuple` satisfies the predicate.
    pub fn matches(&self, tuple: &Tuple) -> bool {
        self.op.compare(tuple.field(self.field), &self.operand)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${} {} {}", self.field, self.op, self.operand)
    }
}

/// Compares a field of one tuple against a field of another.
#[derive(Debug, Clone)]
pub struct JoinPredicate {
    /// Field index in the left (outer) tuple.
    pub left_field: usize,
    /// Comparison operator.
    pub op: CompareOp,
    /// Field index in the right (inner) tuple.
    pub right_field: usize,
}

impl JoinPredicate {
    /// Creates a predicate `left[left_field] op right[right_field]`.
    pub fn new(left_field: usize, op: CompareOp, right_field: usize) -> Self {
        Self {
            left_field,
            op,
            right_field,
        }
    }

    /// Returns true if the tuple pair satisfies the predicate.
    pub fn matches(&self, left: &Tuple, right: &Tuple) -> bool {
        self.op
            .compare(left.field(self.left_field), right.field(self.right_field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::FieldType;
    use crate::tuple::Schema;
    use std::sync::Arc;

    fn row(a: i32, s: &str) -> Tuple {
        Tuple::new(
            Arc::new(Schema::anonymous(vec![FieldType::Int, FieldType::Text])),
            vec![Field::Int(a), Field::from(s)],
        )
    }

    #[test]
    fn test_int_comparisons() {
        let five = Field::Int(5);
        assert!(CompareOp::Equals.compare(&five, &Field::Int(5)));
        assert!(CompareOp::NotEquals.compare(&five, &Field::Int(6)));
        assert!(CompareOp::LessThan.compare(&five, &Field::Int(6)));
        assert!(CompareOp::LessThanOrEq.compare(&five, &Field::Int(5)));
        assert!(CompareOp::GreaterThan.compare(&five, &Field::Int(4)));
        assert!(CompareOp::GreaterThanOrEq.compare(&five, &Field::Int(5)));
        assert!(!CompareOp::GreaterThan.compare(&five, &Field::Int(5)));
    }

    #[test]
    fn test_text_comparisons_are_lexicographic() {
        let b = Field::from("banana");
        assert!(CompareOp::GreaterThan.compare(&b, &Field::from("apple")));
        assert!(CompareOp::LessThan.compare(&b, &Field::from("cherry")));
    }

    #[test]
    fn test_mismatched_types_never_match() {
        assert!(!CompareOp::Equals.compare(&Field::Int(1), &Field::from("1")));
        assert!(!CompareOp::NotEquals.compare(&Field::Int(1), &Field::from("1")));
    }

    #[test]
    fn test_predicate_on_tuple() {
        let p = Predicate::new(0, CompareOp::GreaterThan, Field::Int(10));
        assert!(p.matches(&row(11, "x")));
        assert!(!p.matches(&row(10, "x")));
    }

    #[test]
    fn test_join_predicate() {
        let p = JoinPredicate::new(0, CompareOp::Equals, 0);
        assert!(p.matches(&row(3, "a"), &row(3, "b")));
        assert!(!p.matches(&row(3, "a"), &row(4, "b")));
    }
}
