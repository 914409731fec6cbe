//! Grouped streaming aggregates.
//!
//! An aggregator folds tuples into per-group state via `merge` and emits
//! one result tuple per group via `results`. Grouping is by a single field;
//! the no-grouping case uses a single `None` key. Results are always
//! integers, and groups are emitted in first-seen order.
//!
//! [`IntegerAggregator`] supports SUM, COUNT, MIN, MAX, and AVG;
//! [`StringAggregator`] supports COUNT only. AVG is the incremental integer
//! mean `(mean * count + v) / (count + 1)` — the truncation at every step
//! is part of the contract, not an accident.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::datum::{Field, FieldType};
use crate::tuple::{Schema, Tuple};

use super::error::ExecutorError;
use super::node::TupleIterator;

/// Aggregate operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateOp::Min => "MIN",
            AggregateOp::Max => "MAX",
            AggregateOp::Sum => "SUM",
            AggregateOp::Avg => "AVG",
            AggregateOp::Count => "COUNT",
        };
        f.write_str(name)
    }
}

/// Builds the output schema shared by both aggregators: `(group, value)`
/// when grouping, `(value)` otherwise.
fn output_schema(group_by: Option<(usize, FieldType)>) -> Arc<Schema> {
    let types = match group_by {
        Some((_, group_type)) => vec![group_type, FieldType::Int],
        None => vec![FieldType::Int],
    };
    Arc::new(Schema::anonymous(types))
}

/// Emits one tuple per `(key, value)` pair under `schema`.
fn group_tuples(
    schema: &Arc<Schema>,
    rows: impl Iterator<Item = (Option<Field>, i32)>,
) -> Vec<Tuple> {
    rows.map(|(key, value)| {
        let fields = match key {
            Some(group) => vec![group, Field::Int(value)],
            None => vec![Field::Int(value)],
        };
        Tuple::new(Arc::clone(schema), fields)
    })
    .collect()
}

/// Per-group running state of an integer aggregate.
#[derive(Debug, Clone, Copy)]
enum GroupState {
    /// SUM, COUNT, MIN, and MAX need a single integer.
    Plain(i32),
    /// AVG carries the running mean and the input count.
    Avg { mean: i32, count: i32 },
}

/// Grouped aggregation over an integer field.
pub struct IntegerAggregator {
    group_by: Option<(usize, FieldType)>,
    afield: usize,
    op: AggregateOp,
    groups: HashMap<Option<Field>, GroupState>,
    /// Keys in first-seen order, so results are deterministic.
    order: Vec<Option<Field>>,
}

impl IntegerAggregator {
    /// Creates an aggregator computing `op` over field `afield`, grouped by
    /// the given `(field index, field type)` pair, or ungrouped when `None`.
    pub fn new(group_by: Option<(usize, FieldType)>, afield: usize, op: AggregateOp) -> Self {
        Self {
            group_by,
            afield,
            op,
            groups: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Folds one tuple into its group's state.
    ///
    /// # Errors
    ///
    /// `ExecutorError::TypeMismatch` if the aggregated field is not an
    /// integer.
    pub fn merge(&mut self, tuple: &Tuple) -> Result<(), ExecutorError> {
        let value = match tuple.field(self.afield) {
            Field::Int(v) => *v,
            other => {
                return Err(ExecutorError::TypeMismatch {
                    expected: FieldType::Int,
                    found: other.field_type(),
                });
            }
        };
        let key = self.group_by.map(|(g, _)| tuple.field(g).clone());

        let state = self.groups.entry(key.clone()).or_insert_with(|| {
            self.order.push(key);
            match self.op {
                AggregateOp::Min => GroupState::Plain(i32::MAX),
                AggregateOp::Max => GroupState::Plain(i32::MIN),
                AggregateOp::Sum | AggregateOp::Count => GroupState::Plain(0),
                AggregateOp::Avg => GroupState::Avg { mean: 0, count: 0 },
            }
        });

        match (self.op, state) {
            (AggregateOp::Min, GroupState::Plain(acc)) => *acc = (*acc).min(value),
            (AggregateOp::Max, GroupState::Plain(acc)) => *acc = (*acc).max(value),
            (AggregateOp::Sum, GroupState::Plain(acc)) => *acc = acc.wrapping_add(value),
            (AggregateOp::Count, GroupState::Plain(acc)) => *acc += 1,
            (AggregateOp::Avg, GroupState::Avg { mean, count }) => {
                // Incremental integer mean; widened intermediates keep the
                // division exact before it truncates back to i32.
                let next = (*mean as i64 * *count as i64 + value as i64) / (*count as i64 + 1);
                *mean = next as i32;
                *count += 1;
            }
            _ => unreachable!("state shape is fixed by the operator"),
        }
        Ok(())
    }

    /// Emits one result tuple per group, in first-seen order.
    pub fn results(&self) -> TupleIterator {
        let schema = output_schema(self.group_by);
        let tuples = group_tuples(
            &schema,
            self.order.iter().map(|key| {
                let value = match self.groups[key] {
                    GroupState::Plain(v) => v,
                    GroupState::Avg { mean, .. } => mean,
                };
                (key.clone(), value)
            }),
        );
        TupleIterator::new(schema, tuples)
    }
}

/// Grouped aggregation over a string field. Only COUNT is meaningful.
#[derive(Debug)]
pub struct StringAggregator {
    group_by: Option<(usize, FieldType)>,
    afield: usize,
    groups: HashMap<Option<Field>, i32>,
    order: Vec<Option<Field>>,
}

impl StringAggregator {
    /// Creates a COUNT aggregator over string field `afield`.
    ///
    /// # Errors
    ///
    /// `ExecutorError::InvalidAggregate` for any operator other than
    /// [`AggregateOp::Count`].
    pub fn new(
        group_by: Option<(usize, FieldType)>,
        afield: usize,
        op: AggregateOp,
    ) -> Result<Self, ExecutorError> {
        if op != AggregateOp::Count {
            return Err(ExecutorError::InvalidAggregate {
                op,
                field_type: FieldType::Text,
            });
        }
        Ok(Self {
            group_by,
            afield,
            groups: HashMap::new(),
            order: Vec::new(),
        })
    }

    /// Counts one tuple into its group.
    pub fn merge(&mut self, tuple: &Tuple) -> Result<(), ExecutorError> {
        match tuple.field(self.afield) {
            Field::Text(_) => {}
            other => {
                return Err(ExecutorError::TypeMismatch {
                    expected: FieldType::Text,
                    found: other.field_type(),
                });
            }
        }
        let key = self.group_by.map(|(g, _)| tuple.field(g).clone());
        if !self.groups.contains_key(&key) {
            self.order.push(key.clone());
        }
        *self.groups.entry(key).or_insert(0) += 1;
        Ok(())
    }

    /// Emits one count tuple per group, in first-seen order.
    pub fn results(&self) -> TupleIterator {
        let schema = output_schema(self.group_by);
        let tuples = group_tuples(
            &schema,
            self.order
                .iter()
                .map(|key| (key.clone(), self.groups[key])),
        );
        TupleIterator::new(schema, tuples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_schema() -> Arc<Schema> {
        Arc::new(Schema::named(
            &[FieldType::Text, FieldType::Int],
            &["k", "v"],
        ))
    }

    fn row(k: &str, v: i32) -> Tuple {
        Tuple::new(input_schema(), vec![Field::from(k), Field::Int(v)])
    }

    fn drain(iter: &mut TupleIterator) -> Vec<Tuple> {
        iter.open();
        let mut out = Vec::new();
        while let Some(t) = iter.next() {
            out.push(t);
        }
        out
    }

    fn grouped(op: AggregateOp) -> IntegerAggregator {
        IntegerAggregator::new(Some((0, FieldType::Text)), 1, op)
    }

    #[test]
    fn test_empty_input_yields_no_groups() {
        let agg = grouped(AggregateOp::Count);
        assert!(drain(&mut agg.results()).is_empty());
    }

    #[test]
    fn test_count_per_group() {
        let mut agg = grouped(AggregateOp::Count);
        for t in [row("a", 1), row("b", 2), row("a", 3)] {
            agg.merge(&t).unwrap();
        }
        let out = drain(&mut agg.results());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].field(0), &Field::from("a"));
        assert_eq!(out[0].field(1), &Field::Int(2));
        assert_eq!(out[1].field(0), &Field::from("b"));
        assert_eq!(out[1].field(1), &Field::Int(1));
    }

    #[test]
    fn test_sum_min_max() {
        for (op, expected) in [
            (AggregateOp::Sum, 6),
            (AggregateOp::Min, -4),
            (AggregateOp::Max, 7),
        ] {
            let mut agg = grouped(op);
            for v in [3, -4, 7] {
                agg.merge(&row("a", v)).unwrap();
            }
            let out = drain(&mut agg.results());
            assert_eq!(out[0].field(1), &Field::Int(expected), "{}", op);
        }
    }

    #[test]
    fn test_grouped_avg_truncates() {
        let mut agg = grouped(AggregateOp::Avg);
        for t in [row("a", 2), row("a", 4), row("b", 10)] {
            agg.merge(&t).unwrap();
        }
        let out = drain(&mut agg.results());
        assert_eq!(out[0].field(0), &Field::from("a"));
        assert_eq!(out[0].field(1), &Field::Int(3));
        assert_eq!(out[1].field(0), &Field::from("b"));
        assert_eq!(out[1].field(1), &Field::Int(10));
    }

    #[test]
    fn test_avg_truncates_at_every_step() {
        // (0*0 + 1)/1 = 1; (1*1 + 2)/2 = 1; (1*2 + 4)/3 = 2.
        let mut agg = IntegerAggregator::new(None, 1, AggregateOp::Avg);
        for v in [1, 2, 4] {
            agg.merge(&row("_", v)).unwrap();
        }
        let out = drain(&mut agg.results());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].schema().len(), 1);
        assert_eq!(out[0].field(0), &Field::Int(2));
    }

    #[test]
    fn test_ungrouped_schema_has_single_field() {
        let mut agg = IntegerAggregator::new(None, 1, AggregateOp::Count);
        agg.merge(&row("a", 1)).unwrap();
        agg.merge(&row("b", 2)).unwrap();
        let out = drain(&mut agg.results());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].field(0), &Field::Int(2));
    }

    #[test]
    fn test_max_of_negatives() {
        let mut agg = grouped(AggregateOp::Max);
        for v in [-7, -3, -12] {
            agg.merge(&row("a", v)).unwrap();
        }
        let out = drain(&mut agg.results());
        assert_eq!(out[0].field(1), &Field::Int(-3));
    }

    #[test]
    fn test_integer_aggregator_rejects_text_field() {
        let mut agg = IntegerAggregator::new(None, 0, AggregateOp::Sum);
        let err = agg.merge(&row("a", 1)).unwrap_err();
        assert!(matches!(err, ExecutorError::TypeMismatch { .. }));
    }

    #[test]
    fn test_string_aggregator_counts() {
        let mut agg =
            StringAggregator::new(Some((0, FieldType::Text)), 0, AggregateOp::Count).unwrap();
        for t in [row("a", 0), row("a", 0), row("b", 0)] {
            agg.merge(&t).unwrap();
        }
        let out = drain(&mut agg.results());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].field(1), &Field::Int(2));
        assert_eq!(out[1].field(1), &Field::Int(1));
    }

    #[test]
    fn test_string_aggregator_rejects_non_count() {
        for op in [
            AggregateOp::Sum,
            AggregateOp::Avg,
            AggregateOp::Min,
            AggregateOp::Max,
        ] {
            let err = StringAggregator::new(None, 0, op).unwrap_err();
            assert!(matches!(err, ExecutorError::InvalidAggregate { .. }));
        }
    }
}
