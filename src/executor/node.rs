//! Executor nodes implementing the pull-based iterator model.
//!
//! Each node yields tuples one at a time via `next()`, pulling from its
//! children as needed. A tree is driven by `open`, a sequence of `next`
//! calls until `Ok(None)`, and `close`; `rewind` returns a node to the state
//! just after `open`. Closing a node drops iterator-private state only —
//! page locks always stay with the transaction.
//!
//! Nodes use enum dispatch rather than `dyn Trait`: the set of operators is
//! small and fixed, and the match in [`ExecutorNode`] keeps the tree
//! allocation-free apart from child boxes.

use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::datum::{Field, FieldType};
use crate::heap::TableScan;
use crate::tuple::{Schema, Tuple};
use crate::tx::TransactionId;

use super::aggregate::{AggregateOp, IntegerAggregator, StringAggregator};
use super::error::ExecutorError;
use super::predicate::{JoinPredicate, Predicate};

/// A node in an operator tree.
#[derive(Debug)]
pub enum ExecutorNode {
    /// Sequential scan of a heap table.
    SeqScan(SeqScan),
    /// Predicate filter over a child.
    Filter(Filter),
    /// Tuple-at-a-time nested-loops join.
    Join(Join),
    /// Eager grouped aggregation.
    Aggregate(Aggregate),
    /// Child-draining insert driver.
    Insert(Insert),
    /// Child-draining delete driver.
    Delete(Delete),
    /// In-memory tuple source.
    Values(TupleIterator),
}

impl ExecutorNode {
    /// Prepares the node (and its children) for iteration.
    pub fn open(&mut self) -> Result<(), ExecutorError> {
        match self {
            ExecutorNode::SeqScan(n) => n.open(),
            ExecutorNode::Filter(n) => n.open(),
            ExecutorNode::Join(n) => n.open(),
            ExecutorNode::Aggregate(n) => n.open(),
            ExecutorNode::Insert(n) => n.open(),
            ExecutorNode::Delete(n) => n.open(),
            ExecutorNode::Values(n) => {
                n.open();
                Ok(())
            }
        }
    }

    /// Returns the next tuple, or `None` once exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        match self {
            ExecutorNode::SeqScan(n) => n.next(),
            ExecutorNode::Filter(n) => n.next(),
            ExecutorNode::Join(n) => n.next(),
            ExecutorNode::Aggregate(n) => n.next(),
            ExecutorNode::Insert(n) => n.next(),
            ExecutorNode::Delete(n) => n.next(),
            ExecutorNode::Values(n) => Ok(n.next()),
        }
    }

    /// Returns the node to the state just after `open`.
    pub fn rewind(&mut self) -> Result<(), ExecutorError> {
        match self {
            ExecutorNode::SeqScan(n) => n.rewind(),
            ExecutorNode::Filter(n) => n.rewind(),
            ExecutorNode::Join(n) => n.rewind(),
            ExecutorNode::Aggregate(n) => n.rewind(),
            ExecutorNode::Insert(n) => n.rewind(),
            ExecutorNode::Delete(n) => n.rewind(),
            ExecutorNode::Values(n) => {
                n.rewind();
                Ok(())
            }
        }
    }

    /// Releases iterator-private state. Locks are not released.
    pub fn close(&mut self) {
        match self {
            ExecutorNode::SeqScan(n) => n.close(),
            ExecutorNode::Filter(n) => n.close(),
            ExecutorNode::Join(n) => n.close(),
            ExecutorNode::Aggregate(n) => n.close(),
            ExecutorNode::Insert(n) => n.close(),
            ExecutorNode::Delete(n) => n.close(),
            ExecutorNode::Values(n) => n.close(),
        }
    }

    /// Returns the schema of the tuples this node produces.
    pub fn schema(&self) -> &Arc<Schema> {
        match self {
            ExecutorNode::SeqScan(n) => &n.schema,
            ExecutorNode::Filter(n) => n.child.schema(),
            ExecutorNode::Join(n) => &n.schema,
            ExecutorNode::Aggregate(n) => &n.schema,
            ExecutorNode::Insert(n) => &n.schema,
            ExecutorNode::Delete(n) => &n.schema,
            ExecutorNode::Values(n) => n.schema(),
        }
    }
}

/// Restartable in-memory tuple source; also the result carrier of the
/// aggregators.
#[derive(Debug)]
pub struct TupleIterator {
    schema: Arc<Schema>,
    tuples: Vec<Tuple>,
    pos: usize,
    opened: bool,
}

impl TupleIterator {
    /// Creates an iterator over `tuples`, all conforming to `schema`.
    pub fn new(schema: Arc<Schema>, tuples: Vec<Tuple>) -> Self {
        Self {
            schema,
            tuples,
            pos: 0,
            opened: false,
        }
    }

    /// Positions the iterator before the first tuple.
    pub fn open(&mut self) {
        self.opened = true;
        self.pos = 0;
    }

    /// Returns the next tuple; `None` when exhausted or not opened.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Tuple> {
        if !self.opened {
            return None;
        }
        let tuple = self.tuples.get(self.pos).cloned();
        if tuple.is_some() {
            self.pos += 1;
        }
        tuple
    }

    /// Restarts from the first tuple.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Stops iteration until the next `open`.
    pub fn close(&mut self) {
        self.opened = false;
    }

    /// Returns the tuple schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

/// Sequential scan of a heap table under shared page locks.
#[derive(Debug)]
pub struct SeqScan {
    scan: TableScan,
    schema: Arc<Schema>,
}

impl SeqScan {
    /// Creates a scan of `table_id` on behalf of `tid`. No page is touched
    /// until `open`.
    pub fn new(
        pool: Arc<BufferPool>,
        tid: TransactionId,
        table_id: u32,
    ) -> Result<Self, ExecutorError> {
        let file = pool.catalog().file(table_id)?;
        let schema = Arc::clone(file.schema());
        Ok(Self {
            scan: TableScan::new(file, pool, tid),
            schema,
        })
    }

    fn open(&mut self) -> Result<(), ExecutorError> {
        Ok(self.scan.open()?)
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        Ok(self.scan.next()?)
    }

    fn rewind(&mut self) -> Result<(), ExecutorError> {
        Ok(self.scan.rewind()?)
    }

    fn close(&mut self) {
        self.scan.close();
    }
}

/// Passes through the child tuples satisfying a predicate.
#[derive(Debug)]
pub struct Filter {
    predicate: Predicate,
    child: Box<ExecutorNode>,
}

impl Filter {
    /// Creates a filter over `child`.
    pub fn new(predicate: Predicate, child: ExecutorNode) -> Self {
        Self {
            predicate,
            child: Box::new(child),
        }
    }

    fn open(&mut self) -> Result<(), ExecutorError> {
        self.child.open()
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        while let Some(tuple) = self.child.next()? {
            if self.predicate.matches(&tuple) {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    fn rewind(&mut self) -> Result<(), ExecutorError> {
        self.child.rewind()
    }

    fn close(&mut self) {
        self.child.close();
    }
}

/// Tuple-at-a-time nested-loops join.
///
/// The current outer tuple is held while the inner side is drained; when the
/// inner side is exhausted it is rewound and the outer side advances.
/// Matching pairs are emitted as the concatenation of the outer and inner
/// tuples.
#[derive(Debug)]
pub struct Join {
    predicate: JoinPredicate,
    left: Box<ExecutorNode>,
    right: Box<ExecutorNode>,
    outer: Option<Tuple>,
    schema: Arc<Schema>,
}

impl Join {
    /// Creates a join of `left` (outer) and `right` (inner).
    pub fn new(predicate: JoinPredicate, left: ExecutorNode, right: ExecutorNode) -> Self {
        let schema = Arc::new(Schema::merge(left.schema(), right.schema()));
        Self {
            predicate,
            left: Box::new(left),
            right: Box::new(right),
            outer: None,
            schema,
        }
    }

    fn open(&mut self) -> Result<(), ExecutorError> {
        self.outer = None;
        self.left.open()?;
        self.right.open()
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        loop {
            if self.outer.is_none() {
                match self.left.next()? {
                    Some(tuple) => self.outer = Some(tuple),
                    None => return Ok(None),
                }
            }
            let outer = self.outer.as_ref().expect("outer tuple is present");

            while let Some(inner) = self.right.next()? {
                if self.predicate.matches(outer, &inner) {
                    return Ok(Some(Tuple::join(outer, &inner)));
                }
            }

            // Inner side exhausted: advance the outer side and restart it.
            self.outer = None;
            self.right.rewind()?;
        }
    }

    fn rewind(&mut self) -> Result<(), ExecutorError> {
        self.outer = None;
        self.left.rewind()?;
        self.right.rewind()
    }

    fn close(&mut self) {
        self.outer = None;
        self.left.close();
        self.right.close();
    }
}

/// Eager grouped aggregation over a single column.
///
/// The first `open` drains the child in full through an
/// [`IntegerAggregator`] or [`StringAggregator`] (picked by the aggregated
/// field's type); afterwards the node serves group results from a
/// restartable in-memory iterator.
#[derive(Debug)]
pub struct Aggregate {
    child: Box<ExecutorNode>,
    afield: usize,
    group_field: Option<usize>,
    op: AggregateOp,
    schema: Arc<Schema>,
    results: Option<TupleIterator>,
}

impl Aggregate {
    /// Creates an aggregation of `op` over `child`'s field `afield`,
    /// grouped by `group_field` when given.
    ///
    /// # Errors
    ///
    /// `ExecutorError::InvalidAggregate` if `afield` is a string field and
    /// `op` is anything but COUNT.
    pub fn new(
        child: ExecutorNode,
        afield: usize,
        group_field: Option<usize>,
        op: AggregateOp,
    ) -> Result<Self, ExecutorError> {
        let child_schema = child.schema();
        let afield_type = child_schema.field_type(afield);
        if afield_type == FieldType::Text && op != AggregateOp::Count {
            return Err(ExecutorError::InvalidAggregate {
                op,
                field_type: afield_type,
            });
        }

        let agg_name = format!(
            "{}({})",
            op,
            child_schema
                .field_name(afield)
                .map(str::to_string)
                .unwrap_or_else(|| format!("col{}", afield))
        );
        let schema = Arc::new(match group_field {
            Some(g) => Schema::new(vec![
                (
                    child_schema.field_type(g),
                    child_schema.field_name(g).map(str::to_string),
                ),
                (FieldType::Int, Some(agg_name)),
            ]),
            None => Schema::new(vec![(FieldType::Int, Some(agg_name))]),
        });

        Ok(Self {
            child: Box::new(child),
            afield,
            group_field,
            op,
            schema,
            results: None,
        })
    }

    fn open(&mut self) -> Result<(), ExecutorError> {
        if self.results.is_none() {
            self.results = Some(self.drain_child()?);
        }
        self.results
            .as_mut()
            .expect("results were just computed")
            .open();
        Ok(())
    }

    fn drain_child(&mut self) -> Result<TupleIterator, ExecutorError> {
        let group_by = self.group_field.map(|g| (g, self.child.schema().field_type(g)));
        let afield_type = self.child.schema().field_type(self.afield);

        self.child.open()?;
        let results = match afield_type {
            FieldType::Int => {
                let mut agg = IntegerAggregator::new(group_by, self.afield, self.op);
                while let Some(tuple) = self.child.next()? {
                    agg.merge(&tuple)?;
                }
                agg.results()
            }
            FieldType::Text => {
                let mut agg = StringAggregator::new(group_by, self.afield, self.op)?;
                while let Some(tuple) = self.child.next()? {
                    agg.merge(&tuple)?;
                }
                agg.results()
            }
        };
        self.child.close();
        Ok(results)
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        Ok(self.results.as_mut().and_then(TupleIterator::next))
    }

    fn rewind(&mut self) -> Result<(), ExecutorError> {
        if let Some(results) = self.results.as_mut() {
            results.rewind();
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(results) = self.results.as_mut() {
            results.close();
        }
    }
}

/// Builds the one-field `(count)` schema shared by Insert and Delete.
fn count_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![(
        FieldType::Int,
        Some("count".to_string()),
    )]))
}

/// Inserts every child tuple into a table and reports the affected count.
///
/// The first `next` drains the child, routing each tuple through the buffer
/// pool, and yields a single one-field tuple holding the number of inserted
/// rows; subsequent calls yield end-of-stream.
pub struct Insert {
    tid: TransactionId,
    child: Box<ExecutorNode>,
    table_id: u32,
    pool: Arc<BufferPool>,
    schema: Arc<Schema>,
    done: bool,
}

impl std::fmt::Debug for Insert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Insert")
            .field("tid", &self.tid)
            .field("table_id", &self.table_id)
            .field("schema", &self.schema)
            .field("done", &self.done)
            .finish()
    }
}

impl Insert {
    /// Creates an insert of `child`'s tuples into `table_id`.
    ///
    /// # Errors
    ///
    /// `ExecutorError::SchemaMismatch` if the child's schema differs from
    /// the table's.
    pub fn new(
        tid: TransactionId,
        child: ExecutorNode,
        table_id: u32,
        pool: Arc<BufferPool>,
    ) -> Result<Self, ExecutorError> {
        let table_schema = pool.catalog().schema(table_id)?;
        if *table_schema != **child.schema() {
            return Err(ExecutorError::SchemaMismatch);
        }
        Ok(Self {
            tid,
            child: Box::new(child),
            table_id,
            pool,
            schema: count_schema(),
            done: false,
        })
    }

    fn open(&mut self) -> Result<(), ExecutorError> {
        self.done = false;
        self.child.open()
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let mut count = 0;
        while let Some(mut tuple) = self.child.next()? {
            self.pool.insert_tuple(self.tid, self.table_id, &mut tuple)?;
            count += 1;
        }
        Ok(Some(Tuple::new(
            Arc::clone(&self.schema),
            vec![Field::Int(count)],
        )))
    }

    fn rewind(&mut self) -> Result<(), ExecutorError> {
        self.done = false;
        self.child.rewind()
    }

    fn close(&mut self) {
        self.child.close();
    }
}

/// Deletes every child tuple from its table and reports the affected count.
#[derive(Debug)]
pub struct Delete {
    tid: TransactionId,
    child: Box<ExecutorNode>,
    pool: Arc<BufferPool>,
    schema: Arc<Schema>,
    done: bool,
}

impl Delete {
    /// Creates a delete of `child`'s tuples; each tuple's record id names
    /// the page it is removed from.
    pub fn new(tid: TransactionId, child: ExecutorNode, pool: Arc<BufferPool>) -> Self {
        Self {
            tid,
            child: Box::new(child),
            pool,
            schema: count_schema(),
            done: false,
        }
    }

    fn open(&mut self) -> Result<(), ExecutorError> {
        self.done = false;
        self.child.open()
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let mut count = 0;
        while let Some(tuple) = self.child.next()? {
            self.pool.delete_tuple(self.tid, &tuple)?;
            count += 1;
        }
        Ok(Some(Tuple::new(
            Arc::clone(&self.schema),
            vec![Field::Int(count)],
        )))
    }

    fn rewind(&mut self) -> Result<(), ExecutorError> {
        self.done = false;
        self.child.rewind()
    }

    fn close(&mut self) {
        self.child.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::predicate::CompareOp;

    fn two_col_schema() -> Arc<Schema> {
        Arc::new(Schema::named(
            &[FieldType::Int, FieldType::Int],
            &["id", "v"],
        ))
    }

    fn rows(pairs: &[(i32, i32)]) -> ExecutorNode {
        let schema = two_col_schema();
        let tuples = pairs
            .iter()
            .map(|(a, b)| {
                Tuple::new(Arc::clone(&schema), vec![Field::Int(*a), Field::Int(*b)])
            })
            .collect();
        ExecutorNode::Values(TupleIterator::new(schema, tuples))
    }

    fn collect(node: &mut ExecutorNode) -> Vec<Tuple> {
        let mut out = Vec::new();
        while let Some(t) = node.next().unwrap() {
            out.push(t);
        }
        out
    }

    #[test]
    fn test_tuple_iterator_contract() {
        let mut node = rows(&[(1, 10), (2, 20)]);

        // Nothing before open.
        assert!(node.next().unwrap().is_none());

        node.open().unwrap();
        assert_eq!(collect(&mut node).len(), 2);
        assert!(node.next().unwrap().is_none());

        node.rewind().unwrap();
        assert_eq!(collect(&mut node).len(), 2);

        node.close();
        assert!(node.next().unwrap().is_none());
    }

    #[test]
    fn test_filter_keeps_matches() {
        let child = rows(&[(1, 5), (2, 15), (3, 25)]);
        let mut node = ExecutorNode::Filter(Filter::new(
            Predicate::new(1, CompareOp::GreaterThan, Field::Int(10)),
            child,
        ));
        node.open().unwrap();
        let out = collect(&mut node);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].field(0), &Field::Int(2));
        assert_eq!(out[1].field(0), &Field::Int(3));
    }

    #[test]
    fn test_join_concatenates_matches() {
        let left = rows(&[(1, 0), (2, 0)]);
        let right = rows(&[(2, 7), (1, 8), (1, 9)]);
        let mut node = ExecutorNode::Join(Join::new(
            JoinPredicate::new(0, CompareOp::Equals, 0),
            left,
            right,
        ));
        node.open().unwrap();
        let out = collect(&mut node);

        // Outer order: both right matches of 1, then the match of 2.
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].schema().len(), 4);
        assert_eq!(out[0].field(0), &Field::Int(1));
        assert_eq!(out[0].field(3), &Field::Int(8));
        assert_eq!(out[1].field(3), &Field::Int(9));
        assert_eq!(out[2].field(0), &Field::Int(2));
        assert_eq!(out[2].field(3), &Field::Int(7));
    }

    #[test]
    fn test_join_rewind_restarts_both_sides() {
        let left = rows(&[(1, 0)]);
        let right = rows(&[(1, 1), (1, 2)]);
        let mut node = ExecutorNode::Join(Join::new(
            JoinPredicate::new(0, CompareOp::Equals, 0),
            left,
            right,
        ));
        node.open().unwrap();
        assert_eq!(collect(&mut node).len(), 2);

        node.rewind().unwrap();
        assert_eq!(collect(&mut node).len(), 2);
    }

    #[test]
    fn test_join_with_empty_inner() {
        let left = rows(&[(1, 0), (2, 0)]);
        let right = rows(&[]);
        let mut node = ExecutorNode::Join(Join::new(
            JoinPredicate::new(0, CompareOp::Equals, 0),
            left,
            right,
        ));
        node.open().unwrap();
        assert!(collect(&mut node).is_empty());
    }

    #[test]
    fn test_aggregate_node_grouped_avg() {
        let schema = Arc::new(Schema::named(
            &[FieldType::Text, FieldType::Int],
            &["k", "v"],
        ));
        let tuples = [("a", 2), ("a", 4), ("b", 10)]
            .iter()
            .map(|(k, v)| {
                Tuple::new(Arc::clone(&schema), vec![Field::from(*k), Field::Int(*v)])
            })
            .collect();
        let child = ExecutorNode::Values(TupleIterator::new(schema, tuples));

        let mut node = ExecutorNode::Aggregate(
            Aggregate::new(child, 1, Some(0), AggregateOp::Avg).unwrap(),
        );
        assert_eq!(node.schema().len(), 2);
        assert_eq!(node.schema().field_name(1), Some("AVG(v)"));

        node.open().unwrap();
        let out = collect(&mut node);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].field(0), &Field::from("a"));
        assert_eq!(out[0].field(1), &Field::Int(3));
        assert_eq!(out[1].field(0), &Field::from("b"));
        assert_eq!(out[1].field(1), &Field::Int(10));

        // Results are restartable without re-draining the child.
        node.rewind().unwrap();
        assert_eq!(collect(&mut node).len(), 2);
    }

    #[test]
    fn test_aggregate_node_rejects_string_sum() {
        let schema = Arc::new(Schema::named(&[FieldType::Text], &["s"]));
        let child = ExecutorNode::Values(TupleIterator::new(schema, vec![]));
        let err = Aggregate::new(child, 0, None, AggregateOp::Sum).unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidAggregate { .. }));
    }

    #[test]
    fn test_ungrouped_count_of_empty_input() {
        let child = rows(&[]);
        let mut node = ExecutorNode::Aggregate(
            Aggregate::new(child, 1, None, AggregateOp::Count).unwrap(),
        );
        node.open().unwrap();
        // No input tuples means no groups at all.
        assert!(collect(&mut node).is_empty());
    }
}
