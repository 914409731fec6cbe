//! Pull-based query execution.
//!
//! Query plans are trees of [`ExecutorNode`]s following the Volcano model:
//! each node yields tuples one at a time via `next()`, pulling from its
//! children as needed. Leaf scans obtain pages through the buffer pool;
//! `Insert` and `Delete` drive mutations through it.

pub mod aggregate;
pub mod error;
pub mod node;
pub mod predicate;

pub use aggregate::{AggregateOp, IntegerAggregator, StringAggregator};
pub use error::ExecutorError;
pub use node::{ExecutorNode, TupleIterator};
pub use predicate::{CompareOp, JoinPredicate, Predicate};
