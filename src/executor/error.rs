//! Executor errors.

use std::fmt;

use crate::buffer::BufferError;
use crate::catalog::CatalogError;
use crate::datum::FieldType;

use super::aggregate::AggregateOp;

/// Errors from building and running operator trees.
#[derive(Debug)]
pub enum ExecutorError {
    /// Failure from the buffer pool (lock abort, eviction, I/O, ...).
    Buffer(BufferError),
    /// Table lookup failure.
    Catalog(CatalogError),
    /// A child's schema does not match the target table's schema.
    SchemaMismatch,
    /// The aggregate operator is not supported over this field type.
    InvalidAggregate {
        /// The rejected operator.
        op: AggregateOp,
        /// The aggregated field's type.
        field_type: FieldType,
    },
    /// A field held a value of an unexpected type.
    TypeMismatch {
        /// Type required by the operation.
        expected: FieldType,
        /// Type actually found.
        found: FieldType,
    },
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorError::Buffer(err) => write!(f, "{}", err),
            ExecutorError::Catalog(err) => write!(f, "{}", err),
            ExecutorError::SchemaMismatch => {
                write!(f, "child schema does not match the table schema")
            }
            ExecutorError::InvalidAggregate { op, field_type } => {
                write!(f, "{} is not supported over {} fields", op, field_type)
            }
            ExecutorError::TypeMismatch { expected, found } => {
                write!(f, "expected a {} field, found {}", expected, found)
            }
        }
    }
}

impl std::error::Error for ExecutorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutorError::Buffer(err) => Some(err),
            ExecutorError::Catalog(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BufferError> for ExecutorError {
    fn from(err: BufferError) -> Self {
        ExecutorError::Buffer(err)
    }
}

impl From<CatalogError> for ExecutorError {
    fn from(err: CatalogError) -> Self {
        ExecutorError::Catalog(err)
    }
}
