//! Buffer pool errors.

use std::fmt;
use std::io;

use crate::catalog::CatalogError;
use crate::heap::HeapError;
use crate::tx::{TransactionId, TxError};

/// Errors surfaced by buffer pool entry points.
#[derive(Debug)]
pub enum BufferError {
    /// The requesting transaction was aborted by deadlock detection.
    ///
    /// Terminal for the transaction: the caller must finish it with
    /// `transaction_complete(tid, false)`.
    Aborted(TransactionId),
    /// Every resident page is dirty, so nothing can be evicted under
    /// NO-STEAL.
    NoEvictablePage,
    /// The page's table is not registered in the catalog.
    Catalog(CatalogError),
    /// Heap-level failure (schema mismatch, vacant slot, out-of-bounds
    /// page, I/O, ...).
    Heap(HeapError),
    /// I/O error from the log.
    Io(io::Error),
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::Aborted(tid) => {
                write!(f, "transaction {} aborted: deadlock detected", tid)
            }
            BufferError::NoEvictablePage => {
                write!(f, "no evictable page: all resident pages are dirty")
            }
            BufferError::Catalog(err) => write!(f, "{}", err),
            BufferError::Heap(err) => write!(f, "{}", err),
            BufferError::Io(err) => write!(f, "log I/O error: {}", err),
        }
    }
}

impl std::error::Error for BufferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BufferError::Catalog(err) => Some(err),
            BufferError::Heap(err) => Some(err),
            BufferError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TxError> for BufferError {
    fn from(err: TxError) -> Self {
        match err {
            TxError::Aborted(tid) => BufferError::Aborted(tid),
        }
    }
}

impl From<CatalogError> for BufferError {
    fn from(err: CatalogError) -> Self {
        BufferError::Catalog(err)
    }
}

impl From<HeapError> for BufferError {
    fn from(err: HeapError) -> Self {
        BufferError::Heap(err)
    }
}

impl From<io::Error> for BufferError {
    fn from(err: io::Error) -> Self {
        BufferError::Io(err)
    }
}
