//! Transactions and page-level locking.
//!
//! Transactions are identified by a process-unique [`TransactionId`] and run
//! one per thread. All page access happens under a page lock acquired through
//! the [`LockManager`](lock::LockManager) with a requested [`Permissions`]
//! level; locks are strict two-phase, held until the transaction commits or
//! aborts.

pub mod error;
pub mod lock;

pub use error::TxError;
pub use lock::LockManager;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Allocator for process-unique transaction ids.
///
/// A single process-wide counter keeps ids unique even when tests open
/// several [`Database`](crate::db::Database) instances that share a thread.
static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a transaction, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Allocates a fresh transaction id.
    pub fn new() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Access level requested when fetching a page.
///
/// `ReadOnly` maps to a shared page lock, `ReadWrite` to an exclusive one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permissions {
    /// Shared access: any number of concurrent readers.
    ReadOnly,
    /// Exclusive access: a single writer, no readers.
    ReadWrite,
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permissions::ReadOnly => f.write_str("shared"),
            Permissions::ReadWrite => f.write_str("exclusive"),
        }
    }
}
