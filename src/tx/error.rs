//! Transaction-level errors.

use std::fmt;

use super::TransactionId;

/// Errors from lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxError {
    /// The transaction was chosen as the deadlock victim and must abort.
    ///
    /// The holder of this error must finish the transaction with
    /// `transaction_complete(tid, false)` to discard its dirty pages and
    /// release its locks.
    Aborted(TransactionId),
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxError::Aborted(tid) => {
                write!(f, "transaction {} aborted: deadlock detected", tid)
            }
        }
    }
}

impl std::error::Error for TxError {}
