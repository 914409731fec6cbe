//! Transactional sequential scan over a heap file.
//!
//! [`TableScan`] yields every tuple of a table in page order, fetching one
//! page at a time through the buffer pool under shared permission. It never
//! prefetches past the current page, and it never releases the locks of
//! pages it has visited — those stay held until the owning transaction
//! completes (strict two-phase locking).
//!
//! The scan is an explicit state machine: `Created -> Opened -> Drained`,
//! with `rewind` as the only edge back out of `Drained`, and `Closed` as the
//! terminal state. A scan that was never opened yields nothing.

use std::sync::Arc;

use crate::buffer::{BufferError, BufferPool};
use crate::storage::PageId;
use crate::tuple::Tuple;
use crate::tx::{Permissions, TransactionId};

use super::file::HeapFile;

#[derive(Debug)]
enum ScanState {
    Created,
    Opened {
        /// Page number the next page fault will load.
        next_page_no: u32,
        /// Tuples of the current page, buffered while its latch was held.
        current: std::vec::IntoIter<Tuple>,
    },
    Drained,
    Closed,
}

/// Iterator over all tuples of a heap file, in page order.
#[derive(Debug)]
pub struct TableScan {
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
    tid: TransactionId,
    state: ScanState,
}

impl TableScan {
    /// Creates a scan in the `Created` state; no page is touched until
    /// [`open`](Self::open).
    pub fn new(file: Arc<HeapFile>, pool: Arc<BufferPool>, tid: TransactionId) -> Self {
        Self {
            file,
            pool,
            tid,
            state: ScanState::Created,
        }
    }

    /// Acquires page 0 under shared permission and positions the scan before
    /// the first tuple. An empty file opens directly into `Drained`.
    pub fn open(&mut self) -> Result<(), BufferError> {
        if self.file.num_pages() == 0 {
            self.state = ScanState::Drained;
            return Ok(());
        }
        self.state = ScanState::Opened {
            next_page_no: 1,
            current: self.load_page(0)?,
        };
        Ok(())
    }

    /// Returns the next tuple, or `None` once the last page is exhausted.
    ///
    /// Empty intermediate pages are skipped; at most one page is faulted in
    /// per call.
    pub fn next(&mut self) -> Result<Option<Tuple>, BufferError> {
        loop {
            let next_page_no = match &mut self.state {
                ScanState::Opened {
                    next_page_no,
                    current,
                } => {
                    if let Some(tuple) = current.next() {
                        return Ok(Some(tuple));
                    }
                    *next_page_no
                }
                _ => return Ok(None),
            };

            // Current page exhausted: advance to the next page or drain.
            if next_page_no >= self.file.num_pages() {
                self.state = ScanState::Drained;
                return Ok(None);
            }
            self.state = ScanState::Opened {
                next_page_no: next_page_no + 1,
                current: self.load_page(next_page_no)?,
            };
        }
    }

    /// Returns the scan to the state just after [`open`](Self::open).
    pub fn rewind(&mut self) -> Result<(), BufferError> {
        match self.state {
            ScanState::Closed => Ok(()),
            _ => self.open(),
        }
    }

    /// Drops scan state. Page locks are *not* released; they belong to the
    /// transaction.
    pub fn close(&mut self) {
        self.state = ScanState::Closed;
    }

    /// Buffers the used tuples of one page. The page latch is held only for
    /// the copy; the page *lock* stays with the transaction.
    fn load_page(&self, page_no: u32) -> Result<std::vec::IntoIter<Tuple>, BufferError> {
        let pid = PageId::new(self.file.table_id(), page_no);
        let handle = self.pool.get_page(self.tid, pid, Permissions::ReadOnly)?;
        let tuples: Vec<Tuple> = handle.read().iter().cloned().collect();
        Ok(tuples.into_iter())
    }
}
