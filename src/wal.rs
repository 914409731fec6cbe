//! Before/after-image log.
//!
//! The buffer pool funnels every dirty-page flush through this log: a record
//! holding the page's before-image and after-image is appended and forced to
//! disk *before* the data page itself is written. Commit-time flushing under
//! the NO-STEAL buffer policy is the only writer.
//!
//! Recovery (replaying these records) is out of scope; the log exists to
//! honor the log-then-write contract and to make the write-through path
//! observable in tests.
//!
//! # Record framing
//!
//! ```text
//! +--------+----------+---------+------------+--------+-----------+-------+
//! | tid u64| table u32| page u32| before u32 | before | after u32 | after |
//! +--------+----------+---------+------------+--------+-----------+-------+
//! ```
//!
//! All integers are big-endian.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use tracing::trace;

use crate::storage::PageId;
use crate::tx::TransactionId;

/// Append-only log of page update records.
#[derive(Debug)]
pub struct WalManager {
    path: PathBuf,
    file: Mutex<File>,
}

impl WalManager {
    /// Opens (or creates) the log file at `path`, appending to any existing
    /// records.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends an update record for `pid`, last written by `tid`.
    ///
    /// The record is buffered by the OS until [`force`](Self::force) is
    /// called; callers on the flush path must force before writing the data
    /// page.
    pub fn log_write(
        &self,
        tid: TransactionId,
        pid: PageId,
        before_image: &[u8],
        after_image: &[u8],
    ) -> io::Result<()> {
        let mut record =
            BytesMut::with_capacity(24 + before_image.len() + after_image.len());
        record.put_u64(tid.as_u64());
        record.put_u32(pid.table_id);
        record.put_u32(pid.page_no);
        record.put_u32(before_image.len() as u32);
        record.put_slice(before_image);
        record.put_u32(after_image.len() as u32);
        record.put_slice(after_image);

        let mut file = self.file.lock();
        file.write_all(&record)?;
        trace!(%tid, %pid, "update record appended");
        Ok(())
    }

    /// Forces all appended records to stable storage.
    pub fn force(&self) -> io::Result<()> {
        let file = self.file.lock();
        file.sync_all()
    }
}
