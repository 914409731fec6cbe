//! Heap file: a table as an unordered sequence of pages in one OS file.
//!
//! Page `k` occupies bytes `[k * page_size, (k+1) * page_size)`; the file
//! length is always a multiple of the page size. The file handle is shared
//! behind a mutex, which also serializes file extension so concurrent
//! inserts cannot tear an append.
//!
//! All tuple-level operations go through the buffer pool: `insert_tuple` and
//! `delete_tuple` fetch the affected pages under exclusive permission and
//! mutate the cached copies, leaving the disk write to commit-time flushing.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::buffer::{BufferError, BufferPool, PageHandle};
use crate::storage::PageId;
use crate::tuple::{Schema, Tuple};
use crate::tx::{Permissions, TransactionId};

use super::error::HeapError;
use super::page::HeapPage;

/// 32-bit FNV-1a over the absolute file path; gives every heap file a table
/// id that is stable across runs.
fn path_hash(path: &Path) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in path.as_os_str().as_encoded_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Table storage as a file of heap pages.
#[derive(Debug)]
pub struct HeapFile {
    path: PathBuf,
    file: Mutex<File>,
    schema: Arc<Schema>,
    table_id: u32,
    page_size: usize,
    page_count: AtomicU32,
}

impl HeapFile {
    /// Opens (or creates) the heap file at `path` for tuples of `schema`.
    ///
    /// # Errors
    ///
    /// Returns `HeapError::Corrupted` if an existing file's length is not a
    /// multiple of `page_size`.
    pub fn open(
        path: impl Into<PathBuf>,
        schema: Arc<Schema>,
        page_size: usize,
    ) -> Result<Self, HeapError> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        // Canonicalize after creation so the table id hashes the absolute path.
        let path = path.canonicalize()?;

        let len = file.metadata()?.len();
        if len % page_size as u64 != 0 {
            return Err(HeapError::Corrupted(format!(
                "file length {} is not a multiple of page size {}",
                len, page_size
            )));
        }

        Ok(Self {
            table_id: path_hash(&path),
            path,
            file: Mutex::new(file),
            schema,
            page_size,
            page_count: AtomicU32::new((len / page_size as u64) as u32),
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the id uniquely identifying this table.
    pub fn table_id(&self) -> u32 {
        self.table_id
    }

    /// Returns the tuple schema of this table.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the page size this file was opened with.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the number of pages currently in the file.
    pub fn num_pages(&self) -> u32 {
        self.page_count.load(Ordering::Acquire)
    }

    /// Reads and decodes one page from disk.
    ///
    /// # Errors
    ///
    /// `HeapError::PageOutOfBounds` if the page lies past end-of-file.
    pub fn read_page(&self, pid: PageId) -> Result<HeapPage, HeapError> {
        debug_assert_eq!(pid.table_id, self.table_id);
        if pid.page_no >= self.num_pages() {
            return Err(HeapError::PageOutOfBounds {
                pid,
                page_count: self.num_pages(),
            });
        }

        let mut image = vec![0u8; self.page_size];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(pid.byte_offset(self.page_size)))?;
            file.read_exact(&mut image)?;
        }
        HeapPage::decode(pid, Arc::clone(&self.schema), &image)
    }

    /// Writes a page's byte image to its slot in the file.
    ///
    /// The write is synchronous from the caller's perspective; durability
    /// beyond the OS cache is the flush path's concern.
    pub fn write_page(&self, page: &HeapPage) -> Result<(), HeapError> {
        let pid = page.page_id();
        debug_assert_eq!(pid.table_id, self.table_id);
        if pid.page_no >= self.num_pages() {
            return Err(HeapError::PageOutOfBounds {
                pid,
                page_count: self.num_pages(),
            });
        }

        let image = page.encode();
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(pid.byte_offset(self.page_size)))?;
        file.write_all(&image)?;
        file.flush()?;
        Ok(())
    }

    /// Extends the file by one zeroed page and returns its id.
    ///
    /// The file mutex is held across the read-extend sequence, so two
    /// concurrent extensions get distinct page numbers.
    pub fn append_blank_page(&self) -> Result<PageId, HeapError> {
        let mut file = self.file.lock();
        let page_no = self.page_count.load(Ordering::Acquire);
        let pid = PageId::new(self.table_id, page_no);

        file.seek(SeekFrom::Start(pid.byte_offset(self.page_size)))?;
        file.write_all(&vec![0u8; self.page_size])?;
        file.flush()?;
        self.page_count.store(page_no + 1, Ordering::Release);

        debug!(%pid, "heap file extended");
        Ok(pid)
    }

    /// Inserts `tuple` into the first page with a free slot, fetching each
    /// candidate page through `pool` under exclusive permission. When every
    /// page is full the file is extended by a fresh page.
    ///
    /// Returns the pages dirtied by the operation (always exactly one) so the
    /// pool can mark and re-install them. The tuple's record id is stamped
    /// with its new location.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        tuple: &mut Tuple,
        pool: &BufferPool,
    ) -> Result<Vec<(PageId, PageHandle)>, BufferError> {
        if **tuple.schema() != *self.schema {
            return Err(HeapError::SchemaMismatch.into());
        }

        for page_no in 0..self.num_pages() {
            let pid = PageId::new(self.table_id, page_no);
            let handle = pool.get_page(tid, pid, Permissions::ReadWrite)?;
            let insert = handle.write().insert_tuple(tuple);
            match insert {
                Ok(()) => return Ok(vec![(pid, handle)]),
                Err(HeapError::PageFull(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }

        let pid = self.append_blank_page()?;
        let handle = pool.get_page(tid, pid, Permissions::ReadWrite)?;
        handle.write().insert_tuple(tuple)?;
        Ok(vec![(pid, handle)])
    }

    /// Deletes `tuple` from the page its record id names, fetched through
    /// `pool` under exclusive permission.
    ///
    /// Returns the single dirtied page.
    pub fn delete_tuple(
        &self,
        tid: TransactionId,
        tuple: &Tuple,
        pool: &BufferPool,
    ) -> Result<Vec<(PageId, PageHandle)>, BufferError> {
        let rid = tuple.record_id().ok_or(HeapError::MissingRecordId)?;
        debug_assert_eq!(rid.page_id.table_id, self.table_id);

        let handle = pool.get_page(tid, rid.page_id, Permissions::ReadWrite)?;
        handle.write().delete_tuple(tuple)?;
        Ok(vec![(rid.page_id, handle)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::{Field, FieldType};
    use tempfile::tempdir;

    const PAGE_SIZE: usize = 256;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::named(&[FieldType::Int], &["v"]))
    }

    #[test]
    fn test_open_creates_empty_file() {
        let dir = tempdir().unwrap();
        let file = HeapFile::open(dir.path().join("t"), schema(), PAGE_SIZE).unwrap();
        assert_eq!(file.num_pages(), 0);
        assert!(file.path().exists());
    }

    #[test]
    fn test_table_id_is_stable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t");
        let a = HeapFile::open(&path, schema(), PAGE_SIZE).unwrap();
        let b = HeapFile::open(&path, schema(), PAGE_SIZE).unwrap();
        assert_eq!(a.table_id(), b.table_id());

        let other = HeapFile::open(dir.path().join("u"), schema(), PAGE_SIZE).unwrap();
        assert_ne!(a.table_id(), other.table_id());
    }

    #[test]
    fn test_append_and_roundtrip_page() {
        let dir = tempdir().unwrap();
        let file = HeapFile::open(dir.path().join("t"), schema(), PAGE_SIZE).unwrap();

        let pid = file.append_blank_page().unwrap();
        assert_eq!(file.num_pages(), 1);
        assert_eq!(
            std::fs::metadata(file.path()).unwrap().len(),
            PAGE_SIZE as u64
        );

        let mut page = file.read_page(pid).unwrap();
        let mut t = Tuple::new(schema(), vec![Field::Int(42)]);
        page.insert_tuple(&mut t).unwrap();
        file.write_page(&page).unwrap();

        let reread = file.read_page(pid).unwrap();
        assert_eq!(reread.tuple_count(), 1);
        assert_eq!(reread.iter().next().unwrap().field(0), &Field::Int(42));
    }

    #[test]
    fn test_read_past_end_of_file() {
        let dir = tempdir().unwrap();
        let file = HeapFile::open(dir.path().join("t"), schema(), PAGE_SIZE).unwrap();
        file.append_blank_page().unwrap();

        let err = file.read_page(PageId::new(file.table_id(), 1)).unwrap_err();
        assert!(matches!(err, HeapError::PageOutOfBounds { .. }));
    }

    #[test]
    fn test_open_rejects_torn_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t");
        std::fs::write(&path, vec![0u8; PAGE_SIZE + 1]).unwrap();
        let err = HeapFile::open(&path, schema(), PAGE_SIZE).unwrap_err();
        assert!(matches!(err, HeapError::Corrupted(_)));
    }

    #[test]
    fn test_page_count_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t");
        {
            let file = HeapFile::open(&path, schema(), PAGE_SIZE).unwrap();
            file.append_blank_page().unwrap();
            file.append_blank_page().unwrap();
        }
        let file = HeapFile::open(&path, schema(), PAGE_SIZE).unwrap();
        assert_eq!(file.num_pages(), 2);
    }
}
