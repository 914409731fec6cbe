//! Buffer pool implementation.
//!
//! The pool is a bounded map from [`PageId`] to shared page handles, ordered
//! by recency of access. A handle is an `Arc<RwLock<HeapPage>>`: the page
//! *lock* (from the lock manager) grants a transaction the right to read or
//! mutate the page, while the handle's `RwLock` is a short-lived latch that
//! keeps concurrent byte access sound.
//!
//! # Latch hierarchy
//!
//! 1. Lock manager monitor (inside `get_page`, may block or abort)
//! 2. Pool state mutex (map + LRU queue; also covers flush/evict/remove,
//!    which are therefore mutually exclusive)
//! 3. Per-page `RwLock` latch, held only for the duration of a copy or an
//!    in-place mutation
//!
//! Nothing calls back into the pool while holding a page latch.
//!
//! # NO-STEAL
//!
//! Eviction scans the LRU queue for the first *clean* page and fails with
//! [`BufferError::NoEvictablePage`] when all residents are dirty. Dirty
//! pages reach disk only through [`flush_page`](BufferPool::flush_page) and
//! friends, which append an update record to the log and force it before
//! the data write.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::catalog::Catalog;
use crate::heap::{HeapError, HeapPage};
use crate::storage::PageId;
use crate::tuple::Tuple;
use crate::tx::{LockManager, Permissions, TransactionId};
use crate::wal::WalManager;

use super::error::BufferError;

/// Default number of pages the pool holds.
pub const DEFAULT_POOL_CAPACITY: usize = 50;

/// Shared handle to a cached page.
pub type PageHandle = Arc<RwLock<HeapPage>>;

/// Cache map plus LRU queue, guarded by the pool mutex.
///
/// Invariant: `lru` holds exactly the keys of `pages`, least recently used
/// at the front.
#[derive(Debug)]
struct PoolState {
    pages: HashMap<PageId, PageHandle>,
    lru: VecDeque<PageId>,
}

/// Bounded LRU cache of heap pages with strict-2PL locking and NO-STEAL
/// eviction.
#[derive(Debug)]
pub struct BufferPool {
    capacity: usize,
    catalog: Arc<Catalog>,
    wal: Arc<WalManager>,
    lock_manager: LockManager,
    state: Mutex<PoolState>,
}

impl BufferPool {
    /// Creates a pool caching up to `capacity` pages.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(catalog: Arc<Catalog>, wal: Arc<WalManager>, capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            capacity,
            catalog,
            wal,
            lock_manager: LockManager::new(),
            state: Mutex::new(PoolState {
                pages: HashMap::with_capacity(capacity),
                lru: VecDeque::with_capacity(capacity),
            }),
        }
    }

    /// Returns the catalog this pool resolves tables through.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Returns the pool capacity in pages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of resident pages.
    pub fn resident_count(&self) -> usize {
        self.state.lock().pages.len()
    }

    /// Returns true if `pid` is currently cached.
    pub fn is_resident(&self, pid: PageId) -> bool {
        self.state.lock().pages.contains_key(&pid)
    }

    /// Fetches a page on behalf of `tid` with the requested permission.
    ///
    /// Blocks until the page lock is granted. On a cache hit the page's LRU
    /// position is refreshed; on a miss the page is read from its heap file,
    /// evicting the least recently used clean page if the pool is full.
    ///
    /// # Errors
    ///
    /// - [`BufferError::Aborted`] if waiting for the lock would deadlock
    /// - [`BufferError::NoEvictablePage`] if the pool is full of dirty pages
    /// - catalog and I/O errors from resolving and reading the page
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permissions,
    ) -> Result<PageHandle, BufferError> {
        // The only suspension point: may block on the page lock or abort.
        self.lock_manager.lock(pid, tid, perm)?;

        let mut state = self.state.lock();
        if let Some(handle) = state.pages.get(&pid) {
            let handle = Arc::clone(handle);
            Self::touch(&mut state, pid);
            return Ok(handle);
        }

        if state.pages.len() >= self.capacity {
            Self::evict_page(&mut state)?;
        }

        let file = self.catalog.file(pid.table_id)?;
        let page = file.read_page(pid)?;
        let handle = Arc::new(RwLock::new(page));
        state.pages.insert(pid, Arc::clone(&handle));
        state.lru.push_back(pid);
        trace!(%pid, %tid, "page faulted in");
        Ok(handle)
    }

    /// Inserts `tuple` into `table_id` on behalf of `tid`.
    ///
    /// Delegates placement to the heap file (which fetches candidate pages
    /// back through this pool under exclusive permission), then marks every
    /// dirtied page with `tid` and re-installs it.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: u32,
        tuple: &mut Tuple,
    ) -> Result<(), BufferError> {
        let file = self.catalog.file(table_id)?;
        let dirtied = file.insert_tuple(tid, tuple, self)?;
        self.install_dirty(tid, dirtied)
    }

    /// Deletes `tuple` from the table its record id names.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<(), BufferError> {
        let rid = tuple.record_id().ok_or(HeapError::MissingRecordId)?;
        let file = self.catalog.file(rid.page_id.table_id)?;
        let dirtied = file.delete_tuple(tid, tuple, self)?;
        self.install_dirty(tid, dirtied)
    }

    /// Commits or aborts `tid` and releases all of its locks.
    ///
    /// On commit every page dirtied by `tid` goes through the
    /// log-then-write flush path and its before-image is refreshed to the
    /// committed contents. On abort the dirty pages are discarded and
    /// authoritative copies are re-read from disk; handles obtained before
    /// the abort must not be used afterwards.
    pub fn transaction_complete(
        &self,
        tid: TransactionId,
        commit: bool,
    ) -> Result<(), BufferError> {
        let result = if commit {
            self.commit_pages(tid)
        } else {
            self.restore_pages(tid)
        };
        // Locks go away even if a flush failed; the transaction is over
        // either way.
        self.lock_manager.release_transaction(tid);
        debug!(%tid, commit, "transaction complete");
        result
    }

    /// Returns true if `tid` holds a lock on `pid` in any mode.
    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_manager.holds(pid, tid)
    }

    /// Releases `tid`'s lock on `pid` before transaction completion.
    ///
    /// This breaks two-phase locking; callers must know the page will not
    /// be touched by `tid` again.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) {
        self.lock_manager.release(pid, tid);
    }

    /// Flushes every dirty resident page.
    ///
    /// Writes uncommitted data to disk, so this breaks NO-STEAL if used
    /// while transactions are in flight.
    pub fn flush_all_pages(&self) -> Result<(), BufferError> {
        let mut state = self.state.lock();
        let resident: Vec<PageId> = state.lru.iter().copied().collect();
        for pid in resident {
            self.flush_page_locked(&mut state, pid)?;
        }
        Ok(())
    }

    /// Flushes `pid` if it is resident and dirty.
    pub fn flush_page(&self, pid: PageId) -> Result<(), BufferError> {
        let mut state = self.state.lock();
        self.flush_page_locked(&mut state, pid)
    }

    /// Flushes every page dirtied by `tid`.
    pub fn flush_pages(&self, tid: TransactionId) -> Result<(), BufferError> {
        let mut state = self.state.lock();
        let dirtied = Self::pages_dirtied_by(&state, tid);
        for pid in dirtied {
            self.flush_page_locked(&mut state, pid)?;
        }
        Ok(())
    }

    /// Drops `pid` from the cache without flushing. Used by abort paths and
    /// by page-recycling callers; any dirty contents are lost.
    pub fn remove_page(&self, pid: PageId) {
        let mut state = self.state.lock();
        state.pages.remove(&pid);
        state.lru.retain(|resident| *resident != pid);
    }

    /// Marks freshly mutated pages dirty with their writer and (re)installs
    /// them, so later requests observe the updated copies.
    fn install_dirty(
        &self,
        tid: TransactionId,
        dirtied: Vec<(PageId, PageHandle)>,
    ) -> Result<(), BufferError> {
        let mut state = self.state.lock();
        for (pid, handle) in dirtied {
            handle.write().set_dirty(Some(tid));
            if state.pages.insert(pid, handle).is_none() {
                // Re-installing a page that fell out between the mutation
                // and this call; make room for it like any other miss.
                if state.pages.len() > self.capacity {
                    Self::evict_page(&mut state)?;
                }
                state.lru.push_back(pid);
            } else {
                Self::touch(&mut state, pid);
            }
        }
        Ok(())
    }

    /// Commit path: log-then-write each page dirtied by `tid`, then refresh
    /// its before-image to the contents that just reached disk.
    fn commit_pages(&self, tid: TransactionId) -> Result<(), BufferError> {
        let mut state = self.state.lock();
        let dirtied = Self::pages_dirtied_by(&state, tid);
        for pid in dirtied {
            self.flush_page_locked(&mut state, pid)?;
            if let Some(handle) = state.pages.get(&pid) {
                handle.write().set_before_image();
            }
        }
        Ok(())
    }

    /// Abort path: replace each page dirtied by `tid` with the
    /// authoritative copy re-read from its heap file.
    fn restore_pages(&self, tid: TransactionId) -> Result<(), BufferError> {
        let mut state = self.state.lock();
        let dirtied = Self::pages_dirtied_by(&state, tid);
        for pid in dirtied {
            let file = self.catalog.file(pid.table_id)?;
            let page = file.read_page(pid)?;
            state.pages.insert(pid, Arc::new(RwLock::new(page)));
            trace!(%pid, %tid, "dirty page discarded and re-read");
        }
        Ok(())
    }

    /// Flushes one page under the already-held state mutex: append an
    /// update record, force the log, write the page, mark it clean.
    fn flush_page_locked(&self, state: &mut PoolState, pid: PageId) -> Result<(), BufferError> {
        let Some(handle) = state.pages.get(&pid) else {
            return Ok(());
        };
        let mut page = handle.write();
        let Some(tid) = page.dirty() else {
            return Ok(());
        };

        let after_image = page.encode();
        self.wal
            .log_write(tid, pid, page.before_image_bytes(), &after_image)?;
        self.wal.force()?;

        let file = self.catalog.file(pid.table_id)?;
        file.write_page(&page)?;
        page.set_dirty(None);
        debug!(%pid, %tid, "dirty page flushed");
        Ok(())
    }

    /// Evicts the least recently used clean page.
    ///
    /// # Errors
    ///
    /// [`BufferError::NoEvictablePage`] if every resident page is dirty.
    fn evict_page(state: &mut PoolState) -> Result<(), BufferError> {
        let victim = state
            .lru
            .iter()
            .copied()
            .find(|pid| state.pages[pid].read().dirty().is_none())
            .ok_or(BufferError::NoEvictablePage)?;

        state.pages.remove(&victim);
        state.lru.retain(|pid| *pid != victim);
        trace!(pid = %victim, "clean page evicted");
        Ok(())
    }

    fn pages_dirtied_by(state: &PoolState, tid: TransactionId) -> Vec<PageId> {
        state
            .lru
            .iter()
            .copied()
            .filter(|pid| state.pages[pid].read().dirty() == Some(tid))
            .collect()
    }

    fn touch(state: &mut PoolState, pid: PageId) {
        state.lru.retain(|resident| *resident != pid);
        state.lru.push_back(pid);
    }
}
