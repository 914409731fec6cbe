//! Database context: configuration and subsystem wiring.
//!
//! [`Database`] replaces the usual grab-bag of process globals with one
//! explicit context object built before any transactional work begins. It
//! owns the catalog, the update log, and the buffer pool, and hands out the
//! `Arc`s the storage and execution layers thread through their
//! constructors.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::buffer::{BufferPool, DEFAULT_POOL_CAPACITY};
use crate::catalog::Catalog;
use crate::heap::{HeapError, HeapFile};
use crate::storage::PAGE_SIZE;
use crate::tuple::Schema;
use crate::wal::WalManager;

/// Tunables fixed at database construction.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Bytes per heap page. The default suits real use; tests shrink it to
    /// exercise multi-page tables cheaply.
    pub page_size: usize,
    /// Buffer pool capacity in pages.
    pub pool_capacity: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}

/// A running database instance.
pub struct Database {
    config: DbConfig,
    catalog: Arc<Catalog>,
    wal: Arc<WalManager>,
    pool: Arc<BufferPool>,
}

impl Database {
    /// Creates a database with default configuration, logging to `log_path`.
    pub fn new(log_path: impl Into<PathBuf>) -> io::Result<Self> {
        Self::with_config(log_path, DbConfig::default())
    }

    /// Creates a database with the given configuration.
    pub fn with_config(log_path: impl Into<PathBuf>, config: DbConfig) -> io::Result<Self> {
        let catalog = Arc::new(Catalog::new());
        let wal = Arc::new(WalManager::open(log_path)?);
        let pool = Arc::new(BufferPool::new(
            Arc::clone(&catalog),
            Arc::clone(&wal),
            config.pool_capacity,
        ));
        Ok(Self {
            config,
            catalog,
            wal,
            pool,
        })
    }

    /// Returns the configuration this database was built with.
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Returns the table registry.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Returns the update log.
    pub fn wal(&self) -> &Arc<WalManager> {
        &self.wal
    }

    /// Returns the buffer pool.
    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Opens (or creates) a heap file at `path` with this database's page
    /// size and registers it under `name`. Returns the table id.
    pub fn create_table(
        &self,
        path: impl AsRef<Path>,
        schema: Arc<Schema>,
        name: &str,
    ) -> Result<u32, HeapError> {
        let file = Arc::new(HeapFile::open(
            path.as_ref(),
            schema,
            self.config.page_size,
        )?);
        Ok(self.catalog.add_table(file, name))
    }
}
