//! Bounded page cache with transaction-scoped commit and abort.
//!
//! Every page access in the system funnels through
//! [`BufferPool::get_page`], which acquires the page lock first and then
//! serves the page from cache or disk. Eviction follows NO-STEAL: dirty
//! pages never leave memory except through the commit-time flush path.

pub mod error;
pub mod pool;

pub use error::BufferError;
pub use pool::{BufferPool, PageHandle, DEFAULT_POOL_CAPACITY};
