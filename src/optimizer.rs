//! Selectivity estimation.
//!
//! The optimizer's statistics layer: fixed-width equi-bucket histograms per
//! column ([`IntHistogram`], [`StringHistogram`]) and the per-table
//! [`TableStats`] that builds them with a two-pass transactional scan.

pub mod histogram;
pub mod stats;

pub use histogram::{IntHistogram, StringHistogram};
pub use stats::TableStats;
