//! Page cache and page-level lock manager for a small transactional store.
//!
//! Transactions run under strict two-phase locking. Pages dirtied by a
//! transaction stay in the cache until it completes (no-steal) and are
//! written out when it commits (force).
pub mod accessor;
pub mod buffer;
pub mod config;
pub mod lock;
pub mod rdbms;
pub mod storage;
pub mod tx;
