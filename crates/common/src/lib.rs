
use serde::{Deserialize, Serialize};
use std::{fmt, io, path::PathBuf};
use thiserror::Error;

/// Logical identifier for a page in a page file.
///
/// Pages are numbered from 0; page 0 of a table file holds the catalog.
/// Examples:
/// - `let catalog_page = PageId(0);`
/// - `let first_data_page = PageId(1);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fully-qualified identifier for a record within a page.
/// Examples:
/// - `let rid = RecordId { page_id: PageId(1), slot: 3 };`
/// - `let rid = RecordId { page_id: PageId(42), slot: 0 };`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot)
    }
}

/// Page replacement policies the buffer pool supports.
///
/// The policy is fixed when a pool is initialized; mixing policies on a
/// single pool is not supported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplacementPolicy {
    Fifo,
    #[default]
    Lru,
    Lfu,
    Clock,
}

/// Canonical error type shared across the storage kernel.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("page {0} does not exist")]
    ReadNonExistingPage(PageId),
    #[error("write to page {0} failed")]
    WriteFailed(PageId),
    #[error("no unpinned frame available for replacement")]
    NoAvailableFrame,
    #[error("{0} page(s) still pinned in the buffer pool")]
    PinnedPages(usize),
    #[error("no tuple with rid {0}")]
    NoTupleWithGivenRid(RecordId),
    #[error("no more tuples")]
    NoMoreTuples,
    #[error("scan started without a condition")]
    ScanConditionNotFound,
    #[error("comparison between differing types")]
    CompareDifferingTypes,
    #[error("expression did not evaluate to a boolean")]
    ExprNotBoolean,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for a table handle and its buffer pool.
///
/// # Example
/// ```
/// use common::{Config, ReplacementPolicy};
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .buffer_pool_frames(64)
///     .replacement_policy(ReplacementPolicy::Clock)
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory where table files live.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Fixed-size page allocation in bytes. Informational: the kernel fixes
    /// the page size at build time and rejects mismatching values.
    #[builder(default = 4096)]
    pub page_size: usize,
    /// Number of frames the buffer pool keeps resident.
    #[builder(default = 256)]
    pub buffer_pool_frames: usize,
    /// Victim selection policy for the buffer pool.
    #[builder(default)]
    pub replacement_policy: ReplacementPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            page_size: 4096,
            buffer_pool_frames: 256,
            replacement_policy: ReplacementPolicy::Lru,
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{Config, DbError, DbResult, PageId, RecordId, ReplacementPolicy};
}
