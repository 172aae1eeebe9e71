//! On-disk fixtures and sample schemas.

use catalog::{Attribute, Schema};
use common::{Config, ReplacementPolicy};
use record::{Record, Table};
use std::path::PathBuf;
use tempfile::TempDir;
use types::Value;

/// The canonical three-attribute schema used across the integration tests:
/// `(a: Int, b: Text[4], c: Bool)` keyed on `a`.
pub fn abc_schema() -> Schema {
    Schema::try_new(
        vec![
            Attribute::int("a"),
            Attribute::text("b", 4),
            Attribute::bool("c"),
        ],
        vec![0],
    )
    .expect("valid schema")
}

/// A single-attribute `(n: Int)` schema for slot-packing tests.
pub fn int_schema() -> Schema {
    Schema::try_new(vec![Attribute::int("n")], vec![0]).expect("valid schema")
}

/// A small pool configuration that forces eviction early.
pub fn small_pool_config(frames: usize, policy: ReplacementPolicy) -> Config {
    Config::builder()
        .buffer_pool_frames(frames)
        .replacement_policy(policy)
        .build()
}

/// A table file created inside its own temporary directory.
///
/// The directory lives as long as the fixture; dropping it removes the
/// table file with it.
pub struct TableFixture {
    dir: TempDir,
    path: PathBuf,
}

impl TableFixture {
    /// Create a fresh table with `schema`.
    pub fn create(schema: Schema) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("fixture.tbl");
        Table::create(&path, &schema).expect("create table");
        Self { dir, path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// Open the table with default configuration.
    pub fn open(&self) -> Table {
        Table::open(&self.path, &Config::default()).expect("open table")
    }

    /// Open the table with a pool of `frames` frames under `policy`.
    pub fn open_with(&self, frames: usize, policy: ReplacementPolicy) -> Table {
        Table::open(&self.path, &small_pool_config(frames, policy)).expect("open table")
    }
}

/// Build a record holding `values`, panicking on schema mismatch.
pub fn record_of(schema: &Schema, values: &[Value]) -> Record {
    Record::from_values(schema, values).expect("build record")
}
