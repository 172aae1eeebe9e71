//! Test support utilities for the storage-kernel workspace.
//!
//! Provides shared fixtures: temporary tables backed by `tempfile`, sample
//! schemas, and record builders.
//!
//! # Example Usage
//!
//! ```no_run
//! use testsupport::prelude::*;
//! use types::Value;
//!
//! let fixture = TableFixture::create(abc_schema());
//! let mut table = fixture.open();
//! table
//!     .insert(&mut record_of(table.schema(), &[Value::Int(1), Value::Text("x".into()), Value::Bool(true)]))
//!     .unwrap();
//! ```

pub mod fixtures;

/// Convenient re-exports for common testing patterns.
pub mod prelude {
    pub use crate::fixtures::*;
}
