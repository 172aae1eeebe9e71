//! Record manager: tuple layout inside pages, table handles, and
//! predicate scans.
//!
//! A table is one page file. Page 0 carries the catalog; every other page
//! is an array of fixed-width record slots. The first byte of a slot is its
//! tombstone: `+` marks a live record, anything else marks the slot free.
//! All page access goes through the table's buffer pool, and every pin is
//! scoped so it pairs with an unpin on all exit paths.
//!
//! # Example
//!
//! ```no_run
//! use catalog::{Attribute, Schema};
//! use common::Config;
//! use record::{Record, Table};
//! use std::path::Path;
//! use types::Value;
//!
//! let schema = Schema::try_new(vec![Attribute::int("id")], vec![0]).unwrap();
//! Table::create(Path::new("people.tbl"), &schema).unwrap();
//!
//! let mut table = Table::open(Path::new("people.tbl"), &Config::default()).unwrap();
//! let mut record = Record::from_values(table.schema(), &[Value::Int(1)]).unwrap();
//! let rid = table.insert(&mut record).unwrap();
//! assert_eq!(table.get(rid).unwrap(), record);
//! table.close().unwrap();
//! ```

use buffer::BufferPool;
use bytes::{Buf, BufMut};
use catalog::{Schema, TableInfo};
use common::{Config, DbError, DbResult, PageId, RecordId};
use expr::{EvalContext, Expr};
use log::debug;
use std::path::{Path, PathBuf};
use storage::{PAGE_SIZE, PageFile};
use types::{SqlType, Value};

/// Tombstone byte of a live record slot.
pub const TOMBSTONE_LIVE: u8 = b'+';
/// Tombstone byte of a deleted record slot.
pub const TOMBSTONE_DEAD: u8 = b'-';

/// One tuple, laid out as `[tombstone][attr0][attr1]...` in schema order.
///
/// A record starts out dead and without an identity; both change on insert.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    id: Option<RecordId>,
    data: Vec<u8>,
}

impl Record {
    /// A fresh, not-yet-inserted record for `schema`, all attributes zeroed.
    pub fn new(schema: &Schema) -> Self {
        let mut data = vec![0u8; schema.record_size()];
        data[0] = TOMBSTONE_DEAD;
        Self { id: None, data }
    }

    /// Build a record with one value per schema attribute.
    pub fn from_values(schema: &Schema, values: &[Value]) -> DbResult<Self> {
        if values.len() != schema.num_attrs() {
            return Err(DbError::CompareDifferingTypes);
        }
        let mut record = Self::new(schema);
        for (ordinal, value) in values.iter().enumerate() {
            record.set_attr(schema, ordinal, value)?;
        }
        Ok(record)
    }

    pub fn id(&self) -> Option<RecordId> {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Write attribute `ordinal`, little-endian fixed-width; text is
    /// zero-padded to its declared length.
    ///
    /// A value whose type differs from the schema's, an over-long text, or
    /// an out-of-range ordinal reports [`DbError::CompareDifferingTypes`].
    pub fn set_attr(&mut self, schema: &Schema, ordinal: usize, value: &Value) -> DbResult<()> {
        let attr = schema
            .attrs()
            .get(ordinal)
            .ok_or(DbError::CompareDifferingTypes)?;
        let offset = schema.attr_offset(ordinal);
        let mut dst = &mut self.data[offset..offset + attr.size()];

        match (attr.ty, value) {
            (SqlType::Int, Value::Int(v)) => dst.put_i32_le(*v),
            (SqlType::Float, Value::Float(v)) => dst.put_f32_le(*v),
            (SqlType::Bool, Value::Bool(v)) => dst.put_u8(u8::from(*v)),
            (SqlType::Text, Value::Text(s)) => {
                if s.len() > attr.len as usize {
                    return Err(DbError::CompareDifferingTypes);
                }
                dst.put_slice(s.as_bytes());
                dst.put_bytes(0, attr.len as usize - s.len());
            }
            _ => return Err(DbError::CompareDifferingTypes),
        }
        Ok(())
    }

    /// Read attribute `ordinal` back as a [`Value`].
    pub fn get_attr(&self, schema: &Schema, ordinal: usize) -> DbResult<Value> {
        let attr = schema
            .attrs()
            .get(ordinal)
            .ok_or(DbError::CompareDifferingTypes)?;
        let offset = schema.attr_offset(ordinal);
        let mut src = &self.data[offset..offset + attr.size()];

        Ok(match attr.ty {
            SqlType::Int => Value::Int(src.get_i32_le()),
            SqlType::Float => Value::Float(src.get_f32_le()),
            SqlType::Bool => Value::Bool(src.get_u8() != 0),
            SqlType::Text => {
                let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
                let text = std::str::from_utf8(&src[..end])
                    .map_err(|_| DbError::CompareDifferingTypes)?;
                Value::Text(text.to_string())
            }
        })
    }

    /// Decode every attribute, in schema order — the row shape the
    /// expression evaluator consumes.
    pub fn values(&self, schema: &Schema) -> DbResult<Vec<Value>> {
        (0..schema.num_attrs())
            .map(|ordinal| self.get_attr(schema, ordinal))
            .collect()
    }
}

/// Handle over one table: its buffer pool, schema, and catalog counters.
#[derive(Debug)]
pub struct Table {
    pool: BufferPool,
    schema: Schema,
    tuple_count: u32,
    /// Hint only: the last page where a delete made room. Inserts start
    /// their linear slot search here.
    first_free_page: u32,
    path: PathBuf,
}

impl Table {
    /// Create the page file for a new table and write its page-0 catalog.
    pub fn create(path: &Path, schema: &Schema) -> DbResult<()> {
        PageFile::create(path)?;
        let mut file = PageFile::open(path)?;
        let mut page = vec![0u8; PAGE_SIZE];
        TableInfo::new(schema.clone()).encode_into(&mut page)?;
        file.write_block(PageId(0), &page)?;
        Ok(())
    }

    /// Open a table, reading the schema and counters from page 0.
    ///
    /// # Panics
    ///
    /// Panics if `config.page_size` disagrees with the built-in page size.
    pub fn open(path: &Path, config: &Config) -> DbResult<Self> {
        assert_eq!(
            config.page_size, PAGE_SIZE,
            "page size is fixed at build time"
        );
        let mut pool = BufferPool::open(path, config.buffer_pool_frames, config.replacement_policy)?;
        let info = {
            let guard = pool.pin_guard(PageId(0))?;
            TableInfo::decode_from(guard.data())?
        };
        Ok(Self {
            pool,
            schema: info.schema,
            tuple_count: info.tuple_count,
            first_free_page: info.first_free_page,
            path: path.to_path_buf(),
        })
    }

    /// Persist the catalog counters and flush the pool.
    pub fn close(mut self) -> DbResult<()> {
        self.write_catalog()?;
        self.pool.shutdown()
    }

    /// Remove a table's page file from disk.
    pub fn destroy(path: &Path) -> DbResult<()> {
        PageFile::destroy(path)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Live records in the table.
    pub fn tuple_count(&self) -> u32 {
        self.tuple_count
    }

    /// The pool underneath, for IO accounting in tests and callers.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Insert a record, assigning it the first free slot at or after the
    /// `first_free_page` hint. The record's id is set to the new RID.
    ///
    /// Pinning past the file's extent appends fresh zero pages, so the
    /// search always terminates.
    pub fn insert(&mut self, record: &mut Record) -> DbResult<RecordId> {
        let record_size = self.schema.record_size();
        let slots = self.schema.slots_per_page();
        debug_assert_eq!(record.data.len(), record_size);

        let mut page = self.first_free_page.max(1);
        loop {
            if page >= self.pool.pages_on_disk() {
                debug!("table {}: appending data page {page}", self.path.display());
            }
            let mut guard = self.pool.pin_guard(PageId(page))?;
            let free = (0..slots).find(|&slot| guard.data()[slot * record_size] != TOMBSTONE_LIVE);

            let Some(slot) = free else {
                drop(guard);
                page += 1;
                continue;
            };

            let offset = slot * record_size;
            guard.data_mut()[offset] = TOMBSTONE_LIVE;
            guard.data_mut()[offset + 1..offset + record_size].copy_from_slice(&record.data[1..]);
            guard.mark_dirty();
            drop(guard);

            let rid = RecordId {
                page_id: PageId(page),
                slot: slot as u16,
            };
            record.id = Some(rid);
            record.data[0] = TOMBSTONE_LIVE;
            self.tuple_count += 1;
            return Ok(rid);
        }
    }

    /// Fetch the record at `rid`.
    ///
    /// Fails with [`DbError::NoTupleWithGivenRid`] when the RID is out of
    /// range or its slot does not hold a live record.
    pub fn get(&mut self, rid: RecordId) -> DbResult<Record> {
        self.check_rid(rid)?;
        let record_size = self.schema.record_size();

        let guard = self.pool.pin_guard(rid.page_id)?;
        let offset = rid.slot as usize * record_size;
        if guard.data()[offset] != TOMBSTONE_LIVE {
            return Err(DbError::NoTupleWithGivenRid(rid));
        }
        let data = guard.data()[offset..offset + record_size].to_vec();
        drop(guard);

        Ok(Record {
            id: Some(rid),
            data,
        })
    }

    /// Overwrite the record at `record.id()` with `record`'s payload.
    pub fn update(&mut self, record: &Record) -> DbResult<()> {
        // A record that was never inserted has no identity; page 0 is never
        // a data page, so the range check rejects it.
        let rid = record.id.unwrap_or(RecordId {
            page_id: PageId(0),
            slot: 0,
        });
        self.check_rid(rid)?;
        let record_size = self.schema.record_size();

        let mut guard = self.pool.pin_guard(rid.page_id)?;
        let offset = rid.slot as usize * record_size;
        guard.data_mut()[offset] = TOMBSTONE_LIVE;
        guard.data_mut()[offset + 1..offset + record_size].copy_from_slice(&record.data[1..]);
        guard.mark_dirty();
        Ok(())
    }

    /// Tombstone the record at `rid` and remember its page as the new
    /// free-page hint.
    pub fn delete(&mut self, rid: RecordId) -> DbResult<()> {
        self.check_rid(rid)?;
        let record_size = self.schema.record_size();

        let mut guard = self.pool.pin_guard(rid.page_id)?;
        let offset = rid.slot as usize * record_size;
        if guard.data()[offset] != TOMBSTONE_LIVE {
            return Err(DbError::NoTupleWithGivenRid(rid));
        }
        guard.data_mut()[offset] = TOMBSTONE_DEAD;
        guard.mark_dirty();
        drop(guard);

        self.tuple_count -= 1;
        self.first_free_page = rid.page_id.0;
        debug!("delete made room on page {}", rid.page_id);
        Ok(())
    }

    /// Start a predicate scan. Matching records come back in RID order.
    ///
    /// Fails with [`DbError::ScanConditionNotFound`] when no condition is
    /// supplied; scan everything with an always-true literal instead.
    pub fn scan(&mut self, condition: Option<Expr>) -> DbResult<TableScan<'_>> {
        let condition = condition.ok_or(DbError::ScanConditionNotFound)?;
        Ok(TableScan {
            attr_names: self.schema.attr_names(),
            table: self,
            condition,
            page: 1,
            slot: 0,
            started: false,
            probes: 0,
        })
    }

    fn write_catalog(&mut self) -> DbResult<()> {
        let info = TableInfo {
            tuple_count: self.tuple_count,
            first_free_page: self.first_free_page,
            schema: self.schema.clone(),
        };
        let mut guard = self.pool.pin_guard(PageId(0))?;
        info.encode_into(guard.data_mut())?;
        guard.mark_dirty();
        Ok(())
    }

    fn check_rid(&self, rid: RecordId) -> DbResult<()> {
        let in_range = rid.page_id.0 >= 1
            && rid.page_id.0 < self.pool.pages_on_disk()
            && (rid.slot as usize) < self.schema.slots_per_page();
        if in_range {
            Ok(())
        } else {
            Err(DbError::NoTupleWithGivenRid(rid))
        }
    }
}

/// Cursor over a table's slots, yielding records that satisfy the
/// condition in RID order.
///
/// The cursor sits *before* (page 1, slot 0); each `next` advances first,
/// so exhaustion resets the scan for reuse.
#[derive(Debug)]
pub struct TableScan<'a> {
    table: &'a mut Table,
    condition: Expr,
    attr_names: Vec<String>,
    page: u32,
    slot: usize,
    started: bool,
    probes: u64,
}

impl TableScan<'_> {
    /// Slots probed since the scan started, tombstoned ones included.
    pub fn probes(&self) -> u64 {
        self.probes
    }

    /// Advance to the next record satisfying the condition.
    ///
    /// Fails with [`DbError::NoMoreTuples`] once every slot has been
    /// visited; the cursor then starts over from the first data page.
    pub fn next(&mut self, out: &mut Record) -> DbResult<()> {
        let record_size = self.table.schema.record_size();
        let slots = self.table.schema.slots_per_page();

        loop {
            self.advance(slots);
            if self.page >= self.table.pool.pages_on_disk() {
                self.page = 1;
                self.slot = 0;
                self.started = false;
                self.probes = 0;
                return Err(DbError::NoMoreTuples);
            }
            self.probes += 1;

            let guard = self.table.pool.pin_guard(PageId(self.page))?;
            let offset = self.slot * record_size;
            if guard.data()[offset] != TOMBSTONE_LIVE {
                continue;
            }
            let data = guard.data()[offset..offset + record_size].to_vec();
            drop(guard);

            let rid = RecordId {
                page_id: PageId(self.page),
                slot: self.slot as u16,
            };
            let candidate = Record {
                id: Some(rid),
                data,
            };
            let row = candidate.values(&self.table.schema)?;
            let ctx = EvalContext {
                schema: &self.attr_names,
            };
            if ctx.eval_bool(&self.condition, &row)? {
                *out = candidate;
                return Ok(());
            }
        }
    }

    fn advance(&mut self, slots: usize) {
        if !self.started {
            self.started = true;
            self.page = 1;
            self.slot = 0;
            return;
        }
        self.slot += 1;
        if self.slot >= slots {
            self.slot = 0;
            self.page += 1;
        }
    }
}
