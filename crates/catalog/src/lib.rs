//! Table schemas and the page-0 catalog codec.
//!
//! A schema is fixed at table creation: an ordered list of attributes with
//! bounded names, a key subset, and derived layout facts (record size, slot
//! count, attribute offsets). Page 0 of every table file carries the schema
//! and the table counters in a packed little-endian layout:
//!
//! ```text
//! tuple_count:u32 | first_free_page:u32 | num_attr:u32 | key_size:u32
//! | { name:[u8;15], type:u32, len:u32 } x num_attr
//! | key_ordinal:u32 x key_size
//! ```


use ahash::RandomState;
use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_into_slice};
use common::{DbError, DbResult, PageId};
use hashbrown::HashMap;
use log::debug;
use serde::{Deserialize, Serialize};
use storage::PAGE_SIZE;
use types::SqlType;

type Map<K, V> = HashMap<K, V, RandomState>;

/// Attribute names are stored zero-padded in a fixed 15-byte field.
pub const ATTR_NAME_LEN: usize = 15;

fn bincode_config() -> impl Config {
    config::legacy()
}

/// One attribute of a schema: a bounded name, a type tag, and the declared
/// length (meaningful only for `Text`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub ty: SqlType,
    pub len: u16,
}

impl Attribute {
    pub fn int(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: SqlType::Int,
            len: 0,
        }
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: SqlType::Float,
            len: 0,
        }
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: SqlType::Bool,
            len: 0,
        }
    }

    pub fn text(name: impl Into<String>, len: u16) -> Self {
        Self {
            name: name.into(),
            ty: SqlType::Text,
            len,
        }
    }

    /// Serialized size of this attribute inside a record slot.
    pub fn size(&self) -> usize {
        match self.ty {
            SqlType::Int | SqlType::Float => 4,
            SqlType::Bool => 1,
            SqlType::Text => self.len as usize,
        }
    }
}

/// Immutable, validated table schema.
#[derive(Clone, Debug)]
pub struct Schema {
    attrs: Vec<Attribute>,
    key: Vec<usize>,
    name_index: Map<String, usize>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.attrs == other.attrs && self.key == other.key
    }
}

impl Schema {
    /// Build a schema from attributes and key ordinals.
    ///
    /// Fails with [`DbError::CompareDifferingTypes`] when the attribute
    /// list is invalid: empty, duplicate or over-long names, zero-length
    /// `Text`, key ordinals out of range, a record too large for a page,
    /// or a catalog too large for page 0.
    pub fn try_new(attrs: Vec<Attribute>, key: Vec<usize>) -> DbResult<Self> {
        validate(&attrs, &key).map_err(|why| {
            debug!("rejected schema: {why}");
            DbError::CompareDifferingTypes
        })?;
        Ok(Self::from_parts(attrs, key))
    }

    fn from_parts(attrs: Vec<Attribute>, key: Vec<usize>) -> Self {
        let name_index = attrs
            .iter()
            .enumerate()
            .map(|(idx, attr)| (attr.name.clone(), idx))
            .collect();
        Self {
            attrs,
            key,
            name_index,
        }
    }

    pub fn attrs(&self) -> &[Attribute] {
        &self.attrs
    }

    pub fn num_attrs(&self) -> usize {
        self.attrs.len()
    }

    /// Ordinals of the key attributes.
    pub fn key(&self) -> &[usize] {
        &self.key
    }

    /// Resolve an attribute name to its ordinal.
    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    /// Attribute names in record order, the shape the evaluator consumes.
    pub fn attr_names(&self) -> Vec<String> {
        self.attrs.iter().map(|a| a.name.clone()).collect()
    }

    /// Serialized record size: one tombstone byte plus all attributes.
    pub fn record_size(&self) -> usize {
        1 + self.attrs.iter().map(Attribute::size).sum::<usize>()
    }

    /// Fixed-width slots that fit in one data page; tail bytes are unused.
    pub fn slots_per_page(&self) -> usize {
        PAGE_SIZE / self.record_size()
    }

    /// Byte offset of attribute `ordinal` inside a record, past the
    /// tombstone and all preceding attributes.
    pub fn attr_offset(&self, ordinal: usize) -> usize {
        1 + self.attrs[..ordinal]
            .iter()
            .map(Attribute::size)
            .sum::<usize>()
    }
}

fn validate(attrs: &[Attribute], key: &[usize]) -> Result<(), &'static str> {
    if attrs.is_empty() {
        return Err("no attributes");
    }
    let mut seen = Map::default();
    for attr in attrs {
        if attr.name.is_empty() || attr.name.len() > ATTR_NAME_LEN {
            return Err("attribute name must be 1..=15 bytes");
        }
        if seen.insert(attr.name.clone(), ()).is_some() {
            return Err("duplicate attribute name");
        }
        if attr.ty == SqlType::Text && attr.len == 0 {
            return Err("text attribute needs a nonzero length");
        }
    }
    if key.iter().any(|&k| k >= attrs.len()) {
        return Err("key ordinal out of range");
    }
    let record_size = 1 + attrs.iter().map(Attribute::size).sum::<usize>();
    if record_size > PAGE_SIZE {
        return Err("record larger than a page");
    }
    if catalog_size(attrs.len(), key.len()) > PAGE_SIZE {
        return Err("catalog larger than page 0");
    }
    Ok(())
}

const HEADER_BYTES: usize = 16;
const ATTR_BYTES: usize = ATTR_NAME_LEN + 8;

fn catalog_size(num_attrs: usize, key_size: usize) -> usize {
    HEADER_BYTES + num_attrs * ATTR_BYTES + key_size * 4
}

/// Page-0 image of a table: the counters plus the schema.
#[derive(Clone, Debug, PartialEq)]
pub struct TableInfo {
    pub tuple_count: u32,
    pub first_free_page: u32,
    pub schema: Schema,
}

#[derive(Serialize, Deserialize)]
struct DiskHeader {
    tuple_count: u32,
    first_free_page: u32,
    num_attr: u32,
    key_size: u32,
}

#[derive(Serialize, Deserialize)]
struct DiskAttr {
    name: [u8; ATTR_NAME_LEN],
    ty: u32,
    len: u32,
}

fn type_tag(ty: SqlType) -> u32 {
    match ty {
        SqlType::Int => 0,
        SqlType::Float => 1,
        SqlType::Bool => 2,
        SqlType::Text => 3,
    }
}

fn tag_type(tag: u32) -> Option<SqlType> {
    match tag {
        0 => Some(SqlType::Int),
        1 => Some(SqlType::Float),
        2 => Some(SqlType::Bool),
        3 => Some(SqlType::Text),
        _ => None,
    }
}

// Page 0 is the catalog; decode failures mean the page does not hold one.
fn corrupt() -> DbError {
    DbError::ReadNonExistingPage(PageId(0))
}

impl TableInfo {
    /// Fresh catalog for a table that has no tuples yet; inserts start
    /// their slot search on the first data page.
    pub fn new(schema: Schema) -> Self {
        Self {
            tuple_count: 0,
            first_free_page: 1,
            schema,
        }
    }

    /// Serialize into a page-0 buffer. The tail past the catalog is left
    /// untouched.
    pub fn encode_into(&self, page: &mut [u8]) -> DbResult<()> {
        debug_assert!(page.len() >= catalog_size(self.schema.num_attrs(), self.schema.key().len()));
        let write_failed = |_| DbError::WriteFailed(PageId(0));

        let header = DiskHeader {
            tuple_count: self.tuple_count,
            first_free_page: self.first_free_page,
            num_attr: self.schema.num_attrs() as u32,
            key_size: self.schema.key().len() as u32,
        };
        let mut offset =
            encode_into_slice(&header, page, bincode_config()).map_err(write_failed)?;

        for attr in self.schema.attrs() {
            let mut name = [0u8; ATTR_NAME_LEN];
            name[..attr.name.len()].copy_from_slice(attr.name.as_bytes());
            let disk = DiskAttr {
                name,
                ty: type_tag(attr.ty),
                len: u32::from(attr.len),
            };
            offset +=
                encode_into_slice(&disk, &mut page[offset..], bincode_config()).map_err(write_failed)?;
        }

        for &ordinal in self.schema.key() {
            offset += encode_into_slice(&(ordinal as u32), &mut page[offset..], bincode_config())
                .map_err(write_failed)?;
        }

        Ok(())
    }

    /// Deserialize a page-0 buffer written by [`TableInfo::encode_into`].
    pub fn decode_from(page: &[u8]) -> DbResult<Self> {
        let (header, mut offset): (DiskHeader, usize) =
            decode_from_slice(page, bincode_config()).map_err(|_| corrupt())?;

        let num_attr = header.num_attr as usize;
        let key_size = header.key_size as usize;
        if catalog_size(num_attr, key_size) > page.len() {
            return Err(corrupt());
        }

        let mut attrs = Vec::with_capacity(num_attr);
        for _ in 0..num_attr {
            let (disk, read): (DiskAttr, usize) =
                decode_from_slice(&page[offset..], bincode_config()).map_err(|_| corrupt())?;
            offset += read;

            let name_end = disk
                .name
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(ATTR_NAME_LEN);
            let name = std::str::from_utf8(&disk.name[..name_end])
                .map_err(|_| corrupt())?
                .to_string();
            let ty = tag_type(disk.ty).ok_or_else(corrupt)?;
            attrs.push(Attribute {
                name,
                ty,
                len: disk.len as u16,
            });
        }

        let mut key = Vec::with_capacity(key_size);
        for _ in 0..key_size {
            let (ordinal, read): (u32, usize) =
                decode_from_slice(&page[offset..], bincode_config()).map_err(|_| corrupt())?;
            offset += read;
            key.push(ordinal as usize);
        }

        validate(&attrs, &key).map_err(|_| corrupt())?;
        Ok(Self {
            tuple_count: header.tuple_count,
            first_free_page: header.first_free_page,
            schema: Schema::from_parts(attrs, key),
        })
    }
}
