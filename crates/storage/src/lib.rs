//! Fixed-size paged file abstraction.
//!
//! A `PageFile` divides an on-disk file into pages of [`PAGE_SIZE`] bytes,
//! numbered from 0, and exposes positioned single-page reads and writes.
//! Writes never extend the file; growth happens through
//! [`PageFile::append_empty_block`] and [`PageFile::ensure_capacity`].
//! The handle tracks a cursor (the last page read or written) that drives
//! the relative-navigation reads.


use common::{DbError, DbResult, PageId};
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// Fixed page size in bytes, chosen at build time.
pub const PAGE_SIZE: usize = 4096;

/// Handle over an open page file.
#[derive(Debug)]
pub struct PageFile {
    file: File,
    path: PathBuf,
    total_pages: u32,
    cursor: u32,
}

impl PageFile {
    /// Create a new page file containing exactly one zero-filled page.
    ///
    /// An existing file at `path` is truncated.
    pub fn create(path: &Path) -> DbResult<()> {
        let mut file = File::create(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => DbError::FileNotFound(path.to_path_buf()),
            _ => DbError::Io(e),
        })?;
        file.write_all(&[0u8; PAGE_SIZE])?;
        file.flush()?;
        Ok(())
    }

    /// Open an existing page file for reading and writing.
    ///
    /// The total page count is the file length rounded up to whole pages;
    /// the cursor starts at page 0.
    pub fn open(path: &Path) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => DbError::FileNotFound(path.to_path_buf()),
                _ => DbError::Io(e),
            })?;

        let len = file.metadata()?.len();
        let total_pages = len.div_ceil(PAGE_SIZE as u64) as u32;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            total_pages,
            cursor: 0,
        })
    }

    /// Remove the page file from disk.
    pub fn destroy(path: &Path) -> DbResult<()> {
        std::fs::remove_file(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => DbError::FileNotFound(path.to_path_buf()),
            _ => DbError::Io(e),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of pages currently in the file.
    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// The last page read or written.
    pub fn cursor(&self) -> PageId {
        PageId(self.cursor)
    }

    /// Fill `buf` with the contents of page `page`.
    ///
    /// `buf` must be exactly one page long. Fails with
    /// [`DbError::ReadNonExistingPage`] when `page` lies outside the file.
    /// On success the cursor moves to `page`.
    pub fn read_block(&mut self, page: PageId, buf: &mut [u8]) -> DbResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        if page.0 >= self.total_pages {
            return Err(DbError::ReadNonExistingPage(page));
        }

        self.file
            .seek(SeekFrom::Start(u64::from(page.0) * PAGE_SIZE as u64))?;
        read_full(&mut self.file, buf)?;
        self.cursor = page.0;
        Ok(())
    }

    /// Write one page at `page`.
    ///
    /// Writes stay strictly inside the current extent; fails with
    /// [`DbError::WriteFailed`] otherwise. A failed write leaves the handle
    /// unchanged. On success the cursor moves to `page`.
    pub fn write_block(&mut self, page: PageId, buf: &[u8]) -> DbResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        if page.0 >= self.total_pages {
            return Err(DbError::WriteFailed(page));
        }

        self.file
            .seek(SeekFrom::Start(u64::from(page.0) * PAGE_SIZE as u64))?;
        self.file
            .write_all(buf)
            .map_err(|_| DbError::WriteFailed(page))?;
        self.cursor = page.0;
        Ok(())
    }

    /// Append one zero-filled page at the end of the file.
    pub fn append_empty_block(&mut self) -> DbResult<()> {
        self.file
            .seek(SeekFrom::Start(u64::from(self.total_pages) * PAGE_SIZE as u64))?;
        self.file.write_all(&[0u8; PAGE_SIZE])?;
        self.total_pages += 1;
        Ok(())
    }

    /// Append empty pages until the file holds at least `capacity` pages.
    pub fn ensure_capacity(&mut self, capacity: u32) -> DbResult<()> {
        while self.total_pages < capacity {
            self.append_empty_block()?;
        }
        Ok(())
    }

    pub fn read_first_block(&mut self, buf: &mut [u8]) -> DbResult<()> {
        self.read_block(PageId(0), buf)
    }

    pub fn read_previous_block(&mut self, buf: &mut [u8]) -> DbResult<()> {
        let prev = self
            .cursor
            .checked_sub(1)
            .ok_or(DbError::ReadNonExistingPage(PageId(0)))?;
        self.read_block(PageId(prev), buf)
    }

    pub fn read_current_block(&mut self, buf: &mut [u8]) -> DbResult<()> {
        self.read_block(PageId(self.cursor), buf)
    }

    pub fn read_next_block(&mut self, buf: &mut [u8]) -> DbResult<()> {
        self.read_block(PageId(self.cursor + 1), buf)
    }

    pub fn read_last_block(&mut self, buf: &mut [u8]) -> DbResult<()> {
        let last = self
            .total_pages
            .checked_sub(1)
            .ok_or(DbError::ReadNonExistingPage(PageId(0)))?;
        self.read_block(PageId(last), buf)
    }
}

/// Read until `buf` is full, zero-filling past end-of-file.
///
/// A file whose length is not a page multiple still yields a whole page for
/// its last block; `open` rounds the page count up to match.
fn read_full(file: &mut File, buf: &mut [u8]) -> io::Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => {
                buf[filled..].fill(0);
                break;
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
