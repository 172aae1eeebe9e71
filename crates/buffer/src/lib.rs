//! Buffer pool manager for page-level caching and I/O.
//!
//! The pool sits between the paged file and the record layer, providing:
//! - a fixed array of frames, each caching one page
//! - pin counts and dirty bits with write-back on eviction
//! - victim selection under FIFO, LRU, LFU, or CLOCK replacement
//!
//! # Example
//!
//! ```no_run
//! use buffer::BufferPool;
//! use common::{PageId, ReplacementPolicy};
//! use std::path::Path;
//!
//! let mut pool = BufferPool::open(Path::new("/tmp/table.pf"), 16, ReplacementPolicy::Lru).unwrap();
//!
//! // Pin, modify, unpin.
//! {
//!     let mut guard = pool.pin_guard(PageId(1)).unwrap();
//!     guard.data_mut()[0] = 42;
//!     guard.mark_dirty();
//! }
//!
//! pool.force_flush().unwrap();
//! ```

#[cfg(test)]
mod tests;

use ahash::RandomState;
use common::{DbError, DbResult, PageId, ReplacementPolicy};
use hashbrown::HashMap;
use log::{debug, warn};
use std::path::Path;
use storage::{PAGE_SIZE, PageFile};

type Map<K, V> = HashMap<K, V, RandomState>;

/// One slot of the pool, caching a single page.
///
/// The policy accounting fields are only meaningful under the policy the
/// pool was opened with.
#[derive(Debug)]
struct Frame {
    page: Option<PageId>,
    data: Vec<u8>,
    dirty: bool,
    pin_count: u32,
    /// Monotonic load index; FIFO evicts the smallest.
    loaded_seq: u64,
    /// Recency stamp; LRU evicts the smallest.
    recency: u64,
    /// Pin-hit counter; LFU evicts the smallest.
    refs: u64,
    /// Second-chance bit for CLOCK.
    referenced: bool,
}

impl Frame {
    fn empty() -> Self {
        Self {
            page: None,
            data: vec![0u8; PAGE_SIZE],
            dirty: false,
            pin_count: 0,
            loaded_seq: 0,
            recency: 0,
            refs: 0,
            referenced: false,
        }
    }
}

/// Small value handle naming a pinned page and the frame that holds it.
///
/// Handles do not borrow the pool; they stay valid for as long as the page
/// remains pinned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRef {
    pub page: PageId,
    pub frame: usize,
}

/// Fixed-size page cache over a single page file.
#[derive(Debug)]
pub struct BufferPool {
    file: PageFile,
    frames: Vec<Frame>,
    page_table: Map<PageId, usize>,
    policy: ReplacementPolicy,
    /// FIFO insertion cursor: one tick per page load.
    load_counter: u64,
    /// LRU recency clock: one tick per load or pin hit.
    recency_counter: u64,
    clock_hand: usize,
    lfu_hand: usize,
    read_io: u64,
    write_io: u64,
}

impl BufferPool {
    /// Open a pool of `num_frames` frames over the page file at `path`.
    ///
    /// The file must already exist. The policy is fixed for the lifetime of
    /// the pool.
    ///
    /// # Panics
    ///
    /// Panics if `num_frames` is 0.
    pub fn open(path: &Path, num_frames: usize, policy: ReplacementPolicy) -> DbResult<Self> {
        assert!(num_frames > 0, "num_frames must be > 0");
        let file = PageFile::open(path)?;
        Ok(Self {
            file,
            frames: (0..num_frames).map(|_| Frame::empty()).collect(),
            page_table: Map::default(),
            policy,
            load_counter: 0,
            recency_counter: 0,
            clock_hand: 0,
            lfu_hand: 0,
            read_io: 0,
            write_io: 0,
        })
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn policy(&self) -> ReplacementPolicy {
        self.policy
    }

    /// Number of pages currently in the underlying file.
    pub fn pages_on_disk(&self) -> u32 {
        self.file.total_pages()
    }

    /// Pin `page` into a frame, loading it from disk on a miss.
    ///
    /// A hit only bumps the pin count and the policy accounting; it never
    /// touches the disk. A miss selects a victim among unpinned frames,
    /// writes it back if dirty, and reads the requested page in, extending
    /// the file with zero pages first when `page` lies past its extent.
    ///
    /// Fails with [`DbError::NoAvailableFrame`] when every frame is pinned;
    /// the pool is left unchanged.
    pub fn pin(&mut self, page: PageId) -> DbResult<FrameRef> {
        if let Some(&idx) = self.page_table.get(&page) {
            self.frames[idx].pin_count += 1;
            self.touch_on_hit(idx);
            return Ok(FrameRef { page, frame: idx });
        }

        let idx = self.select_victim()?;

        // Write back a dirty victim before it is replaced. If the write
        // fails the frame keeps its old page and its dirty bit.
        if self.frames[idx].dirty {
            let old = self.frames[idx].page.expect("dirty frame holds a page");
            debug!("evicting dirty page {old}, writing back");
            self.file.write_block(old, &self.frames[idx].data)?;
            self.write_io += 1;
            self.frames[idx].dirty = false;
        }

        if page.0 >= self.file.total_pages() {
            self.file.ensure_capacity(page.0 + 1)?;
        }

        // Read into a scratch buffer so a failed read leaves the victim
        // frame as it was, per the pin rollback contract.
        let mut data = vec![0u8; PAGE_SIZE];
        self.file.read_block(page, &mut data)?;
        self.read_io += 1;

        if let Some(old) = self.frames[idx].page.take() {
            self.page_table.remove(&old);
        }
        let frame = &mut self.frames[idx];
        frame.page = Some(page);
        frame.data = data;
        frame.dirty = false;
        frame.pin_count = 1;
        self.touch_on_load(idx);
        self.page_table.insert(page, idx);

        Ok(FrameRef { page, frame: idx })
    }

    /// Pin `page` and return a guard that unpins on drop.
    pub fn pin_guard(&mut self, page: PageId) -> DbResult<PinGuard<'_>> {
        let handle = self.pin(page)?;
        Ok(PinGuard {
            frame: handle.frame,
            page,
            pool: self,
        })
    }

    /// Decrement the pin count of the frame holding `page`.
    ///
    /// A pin count of zero stays at zero. Fails with
    /// [`DbError::ReadNonExistingPage`] when the page is not cached.
    pub fn unpin(&mut self, page: PageId) -> DbResult<()> {
        let idx = self.cached(page)?;
        let frame = &mut self.frames[idx];
        if frame.pin_count > 0 {
            frame.pin_count -= 1;
        }
        Ok(())
    }

    /// Set the dirty bit of the frame holding `page`.
    pub fn mark_dirty(&mut self, page: PageId) -> DbResult<()> {
        let idx = self.cached(page)?;
        self.frames[idx].dirty = true;
        Ok(())
    }

    /// Write the frame holding `page` to disk and clear its dirty bit.
    ///
    /// The pin count is not affected.
    pub fn force_page(&mut self, page: PageId) -> DbResult<()> {
        let idx = self.cached(page)?;
        self.file.write_block(page, &self.frames[idx].data)?;
        self.write_io += 1;
        self.frames[idx].dirty = false;
        Ok(())
    }

    /// Write back every dirty, unpinned frame and clear its dirty bit.
    pub fn force_flush(&mut self) -> DbResult<()> {
        for idx in 0..self.frames.len() {
            let frame = &self.frames[idx];
            if frame.pin_count == 0
                && frame.dirty
                && let Some(page) = frame.page
            {
                self.file.write_block(page, &self.frames[idx].data)?;
                self.write_io += 1;
                self.frames[idx].dirty = false;
            }
        }
        Ok(())
    }

    /// Flush all dirty frames and release them.
    ///
    /// Fails with [`DbError::PinnedPages`] while any frame is pinned; the
    /// pool is left untouched and stays usable. Flush errors are logged,
    /// the remaining frames are still attempted, and the first error is
    /// returned.
    pub fn shutdown(&mut self) -> DbResult<()> {
        let pinned = self.frames.iter().filter(|f| f.pin_count > 0).count();
        if pinned > 0 {
            return Err(DbError::PinnedPages(pinned));
        }

        let mut first_err = None;
        for idx in 0..self.frames.len() {
            if self.frames[idx].dirty
                && let Some(page) = self.frames[idx].page
            {
                match self.file.write_block(page, &self.frames[idx].data) {
                    Ok(()) => {
                        self.write_io += 1;
                        self.frames[idx].dirty = false;
                    }
                    Err(e) => {
                        warn!("flush of page {page} failed during shutdown: {e}");
                        first_err.get_or_insert(e);
                    }
                }
            }
        }

        self.page_table.clear();
        for frame in &mut self.frames {
            *frame = Frame::empty();
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Page held by each frame, in frame order.
    pub fn frame_contents(&self) -> Vec<Option<PageId>> {
        self.frames.iter().map(|f| f.page).collect()
    }

    /// Dirty bit of each frame, in frame order.
    pub fn dirty_flags(&self) -> Vec<bool> {
        self.frames.iter().map(|f| f.dirty).collect()
    }

    /// Pin count of each frame, in frame order.
    pub fn fix_counts(&self) -> Vec<u32> {
        self.frames.iter().map(|f| f.pin_count).collect()
    }

    /// Disk-to-frame transfers since the pool was opened.
    pub fn num_read_io(&self) -> u64 {
        self.read_io
    }

    /// Frame-to-disk transfers since the pool was opened.
    pub fn num_write_io(&self) -> u64 {
        self.write_io
    }

    fn cached(&self, page: PageId) -> DbResult<usize> {
        self.page_table
            .get(&page)
            .copied()
            .ok_or(DbError::ReadNonExistingPage(page))
    }

    fn touch_on_hit(&mut self, idx: usize) {
        match self.policy {
            ReplacementPolicy::Fifo => {}
            ReplacementPolicy::Lru => {
                self.recency_counter += 1;
                self.frames[idx].recency = self.recency_counter;
            }
            ReplacementPolicy::Lfu => self.frames[idx].refs += 1,
            ReplacementPolicy::Clock => self.frames[idx].referenced = true,
        }
    }

    fn touch_on_load(&mut self, idx: usize) {
        self.load_counter += 1;
        self.frames[idx].loaded_seq = self.load_counter;
        match self.policy {
            ReplacementPolicy::Fifo => {}
            ReplacementPolicy::Lru => {
                self.recency_counter += 1;
                self.frames[idx].recency = self.recency_counter;
            }
            ReplacementPolicy::Lfu => self.frames[idx].refs = 0,
            // A fresh page earns its second chance by being re-referenced.
            ReplacementPolicy::Clock => self.frames[idx].referenced = false,
        }
    }

    /// Choose the frame the next load goes into.
    ///
    /// Empty frames fill first, lowest index first; the policy only picks
    /// among occupied, unpinned frames.
    fn select_victim(&mut self) -> DbResult<usize> {
        if let Some(idx) = self.frames.iter().position(|f| f.page.is_none()) {
            return Ok(idx);
        }

        let victim = match self.policy {
            ReplacementPolicy::Fifo => self.scan_victim(|f| f.loaded_seq)?,
            ReplacementPolicy::Lru => self.scan_victim(|f| f.recency)?,
            ReplacementPolicy::Lfu => self.lfu_victim()?,
            ReplacementPolicy::Clock => self.clock_victim()?,
        };
        debug!(
            "victim frame {victim} (page {:?}) under {:?}",
            self.frames[victim].page, self.policy
        );
        Ok(victim)
    }

    /// FIFO and LRU: the unpinned frame with the smallest key, ties going
    /// to the lower frame index.
    fn scan_victim(&self, key: impl Fn(&Frame) -> u64) -> DbResult<usize> {
        self.frames
            .iter()
            .enumerate()
            .filter(|(_, f)| f.pin_count == 0)
            .min_by_key(|(idx, f)| (key(f), *idx))
            .map(|(idx, _)| idx)
            .ok_or(DbError::NoAvailableFrame)
    }

    /// LFU: from the hand, find the first unpinned frame, then keep the
    /// smallest reference count over the remaining frames (ties keep the
    /// earliest one encountered). The hand ends one past the victim.
    fn lfu_victim(&mut self) -> DbResult<usize> {
        let n = self.frames.len();

        let mut start = None;
        for offset in 0..n {
            let idx = (self.lfu_hand + offset) % n;
            if self.frames[idx].pin_count == 0 {
                start = Some(idx);
                break;
            }
        }
        let start = start.ok_or(DbError::NoAvailableFrame)?;

        let mut victim = start;
        let mut least = self.frames[start].refs;
        let mut idx = (start + 1) % n;
        for _ in 1..n {
            let frame = &self.frames[idx];
            if frame.pin_count == 0 && frame.refs < least {
                victim = idx;
                least = frame.refs;
            }
            idx = (idx + 1) % n;
        }

        self.lfu_hand = (victim + 1) % n;
        Ok(victim)
    }

    /// CLOCK: advance the hand over unpinned frames, clearing set reference
    /// bits, until one is found clear. The hand ends one past the victim.
    fn clock_victim(&mut self) -> DbResult<usize> {
        if self.frames.iter().all(|f| f.pin_count > 0) {
            return Err(DbError::NoAvailableFrame);
        }

        let n = self.frames.len();
        loop {
            let idx = self.clock_hand;
            self.clock_hand = (self.clock_hand + 1) % n;
            let frame = &mut self.frames[idx];
            if frame.pin_count == 0 {
                if !frame.referenced {
                    return Ok(idx);
                }
                frame.referenced = false;
            }
        }
    }
}

/// Scoped pin over one page: exposes the frame bytes and unpins on drop,
/// so every pin is paired with exactly one unpin on all exit paths.
#[derive(Debug)]
pub struct PinGuard<'a> {
    pool: &'a mut BufferPool,
    frame: usize,
    page: PageId,
}

impl PinGuard<'_> {
    pub fn page(&self) -> PageId {
        self.page
    }

    pub fn data(&self) -> &[u8] {
        &self.pool.frames[self.frame].data
    }

    /// Mutable access to the frame bytes. Callers that write must also
    /// call [`PinGuard::mark_dirty`].
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.pool.frames[self.frame].data
    }

    pub fn mark_dirty(&mut self) {
        self.pool.frames[self.frame].dirty = true;
    }
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        let frame = &mut self.pool.frames[self.frame];
        if frame.pin_count > 0 {
            frame.pin_count -= 1;
        }
    }
}
