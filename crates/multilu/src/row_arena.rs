//! Packed storage for superrows with a compacting collector.
//!
//! During the symbolic elimination every live row owns a "superrow": the
//! union of the column indices of all rows merged into it so far. Superrows
//! are laid out back to back in a single workspace. Each new superrow is
//! built at the watermark; merged-away rows are marked cleared and their
//! storage is reclaimed by sliding the live superrows leftward when the tail
//! runs out.
//!
//! Invariants:
//! - live superrows never overlap;
//! - `cleared[r]` is true iff row `r` owns no live superrow;
//! - after a collection the watermark equals the sum of the live sizes.

use crate::error::Error;

#[derive(Debug)]
pub struct RowArena {
    slots: Vec<usize>,
    start: Vec<usize>,
    size: Vec<usize>,
    cleared: Vec<bool>,
    next: usize,
    build_start: usize,
    build_len: usize,
}

impl RowArena {
    /// Seed the arena with the row-oriented pattern of an `m x n` CCS
    /// matrix: row `r` starts out owning the list of columns that contain
    /// it. `extra` slots are reserved past the pattern for new superrows.
    pub fn from_pattern(
        m: usize,
        colptr: &[usize],
        rowind: &[usize],
        extra: usize,
    ) -> Result<Self, Error> {
        let n = colptr.len() - 1;
        let nnz = colptr[n];
        let capacity = nnz + extra;
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| Error::OutOfMemory)?;
        slots.resize(capacity, 0);

        let mut size = vec![0usize; m];
        for &r in &rowind[..nnz] {
            size[r] += 1;
        }
        let mut start = vec![0usize; m];
        for r in 1..m {
            start[r] = start[r - 1] + size[r - 1];
        }
        let mut cursor = start.clone();
        for j in 0..n {
            for idx in colptr[j]..colptr[j + 1] {
                let r = rowind[idx];
                slots[cursor[r]] = j;
                cursor[r] += 1;
            }
        }
        Ok(RowArena {
            slots,
            start,
            size,
            cleared: vec![false; m],
            next: nnz,
            build_start: 0,
            build_len: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Run the collector if fewer than `upcoming` slots remain past the
    /// watermark.
    pub fn ensure(&mut self, upcoming: usize) {
        if self.next + upcoming > self.slots.len() {
            self.next = self.collect();
        }
    }

    /// Start building a new superrow at the watermark.
    pub fn open(&mut self) {
        self.build_start = self.next;
        self.build_len = 0;
    }

    /// Append a single column index to the superrow under construction.
    pub fn push(&mut self, col: usize) {
        self.slots[self.build_start + self.build_len] = col;
        self.build_len += 1;
    }

    /// Append the live superrow of `src` to the superrow under
    /// construction, skipping cleared columns and columns already present
    /// (tracked through the `col_mmb` bitmap, which is updated here). `src`
    /// is not cleared; callers decide its fate.
    pub fn merge_row_into_build(
        &mut self,
        src: usize,
        col_cleared: &[bool],
        col_mmb: &mut [bool],
    ) {
        debug_assert!(!self.cleared[src]);
        let s = self.start[src];
        for k in 0..self.size[src] {
            let col = self.slots[s + k];
            if !col_cleared[col] && !col_mmb[col] {
                col_mmb[col] = true;
                self.slots[self.build_start + self.build_len] = col;
                self.build_len += 1;
            }
        }
    }

    /// Finish the superrow under construction and hand it to row `owner`.
    /// Returns its size.
    pub fn commit(&mut self, owner: usize) -> usize {
        self.start[owner] = self.build_start;
        self.size[owner] = self.build_len;
        self.cleared[owner] = false;
        self.next = self.build_start + self.build_len;
        self.build_len
    }

    /// Column list of the live superrow owned by `r`.
    pub fn row(&self, r: usize) -> &[usize] {
        debug_assert!(!self.cleared[r]);
        &self.slots[self.start[r]..self.start[r] + self.size[r]]
    }

    pub fn is_cleared(&self, r: usize) -> bool {
        self.cleared[r]
    }

    /// Mark the superrow of `r` as dead; its storage is reclaimed by the
    /// next collection.
    pub fn clear_row(&mut self, r: usize) {
        self.cleared[r] = true;
    }

    /// Compact live superrows to the front of the workspace and return the
    /// new watermark.
    fn collect(&mut self) -> usize {
        let mut live: Vec<(usize, usize)> = (0..self.start.len())
            .filter(|&r| !self.cleared[r])
            .map(|r| (self.start[r], r))
            .collect();
        live.sort_unstable();

        let mut loc = 0;
        for &(s, r) in &live {
            let len = self.size[r];
            self.slots.copy_within(s..s + len, loc);
            self.start[r] = loc;
            loc += len;
        }
        loc
    }
}
