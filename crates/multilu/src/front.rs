//! Factor blocks, contribution blocks and the blocked factor.
//!
//! A factor block stores one supercolumn's slice of the factorization in
//! three dense pieces sharing two buffers:
//!
//! ```text
//!  +-------+---------------+
//!  |\      |               |
//!  | \ U1  |               |
//!  |  \    |    (Ut2)'     |
//!  |   \   |               |
//!  | L1 \  |               |
//!  |     \ |               |
//!  +-------+---------------+
//!  |       |
//!  |  L2   |
//!  |       |
//!  +-------+
//! ```
//!
//! `lu` holds L1 (unit lower), U1 (upper) and L2 stacked in one column-major
//! buffer; `ut2` holds the non-pivotal part of U transposed. The associated
//! contribution block is the Schur complement left over after eliminating
//! the pivot block; it shrinks as ancestors consume its rows and columns and
//! is dropped once either dimension reaches zero.

use crate::error::Error;
use crate::scalar::{Scalar, ScalarKind};
use num_traits::Zero;

/// Allocate a zero-filled value buffer, reporting failure instead of
/// aborting. The frontal buffers are the only allocations big enough to be
/// worth the ceremony.
pub(crate) fn try_zeroed_vec<T: Scalar>(len: usize) -> Result<Vec<T>, Error> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
    v.resize(len, T::zero());
    Ok(v)
}

/// A pending rectangular update produced by one supercolumn and consumed by
/// its ancestors.
#[derive(Debug)]
pub struct ContribBlock<T> {
    /// Logical row/column counts; both only shrink after creation.
    pub m: usize,
    pub n: usize,
    /// Leading dimension of `values`; fixed at creation.
    pub ld: usize,
    /// Original row/column indices still represented, in no particular
    /// order. Only the first `m`/`n` entries are live.
    pub rows: Vec<usize>,
    pub columns: Vec<usize>,
    /// Map from a logical slot to the physical row/column inside `values`.
    /// Physical slots never move; only the logical lists compact.
    pub row_loc: Vec<usize>,
    pub col_loc: Vec<usize>,
    /// Dense values, column-major.
    pub values: Vec<T>,
    /// How many leading columns match the parent supercolumn's pivot
    /// columns after rearrangement (only-child pipelining).
    pub num_cols_in_parent: usize,
    /// Set while an ancestor assembles its front: whether this block gave it
    /// rows (L) or columns (U). Decides the align-add mode.
    pub l_member: bool,
    pub u_member: bool,
}

impl<T: Scalar> ContribBlock<T> {
    pub fn new(m: usize, n: usize) -> Result<Self, Error> {
        Ok(ContribBlock {
            m,
            n,
            ld: m,
            rows: vec![0; m],
            columns: vec![0; n],
            row_loc: (0..m).collect(),
            col_loc: (0..n).collect(),
            values: try_zeroed_vec(m * n)?,
            num_cols_in_parent: 0,
            l_member: false,
            u_member: false,
        })
    }

    #[inline]
    pub fn value(&self, i_loc: usize, j_loc: usize) -> T {
        self.values[j_loc * self.ld + i_loc]
    }

    /// Remove the logical column at `slot` by swapping the tail in.
    pub fn consume_column(&mut self, slot: usize) {
        self.n -= 1;
        self.columns[slot] = self.columns[self.n];
        self.col_loc[slot] = self.col_loc[self.n];
    }

    /// Remove the logical row at `slot` by swapping the tail in.
    pub fn consume_row(&mut self, slot: usize) {
        self.m -= 1;
        self.rows[slot] = self.rows[self.m];
        self.row_loc[slot] = self.row_loc[self.m];
    }

    pub fn is_empty(&self) -> bool {
        self.m == 0 || self.n == 0
    }
}

/// One supercolumn's slice of the blocked factor.
#[derive(Debug)]
pub struct FactorBlock<T> {
    /// Cleared when an allocation or the pivot search failed; a single
    /// invalid block poisons the whole factor.
    pub valid: bool,

    pub row_pivots_number: usize,
    pub col_pivots_number: usize,
    pub non_pivot_rows_number: usize,
    pub non_pivot_cols_number: usize,

    /// Pivot rows first, then the non-pivot rows of the front.
    pub pivot_rows: Vec<usize>,
    /// Pivot columns first, then the non-pivot columns gathered for U.
    pub pivot_cols: Vec<usize>,

    /// Rows assembled into the front so far (set during focus; equals
    /// `row_pivots_number + non_pivot_rows_number` once factored).
    pub l_size: usize,

    /// L1/U1 plus L2, column-major with leading dimension `l_size`.
    pub lu: Vec<T>,
    /// Non-pivotal U rows transposed: `non_pivot_cols x row_pivots`,
    /// leading dimension `non_pivot_cols_number`.
    pub ut2: Vec<T>,

    /// Pending Schur complement; `None` once fully assembled into
    /// ancestors.
    pub contrib_block: Option<ContribBlock<T>>,
}

impl<T: Scalar> FactorBlock<T> {
    /// The L2 panel: rows `row_pivots_number..l_size` of `lu`.
    pub fn l2(&self) -> &[T] {
        &self.lu[self.row_pivots_number..]
    }

    /// Identities of the non-pivot rows.
    pub fn non_pivot_rows(&self) -> &[usize] {
        &self.pivot_rows[self.row_pivots_number..]
    }

    /// Identities of the non-pivot columns.
    pub fn non_pivot_cols(&self) -> &[usize] {
        &self.pivot_cols[self.col_pivots_number..]
    }
}

/// The factorization result: factor blocks in postorder.
#[derive(Debug)]
pub struct BlockedFactor<T> {
    pub m: usize,
    pub n: usize,
    pub kind: ScalarKind,
    pub blocks: Vec<FactorBlock<T>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contrib_block_consume() {
        let mut cb = ContribBlock::<f64>::new(2, 3).unwrap();
        cb.columns.copy_from_slice(&[10, 20, 30]);
        cb.values[0] = 1.0; // (0, 0)
        cb.values[2] = 2.0; // (0, 1)
        cb.values[4] = 3.0; // (0, 2)

        cb.consume_column(0);
        assert_eq!(cb.n, 2);
        assert_eq!(&cb.columns[..cb.n], &[30, 20]);
        // the swapped-in column still maps to its original physical slot
        assert_eq!(cb.value(0, cb.col_loc[0]), 3.0);
        assert_eq!(cb.value(0, cb.col_loc[1]), 2.0);

        cb.consume_column(1);
        cb.consume_column(0);
        assert!(cb.is_empty());
    }

    #[test]
    fn test_contrib_block_consume_row() {
        let mut cb = ContribBlock::<f64>::new(3, 1).unwrap();
        cb.rows.copy_from_slice(&[5, 6, 7]);
        cb.values.copy_from_slice(&[1.0, 2.0, 3.0]);
        cb.consume_row(1);
        assert_eq!(cb.m, 2);
        assert_eq!(&cb.rows[..cb.m], &[5, 7]);
        assert_eq!(cb.value(cb.row_loc[1], 0), 3.0);
    }
}
