//! Front assembly: focus (gather) and align-add (scatter-accumulate).
//!
//! Focus operations gather a supercolumn's scattered entries, from the
//! original matrix and from descendant contribution blocks, into the dense
//! front. Align-add goes the other way: once a front has produced its own
//! contribution block, the still-live descendant blocks are accumulated into
//! it through the row/column index maps.
//!
//! Consumed rows and columns are removed from a descendant block by
//! swapping the tail entry into the vacated logical slot; the physical
//! layout of its values never changes. A block whose row or column count
//! reaches zero is freed on the spot.

use crate::front::ContribBlock;
use crate::numeric::Context;
use crate::params::ALIGN_ADD_SMALL;
use crate::scalar::Scalar;

/// Location of `x` in `s`, scanning linearly.
#[inline]
pub(crate) fn is_member(x: usize, s: &[usize]) -> Option<usize> {
    s.iter().position(|&y| y == x)
}

// ============================================================================
// Focus: assembling the supercolumn (columns of the front)
// ============================================================================

/// Assemble into `supercol`'s front every contribution the subtree rooted
/// at `child` has for its pivot columns.
pub(crate) fn focus_supercolumn_from_child<T: Scalar>(
    ctx: &Context<'_, T>,
    supercol: usize,
    child: usize,
) {
    if let Some(fd) = ctx.symbolic.etree.first_desc_index[child] {
        for i in fd..child {
            focus_supercolumn_from_contrib(ctx, supercol, i);
        }
    }
    focus_supercolumn_from_contrib(ctx, supercol, child);
    // The row map built here is intentionally left in place: the later
    // align-add of the same supercolumn keys off it.
}

/// Assemble the part of `supercol`'s pivot columns held by the contribution
/// block of supercolumn `contrib`, consuming those columns from it.
pub(crate) fn focus_supercolumn_from_contrib<T: Scalar>(
    ctx: &Context<'_, T>,
    supercol: usize,
    contrib: usize,
) {
    let Some(desc_block) = ctx.blocks.slot(contrib).as_mut() else {
        return;
    };
    if desc_block.contrib_block.is_none() {
        return;
    }

    let block = ctx.blocks.slot(supercol).as_mut().unwrap();
    let max_size = ctx.symbolic.l_size[supercol];
    let s = ctx.symbolic.supercolumn_size[supercol];
    let start = ctx.symbolic.start_supercolumn[supercol];
    let mut size = block.l_size;

    for col_c in 0..s {
        let Some(cb) = desc_block.contrib_block.as_mut() else {
            break;
        };
        let column = ctx.symbolic.columns[start + col_c];
        let Some(loc_arr) = is_member(column, &cb.columns[..cb.n]) else {
            continue;
        };
        let loc_val = cb.col_loc[loc_arr];
        let base = col_c * max_size;

        for j in 0..cb.m {
            let row = cb.rows[j];
            debug_assert!(!ctx.row_cleared.get(row));
            let val = cb.value(cb.row_loc[j], loc_val);
            let loc = ctx.map_rows.get(row);
            if loc != -1 {
                block.lu[base + loc as usize] += val;
            } else {
                block.pivot_rows[size] = row;
                block.lu[base + size] = val;
                ctx.map_rows.set(row, size as i64);
                size += 1;
            }
        }
        debug_assert!(size <= max_size);

        cb.consume_column(loc_arr);
        if cb.n == 0 {
            desc_block.contrib_block = None;
        } else {
            cb.u_member = true;
        }
    }

    block.l_size = size;
}

/// Assemble the original-matrix part of `supercol`'s pivot columns and mark
/// those columns eliminated.
pub(crate) fn focus_supercolumn_from_a<T: Scalar>(ctx: &Context<'_, T>, supercol: usize) {
    let block = ctx.blocks.slot(supercol).as_mut().unwrap();
    let max_size = ctx.symbolic.l_size[supercol];
    let s = ctx.symbolic.supercolumn_size[supercol];
    let mut size = block.l_size;

    for col_c in 0..s {
        let column = block.pivot_cols[col_c];
        debug_assert!(!ctx.column_cleared.get(column));
        let base = col_c * max_size;

        let (rows, vals) = ctx.a.col(column);
        for (&row, &val) in rows.iter().zip(vals) {
            if ctx.row_cleared.get(row) {
                continue;
            }
            let loc = ctx.map_rows.get(row);
            if loc != -1 {
                block.lu[base + loc as usize] += val;
            } else {
                block.pivot_rows[size] = row;
                block.lu[base + size] = val;
                ctx.map_rows.set(row, size as i64);
                size += 1;
            }
        }

        ctx.column_cleared.set(column, true);
        debug_assert!(size <= max_size);
    }

    block.l_size = size;
}

// ============================================================================
// Focus: assembling the pivot rows (columns of U)
// ============================================================================

/// Gather the non-pivotal part of the chosen pivot rows into `Ut2`: the
/// leftovers of the original rows plus every descendant contribution to
/// those rows (consuming the rows from the descendant blocks). Returns the
/// number of distinct non-pivot columns found; `map_cols` maps each to its
/// slot.
pub(crate) fn focus_rows<T: Scalar>(
    ctx: &Context<'_, T>,
    pivot_supercol: usize,
    number: usize,
    map_cols: &mut [i64],
) -> usize {
    let block = ctx.blocks.slot(pivot_supercol).as_mut().unwrap();
    let s = ctx.symbolic.supercolumn_size[pivot_supercol];
    let max_size = ctx.symbolic.u_size[pivot_supercol];
    let mut size = 0usize;

    // original rows, through the transposed copy
    for row_ind in 0..number {
        let row = block.pivot_rows[row_ind];
        debug_assert!(!ctx.row_cleared.get(row));
        let base = row_ind * max_size;

        let (cols, vals) = ctx.at.col(row);
        for (&column, &val) in cols.iter().zip(vals) {
            if ctx.column_cleared.get(column) {
                continue;
            }
            let loc = map_cols[column];
            if loc != -1 {
                block.ut2[base + loc as usize] = val;
            } else {
                block.pivot_cols[s + size] = column;
                block.ut2[base + size] = val;
                map_cols[column] = size as i64;
                size += 1;
            }
        }

        ctx.row_cleared.set(row, true);
        debug_assert!(s + size <= block.pivot_cols.len());
    }

    // descendant contribution blocks; only descendants can still hold these
    // rows, and they were all factored before this supercolumn
    if let Some(fd) = ctx.symbolic.etree.first_desc_index[pivot_supercol] {
        for c in fd..pivot_supercol {
            let Some(desc_block) = ctx.blocks.slot(c).as_mut() else {
                continue;
            };
            if desc_block.contrib_block.is_none() {
                continue;
            }

            let mut freed = false;
            for row_ind in 0..number {
                let Some(cb) = desc_block.contrib_block.as_mut() else {
                    break;
                };
                let row = block.pivot_rows[row_ind];
                let Some(loc_arr) = is_member(row, &cb.rows[..cb.m]) else {
                    continue;
                };
                let loc_val = cb.row_loc[loc_arr];
                let base = row_ind * max_size;

                for i in 0..cb.n {
                    let col = cb.columns[i];
                    debug_assert!(!ctx.column_cleared.get(col));
                    let val = cb.value(loc_val, cb.col_loc[i]);
                    let loc = map_cols[col];
                    if loc != -1 {
                        block.ut2[base + loc as usize] += val;
                    } else {
                        block.pivot_cols[s + size] = col;
                        block.ut2[base + size] = val;
                        map_cols[col] = size as i64;
                        size += 1;
                    }
                }
                debug_assert!(size <= max_size);

                cb.consume_row(loc_arr);
                if cb.m == 0 {
                    freed = true;
                    break;
                }
                cb.l_member = true;
            }
            if freed {
                desc_block.contrib_block = None;
            }
        }
    }

    // the column map stays live for the align-add that follows
    size
}

// ============================================================================
// Align-add
// ============================================================================

/// Write handle on a destination contribution block that can be shared by
/// the recursive halves of a split align-add.
///
/// Safety argument: the split kernels partition the logical index rectangle,
/// and the row/column maps are injective into the destination, so no two
/// tasks ever touch the same cell.
pub(crate) struct AlignDest<T> {
    values: *mut T,
    ld: usize,
    len: usize,
}

unsafe impl<T: Send> Send for AlignDest<T> {}
unsafe impl<T: Send> Sync for AlignDest<T> {}

impl<T: Scalar> AlignDest<T> {
    pub fn new(cb: &mut ContribBlock<T>) -> Self {
        AlignDest {
            values: cb.values.as_mut_ptr(),
            ld: cb.ld,
            len: cb.values.len(),
        }
    }

    /// # Safety
    /// The caller must guarantee `(i, j)` is touched by no other task, per
    /// the partition argument above.
    #[inline]
    unsafe fn accumulate(&self, i: usize, j: usize, v: T) {
        debug_assert!(j * self.ld + i < self.len);
        let p = self.values.add(j * self.ld + i);
        *p = *p + v;
    }
}

/// Accumulate every still-live contribution block in the subtree rooted at
/// `subtree_root` into `dest`. Sequential-mode counterpart of the flat
/// descendant scan.
pub(crate) fn align_add_subtree<T: Scalar>(
    ctx: &Context<'_, T>,
    dest: &AlignDest<T>,
    subtree_root: usize,
    map_cols: &[i64],
) {
    for child in ctx.symbolic.etree.children(subtree_root) {
        align_add_subtree(ctx, dest, child, map_cols);
    }
    let live = ctx
        .blocks
        .slot(subtree_root)
        .as_ref()
        .map_or(false, |b| b.contrib_block.is_some());
    if live {
        align_add_from(ctx, dest, subtree_root, map_cols);
    }
}

/// Accumulate the contribution block of supercolumn `desc` into `dest`,
/// choosing the kernel from its membership flags, then compact or free it.
pub(crate) fn align_add_from<T: Scalar>(
    ctx: &Context<'_, T>,
    dest: &AlignDest<T>,
    desc: usize,
    map_cols: &[i64],
) {
    let Some(desc_block) = ctx.blocks.slot(desc).as_mut() else {
        return;
    };
    let Some(cb) = desc_block.contrib_block.as_mut() else {
        return;
    };

    match (cb.l_member, cb.u_member) {
        (true, true) => {
            // fully contained: every remaining cell lands in the new block
            align_add(ctx, dest, cb, map_cols, 0, cb.m, 0, cb.n);
            cb.n = 0;
        }
        (true, false) => {
            align_add_rows(ctx, dest, cb, map_cols, 0, cb.m, 0, cb.n);
            // take the consumed rows off the block
            let mut i = 0;
            while i < cb.m {
                if ctx.map_rows.get(cb.rows[i]) != -1 {
                    cb.consume_row(i);
                } else {
                    i += 1;
                }
            }
        }
        (false, true) => {
            align_add_cols(ctx, dest, cb, map_cols, 0, cb.m, 0, cb.n);
            let mut i = 0;
            while i < cb.n {
                if map_cols[cb.columns[i]] != -1 {
                    cb.consume_column(i);
                } else {
                    i += 1;
                }
            }
        }
        (false, false) => {}
    }

    if cb.is_empty() {
        desc_block.contrib_block = None;
    } else {
        cb.l_member = false;
        cb.u_member = false;
    }
}

/// Full align-add: `from` is contained in the destination on both axes.
pub(crate) fn align_add<T: Scalar>(
    ctx: &Context<'_, T>,
    dest: &AlignDest<T>,
    from: &ContribBlock<T>,
    map_cols: &[i64],
    m0: usize,
    m1: usize,
    n0: usize,
    n1: usize,
) {
    if ctx.nproc > 1 {
        if n1 - n0 > ALIGN_ADD_SMALL {
            let nh = (n0 + n1) / 2;
            rayon::join(
                || align_add(ctx, dest, from, map_cols, m0, m1, n0, nh),
                || align_add(ctx, dest, from, map_cols, m0, m1, nh, n1),
            );
            return;
        }
        if m1 - m0 > ALIGN_ADD_SMALL {
            let mh = (m0 + m1) / 2;
            rayon::join(
                || align_add(ctx, dest, from, map_cols, m0, mh, n0, n1),
                || align_add(ctx, dest, from, map_cols, mh, m1, n0, n1),
            );
            return;
        }
    }

    for j in n0..n1 {
        let j_to = map_cols[from.columns[j]];
        debug_assert!(j_to != -1);
        let j_loc = from.col_loc[j];
        for i in m0..m1 {
            let i_to = ctx.map_rows.get(from.rows[i]);
            debug_assert!(i_to != -1);
            // SAFETY: (i, j) is unique to this task's sub-rectangle and the
            // maps are injective.
            unsafe {
                dest.accumulate(
                    i_to as usize,
                    j_to as usize,
                    from.value(from.row_loc[i], j_loc),
                )
            };
        }
    }
}

/// Row-restricted align-add: only rows present in the destination (mapped
/// by `map_rows`) are accumulated; the columns are assumed contained.
pub(crate) fn align_add_rows<T: Scalar>(
    ctx: &Context<'_, T>,
    dest: &AlignDest<T>,
    from: &ContribBlock<T>,
    map_cols: &[i64],
    m0: usize,
    m1: usize,
    n0: usize,
    n1: usize,
) {
    if ctx.nproc > 1 {
        if n1 - n0 > ALIGN_ADD_SMALL {
            let nh = (n0 + n1) / 2;
            rayon::join(
                || align_add_rows(ctx, dest, from, map_cols, m0, m1, n0, nh),
                || align_add_rows(ctx, dest, from, map_cols, m0, m1, nh, n1),
            );
            return;
        }
        if m1 - m0 > ALIGN_ADD_SMALL {
            let mh = (m0 + m1) / 2;
            rayon::join(
                || align_add_rows(ctx, dest, from, map_cols, m0, mh, n0, n1),
                || align_add_rows(ctx, dest, from, map_cols, mh, m1, n0, n1),
            );
            return;
        }
    }

    for i in m0..m1 {
        let i_to = ctx.map_rows.get(from.rows[i]);
        if i_to == -1 {
            continue;
        }
        let i_loc = from.row_loc[i];
        for j in n0..n1 {
            let j_to = map_cols[from.columns[j]];
            debug_assert!(j_to != -1);
            // SAFETY: see align_add
            unsafe {
                dest.accumulate(
                    i_to as usize,
                    j_to as usize,
                    from.value(i_loc, from.col_loc[j]),
                )
            };
        }
    }
}

/// Column-restricted align-add: only columns present in the destination
/// (mapped by `map_cols`) are accumulated; the rows are assumed contained.
pub(crate) fn align_add_cols<T: Scalar>(
    ctx: &Context<'_, T>,
    dest: &AlignDest<T>,
    from: &ContribBlock<T>,
    map_cols: &[i64],
    m0: usize,
    m1: usize,
    n0: usize,
    n1: usize,
) {
    if ctx.nproc > 1 {
        if n1 - n0 > ALIGN_ADD_SMALL {
            let nh = (n0 + n1) / 2;
            rayon::join(
                || align_add_cols(ctx, dest, from, map_cols, m0, m1, n0, nh),
                || align_add_cols(ctx, dest, from, map_cols, m0, m1, nh, n1),
            );
            return;
        }
        if m1 - m0 > ALIGN_ADD_SMALL {
            let mh = (m0 + m1) / 2;
            rayon::join(
                || align_add_cols(ctx, dest, from, map_cols, m0, mh, n0, n1),
                || align_add_cols(ctx, dest, from, map_cols, mh, m1, n0, n1),
            );
            return;
        }
    }

    for j in n0..n1 {
        let j_to = map_cols[from.columns[j]];
        if j_to == -1 {
            continue;
        }
        let j_loc = from.col_loc[j];
        for i in m0..m1 {
            let i_to = ctx.map_rows.get(from.rows[i]);
            debug_assert!(i_to != -1);
            // SAFETY: see align_add
            unsafe {
                dest.accumulate(
                    i_to as usize,
                    j_to as usize,
                    from.value(from.row_loc[i], j_loc),
                )
            };
        }
    }
}
