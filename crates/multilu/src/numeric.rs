//! Numeric multifrontal factorization.
//!
//! The driver walks the supercolumn elimination tree leaves-first. For each
//! supercolumn it assembles the front (focus), factors the L portion with
//! threshold partial pivoting, gathers and solves the U portion, and builds
//! the contribution block that carries the Schur complement to the
//! ancestors.
//!
//! # Scheduling
//!
//! With `nproc == 1` the supercolumns are processed in a strict postorder
//! loop with no synchronization. With `nproc > 1` the elimination tree is
//! traversed by fork-join task recursion: the children of a node are
//! spawned, joined at the parent, and the parent's front is then assembled
//! and factored; `max_depth` cuts the recursion over to a sequential
//! subtree sweep. The dense L factorization and the completion of an only
//! child's deferred rank-k update run as sibling tasks of the same join.
//!
//! # Shared state
//!
//! Sibling tasks share the factor block table, the row elimination flags
//! and the `map_rows` slot map without locks. This is sound because
//! concurrently factored supercolumns own disjoint row sets (they can never
//! share a pivot) and a task touches only its own supercolumn's slot plus,
//! after its children have joined, the slots of its descendants. The
//! `map_cols` buffers come from a mutex-guarded pool and must be fully
//! reset to the sentinel before release.

use std::cell::UnsafeCell;
use std::sync::Mutex;

use crate::assembly::{
    align_add_from, align_add_subtree, focus_rows, focus_supercolumn_from_a,
    focus_supercolumn_from_child, AlignDest,
};
use crate::csc::CcsMatrix;
use crate::dense;
use crate::error::Error;
use crate::front::{try_zeroed_vec, BlockedFactor, ContribBlock, FactorBlock};
use crate::params::MIN_COVER_SPRS_SPAWN;
use crate::scalar::Scalar;
use crate::symbolic::Symbolic;

// ============================================================================
// Shared cells
// ============================================================================

/// Boolean flags shared across tree tasks without locking.
///
/// Safety argument: a flag is written only by the task eliminating the row
/// or column it belongs to, and concurrently running supercolumns touch
/// disjoint rows and columns.
pub(crate) struct SharedFlags(Box<[UnsafeCell<bool>]>);

unsafe impl Send for SharedFlags {}
unsafe impl Sync for SharedFlags {}

impl SharedFlags {
    fn new(n: usize) -> Self {
        SharedFlags(
            (0..n)
                .map(|_| UnsafeCell::new(false))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        )
    }

    #[inline]
    pub fn get(&self, i: usize) -> bool {
        unsafe { *self.0[i].get() }
    }

    #[inline]
    pub fn set(&self, i: usize, v: bool) {
        unsafe { *self.0[i].get() = v }
    }
}

/// The `map_rows` slot map: original row index to position inside the
/// front being assembled, `-1` when absent. Shared across tasks under the
/// same disjoint-rows argument as [`SharedFlags`].
pub(crate) struct SharedSlots(Box<[UnsafeCell<i64>]>);

unsafe impl Send for SharedSlots {}
unsafe impl Sync for SharedSlots {}

impl SharedSlots {
    fn new(n: usize) -> Self {
        SharedSlots(
            (0..n)
                .map(|_| UnsafeCell::new(-1))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        )
    }

    #[inline]
    pub fn get(&self, i: usize) -> i64 {
        unsafe { *self.0[i].get() }
    }

    #[inline]
    pub fn set(&self, i: usize, v: i64) {
        unsafe { *self.0[i].get() = v }
    }
}

/// Per-supercolumn factor block table shared across tree tasks.
///
/// Tasks obey the elimination tree schedule: slot `i` is written by the
/// task factoring supercolumn `i`, and read or consumed by an ancestor only
/// after that task has joined, so two live references to one slot never
/// exist.
pub(crate) struct BlockCells<T>(Box<[UnsafeCell<Option<FactorBlock<T>>>]>);

unsafe impl<T: Send> Send for BlockCells<T> {}
unsafe impl<T: Send> Sync for BlockCells<T> {}

impl<T> BlockCells<T> {
    fn new(n: usize) -> Self {
        BlockCells(
            (0..n)
                .map(|_| UnsafeCell::new(None))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        )
    }

    /// Exclusive access to slot `i`, per the schedule above.
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub fn slot(&self, i: usize) -> &mut Option<FactorBlock<T>> {
        unsafe { &mut *self.0[i].get() }
    }

    fn into_inner(self) -> Vec<Option<FactorBlock<T>>> {
        self.0
            .into_vec()
            .into_iter()
            .map(UnsafeCell::into_inner)
            .collect()
    }
}

/// Free list of `map_cols` buffers. Every buffer handed out is fully set to
/// the sentinel `-1`; callers must restore that before releasing it.
pub(crate) struct MapColsPool {
    n: usize,
    free: Mutex<Vec<Vec<i64>>>,
}

impl MapColsPool {
    fn new(n: usize) -> Self {
        MapColsPool {
            n,
            free: Mutex::new(Vec::new()),
        }
    }

    pub fn acquire(&self) -> Vec<i64> {
        let popped = self.free.lock().unwrap().pop();
        popped.unwrap_or_else(|| vec![-1; self.n])
    }

    pub fn release(&self, map: Vec<i64>) {
        debug_assert!(map.iter().all(|&v| v == -1), "map_cols released dirty");
        self.free.lock().unwrap().push(map);
    }
}

// ============================================================================
// Factorization context
// ============================================================================

/// Everything the numeric sub-functions need, bundled so tasks can share
/// one immutable reference.
pub(crate) struct Context<'a, T: Scalar> {
    pub a: &'a CcsMatrix<T>,
    /// Private transposed copy for row-oriented access.
    pub at: CcsMatrix<T>,
    pub symbolic: &'a Symbolic,
    pub thresh: f64,
    pub nproc: usize,
    pub row_cleared: SharedFlags,
    pub column_cleared: SharedFlags,
    pub map_rows: SharedSlots,
    pub map_cols_pool: MapColsPool,
    pub blocks: BlockCells<T>,
    failure: Mutex<Option<Error>>,
}

impl<'a, T: Scalar> Context<'a, T> {
    fn new(a: &'a CcsMatrix<T>, symbolic: &'a Symbolic, thresh: f64, nproc: usize) -> Self {
        Context {
            a,
            at: a.transpose(),
            symbolic,
            thresh,
            nproc,
            row_cleared: SharedFlags::new(a.nrows()),
            column_cleared: SharedFlags::new(a.ncols()),
            map_rows: SharedSlots::new(a.nrows()),
            map_cols_pool: MapColsPool::new(a.ncols()),
            blocks: BlockCells::new(symbolic.number_supercolumns),
            failure: Mutex::new(None),
        }
    }

    /// Record the first failure; later ones are dropped.
    pub fn record_failure(&self, err: Error) {
        let mut f = self.failure.lock().unwrap();
        if f.is_none() {
            *f = Some(err);
        }
    }
}

fn block_is_valid<T: Scalar>(ctx: &Context<'_, T>, sc: usize) -> bool {
    ctx.blocks.slot(sc).as_ref().map_or(false, |b| b.valid)
}

// ============================================================================
// Entry point
// ============================================================================

/// Factor `a` using the supercolumn structure in `symbolic`.
///
/// `thresh` in `(0, 1]` is the pivoting threshold; `max_depth == 0` means
/// no recursion cutoff; `nproc == 1` selects the sequential driver and
/// anything larger the task-parallel one.
pub fn numeric_factor<T: Scalar>(
    a: &CcsMatrix<T>,
    symbolic: &Symbolic,
    thresh: f64,
    max_depth: usize,
    nproc: usize,
) -> Result<BlockedFactor<T>, Error> {
    if !a.is_square() {
        return Err(Error::malformed(format!(
            "matrix is {}x{}, the factorization needs a square input",
            a.nrows(),
            a.ncols()
        )));
    }
    if symbolic.n != a.ncols() {
        return Err(Error::malformed(format!(
            "symbolic data is for {} columns, matrix has {}",
            symbolic.n,
            a.ncols()
        )));
    }
    if !(thresh > 0.0 && thresh <= 1.0) {
        return Err(Error::malformed(format!(
            "pivot threshold {} is outside (0, 1]",
            thresh
        )));
    }

    let ctx = Context::new(a, symbolic, thresh, nproc);
    let s = symbolic.number_supercolumns;

    if nproc <= 1 {
        for i in 0..s {
            // a supercolumn with an empty front bound cannot be factored
            if symbolic.l_size[i] == 0 {
                continue;
            }
            allocate_factor_block(&ctx, i);
            if !block_is_valid(&ctx, i) {
                continue;
            }
            for child in symbolic.etree.children(i) {
                focus_supercolumn_from_child(&ctx, i, child);
            }
            focus_supercolumn_from_a(&ctx, i);

            let mut map_cols = ctx.map_cols_pool.acquire();
            factorize_supercolumn(&ctx, i, &mut map_cols);
            ctx.map_cols_pool.release(map_cols);
        }
    } else {
        let roots: Vec<usize> = symbolic.etree.roots().collect();
        let ctx_ref = &ctx;
        rayon::scope(|scope| {
            for &root in &roots {
                scope.spawn(move |_| factor_subtree(ctx_ref, root, 0, max_depth));
            }
        });
    }

    let Context {
        blocks, failure, ..
    } = ctx;
    if let Some(err) = failure.into_inner().unwrap() {
        return Err(err);
    }

    // validity sweep: a single missing or invalid block poisons the factor
    let mut out = Vec::with_capacity(s);
    for slot in blocks.into_inner() {
        match slot {
            Some(b) if b.valid => {
                debug_assert!(b.contrib_block.is_none());
                out.push(b);
            }
            _ => return Err(Error::NumericFailure),
        }
    }

    Ok(BlockedFactor {
        m: a.nrows(),
        n: a.ncols(),
        kind: a.kind(),
        blocks: out,
    })
}

// ============================================================================
// Tree recursion
// ============================================================================

/// Factor the subtree rooted at `sc`: children first (as tasks), then the
/// supercolumn itself. Past `max_depth`, or under the covered-columns
/// spawn heuristic, the whole subtree is swept sequentially instead.
fn factor_subtree<T: Scalar>(ctx: &Context<'_, T>, sc: usize, depth: usize, max_depth: usize) {
    let sym = ctx.symbolic;
    let etree = &sym.etree;
    let no_child_spawn =
        MIN_COVER_SPRS_SPAWN.map_or(false, |min| sym.supercolumn_covered_columns[sc] < min);

    if (max_depth == 0 || depth + 1 < max_depth) && !no_child_spawn {
        rayon::scope(|scope| {
            for child in etree.children(sc) {
                scope.spawn(move |_| factor_subtree(ctx, child, depth + 1, max_depth));
            }
        });

        if sym.l_size[sc] == 0 {
            return;
        }
        let one_child = etree.has_one_child(sc);
        if !one_child {
            // with one child the allocation and focus are deferred into the
            // L-portion task to pipeline with the child's rank-k remainder
            allocate_factor_block(ctx, sc);
            if !block_is_valid(ctx, sc) {
                return;
            }
            for child in etree.children(sc) {
                focus_supercolumn_from_child(ctx, sc, child);
            }
            focus_supercolumn_from_a(ctx, sc);
        }

        let mut map_cols = ctx.map_cols_pool.acquire();
        factorize_supercolumn(ctx, sc, &mut map_cols);
        ctx.map_cols_pool.release(map_cols);
    } else {
        // sequential sweep of all descendants in postorder, then this node
        let mut map_cols = ctx.map_cols_pool.acquire();
        if let Some(fd) = etree.first_desc_index[sc] {
            for desc in fd..sc {
                if sym.l_size[desc] == 0 {
                    continue;
                }
                let one_child = etree.has_one_child(desc);
                if !one_child {
                    allocate_factor_block(ctx, desc);
                    if !block_is_valid(ctx, desc) {
                        continue;
                    }
                    for child in etree.children(desc) {
                        focus_supercolumn_from_child(ctx, desc, child);
                    }
                    focus_supercolumn_from_a(ctx, desc);
                }
                factorize_supercolumn(ctx, desc, &mut map_cols);
            }
        }

        if sym.l_size[sc] == 0 {
            ctx.map_cols_pool.release(map_cols);
            return;
        }
        let one_child = etree.has_one_child(sc);
        if !one_child {
            allocate_factor_block(ctx, sc);
            if block_is_valid(ctx, sc) {
                for child in etree.children(sc) {
                    focus_supercolumn_from_child(ctx, sc, child);
                }
                focus_supercolumn_from_a(ctx, sc);
            }
        }
        factorize_supercolumn(ctx, sc, &mut map_cols);
        ctx.map_cols_pool.release(map_cols);
    }
}

// ============================================================================
// Block allocation
// ============================================================================

/// Allocate supercolumn `sc`'s factor block at the symbolic upper-bound
/// sizes and seed its pivot columns. On allocation failure the block is
/// stored invalid and the failure recorded.
fn allocate_factor_block<T: Scalar>(ctx: &Context<'_, T>, sc: usize) {
    let s = ctx.symbolic.supercolumn_size[sc];
    let ml = ctx.symbolic.l_size[sc];
    let mu = ctx.symbolic.u_size[sc];
    let slot = ctx.blocks.slot(sc);
    debug_assert!(slot.is_none());

    let bufs = match (try_zeroed_vec::<T>(ml * s), try_zeroed_vec::<T>(mu * s)) {
        (Ok(lu), Ok(ut2)) => Some((lu, ut2)),
        _ => {
            ctx.record_failure(Error::OutOfMemory);
            None
        }
    };
    let valid = bufs.is_some();
    let (lu, ut2) = bufs.unwrap_or_default();

    let mut pivot_cols = vec![0usize; mu];
    pivot_cols[..s].copy_from_slice(ctx.symbolic.supercolumn_columns(sc));

    *slot = Some(FactorBlock {
        valid,
        row_pivots_number: 0,
        col_pivots_number: 0,
        non_pivot_rows_number: 0,
        non_pivot_cols_number: 0,
        pivot_rows: vec![0; ml],
        pivot_cols,
        l_size: 0,
        lu,
        ut2,
        contrib_block: None,
    });
}

// ============================================================================
// One supercolumn
// ============================================================================

/// Markowitz-style degree estimates for the rows of the front: what is
/// left of the original row plus the widths of the live descendant
/// contributions to it. Indexed like the front rows, through `map_rows`.
fn prepare_degree_array<T: Scalar>(
    ctx: &Context<'_, T>,
    sc: usize,
    rows: &[usize],
    degrees: &mut [usize],
) {
    for (i, &row) in rows.iter().enumerate() {
        let (cols, _) = ctx.at.col(row);
        let mut d = 0;
        for &c in cols {
            if !ctx.column_cleared.get(c) {
                d += 1;
            }
        }
        degrees[i] = d;
    }

    if let Some(fd) = ctx.symbolic.etree.first_desc_index[sc] {
        for desc in fd..sc {
            let Some(db) = ctx.blocks.slot(desc).as_ref() else {
                continue;
            };
            let Some(cb) = db.contrib_block.as_ref() else {
                continue;
            };
            for j in 0..cb.m {
                let loc = ctx.map_rows.get(cb.rows[j]);
                if loc != -1 {
                    degrees[loc as usize] += cb.n;
                }
            }
        }
    }
}

/// Factor the L portion of `sc`'s front: compress the assembled columns to
/// their observed height and run the dense threshold-pivot LU. When `sc`
/// has exactly one child (parallel mode), this first completes the eagerly
/// needed part of the child's deferred update and performs the deferred
/// allocation and focus.
fn factorize_l_portion<T: Scalar>(ctx: &Context<'_, T>, sc: usize, one_child: bool) {
    if one_child && ctx.nproc > 1 {
        let child = ctx.symbolic.etree.first_child[sc].unwrap();
        if let Some(child_block) = ctx.blocks.slot(child).as_mut() {
            let row_b = child_block.row_pivots_number;
            let l_child = row_b + child_block.non_pivot_rows_number;
            let k = child_block.col_pivots_number;
            let ru = child_block.non_pivot_cols_number;
            if let Some(cb) = child_block.contrib_block.as_mut() {
                if cb.num_cols_in_parent > 0 {
                    // the leading columns of the child's contribution are
                    // about to be consumed by the focus below; multiply
                    // them now, the rest runs in the sibling task
                    dense::sub_mul_abt(
                        cb.m,
                        cb.num_cols_in_parent,
                        k,
                        &child_block.lu[row_b..],
                        l_child,
                        &child_block.ut2,
                        ru,
                        &mut cb.values,
                        cb.ld,
                    );
                }
            }
        }

        allocate_factor_block(ctx, sc);
        if !block_is_valid(ctx, sc) {
            return;
        }
        focus_supercolumn_from_child(ctx, sc, child);
        focus_supercolumn_from_a(ctx, sc);
    }

    let Some(block) = ctx.blocks.slot(sc).as_mut() else {
        return;
    };
    if !block.valid {
        return;
    }

    let ml = ctx.symbolic.l_size[sc];
    let col_b = ctx.symbolic.supercolumn_size[sc];
    let l = block.l_size;
    if l == 0 {
        return;
    }

    // compress from the symbolic bound down to the observed front height
    block.pivot_rows.truncate(l);
    dense::compress_block(&mut block.lu, l, col_b, ml);

    let mut degrees_buf: Vec<usize>;
    let degrees = if ctx.thresh < 1.0 {
        degrees_buf = vec![0usize; l];
        prepare_degree_array(ctx, sc, &block.pivot_rows, &mut degrees_buf);
        Some(&mut degrees_buf[..])
    } else {
        None
    };

    if dense::lu_threshold(
        &mut block.lu,
        l,
        col_b,
        l,
        ctx.thresh,
        degrees,
        &mut block.pivot_rows,
    )
    .is_err()
    {
        block.valid = false;
        ctx.record_failure(Error::NumericFailure);
    }
}

/// The deferred remainder of an only child's rank-k update, packaged so it
/// can run as the sibling task of the parent's L portion.
///
/// Safety argument: the L portion task touches only the leading
/// `num_cols_in_parent` physical columns of the child's contribution block
/// (eager multiply, then consumption of those columns' logical slots),
/// while this remainder writes strictly past them; the child's `lu` and
/// `ut2` panels are read by both but written by neither.
struct DeferredRemainder<T> {
    m: usize,
    ncols: usize,
    k: usize,
    l2: *const T,
    l2_len: usize,
    ldl2: usize,
    ut2: *const T,
    ut2_len: usize,
    ldut: usize,
    dst: *mut T,
    dst_len: usize,
    ldc: usize,
}

unsafe impl<T: Send> Send for DeferredRemainder<T> {}

impl<T: Scalar> DeferredRemainder<T> {
    fn run(self) {
        // SAFETY: the regions are disjoint from everything the sibling task
        // touches, see the type-level argument.
        let a = unsafe { std::slice::from_raw_parts(self.l2, self.l2_len) };
        let b = unsafe { std::slice::from_raw_parts(self.ut2, self.ut2_len) };
        let c = unsafe { std::slice::from_raw_parts_mut(self.dst, self.dst_len) };
        dense::sub_mul_abt(self.m, self.ncols, self.k, a, self.ldl2, b, self.ldut, c, self.ldc);
    }
}

fn prepare_deferred_remainder<T: Scalar>(
    ctx: &Context<'_, T>,
    sc: usize,
) -> Option<DeferredRemainder<T>> {
    let child = ctx.symbolic.etree.first_child[sc]?;
    let child_block = ctx.blocks.slot(child).as_mut()?;
    let row_b = child_block.row_pivots_number;
    let l_child = row_b + child_block.non_pivot_rows_number;
    let ru = child_block.non_pivot_cols_number;
    let k = child_block.col_pivots_number;
    let cb = child_block.contrib_block.as_mut()?;
    let npar = cb.num_cols_in_parent;
    let tail = ru.checked_sub(npar)?;
    if tail == 0 {
        return None;
    }
    Some(DeferredRemainder {
        m: cb.m,
        ncols: tail,
        k,
        l2: child_block.lu[row_b..].as_ptr(),
        l2_len: child_block.lu.len() - row_b,
        ldl2: l_child,
        ut2: child_block.ut2[npar..].as_ptr(),
        ut2_len: child_block.ut2.len() - npar,
        ldut: ru,
        dst: unsafe { cb.values.as_mut_ptr().add(npar * cb.ld) },
        dst_len: cb.values.len() - npar * cb.ld,
        ldc: cb.ld,
    })
}

/// Rearrange the non-pivot columns of `sc` so the ones belonging to its
/// parent's supercolumn lead, mirroring the swaps in `map_cols` and the
/// rows of `Ut2`. Returns how many lead.
fn rearrange_non_pivot_cols<T: Scalar>(
    ctx: &Context<'_, T>,
    sc: usize,
    row_b: usize,
    ru: usize,
    map_cols: &mut [i64],
) -> usize {
    let Some(parent) = ctx.symbolic.etree.parent[sc] else {
        return 0;
    };
    let block = ctx.blocks.slot(sc).as_mut().unwrap();
    let col_b = ctx.symbolic.supercolumn_size[sc];

    let mut ipiv = vec![0usize; ru];
    let mut num_inparent = 0usize;
    for &column in ctx.symbolic.supercolumn_columns(parent) {
        let loc = map_cols[column];
        if loc == -1 {
            continue;
        }
        let loc = loc as usize;
        ipiv[num_inparent] = loc;

        let switched = block.pivot_cols[col_b + num_inparent];
        block.pivot_cols[col_b + num_inparent] = column;
        block.pivot_cols[col_b + loc] = switched;
        map_cols[switched] = loc as i64;
        map_cols[column] = num_inparent as i64;
        num_inparent += 1;
    }

    if num_inparent > 0 {
        dense::swap_lines(&mut block.ut2, row_b, ru, &ipiv, 0, num_inparent);
    }
    num_inparent
}

/// Factor supercolumn `sc`, whose front has already been assembled (or,
/// with one child in parallel mode, is assembled inside the L-portion
/// task): dense LU of the L portion, row focus and triangular solve for
/// the U portion, creation of the contribution block and accumulation of
/// the descendants into it.
pub(crate) fn factorize_supercolumn<T: Scalar>(
    ctx: &Context<'_, T>,
    sc: usize,
    map_cols: &mut [i64],
) {
    let etree = &ctx.symbolic.etree;

    let mut only_child = false;
    let mut parent_has_job = false;
    if ctx.nproc > 1 {
        if let Some(p) = etree.parent[sc] {
            only_child = etree.first_child[p] == Some(sc) && etree.next_child[sc].is_none();
            parent_has_job = ctx.symbolic.l_size[p] > 0;
        }
    }
    let one_child = etree.has_one_child(sc);

    if ctx.nproc > 1 {
        // the L factorization and the completion of the only child's
        // deferred update are independent; run them as sibling tasks
        let deferred = if one_child {
            prepare_deferred_remainder(ctx, sc)
        } else {
            None
        };
        rayon::join(
            || factorize_l_portion(ctx, sc, one_child),
            move || {
                if let Some(d) = deferred {
                    d.run();
                }
            },
        );
    } else {
        factorize_l_portion(ctx, sc, one_child);
    }

    // Only one borrow of this supercolumn's slot may be live at a time;
    // focus_rows and rearrange_non_pivot_cols reacquire it themselves, so
    // every phase below takes its own scoped borrow.
    let col_b = ctx.symbolic.supercolumn_size[sc];
    let mu = ctx.symbolic.u_size[sc];
    let (valid, l) = match ctx.blocks.slot(sc).as_ref() {
        Some(block) => (block.valid, block.l_size),
        None => return,
    };
    let row_b = l.min(col_b);
    let mut ru = 0usize;

    if valid {
        if row_b < col_b {
            // the front cannot supply one pivot row per pivot column
            let block = ctx.blocks.slot(sc).as_mut().unwrap();
            block.valid = false;
            ctx.record_failure(Error::NumericFailure);
        } else {
            ru = focus_rows(ctx, sc, row_b, map_cols);
            {
                let block = ctx.blocks.slot(sc).as_mut().unwrap();
                block.pivot_cols.truncate(col_b + ru);
                dense::compress_block(&mut block.ut2, ru, row_b, mu);
            }

            if ru > 0 {
                let mut num_inparent = 0;
                if only_child && parent_has_job {
                    num_inparent = rearrange_non_pivot_cols(ctx, sc, row_b, ru, map_cols);
                }

                let block = ctx.blocks.slot(sc).as_mut().unwrap();
                dense::unit_lower_right_solve(ru, row_b, &block.lu, l, &mut block.ut2, ru);

                // remap the non-pivot rows to their contribution slots;
                // only they matter for the align-add
                for i in 0..(l - row_b) {
                    ctx.map_rows.set(block.pivot_rows[row_b + i], i as i64);
                }

                if l - row_b > 0 {
                    match ContribBlock::new(l - row_b, ru) {
                        Err(e) => {
                            block.valid = false;
                            ctx.record_failure(e);
                        }
                        Ok(mut cb) => {
                            cb.num_cols_in_parent = num_inparent;
                            cb.rows.copy_from_slice(&block.pivot_rows[row_b..l]);
                            cb.columns
                                .copy_from_slice(&block.pivot_cols[col_b..col_b + ru]);
                            block.contrib_block = Some(cb);
                            let dest = AlignDest::new(block.contrib_block.as_mut().unwrap());

                            // descendants first, then this front's own
                            // update; the align kernels only touch
                            // descendant slots
                            if let Some(fd) = etree.first_desc_index[sc] {
                                if ctx.nproc > 1 {
                                    for desc in fd..sc {
                                        let live_member = ctx
                                            .blocks
                                            .slot(desc)
                                            .as_ref()
                                            .and_then(|b| b.contrib_block.as_ref())
                                            .map_or(false, |c| c.l_member || c.u_member);
                                        if live_member {
                                            align_add_from(ctx, &dest, desc, map_cols);
                                        }
                                    }
                                } else {
                                    for child in etree.children(sc) {
                                        align_add_subtree(ctx, &dest, child, map_cols);
                                    }
                                }
                            }

                            if !(only_child && parent_has_job) {
                                let cb = block.contrib_block.as_mut().unwrap();
                                dense::sub_mul_abt(
                                    cb.m,
                                    cb.n,
                                    col_b,
                                    &block.lu[row_b..],
                                    l,
                                    &block.ut2,
                                    ru,
                                    &mut cb.values,
                                    cb.ld,
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    let block = ctx.blocks.slot(sc).as_mut().unwrap();
    block.col_pivots_number = col_b;
    block.row_pivots_number = row_b;
    block.non_pivot_rows_number = l - row_b;
    block.non_pivot_cols_number = ru;

    // without a contribution block this supercolumn must not leave stale
    // membership marks on its descendants
    if l - row_b == 0 || ru == 0 {
        if let Some(fd) = etree.first_desc_index[sc] {
            for desc in fd..sc {
                if let Some(db) = ctx.blocks.slot(desc).as_mut() {
                    if let Some(dcb) = db.contrib_block.as_mut() {
                        dcb.l_member = false;
                        dcb.u_member = false;
                    }
                }
            }
        }
    }

    // restore the shared maps to the sentinel
    for i in 0..l {
        ctx.map_rows.set(block.pivot_rows[i], -1);
    }
    for i in 0..ru {
        map_cols[block.pivot_cols[col_b + i]] = -1;
    }
}
