//! Forward/back substitution over the blocked factor.
//!
//! The factor is a sequence of factor blocks in postorder. The forward
//! sweep walks them in order, solving each block's unit-lower pivot system
//! and downdating the untouched rows through L2. The backward sweep walks
//! them in reverse, downdating each block's right-hand side through the
//! transposed U panel before solving the upper pivot system and scattering
//! into the solution at the block's pivot columns.

use crate::dense;
use crate::error::Error;
use crate::front::{try_zeroed_vec, BlockedFactor};
use crate::scalar::Scalar;

/// Solve `A x = b` for a single right-hand side.
pub fn solve<T: Scalar>(f: &BlockedFactor<T>, b: &[T], x: &mut [T]) -> Result<(), Error> {
    if b.len() < f.m || x.len() < f.n {
        return Err(Error::malformed(format!(
            "rhs/solution have {}/{} entries for a {}x{} factor",
            b.len(),
            x.len(),
            f.m,
            f.n
        )));
    }
    solve_many(f, 1, x, f.n, b, f.m)
}

/// Solve `A X = B` for `nrhs` right-hand sides. `x` and `b` are
/// column-major with leading dimensions `ld_x` and `ld_b`.
pub fn solve_many<T: Scalar>(
    f: &BlockedFactor<T>,
    nrhs: usize,
    x: &mut [T],
    ld_x: usize,
    b: &[T],
    ld_b: usize,
) -> Result<(), Error> {
    if ld_b < f.m || ld_x < f.n {
        return Err(Error::malformed(format!(
            "leading dimensions {}/{} too small for a {}x{} factor",
            ld_b, ld_x, f.m, f.n
        )));
    }
    if b.len() < nrhs * ld_b || x.len() < nrhs * ld_x {
        return Err(Error::malformed("right-hand side buffers too short"));
    }

    let mut b_copy = b[..nrhs * ld_b].to_vec();
    let mut y = try_zeroed_vec::<T>(nrhs * f.n)?;
    let mut t = try_zeroed_vec::<T>(nrhs * f.n)?;

    // L y = P b, then U Q^-1 x = y
    solve_blocked_l(f, &mut y, &mut b_copy, &mut t, nrhs, ld_b, f.n);
    solve_blocked_u(f, x, &mut y, &mut t, nrhs, f.n, ld_x);
    Ok(())
}

/// Forward sweep: `x` receives the solution of `L x = P b` laid out in
/// global pivot order; `b` is consumed as scratch.
fn solve_blocked_l<T: Scalar>(
    f: &BlockedFactor<T>,
    x: &mut [T],
    b: &mut [T],
    t: &mut [T],
    nrhs: usize,
    ld_b: usize,
    ld_x: usize,
) {
    let ld_t = f.n;
    let mut xoff = 0usize;
    for block in &f.blocks {
        let row_b = block.row_pivots_number;
        let npr = block.non_pivot_rows_number;
        let l = row_b + npr;

        // gather this block's pivot rows of b
        for c in 0..nrhs {
            for j in 0..row_b {
                x[xoff + j + c * ld_x] = b[block.pivot_rows[j] + c * ld_b];
            }
        }

        dense::unit_lower_left_solve(row_b, nrhs, &block.lu, l, &mut x[xoff..], ld_x);

        if npr > 0 {
            // downdate the untouched rows: b <- b - L2 x
            for c in 0..nrhs {
                for j in 0..npr {
                    t[j + c * ld_t] = b[block.non_pivot_rows()[j] + c * ld_b];
                }
            }
            dense::sub_mul_ab(
                npr,
                nrhs,
                row_b,
                block.l2(),
                l,
                &x[xoff..],
                ld_x,
                t,
                ld_t,
            );
            for c in 0..nrhs {
                for j in 0..npr {
                    b[block.non_pivot_rows()[j] + c * ld_b] = t[j + c * ld_t];
                }
            }
        }

        xoff += row_b;
    }
}

/// Backward sweep: `x` receives the solution scattered to the original
/// column indices; `b` holds the forward result in pivot order and is
/// consumed as scratch.
fn solve_blocked_u<T: Scalar>(
    f: &BlockedFactor<T>,
    x: &mut [T],
    b: &mut [T],
    t: &mut [T],
    nrhs: usize,
    ld_b: usize,
    ld_x: usize,
) {
    let ld_t = f.n;
    let mut boff = f.n;
    for block in f.blocks.iter().rev() {
        let col_b = block.col_pivots_number;
        let row_b = block.row_pivots_number;
        let l = row_b + block.non_pivot_rows_number;
        let ru = block.non_pivot_cols_number;
        boff -= col_b;

        if ru > 0 {
            // downdate through the non-pivot columns already solved
            for c in 0..nrhs {
                for j in 0..ru {
                    t[j + c * ld_t] = x[block.non_pivot_cols()[j] + c * ld_x];
                }
            }
            dense::sub_mul_atb(
                col_b,
                nrhs,
                ru,
                &block.ut2,
                ru,
                t,
                ld_t,
                &mut b[boff..],
                ld_b,
            );
        }

        dense::upper_left_solve(col_b, nrhs, &block.lu, l, &mut b[boff..], ld_b);

        for c in 0..nrhs {
            for j in 0..col_b {
                x[block.pivot_cols[j] + c * ld_x] = b[boff + j + c * ld_b];
            }
        }
    }
    debug_assert_eq!(boff, 0);
}
