//! Conversion of the blocked factor to two global CCS factors.
//!
//! The blocked form is what the solver wants; some consumers need plain
//! triangular matrices. This adapter flattens the factor blocks into `L`
//! (unit lower, diagonal stored) and `U` (upper) in pivot coordinates,
//! together with the row and column permutations, so that `P A Q = L U`
//! entrywise. The translation drops the blocked structure and any sharing,
//! hence lossy: converting back is not supported.

use crate::csc::CcsMatrix;
use crate::front::BlockedFactor;
use crate::scalar::Scalar;
use num_traits::One;

/// Global-form factorization: `P A Q = L U` with `l[i][j]` indexed by
/// pivot position. `row_perm[i]` is the original row eliminated at step
/// `i`, `col_perm[j]` the original column.
#[derive(Debug)]
pub struct GlobalLu<T> {
    pub row_perm: Vec<usize>,
    pub col_perm: Vec<usize>,
    pub l: CcsMatrix<T>,
    pub u: CcsMatrix<T>,
}

/// Flatten a blocked factor into [`GlobalLu`].
pub fn blocked_to_global<T: Scalar>(f: &BlockedFactor<T>) -> GlobalLu<T> {
    let n = f.n;

    // global pivot orders and their inverses
    let mut row_perm = Vec::with_capacity(n);
    let mut col_perm = Vec::with_capacity(n);
    for block in &f.blocks {
        row_perm.extend_from_slice(&block.pivot_rows[..block.row_pivots_number]);
        col_perm.extend_from_slice(&block.pivot_cols[..block.col_pivots_number]);
    }
    debug_assert_eq!(row_perm.len(), n);
    debug_assert_eq!(col_perm.len(), n);

    let mut row_pos = vec![0usize; f.m];
    for (i, &r) in row_perm.iter().enumerate() {
        row_pos[r] = i;
    }
    let mut col_pos = vec![0usize; n];
    for (j, &c) in col_perm.iter().enumerate() {
        col_pos[c] = j;
    }

    let mut l_entries: Vec<(usize, usize, T)> = Vec::new();
    let mut u_entries: Vec<(usize, usize, T)> = Vec::new();

    let mut base = 0usize;
    for block in &f.blocks {
        let row_b = block.row_pivots_number;
        let col_b = block.col_pivots_number;
        let l = row_b + block.non_pivot_rows_number;
        let ru = block.non_pivot_cols_number;

        for jj in 0..col_b {
            let gj = base + jj;

            // unit diagonal plus the L1/L2 column below it
            l_entries.push((gj, gj, T::one()));
            for i in jj + 1..row_b {
                l_entries.push((base + i, gj, block.lu[i + jj * l]));
            }
            for i in 0..block.non_pivot_rows_number {
                let grow = row_pos[block.non_pivot_rows()[i]];
                l_entries.push((grow, gj, block.lu[row_b + i + jj * l]));
            }

            // U1 column: rows 0..=jj of this block (row_b == col_b on any
            // factor that survived the validity sweep)
            for i in 0..=jj {
                u_entries.push((base + i, gj, block.lu[i + jj * l]));
            }
        }

        // Ut2 holds the non-pivot part of the U rows transposed
        for i in 0..row_b {
            for c in 0..ru {
                let gcol = col_pos[block.non_pivot_cols()[c]];
                u_entries.push((base + i, gcol, block.ut2[c + i * ru]));
            }
        }

        base += col_b;
    }

    let l = CcsMatrix::from_triplets(n, n, l_entries).expect("indices from a valid factor");
    let u = CcsMatrix::from_triplets(n, n, u_entries).expect("indices from a valid factor");

    GlobalLu {
        row_perm,
        col_perm,
        l,
        u,
    }
}
