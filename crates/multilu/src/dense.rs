//! Dense kernels for frontal matrices.
//!
//! All blocks are column-major with an explicit leading dimension, so the
//! kernels can operate on sub-blocks of a larger allocation (the factor
//! blocks keep L1 and L2 in one buffer, and U transposed in another).
//!
//! The set matches what the numeric driver needs: rectangular LU with
//! threshold partial pivoting and a Markowitz-style degree tie-break,
//! unit-lower and upper triangular solves from the left, a unit-lower solve
//! applied from the right (for the transposed U panel), three rank-k
//! downdates and a row swapper.

use crate::scalar::Scalar;
use num_traits::Zero;

/// Raised when a pivot column of a front has no entry with non-zero
/// modulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PivotFailure {
    pub column: usize,
}

/// LU factorization with threshold partial pivoting of an `m x n` block.
///
/// On entry `a` holds the block (leading dimension `ld`) and `rows` the
/// identity of its `m` rows. On exit the strictly lower part of the first
/// `min(m, n)` columns holds the L multipliers, the upper part holds U, and
/// `rows` (plus `degrees`, when given) is permuted to the pivot order.
///
/// A pivot row is picked among the candidates whose modulus is at least
/// `thresh` times the column maximum; with degree estimates present the
/// candidate with the smallest degree wins, otherwise the first maximal row
/// is taken. `thresh == 1.0` therefore reduces to classic partial pivoting
/// and needs no degree array.
pub fn lu_threshold<T: Scalar>(
    a: &mut [T],
    m: usize,
    n: usize,
    ld: usize,
    thresh: f64,
    mut degrees: Option<&mut [usize]>,
    rows: &mut [usize],
) -> Result<(), PivotFailure> {
    let steps = m.min(n);
    for k in 0..steps {
        // column maximum below the eliminated part
        let mut max_mod = 0.0f64;
        for i in k..m {
            let v = a[i + k * ld].modulus();
            if v > max_mod {
                max_mod = v;
            }
        }
        if max_mod == 0.0 {
            return Err(PivotFailure { column: k });
        }

        // pick the pivot among the rows within thresh of the maximum
        let mut piv = k;
        match degrees.as_deref() {
            Some(deg) if thresh < 1.0 => {
                let cutoff = thresh * max_mod;
                let mut best_deg = usize::MAX;
                for i in k..m {
                    if a[i + k * ld].modulus() >= cutoff && deg[i] < best_deg {
                        best_deg = deg[i];
                        piv = i;
                    }
                }
            }
            _ => {
                for i in k..m {
                    if a[i + k * ld].modulus() == max_mod {
                        piv = i;
                        break;
                    }
                }
            }
        }

        if piv != k {
            for j in 0..n {
                a.swap(k + j * ld, piv + j * ld);
            }
            rows.swap(k, piv);
            if let Some(deg) = degrees.as_deref_mut() {
                deg.swap(k, piv);
            }
        }

        // scale the multipliers and downdate the trailing block
        let d = a[k + k * ld];
        for i in k + 1..m {
            a[i + k * ld] = a[i + k * ld] / d;
        }
        for j in k + 1..n {
            let u = a[k + j * ld];
            if !u.is_zero() {
                for i in k + 1..m {
                    let l = a[i + k * ld];
                    a[i + j * ld] -= l * u;
                }
            }
        }
    }
    Ok(())
}

/// `B <- L^-1 B` for a unit lower triangular `n x n` L stored in `l` with
/// leading dimension `ldl`. `b` is `n x nrhs` with leading dimension `ldb`.
pub fn unit_lower_left_solve<T: Scalar>(
    n: usize,
    nrhs: usize,
    l: &[T],
    ldl: usize,
    b: &mut [T],
    ldb: usize,
) {
    for c in 0..nrhs {
        for j in 0..n {
            let x = b[j + c * ldb];
            if x.is_zero() {
                continue;
            }
            for i in j + 1..n {
                let lij = l[i + j * ldl];
                b[i + c * ldb] -= lij * x;
            }
        }
    }
}

/// `B <- U^-1 B` for an upper triangular `n x n` U stored in `u` with
/// leading dimension `ldu`. The diagonal is taken from `u`.
pub fn upper_left_solve<T: Scalar>(
    n: usize,
    nrhs: usize,
    u: &[T],
    ldu: usize,
    b: &mut [T],
    ldb: usize,
) {
    for c in 0..nrhs {
        for j in (0..n).rev() {
            let x = b[j + c * ldb] / u[j + j * ldu];
            b[j + c * ldb] = x;
            if x.is_zero() {
                continue;
            }
            for i in 0..j {
                let uij = u[i + j * ldu];
                b[i + c * ldb] -= uij * x;
            }
        }
    }
}

/// `B <- B L^-T` for a unit lower triangular `n x n` L. `b` is `m x n`.
///
/// This is the transposed-left solve: with `B` holding a panel of `U`
/// transposed, it computes `U <- L^-1 U` column by column of `B`.
pub fn unit_lower_right_solve<T: Scalar>(
    m: usize,
    n: usize,
    l: &[T],
    ldl: usize,
    b: &mut [T],
    ldb: usize,
) {
    for j in 0..n {
        for k in 0..j {
            let ljk = l[j + k * ldl];
            if ljk.is_zero() {
                continue;
            }
            for i in 0..m {
                let bk = b[i + k * ldb];
                b[i + j * ldb] -= ljk * bk;
            }
        }
    }
}

/// `C <- C - A * B^T` with `A` `m x k`, `B` `n x k`, `C` `m x n`.
pub fn sub_mul_abt<T: Scalar>(
    m: usize,
    n: usize,
    k: usize,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    c: &mut [T],
    ldc: usize,
) {
    for j in 0..n {
        for p in 0..k {
            let bjp = b[j + p * ldb];
            if bjp.is_zero() {
                continue;
            }
            for i in 0..m {
                let aip = a[i + p * lda];
                c[i + j * ldc] -= aip * bjp;
            }
        }
    }
}

/// `C <- C - A * B` with `A` `m x k`, `B` `k x n`, `C` `m x n`.
pub fn sub_mul_ab<T: Scalar>(
    m: usize,
    n: usize,
    k: usize,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    c: &mut [T],
    ldc: usize,
) {
    for j in 0..n {
        for p in 0..k {
            let bpj = b[p + j * ldb];
            if bpj.is_zero() {
                continue;
            }
            for i in 0..m {
                let aip = a[i + p * lda];
                c[i + j * ldc] -= aip * bpj;
            }
        }
    }
}

/// `C <- C - A^T * B` with `A` `k x m`, `B` `k x n`, `C` `m x n`.
pub fn sub_mul_atb<T: Scalar>(
    m: usize,
    n: usize,
    k: usize,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    c: &mut [T],
    ldc: usize,
) {
    for j in 0..n {
        for i in 0..m {
            let mut acc = T::zero();
            for p in 0..k {
                let aip = a[p + i * lda];
                let bpj = b[p + j * ldb];
                acc += aip * bpj;
            }
            c[i + j * ldc] -= acc;
        }
    }
}

/// Apply the row interchanges `i <-> ipiv[i]` for `i` in `k1..k2`, in
/// order, to an `n`-column block with leading dimension `ld`.
pub fn swap_lines<T: Scalar>(
    a: &mut [T],
    n: usize,
    ld: usize,
    ipiv: &[usize],
    k1: usize,
    k2: usize,
) {
    for i in k1..k2 {
        let p = ipiv[i];
        if p != i {
            for j in 0..n {
                a.swap(i + j * ld, p + j * ld);
            }
        }
    }
}

/// Compact an `m x n` block stored with leading dimension `ld` down to
/// leading dimension `m`, truncating the buffer.
pub fn compress_block<T: Scalar>(values: &mut Vec<T>, m: usize, n: usize, ld: usize) {
    debug_assert!(ld >= m);
    if m == 0 || n == 0 {
        values.clear();
        return;
    }
    for j in 1..n {
        values.copy_within(j * ld..j * ld + m, j * m);
    }
    values.truncate(m * n);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mat(cols: &[&[f64]]) -> (Vec<f64>, usize, usize) {
        let m = cols[0].len();
        let n = cols.len();
        let mut v = Vec::with_capacity(m * n);
        for c in cols {
            v.extend_from_slice(c);
        }
        (v, m, n)
    }

    #[test]
    fn test_lu_identity_pivot_order() {
        let (mut a, m, n) = mat(&[&[2.0, 0.0], &[0.0, 3.0]]);
        let mut rows = vec![10, 11];
        lu_threshold(&mut a, m, n, m, 1.0, None, &mut rows).unwrap();
        assert_eq!(rows, vec![10, 11]);
        assert_eq!(a, vec![2.0, 0.0, 0.0, 3.0]);
    }

    #[test]
    fn test_lu_picks_larger_row() {
        // column 0 is [0, 1]; the pivot must be the second row
        let (mut a, m, n) = mat(&[&[0.0, 1.0], &[1.0, 0.0]]);
        let mut rows = vec![0, 1];
        lu_threshold(&mut a, m, n, m, 1.0, None, &mut rows).unwrap();
        assert_eq!(rows, vec![1, 0]);
        // after the swap the block is the identity
        assert_eq!(a, vec![1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_lu_threshold_degree_tie_break() {
        // both rows pass the 0.5 threshold; the lower-degree row wins
        let (mut a, m, n) = mat(&[&[1.0, 0.9], &[0.0, 1.0]]);
        let mut rows = vec![0, 1];
        let mut degrees = vec![5, 1];
        lu_threshold(&mut a, m, n, m, 0.5, Some(&mut degrees), &mut rows).unwrap();
        assert_eq!(rows[0], 1, "row 1 has the smaller degree");
        assert_eq!(degrees[0], 1);
    }

    #[test]
    fn test_lu_zero_column_fails() {
        let (mut a, m, n) = mat(&[&[0.0, 0.0], &[1.0, 1.0]]);
        let mut rows = vec![0, 1];
        let err = lu_threshold(&mut a, m, n, m, 1.0, None, &mut rows).unwrap_err();
        assert_eq!(err.column, 0);
    }

    #[test]
    fn test_lu_reconstructs_matrix() {
        let (orig, m, n) = mat(&[&[4.0, 2.0, 1.0], &[2.0, 5.0, 2.0], &[1.0, 2.0, 6.0]]);
        let mut a = orig.clone();
        let mut rows = vec![0, 1, 2];
        lu_threshold(&mut a, m, n, m, 1.0, None, &mut rows).unwrap();
        // P*orig == L*U
        for i in 0..m {
            for j in 0..n {
                let mut lu = 0.0;
                for p in 0..=i.min(j) {
                    let l = if p == i { 1.0 } else { a[i + p * m] };
                    lu += l * a[p + j * m];
                }
                let expect = orig[rows[i] + j * m];
                assert!(
                    (lu - expect).abs() < 1e-12,
                    "P A != L U at ({}, {}): {} vs {}",
                    i,
                    j,
                    lu,
                    expect
                );
            }
        }
    }

    #[test]
    fn test_triangular_solves_invert_lu() {
        // L = [[1,0],[0.5,1]], U = [[2,1],[0,3]]
        let lu = vec![2.0, 0.5, 1.0, 3.0];
        let mut b = vec![2.0, 4.0];
        unit_lower_left_solve(2, 1, &lu, 2, &mut b, 2);
        assert_eq!(b, vec![2.0, 3.0]);
        upper_left_solve(2, 1, &lu, 2, &mut b, 2);
        assert_eq!(b, vec![0.5, 1.0]);
    }

    #[test]
    fn test_unit_lower_right_solve_matches_left() {
        // check B L^-T == (L^-1 B^T)^T on a 2x2 system
        let l = vec![1.0, 0.25, 0.0, 1.0]; // unit lower, l21 = 0.25
        let mut bt = vec![1.0, 2.0, 3.0, 4.0]; // 2x2, column major
        unit_lower_right_solve(2, 2, &l, 2, &mut bt, 2);
        // columns of bt are rows of B; column 1 -= 0.25 * column 0
        assert_eq!(bt, vec![1.0, 2.0, 3.0 - 0.25, 4.0 - 0.5]);
    }

    #[test]
    fn test_rank_k_updates() {
        let a = vec![1.0, 2.0]; // 2x1
        let b = vec![3.0, 4.0]; // 2x1 (so B^T is 1x2)
        let mut c = vec![0.0; 4];
        sub_mul_abt(2, 2, 1, &a, 2, &b, 2, &mut c, 2);
        assert_eq!(c, vec![-3.0, -6.0, -4.0, -8.0]);

        let mut c2 = vec![0.0; 2];
        sub_mul_ab(2, 1, 1, &a, 2, &[5.0], 1, &mut c2, 2);
        assert_eq!(c2, vec![-5.0, -10.0]);

        let mut c3 = vec![0.0; 1];
        sub_mul_atb(1, 1, 2, &a, 2, &b, 2, &mut c3, 1);
        assert_eq!(c3, vec![-11.0]);
    }

    #[test]
    fn test_swap_lines_and_compress() {
        let mut a = vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0]; // 3x2, ld 3
        swap_lines(&mut a, 2, 3, &[2, 1], 0, 1);
        assert_eq!(a, vec![3.0, 2.0, 1.0, 30.0, 20.0, 10.0]);

        let mut v = vec![1.0, 2.0, 9.0, 3.0, 4.0, 9.0]; // 2x2 in ld 3
        compress_block(&mut v, 2, 2, 3);
        assert_eq!(v, vec![1.0, 2.0, 3.0, 4.0]);
    }
}
