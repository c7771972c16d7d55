//! End-to-end factorization and solve tests over the concrete scenarios,
//! plus the numeric invariants of the blocked factor.

use multilu::{
    blocked_to_global, factor_lu, numeric_factor, solve, solve_many, symbolic_factor, CcsMatrix,
    Error,
};

// ============================================================================
// Matrix builders and helpers
// ============================================================================

fn identity(n: usize) -> CcsMatrix<f64> {
    CcsMatrix::from_triplets(n, n, (0..n).map(|i| (i, i, 1.0)).collect()).unwrap()
}

fn arrowhead() -> CcsMatrix<f64> {
    let mut e = Vec::new();
    for i in 0..4 {
        e.push((i, i, (i + 1) as f64));
        e.push((i, 4, 1.0));
        e.push((4, i, 1.0));
    }
    e.push((4, 4, 5.0));
    CcsMatrix::from_triplets(5, 5, e).unwrap()
}

fn bidiagonal(n: usize) -> CcsMatrix<f64> {
    let mut e = Vec::new();
    for i in 0..n {
        e.push((i, i, 2.0));
        if i + 1 < n {
            e.push((i + 1, i, -1.0));
        }
    }
    CcsMatrix::from_triplets(n, n, e).unwrap()
}

fn two_block_coupled() -> CcsMatrix<f64> {
    CcsMatrix::from_triplets(
        5,
        5,
        vec![
            (0, 0, 4.0),
            (1, 0, 1.0),
            (0, 1, 1.0),
            (1, 1, 4.0),
            (2, 2, 4.0),
            (3, 2, 1.0),
            (2, 3, 1.0),
            (3, 3, 4.0),
            (0, 4, 1.0),
            (2, 4, 1.0),
            (4, 4, 4.0),
        ],
    )
    .unwrap()
}

/// Two single-column leaves with disjoint rows under a two-child parent;
/// the leaves leave genuine contribution blocks behind.
fn split_leaves() -> CcsMatrix<f64> {
    CcsMatrix::from_triplets(
        4,
        4,
        vec![
            (0, 0, 2.0),
            (2, 0, 1.0),
            (1, 1, 3.0),
            (3, 1, 1.0),
            (0, 2, 1.0),
            (1, 2, 1.0),
            (2, 2, 4.0),
            (3, 2, 1.0),
            (2, 3, 1.0),
            (3, 3, 2.0),
        ],
    )
    .unwrap()
}

fn spmv(a: &CcsMatrix<f64>, x: &[f64]) -> Vec<f64> {
    let mut y = vec![0.0; a.nrows()];
    for j in 0..a.ncols() {
        let (rows, vals) = a.col(j);
        for (&r, &v) in rows.iter().zip(vals) {
            y[r] += v * x[j];
        }
    }
    y
}

fn natural(n: usize) -> Vec<usize> {
    (0..n).collect()
}

/// Factor, solve, and check the residual of `A x = b` against `tol`.
fn solve_and_check(a: &CcsMatrix<f64>, b: &[f64], nproc: usize, thresh: f64, tol: f64) -> Vec<f64> {
    let f = factor_lu(a, &natural(a.ncols()), thresh, nproc).unwrap();
    let mut x = vec![0.0; a.ncols()];
    solve(&f, b, &mut x).unwrap();
    let ax = spmv(a, &x);
    for i in 0..b.len() {
        assert!(
            (ax[i] - b[i]).abs() <= tol,
            "residual {} at row {} exceeds {}",
            ax[i] - b[i],
            i,
            tol
        );
    }
    x
}

// ============================================================================
// Concrete scenarios
// ============================================================================

#[test]
fn test_identity_factor_and_solve() {
    let a = identity(4);
    let f = factor_lu(&a, &[0, 1, 2, 3], 1.0, 1).unwrap();

    assert_eq!(f.blocks.len(), 4);
    for block in &f.blocks {
        assert_eq!(block.row_pivots_number, 1);
        assert_eq!(block.col_pivots_number, 1);
        assert_eq!(block.non_pivot_rows_number, 0);
        assert_eq!(block.non_pivot_cols_number, 0);
        assert_eq!(block.lu, vec![1.0], "every pivot block is the 1x1 identity");
        assert!(block.ut2.is_empty());
        assert!(block.contrib_block.is_none());
    }

    let b = [1.0, 2.0, 3.0, 4.0];
    let mut x = [0.0; 4];
    solve(&f, &b, &mut x).unwrap();
    assert_eq!(x, b);
}

#[test]
fn test_offdiagonal_permutation() {
    // [ 0 1 ]
    // [ 1 0 ]
    let a = CcsMatrix::from_triplets(2, 2, vec![(1, 0, 1.0), (0, 1, 1.0)]).unwrap();
    let f = factor_lu(&a, &[0, 1], 1.0, 1).unwrap();

    // the global pivot row order is [1, 0]
    let g = blocked_to_global(&f);
    assert_eq!(g.row_perm, vec![1, 0]);
    assert_eq!(g.col_perm, vec![0, 1]);
    // after the permutation L and U are both the identity
    for j in 0..2 {
        assert_eq!(g.l.get(j, j), 1.0);
        assert_eq!(g.u.get(j, j), 1.0);
    }

    let b = [2.0, 3.0];
    let mut x = [0.0; 2];
    solve(&f, &b, &mut x).unwrap();
    assert_eq!(x, [3.0, 2.0]);
}

#[test]
fn test_arrowhead_solve() {
    let a = arrowhead();
    let x_true = [1.0, -2.0, 0.5, 3.0, -1.0];
    let b = spmv(&a, &x_true);
    let x = solve_and_check(&a, &b, 1, 1.0, 1e-10);
    for i in 0..5 {
        assert!((x[i] - x_true[i]).abs() < 1e-10);
    }
}

#[test]
fn test_only_child_chain() {
    let a = bidiagonal(100);
    let x_true: Vec<f64> = (0..100).map(|i| ((i % 7) as f64) - 3.0).collect();
    let b = spmv(&a, &x_true);
    let x = solve_and_check(&a, &b, 1, 1.0, 1e-9);
    for i in 0..100 {
        assert!((x[i] - x_true[i]).abs() < 1e-9, "x[{}] = {}", i, x[i]);
    }
}

#[test]
fn test_threshold_pivoting_picks_larger_row() {
    // [ 1e-8 1 ]
    // [ 1    1 ]
    let a = CcsMatrix::from_triplets(
        2,
        2,
        vec![(0, 0, 1e-8), (1, 0, 1.0), (0, 1, 1.0), (1, 1, 1.0)],
    )
    .unwrap();
    let f = factor_lu(&a, &[0, 1], 0.1, 1).unwrap();
    // row 1 carries the large entry and must be the first pivot
    assert_eq!(f.blocks[0].pivot_rows[0], 1);

    let b = [1.0, 2.0];
    let mut x = [0.0; 2];
    solve(&f, &b, &mut x).unwrap();
    let ax = spmv(&a, &x);
    assert!((ax[0] - b[0]).abs() < 1e-9 && (ax[1] - b[1]).abs() < 1e-9);
}

#[test]
fn test_contribution_blocks_are_all_consumed() {
    let a = split_leaves();
    let f = factor_lu(&a, &natural(4), 1.0, 1).unwrap();
    for block in &f.blocks {
        assert!(
            block.contrib_block.is_none(),
            "no contribution block may survive the factorization"
        );
        // each supercolumn produced exactly as many row pivots as columns
        assert_eq!(block.row_pivots_number, block.col_pivots_number);
    }
    let x_true = [1.0, 2.0, -1.0, 0.5];
    let b = spmv(&a, &x_true);
    let x = solve_and_check(&a, &b, 1, 1.0, 1e-10);
    for i in 0..4 {
        assert!((x[i] - x_true[i]).abs() < 1e-10);
    }
}

// ============================================================================
// Failure modes
// ============================================================================

#[test]
fn test_singular_matrix_is_numeric_failure() {
    // [ 1 1 ]
    // [ 1 1 ]
    let a = CcsMatrix::from_triplets(
        2,
        2,
        vec![(0, 0, 1.0), (1, 0, 1.0), (0, 1, 1.0), (1, 1, 1.0)],
    )
    .unwrap();
    match factor_lu(&a, &[0, 1], 1.0, 1) {
        Err(Error::NumericFailure) => {}
        other => panic!("expected NumericFailure, got {:?}", other),
    }
}

#[test]
fn test_bad_threshold_rejected() {
    let a = identity(2);
    let sym = symbolic_factor(&a, &[0, 1]).unwrap();
    assert!(matches!(
        numeric_factor(&a, &sym, 0.0, 0, 1),
        Err(Error::MalformedInput { .. })
    ));
    assert!(matches!(
        numeric_factor(&a, &sym, 1.5, 0, 1),
        Err(Error::MalformedInput { .. })
    ));
}

#[test]
fn test_symbolic_matrix_mismatch_rejected() {
    let a = identity(2);
    let sym = symbolic_factor(&a, &[0, 1]).unwrap();
    let b = identity(3);
    assert!(matches!(
        numeric_factor(&b, &sym, 1.0, 0, 1),
        Err(Error::MalformedInput { .. })
    ));
}

// ============================================================================
// Parallel driver
// ============================================================================

#[test]
fn test_parallel_matches_sequential() {
    for a in [two_block_coupled(), split_leaves(), bidiagonal(64)] {
        let n = a.ncols();
        let x_true: Vec<f64> = (0..n).map(|i| 1.0 + (i as f64) * 0.25).collect();
        let b = spmv(&a, &x_true);

        let f_seq = factor_lu(&a, &natural(n), 1.0, 1).unwrap();
        let f_par = factor_lu(&a, &natural(n), 1.0, 4).unwrap();

        let mut x_seq = vec![0.0; n];
        let mut x_par = vec![0.0; n];
        solve(&f_seq, &b, &mut x_seq).unwrap();
        solve(&f_par, &b, &mut x_par).unwrap();
        for i in 0..n {
            assert!(
                (x_seq[i] - x_par[i]).abs() < 1e-10,
                "sequential and parallel drivers disagree at {}",
                i
            );
        }
    }
}

#[test]
fn test_max_depth_cutoff() {
    let a = two_block_coupled();
    let sym = symbolic_factor(&a, &natural(5)).unwrap();
    let x_true = [2.0, -1.0, 0.5, 1.5, -0.25];
    let b = spmv(&a, &x_true);

    for max_depth in [0, 1, 2, 8] {
        let f = numeric_factor(&a, &sym, 1.0, max_depth, 4).unwrap();
        let mut x = vec![0.0; 5];
        solve(&f, &b, &mut x).unwrap();
        for i in 0..5 {
            assert!(
                (x[i] - x_true[i]).abs() < 1e-10,
                "max_depth {} broke the solve",
                max_depth
            );
        }
    }
}

// ============================================================================
// Multiple right-hand sides and the global form
// ============================================================================

#[test]
fn test_solve_many_two_rhs() {
    let a = split_leaves();
    let f = factor_lu(&a, &natural(4), 1.0, 1).unwrap();

    let x1 = [1.0, 0.0, 2.0, -1.0];
    let x2 = [0.0, 3.0, -2.0, 0.5];
    let b1 = spmv(&a, &x1);
    let b2 = spmv(&a, &x2);
    let mut b = vec![0.0; 8];
    b[..4].copy_from_slice(&b1);
    b[4..].copy_from_slice(&b2);

    let mut x = vec![0.0; 8];
    solve_many(&f, 2, &mut x, 4, &b, 4).unwrap();
    for i in 0..4 {
        assert!((x[i] - x1[i]).abs() < 1e-10);
        assert!((x[4 + i] - x2[i]).abs() < 1e-10);
    }
}

#[test]
fn test_blocked_to_global_reconstructs() {
    for a in [arrowhead(), two_block_coupled(), split_leaves()] {
        let n = a.ncols();
        let f = factor_lu(&a, &natural(n), 1.0, 1).unwrap();
        let g = blocked_to_global(&f);

        // P A Q == L U entrywise
        for i in 0..n {
            for j in 0..n {
                let paq = a.get(g.row_perm[i], g.col_perm[j]);
                let mut lu = 0.0;
                for k in 0..n {
                    lu += g.l.get(i, k) * g.u.get(k, j);
                }
                assert!(
                    (paq - lu).abs() < 1e-10,
                    "P A Q != L U at ({}, {}): {} vs {}",
                    i,
                    j,
                    paq,
                    lu
                );
            }
        }

        // L unit lower, U upper
        for i in 0..n {
            assert!((g.l.get(i, i) - 1.0).abs() < 1e-14);
            for j in i + 1..n {
                assert_eq!(g.l.get(i, j), 0.0);
                assert_eq!(g.u.get(j, i), 0.0);
            }
        }
    }
}
