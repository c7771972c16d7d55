//! Randomized end-to-end tests across the supported scalar types: factor a
//! diagonally dominant random sparse matrix, solve, and verify the residual
//! by multiplying back.

use multilu::{factor_lu, solve, CcsMatrix, Scalar};
use num_complex::Complex64;
use num_traits::Zero;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ============================================================================
// Generators and helpers
// ============================================================================

fn random_real<T: Scalar>(n: usize, extra_per_col: usize, rng: &mut StdRng) -> CcsMatrix<T> {
    let mut e = Vec::new();
    for j in 0..n {
        // a dominant diagonal keeps every test matrix comfortably regular
        e.push((j, j, T::from_f64(n as f64 + rng.gen_range(0.0..1.0))));
        for _ in 0..extra_per_col {
            let r = rng.gen_range(0..n);
            e.push((r, j, T::from_f64(rng.gen_range(-1.0..1.0))));
        }
    }
    CcsMatrix::from_triplets(n, n, e).unwrap()
}

fn random_complex(n: usize, extra_per_col: usize, rng: &mut StdRng) -> CcsMatrix<Complex64> {
    let mut e = Vec::new();
    for j in 0..n {
        e.push((
            j,
            j,
            Complex64::new(n as f64 + rng.gen_range(0.0..1.0), rng.gen_range(-1.0..1.0)),
        ));
        for _ in 0..extra_per_col {
            let r = rng.gen_range(0..n);
            e.push((
                r,
                j,
                Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)),
            ));
        }
    }
    CcsMatrix::from_triplets(n, n, e).unwrap()
}

fn spmv<T: Scalar>(a: &CcsMatrix<T>, x: &[T]) -> Vec<T> {
    let mut y = vec![T::zero(); a.nrows()];
    for j in 0..a.ncols() {
        let (rows, vals) = a.col(j);
        for (&r, &v) in rows.iter().zip(vals) {
            let t = v * x[j];
            y[r] += t;
        }
    }
    y
}

fn shuffled(n: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut p: Vec<usize> = (0..n).collect();
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        p.swap(i, j);
    }
    p
}

/// Relative infinity-norm residual of `A x = b`.
fn residual<T: Scalar>(a: &CcsMatrix<T>, x: &[T], b: &[T]) -> f64 {
    let ax = spmv(a, x);
    let mut num = 0.0f64;
    let mut den = 0.0f64;
    for i in 0..b.len() {
        num = num.max((ax[i] - b[i]).modulus());
        den = den.max(b[i].modulus());
    }
    num / den.max(1e-300)
}

fn run_case<T: Scalar>(
    a: &CcsMatrix<T>,
    order: &[usize],
    thresh: f64,
    nproc: usize,
    tol: f64,
    rng: &mut StdRng,
) {
    let n = a.ncols();
    let x_true: Vec<T> = (0..n)
        .map(|_| T::from_f64(rng.gen_range(-2.0..2.0)))
        .collect();
    let b = spmv(a, &x_true);

    let f = factor_lu(a, order, thresh, nproc).unwrap();
    let mut x = vec![T::zero(); n];
    solve(&f, &b, &mut x).unwrap();

    let r = residual(a, &x, &b);
    assert!(r < tol, "residual {} exceeds {}", r, tol);
}

// ============================================================================
// Per-type sweeps
// ============================================================================

#[test]
fn test_random_f64_natural_order() {
    let mut rng = StdRng::seed_from_u64(7);
    for n in [10, 30, 60] {
        let a = random_real::<f64>(n, 5, &mut rng);
        let order: Vec<usize> = (0..n).collect();
        run_case(&a, &order, 1.0, 1, 1e-10, &mut rng);
    }
}

#[test]
fn test_random_f64_shuffled_order() {
    let mut rng = StdRng::seed_from_u64(11);
    for seed_round in 0..4 {
        let n = 40 + seed_round * 7;
        let a = random_real::<f64>(n, 4, &mut rng);
        let order = shuffled(n, &mut rng);
        run_case(&a, &order, 1.0, 1, 1e-10, &mut rng);
    }
}

#[test]
fn test_random_f64_threshold_pivoting() {
    // thresh below one exercises the Markowitz degree tie-break
    let mut rng = StdRng::seed_from_u64(13);
    for _ in 0..3 {
        let a = random_real::<f64>(50, 5, &mut rng);
        let order = shuffled(50, &mut rng);
        run_case(&a, &order, 0.5, 1, 1e-9, &mut rng);
    }
}

#[test]
fn test_random_f64_parallel() {
    let mut rng = StdRng::seed_from_u64(17);
    for _ in 0..3 {
        let a = random_real::<f64>(60, 5, &mut rng);
        let order = shuffled(60, &mut rng);
        run_case(&a, &order, 1.0, 4, 1e-10, &mut rng);
    }
}

#[test]
fn test_random_f32() {
    let mut rng = StdRng::seed_from_u64(19);
    for _ in 0..3 {
        let a = random_real::<f32>(40, 4, &mut rng);
        let order: Vec<usize> = (0..40).collect();
        run_case(&a, &order, 1.0, 1, 1e-3, &mut rng);
    }
}

#[test]
fn test_random_complex64() {
    let mut rng = StdRng::seed_from_u64(23);
    for _ in 0..3 {
        let a = random_complex(40, 4, &mut rng);
        let order = shuffled(40, &mut rng);
        run_case(&a, &order, 1.0, 1, 1e-10, &mut rng);
    }
}

#[test]
fn test_random_complex64_parallel_threshold() {
    let mut rng = StdRng::seed_from_u64(29);
    let a = random_complex(50, 5, &mut rng);
    let order = shuffled(50, &mut rng);
    run_case(&a, &order, 0.5, 4, 1e-9, &mut rng);
}
