//! Unsymmetric multifrontal sparse LU factorization.
//!
//! Given a sparse square matrix `A` in compressed-column form and a column
//! preordering, this crate computes a factorization `P A Q = L U` with
//! threshold partial pivoting, suitable for repeated triangular solves.
//!
//! # Algorithm
//!
//! The engine runs in three phases:
//!
//! 1. **Symbolic analysis** ([`symbolic_factor`]): a column elimination
//!    analysis on the row-merge matrix produces the elimination tree, upper
//!    bounds on the fill of every front, a postorder, and a grouping of
//!    columns into supercolumns (relaxed to absorb small leaves).
//! 2. **Numeric factorization** ([`numeric_factor`]): the elimination tree
//!    is traversed leaves-first, sequentially or by fork-join task
//!    recursion. Each supercolumn assembles a dense front from the matrix
//!    and from its descendants' contribution blocks, factors it with
//!    threshold partial pivoting, and scatters the resulting Schur
//!    complement toward its ancestors ("align-add").
//! 3. **Solve** ([`solve`], [`solve_many`]): blocked forward and backward
//!    substitution over the factor.
//!
//! [`blocked_to_global`] flattens the blocked factor into plain CCS
//! triangular factors plus permutations when a consumer needs them.
//!
//! # Example
//!
//! ```
//! use multilu::{factor_lu, solve, CcsMatrix};
//!
//! // [ 2 1 ]
//! // [ 1 3 ]
//! let a = CcsMatrix::from_triplets(
//!     2,
//!     2,
//!     vec![(0, 0, 2.0), (1, 0, 1.0), (0, 1, 1.0), (1, 1, 3.0)],
//! )
//! .unwrap();
//! let f = factor_lu(&a, &[0, 1], 1.0, 1).unwrap();
//! let b = [5.0, 10.0];
//! let mut x = [0.0f64; 2];
//! solve(&f, &b, &mut x).unwrap();
//! assert!((x[0] - 1.0).abs() < 1e-12 && (x[1] - 3.0).abs() < 1e-12);
//! ```
//!
//! # References
//!
//! - Avron, H., Shklarski, G., Toledo, S. "Parallel Unsymmetric-Pattern
//!   Multifrontal Sparse LU with Column Preordering", ACM TOMS, 2008.
//! - Davis, T.A. "Direct Methods for Sparse Linear Systems", SIAM, 2006.
//! - Gilbert, J.R., Ng, E. "Predicting Structure in Nonsymmetric Sparse
//!   Matrix Factorizations", 1993.

pub mod params;

mod assembly;
mod convert;
mod csc;
mod dense;
mod error;
mod front;
mod numeric;
mod row_arena;
mod scalar;
mod solve;
mod symbolic;
mod union_find;

pub use convert::{blocked_to_global, GlobalLu};
pub use csc::CcsMatrix;
pub use error::Error;
pub use front::{BlockedFactor, ContribBlock, FactorBlock};
pub use numeric::numeric_factor;
pub use scalar::{Scalar, ScalarKind};
pub use solve::{solve, solve_many};
pub use symbolic::{symbolic_factor, EliminationTree, Symbolic};

/// Symbolic and numeric factorization in one call.
pub fn factor_lu<T: Scalar>(
    a: &CcsMatrix<T>,
    column_order: &[usize],
    thresh: f64,
    nproc: usize,
) -> Result<BlockedFactor<T>, Error> {
    let symbolic = symbolic_factor(a, column_order)?;
    numeric_factor(a, &symbolic, thresh, 0, nproc)
}
