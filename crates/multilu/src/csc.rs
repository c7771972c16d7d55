//! Compressed-column sparse matrices.
//!
//! Minimal CCS container used by the engine: 0-based column pointers, row
//! indices and a typed value buffer. The numeric phase keeps a private
//! transposed copy of the input for row-oriented access, so `transpose` is
//! part of the core surface.

use crate::error::Error;
use crate::scalar::{Scalar, ScalarKind};
use num_traits::Zero;
use std::ops::Range;

/// Sparse matrix in compressed-column storage.
#[derive(Debug, Clone)]
pub struct CcsMatrix<T> {
    m: usize,
    n: usize,
    colptr: Vec<usize>,
    rowind: Vec<usize>,
    values: Vec<T>,
}

impl<T: Scalar> CcsMatrix<T> {
    /// Build a matrix from raw CCS arrays, validating the structure.
    pub fn new(
        m: usize,
        n: usize,
        colptr: Vec<usize>,
        rowind: Vec<usize>,
        values: Vec<T>,
    ) -> Result<Self, Error> {
        if colptr.len() != n + 1 {
            return Err(Error::malformed(format!(
                "colptr has {} entries, expected {}",
                colptr.len(),
                n + 1
            )));
        }
        if colptr[0] != 0 {
            return Err(Error::malformed("colptr[0] must be 0"));
        }
        for j in 0..n {
            if colptr[j] > colptr[j + 1] {
                return Err(Error::malformed(format!(
                    "colptr is not non-decreasing at column {}",
                    j
                )));
            }
        }
        let nnz = colptr[n];
        if rowind.len() != nnz || values.len() != nnz {
            return Err(Error::malformed(format!(
                "rowind/values have {}/{} entries, colptr says {}",
                rowind.len(),
                values.len(),
                nnz
            )));
        }
        if let Some(&bad) = rowind.iter().find(|&&r| r >= m) {
            return Err(Error::malformed(format!(
                "row index {} out of range for {} rows",
                bad, m
            )));
        }
        Ok(CcsMatrix {
            m,
            n,
            colptr,
            rowind,
            values,
        })
    }

    /// Build a matrix from (row, col, value) triplets. Duplicate entries are
    /// summed.
    pub fn from_triplets(
        m: usize,
        n: usize,
        mut entries: Vec<(usize, usize, T)>,
    ) -> Result<Self, Error> {
        if let Some(&(r, c, _)) = entries.iter().find(|&&(r, c, _)| r >= m || c >= n) {
            return Err(Error::malformed(format!(
                "triplet ({}, {}) out of range for {}x{}",
                r, c, m, n
            )));
        }
        entries.sort_by_key(|&(r, c, _)| (c, r));
        let mut colptr = vec![0usize; n + 1];
        let mut rowind: Vec<usize> = Vec::with_capacity(entries.len());
        let mut values: Vec<T> = Vec::with_capacity(entries.len());
        let mut last = None;
        for &(r, c, v) in &entries {
            if last == Some((c, r)) {
                let tail = values.last_mut().unwrap();
                *tail += v;
            } else {
                rowind.push(r);
                values.push(v);
                colptr[c + 1] += 1;
                last = Some((c, r));
            }
        }
        for j in 0..n {
            colptr[j + 1] += colptr[j];
        }
        CcsMatrix::new(m, n, colptr, rowind, values)
    }

    pub fn nrows(&self) -> usize {
        self.m
    }

    pub fn ncols(&self) -> usize {
        self.n
    }

    pub fn nnz(&self) -> usize {
        self.colptr[self.n]
    }

    pub fn is_square(&self) -> bool {
        self.m == self.n
    }

    pub fn kind(&self) -> ScalarKind {
        T::KIND
    }

    pub fn colptr(&self) -> &[usize] {
        &self.colptr
    }

    pub fn rowind(&self) -> &[usize] {
        &self.rowind
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Index range of column `j` into `rowind`/`values`.
    pub fn col_range(&self, j: usize) -> Range<usize> {
        self.colptr[j]..self.colptr[j + 1]
    }

    /// Row indices and values of column `j`.
    pub fn col(&self, j: usize) -> (&[usize], &[T]) {
        let r = self.col_range(j);
        (&self.rowind[r.clone()], &self.values[r])
    }

    /// Value at `(i, j)`, summing duplicates. Zero when absent. Linear in
    /// the column length; meant for tests and diagnostics.
    pub fn get(&self, i: usize, j: usize) -> T {
        let (rows, vals) = self.col(j);
        let mut acc = T::zero();
        for (r, v) in rows.iter().zip(vals) {
            if *r == i {
                acc += *v;
            }
        }
        acc
    }

    /// Transposed copy, built with a counting sort over the rows.
    pub fn transpose(&self) -> CcsMatrix<T> {
        let mut colptr = vec![0usize; self.m + 1];
        for &r in &self.rowind {
            colptr[r + 1] += 1;
        }
        for i in 0..self.m {
            colptr[i + 1] += colptr[i];
        }
        let mut cursor = colptr.clone();
        let mut rowind = vec![0usize; self.nnz()];
        let mut values = vec![T::zero(); self.nnz()];
        for j in 0..self.n {
            for idx in self.col_range(j) {
                let r = self.rowind[idx];
                let dst = cursor[r];
                rowind[dst] = j;
                values[dst] = self.values[idx];
                cursor[r] += 1;
            }
        }
        CcsMatrix {
            m: self.n,
            n: self.m,
            colptr,
            rowind,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CcsMatrix<f64> {
        // [ 1 0 2 ]
        // [ 0 3 0 ]
        // [ 4 0 5 ]
        CcsMatrix::new(
            3,
            3,
            vec![0, 2, 3, 5],
            vec![0, 2, 1, 0, 2],
            vec![1.0, 4.0, 3.0, 2.0, 5.0],
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_bad_structure() {
        assert!(CcsMatrix::<f64>::new(2, 2, vec![0, 1], vec![0], vec![1.0]).is_err());
        assert!(CcsMatrix::<f64>::new(2, 2, vec![0, 2, 1], vec![0, 1], vec![1.0, 1.0]).is_err());
        assert!(CcsMatrix::<f64>::new(2, 2, vec![0, 1, 2], vec![0, 5], vec![1.0, 1.0]).is_err());
    }

    #[test]
    fn test_transpose_round_trip() {
        let a = sample();
        let att = a.transpose().transpose();
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(a.get(i, j), att.get(i, j), "mismatch at ({}, {})", i, j);
            }
        }
        assert_eq!(a.transpose().get(2, 0), 2.0);
        assert_eq!(a.transpose().get(0, 2), 4.0);
    }

    #[test]
    fn test_from_triplets() {
        let a = CcsMatrix::from_triplets(
            2,
            2,
            vec![(0, 0, 1.0), (1, 1, 2.0), (0, 0, 0.5), (1, 0, -1.0)],
        )
        .unwrap();
        assert_eq!(a.get(0, 0), 1.5);
        assert_eq!(a.get(1, 0), -1.0);
        assert_eq!(a.get(1, 1), 2.0);
        assert_eq!(a.get(0, 1), 0.0);
    }
}
