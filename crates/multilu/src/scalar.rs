//! Scalar abstraction over the four supported number types.
//!
//! The factorization kernels are generic over a single `Scalar` trait
//! instead of being stamped out per type. The trait is intentionally small:
//! ring operations come from `num_traits`, and the engine itself only needs
//! a modulus for pivot comparisons, a conjugate, and conversions from `f64`
//! for test and driver convenience.

use std::fmt;
use std::ops::Neg;

use num_complex::{Complex32, Complex64};
use num_traits::{Num, NumAssign};

/// Runtime tag for the scalar type of a matrix or factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    RealSingle,
    RealDouble,
    ComplexSingle,
    ComplexDouble,
}

/// Element type of matrices, factors and right-hand sides.
pub trait Scalar:
    Copy
    + Send
    + Sync
    + fmt::Debug
    + fmt::Display
    + Num
    + NumAssign
    + Neg<Output = Self>
    + 'static
{
    /// The runtime tag corresponding to `Self`.
    const KIND: ScalarKind;

    /// Modulus used for threshold pivot comparisons. Absolute value for the
    /// real types, complex norm for the complex ones.
    fn modulus(self) -> f64;

    /// Complex conjugate. Identity for the real types.
    fn conjugate(self) -> Self;

    /// Lossy conversion from `f64` (real part only for complex types).
    fn from_f64(v: f64) -> Self;
}

impl Scalar for f32 {
    const KIND: ScalarKind = ScalarKind::RealSingle;

    #[inline]
    fn modulus(self) -> f64 {
        self.abs() as f64
    }

    #[inline]
    fn conjugate(self) -> Self {
        self
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl Scalar for f64 {
    const KIND: ScalarKind = ScalarKind::RealDouble;

    #[inline]
    fn modulus(self) -> f64 {
        self.abs()
    }

    #[inline]
    fn conjugate(self) -> Self {
        self
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }
}

impl Scalar for Complex32 {
    const KIND: ScalarKind = ScalarKind::ComplexSingle;

    #[inline]
    fn modulus(self) -> f64 {
        self.norm() as f64
    }

    #[inline]
    fn conjugate(self) -> Self {
        self.conj()
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        Complex32::new(v as f32, 0.0)
    }
}

impl Scalar for Complex64 {
    const KIND: ScalarKind = ScalarKind::ComplexDouble;

    #[inline]
    fn modulus(self) -> f64 {
        self.norm()
    }

    #[inline]
    fn conjugate(self) -> Self {
        self.conj()
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        Complex64::new(v, 0.0)
    }
}
