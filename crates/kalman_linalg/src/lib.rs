//! A small collection of extension traits and helpers on top of ndarray, for
//! working with batches of small dense covariance matrices. The
//! factorisations themselves are delegated to `nalgebra`.

use nalgebra as na;
use ndarray::{ArrayBase, Data, Ix1, Ix2};

pub mod batch;
pub mod cholesky;
pub mod shape;
pub mod triangular;

pub mod prelude {
    pub use super::{
        batch::{batch_mv, collapse_batch},
        cholesky::{Cholesky, CholeskyError},
        shape::{broadcast_shapes, unravel_index},
        triangular::{lower_log_diagonal_sum, solve_lower_triangular},
        KalmanFloat, Matrix, Vector,
    };
}

pub use cholesky::{Cholesky, CholeskyError};

/// Marker trait for floating point types used by the belief distributions.
/// - `ndarray::NdFloat` is a trait for floating point types that can be used
///   with ndarray. It is implemented for f32 and f64.
/// - `num_traits::FloatConst` gives access to π without a fallible cast.
/// - Copy, is to make some of the methods more ergonomic to use.
/// - `std::iter::Sum` is required to sum log-diagonals and quadratic forms.
///
/// `nalgebra::RealField` is not a supertrait, its methods would
/// collide with those of `num_traits::Float`. The same type is exposed
/// as [`KalmanFloat::Field`] when handing matrices to `nalgebra`.
pub trait KalmanFloat:
    ndarray::NdFloat + num_traits::FloatConst + Copy + std::iter::Sum
{
    /// This type, as seen by `nalgebra`.
    type Field: na::RealField + Copy;

    fn into_field(self) -> Self::Field;
    fn from_field(field: Self::Field) -> Self;

    /// Convert a configuration constant into this precision.
    /// Rounds to nearest for `f32`.
    fn from_f64_lossy(value: f64) -> Self;

    /// `0.5`, spelled out so the density formulas stay readable.
    #[inline(always)]
    fn half() -> Self {
        Self::one() / (Self::one() + Self::one())
    }

    /// `2π`
    #[inline(always)]
    fn two_pi() -> Self {
        Self::PI() + Self::PI()
    }
}

impl KalmanFloat for f32 {
    type Field = Self;

    #[inline(always)]
    fn into_field(self) -> Self::Field {
        self
    }

    #[inline(always)]
    fn from_field(field: Self::Field) -> Self {
        field
    }

    #[allow(clippy::cast_possible_truncation)]
    #[inline(always)]
    fn from_f64_lossy(value: f64) -> Self {
        value as Self
    }
}

impl KalmanFloat for f64 {
    type Field = Self;

    #[inline(always)]
    fn into_field(self) -> Self::Field {
        self
    }

    #[inline(always)]
    fn from_field(field: Self::Field) -> Self {
        field
    }

    #[inline(always)]
    fn from_f64_lossy(value: f64) -> Self {
        value
    }
}

pub type Vector<T> = ndarray::Array1<T>;
pub type Matrix<T> = ndarray::Array2<T>;

pub(crate) fn to_na_matrix<T, S>(matrix: &ArrayBase<S, Ix2>) -> na::DMatrix<T::Field>
where
    T: KalmanFloat,
    S: Data<Elem = T>,
{
    let (nrows, ncols) = matrix.dim();
    na::DMatrix::from_fn(nrows, ncols, |i, j| matrix[[i, j]].into_field())
}

pub(crate) fn to_na_vector<T, S>(vector: &ArrayBase<S, Ix1>) -> na::DVector<T::Field>
where
    T: KalmanFloat,
    S: Data<Elem = T>,
{
    na::DVector::from_iterator(vector.len(), vector.iter().map(|x| x.into_field()))
}

pub(crate) fn from_na_matrix<T: KalmanFloat>(matrix: &na::DMatrix<T::Field>) -> Matrix<T> {
    Matrix::from_shape_fn(matrix.shape(), |(i, j)| T::from_field(matrix[(i, j)]))
}

pub(crate) fn from_na_vector<T: KalmanFloat>(vector: &na::DVector<T::Field>) -> Vector<T> {
    vector.iter().map(|&x| T::from_field(x)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use paste::paste;

    macro_rules! test_float_constants {
        ($name:ident: $ty:ty) => {
            paste! {
                #[test]
                fn [<$name _half_and_two_pi>]() {
                    assert_relative_eq!(<$ty>::half(), 0.5);
                    assert_relative_eq!(<$ty>::two_pi(), 2.0 * std::f64::consts::PI as $ty);
                }

                #[test]
                fn [<$name _from_f64_lossy>]() {
                    assert_relative_eq!(<$ty>::from_f64_lossy(1e-6), 1e-6);
                    assert_relative_eq!(<$ty>::from_f64_lossy(-3.25), -3.25);
                }
            }
        };
    }

    #[test]
    fn nalgebra_conversions_keep_row_major_order() {
        let matrix = ndarray::array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let converted = to_na_matrix(&matrix);
        assert_eq!(converted.shape(), (2, 3));
        assert_eq!(converted[(0, 2)], 3.0);
        assert_eq!(converted[(1, 0)], 4.0);
        assert_eq!(from_na_matrix::<f64>(&converted), matrix);

        let vector = ndarray::array![1.0_f32, -2.0];
        assert_eq!(from_na_vector::<f32>(&to_na_vector(&vector)), vector);
    }

    test_float_constants!(kalman_float_f32: f32);
    test_float_constants!(kalman_float_f64: f64);
}
