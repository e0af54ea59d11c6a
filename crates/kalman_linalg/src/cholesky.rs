//! Cholesky factorisation of small symmetric positive semi-definite matrices.

use nalgebra as na;
use ndarray::{ArrayBase, Data, Ix2};

use crate::{from_na_matrix, to_na_matrix, KalmanFloat, Matrix};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CholeskyError {
    #[error("the matrix is not square, it has shape {0}x{1}")]
    NotSquare(usize, usize),
    #[error("the matrix contains non-finite entries")]
    NonFinite,
    #[error("the matrix has a negative eigenvalue, so it is not positive semi-definite")]
    NotPositiveSemiDefinite,
}

pub type Result<T> = std::result::Result<T, CholeskyError>;

/// Extension trait for factorising a covariance matrix `A` into `L·Lᵗ` where
/// `L` is lower triangular.
pub trait Cholesky {
    type Scalar: KalmanFloat;

    /// Compute the lower triangular factor `L` with `L·Lᵗ = self`.
    ///
    /// Only the lower triangle of `self` is read. The factorisation tolerates
    /// positive *semi*-definite input: an eigenvalue no further below zero than
    /// `tolerance` (relative to the largest diagonal entry) is accepted, and a
    /// pivot `Lᵢᵢ²` below that same bound is set to an exact zero.
    ///
    /// # Errors
    /// - [`CholeskyError::NotSquare`] if the matrix is not square
    /// - [`CholeskyError::NonFinite`] if any entry is NaN or infinite
    /// - [`CholeskyError::NotPositiveSemiDefinite`] if an eigenvalue is negative
    ///   beyond `tolerance`
    ///
    /// # Example:
    /// ```
    /// use kalman_linalg::Cholesky;
    /// use ndarray::array;
    /// let a = array![[4.0, 2.0], [2.0, 10.0]];
    /// let l = a.cholesky_lower(1e-10).unwrap();
    /// assert_eq!(l, array![[2.0, 0.0], [1.0, 3.0]]);
    /// ```
    fn cholesky_lower(&self, tolerance: Self::Scalar) -> Result<Matrix<Self::Scalar>>;

    /// Whether `|a_ij - a_ji| <= tolerance · max|a|` for every entry.
    /// A non-square matrix is never symmetric.
    fn is_symmetric(&self, tolerance: Self::Scalar) -> bool;
}

impl<T, S> Cholesky for ArrayBase<S, Ix2>
where
    T: KalmanFloat,
    S: Data<Elem = T>,
{
    type Scalar = T;

    fn cholesky_lower(&self, tolerance: T) -> Result<Matrix<T>> {
        let (n, m) = self.dim();
        if n != m {
            return Err(CholeskyError::NotSquare(n, m));
        }
        if self.iter().any(|x| !x.is_finite()) {
            return Err(CholeskyError::NonFinite);
        }

        let scale = self.diag().iter().fold(T::zero(), |acc, &x| acc.max(x.abs()));
        let threshold = tolerance * scale;
        let a = to_na_matrix(self);

        let factor = match na::Cholesky::new(a.clone()) {
            Some(factor) => factor,
            None => {
                // a zero or negative pivot, decide from the spectrum whether it is rounding
                let eigenvalues = na::SymmetricEigen::new(a.clone()).eigenvalues;
                if eigenvalues.iter().any(|&e| T::from_field(e) < -threshold) {
                    return Err(CholeskyError::NotPositiveSemiDefinite);
                }
                na::Cholesky::new_with_substitute(a, T::zero().into_field())
                    .ok_or(CholeskyError::NotPositiveSemiDefinite)?
            }
        };

        let mut l: Matrix<T> = from_na_matrix(&factor.l());
        l.diag_mut()
            .mapv_inplace(|d| if d * d <= threshold { T::zero() } else { d });

        tracing::trace!("cholesky factorised a {n}x{n} matrix");
        Ok(l)
    }

    fn is_symmetric(&self, tolerance: T) -> bool {
        let (n, m) = self.dim();
        if n != m {
            return false;
        }
        let max_abs = self.iter().fold(T::zero(), |acc, &x| acc.max(x.abs()));
        let threshold = tolerance * max_abs;
        (0..n).all(|i| (0..i).all(|j| (self[[i, j]] - self[[j, i]]).abs() <= threshold))
    }
}
