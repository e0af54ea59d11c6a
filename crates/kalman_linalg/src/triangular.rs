use ndarray::{ArrayBase, Data, Ix1, Ix2};

use crate::{from_na_vector, to_na_matrix, to_na_vector, KalmanFloat, Vector};

/// Solve `L·x = b` by forward substitution, where `L` is lower triangular.
///
/// Only the lower triangle of `l` is read. Returns `None` if `L` has a zero on
/// its diagonal, i.e. the system is singular.
///
/// # Panics
/// Panics if `l` is not square or its size differs from the length of `b`.
pub fn solve_lower_triangular<T, S1, S2>(l: &ArrayBase<S1, Ix2>, b: &ArrayBase<S2, Ix1>) -> Option<Vector<T>>
where
    T: KalmanFloat,
    S1: Data<Elem = T>,
    S2: Data<Elem = T>,
{
    let n = b.len();
    assert_eq!(l.dim(), (n, n), "solve_lower_triangular: dimension mismatch");

    let x = to_na_matrix(l).solve_lower_triangular(&to_na_vector(b))?;
    Some(from_na_vector(&x))
}

/// `Σ log Lᵢᵢ`, which is half the log-determinant of `L·Lᵗ`.
///
/// Summing logs of the diagonal avoids the overflow and underflow a
/// determinant of the full matrix runs into.
pub fn lower_log_diagonal_sum<T, S>(l: &ArrayBase<S, Ix2>) -> T
where
    T: KalmanFloat,
    S: Data<Elem = T>,
{
    l.diag().iter().map(|x| x.ln()).sum()
}
