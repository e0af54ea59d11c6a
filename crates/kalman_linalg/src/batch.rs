//! Helpers for arrays where all leading axes are "batch" axes and only the
//! trailing one or two axes carry the vector or matrix being operated on.

use ndarray::{Array2, ArrayBase, ArrayD, ArrayView2, ArrayView3, Data, Dimension, ErrorKind, IxDyn, ShapeError};

use crate::KalmanFloat;

/// Collapse every leading axis of `array` into a single batch axis, keeping the
/// last `trailing` axes untouched.
///
/// The elements are copied in logical (row-major) order, so the result is in
/// standard layout whatever the layout of the input was.
///
/// # Errors
/// Returns an [`ErrorKind::IncompatibleShape`] error if `array` has fewer than
/// `trailing` axes.
///
/// # Example:
/// ```
/// use kalman_linalg::batch::collapse_batch;
/// use ndarray::{Array, IxDyn};
/// let batched = Array::<f64, _>::zeros(IxDyn(&[2, 3, 4, 4]));
/// let collapsed = collapse_batch(&batched, 2).unwrap();
/// assert_eq!(collapsed.shape(), &[6, 4, 4]);
/// ```
pub fn collapse_batch<T, S, D>(array: &ArrayBase<S, D>, trailing: usize) -> Result<ArrayD<T>, ShapeError>
where
    T: Clone,
    S: Data<Elem = T>,
    D: Dimension,
{
    let shape = array.shape();
    if shape.len() < trailing {
        return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape));
    }
    let split = shape.len() - trailing;
    let batch_size: usize = shape[..split].iter().product();

    let mut collapsed = Vec::with_capacity(trailing + 1);
    collapsed.push(batch_size);
    collapsed.extend_from_slice(&shape[split..]);

    ArrayD::from_shape_vec(IxDyn(&collapsed), array.iter().cloned().collect())
}

/// Batched matrix-vector product, `out[b] = matrices[b] · vectors[b]`.
///
/// # Panics
/// Panics if the batch sizes differ or the matrices' column count differs from
/// the vector length.
pub fn batch_mv<T: KalmanFloat>(matrices: ArrayView3<T>, vectors: ArrayView2<T>) -> Array2<T> {
    let (batch_size, rows, cols) = matrices.dim();
    assert_eq!(
        (batch_size, cols),
        vectors.dim(),
        "batch_mv: matrices of shape {:?} cannot multiply vectors of shape {:?}",
        matrices.shape(),
        vectors.shape()
    );

    let mut out = Array2::zeros((batch_size, rows));
    for ((mut out_row, matrix), vector) in out
        .outer_iter_mut()
        .zip(matrices.outer_iter())
        .zip(vectors.outer_iter())
    {
        out_row.assign(&matrix.dot(&vector));
    }
    out
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::{array, Array, Array3, Axis};
    use pretty_assertions::assert_eq;

    #[test]
    fn collapse_keeps_trailing_axes_and_order() {
        let batched = Array::from_shape_vec(IxDyn(&[2, 2, 3]), (0..12).collect()).unwrap();
        let collapsed = collapse_batch(&batched, 1).unwrap();
        assert_eq!(collapsed.shape(), &[4, 3]);
        assert_eq!(collapsed.iter().copied().collect::<Vec<_>>(), (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn collapse_with_no_batch_axes_adds_a_unit_axis() {
        let matrix = array![[1.0, 2.0], [3.0, 4.0]];
        let collapsed = collapse_batch(&matrix, 2).unwrap();
        assert_eq!(collapsed.shape(), &[1, 2, 2]);
    }

    #[test]
    fn collapse_of_a_transposed_view_follows_logical_order() {
        let matrix = array![[1, 2], [3, 4]];
        let collapsed = collapse_batch(&matrix.t(), 1).unwrap();
        assert_eq!(collapsed.iter().copied().collect::<Vec<_>>(), vec![1, 3, 2, 4]);
    }

    #[test]
    fn collapse_with_too_few_axes_fails() {
        let vector = array![1.0, 2.0];
        assert!(collapse_batch(&vector, 2).is_err());
    }

    #[test]
    fn batch_mv_matches_per_element_dot() {
        let matrices: Array3<f64> = array![[[1.0, 0.0], [2.0, 3.0]], [[4.0, 0.0], [-1.0, 0.5]]];
        let vectors = array![[1.0, 1.0], [2.0, -2.0]];
        let out = batch_mv(matrices.view(), vectors.view());
        for (b, row) in out.axis_iter(Axis(0)).enumerate() {
            let expected = matrices.index_axis(Axis(0), b).dot(&vectors.row(b));
            assert_eq!(row, expected);
        }
        assert_eq!(out, array![[1.0, 5.0], [8.0, -3.0]]);
    }

    #[test]
    #[should_panic(expected = "batch_mv")]
    fn batch_mv_with_mismatched_batches_panics() {
        let matrices = Array3::<f64>::zeros((2, 3, 3));
        let vectors = Array2::<f64>::zeros((3, 3));
        let _ = batch_mv(matrices.view(), vectors.view());
    }
}
