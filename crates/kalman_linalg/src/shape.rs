//! Shape arithmetic for batched arrays.

/// Broadcast two shapes together using numpy rules: shapes are aligned on
/// their trailing axis, and an axis of size 1 stretches to match the other.
///
/// Returns `None` if the shapes are incompatible.
///
/// # Example:
/// ```
/// use kalman_linalg::shape::broadcast_shapes;
/// assert_eq!(broadcast_shapes(&[3, 1], &[4]), Some(vec![3, 4]));
/// assert_eq!(broadcast_shapes(&[], &[2, 5]), Some(vec![2, 5]));
/// assert_eq!(broadcast_shapes(&[3], &[4]), None);
/// ```
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let ndim = a.len().max(b.len());
    let mut shape = vec![0; ndim];
    for (axis, out) in shape.iter_mut().enumerate() {
        // read both shapes right-aligned, missing leading axes count as 1
        let pick = |s: &[usize]| {
            (axis + s.len())
                .checked_sub(ndim)
                .map_or(1, |i| s[i])
        };
        *out = match (pick(a), pick(b)) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return None,
        };
    }
    Some(shape)
}

/// Convert a flat, row-major offset into a multi-index over `shape`.
///
/// # Example:
/// ```
/// use kalman_linalg::shape::unravel_index;
/// assert_eq!(unravel_index(5, &[2, 3]), vec![1, 2]);
/// assert_eq!(unravel_index(0, &[]), Vec::<usize>::new());
/// ```
pub fn unravel_index(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0; shape.len()];
    for (i, &len) in shape.iter().enumerate().rev() {
        if len == 0 {
            continue;
        }
        index[i] = flat % len;
        flat /= len;
    }
    index
}
