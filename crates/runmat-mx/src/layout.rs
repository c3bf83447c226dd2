//! Memory layout helpers.
//!
//! Foreign storage is always column-major. Host arrays may be either, so
//! every conversion goes through logical multi-indices: element
//! `(i1, ..., iN)` lands on the same multi-index on the other side no matter
//! how either side linearises it.

/// Linearisation order of an N-D buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Last index varies fastest (C, NumPy default).
    RowMajor,
    /// First index varies fastest (Fortran, MATLAB).
    #[default]
    ColumnMajor,
}

/// Number of elements described by `shape`, or `None` on overflow.
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// Pad a shape to at least two dimensions: `[]` becomes `[1, 1]` and `[n]`
/// becomes `[n, 1]`. Trailing singletons of longer shapes are kept.
pub fn normalize_shape(shape: &[usize]) -> Vec<usize> {
    match shape.len() {
        0 => vec![1, 1],
        1 => vec![shape[0], 1],
        _ => shape.to_vec(),
    }
}

/// Element strides for `shape` under `order`.
pub fn strides(shape: &[usize], order: Order) -> Vec<usize> {
    let mut out = vec![0usize; shape.len()];
    let mut acc = 1usize;
    match order {
        Order::ColumnMajor => {
            for (i, &d) in shape.iter().enumerate() {
                out[i] = acc;
                acc = acc.saturating_mul(d);
            }
        }
        Order::RowMajor => {
            for (i, &d) in shape.iter().enumerate().rev() {
                out[i] = acc;
                acc = acc.saturating_mul(d);
            }
        }
    }
    out
}

/// Linear offset of the zero-based multi-index `subs`.
///
/// Missing trailing subscripts are treated as zero; extra subscripts must be
/// zero. Returns `None` when any subscript is out of range.
pub fn linear_index(shape: &[usize], subs: &[usize], order: Order) -> Option<usize> {
    let strides = strides(shape, order);
    let mut offset = 0usize;
    for (axis, &s) in subs.iter().enumerate() {
        match shape.get(axis) {
            Some(&d) if s < d => offset += s * strides[axis],
            Some(_) => return None,
            None if s == 0 => {}
            None => return None,
        }
    }
    if shape.iter().any(|&d| d == 0) {
        return None;
    }
    Some(offset)
}

/// Copy `src`, laid out as `shape` in `from` order, into a new buffer laid
/// out in `to` order.
pub fn reorder<T: Clone>(src: &[T], shape: &[usize], from: Order, to: Order) -> Vec<T> {
    if from == to || shape.iter().filter(|&&d| d > 1).count() <= 1 {
        return src.to_vec();
    }
    let src_strides = strides(shape, from);
    let total = src.len();
    let mut out = Vec::with_capacity(total);
    let mut subs = vec![0usize; shape.len()];
    for _ in 0..total {
        let offset: usize = subs.iter().zip(&src_strides).map(|(s, st)| s * st).sum();
        out.push(src[offset].clone());
        advance(&mut subs, shape, to);
    }
    out
}

/// Step `subs` to the next multi-index in `order`.
pub(crate) fn advance(subs: &mut [usize], shape: &[usize], order: Order) {
    match order {
        Order::ColumnMajor => {
            for axis in 0..subs.len() {
                subs[axis] += 1;
                if subs[axis] < shape[axis] {
                    return;
                }
                subs[axis] = 0;
            }
        }
        Order::RowMajor => {
            for axis in (0..subs.len()).rev() {
                subs[axis] += 1;
                if subs[axis] < shape[axis] {
                    return;
                }
                subs[axis] = 0;
            }
        }
    }
}

/// Number of dimensions larger than one.
pub fn non_singleton_dims(shape: &[usize]) -> usize {
    shape.iter().filter(|&&d| d != 1).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_by_order() {
        assert_eq!(strides(&[2, 3, 4], Order::ColumnMajor), vec![1, 2, 6]);
        assert_eq!(strides(&[2, 3, 4], Order::RowMajor), vec![12, 4, 1]);
    }

    #[test]
    fn reorder_2d() {
        // 2x3 row-major [[1,2,3],[4,5,6]]
        let row = vec![1, 2, 3, 4, 5, 6];
        let col = reorder(&row, &[2, 3], Order::RowMajor, Order::ColumnMajor);
        assert_eq!(col, vec![1, 4, 2, 5, 3, 6]);
        let back = reorder(&col, &[2, 3], Order::ColumnMajor, Order::RowMajor);
        assert_eq!(back, row);
    }

    #[test]
    fn reorder_3d_matches_linear_index() {
        let shape = [2, 3, 4];
        let row: Vec<usize> = (0..24).collect();
        let col = reorder(&row, &shape, Order::RowMajor, Order::ColumnMajor);
        for i in 0..2 {
            for j in 0..3 {
                for k in 0..4 {
                    let r = linear_index(&shape, &[i, j, k], Order::RowMajor).unwrap();
                    let c = linear_index(&shape, &[i, j, k], Order::ColumnMajor).unwrap();
                    assert_eq!(row[r], col[c]);
                }
            }
        }
    }

    #[test]
    fn normalize_pads_low_rank() {
        assert_eq!(normalize_shape(&[]), vec![1, 1]);
        assert_eq!(normalize_shape(&[5]), vec![5, 1]);
        assert_eq!(normalize_shape(&[2, 3, 1]), vec![2, 3, 1]);
    }

    #[test]
    fn linear_index_bounds() {
        assert_eq!(linear_index(&[2, 2], &[1, 1], Order::ColumnMajor), Some(3));
        assert_eq!(linear_index(&[2, 2], &[2, 0], Order::ColumnMajor), None);
        assert_eq!(linear_index(&[2, 2], &[1, 0, 0], Order::ColumnMajor), Some(1));
        assert_eq!(element_count(&[usize::MAX, 2]), None);
    }
}
