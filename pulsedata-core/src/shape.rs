//! Shape normalization of retrieved arrays.

use ndarray::{ArrayD, Axis};

/// Collapses column vectors.
///
/// Scalars stored as `(n, 1)` arrays come back as `(n,)`; every other shape is
/// returned unchanged.
#[must_use]
pub fn normalize<T>(array: ArrayD<T>) -> ArrayD<T> {
    if array.ndim() == 2 && array.shape()[1] == 1 {
        array.index_axis_move(Axis(1), 0)
    } else {
        array
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array3};

    #[test]
    fn column_vector_becomes_line_vector() {
        let column = arr2(&[[6.7], [8.9], [0.1]]).into_dyn();
        assert_eq!(normalize(column), arr1(&[6.7, 8.9, 0.1]).into_dyn());
    }

    #[test]
    fn empty_column_vector_keeps_rank_one() {
        let column = ArrayD::<f64>::zeros(vec![0, 1]);
        assert_eq!(normalize(column).shape(), &[0]);
    }

    #[test]
    fn other_shapes_are_untouched() {
        let line = arr1(&[1, 2, 3]).into_dyn();
        assert_eq!(normalize(line.clone()), line);

        let rows = arr2(&[[1, 2], [3, 4]]).into_dyn();
        assert_eq!(normalize(rows.clone()), rows);

        let cube = Array3::<u8>::zeros((2, 1, 1)).into_dyn();
        assert_eq!(normalize(cube).shape(), &[2, 1, 1]);
    }
}
