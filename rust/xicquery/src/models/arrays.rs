use crate::errors::{
    DataProcessingError,
    Result,
};

/// Simple row-major 2D array.
///
/// `values` is a flattened array of values,
/// `major_dim` is the number of values in each row and
/// `minor_dim` is the number of rows.
///
/// Values that belong to the same row are adjacent in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Array2D<T: Clone + Copy> {
    pub(crate) values: Vec<T>,
    pub(crate) major_dim: usize,
    pub(crate) minor_dim: usize,
}

impl<T: Clone + Copy> Array2D<T> {
    pub fn new<S: AsRef<[T]>, C: AsRef<[S]>>(values: C) -> Result<Array2D<T>> {
        let nrows = values.as_ref().len();
        if nrows == 0 {
            return Err(DataProcessingError::ExpectedNonEmptyData.into());
        }
        let ncols = values.as_ref()[0].as_ref().len();
        let expected_size = nrows * ncols;
        let values: Vec<T> = values
            .as_ref()
            .iter()
            .flat_map(|x| x.as_ref())
            .cloned()
            .collect();

        if values.len() != expected_size {
            return Err(DataProcessingError::ExpectedVectorSameLength.into());
        }

        Ok(Array2D {
            values,
            major_dim: ncols,
            minor_dim: nrows,
        })
    }

    pub fn from_flat_vector(values: Vec<T>, nrows: usize, ncols: usize) -> Result<Array2D<T>> {
        if values.len() != nrows * ncols {
            return Err(DataProcessingError::ExpectedVectorLength {
                real: values.len(),
                expected: nrows * ncols,
            }
            .into());
        }
        Ok(Array2D {
            values,
            major_dim: ncols,
            minor_dim: nrows,
        })
    }

    pub fn filled(nrows: usize, ncols: usize, value: T) -> Array2D<T> {
        Array2D {
            values: vec![value; nrows * ncols],
            major_dim: ncols,
            minor_dim: nrows,
        }
    }

    /// Apply a function to each row of the array
    ///
    /// Example:
    /// ```
    /// use xicquery::Array2D;
    /// let array = Array2D::new(vec![vec![1, 2, 3], vec![4, 5, 6]]).unwrap();
    /// let result: Vec<u32> = array.row_apply(|x| x.iter().sum()).collect();
    /// assert_eq!(result, vec![6, 15]);
    /// ```
    pub fn row_apply<'a: 'b, 'b, W, F: FnMut(&[T]) -> W + 'b>(
        &'a self,
        f: F,
    ) -> impl Iterator<Item = W> + 'b {
        self.values.chunks(self.major_dim.max(1)).map(f)
    }

    pub fn get(&self, row_idx: usize, col_idx: usize) -> Option<T> {
        if row_idx >= self.minor_dim || col_idx >= self.major_dim {
            return None;
        }
        Some(self.values[row_idx * self.major_dim + col_idx])
    }

    pub fn insert(&mut self, row_idx: usize, col_idx: usize, value: T) {
        let idx = row_idx * self.major_dim + col_idx;
        self.values[idx] = value;
    }

    pub fn get_row(&self, index: usize) -> Option<&[T]> {
        let start = index * self.major_dim;
        let end = start + self.major_dim;
        if end > self.values.len() || index >= self.minor_dim {
            return None;
        }
        Some(&self.values[start..end])
    }

    pub fn nrows(&self) -> usize {
        self.minor_dim
    }

    pub fn ncols(&self) -> usize {
        self.major_dim
    }

    pub fn as_flat(&self) -> &[T] {
        &self.values
    }
}

/// Dense row-major (query × ion × cycle) tensor.
///
/// The innermost axis is contiguous, so `trace(q, ion)` is a plain slice.
#[derive(Debug, Clone, PartialEq)]
pub struct Array3<T: Clone + Copy> {
    values: Vec<T>,
    dims: [usize; 3],
}

impl<T: Clone + Copy> Array3<T> {
    pub fn filled(dims: [usize; 3], value: T) -> Self {
        Self {
            values: vec![value; dims[0] * dims[1] * dims[2]],
            dims,
        }
    }

    pub fn from_flat_vector(values: Vec<T>, dims: [usize; 3]) -> Result<Self> {
        let expected = dims[0] * dims[1] * dims[2];
        if values.len() != expected {
            return Err(DataProcessingError::ExpectedVectorLength {
                real: values.len(),
                expected,
            }
            .into());
        }
        Ok(Self { values, dims })
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn num_queries(&self) -> usize {
        self.dims[0]
    }

    pub fn num_ions(&self) -> usize {
        self.dims[1]
    }

    pub fn trace_len(&self) -> usize {
        self.dims[2]
    }

    pub fn get(&self, query: usize, ion: usize, cycle: usize) -> T {
        self.values[self.offset(query, ion) + cycle]
    }

    pub fn trace(&self, query: usize, ion: usize) -> &[T] {
        let start = self.offset(query, ion);
        &self.values[start..start + self.dims[2]]
    }

    pub fn as_flat(&self) -> &[T] {
        &self.values
    }

    pub fn as_flat_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Copy keeping only the given ion columns, in the given order.
    pub fn select_ions(&self, columns: &[usize]) -> Result<Self> {
        if let Some(&bad) = columns.iter().find(|&&c| c >= self.dims[1]) {
            return Err(DataProcessingError::IndexOutOfBoundsError(bad).into());
        }
        let mut values = Vec::with_capacity(self.dims[0] * columns.len() * self.dims[2]);
        for query in 0..self.dims[0] {
            for &ion in columns {
                values.extend_from_slice(self.trace(query, ion));
            }
        }
        Ok(Self {
            values,
            dims: [self.dims[0], columns.len(), self.dims[2]],
        })
    }

    #[inline]
    fn offset(&self, query: usize, ion: usize) -> usize {
        debug_assert!(query < self.dims[0] && ion < self.dims[1]);
        (query * self.dims[1] + ion) * self.dims[2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array2d_new() -> Result<()> {
        let values = vec![vec![1, 2, 3], vec![4, 5, 6]];
        let array = Array2D::new(&values)?;

        assert_eq!(array.ncols(), 3);
        assert_eq!(array.nrows(), 2);
        // Values in the same row are adjacent
        assert_eq!(array.as_flat(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(array.get(1, 0), Some(4));
        assert_eq!(array.get(2, 0), None);

        Ok(())
    }

    #[test]
    fn test_array2d_error_handling() {
        let invalid_values = vec![vec![1, 2, 3], vec![4, 5]];
        assert!(Array2D::new(&invalid_values).is_err());

        let empty_values: Vec<Vec<i32>> = vec![];
        assert!(Array2D::new(&empty_values).is_err());

        assert!(Array2D::from_flat_vector(vec![1, 2, 3], 2, 2).is_err());
    }

    #[test]
    fn test_insertion() {
        let mut array = Array2D::new(vec![vec![1, 2, 3], vec![4, 5, 6]]).unwrap();
        array.insert(0, 0, 7);
        array.insert(1, 2, 8);
        assert_eq!(array.get_row(0), Some([7, 2, 3].as_ref()));
        assert_eq!(array.get_row(1), Some([4, 5, 8].as_ref()));
        assert_eq!(array.get_row(2), None);
    }

    #[test]
    fn test_array3_layout() -> Result<()> {
        let values: Vec<u32> = (0..24).collect();
        let array = Array3::from_flat_vector(values, [2, 3, 4])?;
        assert_eq!(array.trace(0, 0), &[0, 1, 2, 3]);
        assert_eq!(array.trace(1, 2), &[20, 21, 22, 23]);
        assert_eq!(array.get(1, 0, 1), 13);
        assert_eq!(array.trace_len(), 4);
        Ok(())
    }

    #[test]
    fn test_array3_select_ions() -> Result<()> {
        let values: Vec<u32> = (0..12).collect();
        let array = Array3::from_flat_vector(values, [2, 3, 2])?;
        let picked = array.select_ions(&[2, 0])?;
        assert_eq!(picked.dims(), [2, 2, 2]);
        assert_eq!(picked.as_flat(), &[4, 5, 0, 1, 10, 11, 6, 7]);
        assert!(array.select_ions(&[3]).is_err());
        Ok(())
    }

    #[test]
    fn test_array3_shape_mismatch() {
        assert!(Array3::from_flat_vector(vec![0.0f32; 5], [1, 2, 3]).is_err());
    }
}
