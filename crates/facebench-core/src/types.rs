use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeatureError {
    #[error("feature dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("cannot extract features from an empty image")]
    EmptyImage,
    #[error("feature vector is empty")]
    EmptyVector,
}

/// Fixed-length feature vector produced by an extractor (and optional filter).
///
/// Immutable once built; filters consume one vector and return a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn view(&self) -> ArrayView1<'_, f32> {
        ArrayView1::from(&self.0[..])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Row-major growable matrix of feature vectors.
///
/// The column count is fixed by the first inserted row; later rows of any
/// other length are rejected.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    data: Array2<f32>,
    cols: Option<usize>,
    capacity_hint: usize,
}

impl FeatureMatrix {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Matrix expecting roughly `rows` rows. Storage is reserved once the
    /// first row fixes the dimension; pushing past the hint still works.
    pub fn with_capacity(rows: usize) -> Self {
        Self {
            data: Array2::zeros((0, 0)),
            cols: None,
            capacity_hint: rows,
        }
    }

    pub fn push(&mut self, row: &FeatureVector) -> Result<(), FeatureError> {
        if row.is_empty() {
            return Err(FeatureError::EmptyVector);
        }
        match self.cols {
            Some(cols) if cols != row.len() => {
                return Err(FeatureError::DimensionMismatch {
                    expected: cols,
                    actual: row.len(),
                });
            }
            Some(_) => {}
            None => {
                let mut data = Array2::<f32>::zeros((0, row.len()));
                // Reservation is advisory: a hint too large to allocate just
                // falls back to growing on demand.
                if data.reserve_rows(self.capacity_hint).is_err() {
                    tracing::debug!(hint = self.capacity_hint, "feature matrix reservation skipped");
                }
                self.data = data;
                self.cols = Some(row.len());
            }
        }
        self.data
            .push_row(row.view())
            .map_err(|_| FeatureError::DimensionMismatch {
                expected: self.data.ncols(),
                actual: row.len(),
            })
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Column count, or 0 before the first row.
    pub fn cols(&self) -> usize {
        self.cols.unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    pub fn row(&self, index: usize) -> Option<ArrayView1<'_, f32>> {
        (index < self.rows()).then(|| self.data.index_axis(Axis(0), index))
    }

    /// Row `index` as a contiguous slice; rows are appended in standard layout.
    pub fn row_slice(&self, index: usize) -> Option<&[f32]> {
        self.row(index).and_then(|r| r.to_slice())
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }
}

impl Default for FeatureMatrix {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(values: &[f32]) -> FeatureVector {
        FeatureVector::new(values.to_vec())
    }

    #[test]
    fn test_matrix_dimension_fixed_by_first_row() {
        let mut m = FeatureMatrix::with_capacity(4);
        assert_eq!(m.cols(), 0);
        m.push(&fv(&[1.0, 2.0, 3.0])).unwrap();
        m.push(&fv(&[4.0, 5.0, 6.0])).unwrap();
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 3);
        assert_eq!(m.view()[[1, 2]], 6.0);
    }

    #[test]
    fn test_matrix_rejects_mismatched_row() {
        let mut m = FeatureMatrix::new();
        m.push(&fv(&[1.0, 2.0])).unwrap();
        let err = m.push(&fv(&[1.0, 2.0, 3.0])).unwrap_err();
        assert_eq!(err, FeatureError::DimensionMismatch { expected: 2, actual: 3 });
        assert_eq!(m.rows(), 1);
    }

    #[test]
    fn test_matrix_rejects_empty_row() {
        let mut m = FeatureMatrix::new();
        assert_eq!(m.push(&fv(&[])), Err(FeatureError::EmptyVector));
        assert!(m.is_empty());
    }

    #[test]
    fn test_matrix_grows_past_hint() {
        let mut m = FeatureMatrix::with_capacity(1);
        for i in 0..5 {
            m.push(&fv(&[i as f32])).unwrap();
        }
        assert_eq!(m.rows(), 5);
        assert_eq!(m.row(4).unwrap()[0], 4.0);
        assert!(m.row(5).is_none());
    }

    #[test]
    fn test_row_slice_borrows_rows() {
        let mut m = FeatureMatrix::new();
        m.push(&fv(&[1.0, 2.0])).unwrap();
        m.push(&fv(&[3.0, 4.0])).unwrap();
        assert_eq!(m.row_slice(1), Some(&[3.0, 4.0][..]));
        assert_eq!(m.row_slice(2), None);
    }
}
