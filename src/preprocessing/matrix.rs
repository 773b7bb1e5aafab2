//! Feature matrix representations

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Compressed sparse row matrix. Only non-zero entries are stored; a
/// standardized ordinal matrix is often dominated by zeros (imputed
/// defaults, sentinel codes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    nrows: usize,
    ncols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    pub fn from_dense(dense: &Array2<f64>) -> Self {
        let (nrows, ncols) = dense.dim();
        let mut indptr = Vec::with_capacity(nrows + 1);
        let mut indices = Vec::new();
        let mut values = Vec::new();

        indptr.push(0);
        for row in dense.rows() {
            for (j, &v) in row.iter().enumerate() {
                if v != 0.0 {
                    indices.push(j);
                    values.push(v);
                }
            }
            indptr.push(indices.len());
        }

        Self {
            nrows,
            ncols,
            indptr,
            indices,
            values,
        }
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.nrows, self.ncols));
        for i in 0..self.nrows {
            for k in self.indptr[i]..self.indptr[i + 1] {
                dense[[i, self.indices[k]]] = self.values[k];
            }
        }
        dense
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }
}

/// Output of the preprocessor: rows preserved, columns in schema order
/// (numeric block first, then categorical block). Detectors accept either
/// representation and densify on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FeatureMatrix {
    Dense(Array2<f64>),
    Sparse(CsrMatrix),
}

impl FeatureMatrix {
    pub fn nrows(&self) -> usize {
        match self {
            FeatureMatrix::Dense(m) => m.nrows(),
            FeatureMatrix::Sparse(m) => m.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            FeatureMatrix::Dense(m) => m.ncols(),
            FeatureMatrix::Sparse(m) => m.ncols(),
        }
    }

    /// Dense view, materializing the sparse form only when needed
    pub fn dense(&self) -> Cow<'_, Array2<f64>> {
        match self {
            FeatureMatrix::Dense(m) => Cow::Borrowed(m),
            FeatureMatrix::Sparse(m) => Cow::Owned(m.to_dense()),
        }
    }

    pub fn into_dense(self) -> Array2<f64> {
        match self {
            FeatureMatrix::Dense(m) => m,
            FeatureMatrix::Sparse(m) => m.to_dense(),
        }
    }
}

impl From<Array2<f64>> for FeatureMatrix {
    fn from(m: Array2<f64>) -> Self {
        FeatureMatrix::Dense(m)
    }
}
