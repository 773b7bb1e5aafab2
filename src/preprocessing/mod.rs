//! Data preprocessing: the fitted transform between raw log tables and
//! the fixed-width feature matrix.
//!
//! - Missing value imputation (median for numeric, sentinel constant for
//!   categorical)
//! - Standard scaling for numeric fields
//! - Ordinal encoding with a reserved unknown code for categorical fields
//! - Dense or CSR output

mod encoder;
mod imputer;
mod matrix;
mod preprocessor;
mod scaler;

pub use encoder::{OrdinalEncoder, UNKNOWN_CODE};
pub use imputer::{ImputeStrategy, Imputer};
pub use matrix::{CsrMatrix, FeatureMatrix};
pub use preprocessor::{Preprocessor, PreprocessorConfig, MISSING_CATEGORY};
pub use scaler::{Scaler, ScalerType};
