//! Shared utilities

mod data_loader;

pub use data_loader::{sample_rows, save_csv, DataLoader};
