//! Sparse matrix storage for the assembled pressure systems.

pub mod sparse;
pub use sparse::CsrMatrix;
