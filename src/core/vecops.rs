//! Dense vector operations, with optional Rayon parallelism.
//!
//! The iterative solvers spend most of their time in dot products, norms and
//! axpy updates over plain slices. When the `rayon` feature is enabled the
//! reductions run on the global thread pool; otherwise they fall back to
//! sequential folds.

use num_traits::Float;

/// Computes the dot product `x^T y`.
pub fn dot<T: Float + Send + Sync>(x: &[T], y: &[T]) -> T {
    assert_eq!(x.len(), y.len(), "vectors must have the same length");
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        x.par_iter()
            .zip(y.par_iter())
            .map(|(xi, yi)| *xi * *yi)
            .reduce(|| T::zero(), |acc, v| acc + v)
    }
    #[cfg(not(feature = "rayon"))]
    {
        x.iter()
            .zip(y.iter())
            .map(|(xi, yi)| *xi * *yi)
            .fold(T::zero(), |acc, v| acc + v)
    }
}

/// Computes the Euclidean norm `‖x‖₂`.
pub fn norm<T: Float + Send + Sync>(x: &[T]) -> T {
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        x.par_iter()
            .map(|xi| *xi * *xi)
            .reduce(|| T::zero(), |acc, v| acc + v)
            .sqrt()
    }
    #[cfg(not(feature = "rayon"))]
    {
        x.iter()
            .map(|xi| *xi * *xi)
            .fold(T::zero(), |acc, v| acc + v)
            .sqrt()
    }
}

/// In-place update `y ← y + alpha · x`.
pub fn axpy<T: Float>(alpha: T, x: &[T], y: &mut [T]) {
    assert_eq!(x.len(), y.len(), "vectors must have the same length");
    for (yi, xi) in y.iter_mut().zip(x.iter()) {
        *yi = *yi + alpha * *xi;
    }
}
