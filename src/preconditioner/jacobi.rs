// Jacobi preconditioner implementation

use crate::error::SolveError;
use crate::matrix::CsrMatrix;
use crate::preconditioner::Preconditioner;

/// Jacobi preconditioner: M⁻¹ = D⁻¹.
///
/// The assembled pressure matrix carries its accumulation term on the
/// diagonal, so diagonal scaling is a reasonable default for mildly
/// heterogeneous grids.
pub struct Jacobi {
    inv_diag: Vec<f64>,
}

impl Jacobi {
    /// Build from the matrix diagonal. A zero diagonal entry means the
    /// assembled system is singular in that cell and the factorization is
    /// refused.
    pub fn from_matrix(a: &CsrMatrix) -> Result<Self, SolveError> {
        let diag = a.diagonal();
        let mut inv_diag = Vec::with_capacity(diag.len());
        for (i, d) in diag.iter().enumerate() {
            if *d == 0.0 {
                return Err(SolveError::ZeroPivot(i));
            }
            inv_diag.push(1.0 / d);
        }
        Ok(Self { inv_diag })
    }
}

impl Preconditioner for Jacobi {
    fn apply(&self, r: &[f64], z: &mut [f64]) -> Result<(), SolveError> {
        if r.len() != self.inv_diag.len() {
            return Err(SolveError::Dimension(format!(
                "jacobi built for n = {}, applied to n = {}",
                self.inv_diag.len(),
                r.len()
            )));
        }
        for i in 0..r.len() {
            z[i] = self.inv_diag[i] * r[i];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CsrMatrix;

    #[test]
    fn scales_by_inverse_diagonal() {
        let a = CsrMatrix::from_triplets(2, &[(0, 0, 2.0), (0, 1, 1.0), (1, 1, 4.0)]);
        let pc = Jacobi::from_matrix(&a).unwrap();
        let r = vec![2.0, 8.0];
        let mut z = vec![0.0; 2];
        pc.apply(&r, &mut z).unwrap();
        assert_eq!(z, vec![1.0, 2.0]);
    }

    #[test]
    fn zero_diagonal_is_refused() {
        let a = CsrMatrix::from_triplets(2, &[(0, 0, 2.0), (1, 0, 1.0)]);
        match Jacobi::from_matrix(&a) {
            Err(SolveError::ZeroPivot(1)) => {}
            other => panic!("expected zero pivot at row 1, got {:?}", other.map(|_| ())),
        }
    }
}
