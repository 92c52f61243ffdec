//! Conversions between `ndarray` storage and `nalgebra` factorizations.

use nalgebra::DMatrix;
use ndarray::Array2;
use verode_core::{Result, VerodeError};

pub(crate) fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

pub(crate) fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Inverse of a square matrix through LU with partial pivoting
pub(crate) fn lu_inverse(a: &Array2<f64>) -> Result<Array2<f64>> {
    if a.nrows() != a.ncols() {
        return Err(VerodeError::DimensionMismatch {
            context: "LU inverse",
            expected: a.nrows(),
            found: a.ncols(),
        });
    }
    if a.iter().any(|v| !v.is_finite()) {
        return Err(VerodeError::SingularMatrix(
            "non-finite entries in preconditioner".into(),
        ));
    }
    let inv = to_dmatrix(a)
        .lu()
        .try_inverse()
        .ok_or_else(|| VerodeError::SingularMatrix("midpoint corrector Jacobian".into()))?;
    if inv.iter().any(|v| !v.is_finite()) {
        return Err(VerodeError::SingularMatrix(
            "midpoint corrector Jacobian is numerically singular".into(),
        ));
    }
    Ok(from_dmatrix(&inv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_lu_inverse() {
        let a = array![[4.0, 7.0], [2.0, 6.0]];
        let inv = lu_inverse(&a).unwrap();
        let prod = a.dot(&inv);
        assert_relative_eq!(prod[[0, 0]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(prod[[0, 1]], 0.0, epsilon = 1e-12);
        assert_relative_eq!(prod[[1, 1]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_lu_inverse_singular() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(matches!(lu_inverse(&a), Err(VerodeError::SingularMatrix(_))));
    }
}
