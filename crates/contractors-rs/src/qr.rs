//! Dense QR storage for the orthogonal preconditioner of one step.

use crate::linalg::{from_dmatrix, to_dmatrix};
use ndarray::{Array2, Zip};
use verode_core::{identity, norm_inf_bound, point_matrix, IMatrix, Interval, Result, VerodeError};

/// Factorization `A = QR`, orthogonal factor `Q` and its inverse for one step.
///
/// `inv` is the floating transpose of `Q`. Because a computed `Q` is only
/// orthogonal up to rounding, `inv_bounds` additionally holds an interval
/// matrix guaranteed to contain the exact inverse of the stored `Q`; the
/// affine delta recursion multiplies with `inv_bounds` to stay rigorous.
#[derive(Debug, Clone)]
pub struct QrDenseStorage {
    r: Array2<f64>,
    q: Array2<f64>,
    inv: Array2<f64>,
    inv_bounds: IMatrix,
}

impl QrDenseStorage {
    /// Identity preconditioner of dimension `n`
    pub fn new(n: usize) -> Self {
        Self {
            r: Array2::eye(n),
            q: Array2::eye(n),
            inv: Array2::eye(n),
            inv_bounds: identity(n),
        }
    }

    pub fn dim(&self) -> usize {
        self.q.nrows()
    }

    pub fn q(&self) -> &Array2<f64> {
        &self.q
    }

    pub fn inv(&self) -> &Array2<f64> {
        &self.inv
    }

    pub fn inv_bounds(&self) -> &IMatrix {
        &self.inv_bounds
    }

    /// Upper triangular factor matching the orientation of `q`
    pub fn r(&self) -> &Array2<f64> {
        &self.r
    }

    /// Factor `a` and store its orthogonal factor.
    ///
    /// Columns of `Q` are oriented so that `R` has a non-negative diagonal,
    /// which keeps the frame consistent from one step to the next.
    pub fn calculate_q(&mut self, a: &Array2<f64>) -> Result<()> {
        let n = self.dim();
        if a.nrows() != n || a.ncols() != n {
            return Err(VerodeError::DimensionMismatch {
                context: "QR input",
                expected: n,
                found: if a.nrows() != n { a.nrows() } else { a.ncols() },
            });
        }

        let qr = to_dmatrix(a).qr();
        let mut q = from_dmatrix(&qr.q());
        let mut r = from_dmatrix(&qr.r());
        // Flipping column j of Q and row j of R leaves QR unchanged
        for j in 0..n {
            if r[[j, j]] < 0.0 {
                q.column_mut(j).mapv_inplace(|v| -v);
                r.row_mut(j).mapv_inplace(|v| -v);
            }
        }

        self.q = q;
        self.r = r;
        Ok(())
    }

    /// Set `inv = Qᵀ` and bound the exact inverse.
    ///
    /// With `G = I - QᵀQ` and `‖G‖∞ ≤ ε < 1`, `Q⁻¹ = (I - G)⁻¹Qᵀ` differs
    /// from `Qᵀ` entrywise by at most `ε / (1 - ε) · ‖Qᵀ‖∞`.
    pub fn calculate_qinv(&mut self) -> Result<()> {
        let n = self.dim();
        self.inv.assign(&self.q.t());

        let q = point_matrix(&self.q);
        let qt = point_matrix(&self.inv);
        let residual = identity(n) - &qt.dot(&q);
        let eps = norm_inf_bound(&residual);
        if !(eps < 1.0) {
            return Err(VerodeError::SingularMatrix(format!(
                "orthogonal factor lost orthogonality (residual norm {eps:e})"
            )));
        }

        let eps = Interval::point(eps);
        let tail = eps / (Interval::ONE - eps) * Interval::point(norm_inf_bound(&qt));
        let pad = Interval::symmetric(tail.hi());
        Zip::from(&mut self.inv_bounds)
            .and(&self.inv)
            .for_each(|bound, &v| *bound = Interval::point(v) + pad);
        Ok(())
    }

    /// Reset to the identity preconditioner
    pub fn reinitialize(&mut self) {
        let n = self.dim();
        self.r = Array2::eye(n);
        self.q = Array2::eye(n);
        self.inv = Array2::eye(n);
        self.inv_bounds = identity(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use proptest::prelude::*;

    #[test]
    fn test_new_is_identity() {
        let qr = QrDenseStorage::new(3);
        assert_eq!(qr.q(), &Array2::<f64>::eye(3));
        assert_eq!(qr.inv(), &Array2::<f64>::eye(3));
    }

    #[test]
    fn test_qinv_is_transpose_and_inverse() {
        let mut qr = QrDenseStorage::new(2);
        qr.calculate_q(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        qr.calculate_qinv().unwrap();

        let prod = qr.inv().dot(qr.q());
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(prod[[i, j]], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_sign_convention_positive_r_diagonal() {
        let mut qr = QrDenseStorage::new(2);
        // A rotation is its own orthogonal factor under the convention
        let theta: f64 = 2.5;
        let rot = array![[theta.cos(), -theta.sin()], [theta.sin(), theta.cos()]];
        qr.calculate_q(&rot).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(qr.q()[[i, j]], rot[[i, j]], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_triangular_factor_matches_oriented_q() {
        let a = array![[-2.0, 1.0, 0.5], [1.0, -3.0, 2.0], [0.0, 1.0, -4.0]];
        let mut qr = QrDenseStorage::new(3);
        qr.calculate_q(&a).unwrap();

        let product = qr.q().dot(qr.r());
        for i in 0..3 {
            assert!(qr.r()[[i, i]] >= 0.0);
            for j in 0..3 {
                assert_relative_eq!(product[[i, j]], a[[i, j]], epsilon = 1e-12);
                if i > j {
                    assert_relative_eq!(qr.r()[[i, j]], 0.0, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_reinitialize() {
        let mut qr = QrDenseStorage::new(2);
        qr.calculate_q(&array![[0.0, 1.0], [1.0, 0.0]]).unwrap();
        qr.reinitialize();
        assert_eq!(qr.q(), &Array2::<f64>::eye(2));
        assert_eq!(qr.r(), &Array2::<f64>::eye(2));
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut qr = QrDenseStorage::new(2);
        assert!(qr.calculate_q(&Array2::eye(3)).is_err());
    }

    proptest! {
        #[test]
        fn prop_inverse_bounds_contain_transpose_product(
            entries in proptest::collection::vec(-10.0f64..10.0, 9),
        ) {
            let a = Array2::from_shape_vec((3, 3), entries).unwrap() + Array2::<f64>::eye(3) * 25.0;
            let mut qr = QrDenseStorage::new(3);
            qr.calculate_q(&a).unwrap();
            qr.calculate_qinv().unwrap();

            // inv_bounds · Q must contain the identity
            let prod = qr.inv_bounds().dot(&point_matrix(qr.q()));
            for i in 0..3 {
                for j in 0..3 {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    prop_assert!(prod[[i, j]].contains(expected));
                    prop_assert!((qr.inv().dot(qr.q())[[i, j]] - expected).abs() < 1e-12);
                }
            }
        }
    }
}
