//! Taylor-coefficient operator contract and a reference implementation for
//! linear, parameter-affine systems.

use crate::interval::{identity, point_matrix, IMatrix, IVector, Interval};
use crate::{Result, Time, VerodeError};
use ndarray::{Array1, Array2};

// ============================================================================
// OPERATOR CONTRACT
// ============================================================================

/// Producer of Taylor coefficients of the solution of `x' = f(x, p, t)`.
///
/// Coefficient `i` is the i-th derivative of the solution divided by `i!`,
/// evaluated (in interval arithmetic) over the given state and parameter
/// sets. Coefficient 0 is the state itself and coefficient 1 is `f`.
pub trait TaylorFunctor {
    /// State dimension
    fn state_dim(&self) -> usize;

    /// Parameter dimension
    fn param_dim(&self) -> usize;

    /// Fill `out[0..=order]` where `order = out.len() - 1`
    fn coefficients(&self, out: &mut [IVector], x: &IVector, p: &IVector, t: Time) -> Result<()>;

    /// Fill the Jacobians of each coefficient w.r.t. the state (`dx[i]`,
    /// n×n) and the parameters (`dp[i]`, n×np); `dx.len()` fixes the order
    fn jacobians(
        &self,
        dx: &mut [IMatrix],
        dp: &mut [IMatrix],
        x: &IVector,
        p: &IVector,
        t: Time,
    ) -> Result<()>;

    /// Preallocated coefficient buffer for the given order
    fn coefficient_buffer(&self, order: usize) -> Vec<IVector> {
        vec![Array1::from_elem(self.state_dim(), Interval::ZERO); order + 1]
    }

    /// Preallocated Jacobian buffers for the given order
    fn jacobian_buffers(&self, order: usize) -> (Vec<IMatrix>, Vec<IMatrix>) {
        let n = self.state_dim();
        let np = self.param_dim();
        (
            vec![Array2::from_elem((n, n), Interval::ZERO); order + 1],
            vec![Array2::from_elem((n, np), Interval::ZERO); order + 1],
        )
    }
}

// ============================================================================
// LINEAR PARAMETRIC SYSTEMS
// ============================================================================

/// `x' = (A + Σ_k p_k B_k) x + C p + c`
///
/// Entries of `A`, `B_k`, `C` and `c` may themselves be intervals, which
/// models uncertain but constant coefficients without declaring parameters.
#[derive(Debug, Clone)]
pub struct LinearOde {
    a: IMatrix,
    /// State coupling per parameter
    b: Vec<IMatrix>,
    /// Direct parameter input (n × np)
    c: IMatrix,
    forcing: IVector,
    np: usize,
}

impl LinearOde {
    /// Parameter-free system `x' = A x`
    pub fn new(a: IMatrix) -> Result<Self> {
        let n = square_dim(&a, "system matrix")?;
        Ok(Self {
            a,
            b: Vec::new(),
            c: Array2::from_elem((n, 0), Interval::ZERO),
            forcing: Array1::from_elem(n, Interval::ZERO),
            np: 0,
        })
    }

    pub fn from_matrix(a: Array2<f64>) -> Result<Self> {
        Self::new(point_matrix(&a))
    }

    /// Parametric system; `b` holds one n×n matrix per parameter and `c` is n×np
    pub fn parametric(a: IMatrix, b: Vec<IMatrix>, c: IMatrix) -> Result<Self> {
        let n = square_dim(&a, "system matrix")?;
        let np = c.ncols();
        if c.nrows() != n {
            return Err(VerodeError::DimensionMismatch {
                context: "parameter input rows",
                expected: n,
                found: c.nrows(),
            });
        }
        if !b.is_empty() && b.len() != np {
            return Err(VerodeError::DimensionMismatch {
                context: "parameter coupling count",
                expected: np,
                found: b.len(),
            });
        }
        for bk in &b {
            if square_dim(bk, "parameter coupling")? != n {
                return Err(VerodeError::DimensionMismatch {
                    context: "parameter coupling",
                    expected: n,
                    found: bk.nrows(),
                });
            }
        }
        Ok(Self {
            a,
            b,
            c,
            forcing: Array1::from_elem(n, Interval::ZERO),
            np,
        })
    }

    /// Add a constant forcing term `c`
    pub fn with_forcing(mut self, forcing: IVector) -> Result<Self> {
        if forcing.len() != self.a.nrows() {
            return Err(VerodeError::DimensionMismatch {
                context: "forcing",
                expected: self.a.nrows(),
                found: forcing.len(),
            });
        }
        self.forcing = forcing;
        Ok(self)
    }

    /// `A + Σ p_k B_k` over the parameter set
    fn system_matrix(&self, p: &IVector) -> IMatrix {
        let mut m = self.a.clone();
        for (bk, &pk) in self.b.iter().zip(p.iter()) {
            m += &(bk * pk);
        }
        m
    }

    fn check_inputs(&self, x: &IVector, p: &IVector) -> Result<()> {
        if x.len() != self.a.nrows() {
            return Err(VerodeError::DimensionMismatch {
                context: "state",
                expected: self.a.nrows(),
                found: x.len(),
            });
        }
        if p.len() != self.np {
            return Err(VerodeError::DimensionMismatch {
                context: "parameters",
                expected: self.np,
                found: p.len(),
            });
        }
        Ok(())
    }

    /// Fill `out` using an already assembled system matrix
    fn fill_coefficients(&self, m: &IMatrix, out: &mut [IVector], x: &IVector, p: &IVector) {
        out[0].clone_from(x);
        for i in 1..out.len() {
            let mut next = m.dot(&out[i - 1]);
            if i == 1 {
                next += &self.c.dot(p);
                next += &self.forcing;
            } else {
                next.mapv_inplace(|v| v / i as f64);
            }
            out[i] = next;
        }
    }
}

fn square_dim(m: &IMatrix, context: &'static str) -> Result<usize> {
    if m.nrows() != m.ncols() {
        return Err(VerodeError::DimensionMismatch {
            context,
            expected: m.nrows(),
            found: m.ncols(),
        });
    }
    Ok(m.nrows())
}

impl TaylorFunctor for LinearOde {
    fn state_dim(&self) -> usize {
        self.a.nrows()
    }

    fn param_dim(&self) -> usize {
        self.np
    }

    fn coefficients(&self, out: &mut [IVector], x: &IVector, p: &IVector, _t: Time) -> Result<()> {
        self.check_inputs(x, p)?;
        if out.is_empty() {
            return Ok(());
        }
        let m = self.system_matrix(p);
        self.fill_coefficients(&m, out, x, p);
        Ok(())
    }

    fn jacobians(
        &self,
        dx: &mut [IMatrix],
        dp: &mut [IMatrix],
        x: &IVector,
        p: &IVector,
        _t: Time,
    ) -> Result<()> {
        self.check_inputs(x, p)?;
        if dx.len() != dp.len() {
            return Err(VerodeError::DimensionMismatch {
                context: "jacobian buffers",
                expected: dx.len(),
                found: dp.len(),
            });
        }
        if dx.is_empty() {
            return Ok(());
        }
        let n = self.state_dim();
        let m = self.system_matrix(p);

        // x_i over the set, needed for the B_k x_i parameter terms
        let mut xs = self.coefficient_buffer(dx.len() - 1);
        self.fill_coefficients(&m, &mut xs, x, p);

        dx[0] = identity(n);
        dp[0] = Array2::from_elem((n, self.np), Interval::ZERO);
        for i in 1..dx.len() {
            let scale = i as f64;
            let mut jx = m.dot(&dx[i - 1]);
            jx.mapv_inplace(|v| v / scale);
            dx[i] = jx;

            let mut jp = m.dot(&dp[i - 1]);
            for (k, bk) in self.b.iter().enumerate() {
                let coupling = bk.dot(&xs[i - 1]);
                let mut column = jp.column_mut(k);
                column += &coupling;
            }
            if i == 1 {
                jp += &self.c;
            }
            jp.mapv_inplace(|v| v / scale);
            dp[i] = jp;
        }
        Ok(())
    }
}

// ============================================================================
// STANDARD TEST PROBLEMS
// ============================================================================

/// Exponential decay: dx/dt = -rate * x
pub fn exponential_decay(rate: f64) -> LinearOde {
    LinearOde::new(Array2::from_elem((1, 1), Interval::point(-rate)))
        .expect("1x1 system matrix is square")
}

/// Decay with an uncertain constant rate: dx/dt = a * x, a in [lo, hi]
pub fn uncertain_decay(lo: f64, hi: f64) -> Result<LinearOde> {
    LinearOde::new(Array2::from_elem((1, 1), Interval::try_new(lo, hi)?))
}

/// Parametric growth/decay: dx/dt = p * x
pub fn parametric_decay() -> LinearOde {
    LinearOde::parametric(
        Array2::from_elem((1, 1), Interval::ZERO),
        vec![Array2::from_elem((1, 1), Interval::ONE)],
        Array2::from_elem((1, 1), Interval::ZERO),
    )
    .expect("scalar parametric system is consistent")
}

/// Harmonic oscillator: x'' = -omega^2 x as a first-order system
pub fn harmonic_oscillator(omega: f64) -> LinearOde {
    LinearOde::from_matrix(ndarray::array![[0.0, 1.0], [-omega * omega, 0.0]])
        .expect("2x2 system matrix is square")
}

/// Damped oscillator with the damping coefficient as parameter:
/// x'' = -omega^2 x - p x'
pub fn damped_oscillator(omega: f64) -> LinearOde {
    let a = point_matrix(&ndarray::array![[0.0, 1.0], [-omega * omega, 0.0]]);
    let b = point_matrix(&ndarray::array![[0.0, 0.0], [0.0, -1.0]]);
    LinearOde::parametric(a, vec![b], Array2::from_elem((2, 1), Interval::ZERO))
        .expect("damped oscillator dimensions are consistent")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::point_vector;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_decay_coefficients_are_factorial_series() {
        let ode = exponential_decay(1.0);
        let mut out = ode.coefficient_buffer(4);
        let x = array![Interval::point(1.0)];
        ode.coefficients(&mut out, &x, &Array1::from_vec(vec![]), 0.0).unwrap();

        // x_i = (-1)^i / i!
        let expected = [1.0, -1.0, 0.5, -1.0 / 6.0, 1.0 / 24.0];
        for (c, e) in out.iter().zip(expected) {
            assert!(c[0].contains(e), "{} does not contain {}", c[0], e);
            assert!(c[0].width() < 1e-14);
        }
    }

    #[test]
    fn test_parametric_jacobians() {
        let ode = parametric_decay();
        let (mut dx, mut dp) = ode.jacobian_buffers(2);
        let x = array![Interval::point(2.0)];
        let p = array![Interval::point(-0.5)];
        ode.jacobians(&mut dx, &mut dp, &x, &p, 0.0).unwrap();

        // x_1 = p x, x_2 = p^2 x / 2
        assert_relative_eq!(dx[1][[0, 0]].mid(), -0.5, epsilon = 1e-14);
        assert_relative_eq!(dp[1][[0, 0]].mid(), 2.0, epsilon = 1e-14);
        assert_relative_eq!(dx[2][[0, 0]].mid(), 0.125, epsilon = 1e-14);
        // d/dp (p^2 x / 2) = p x
        assert_relative_eq!(dp[2][[0, 0]].mid(), -1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_oscillator_first_coefficient() {
        let ode = harmonic_oscillator(2.0);
        let mut out = ode.coefficient_buffer(1);
        let x = point_vector(&array![1.0, 0.0]);
        ode.coefficients(&mut out, &x, &Array1::from_vec(vec![]), 0.0).unwrap();
        assert!(out[1][0].contains(0.0));
        assert!(out[1][1].contains(-4.0));
    }

    #[test]
    fn test_dimension_checks() {
        let ode = damped_oscillator(1.0);
        let mut out = ode.coefficient_buffer(2);
        let x = point_vector(&array![1.0, 0.0]);
        let err = ode.coefficients(&mut out, &x, &Array1::from_vec(vec![]), 0.0);
        assert!(matches!(err, Err(VerodeError::DimensionMismatch { .. })));

        let bad = LinearOde::from_matrix(array![[1.0, 2.0]]);
        assert!(bad.is_err());
    }
}
