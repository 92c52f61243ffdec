//! Hermite–Obreschkoff predictor/corrector contractor.

use crate::linalg::lu_inverse;
use crate::propagation::{
    affine_delta, affine_enclosure, check_storage, commit, step_powers, tighten, weighted_matrix_sum,
    weighted_sum,
};
use crate::qr::QrDenseStorage;
use crate::storage::{ContractorStorage, StepResult, StepStatus};
use crate::StateContractor;
use log::debug;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use verode_core::{
    hull_vectors, identity, max_width, mid_matrix, mid_vector, point_matrix, point_vector, IMatrix,
    IVector, Interval, Result, StateVector, TaylorFunctor, VerodeError,
};

// ============================================================================
// COEFFICIENTS
// ============================================================================

/// Blending weights of the (p, q) Hermite–Obreschkoff formula
///
/// ```text
/// Σ_{i≤q} (-1)ⁱ cqp_i hⁱ y[i](t+h) = Σ_{i≤p} cpq_i hⁱ y[i](t) + γ hᵏ y[k](ξ),  k = p+q+1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HermiteObreschkoffCoefficients {
    pub p: usize,
    pub q: usize,
    /// Explicit weights, length p+1
    pub cpq: Vec<Interval>,
    /// Implicit weights, length q+1
    pub cqp: Vec<Interval>,
    /// Error constant (-1)^q q! p! / (p+q)!
    pub gamma: Interval,
}

impl HermiteObreschkoffCoefficients {
    pub fn new(p: usize, q: usize) -> Self {
        Self {
            p,
            q,
            cpq: blending_weights(p, q),
            cqp: blending_weights(q, p),
            gamma: (1..=q)
                .map(|i| -Interval::ratio(i as i64, (p + i) as i64))
                .fold(Interval::ONE, |acc, c| acc * c),
        }
    }

    /// Order of the remainder coefficient
    pub fn order(&self) -> usize {
        self.p + self.q + 1
    }
}

/// `c[0] = 1`, `c[i] = c[i-1] (a-i+1) / (a+b-i+1)` for `i = 1..=a`
fn blending_weights(a: usize, b: usize) -> Vec<Interval> {
    let mut c = Vec::with_capacity(a + 1);
    c.push(Interval::ONE);
    for i in 1..=a {
        let ratio = Interval::ratio((a - i + 1) as i64, (a + b - i + 1) as i64);
        c.push(c[i - 1] * ratio);
    }
    c
}

// ============================================================================
// CONTRACTOR
// ============================================================================

/// Explicit order-p predictor followed by a single linearized implicit
/// order-q correction.
#[derive(Debug, Clone)]
pub struct HermiteObreschkoffContractor<F: TaylorFunctor> {
    rhs: F,
    coeffs: HermiteObreschkoffCoefficients,
    /// Coefficients over the a-priori set, orders 0..=k
    f_apriori: Vec<IVector>,
    /// Coefficients at the start anchor, orders 0..=p
    f_anchor: Vec<IVector>,
    /// Coefficients at the predicted anchor, orders 0..=q
    f_predict: Vec<IVector>,
    jx_minus: Vec<IMatrix>,
    jp_minus: Vec<IMatrix>,
    jx_plus: Vec<IMatrix>,
    jp_plus: Vec<IMatrix>,
    /// Predictor Taylor sums
    jx_taylor: IMatrix,
    jp_taylor: IMatrix,
    /// Weighted sums of both sides
    s_minus: IMatrix,
    s_plus: IMatrix,
    jp_sum_minus: IMatrix,
    jp_sum_plus: IMatrix,
    v: IVector,
    g_minus: IVector,
    g_plus: IVector,
    qr: QrDenseStorage,
    /// B·S₋ and B·(Jp₋ - Jp₊) of the last step
    step_jx: IMatrix,
    step_jp: IMatrix,
    delta: IVector,
    enclosure: IVector,
    anchor: StateVector,
}

impl<F: TaylorFunctor> HermiteObreschkoffContractor<F> {
    pub fn new(rhs: F, p: usize, q: usize) -> Result<Self> {
        if p == 0 {
            return Err(VerodeError::UnsupportedOrder {
                method: "hermite-obreschkoff",
                order: p,
            });
        }
        let coeffs = HermiteObreschkoffCoefficients::new(p, q);
        let n = rhs.state_dim();
        let np = rhs.param_dim();
        let square = || Array2::from_elem((n, n), Interval::ZERO);
        let tall = || Array2::from_elem((n, np), Interval::ZERO);
        let vector = || Array1::from_elem(n, Interval::ZERO);
        let (jx_minus, jp_minus) = rhs.jacobian_buffers(p);
        let (jx_plus, jp_plus) = rhs.jacobian_buffers(q);
        Ok(Self {
            f_apriori: rhs.coefficient_buffer(coeffs.order()),
            f_anchor: rhs.coefficient_buffer(p),
            f_predict: rhs.coefficient_buffer(q),
            jx_minus,
            jp_minus,
            jx_plus,
            jp_plus,
            jx_taylor: square(),
            jp_taylor: tall(),
            s_minus: square(),
            s_plus: square(),
            jp_sum_minus: tall(),
            jp_sum_plus: tall(),
            v: vector(),
            g_minus: vector(),
            g_plus: vector(),
            qr: QrDenseStorage::new(n),
            step_jx: square(),
            step_jp: tall(),
            delta: vector(),
            enclosure: vector(),
            anchor: Array1::zeros(n),
            coeffs,
            rhs,
        })
    }

    pub fn coefficients(&self) -> &HermiteObreschkoffCoefficients {
        &self.coeffs
    }
}

impl<F: TaylorFunctor> StateContractor for HermiteObreschkoffContractor<F> {
    type Rhs = F;

    fn rhs(&self) -> &F {
        &self.rhs
    }

    fn method_name(&self) -> &'static str {
        "hermite-obreschkoff"
    }

    fn step(
        &mut self,
        storage: &mut ContractorStorage,
        result: &mut StepResult,
        _count: usize,
    ) -> Result<StepStatus> {
        check_storage(&self.rhs, storage)?;
        let (p, q, k) = (self.coeffs.p, self.coeffs.q, self.coeffs.order());
        let n = storage.state_dim();
        let t = storage.time();
        let h = storage.hj_computed;
        let powers = step_powers(h, k);
        let x_anchor = point_vector(&storage.xval);
        let p_anchor = point_vector(&storage.pval);
        let dp = storage.parameter_deviation();
        let delta_prev = &storage.delta[0];
        let a_prev = point_matrix(storage.a[0].q());

        // ---- predictor: explicit Taylor step of order p ----
        self.rhs
            .coefficients(&mut self.f_apriori, &storage.xj_apriori, &storage.p, t)?;
        self.rhs
            .coefficients(&mut self.f_anchor, &x_anchor, &p_anchor, t)?;
        let start_set = hull_vectors(&storage.xj_0, &x_anchor);
        self.rhs
            .jacobians(&mut self.jx_minus, &mut self.jp_minus, &start_set, &storage.p, t)?;

        weighted_sum(&mut self.v, &self.f_anchor, &powers[..=p]);
        weighted_matrix_sum(&mut self.jx_taylor, &self.jx_minus, &powers[..=p]);
        weighted_matrix_sum(&mut self.jp_taylor, &self.jp_minus, &powers[..=p]);

        let remainder = &self.f_apriori[p + 1] * powers[p + 1];
        let m_predict = self.jx_taylor.dot(&a_prev);
        let taylor = &self.v + &remainder;
        let predicted = affine_enclosure(&taylor, &m_predict, delta_prev, &self.jp_taylor, &dp);
        let x_predict = tighten(&predicted, &storage.xj_apriori, "hermite-obreschkoff predictor")?;
        let mid_remainder = remainder.mapv(|r| Interval::point(r.mid()));
        let y_hat = mid_vector(&(&self.v + &mid_remainder));
        let y_point = point_vector(&y_hat);

        // cpq-weighted explicit side at the start point
        let w_minus: Vec<Interval> = (0..=p).map(|i| self.coeffs.cpq[i] * powers[i]).collect();
        weighted_sum(&mut self.g_minus, &self.f_anchor, &w_minus);
        weighted_matrix_sum(&mut self.s_minus, &self.jx_minus, &w_minus);
        weighted_matrix_sum(&mut self.jp_sum_minus, &self.jp_minus, &w_minus);

        // ---- corrector: implicit side of order q about ŷ ----
        self.rhs
            .coefficients(&mut self.f_predict, &y_point, &p_anchor, t + h)?;
        let end_set = hull_vectors(&x_predict, &y_point);
        self.rhs
            .jacobians(&mut self.jx_plus, &mut self.jp_plus, &end_set, &storage.p, t + h)?;
        let w_plus: Vec<Interval> = (0..=q)
            .map(|i| {
                let signed = if i % 2 == 0 { powers[i] } else { -powers[i] };
                self.coeffs.cqp[i] * signed
            })
            .collect();
        weighted_sum(&mut self.g_plus, &self.f_predict, &w_plus);
        weighted_matrix_sum(&mut self.s_plus, &self.jx_plus, &w_plus);
        weighted_matrix_sum(&mut self.jp_sum_plus, &self.jp_plus, &w_plus);

        // δ = g_j - g_{j+1} + γ hᵏ f[k](Ỹ)
        let truncation = &self.f_apriori[k] * (self.coeffs.gamma * powers[k]);
        let mismatch = &(&self.g_minus - &self.g_plus) + &truncation;

        // Linearized implicit solve preconditioned by B = (mid S₊)⁻¹
        let b = point_matrix(&lu_inverse(&mid_matrix(&self.s_plus))?);
        let b_s_minus = b.dot(&self.s_minus);
        let m = b_s_minus.dot(&a_prev);
        let jp = b.dot(&(&self.jp_sum_minus - &self.jp_sum_plus));
        let residual = identity(n) - &b.dot(&self.s_plus);
        let correction = residual.dot(&(&x_predict - &y_point));
        let centered = &b.dot(&mismatch) + &correction;

        self.qr.calculate_q(&mid_matrix(&m))?;
        self.qr.calculate_qinv()?;

        let delta = affine_delta(&self.qr, &centered, &m, delta_prev, &jp, &dp);
        let candidate = affine_enclosure(&(&y_point + &centered), &m, delta_prev, &jp, &dp);
        let enclosure = tighten(&candidate, &x_predict, "hermite-obreschkoff")?;

        self.delta = delta;
        self.enclosure = enclosure;
        self.anchor = y_hat;
        self.step_jx = b_s_minus;
        self.step_jp = jp;
        debug!(
            "hermite-obreschkoff({p},{q}): t={:.6} h={:.3e} predict={:.3e} width={:.3e}",
            t,
            h,
            max_width(&x_predict),
            max_width(&self.enclosure)
        );
        Ok(commit(
            storage,
            result,
            &mut self.qr,
            &self.delta,
            &self.enclosure,
            &self.anchor,
        ))
    }

    fn delta(&self) -> &IVector {
        &self.delta
    }

    fn set_anchor_point(&self, out: &mut StateVector) {
        out.clone_from(&self.anchor);
    }

    fn set_enclosure(&self, out: &mut IVector) {
        out.clone_from(&self.enclosure);
    }

    fn has_jacobians(&self) -> bool {
        true
    }

    fn extract_jacobians(&self, dx: &mut IMatrix, dp: &mut IMatrix) -> Result<()> {
        dx.clone_from(&self.step_jx);
        dp.clone_from(&self.step_jp);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use verode_core::{exponential_decay, harmonic_oscillator, interval_vector, is_subset};

    #[test]
    fn test_coefficients_p1_q1() {
        let c = HermiteObreschkoffCoefficients::new(1, 1);
        assert_eq!(c.order(), 3);
        assert_eq!(c.cpq.len(), 2);
        assert!(c.cpq[0].contains(1.0) && c.cpq[1].contains(0.5));
        assert!(c.cqp[0].contains(1.0) && c.cqp[1].contains(0.5));
        assert!(c.gamma.contains(-0.5));
        assert!(c.gamma.width() < 1e-15);
    }

    #[test]
    fn test_coefficients_match_closed_form() {
        // cpq_i = p! (p+q-i)! / ((p+q)! (p-i)!)
        let fact = |n: usize| (1..=n).map(|v| v as f64).product::<f64>();
        for (p, q) in [(2, 1), (3, 2), (2, 3), (4, 0)] {
            let c = HermiteObreschkoffCoefficients::new(p, q);
            for i in 0..=p {
                let exact = fact(p) * fact(p + q - i) / (fact(p + q) * fact(p - i));
                assert_relative_eq!(c.cpq[i].mid(), exact, epsilon = 1e-14);
            }
            let gamma = if q % 2 == 0 { 1.0 } else { -1.0 } * fact(q) * fact(p) / fact(p + q);
            assert_relative_eq!(c.gamma.mid(), gamma, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_zero_explicit_order_rejected() {
        assert!(HermiteObreschkoffContractor::new(exponential_decay(1.0), 0, 2).is_err());
    }

    #[test]
    fn test_decay_step_encloses_solution() {
        let h = 0.05;
        let mut storage = ContractorStorage::new(1, 0, 2);
        let x0 = interval_vector(&[0.99], &[1.01]).unwrap();
        storage.initialize(&x0, &Array1::from_vec(vec![]), 0.0).unwrap();
        storage.hj_computed = h;
        storage.xj_apriori = interval_vector(&[0.9], &[1.02]).unwrap();

        let mut result = StepResult::new(1);
        let mut ho = HermiteObreschkoffContractor::new(exponential_decay(1.0), 2, 2).unwrap();
        ho.step(&mut storage, &mut result, 0).unwrap();

        let x = &storage.x_computed;
        assert!(x[0].contains(0.99 * (-h).exp()));
        assert!(x[0].contains(1.01 * (-h).exp()));
        assert!(x[0].width() < 0.0195);
        assert!(is_subset(x, &storage.xj_apriori));
        assert_relative_eq!(result.xj[0], (-h).exp(), epsilon = 1e-5);
    }

    #[test]
    fn test_oscillator_step_and_jacobians() {
        let h = 0.1;
        let mut storage = ContractorStorage::new(2, 0, 2);
        let x0 = interval_vector(&[0.999, -0.001], &[1.001, 0.001]).unwrap();
        storage.initialize(&x0, &Array1::from_vec(vec![]), 0.0).unwrap();
        storage.hj_computed = h;
        storage.xj_apriori = interval_vector(&[0.9, -0.2], &[1.1, 0.2]).unwrap();

        let mut result = StepResult::new(2);
        let mut ho = HermiteObreschkoffContractor::new(harmonic_oscillator(1.0), 3, 3).unwrap();
        ho.step(&mut storage, &mut result, 0).unwrap();

        assert!(storage.x_computed[0].contains(h.cos()));
        assert!(storage.x_computed[1].contains(-h.sin()));

        // B·S₋ approximates the flow map, a rotation by -h
        let mut dx = Array2::from_elem((2, 2), Interval::ZERO);
        let mut dp = Array2::from_elem((2, 0), Interval::ZERO);
        ho.extract_jacobians(&mut dx, &mut dp).unwrap();
        assert_relative_eq!(dx[[0, 0]].mid(), h.cos(), epsilon = 1e-8);
        assert_relative_eq!(dx[[0, 1]].mid(), h.sin(), epsilon = 1e-8);
        assert_relative_eq!(dx[[1, 0]].mid(), -h.sin(), epsilon = 1e-8);
    }
}
