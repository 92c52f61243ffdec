//! Lohner's method: Taylor expansion about the anchor with a mean-value
//! enclosure of the deviation, propagated in a QR-rotated frame.

use crate::propagation::{
    affine_delta, affine_enclosure, check_storage, commit, step_powers, tighten, weighted_matrix_sum,
    weighted_sum,
};
use crate::qr::QrDenseStorage;
use crate::storage::{ContractorStorage, StepResult, StepStatus};
use crate::StateContractor;
use log::debug;
use ndarray::{Array1, Array2};
use verode_core::{
    hull_vectors, max_width, mid_matrix, mid_vector, point_matrix, point_vector, IMatrix, IVector,
    Interval, Result, StateVector, TaylorFunctor, VerodeError,
};

/// Single-step validated contractor of Taylor order `k ≥ 1`.
///
/// One step computes, with `h` the step size, `Ỹ` the a-priori enclosure
/// and `x̂` the anchor:
///
/// ```text
/// v   = Σ_{i<k} hⁱ f[i](x̂, p̂)
/// R   = hᵏ f[k](Ỹ, P)
/// M   = (Σ_{i<k} hⁱ ∂f[i]/∂x) · A_j
/// X'  = (v + R + M Δ_j + Jp (P - p̂)) ∩ Ỹ
/// ```
///
/// with the Jacobians taken over `hull(X_j, x̂) × P`.
#[derive(Debug, Clone)]
pub struct LohnerContractor<F: TaylorFunctor> {
    rhs: F,
    order: usize,
    /// Coefficients over the a-priori set, orders 0..=k
    f_apriori: Vec<IVector>,
    /// Coefficients at the anchor, orders 0..k
    f_anchor: Vec<IVector>,
    jx: Vec<IMatrix>,
    jp: Vec<IMatrix>,
    jx_sum: IMatrix,
    jp_sum: IMatrix,
    v: IVector,
    qr: QrDenseStorage,
    delta: IVector,
    enclosure: IVector,
    anchor: StateVector,
}

impl<F: TaylorFunctor> LohnerContractor<F> {
    pub fn new(rhs: F, order: usize) -> Result<Self> {
        if order == 0 {
            return Err(VerodeError::UnsupportedOrder {
                method: "lohner",
                order,
            });
        }
        let n = rhs.state_dim();
        let np = rhs.param_dim();
        let f_apriori = rhs.coefficient_buffer(order);
        let f_anchor = rhs.coefficient_buffer(order - 1);
        let (jx, jp) = rhs.jacobian_buffers(order - 1);
        Ok(Self {
            order,
            f_apriori,
            f_anchor,
            jx,
            jp,
            jx_sum: Array2::from_elem((n, n), Interval::ZERO),
            jp_sum: Array2::from_elem((n, np), Interval::ZERO),
            v: Array1::from_elem(n, Interval::ZERO),
            qr: QrDenseStorage::new(n),
            delta: Array1::from_elem(n, Interval::ZERO),
            enclosure: Array1::from_elem(n, Interval::ZERO),
            anchor: Array1::zeros(n),
            rhs,
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Jacobian of the Taylor polynomial w.r.t. the state from the last step
    pub fn state_jacobian(&self) -> &IMatrix {
        &self.jx_sum
    }

    /// Jacobian of the Taylor polynomial w.r.t. the parameters from the last step
    pub fn param_jacobian(&self) -> &IMatrix {
        &self.jp_sum
    }
}

impl<F: TaylorFunctor> StateContractor for LohnerContractor<F> {
    type Rhs = F;

    fn rhs(&self) -> &F {
        &self.rhs
    }

    fn method_name(&self) -> &'static str {
        "lohner"
    }

    fn step(
        &mut self,
        storage: &mut ContractorStorage,
        result: &mut StepResult,
        _count: usize,
    ) -> Result<StepStatus> {
        check_storage(&self.rhs, storage)?;
        let k = self.order;
        let t = storage.time();
        let powers = step_powers(storage.hj_computed, k);
        let x_anchor = point_vector(&storage.xval);
        let p_anchor = point_vector(&storage.pval);

        self.rhs
            .coefficients(&mut self.f_apriori, &storage.xj_apriori, &storage.p, t)?;
        self.rhs
            .coefficients(&mut self.f_anchor, &x_anchor, &p_anchor, t)?;
        let jac_set = hull_vectors(&storage.xj_0, &x_anchor);
        self.rhs
            .jacobians(&mut self.jx, &mut self.jp, &jac_set, &storage.p, t)?;

        let remainder = &self.f_apriori[k] * powers[k];
        weighted_sum(&mut self.v, &self.f_anchor, &powers[..k]);
        weighted_matrix_sum(&mut self.jx_sum, &self.jx, &powers[..k]);
        weighted_matrix_sum(&mut self.jp_sum, &self.jp, &powers[..k]);

        let delta_prev = &storage.delta[0];
        let m = self.jx_sum.dot(&point_matrix(storage.a[0].q()));
        self.qr.calculate_q(&mid_matrix(&m))?;
        self.qr.calculate_qinv()?;

        let mid_remainder = remainder.mapv(|r| Interval::point(r.mid()));
        let anchor = mid_vector(&(&self.v + &mid_remainder));
        let taylor = &self.v + &remainder;
        let centered = &taylor - &point_vector(&anchor);
        let dp = storage.parameter_deviation();

        let delta = affine_delta(&self.qr, &centered, &m, delta_prev, &self.jp_sum, &dp);
        let candidate = affine_enclosure(&taylor, &m, delta_prev, &self.jp_sum, &dp);
        let enclosure = tighten(&candidate, &storage.xj_apriori, "lohner")?;

        self.delta = delta;
        self.enclosure = enclosure;
        self.anchor = anchor;
        debug!(
            "lohner: t={:.6} h={:.3e} width={:.3e} |Δ|={:.3e}",
            t,
            storage.hj_computed,
            max_width(&self.enclosure),
            max_width(&self.delta)
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
        dx.clone_from(&self.jx_sum);
        dp.clone_from(&self.jp_sum);
        Ok(())
    }
}
