//! Parametric Adams–Moulton multistep contractor with Lohner bootstrap.

use crate::history::FixedHistory;
use crate::linalg::lu_inverse;
use crate::lohner::LohnerContractor;
use crate::propagation::{affine_delta, affine_enclosure, check_storage, commit, step_powers, tighten};
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

/// Largest supported number of steps
pub const MAX_ADAMS_MOULTON_STEPS: usize = 8;

// ============================================================================
// COEFFICIENTS
// ============================================================================

/// Corrector weights and error constant of the s-step Adams–Moulton formula
///
/// ```text
/// y_{n+1} = y_n + h Σ_{l<s} β_l f(y_{n+1-l}) + γ h^{s+1} y[s+1](ξ)
/// ```
///
/// where `y[s+1]` is the Taylor coefficient (derivative over `(s+1)!`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdamsMoultonCoefficients {
    pub steps: usize,
    /// β₀ (implicit) … β_{s-1}
    pub beta: Vec<Interval>,
    /// Error constant times `(s+1)!`
    pub gamma: Interval,
}

/// Coefficients of the s-step formula for a constant step size.
///
/// | s | β | γ |
/// |---|---|---|
/// | 2 | 1/2, 1/2 | -1/2 |
/// | 3 | 5/12, 8/12, -1/12 | -1 |
/// | 4 | 9/24, 19/24, -5/24, 1/24 | -19/6 |
///
/// Other step counts up to [`MAX_ADAMS_MOULTON_STEPS`] are integrated
/// exactly from the Lagrange basis.
pub fn adams_moulton_coefficients(steps: usize) -> Result<AdamsMoultonCoefficients> {
    let table: Option<(&[(i64, i64)], (i64, i64))> = match steps {
        2 => Some((&[(1, 2), (1, 2)], (-1, 2))),
        3 => Some((&[(5, 12), (8, 12), (-1, 12)], (-1, 1))),
        4 => Some((&[(9, 24), (19, 24), (-5, 24), (1, 24)], (-19, 6))),
        _ => None,
    };
    if let Some((beta, (gn, gd))) = table {
        return Ok(AdamsMoultonCoefficients {
            steps,
            beta: beta.iter().map(|&(n, d)| Interval::ratio(n, d)).collect(),
            gamma: Interval::ratio(gn, gd),
        });
    }
    if steps == 0 || steps > MAX_ADAMS_MOULTON_STEPS {
        return Err(VerodeError::UnsupportedOrder {
            method: "adams-moulton",
            order: steps,
        });
    }
    Ok(integrated_coefficients(steps))
}

/// Exact rational with positive denominator
#[derive(Debug, Clone, Copy, PartialEq)]
struct Ratio {
    num: i64,
    den: i64,
}

impl Ratio {
    fn new(num: i64, den: i64) -> Self {
        let g = gcd(num, den).max(1) * den.signum();
        Self {
            num: num / g,
            den: den / g,
        }
    }

    fn add(self, other: Ratio) -> Ratio {
        Ratio::new(self.num * other.den + other.num * self.den, self.den * other.den)
    }

    fn interval(self) -> Interval {
        Interval::ratio(self.num, self.den)
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a.abs()
    } else {
        gcd(b, a % b)
    }
}

/// `∫₀¹ Π (u - r) du` for integer roots
fn integrate_product(roots: impl Iterator<Item = i64>) -> Ratio {
    // Ascending coefficients of the monic product
    let mut poly = vec![1i64];
    for r in roots {
        let mut next = vec![0i64; poly.len() + 1];
        for (i, &c) in poly.iter().enumerate() {
            next[i + 1] += c;
            next[i] -= r * c;
        }
        poly = next;
    }
    poly.iter()
        .enumerate()
        .fold(Ratio::new(0, 1), |acc, (i, &c)| acc.add(Ratio::new(c, i as i64 + 1)))
}

/// Nodes `u_m = 1 - m` in units of h relative to `t_n`
fn integrated_coefficients(steps: usize) -> AdamsMoultonCoefficients {
    let node = |m: usize| 1 - m as i64;
    let beta = (0..steps)
        .map(|m| {
            let integral = integrate_product((0..steps).filter(|&j| j != m).map(node));
            let denom: i64 = (0..steps)
                .filter(|&j| j != m)
                .map(|j| j as i64 - m as i64)
                .product();
            Ratio::new(integral.num, integral.den * denom).interval()
        })
        .collect();
    let error = integrate_product((0..steps).map(node));
    AdamsMoultonCoefficients {
        steps,
        beta,
        gamma: Ratio::new(error.num * (steps as i64 + 1), error.den).interval(),
    }
}

// ============================================================================
// CONTRACTOR
// ============================================================================

/// Which formula the contractor is currently applying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultistepMode {
    /// Not enough history yet; steps go through the embedded Lohner method
    Bootstrap,
    /// Multistep formula over the stored history
    Steady,
}

/// s-step implicit Adams–Moulton contractor.
///
/// The first `s` steps are taken by an embedded Lohner contractor. Each
/// step records `f` at the start anchor, the state and parameter Jacobians
/// of `f` over the start enclosure and the a-priori order `s+1` coefficient,
/// which the multistep formula consumes once enough history exists.
#[derive(Debug, Clone)]
pub struct AdamsMoultonContractor<F: TaylorFunctor> {
    lohner: LohnerContractor<F>,
    coeffs: AdamsMoultonCoefficients,
    refinements: usize,
    mode: MultistepMode,
    /// Previous start points, lag 0 = one step back
    f_anchor_hist: FixedHistory<IVector>,
    jx_hist: FixedHistory<IMatrix>,
    jp_hist: FixedHistory<IMatrix>,
    /// Current start point, committed after a successful step
    cur_f_anchor: IVector,
    cur_jx: IMatrix,
    cur_jp: IMatrix,
    cur_fk: IVector,
    f1: Vec<IVector>,
    fk: Vec<IVector>,
    jx1: Vec<IMatrix>,
    jp1: Vec<IMatrix>,
    qr: QrDenseStorage,
    delta: IVector,
    enclosure: IVector,
    anchor: StateVector,
}

impl<F: TaylorFunctor> AdamsMoultonContractor<F> {
    /// `steps` past points, bootstrap Lohner of Taylor order `order` and
    /// `refinements` extra passes of the implicit term
    pub fn new(rhs: F, steps: usize, order: usize, refinements: usize) -> Result<Self> {
        let coeffs = adams_moulton_coefficients(steps)?;
        let n = rhs.state_dim();
        let np = rhs.param_dim();
        let lags = steps.saturating_sub(2).max(1);
        let square = || Array2::from_elem((n, n), Interval::ZERO);
        let tall = || Array2::from_elem((n, np), Interval::ZERO);
        let vector = || Array1::from_elem(n, Interval::ZERO);
        let f1 = rhs.coefficient_buffer(1);
        let fk = rhs.coefficient_buffer(steps + 1);
        let (jx1, jp1) = rhs.jacobian_buffers(1);
        Ok(Self {
            lohner: LohnerContractor::new(rhs, order)?,
            coeffs,
            refinements,
            mode: MultistepMode::Bootstrap,
            f_anchor_hist: FixedHistory::from_fn(lags, vector),
            jx_hist: FixedHistory::from_fn(lags, square),
            jp_hist: FixedHistory::from_fn(lags, tall),
            cur_f_anchor: vector(),
            cur_jx: square(),
            cur_jp: tall(),
            cur_fk: vector(),
            f1,
            fk,
            jx1,
            jp1,
            qr: QrDenseStorage::new(n),
            delta: vector(),
            enclosure: vector(),
            anchor: Array1::zeros(n),
        })
    }

    pub fn mode(&self) -> MultistepMode {
        self.mode
    }

    pub fn steps(&self) -> usize {
        self.coeffs.steps
    }

    pub fn coefficients(&self) -> &AdamsMoultonCoefficients {
        &self.coeffs
    }

    /// Embedded bootstrap contractor
    pub fn bootstrap(&self) -> &LohnerContractor<F> {
        &self.lohner
    }

    /// Number of past start points the formula reads besides the current one
    fn lags(&self) -> usize {
        self.coeffs.steps.saturating_sub(2)
    }

    fn history_ready(&self, storage: &ContractorStorage) -> bool {
        let lags = self.lags();
        self.f_anchor_hist.len() >= lags
            && storage.fk_apriori.len() >= lags
            && storage.delta.len() > lags
            && storage.a.len() > lags
    }

    /// Evaluate the quantities recorded for the current start point
    fn record_current(&mut self, storage: &ContractorStorage) -> Result<()> {
        let rhs = self.lohner.rhs();
        let t = storage.time();
        let x_anchor = point_vector(&storage.xval);
        let p_anchor = point_vector(&storage.pval);

        rhs.coefficients(&mut self.f1, &x_anchor, &p_anchor, t)?;
        self.cur_f_anchor.assign(&self.f1[1]);

        let start_set = hull_vectors(&storage.xj_0, &x_anchor);
        rhs.jacobians(&mut self.jx1, &mut self.jp1, &start_set, &storage.p, t)?;
        self.cur_jx.assign(&self.jx1[1]);
        self.cur_jp.assign(&self.jp1[1]);

        rhs.coefficients(&mut self.fk, &storage.xj_apriori, &storage.p, t)?;
        self.cur_fk.assign(&self.fk[self.coeffs.steps + 1]);
        Ok(())
    }

    /// Push the recorded start point onto the histories
    fn commit_history(&mut self, storage: &mut ContractorStorage) {
        self.f_anchor_hist.push_swap(&mut self.cur_f_anchor);
        self.jx_hist.push_swap(&mut self.cur_jx);
        self.jp_hist.push_swap(&mut self.cur_jp);
        storage.fk_apriori.push_swap(&mut self.cur_fk);
    }

    /// `x̂_n + hβ₁ f(x̂_n) + Σ_{l≥2} hβ_l f(x̂_{n+1-l})`, the part of the
    /// quadrature known at the anchors; the current anchor is `storage.xval`
    fn explicit_quadrature(&self, storage: &ContractorStorage, hb: &[Interval]) -> IVector {
        let mut explicit = point_vector(&storage.xval);
        if hb.len() >= 2 {
            explicit.scaled_add(hb[1], &self.cur_f_anchor);
        }
        for l in 2..hb.len() {
            explicit.scaled_add(hb[l], &self.f_anchor_hist[l - 2]);
        }
        explicit
    }

    fn steady_step(
        &mut self,
        storage: &mut ContractorStorage,
        result: &mut StepResult,
    ) -> Result<StepStatus> {
        if !self.history_ready(storage) {
            return Err(VerodeError::InvalidConfiguration(
                "multistep history is incomplete; reset the contractor after reinitializing storage"
                    .into(),
            ));
        }
        let s = self.coeffs.steps;
        let lags = self.lags();
        let n = storage.state_dim();
        let t = storage.time();
        let h = storage.hj_computed;
        let hb: Vec<Interval> = self
            .coeffs
            .beta
            .iter()
            .map(|&b| b * Interval::point(h))
            .collect();
        let explicit = self.explicit_quadrature(storage, &hb);
        let rhs = self.lohner.rhs();
        let p_anchor = point_vector(&storage.pval);
        let dp = storage.parameter_deviation();
        let delta_n = &storage.delta[0];
        let a_n = point_matrix(storage.a[0].q());

        // Truncation error over every a-priori set the formula spans
        let mut fk_hull = self.cur_fk.clone();
        for lag in 0..lags {
            fk_hull = hull_vectors(&fk_hull, &storage.fk_apriori[lag]);
        }
        let rk = &fk_hull * (self.coeffs.gamma * step_powers(h, s + 1)[s + 1]);

        // Implicit term f(y_{n+1}) = f(m̃) + J(Ỹ)(y_{n+1} - m̃)
        rhs.jacobians(&mut self.jx1, &mut self.jp1, &storage.xj_apriori, &storage.p, t)?;
        let implicit_jac = &identity(n) - &(&self.jx1[1] * hb[0]);
        let b = point_matrix(&lu_inverse(&mid_matrix(&implicit_jac))?);
        let residual = &identity(n) - &b.dot(&implicit_jac);

        let mut jp_sum = &self.jp1[1] * hb[0];
        if s >= 2 {
            jp_sum.scaled_add(hb[1], &self.cur_jp);
        }
        for l in 2..s {
            jp_sum.scaled_add(hb[l], &self.jp_hist[l - 2]);
        }
        let jp = b.dot(&jp_sum);

        // Deviation at the current point, folded into the propagated frame
        let lift = if s >= 2 {
            let mut lift = identity(n);
            lift.scaled_add(hb[1], &self.cur_jx);
            lift.dot(&a_n)
        } else {
            a_n
        };
        let m = b.dot(&lift);

        // Older points enter through their own frames
        let lagged: Vec<IMatrix> = (2..s)
            .map(|l| {
                let a = point_matrix(storage.a[l - 1].q());
                b.dot(&(&self.jx_hist[l - 2] * hb[l])).dot(&a)
            })
            .collect();
        let origin = Array1::from_elem(n, Interval::ZERO);
        let mut affine = affine_enclosure(&origin, &m, delta_n, &jp, &dp);
        for (l, map) in (2..s).zip(&lagged) {
            affine += &map.dot(&storage.delta[l - 1]);
        }

        // y_{n+1} ∈ z throughout; each pass re-centres the implicit solve
        let mut z = storage.xj_apriori.clone();
        let mut pass = 0;
        let base = loop {
            let m_tilde = point_vector(&mid_vector(&z));
            rhs.coefficients(&mut self.f1, &m_tilde, &p_anchor, t + h)?;
            let mut known = &explicit - &m_tilde;
            known.scaled_add(hb[0], &self.f1[1]);
            known += &rk;
            let base = &(&m_tilde + &b.dot(&known)) + &residual.dot(&(&z - &m_tilde));
            z = tighten(&(&base + &affine), &z, "adams-moulton")?;
            if pass == self.refinements {
                break base;
            }
            pass += 1;
        };

        self.qr.calculate_q(&mid_matrix(&m))?;
        self.qr.calculate_qinv()?;
        let anchor = mid_vector(&base);
        let centered = &base - &point_vector(&anchor);
        let mut delta = affine_delta(&self.qr, &centered, &m, delta_n, &jp, &dp);
        let qinv = self.qr.inv_bounds();
        for (l, map) in (2..s).zip(&lagged) {
            delta += &qinv.dot(map).dot(&storage.delta[l - 1]);
        }

        self.delta = delta;
        self.enclosure = z;
        self.anchor = anchor;
        debug!(
            "adams-moulton({s}): t={:.6} h={:.3e} width={:.3e} |Δ|={:.3e}",
            t,
            h,
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
}

impl<F: TaylorFunctor> StateContractor for AdamsMoultonContractor<F> {
    type Rhs = F;

    fn rhs(&self) -> &F {
        self.lohner.rhs()
    }

    fn method_name(&self) -> &'static str {
        "adams-moulton"
    }

    fn step(
        &mut self,
        storage: &mut ContractorStorage,
        result: &mut StepResult,
        count: usize,
    ) -> Result<StepStatus> {
        check_storage(self.lohner.rhs(), storage)?;
        if storage.is_adaptive {
            return Err(VerodeError::InvalidConfiguration(
                "adams-moulton coefficients for variable step sizes are not supported".into(),
            ));
        }
        if storage.capacity() < self.required_history() {
            return Err(VerodeError::InvalidConfiguration(format!(
                "adams-moulton({}) needs {} history slots, storage has {}",
                self.coeffs.steps,
                self.required_history(),
                storage.capacity()
            )));
        }
        self.record_current(storage)?;

        let steady = self.mode == MultistepMode::Steady
            || (count >= self.coeffs.steps && self.history_ready(storage));
        let status = if steady {
            self.steady_step(storage, result)?
        } else {
            let status = self.lohner.step(storage, result, count)?;
            self.delta.clone_from(self.lohner.delta());
            self.lohner.set_enclosure(&mut self.enclosure);
            self.lohner.set_anchor_point(&mut self.anchor);
            status
        };

        self.commit_history(storage);
        if steady && self.mode == MultistepMode::Bootstrap {
            debug!(
                "adams-moulton: {}-step formula active from step {count}",
                self.coeffs.steps
            );
            self.mode = MultistepMode::Steady;
        }
        Ok(status)
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

    fn required_history(&self) -> usize {
        self.coeffs.steps.max(2)
    }

    fn reset(&mut self) {
        self.mode = MultistepMode::Bootstrap;
        self.f_anchor_hist.clear();
        self.jx_hist.clear();
        self.jp_hist.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use verode_core::{exponential_decay, interval_vector, is_subset};

    #[test]
    fn test_tables() {
        let c2 = adams_moulton_coefficients(2).unwrap();
        assert!(c2.beta[0].contains(0.5) && c2.beta[1].contains(0.5));
        assert!(c2.gamma.contains(-0.5));

        let c4 = adams_moulton_coefficients(4).unwrap();
        assert_relative_eq!(c4.beta[1].mid(), 19.0 / 24.0, epsilon = 1e-15);
        assert_relative_eq!(c4.gamma.mid(), -19.0 / 6.0, epsilon = 1e-15);
    }

    #[test]
    fn test_integrated_matches_tables() {
        for s in 2..=4 {
            let table = adams_moulton_coefficients(s).unwrap();
            let integrated = integrated_coefficients(s);
            for (a, b) in table.beta.iter().zip(&integrated.beta) {
                assert_relative_eq!(a.mid(), b.mid(), epsilon = 1e-15);
            }
            assert_relative_eq!(table.gamma.mid(), integrated.gamma.mid(), epsilon = 1e-15);
        }
    }

    #[test]
    fn test_backward_euler_and_high_orders() {
        let c1 = adams_moulton_coefficients(1).unwrap();
        assert_eq!(c1.beta.len(), 1);
        assert!(c1.beta[0].contains(1.0));
        assert!(c1.gamma.contains(-1.0));

        // Weights of any consistent formula sum to one
        for s in 1..=MAX_ADAMS_MOULTON_STEPS {
            let c = adams_moulton_coefficients(s).unwrap();
            let total: f64 = c.beta.iter().map(|b| b.mid()).sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-13);
        }

        // Five-step corrector: 251/720, 646/720, -264/720, 106/720, -19/720
        let c5 = adams_moulton_coefficients(5).unwrap();
        assert_relative_eq!(c5.beta[0].mid(), 251.0 / 720.0, epsilon = 1e-15);
        assert_relative_eq!(c5.beta[4].mid(), -19.0 / 720.0, epsilon = 1e-15);
    }

    #[test]
    fn test_unsupported_steps() {
        assert!(adams_moulton_coefficients(0).is_err());
        assert!(adams_moulton_coefficients(MAX_ADAMS_MOULTON_STEPS + 1).is_err());
        assert!(AdamsMoultonContractor::new(exponential_decay(1.0), 9, 4, 2).is_err());
    }

    #[test]
    fn test_adaptive_storage_rejected() {
        let mut am = AdamsMoultonContractor::new(exponential_decay(1.0), 3, 4, 2).unwrap();
        let mut storage = ContractorStorage::new(1, 0, am.required_history());
        let x0 = interval_vector(&[1.0], &[1.0]).unwrap();
        storage.initialize(&x0, &Array1::from_vec(vec![]), 0.0).unwrap();
        storage.hj_computed = 0.01;
        storage.xj_apriori = interval_vector(&[0.98], &[1.0]).unwrap();
        storage.is_adaptive = true;
        let mut result = StepResult::new(1);
        assert!(matches!(
            am.step(&mut storage, &mut result, 0),
            Err(VerodeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_undersized_storage_rejected() {
        let mut am = AdamsMoultonContractor::new(exponential_decay(1.0), 5, 4, 2).unwrap();
        let mut storage = ContractorStorage::new(1, 0, 2);
        let x0 = interval_vector(&[1.0], &[1.0]).unwrap();
        storage.initialize(&x0, &Array1::from_vec(vec![]), 0.0).unwrap();
        storage.hj_computed = 0.01;
        storage.xj_apriori = interval_vector(&[0.98], &[1.0]).unwrap();
        let mut result = StepResult::new(1);

        assert!(matches!(
            am.step(&mut storage, &mut result, 0),
            Err(VerodeError::InvalidConfiguration(_))
        ));
        assert_eq!(storage.a.len(), 1);
        assert_eq!(am.mode(), MultistepMode::Bootstrap);
    }

    #[test]
    fn test_explicit_quadrature_starts_from_current_anchor() {
        let h = 0.01;
        let mut am = AdamsMoultonContractor::new(exponential_decay(1.0), 3, 4, 2).unwrap();
        let mut storage = ContractorStorage::new(1, 0, am.required_history());
        let x0 = interval_vector(&[0.999], &[1.001]).unwrap();
        storage.initialize(&x0, &Array1::from_vec(vec![]), 0.0).unwrap();
        let mut result = StepResult::new(1);
        let mut anchors = Vec::new();

        for count in 0..=3 {
            anchors.push(storage.xval[0]);
            storage.hj_computed = h;
            let x = &storage.xj_0;
            storage.xj_apriori = interval_vector(&[x[0].lo() * 0.98], &[x[0].hi()]).unwrap();
            if count == 3 {
                break;
            }
            am.step(&mut storage, &mut result, count).unwrap();
            storage.advance();
        }
        am.record_current(&storage).unwrap();
        let hb: Vec<Interval> = am
            .coefficients()
            .beta
            .iter()
            .map(|&b| b * Interval::point(h))
            .collect();
        let explicit = am.explicit_quadrature(&storage, &hb);

        // x' = -x with β = (5, 8, -1)/12
        let (current, previous, older) = (anchors[3], anchors[2], anchors[1]);
        let expected = current * (1.0 - 8.0 * h / 12.0) + previous * h / 12.0;
        assert_relative_eq!(explicit[0].mid(), expected, epsilon = 1e-14);
        assert!(explicit[0].width() < 1e-13);
        // Anchoring at the previous start point would land elsewhere
        let shifted = previous * (1.0 - 8.0 * h / 12.0) + older * h / 12.0;
        assert!(!explicit[0].contains(shifted));
    }

    #[test]
    fn test_steady_step_encloses_decay() {
        let h = 0.01;
        let mut am = AdamsMoultonContractor::new(exponential_decay(1.0), 3, 4, 2).unwrap();
        let mut storage = ContractorStorage::new(1, 0, am.required_history());
        let x0 = interval_vector(&[0.999], &[1.001]).unwrap();
        storage.initialize(&x0, &Array1::from_vec(vec![]), 0.0).unwrap();
        let mut result = StepResult::new(1);

        for count in 0..6 {
            storage.hj_computed = h;
            // Decay over one step: the solution stays in [x e^{-h}, x]
            let x = &storage.xj_0;
            storage.xj_apriori = interval_vector(&[x[0].lo() * 0.98], &[x[0].hi()]).unwrap();
            am.step(&mut storage, &mut result, count).unwrap();
            assert!(is_subset(&storage.x_computed, &storage.xj_apriori));

            let t = (count + 1) as f64 * h;
            assert!(storage.x_computed[0].contains(0.999 * (-t).exp()));
            assert!(storage.x_computed[0].contains(1.001 * (-t).exp()));
            storage.advance();
        }
        assert_eq!(am.mode(), MultistepMode::Steady);
        assert!(storage.x_computed[0].width() < 0.01);
    }

    #[test]
    fn test_reset_returns_to_bootstrap() {
        let mut am = AdamsMoultonContractor::new(exponential_decay(1.0), 2, 3, 1).unwrap();
        let mut storage = ContractorStorage::new(1, 0, am.required_history());
        let x0 = interval_vector(&[0.9], &[1.1]).unwrap();
        storage.initialize(&x0, &Array1::from_vec(vec![]), 0.0).unwrap();
        let mut result = StepResult::new(1);
        for count in 0..3 {
            storage.hj_computed = 0.05;
            let x = &storage.xj_0;
            storage.xj_apriori = interval_vector(&[x[0].lo() * 0.9], &[x[0].hi()]).unwrap();
            am.step(&mut storage, &mut result, count).unwrap();
            storage.advance();
        }
        assert_eq!(am.mode(), MultistepMode::Steady);
        am.reset();
        assert_eq!(am.mode(), MultistepMode::Bootstrap);
        assert!(!am.has_jacobians());
    }
}
