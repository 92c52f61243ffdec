//! # VerODE Contractors
//!
//! Step-wise validated integration of parametric ODEs `x' = f(x, p, t)`.
//!
//! A *state contractor* takes the enclosure `X_j` of every solution at
//! `t_j`, an a-priori enclosure `Ỹ` over `[t_j, t_j + h]` and the parameter
//! set `P`, and produces a tighter enclosure `X_{j+1} ⊆ Ỹ` at `t_j + h`.
//! Alongside the box it carries an affine representation
//!
//! ```text
//! x(t_j) ∈ x̂_j + A_j Δ_j
//! ```
//!
//! with an orthogonal preconditioner `A_j` that keeps the wrapping effect
//! under control over many steps.
//!
//! ## Methods
//!
//! | Method | Type | Notes |
//! |--------|------|-------|
//! | Lohner | one-step, explicit | Taylor order k, baseline and bootstrap |
//! | Hermite–Obreschkoff | one-step, predictor/corrector | orders (p, q), remainder order p+q+1 |
//! | Adams–Moulton | s-step, implicit | Lohner bootstrap for the first s steps |
//!
//! ## Example
//!
//! ```no_run
//! use ndarray::Array1;
//! use verode_contractors::{Contractor, FixedStepIntegrator, IntegratorSettings, MethodConfig};
//! use verode_core::{exponential_decay, interval_vector};
//!
//! let contractor = Contractor::from_config(exponential_decay(1.0), &MethodConfig::Lohner { order: 4 })?;
//! let mut integrator = FixedStepIntegrator::new(contractor, IntegratorSettings::default())?;
//! let x0 = interval_vector(&[0.99], &[1.01])?;
//! let trajectory = integrator.integrate(&x0, &Array1::from_vec(vec![]), 0.0)?;
//! println!("final width {}", trajectory.max_width());
//! # Ok::<(), verode_core::VerodeError>(())
//! ```

pub mod adams_moulton;
pub mod apriori;
pub mod config;
pub mod hermite_obreschkoff;
pub mod history;
pub mod integrator;
mod linalg;
pub mod lohner;
mod propagation;
pub mod qr;
pub mod storage;

pub use adams_moulton::{
    adams_moulton_coefficients, AdamsMoultonCoefficients, AdamsMoultonContractor, MultistepMode,
    MAX_ADAMS_MOULTON_STEPS,
};
pub use apriori::{apriori_enclosure, AprioriSettings};
pub use config::{MethodConfig, RunConfig};
pub use hermite_obreschkoff::{HermiteObreschkoffCoefficients, HermiteObreschkoffContractor};
pub use history::FixedHistory;
pub use integrator::{FixedStepIntegrator, IntegratorSettings, Trajectory};
pub use lohner::LohnerContractor;
pub use qr::QrDenseStorage;
pub use storage::{ContractorStorage, StepResult, StepStatus};

use verode_core::{IMatrix, IVector, Result, StateVector, TaylorFunctor, VerodeError};

// ============================================================================
// CONTRACTOR INTERFACE
// ============================================================================

/// One validated integration step over a [`ContractorStorage`].
///
/// On success the storage holds the new enclosure in `x_computed` (a subset
/// of `xj_apriori`), the new anchor in `xval_computed`, and one more entry in
/// the preconditioner and delta histories. On error nothing in the storage
/// has changed.
pub trait StateContractor {
    type Rhs: TaylorFunctor;

    fn rhs(&self) -> &Self::Rhs;

    fn method_name(&self) -> &'static str;

    /// Contract the pending step; `count` is the number of steps taken since
    /// the storage was initialized
    fn step(
        &mut self,
        storage: &mut ContractorStorage,
        result: &mut StepResult,
        count: usize,
    ) -> Result<StepStatus>;

    /// Affine delta of the last step
    fn delta(&self) -> &IVector;

    fn set_anchor_point(&self, out: &mut StateVector);

    fn set_enclosure(&self, out: &mut IVector);

    /// Whether [`extract_jacobians`](Self::extract_jacobians) has data
    fn has_jacobians(&self) -> bool {
        false
    }

    /// Step sensitivities w.r.t. the start state and the parameters
    fn extract_jacobians(&self, _dx: &mut IMatrix, _dp: &mut IMatrix) -> Result<()> {
        Err(VerodeError::InvalidConfiguration(format!(
            "{} does not provide step jacobians",
            self.method_name()
        )))
    }

    /// History slots the storage must provide
    fn required_history(&self) -> usize {
        2
    }

    /// Forget multistep state before a new run
    fn reset(&mut self) {}
}

/// Any of the available contractors, chosen at run time
#[derive(Debug, Clone)]
pub enum Contractor<F: TaylorFunctor> {
    Lohner(LohnerContractor<F>),
    HermiteObreschkoff(HermiteObreschkoffContractor<F>),
    AdamsMoulton(AdamsMoultonContractor<F>),
}

impl<F: TaylorFunctor> Contractor<F> {
    pub fn from_config(rhs: F, config: &MethodConfig) -> Result<Self> {
        config.validate()?;
        Ok(match *config {
            MethodConfig::Lohner { order } => Contractor::Lohner(LohnerContractor::new(rhs, order)?),
            MethodConfig::HermiteObreschkoff { p, q } => {
                Contractor::HermiteObreschkoff(HermiteObreschkoffContractor::new(rhs, p, q)?)
            }
            MethodConfig::AdamsMoulton {
                steps,
                order,
                refinements,
                ..
            } => Contractor::AdamsMoulton(AdamsMoultonContractor::new(
                rhs,
                steps,
                order,
                refinements,
            )?),
        })
    }
}

macro_rules! dispatch {
    ($self:expr, $c:ident => $body:expr) => {
        match $self {
            Contractor::Lohner($c) => $body,
            Contractor::HermiteObreschkoff($c) => $body,
            Contractor::AdamsMoulton($c) => $body,
        }
    };
}

impl<F: TaylorFunctor> StateContractor for Contractor<F> {
    type Rhs = F;

    fn rhs(&self) -> &F {
        dispatch!(self, c => c.rhs())
    }

    fn method_name(&self) -> &'static str {
        dispatch!(self, c => c.method_name())
    }

    fn step(
        &mut self,
        storage: &mut ContractorStorage,
        result: &mut StepResult,
        count: usize,
    ) -> Result<StepStatus> {
        dispatch!(self, c => c.step(storage, result, count))
    }

    fn delta(&self) -> &IVector {
        dispatch!(self, c => c.delta())
    }

    fn set_anchor_point(&self, out: &mut StateVector) {
        dispatch!(self, c => c.set_anchor_point(out))
    }

    fn set_enclosure(&self, out: &mut IVector) {
        dispatch!(self, c => c.set_enclosure(out))
    }

    fn has_jacobians(&self) -> bool {
        dispatch!(self, c => c.has_jacobians())
    }

    fn extract_jacobians(&self, dx: &mut IMatrix, dp: &mut IMatrix) -> Result<()> {
        dispatch!(self, c => c.extract_jacobians(dx, dp))
    }

    fn required_history(&self) -> usize {
        dispatch!(self, c => c.required_history())
    }

    fn reset(&mut self) {
        dispatch!(self, c => c.reset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verode_core::exponential_decay;

    #[test]
    fn test_from_config_dispatch() {
        let lohner = Contractor::from_config(exponential_decay(1.0), &MethodConfig::default()).unwrap();
        assert_eq!(lohner.method_name(), "lohner");
        assert!(lohner.has_jacobians());
        assert_eq!(lohner.required_history(), 2);

        let am = Contractor::from_config(
            exponential_decay(1.0),
            &MethodConfig::AdamsMoulton {
                steps: 5,
                order: 4,
                refinements: 2,
                variable_step: false,
            },
        )
        .unwrap();
        assert_eq!(am.method_name(), "adams-moulton");
        assert!(!am.has_jacobians());
        assert_eq!(am.required_history(), 5);
        let mut dx = ndarray::Array2::from_elem((1, 1), verode_core::Interval::ZERO);
        let mut dp = ndarray::Array2::from_elem((1, 0), verode_core::Interval::ZERO);
        assert!(am.extract_jacobians(&mut dx, &mut dp).is_err());
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let err = Contractor::from_config(
            exponential_decay(1.0),
            &MethodConfig::HermiteObreschkoff { p: 0, q: 1 },
        );
        assert!(matches!(err, Err(VerodeError::UnsupportedOrder { .. })));
    }
}
