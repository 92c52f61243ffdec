//! Mutable step context shared by every contractor call.

use crate::history::FixedHistory;
use crate::qr::QrDenseStorage;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use verode_core::{mid_vector, point_vector, IVector, Interval, Result, StateVector, Time, VerodeError};

// ============================================================================
// STEP RESULT
// ============================================================================

/// Outcome reported by a contractor step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// Step contracted; relaxation is left to a later stage
    RelaxationNotCalled,
    /// Integration reached its final step
    Completed,
}

/// Per-step output written by the contractor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub status: StepStatus,
    /// Time at the end of the step
    pub t: Time,
    /// Step size taken
    pub hj: f64,
    /// Anchor point at the end of the step
    pub xj: StateVector,
    /// State enclosure at the end of the step
    pub enclosure: IVector,
}

impl StepResult {
    pub fn new(nx: usize) -> Self {
        Self {
            status: StepStatus::RelaxationNotCalled,
            t: 0.0,
            hj: 0.0,
            xj: Array1::zeros(nx),
            enclosure: Array1::from_elem(nx, Interval::ZERO),
        }
    }
}

// ============================================================================
// CONTRACTOR STORAGE
// ============================================================================

/// Step context: enclosures, anchors, preconditioner and delta histories.
///
/// Lag 0 of `a` and `delta` describes the start of the current step:
/// every true solution satisfies `x(t_j) - xval ∈ a[0].q() · delta[0]`.
#[derive(Debug, Clone)]
pub struct ContractorStorage {
    /// Step sizes may vary between steps
    pub is_adaptive: bool,
    /// Start times, newest first
    pub times: FixedHistory<Time>,
    /// Accepted step sizes, newest first
    pub steps: FixedHistory<f64>,
    /// Enclosure at the start of the step
    pub xj_0: IVector,
    /// A-priori enclosure over the whole step
    pub xj_apriori: IVector,
    /// Anchor at the start of the step
    pub xval: StateVector,
    /// Parameter enclosure
    pub p: IVector,
    /// Parameter anchor
    pub pval: Array1<f64>,
    /// Step size for the pending step
    pub hj_computed: f64,
    /// Orthogonal preconditioners
    pub a: FixedHistory<QrDenseStorage>,
    /// Affine deltas
    pub delta: FixedHistory<IVector>,
    /// A-priori coefficient evaluations of previous steps (multistep remainder)
    pub fk_apriori: FixedHistory<IVector>,
    /// Enclosure at the end of the step
    pub x_computed: IVector,
    /// Anchor at the end of the step
    pub xval_computed: StateVector,
    nx: usize,
    np: usize,
}

impl ContractorStorage {
    /// Allocate storage for `nx` states and `np` parameters; histories keep
    /// at least two slots (current and previous)
    pub fn new(nx: usize, np: usize, capacity: usize) -> Self {
        let capacity = capacity.max(2);
        let empty = || Array1::from_elem(nx, Interval::ZERO);
        Self {
            is_adaptive: false,
            times: FixedHistory::from_fn(capacity, || 0.0),
            steps: FixedHistory::from_fn(capacity, || 0.0),
            xj_0: empty(),
            xj_apriori: empty(),
            xval: Array1::zeros(nx),
            p: Array1::from_elem(np, Interval::ZERO),
            pval: Array1::zeros(np),
            hj_computed: 0.0,
            a: FixedHistory::from_fn(capacity, || QrDenseStorage::new(nx)),
            delta: FixedHistory::from_fn(capacity, empty),
            fk_apriori: FixedHistory::from_fn(capacity, empty),
            x_computed: empty(),
            xval_computed: Array1::zeros(nx),
            nx,
            np,
        }
    }

    pub fn state_dim(&self) -> usize {
        self.nx
    }

    pub fn param_dim(&self) -> usize {
        self.np
    }

    pub fn capacity(&self) -> usize {
        self.a.capacity()
    }

    /// Start a run at `t0` from the initial set `x0` with parameters `p`.
    ///
    /// The anchor is the midpoint of `x0`, the preconditioner is the
    /// identity and `Δ₀ = x0 - mid(x0)`.
    pub fn initialize(&mut self, x0: &IVector, p: &IVector, t0: Time) -> Result<()> {
        if x0.len() != self.nx {
            return Err(VerodeError::DimensionMismatch {
                context: "initial state",
                expected: self.nx,
                found: x0.len(),
            });
        }
        if p.len() != self.np {
            return Err(VerodeError::DimensionMismatch {
                context: "parameters",
                expected: self.np,
                found: p.len(),
            });
        }

        self.xj_0.assign(x0);
        self.xj_apriori.assign(x0);
        self.x_computed.assign(x0);
        self.xval = mid_vector(x0);
        self.xval_computed.assign(&self.xval);
        self.p.assign(p);
        self.pval = mid_vector(p);
        self.hj_computed = 0.0;

        self.times.clear();
        self.steps.clear();
        self.fk_apriori.clear();
        self.a.clear();
        self.delta.clear();

        self.times.push(t0);
        self.a.push(QrDenseStorage::new(self.nx));
        self.delta.push(x0 - &point_vector(&self.xval));
        Ok(())
    }

    /// Time at the start of the pending step
    pub fn time(&self) -> Time {
        self.times.get(0).copied().unwrap_or_default()
    }

    /// `P - p̂`
    pub fn parameter_deviation(&self) -> IVector {
        &self.p - &point_vector(&self.pval)
    }

    /// Reject a step that cannot be taken from the current state
    pub fn check_ready(&self) -> Result<()> {
        if !(self.hj_computed.is_finite() && self.hj_computed > 0.0) {
            return Err(VerodeError::InvalidConfiguration(format!(
                "step size must be positive, got {}",
                self.hj_computed
            )));
        }
        if self.a.is_empty() || self.delta.is_empty() {
            return Err(VerodeError::InvalidConfiguration(
                "contractor storage used before initialize".into(),
            ));
        }
        if self.xj_apriori.len() != self.nx {
            return Err(VerodeError::DimensionMismatch {
                context: "a-priori enclosure",
                expected: self.nx,
                found: self.xj_apriori.len(),
            });
        }
        Ok(())
    }

    /// Make the computed enclosure and anchor the start of the next step
    pub fn advance(&mut self) {
        let t = self.time() + self.hj_computed;
        self.xj_0.assign(&self.x_computed);
        self.xval.assign(&self.xval_computed);
        self.times.push(t);
        self.steps.push(self.hj_computed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verode_core::interval_vector;

    #[test]
    fn test_initialize_sets_anchor_and_delta() {
        let mut storage = ContractorStorage::new(2, 1, 2);
        let x0 = interval_vector(&[0.9, -1.0], &[1.1, 1.0]).unwrap();
        let p = interval_vector(&[2.0], &[4.0]).unwrap();
        storage.initialize(&x0, &p, 0.5).unwrap();

        assert_eq!(storage.xval[0], 1.0);
        assert_eq!(storage.xval[1], 0.0);
        assert_eq!(storage.pval[0], 3.0);
        assert_eq!(storage.time(), 0.5);
        assert_eq!(storage.a.len(), 1);

        // x0 - anchor must lie in Δ₀ (Q = I)
        let delta = &storage.delta[0];
        assert!(delta[0].contains(-0.1) && delta[0].contains(0.1));
        assert!(delta[1].contains(-1.0) && delta[1].contains(1.0));

        let dp = storage.parameter_deviation();
        assert!(dp[0].contains(-1.0) && dp[0].contains(1.0));
    }

    #[test]
    fn test_initialize_checks_dimensions() {
        let mut storage = ContractorStorage::new(2, 0, 2);
        let x0 = interval_vector(&[0.0], &[1.0]).unwrap();
        let err = storage.initialize(&x0, &Array1::from_vec(vec![]), 0.0);
        assert!(matches!(err, Err(VerodeError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_check_ready_requires_step() {
        let mut storage = ContractorStorage::new(1, 0, 2);
        let x0 = interval_vector(&[1.0], &[2.0]).unwrap();
        storage.initialize(&x0, &Array1::from_vec(vec![]), 0.0).unwrap();
        assert!(storage.check_ready().is_err());
        storage.hj_computed = 0.1;
        assert!(storage.check_ready().is_ok());
    }

    #[test]
    fn test_advance() {
        let mut storage = ContractorStorage::new(1, 0, 3);
        let x0 = interval_vector(&[1.0], &[2.0]).unwrap();
        storage.initialize(&x0, &Array1::from_vec(vec![]), 1.0).unwrap();
        storage.hj_computed = 0.25;
        storage.x_computed = interval_vector(&[0.5], &[0.75]).unwrap();
        storage.xval_computed = Array1::from_vec(vec![0.6]);
        storage.advance();

        assert_eq!(storage.time(), 1.25);
        assert_eq!(storage.steps[0], 0.25);
        assert_eq!(storage.xval[0], 0.6);
        assert_eq!(storage.xj_0, storage.x_computed);
    }
}
