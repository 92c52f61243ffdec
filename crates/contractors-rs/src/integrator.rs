//! Fixed-step driver producing a trajectory of enclosures.

use crate::apriori::{apriori_enclosure, AprioriSettings};
use crate::storage::{ContractorStorage, StepResult, StepStatus};
use crate::StateContractor;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use verode_core::{max_width, IVector, Result, StateVector, TaylorFunctor, Time, VerodeError};

// ============================================================================
// SETTINGS
// ============================================================================

/// Fixed-step integration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    /// Step size
    pub step_size: f64,
    /// Number of steps
    pub steps: usize,
    /// A-priori enclosure search
    pub apriori: AprioriSettings,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            step_size: 0.01,
            steps: 100,
            apriori: AprioriSettings::default(),
        }
    }
}

impl IntegratorSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.step_size.is_finite() && self.step_size > 0.0) {
            return Err(VerodeError::InvalidConfiguration(format!(
                "step size must be positive, got {}",
                self.step_size
            )));
        }
        self.apriori.validate()
    }

    /// Final time reached from `t0`
    pub fn horizon(&self, t0: Time) -> Time {
        t0 + self.step_size * self.steps as f64
    }
}

// ============================================================================
// TRAJECTORY
// ============================================================================

/// Enclosures at every grid point, including the initial one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    pub times: Vec<Time>,
    pub enclosures: Vec<IVector>,
    pub anchors: Vec<StateVector>,
    pub status: StepStatus,
}

impl Trajectory {
    fn start(t0: Time, x0: &IVector, anchor: &StateVector) -> Self {
        Self {
            times: vec![t0],
            enclosures: vec![x0.clone()],
            anchors: vec![anchor.clone()],
            status: StepStatus::RelaxationNotCalled,
        }
    }

    fn record(&mut self, result: &StepResult) {
        self.times.push(result.t);
        self.enclosures.push(result.enclosure.clone());
        self.anchors.push(result.xj.clone());
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn final_enclosure(&self) -> Option<&IVector> {
        self.enclosures.last()
    }

    /// Widest component width over the whole run
    pub fn max_width(&self) -> f64 {
        self.enclosures.iter().map(max_width).fold(0.0, f64::max)
    }
}

// ============================================================================
// DRIVER
// ============================================================================

/// Runs a contractor over a uniform time grid.
///
/// Every step computes the a-priori enclosure, lets the contractor
/// contract it and advances the storage. Errors abort the run unchanged.
pub struct FixedStepIntegrator<C: StateContractor> {
    contractor: C,
    settings: IntegratorSettings,
}

impl<C: StateContractor> FixedStepIntegrator<C> {
    pub fn new(contractor: C, settings: IntegratorSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            contractor,
            settings,
        })
    }

    pub fn contractor(&self) -> &C {
        &self.contractor
    }

    pub fn settings(&self) -> &IntegratorSettings {
        &self.settings
    }

    pub fn integrate(&mut self, x0: &IVector, p: &IVector, t0: Time) -> Result<Trajectory> {
        let rhs = self.contractor.rhs();
        let (nx, np) = (rhs.state_dim(), rhs.param_dim());
        let mut storage = ContractorStorage::new(nx, np, self.contractor.required_history());
        storage.initialize(x0, p, t0)?;
        self.contractor.reset();

        let mut result = StepResult::new(nx);
        let mut trajectory = Trajectory::start(t0, x0, &storage.xval);
        let h = self.settings.step_size;
        info!(
            "{}: {} steps of {:.3e} from t={:.6}",
            self.contractor.method_name(),
            self.settings.steps,
            h,
            t0
        );

        for count in 0..self.settings.steps {
            storage.xj_apriori = apriori_enclosure(
                self.contractor.rhs(),
                &storage.xj_0,
                &storage.p,
                storage.time(),
                h,
                &self.settings.apriori,
            )?;
            storage.hj_computed = h;
            self.contractor.step(&mut storage, &mut result, count)?;
            debug!(
                "step {count}: t={:.6} width={:.3e}",
                result.t,
                max_width(&result.enclosure)
            );
            trajectory.record(&result);
            storage.advance();
        }

        result.status = StepStatus::Completed;
        trajectory.status = result.status;
        info!(
            "{}: reached t={:.6}, final width {:.3e}",
            self.contractor.method_name(),
            storage.time(),
            trajectory.final_enclosure().map(max_width).unwrap_or_default()
        );
        Ok(trajectory)
    }
}
