//! First-order a-priori enclosure by Picard iteration with inflation.

use log::trace;
use serde::{Deserialize, Serialize};
use verode_core::{
    hull_vectors, is_subset, max_width, IVector, Interval, Result, Time, TaylorFunctor, VerodeError,
};

/// Inflation schedule for the existence test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AprioriSettings {
    /// Relative widening per iteration
    pub inflation: f64,
    /// Absolute widening per iteration
    pub absolute: f64,
    /// Maximum number of widening iterations
    pub max_iterations: usize,
}

impl Default for AprioriSettings {
    fn default() -> Self {
        Self {
            inflation: 0.1,
            absolute: 1e-9,
            max_iterations: 20,
        }
    }
}

impl AprioriSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.inflation >= 0.0 && self.absolute > 0.0 && self.inflation.is_finite()) {
            return Err(VerodeError::InvalidConfiguration(format!(
                "a-priori inflation must be non-negative with a positive absolute floor, got {} / {}",
                self.inflation, self.absolute
            )));
        }
        if self.max_iterations == 0 {
            return Err(VerodeError::InvalidConfiguration(
                "a-priori search needs at least one iteration".into(),
            ));
        }
        Ok(())
    }
}

/// Enclosure of every solution starting in `x` over `[t, t + h]`.
///
/// Looks for a box `B` with `x + [0, h]·f(B, P) ⊆ B`; by the Picard–Lindelöf
/// argument all solutions then stay in `B`, and in fact in the tighter
/// `x + [0, h]·f(B, P)`, which is returned.
pub fn apriori_enclosure<F: TaylorFunctor>(
    rhs: &F,
    x: &IVector,
    p: &IVector,
    t: Time,
    h: f64,
    settings: &AprioriSettings,
) -> Result<IVector> {
    if !(h.is_finite() && h > 0.0) {
        return Err(VerodeError::AprioriFailure(h));
    }
    let span = Interval::new(0.0, h);
    let mut coeffs = rhs.coefficient_buffer(1);

    rhs.coefficients(&mut coeffs, x, p, t)?;
    let mut candidate = hull_vectors(x, &(x + &(&coeffs[1] * span)));

    for iteration in 0..settings.max_iterations {
        let trial = candidate.mapv(|c| c.inflate(settings.inflation * c.width() + settings.absolute));
        rhs.coefficients(&mut coeffs, &trial, p, t)?;
        let image = x + &(&coeffs[1] * span);
        if is_subset(&image, &trial) {
            trace!(
                "a-priori enclosure after {} iteration(s), width {:.3e}",
                iteration + 1,
                max_width(&image)
            );
            return Ok(image);
        }
        candidate = hull_vectors(&image, &trial);
    }
    Err(VerodeError::AprioriFailure(h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use verode_core::{exponential_decay, harmonic_oscillator, interval_vector, LinearOde};

    #[test]
    fn test_decay_enclosure_contains_flow() {
        let ode = exponential_decay(1.0);
        let x = interval_vector(&[0.99], &[1.01]).unwrap();
        let b = apriori_enclosure(&ode, &x, &Array1::from_vec(vec![]), 0.0, 0.01, &Default::default())
            .unwrap();
        assert!(is_subset(&x, &b));
        assert!(b[0].contains(0.99 * (-0.01f64).exp()));
        assert!(b[0].width() < 0.05);
    }

    #[test]
    fn test_oscillator_enclosure() {
        let ode = harmonic_oscillator(2.0);
        let x = interval_vector(&[1.0, 0.0], &[1.0, 0.0]).unwrap();
        let h = 0.05;
        let b = apriori_enclosure(&ode, &x, &Array1::from_vec(vec![]), 0.0, h, &Default::default())
            .unwrap();
        for i in 0..=10 {
            let t = h * i as f64 / 10.0;
            assert!(b[0].contains((2.0 * t).cos()));
            assert!(b[1].contains(-2.0 * (2.0 * t).sin()));
        }
    }

    #[test]
    fn test_step_too_large_fails() {
        // Stiff growth x' = 1e4 x cannot be validated over a long step
        let ode = LinearOde::from_matrix(ndarray::array![[1e4]]).unwrap();
        let x = interval_vector(&[1.0], &[1.0]).unwrap();
        let err = apriori_enclosure(&ode, &x, &Array1::from_vec(vec![]), 0.0, 1.0, &Default::default());
        assert!(matches!(err, Err(VerodeError::AprioriFailure(_))));
    }

    #[test]
    fn test_settings_validation() {
        assert!(AprioriSettings::default().validate().is_ok());
        let bad = AprioriSettings {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
