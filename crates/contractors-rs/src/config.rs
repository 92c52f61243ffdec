//! Serializable method and run configuration.

use crate::adams_moulton::MAX_ADAMS_MOULTON_STEPS;
use crate::integrator::IntegratorSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use verode_core::{Result, VerodeError};

fn default_bootstrap_order() -> usize {
    4
}

fn default_refinements() -> usize {
    2
}

/// Contractor selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum MethodConfig {
    /// Taylor method of the given order
    Lohner { order: usize },
    /// Explicit order `p`, implicit order `q`
    HermiteObreschkoff { p: usize, q: usize },
    /// `steps`-step corrector bootstrapped by Lohner of Taylor order `order`
    AdamsMoulton {
        steps: usize,
        #[serde(default = "default_bootstrap_order")]
        order: usize,
        #[serde(default = "default_refinements")]
        refinements: usize,
        /// Variable-step coefficients (not available)
        #[serde(default)]
        variable_step: bool,
    },
}

impl Default for MethodConfig {
    fn default() -> Self {
        MethodConfig::Lohner { order: 4 }
    }
}

impl MethodConfig {
    pub fn name(&self) -> &'static str {
        match self {
            MethodConfig::Lohner { .. } => "lohner",
            MethodConfig::HermiteObreschkoff { .. } => "hermite-obreschkoff",
            MethodConfig::AdamsMoulton { .. } => "adams-moulton",
        }
    }

    /// Reject settings no contractor can be built for
    pub fn validate(&self) -> Result<()> {
        match *self {
            MethodConfig::Lohner { order } if order == 0 => Err(VerodeError::UnsupportedOrder {
                method: "lohner",
                order,
            }),
            MethodConfig::HermiteObreschkoff { p, .. } if p == 0 => {
                Err(VerodeError::UnsupportedOrder {
                    method: "hermite-obreschkoff",
                    order: p,
                })
            }
            MethodConfig::AdamsMoulton {
                steps,
                order,
                variable_step,
                ..
            } => {
                if variable_step {
                    return Err(VerodeError::InvalidConfiguration(
                        "adams-moulton coefficients for variable step sizes are not supported"
                            .into(),
                    ));
                }
                if steps == 0 || steps > MAX_ADAMS_MOULTON_STEPS {
                    return Err(VerodeError::UnsupportedOrder {
                        method: "adams-moulton",
                        order: steps,
                    });
                }
                if order == 0 {
                    return Err(VerodeError::UnsupportedOrder {
                        method: "lohner",
                        order,
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Method plus integration settings, as read from a JSON file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub method: MethodConfig,
    pub integrator: IntegratorSettings,
}

impl RunConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: RunConfig = serde_json::from_str(text)
            .map_err(|e| VerodeError::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.method.validate()?;
        self.integrator.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RunConfig::default().validate().is_ok());
        assert_eq!(MethodConfig::default().name(), "lohner");
    }

    #[test]
    fn test_tagged_json() {
        let config = RunConfig::from_json(
            r#"{
                "method": { "method": "adams_moulton", "steps": 3 },
                "integrator": { "step_size": 0.05, "steps": 40 }
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.method,
            MethodConfig::AdamsMoulton {
                steps: 3,
                order: 4,
                refinements: 2,
                variable_step: false
            }
        );
        assert_eq!(config.integrator.steps, 40);
        assert_eq!(config.integrator.apriori.max_iterations, 20);
    }

    #[test]
    fn test_invalid_configurations() {
        assert!(MethodConfig::Lohner { order: 0 }.validate().is_err());
        assert!(MethodConfig::HermiteObreschkoff { p: 0, q: 3 }.validate().is_err());
        let variable = MethodConfig::AdamsMoulton {
            steps: 3,
            order: 4,
            refinements: 2,
            variable_step: true,
        };
        assert!(matches!(
            variable.validate(),
            Err(VerodeError::InvalidConfiguration(_))
        ));
        let too_many = MethodConfig::AdamsMoulton {
            steps: 12,
            order: 4,
            refinements: 2,
            variable_step: false,
        };
        assert!(matches!(
            too_many.validate(),
            Err(VerodeError::UnsupportedOrder { order: 12, .. })
        ));
        assert!(RunConfig::from_json(r#"{"method": {"method": "euler"}}"#).is_err());
    }
}
