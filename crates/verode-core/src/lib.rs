//! # VerODE Core
//!
//! Shared types for validated (set-valued) integration of parametric ODEs.
//!
//! ## Contents
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `interval` | Outward-rounded `Interval` plus vector/matrix helpers |
//! | `taylor` | `TaylorFunctor` contract, `LinearOde`, standard test problems |
//!
//! ## Design Philosophy
//!
//! 1. Every computed bound is rigorous: arithmetic rounds outward
//! 2. Enclosures are plain `ndarray` arrays of intervals so the usual
//!    `dot`, `mapv` and `Zip` machinery applies
//! 3. The Taylor operator is a trait; automatic differentiation of arbitrary
//!    right-hand sides lives behind it

pub mod interval;
pub mod taylor;

pub use interval::{
    hull_vectors, identity, interval_vector, intersect_vectors, is_subset, max_width, mid_matrix,
    mid_vector, norm_inf_bound, point_matrix, point_vector, IMatrix, IVector, Interval,
};
pub use taylor::{
    damped_oscillator, exponential_decay, harmonic_oscillator, parametric_decay, uncertain_decay,
    LinearOde, TaylorFunctor,
};

use thiserror::Error;

/// Common errors
#[derive(Debug, Error)]
pub enum VerodeError {
    #[error("Singular matrix: {0}")]
    SingularMatrix(String),

    #[error("Dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Empty intersection in component {0}")]
    EmptyIntersection(usize),

    #[error("Unsupported order {order} for {method}")]
    UnsupportedOrder { method: &'static str, order: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("A priori enclosure not found for step size {0}")]
    AprioriFailure(f64),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VerodeError>;

/// Time point
pub type Time = f64;

/// Floating-point state vector (anchor points)
pub type StateVector = ndarray::Array1<f64>;
