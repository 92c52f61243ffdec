//! Building blocks shared by the contractors: step-size powers, weighted
//! Taylor sums, the affine delta recursion and the storage commit.

use crate::qr::QrDenseStorage;
use crate::storage::{ContractorStorage, StepResult, StepStatus};
use log::debug;
use std::convert::Infallible;
use verode_core::{
    intersect_vectors, is_subset, max_width, IMatrix, IVector, Interval, Result, TaylorFunctor,
    VerodeError,
};

/// Validate that `storage` is initialized for the dimensions of `rhs`
pub(crate) fn check_storage<F: TaylorFunctor>(rhs: &F, storage: &ContractorStorage) -> Result<()> {
    if storage.state_dim() != rhs.state_dim() {
        return Err(VerodeError::DimensionMismatch {
            context: "storage state",
            expected: rhs.state_dim(),
            found: storage.state_dim(),
        });
    }
    if storage.param_dim() != rhs.param_dim() {
        return Err(VerodeError::DimensionMismatch {
            context: "storage parameters",
            expected: rhs.param_dim(),
            found: storage.param_dim(),
        });
    }
    storage.check_ready()
}

/// `[1, h, h², …, h^order]` as thin intervals with rigorous rounding
pub(crate) fn step_powers(h: f64, order: usize) -> Vec<Interval> {
    let h = Interval::point(h);
    let mut powers = Vec::with_capacity(order + 1);
    let mut acc = Interval::ONE;
    for _ in 0..=order {
        powers.push(acc);
        acc = acc * h;
    }
    powers
}

/// `Σ w_i · terms_i`
pub(crate) fn weighted_sum(out: &mut IVector, terms: &[IVector], weights: &[Interval]) {
    out.fill(Interval::ZERO);
    for (term, &w) in terms.iter().zip(weights) {
        out.scaled_add(w, term);
    }
}

/// `Σ w_i · mats_i`
pub(crate) fn weighted_matrix_sum(out: &mut IMatrix, mats: &[IMatrix], weights: &[Interval]) {
    out.fill(Interval::ZERO);
    for (mat, &w) in mats.iter().zip(weights) {
        out.scaled_add(w, mat);
    }
}

/// `base + M·Δ + Jp·dP`
pub(crate) fn affine_enclosure(
    base: &IVector,
    m: &IMatrix,
    delta: &IVector,
    jp: &IMatrix,
    dp: &IVector,
) -> IVector {
    let mut x = base + &m.dot(delta);
    if !dp.is_empty() {
        x += &jp.dot(dp);
    }
    x
}

/// `Q⁻¹·centered + (Q⁻¹M)·Δ + (Q⁻¹Jp)·dP` with `Q⁻¹` taken from the
/// rigorous inverse bounds of the new preconditioner
pub(crate) fn affine_delta(
    qr: &QrDenseStorage,
    centered: &IVector,
    m: &IMatrix,
    delta: &IVector,
    jp: &IMatrix,
    dp: &IVector,
) -> IVector {
    let qinv = qr.inv_bounds();
    let mut next = qinv.dot(centered);
    next += &qinv.dot(m).dot(delta);
    if !dp.is_empty() {
        next += &qinv.dot(jp).dot(dp);
    }
    next
}

/// Intersect a candidate enclosure with its bounding set
pub(crate) fn tighten(candidate: &IVector, bound: &IVector, method: &str) -> Result<IVector> {
    if !is_subset(candidate, bound) {
        debug!(
            "{method}: enclosure (width {:.3e}) clipped to bound (width {:.3e})",
            max_width(candidate),
            max_width(bound)
        );
    }
    intersect_vectors(candidate, bound)
}

/// Publish a finished step: push the new preconditioner and delta onto the
/// storage histories and write the outputs.
///
/// Nothing in here can fail, so a step is either fully applied or not at all.
/// `qr` receives the evicted preconditioner for reuse as scratch.
pub(crate) fn commit(
    storage: &mut ContractorStorage,
    result: &mut StepResult,
    qr: &mut QrDenseStorage,
    delta: &IVector,
    enclosure: &IVector,
    anchor: &ndarray::Array1<f64>,
) -> StepStatus {
    storage.a.push_swap(qr);
    let pushed = storage.delta.cycle_evaluate(|slot| {
        slot.clone_from(delta);
        Ok::<(), Infallible>(())
    });
    if let Err(never) = pushed {
        match never {}
    }
    storage.x_computed.assign(enclosure);
    storage.xval_computed.assign(anchor);

    let status = StepStatus::RelaxationNotCalled;
    result.status = status;
    result.hj = storage.hj_computed;
    result.t = storage.time() + storage.hj_computed;
    result.xj.clone_from(anchor);
    result.enclosure.clone_from(enclosure);
    status
}
