use crate::core::{EngineError, ResolutionSchedule};
use crate::evaluation::{Degeneracy, ResultSeries};
use log::warn;
use std::ops::RangeInclusive;

/// Lifecycle of an estimator: events are accepted until `eval`, results
/// only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Accumulating,
    Finalized,
}

/// Scale-dependent occupancy estimator fed one event at a time.
///
/// Implementations accumulate raw sums via [`add_event`], convert them once
/// via [`eval`], and answer [`series`] queries afterwards.
///
/// [`add_event`]: FluctuationEstimator::add_event
/// [`eval`]: FluctuationEstimator::eval
/// [`series`]: FluctuationEstimator::series
pub trait FluctuationEstimator {
    /// Short family name used in reports (`"bunching"`, `"factorial-moments"`).
    fn name(&self) -> &'static str;

    fn schedule(&self) -> &ResolutionSchedule;

    fn phase(&self) -> Phase;

    /// Number of events accumulated so far.
    fn events(&self) -> u64;

    /// Orders accepted by [`series`](FluctuationEstimator::series).
    fn orders(&self) -> RangeInclusive<usize>;

    /// Incorporates one event (the sample values of one observation).
    fn add_event(&mut self, sample: &[f64]) -> Result<(), EngineError>;

    /// Converts the raw sums into estimates and errors.
    ///
    /// Returns `Ok(false)` if any cell was degenerate and patched with a
    /// substitute constant; [`diagnostics`](FluctuationEstimator::diagnostics)
    /// lists them.
    fn eval(&mut self) -> Result<bool, EngineError>;

    fn diagnostics(&self) -> &[Degeneracy];

    /// Estimate of `order` per resolution, skipping the single-bin resolution.
    fn series(&self, order: usize) -> Result<ResultSeries, EngineError>;

    /// Every series worth reporting after `eval`.
    fn report_series(&self) -> Result<Vec<ResultSeries>, EngineError> {
        self.orders().map(|q| self.series(q)).collect()
    }
}

/// Estimators whose partial sums can be combined, e.g. one per thread.
pub trait Mergeable: FluctuationEstimator + Sized {
    /// Adds `other`'s sums and event count into `self`.
    ///
    /// Both sides must still be accumulating and share a configuration.
    fn merge(&mut self, other: &Self) -> Result<(), EngineError>;
}

/// Shared guard for query methods.
pub(crate) fn check_query(
    phase: Phase,
    order: usize,
    orders: RangeInclusive<usize>,
) -> Result<(), EngineError> {
    if phase != Phase::Finalized {
        warn!("result queried before eval()");
        return Err(EngineError::NotFinalized);
    }
    if !orders.contains(&order) {
        warn!(
            "order {order} outside [{}, {}]",
            orders.start(),
            orders.end()
        );
        return Err(EngineError::OrderOutOfRange {
            order,
            min: *orders.start(),
            max: *orders.end(),
        });
    }
    Ok(())
}
