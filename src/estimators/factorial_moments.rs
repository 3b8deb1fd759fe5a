use crate::core::{ConfigError, EngineError, OccupancyCounter, OrderTensor, ResolutionSchedule};
use crate::estimators::fluctuation_estimator::{
    FluctuationEstimator, Mergeable, Phase, check_query,
};
use crate::evaluation::{Degeneracy, DegeneracyKind, ResultSeries, SeriesPoint};
use log::{debug, warn};
use std::ops::RangeInclusive;

/// Number of falling-factorial orders tracked, whatever the caller asks for.
pub const FACTORIAL_ORDERS: usize = 5;

/// Lowest moment order reported.
pub const MIN_FACTORIAL_ORDER: usize = 2;

const NEGATIVE_VARIANCE_FLOOR: f64 = 0.1;

/// `k (k-1) ... (k-factors+1)`, zero when `k < factors`.
#[inline]
pub fn falling_factorial(k: u32, factors: usize) -> f64 {
    let k = k as usize;
    if k < factors {
        return 0.0;
    }
    (0..factors).map(|i| (k - i) as f64).product()
}

#[derive(Debug, Clone)]
struct Finalized {
    means: Vec<f64>,
    mean_errors: Vec<f64>,
    normalized: Vec<f64>,
    normalized_errors: Vec<f64>,
}

/// Factorial moments `F(q) = <k (k-1) ... (k-q+1)>` of sub-bin occupancy `k`
/// and their normalized form `F(q) / <k>^q`, per resolution.
///
/// Slot `n` of the internal sums holds the falling factorial with `n + 1`
/// factors, so slot 0 is the occupancy itself; the public API speaks in
/// moment orders `q = n + 1`.
#[derive(Debug, Clone)]
pub struct FactorialMoments {
    schedule: ResolutionSchedule,
    events: u64,
    powers: OrderTensor<f64>,
    squares: OrderTensor<f64>,
    counter: OccupancyCounter,
    results: Option<Finalized>,
    diagnostics: Vec<Degeneracy>,
}

impl FactorialMoments {
    /// `requested_order` is accepted for symmetry with
    /// [`BunchingParameters`](crate::estimators::BunchingParameters) but always
    /// replaced by [`FACTORIAL_ORDERS`]; a differing request is logged.
    pub fn new(
        requested_order: usize,
        resolutions: usize,
        step: usize,
        min: f64,
        max: f64,
    ) -> Result<Self, ConfigError> {
        if requested_order != FACTORIAL_ORDERS {
            warn!(
                "factorial moments track {FACTORIAL_ORDERS} orders; requested order {requested_order} ignored"
            );
        }
        let schedule = ResolutionSchedule::new(resolutions, step, min, max)?;

        Ok(Self {
            powers: OrderTensor::zeros(FACTORIAL_ORDERS, &schedule),
            squares: OrderTensor::zeros(FACTORIAL_ORDERS, &schedule),
            counter: OccupancyCounter::new(&schedule),
            schedule,
            events: 0,
            results: None,
            diagnostics: Vec::new(),
        })
    }

    /// Raw factorial moment `F(q)` per resolution.
    pub fn factorial_moment(&self, order: usize) -> Result<ResultSeries, EngineError> {
        check_query(self.phase(), order, self.orders())?;
        self.build_series(format!("FM({order})"), order - 1, false)
    }

    /// Normalized factorial moment `F(q) / <k>^q` per resolution.
    pub fn normalized_moment(&self, order: usize) -> Result<ResultSeries, EngineError> {
        check_query(self.phase(), order, self.orders())?;
        self.build_series(format!("NFM({order})"), order - 1, true)
    }

    /// Mean occupancy `<k>` per resolution.
    pub fn mean_occupancy(&self) -> Result<ResultSeries, EngineError> {
        if self.results.is_none() {
            warn!("mean occupancy queried before eval()");
            return Err(EngineError::NotFinalized);
        }
        self.build_series("<k>".to_string(), 0, false)
    }

    fn build_series(
        &self,
        label: String,
        slot: usize,
        normalized: bool,
    ) -> Result<ResultSeries, EngineError> {
        let Some(results) = self.results.as_ref() else {
            return Err(EngineError::NotFinalized);
        };
        let (values, errors) = if normalized {
            (&results.normalized, &results.normalized_errors)
        } else {
            (&results.means, &results.mean_errors)
        };
        let r = self.schedule.len();
        let points = self
            .schedule
            .iter()
            .enumerate()
            .skip(1)
            .map(|(m, resolution)| SeriesPoint {
                sub_bins: resolution.sub_bins(),
                value: values[slot * r + m],
                error: errors[slot * r + m],
            })
            .collect();
        Ok(ResultSeries::new(label, points))
    }
}

impl FluctuationEstimator for FactorialMoments {
    fn name(&self) -> &'static str {
        "factorial-moments"
    }

    fn schedule(&self) -> &ResolutionSchedule {
        &self.schedule
    }

    fn phase(&self) -> Phase {
        if self.results.is_some() {
            Phase::Finalized
        } else {
            Phase::Accumulating
        }
    }

    fn events(&self) -> u64 {
        self.events
    }

    fn orders(&self) -> RangeInclusive<usize> {
        MIN_FACTORIAL_ORDER..=FACTORIAL_ORDERS
    }

    fn add_event(&mut self, sample: &[f64]) -> Result<(), EngineError> {
        if self.results.is_some() {
            return Err(EngineError::AlreadyFinalized);
        }
        self.events += 1;

        for (m, resolution) in self.schedule.iter().enumerate() {
            let occupancy = self.counter.count(resolution, sample);
            for n in 0..FACTORIAL_ORDERS {
                let powers = self.powers.row_mut(n, m);
                let squares = self.squares.row_mut(n, m);
                for ((p, s), &k) in powers.iter_mut().zip(squares.iter_mut()).zip(occupancy) {
                    let f = falling_factorial(k, n + 1);
                    *p += f;
                    *s += f * f;
                }
            }
        }
        Ok(())
    }

    fn eval(&mut self) -> Result<bool, EngineError> {
        if self.results.is_some() {
            return Err(EngineError::AlreadyFinalized);
        }
        let r = self.schedule.len();
        let size = FACTORIAL_ORDERS * r;
        let mut means = vec![0.0; size];
        let mut mean_errors = vec![0.0; size];
        let mut normalized = vec![0.0; size];
        let mut normalized_errors = vec![0.0; size];
        let mut diagnostics = Vec::new();

        let dof = self.events.saturating_sub(1) as f64;
        for (m, resolution) in self.schedule.iter().enumerate() {
            let sub_bins = resolution.sub_bins();
            if self.events < 2 {
                diagnostics.push(Degeneracy {
                    resolution: m,
                    sub_bins,
                    order: 1,
                    kind: DegeneracyKind::InsufficientEvents,
                });
            }
            let cells = self.events as f64 * sub_bins as f64;
            let mean_of = |t: &OrderTensor<f64>, n: usize| {
                if self.events == 0 {
                    0.0
                } else {
                    t.row_sum(n, m) / cells
                }
            };
            let fa0 = mean_of(&self.powers, 0);

            for n in 0..FACTORIAL_ORDERS {
                let fa = mean_of(&self.powers, n);
                let ea = mean_of(&self.squares, n);
                let mut variance = ea - fa * fa;
                if variance < 0.0 {
                    diagnostics.push(Degeneracy {
                        resolution: m,
                        sub_bins,
                        order: n + 1,
                        kind: DegeneracyKind::NegativeVariance,
                    });
                    variance = NEGATIVE_VARIANCE_FLOOR;
                }

                let i = n * r + m;
                means[i] = fa;
                if dof > 0.0 {
                    mean_errors[i] = (variance / dof).sqrt();
                }

                if n == 0 {
                    normalized[i] = 1.0;
                    continue;
                }
                if fa0 == 0.0 {
                    diagnostics.push(Degeneracy {
                        resolution: m,
                        sub_bins,
                        order: n + 1,
                        kind: DegeneracyKind::ZeroMeanOccupancy,
                    });
                    continue;
                }
                let power = (n + 1) as i32;
                normalized[i] = fa / fa0.powi(power);
                if dof > 0.0 {
                    normalized_errors[i] = (variance / (dof * fa0.powi(2 * power))).sqrt();
                }
            }
        }

        if !diagnostics.is_empty() {
            warn!(
                "factorial moments: {} degenerate cells patched after {} events",
                diagnostics.len(),
                self.events
            );
            for d in &diagnostics {
                debug!("{d}");
            }
        }
        self.diagnostics = diagnostics;
        self.results = Some(Finalized {
            means,
            mean_errors,
            normalized,
            normalized_errors,
        });
        Ok(self.diagnostics.is_empty())
    }

    fn diagnostics(&self) -> &[Degeneracy] {
        &self.diagnostics
    }

    fn series(&self, order: usize) -> Result<ResultSeries, EngineError> {
        self.normalized_moment(order)
    }

    fn report_series(&self) -> Result<Vec<ResultSeries>, EngineError> {
        let mut out = vec![self.mean_occupancy()?];
        for q in self.orders() {
            out.push(self.factorial_moment(q)?);
        }
        for q in self.orders() {
            out.push(self.normalized_moment(q)?);
        }
        Ok(out)
    }
}

impl Mergeable for FactorialMoments {
    fn merge(&mut self, other: &Self) -> Result<(), EngineError> {
        if self.results.is_some() || other.results.is_some() {
            return Err(EngineError::AlreadyFinalized);
        }
        if self.schedule != other.schedule {
            return Err(EngineError::IncompatibleMerge);
        }
        if !(self.powers.merge(&other.powers) && self.squares.merge(&other.squares)) {
            return Err(EngineError::IncompatibleMerge);
        }
        self.events += other.events;
        Ok(())
    }
}
