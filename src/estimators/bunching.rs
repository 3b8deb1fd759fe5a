use crate::core::{
    ConfigError, CrossSums, EngineError, OccupancyCounter, OrderTensor, ResolutionSchedule,
};
use crate::estimators::fluctuation_estimator::{
    FluctuationEstimator, Mergeable, Phase, check_query,
};
use crate::evaluation::{Degeneracy, DegeneracyKind, ResultSeries, SeriesPoint};
use log::{debug, error, warn};
use std::ops::RangeInclusive;

/// Lowest bunching-parameter order.
pub const MIN_BUNCHING_ORDER: usize = 2;

/// Stand-in for a zero denominator rate when propagating errors.
const ZERO_RATE_SUBSTITUTE: f64 = 0.00001;

#[derive(Debug, Clone)]
struct Finalized {
    rates: Vec<f64>,
    covariances: Vec<f64>,
    values: Vec<f64>,
    errors: Vec<f64>,
}

/// Bunching parameters across a family of resolutions.
///
/// For order `q` and resolution `m`,
/// `BP(q) = q/(q-1) * H[q] * H[q-2] / H[q-1]^2`, where `H[n]` is the
/// fraction of (event, sub-bin) cells holding exactly `n` samples. Poisson
/// occupancy gives `BP(q) = 1` at every order and scale.
///
/// Errors come from the delta method applied to the covariance matrix of
/// the `H` means, which is why every pair of indicator orders keeps its own
/// cross sum.
#[derive(Debug, Clone)]
pub struct BunchingParameters {
    schedule: ResolutionSchedule,
    order: usize,
    max_order: usize,
    events: u64,
    history: OrderTensor<u64>,
    cross: CrossSums,
    counter: OccupancyCounter,
    indicators: Vec<u8>,
    results: Option<Finalized>,
    diagnostics: Vec<Degeneracy>,
}

impl BunchingParameters {
    /// `order` is the highest bunching parameter to compute (`>= 2`).
    pub fn new(
        order: usize,
        resolutions: usize,
        step: usize,
        min: f64,
        max: f64,
    ) -> Result<Self, ConfigError> {
        if order < MIN_BUNCHING_ORDER {
            let e = ConfigError::OrderTooLow {
                order,
                min: MIN_BUNCHING_ORDER,
            };
            error!("rejecting bunching parameters: {e}");
            return Err(e);
        }
        let schedule = ResolutionSchedule::new(resolutions, step, min, max)?;
        let max_order = order + 1;

        Ok(Self {
            history: OrderTensor::zeros(max_order, &schedule),
            cross: CrossSums::zeros(max_order, &schedule),
            counter: OccupancyCounter::new(&schedule),
            indicators: vec![0; max_order * schedule.max_sub_bins()],
            schedule,
            order,
            max_order,
            events: 0,
            results: None,
            diagnostics: Vec::new(),
        })
    }

    /// Highest bunching-parameter order computed.
    pub fn order(&self) -> usize {
        self.order
    }

    /// `H[n]` for one resolution, available after `eval`.
    pub fn rate(&self, n: usize, resolution: usize) -> Option<f64> {
        let r = self.schedule.len();
        let results = self.results.as_ref()?;
        (n < self.max_order && resolution < r).then(|| results.rates[n * r + resolution])
    }

    /// Covariance of the `H[a]` and `H[b]` means, available after `eval`.
    pub fn covariance(&self, a: usize, b: usize, resolution: usize) -> Option<f64> {
        let r = self.schedule.len();
        let results = self.results.as_ref()?;
        (a < self.max_order && b < self.max_order && resolution < r)
            .then(|| results.covariances[(a * self.max_order + b) * r + resolution])
    }

    fn rates(&self) -> Vec<f64> {
        let r = self.schedule.len();
        let mut rates = vec![0.0; self.max_order * r];
        if self.events == 0 {
            return rates;
        }
        for (m, resolution) in self.schedule.iter().enumerate() {
            let cells = self.events as f64 * resolution.sub_bins() as f64;
            for n in 0..self.max_order {
                rates[n * r + m] = self.history.row_sum(n, m) as f64 / cells;
            }
        }
        rates
    }

    fn covariances(&self, rates: &[f64]) -> Vec<f64> {
        let r = self.schedule.len();
        let k = self.max_order;
        let mut covariances = vec![0.0; k * k * r];
        for (m, resolution) in self.schedule.iter().enumerate() {
            for a in 0..k {
                for b in 0..k {
                    covariances[(a * k + b) * r + m] = self.cross.covariance_of_means(
                        a,
                        b,
                        m,
                        resolution.sub_bins(),
                        self.events,
                        rates[a * r + m],
                        rates[b * r + m],
                    );
                }
            }
        }
        covariances
    }
}

/// Covariances of the three means entering one bunching parameter:
/// `p` = `H[q]`, `z` = `H[q-1]`, `m` = `H[q-2]`.
#[derive(Debug, Clone, Copy)]
struct RateCovariances {
    pp: f64,
    mm: f64,
    zz: f64,
    pm: f64,
    pz: f64,
    mz: f64,
}

/// Delta-method variance of `hp * hm / h0^2`.
fn ratio_variance(hp: f64, h0: f64, hm: f64, c: &RateCovariances) -> f64 {
    let h0_2 = h0 * h0;
    let h0_4 = h0_2 * h0_2;
    let h0_5 = h0_4 * h0;
    let h0_6 = h0_4 * h0_2;

    let a1 = hm * hm / h0_4 * c.pp;
    let a2 = hp * hp / h0_4 * c.mm;
    let a3 = 4.0 * hp * hp * hm * hm / h0_6 * c.zz;
    let a4 = 2.0 * hp * hm / h0_4 * c.pm;
    let a5 = 4.0 * hp * hm * hm / h0_5 * c.pz;
    let a6 = 4.0 * hp * hp * hm / h0_5 * c.mz;
    a1 + a2 + a3 + a4 - a5 - a6
}

impl FluctuationEstimator for BunchingParameters {
    fn name(&self) -> &'static str {
        "bunching"
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
        MIN_BUNCHING_ORDER..=self.order
    }

    fn add_event(&mut self, sample: &[f64]) -> Result<(), EngineError> {
        if self.results.is_some() {
            return Err(EngineError::AlreadyFinalized);
        }
        self.events += 1;

        let stride = self.schedule.max_sub_bins();
        for (m, resolution) in self.schedule.iter().enumerate() {
            let occupancy = self.counter.count(resolution, sample);
            for n in 0..self.max_order {
                let start = n * stride;
                let row = &mut self.indicators[start..start + resolution.sub_bins()];
                for (w, &k) in row.iter_mut().zip(occupancy) {
                    *w = u8::from(k as usize == n);
                }
                for (cell, &w) in self.history.row_mut(n, m).iter_mut().zip(row.iter()) {
                    *cell += u64::from(w);
                }
            }
            self.cross.accumulate(m, &self.indicators, stride);
        }
        Ok(())
    }

    fn eval(&mut self) -> Result<bool, EngineError> {
        if self.results.is_some() {
            return Err(EngineError::AlreadyFinalized);
        }
        let r = self.schedule.len();
        let k = self.max_order;
        let rates = self.rates();
        let covariances = self.covariances(&rates);
        let mut values = vec![0.0; k * r];
        let mut errors = vec![0.0; k * r];
        let mut diagnostics = Vec::new();

        for (m, resolution) in self.schedule.iter().enumerate() {
            let h = |n: usize| rates[n * r + m];
            let ce = |a: usize, b: usize| covariances[(a * k + b) * r + m];

            for q in MIN_BUNCHING_ORDER..k {
                let (hp, mut h0, hm) = (h(q), h(q - 1), h(q - 2));
                let scale = q as f64 / (q - 1) as f64;

                let value = if h0 == 0.0 {
                    diagnostics.push(Degeneracy {
                        resolution: m,
                        sub_bins: resolution.sub_bins(),
                        order: q,
                        kind: DegeneracyKind::ZeroRate,
                    });
                    h0 = ZERO_RATE_SUBSTITUTE;
                    -1.0
                } else {
                    scale * hp * hm / (h0 * h0)
                };

                let c = RateCovariances {
                    pp: ce(q, q),
                    mm: ce(q - 2, q - 2),
                    zz: ce(q - 1, q - 1),
                    pm: ce(q, q - 2),
                    pz: ce(q, q - 1),
                    mz: ce(q - 2, q - 1),
                };
                // rounding can push a near-zero quadratic form below zero
                let variance = ratio_variance(hp, h0, hm, &c).max(0.0);

                values[q * r + m] = value;
                errors[q * r + m] = scale * variance.sqrt();
            }
        }

        if !diagnostics.is_empty() {
            warn!(
                "bunching parameters: {} degenerate cells patched after {} events",
                diagnostics.len(),
                self.events
            );
            for d in &diagnostics {
                debug!("{d}");
            }
        }
        self.diagnostics = diagnostics;
        self.results = Some(Finalized {
            rates,
            covariances,
            values,
            errors,
        });
        Ok(self.diagnostics.is_empty())
    }

    fn diagnostics(&self) -> &[Degeneracy] {
        &self.diagnostics
    }

    fn series(&self, order: usize) -> Result<ResultSeries, EngineError> {
        check_query(self.phase(), order, self.orders())?;
        let Some(results) = self.results.as_ref() else {
            return Err(EngineError::NotFinalized);
        };
        let r = self.schedule.len();
        let points = self
            .schedule
            .iter()
            .enumerate()
            .skip(1)
            .map(|(m, resolution)| SeriesPoint {
                sub_bins: resolution.sub_bins(),
                value: results.values[order * r + m],
                error: results.errors[order * r + m],
            })
            .collect();
        Ok(ResultSeries::new(format!("BP({order})"), points))
    }
}

impl Mergeable for BunchingParameters {
    fn merge(&mut self, other: &Self) -> Result<(), EngineError> {
        if self.results.is_some() || other.results.is_some() {
            return Err(EngineError::AlreadyFinalized);
        }
        if self.order != other.order || self.schedule != other.schedule {
            return Err(EngineError::IncompatibleMerge);
        }
        if !(self.history.merge(&other.history) && self.cross.merge(&other.cross)) {
            return Err(EngineError::IncompatibleMerge);
        }
        self.events += other.events;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::EventStream;
    use crate::streams::generators::PoissonEventGenerator;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() <= eps
    }

    fn fed(order: usize, events: &[Vec<f64>]) -> BunchingParameters {
        let mut bp = BunchingParameters::new(order, 4, 2, 0.0, 1.0).unwrap();
        for e in events {
            bp.add_event(e).unwrap();
        }
        bp
    }

    fn some_events() -> Vec<Vec<f64>> {
        (0..200)
            .map(|i| {
                (0..(i % 7))
                    .map(|k| ((i * 31 + k * 17) % 97) as f64 / 97.0)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn rejects_bad_configuration() {
        assert_eq!(
            BunchingParameters::new(1, 3, 1, 0.0, 1.0).unwrap_err(),
            ConfigError::OrderTooLow { order: 1, min: 2 }
        );
        assert_eq!(
            BunchingParameters::new(3, 1, 1, 0.0, 1.0).unwrap_err(),
            ConfigError::TooFewResolutions(1)
        );
    }

    #[test]
    fn single_central_sample_scenario() {
        let mut bp = BunchingParameters::new(3, 3, 1, 0.0, 10.0).unwrap();
        for _ in 0..1000 {
            bp.add_event(&[5.0]).unwrap();
        }
        assert!(!bp.eval().unwrap());
        assert_eq!(bp.events(), 1000);

        for (m, resolution) in bp.schedule().iter().enumerate() {
            let sub_bins = resolution.sub_bins() as f64;
            assert!(approx_eq(bp.rate(1, m).unwrap(), 1.0 / sub_bins, 1e-12));
            assert!(approx_eq(bp.rate(0, m).unwrap(), (sub_bins - 1.0) / sub_bins, 1e-12));
            assert_eq!(bp.rate(2, m), Some(0.0));
            assert_eq!(bp.rate(3, m), Some(0.0));
        }

        let bp2 = bp.series(2).unwrap();
        assert!(bp2.iter().all(|p| p.value == 0.0 && p.error == 0.0));

        let bp3 = bp.series(3).unwrap();
        assert_eq!(bp3.sub_bins(), vec![2, 3]);
        assert!(bp3.iter().all(|p| p.value == -1.0));

        let d = bp.diagnostics();
        assert_eq!(d.len(), 3);
        assert!(
            d.iter()
                .all(|d| d.order == 3 && d.kind == DegeneracyKind::ZeroRate)
        );
    }

    #[test]
    fn empty_events_are_degenerate() {
        let mut bp = BunchingParameters::new(2, 3, 1, 0.0, 1.0).unwrap();
        for _ in 0..10 {
            bp.add_event(&[]).unwrap();
        }
        assert!(!bp.eval().unwrap());
        assert_eq!(bp.rate(0, 2), Some(1.0));
        assert!(bp.series(2).unwrap().iter().all(|p| p.value == -1.0));
    }

    #[test]
    fn hand_computed_two_events() {
        let mut bp = BunchingParameters::new(2, 2, 1, 0.0, 1.0).unwrap();
        bp.add_event(&[0.1, 0.6]).unwrap();
        bp.add_event(&[0.2, 0.3]).unwrap();
        assert!(!bp.eval().unwrap());

        assert_eq!(bp.rate(0, 1), Some(0.25));
        assert_eq!(bp.rate(1, 1), Some(0.5));
        assert_eq!(bp.rate(2, 1), Some(0.25));
        // indicators of different occupancies are mutually exclusive
        assert!(approx_eq(bp.covariance(0, 2, 1).unwrap(), -0.25 * 0.25 / 4.0, 1e-15));
        assert!(approx_eq(bp.covariance(1, 1, 1).unwrap(), 0.25 / 4.0, 1e-15));

        let s = bp.series(2).unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s.points()[0].sub_bins, 2);
        assert!(approx_eq(s.points()[0].value, 0.5, 1e-12));

        // the single-bin resolution always holds two samples: H[1] == 0
        assert_eq!(bp.diagnostics().len(), 1);
        assert_eq!(bp.diagnostics()[0].resolution, 0);
    }

    #[test]
    fn ratio_variance_matches_numeric_gradient() {
        let (hp, h0, hm) = (0.12, 0.3, 0.45);
        let f = |p: f64, z: f64, m: f64| p * m / (z * z);
        let eps = 1e-7;
        let g = [
            (f(hp + eps, h0, hm) - f(hp - eps, h0, hm)) / (2.0 * eps),
            (f(hp, h0 + eps, hm) - f(hp, h0 - eps, hm)) / (2.0 * eps),
            (f(hp, h0, hm + eps) - f(hp, h0, hm - eps)) / (2.0 * eps),
        ];
        // order: p, z, m
        let cov = [
            [2.0e-4, 3.0e-5, -4.0e-5],
            [3.0e-5, 1.5e-4, -2.0e-5],
            [-4.0e-5, -2.0e-5, 3.0e-4],
        ];
        let mut expected = 0.0;
        for i in 0..3 {
            for j in 0..3 {
                expected += g[i] * g[j] * cov[i][j];
            }
        }
        let c = RateCovariances {
            pp: cov[0][0],
            zz: cov[1][1],
            mm: cov[2][2],
            pz: cov[0][1],
            pm: cov[0][2],
            mz: cov[2][1],
        };
        let got = ratio_variance(hp, h0, hm, &c);
        assert!(approx_eq(got, expected, 1e-9 * expected.abs().max(1.0)));
    }

    #[test]
    fn lifecycle_is_enforced() {
        let mut bp = BunchingParameters::new(3, 3, 1, 0.0, 1.0).unwrap();
        bp.add_event(&[0.5]).unwrap();
        assert_eq!(bp.phase(), Phase::Accumulating);
        assert_eq!(bp.series(2).unwrap_err(), EngineError::NotFinalized);
        assert!(bp.rate(0, 0).is_none());

        bp.eval().unwrap();
        assert_eq!(bp.phase(), Phase::Finalized);
        assert_eq!(bp.add_event(&[0.5]), Err(EngineError::AlreadyFinalized));
        assert_eq!(bp.eval(), Err(EngineError::AlreadyFinalized));
        assert_eq!(bp.events(), 1);

        assert_eq!(
            bp.series(1).unwrap_err(),
            EngineError::OrderOutOfRange {
                order: 1,
                min: 2,
                max: 3
            }
        );
        assert!(bp.series(4).is_err());
        assert!(bp.series(3).is_ok());
    }

    #[test]
    fn series_skip_single_bin_resolution() {
        let mut bp = fed(3, &some_events());
        bp.eval().unwrap();
        for q in bp.orders() {
            let s = bp.series(q).unwrap();
            assert_eq!(s.len(), 3);
            assert_eq!(s.sub_bins(), vec![3, 5, 7]);
        }
        assert_eq!(bp.report_series().unwrap().len(), 2);
    }

    #[test]
    fn deterministic_results() {
        let events = some_events();
        let mut a = fed(3, &events);
        let mut b = fed(3, &events);
        assert_eq!(a.eval(), b.eval());
        for q in a.orders() {
            assert_eq!(a.series(q).unwrap(), b.series(q).unwrap());
        }
    }

    #[test]
    fn merged_shards_equal_sequential_run() {
        let events = some_events();
        let mut whole = fed(3, &events);
        let mut left = fed(3, &events[..77]);
        let right = fed(3, &events[77..]);
        left.merge(&right).unwrap();
        assert_eq!(left.events(), whole.events());

        assert_eq!(left.eval(), whole.eval());
        for q in whole.orders() {
            assert_eq!(left.series(q).unwrap(), whole.series(q).unwrap());
        }
    }

    #[test]
    fn merge_rejects_mismatches() {
        let mut a = fed(3, &[]);
        let b = fed(2, &[]);
        assert_eq!(a.merge(&b), Err(EngineError::IncompatibleMerge));

        let c = BunchingParameters::new(3, 4, 2, 0.0, 2.0).unwrap();
        assert_eq!(a.merge(&c), Err(EngineError::IncompatibleMerge));

        let mut d = fed(3, &[]);
        d.eval().unwrap();
        assert_eq!(a.merge(&d), Err(EngineError::AlreadyFinalized));
    }

    #[test]
    fn poisson_occupancy_gives_unit_bunching() {
        let mut bp = BunchingParameters::new(3, 5, 1, 0.0, 1.0).unwrap();
        let mut stream = PoissonEventGenerator::new(2.0, 0.0, 1.0, Some(50_000), 7).unwrap();
        while let Some(event) = stream.next_event() {
            bp.add_event(&event).unwrap();
        }
        assert!(bp.eval().unwrap());

        for (q, tolerance) in [(2, 0.15), (3, 0.25)] {
            for p in bp.series(q).unwrap().iter() {
                assert!(
                    approx_eq(p.value, 1.0, tolerance),
                    "BP({q}) at {} sub-bins = {} ± {}",
                    p.sub_bins,
                    p.value,
                    p.error
                );
                assert!(p.error > 0.0 && p.error < 0.2);
            }
        }
    }
}
