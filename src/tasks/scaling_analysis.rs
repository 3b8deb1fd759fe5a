use crate::core::EngineError;
use crate::estimators::{FluctuationEstimator, Mergeable};
use crate::evaluation::{Degeneracy, Progress, ResultSeries};
use crate::streams::EventStream;
use log::{debug, info, warn};
use serde::Serialize;
use std::io::{Error, ErrorKind};
use std::sync::mpsc::Sender;
use std::time::Instant;

/// Final state of one estimator after a run.
#[derive(Debug, Clone, Serialize)]
pub struct EstimatorReport {
    pub name: String,
    pub events: u64,
    /// `false` when any cell was degenerate; see `degeneracies`.
    pub clean: bool,
    pub degeneracies: Vec<Degeneracy>,
    pub series: Vec<ResultSeries>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub events: u64,
    pub samples: u64,
    pub seconds: f64,
    pub estimators: Vec<EstimatorReport>,
}

impl AnalysisReport {
    pub fn estimator(&self, name: &str) -> Option<&EstimatorReport> {
        self.estimators.iter().find(|e| e.name == name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Feeds a stream of events to a set of estimators, finalizes them once and
/// collects every series they report.
pub struct ScalingAnalysis {
    estimators: Vec<Box<dyn FluctuationEstimator>>,
    stream: Box<dyn EventStream>,

    max_events: Option<u64>,
    max_seconds: Option<u64>,
    sample_frequency: u64,

    processed: u64,
    samples: u64,
    start_time: Instant,

    progress_tx: Option<Sender<Progress>>,
}

impl ScalingAnalysis {
    pub fn new(
        estimators: Vec<Box<dyn FluctuationEstimator>>,
        stream: Box<dyn EventStream>,
        max_events: Option<u64>,
        max_seconds: Option<u64>,
        sample_frequency: u64,
    ) -> Result<Self, Error> {
        if estimators.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "at least one estimator is required",
            ));
        }
        if sample_frequency == 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "sample_frequency must be > 0",
            ));
        }

        Ok(Self {
            estimators,
            stream,
            max_events,
            max_seconds,
            sample_frequency,
            processed: 0,
            samples: 0,
            start_time: Instant::now(),
            progress_tx: None,
        })
    }

    pub fn with_progress(mut self, tx: Sender<Progress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn estimators(&self) -> &[Box<dyn FluctuationEstimator>] {
        &self.estimators
    }

    /// Consumes the stream, then finalizes every estimator.
    ///
    /// Estimators can only be finalized once, so a second call fails with
    /// [`EngineError::AlreadyFinalized`].
    pub fn run(&mut self) -> Result<AnalysisReport, EngineError> {
        self.start_time = Instant::now();
        info!(
            "scaling analysis started with estimators [{}]",
            self.estimators
                .iter()
                .map(|e| e.name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        while self.stream.has_more_events() {
            if let Some(n) = self.max_events {
                if self.processed >= n {
                    break;
                }
            }
            if let Some(s) = self.max_seconds {
                if self.start_time.elapsed().as_secs() >= s {
                    break;
                }
            }
            let Some(event) = self.stream.next_event() else {
                break;
            };
            self.processed += 1;
            self.samples += event.len() as u64;

            for estimator in self.estimators.iter_mut() {
                estimator.add_event(&event)?;
            }

            if self.processed % self.sample_frequency == 0 {
                self.push_progress();
            }
        }
        self.push_progress();

        let mut reports = Vec::with_capacity(self.estimators.len());
        for estimator in self.estimators.iter_mut() {
            let clean = estimator.eval()?;
            if !clean {
                warn!(
                    "{}: {} degenerate cells, estimates patched",
                    estimator.name(),
                    estimator.diagnostics().len()
                );
            }
            reports.push(EstimatorReport {
                name: estimator.name().to_string(),
                events: estimator.events(),
                clean,
                degeneracies: estimator.diagnostics().to_vec(),
                series: estimator.report_series()?,
            });
        }

        let seconds = self.start_time.elapsed().as_secs_f64();
        info!(
            "scaling analysis finished: {} events, {} samples, {seconds:.3}s",
            self.processed, self.samples
        );
        Ok(AnalysisReport {
            events: self.processed,
            samples: self.samples,
            seconds,
            estimators: reports,
        })
    }

    fn push_progress(&mut self) {
        let progress = Progress {
            events_seen: self.processed,
            samples_seen: self.samples,
            seconds: self.start_time.elapsed().as_secs_f64(),
        };
        debug!("{progress}");
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(progress);
        }
    }
}

fn accumulate_shard<E, S, F>(
    shard: usize,
    events_per_shard: Option<u64>,
    make: &F,
) -> Result<E, EngineError>
where
    E: Mergeable,
    S: EventStream,
    F: Fn(usize) -> (E, S),
{
    let (mut estimator, mut stream) = make(shard);
    let mut fed = 0u64;
    while stream.has_more_events() && events_per_shard.map_or(true, |n| fed < n) {
        let Some(event) = stream.next_event() else {
            break;
        };
        estimator.add_event(&event)?;
        fed += 1;
    }
    debug!("shard {shard} accumulated {fed} events");
    Ok(estimator)
}

/// Accumulates `shards` independent partial estimators, merges them in shard
/// order and finalizes the result once.
///
/// `make(shard)` builds the estimator and the event stream of one shard; each
/// shard consumes at most `events_per_shard` events. With the `parallel`
/// feature shards run on the rayon pool. Whether the merged estimator was
/// clean is available through its `diagnostics()`.
pub fn run_sharded<E, S, F>(
    shards: usize,
    events_per_shard: Option<u64>,
    make: F,
) -> Result<E, EngineError>
where
    E: Mergeable + Send,
    S: EventStream,
    F: Fn(usize) -> (E, S) + Sync,
{
    if shards == 0 {
        return Err(EngineError::NoShards);
    }

    #[cfg(feature = "parallel")]
    let partials: Vec<E> = {
        use rayon::prelude::*;

        (0..shards)
            .into_par_iter()
            .map(|shard| accumulate_shard(shard, events_per_shard, &make))
            .collect::<Result<Vec<E>, EngineError>>()?
    };

    #[cfg(not(feature = "parallel"))]
    let partials: Vec<E> = (0..shards)
        .map(|shard| accumulate_shard(shard, events_per_shard, &make))
        .collect::<Result<Vec<E>, EngineError>>()?;

    let mut partials = partials.into_iter();
    let Some(mut merged) = partials.next() else {
        return Err(EngineError::NoShards);
    };
    for partial in partials {
        merged.merge(&partial)?;
    }
    info!(
        "{}: merged {shards} shards, {} events",
        merged.name(),
        merged.events()
    );
    merged.eval()?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::{BunchingParameters, FactorialMoments, Phase};
    use crate::streams::generators::PoissonEventGenerator;
    use crate::testing::VecEventStream;
    use std::sync::mpsc;

    fn estimators() -> Vec<Box<dyn FluctuationEstimator>> {
        vec![
            Box::new(BunchingParameters::new(3, 3, 1, 0.0, 10.0).unwrap()),
            Box::new(FactorialMoments::new(5, 3, 1, 0.0, 10.0).unwrap()),
        ]
    }

    fn central(count: usize) -> Box<dyn EventStream> {
        Box::new(VecEventStream::repeated(vec![5.0], count))
    }

    #[test]
    fn ctor_guards() {
        let err = ScalingAnalysis::new(estimators(), central(10), None, None, 0)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = ScalingAnalysis::new(vec![], central(10), None, None, 5)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn report_covers_every_estimator() {
        let mut a = ScalingAnalysis::new(estimators(), central(1000), None, None, 100).unwrap();
        let report = a.run().unwrap();
        assert_eq!(report.events, 1000);
        assert_eq!(report.samples, 1000);

        let bp = report.estimator("bunching").unwrap();
        assert!(!bp.clean);
        assert_eq!(bp.degeneracies.len(), 3);
        assert_eq!(bp.series.len(), 2);
        assert!(bp.series[1].iter().all(|p| p.value == -1.0));

        let fm = report.estimator("factorial-moments").unwrap();
        assert!(fm.clean);
        assert_eq!(fm.series.len(), 9);
        assert_eq!(fm.series[0].label(), "<k>");

        assert!(
            a.estimators()
                .iter()
                .all(|e| e.phase() == Phase::Finalized)
        );
        let json = report.to_json().unwrap();
        assert!(json.contains("\"factorial-moments\""));
        assert!(json.contains("\"zero-rate\""));
    }

    #[test]
    fn stops_at_max_events() {
        let mut a = ScalingAnalysis::new(estimators(), central(1000), Some(25), None, 5).unwrap();
        let report = a.run().unwrap();
        assert_eq!(report.events, 25);
        assert!(report.estimators.iter().all(|e| e.events == 25));
    }

    #[test]
    fn stops_immediately_when_time_zero() {
        let mut a = ScalingAnalysis::new(estimators(), central(100), None, Some(0), 10).unwrap();
        let report = a.run().unwrap();
        assert_eq!(a.processed(), 0);
        assert!(report.estimators.iter().all(|e| !e.clean));
    }

    #[test]
    fn periodic_and_final_progress() {
        let (tx, rx) = mpsc::channel();
        let mut a = ScalingAnalysis::new(estimators(), central(35), None, None, 10)
            .unwrap()
            .with_progress(tx);
        a.run().unwrap();
        drop(a);

        let seen: Vec<u64> = rx.iter().map(|p| p.events_seen).collect();
        assert_eq!(seen, vec![10, 20, 30, 35]);
    }

    #[test]
    fn second_run_is_rejected() {
        let mut a = ScalingAnalysis::new(estimators(), central(10), None, None, 5).unwrap();
        a.run().unwrap();
        assert_eq!(a.run().unwrap_err(), EngineError::AlreadyFinalized);
    }

    #[test]
    fn sharded_run_matches_sequential_run() {
        let make = |shard: usize| {
            (
                BunchingParameters::new(3, 4, 2, 0.0, 1.0).unwrap(),
                PoissonEventGenerator::new(3.0, 0.0, 1.0, Some(250), shard as u64).unwrap(),
            )
        };
        let sharded = run_sharded(4, None, make).unwrap();
        assert_eq!(sharded.phase(), Phase::Finalized);
        assert_eq!(sharded.events(), 1000);

        let mut sequential = BunchingParameters::new(3, 4, 2, 0.0, 1.0).unwrap();
        for shard in 0..4 {
            let (_, mut stream) = make(shard);
            while let Some(event) = stream.next_event() {
                sequential.add_event(&event).unwrap();
            }
        }
        sequential.eval().unwrap();
        for q in sequential.orders() {
            assert_eq!(sharded.series(q).unwrap(), sequential.series(q).unwrap());
        }
    }

    #[test]
    fn sharded_run_respects_event_budget() {
        let make = |shard: usize| {
            (
                FactorialMoments::new(5, 3, 1, 0.0, 1.0).unwrap(),
                PoissonEventGenerator::new(2.0, 0.0, 1.0, None, 100 + shard as u64).unwrap(),
            )
        };
        let merged = run_sharded(3, Some(40), make).unwrap();
        assert_eq!(merged.events(), 120);
    }

    #[test]
    fn zero_shards_is_an_error() {
        let make = |_: usize| {
            (
                FactorialMoments::new(5, 3, 1, 0.0, 1.0).unwrap(),
                VecEventStream::new(vec![]),
            )
        };
        assert_eq!(run_sharded(0, None, make).unwrap_err(), EngineError::NoShards);
    }
}
