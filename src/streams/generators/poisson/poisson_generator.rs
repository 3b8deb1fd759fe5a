use std::io::{Error, ErrorKind};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};

use crate::streams::stream::EventStream;

/// Events of a homogeneous Poisson process on `[min, max)`.
///
/// Each event draws its multiplicity from `Poisson(mean)` and places that
/// many samples uniformly, so the occupancy of every sub-bin is an
/// independent Poisson variable: the reference case where bunching
/// parameters and normalized factorial moments equal 1.
#[derive(Debug)]
pub struct PoissonEventGenerator {
    seed: u64,
    rng: StdRng,
    multiplicity: Poisson<f64>,
    min: f64,
    max: f64,
    max_events: Option<usize>,
    produced: usize,
}

impl PoissonEventGenerator {
    pub fn new(
        mean: f64,
        min: f64,
        max: f64,
        max_events: Option<usize>,
        seed: u64,
    ) -> Result<Self, Error> {
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "interval bounds must be finite with min < max",
            ));
        }
        let multiplicity = Poisson::new(mean).map_err(|e| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("invalid mean multiplicity {mean}: {e}"),
            )
        })?;

        Ok(Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
            multiplicity,
            min,
            max,
            max_events,
            produced: 0,
        })
    }
}

impl EventStream for PoissonEventGenerator {
    fn has_more_events(&self) -> bool {
        self.max_events.map_or(true, |max| self.produced < max)
    }

    fn next_event(&mut self) -> Option<Vec<f64>> {
        if !self.has_more_events() {
            return None;
        }
        let n: f64 = self.multiplicity.sample(&mut self.rng);
        let event = (0..n as usize)
            .map(|_| self.rng.random_range(self.min..self.max))
            .collect();
        self.produced += 1;
        Some(event)
    }

    fn restart(&mut self) -> Result<(), Error> {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.produced = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_stay_inside_interval() {
        let mut g = PoissonEventGenerator::new(5.0, -2.0, 3.0, Some(500), 42).unwrap();
        let mut events = 0;
        while let Some(e) = g.next_event() {
            assert!(e.iter().all(|&x| (-2.0..3.0).contains(&x)));
            events += 1;
        }
        assert_eq!(events, 500);
        assert!(!g.has_more_events());
    }

    #[test]
    fn multiplicity_mean_is_close_to_requested() {
        let mut g = PoissonEventGenerator::new(3.0, 0.0, 1.0, Some(20_000), 9).unwrap();
        let mut total = 0usize;
        while let Some(e) = g.next_event() {
            total += e.len();
        }
        let mean = total as f64 / 20_000.0;
        assert!((mean - 3.0).abs() < 0.05, "mean={mean}");
    }

    #[test]
    fn restart_resets_sequence_with_same_seed() {
        let mut g = PoissonEventGenerator::new(4.0, 0.0, 1.0, Some(100), 12345).unwrap();
        let first: Vec<Vec<f64>> = (0..30).map(|_| g.next_event().unwrap()).collect();
        g.restart().unwrap();
        let second: Vec<Vec<f64>> = (0..30).map(|_| g.next_event().unwrap()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn unbounded_stream_always_has_more() {
        let mut g = PoissonEventGenerator::new(1.0, 0.0, 1.0, None, 1).unwrap();
        for _ in 0..10 {
            assert!(g.next_event().is_some());
        }
        assert!(g.has_more_events());
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let err = PoissonEventGenerator::new(0.0, 0.0, 1.0, None, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = PoissonEventGenerator::new(-1.0, 0.0, 1.0, None, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = PoissonEventGenerator::new(2.0, 1.0, 1.0, None, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = PoissonEventGenerator::new(2.0, 0.0, f64::NAN, None, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
