use std::io::{Error, ErrorKind};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};

use crate::streams::stream::EventStream;

/// Redraws allowed for a child landing outside the interval.
const MAX_REDRAWS: usize = 64;

/// Events of a Neyman-Scott cluster process on `[min, max)`.
///
/// Each event holds `Poisson(centres)` cluster centres placed uniformly;
/// every centre emits `Poisson(children)` samples scattered around it with a
/// Gaussian of width `spread`. Children falling outside the interval are
/// redrawn. Tight clusters produce occupancy fluctuations well above the
/// Poisson expectation at resolutions finer than the cluster spacing.
#[derive(Debug)]
pub struct ClusterEventGenerator {
    seed: u64,
    rng: StdRng,
    centres: Poisson<f64>,
    children: Poisson<f64>,
    offset: Normal<f64>,
    min: f64,
    max: f64,
    max_events: Option<usize>,
    produced: usize,
}

impl ClusterEventGenerator {
    pub fn new(
        centres_mean: f64,
        children_mean: f64,
        spread: f64,
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
        if !(spread.is_finite() && spread > 0.0) {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "cluster spread must be finite and > 0",
            ));
        }
        let invalid = |what: &str, v: f64| {
            Error::new(ErrorKind::InvalidInput, format!("invalid {what} mean {v}"))
        };
        let centres = Poisson::new(centres_mean).map_err(|_| invalid("centres", centres_mean))?;
        let children =
            Poisson::new(children_mean).map_err(|_| invalid("children", children_mean))?;
        let offset = Normal::new(0.0, spread)
            .map_err(|e| Error::new(ErrorKind::InvalidInput, e.to_string()))?;

        Ok(Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
            centres,
            children,
            offset,
            min,
            max,
            max_events,
            produced: 0,
        })
    }

    fn child_of(&mut self, centre: f64) -> Option<f64> {
        (0..MAX_REDRAWS)
            .map(|_| centre + self.offset.sample(&mut self.rng))
            .find(|x| (self.min..self.max).contains(x))
    }
}

impl EventStream for ClusterEventGenerator {
    fn has_more_events(&self) -> bool {
        self.max_events.map_or(true, |max| self.produced < max)
    }

    fn next_event(&mut self) -> Option<Vec<f64>> {
        if !self.has_more_events() {
            return None;
        }
        let mut event = Vec::new();
        let centres: f64 = self.centres.sample(&mut self.rng);
        for _ in 0..centres as usize {
            let centre = self.rng.random_range(self.min..self.max);
            let children: f64 = self.children.sample(&mut self.rng);
            for _ in 0..children as usize {
                if let Some(x) = self.child_of(centre) {
                    event.push(x);
                }
            }
        }
        self.produced += 1;
        Some(event)
    }

    fn restart(&mut self) -> Result<(), Error> {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.produced = 0;
        Ok(())
    }
}
