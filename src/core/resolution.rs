use crate::core::errors::ConfigError;
use log::error;

/// One binning of the phase-space interval into equal half-open sub-bins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    index: usize,
    sub_bins: usize,
    width: f64,
    min: f64,
}

impl Resolution {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn sub_bins(&self) -> usize {
        self.sub_bins
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Lower edge of sub-bin `j`; `lower_edge(j + 1)` is its (excluded) upper edge.
    #[inline]
    pub fn lower_edge(&self, j: usize) -> f64 {
        self.min + self.width * j as f64
    }

    #[inline]
    pub fn contains(&self, j: usize, x: f64) -> bool {
        x >= self.lower_edge(j) && x < self.lower_edge(j + 1)
    }

    /// Sub-bin holding `x`, if any.
    ///
    /// The floor estimate is only a starting point: membership is decided by
    /// [`contains`](Self::contains), so values on or past the upper edge of the
    /// last sub-bin, below `min`, or NaN are never located.
    pub fn locate(&self, x: f64) -> Option<usize> {
        let guess = ((x - self.min) / self.width).floor();
        if !(guess >= -1.0 && guess <= self.sub_bins as f64) {
            return None;
        }
        let j = (guess.max(0.0) as usize).min(self.sub_bins - 1);
        [Some(j), j.checked_sub(1), Some(j + 1)]
            .into_iter()
            .flatten()
            .find(|&c| c < self.sub_bins && self.contains(c, x))
    }
}

/// Ordered family of resolutions, resolution `i` holding `1 + i * step` sub-bins.
///
/// Also precomputes the arena offsets used by [`OrderTensor`](crate::core::OrderTensor):
/// the sub-bins of all resolutions are laid out back to back.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionSchedule {
    resolutions: Vec<Resolution>,
    offsets: Vec<usize>,
    total_sub_bins: usize,
    step: usize,
    min: f64,
    max: f64,
}

impl ResolutionSchedule {
    pub fn new(count: usize, step: usize, min: f64, max: f64) -> Result<Self, ConfigError> {
        let checked = if count < 2 {
            Err(ConfigError::TooFewResolutions(count))
        } else if step < 1 {
            Err(ConfigError::InvalidStep(step))
        } else if !(min.is_finite() && max.is_finite() && min < max) {
            Err(ConfigError::InvalidInterval { min, max })
        } else {
            Ok(())
        };
        if let Err(e) = checked {
            error!("rejecting resolution schedule: {e}");
            return Err(e);
        }

        let mut resolutions = Vec::with_capacity(count);
        let mut offsets = Vec::with_capacity(count);
        let mut total_sub_bins = 0;
        for index in 0..count {
            let sub_bins = 1 + index * step;
            resolutions.push(Resolution {
                index,
                sub_bins,
                width: (max - min) / sub_bins as f64,
                min,
            });
            offsets.push(total_sub_bins);
            total_sub_bins += sub_bins;
        }

        Ok(Self {
            resolutions,
            offsets,
            total_sub_bins,
            step,
            min,
            max,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.resolutions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resolutions.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Resolution> {
        self.resolutions.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Resolution> {
        self.resolutions.iter()
    }

    /// Largest sub-bin count over all resolutions (sizes per-event buffers).
    #[inline]
    pub fn max_sub_bins(&self) -> usize {
        self.resolutions.last().map_or(0, Resolution::sub_bins)
    }

    #[inline]
    pub fn total_sub_bins(&self) -> usize {
        self.total_sub_bins
    }

    #[inline]
    pub fn offset(&self, index: usize) -> usize {
        self.offsets[index]
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
