use crate::core::resolution::{Resolution, ResolutionSchedule};

/// Per-event occupancy scan.
///
/// Holds one working buffer sized for the finest resolution; every call to
/// [`count`](Self::count) overwrites the prefix belonging to the requested
/// resolution and returns it.
#[derive(Debug, Clone)]
pub struct OccupancyCounter {
    buffer: Vec<u32>,
}

impl OccupancyCounter {
    pub fn new(schedule: &ResolutionSchedule) -> Self {
        Self {
            buffer: vec![0; schedule.max_sub_bins()],
        }
    }

    /// Number of values of `sample` in each sub-bin of `resolution`.
    pub fn count(&mut self, resolution: &Resolution, sample: &[f64]) -> &[u32] {
        let occupancy = &mut self.buffer[..resolution.sub_bins()];
        occupancy.fill(0);
        for &x in sample {
            if let Some(j) = resolution.locate(x) {
                occupancy[j] += 1;
            }
        }
        occupancy
    }
}
