mod covariance;
mod errors;
mod occupancy;
mod resolution;
mod tensor;

pub use covariance::CrossSums;
pub use errors::{ConfigError, EngineError};
pub use occupancy::OccupancyCounter;
pub use resolution::{Resolution, ResolutionSchedule};
pub use tensor::OrderTensor;
