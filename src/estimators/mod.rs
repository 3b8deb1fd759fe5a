mod bunching;
mod factorial_moments;
mod fluctuation_estimator;

pub use bunching::{BunchingParameters, MIN_BUNCHING_ORDER};
pub use factorial_moments::{
    FACTORIAL_ORDERS, FactorialMoments, MIN_FACTORIAL_ORDER, falling_factorial,
};
pub use fluctuation_estimator::{FluctuationEstimator, Mergeable, Phase};
