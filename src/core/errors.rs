use thiserror::Error;

/// Invalid construction parameters for a resolution schedule or estimator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("resolution count must be >= 2, got {0}")]
    TooFewResolutions(usize),

    #[error("resolution step must be >= 1, got {0}")]
    InvalidStep(usize),

    #[error("phase-space interval [{min}, {max}) must be finite and non-empty")]
    InvalidInterval { min: f64, max: f64 },

    #[error("order must be >= {min}, got {order}")]
    OrderTooLow { order: usize, min: usize },
}

/// Protocol violations of the accumulate-then-finalize lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("estimator already finalized")]
    AlreadyFinalized,

    #[error("estimator not finalized yet, call eval() first")]
    NotFinalized,

    #[error("order {order} outside the supported range [{min}, {max}]")]
    OrderOutOfRange { order: usize, min: usize, max: usize },

    #[error("cannot merge estimators built with different configurations")]
    IncompatibleMerge,

    #[error("sharded run needs at least one shard")]
    NoShards,
}
