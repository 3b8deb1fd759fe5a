mod build;
mod choices;
mod error;

pub use build::{build_analysis, build_estimator, build_stream};
pub use choices::{
    AnalysisConfig, BunchingParams, ClusterParams, EstimatorChoice, EstimatorKind,
    FactorialParams, PoissonParams, StreamChoice, StreamKind,
};
pub use error::BuildError;
