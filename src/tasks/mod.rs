pub mod scaling_analysis;

pub use scaling_analysis::{AnalysisReport, EstimatorReport, ScalingAnalysis, run_sharded};
