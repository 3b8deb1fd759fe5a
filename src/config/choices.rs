use anyhow::{Context, Result};
use schemars::{JsonSchema, Schema, schema_for};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use strum_macros::{Display, EnumDiscriminants, EnumIter, EnumMessage, EnumString, IntoStaticStr};

use crate::estimators::FACTORIAL_ORDERS;

const DEFAULT_SEED: u64 = 42;
fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_bunching_order() -> usize {
    3
}

fn default_factorial_order() -> usize {
    FACTORIAL_ORDERS
}

fn default_resolutions() -> usize {
    10
}

fn default_step() -> usize {
    1
}

fn default_min() -> f64 {
    0.0
}

fn default_max() -> f64 {
    1.0
}

fn default_mean() -> f64 {
    5.0
}

fn default_spread() -> f64 {
    0.01
}

fn default_sample_frequency() -> u64 {
    100_000
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BunchingParams {
    #[serde(default = "default_bunching_order")]
    #[schemars(
        title = "Order",
        description = "Highest bunching parameter BP(q) to compute",
        range(min = 2)
    )]
    pub order: usize,

    #[serde(default = "default_resolutions")]
    #[schemars(
        title = "Resolutions",
        description = "Number of resolutions in the schedule",
        range(min = 2)
    )]
    pub resolutions: usize,

    #[serde(default = "default_step")]
    #[schemars(
        title = "Step",
        description = "Sub-bins added per resolution",
        range(min = 1)
    )]
    pub step: usize,

    #[serde(default = "default_min")]
    #[schemars(title = "Min", description = "Lower bound of the phase-space interval")]
    pub min: f64,

    #[serde(default = "default_max")]
    #[schemars(title = "Max", description = "Upper bound (exclusive) of the interval")]
    pub max: f64,
}

impl Default for BunchingParams {
    fn default() -> Self {
        Self {
            order: default_bunching_order(),
            resolutions: default_resolutions(),
            step: default_step(),
            min: default_min(),
            max: default_max(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct FactorialParams {
    #[serde(default = "default_factorial_order")]
    #[schemars(
        title = "Order",
        description = "Requested order; factorial moments always track orders 2 to 5",
        range(min = 2)
    )]
    pub order: usize,

    #[serde(default = "default_resolutions")]
    #[schemars(
        title = "Resolutions",
        description = "Number of resolutions in the schedule",
        range(min = 2)
    )]
    pub resolutions: usize,

    #[serde(default = "default_step")]
    #[schemars(
        title = "Step",
        description = "Sub-bins added per resolution",
        range(min = 1)
    )]
    pub step: usize,

    #[serde(default = "default_min")]
    #[schemars(title = "Min", description = "Lower bound of the phase-space interval")]
    pub min: f64,

    #[serde(default = "default_max")]
    #[schemars(title = "Max", description = "Upper bound (exclusive) of the interval")]
    pub max: f64,
}

impl Default for FactorialParams {
    fn default() -> Self {
        Self {
            order: default_factorial_order(),
            resolutions: default_resolutions(),
            step: default_step(),
            min: default_min(),
            max: default_max(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, EnumDiscriminants)]
#[serde(tag = "type", content = "params", rename_all = "kebab-case")]
#[strum_discriminants(name(EstimatorKind))]
#[strum_discriminants(derive(EnumIter, EnumString, Display, IntoStaticStr, EnumMessage))]
#[strum_discriminants(strum(serialize_all = "kebab-case"))]
pub enum EstimatorChoice {
    #[strum_discriminants(strum(
        message = "Bunching Parameters",
        detailed_message = "BP(q) per resolution from occupancy-indicator rates."
    ))]
    BunchingParameters(BunchingParams),

    #[strum_discriminants(strum(
        message = "Factorial Moments",
        detailed_message = "Raw and normalized factorial moments F2..F5 per resolution."
    ))]
    FactorialMoments(FactorialParams),
}

impl EstimatorChoice {
    pub fn kind(&self) -> EstimatorKind {
        self.into()
    }

    pub fn with_defaults(kind: EstimatorKind) -> Self {
        match kind {
            EstimatorKind::BunchingParameters => Self::BunchingParameters(BunchingParams::default()),
            EstimatorKind::FactorialMoments => Self::FactorialMoments(FactorialParams::default()),
        }
    }

    pub fn schema() -> Schema {
        schema_for!(EstimatorChoice)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PoissonParams {
    #[serde(default = "default_mean")]
    #[schemars(
        title = "Mean Multiplicity",
        description = "Mean number of samples per event",
        range(min = 0.0)
    )]
    pub mean: f64,

    #[serde(default = "default_min")]
    #[schemars(title = "Min", description = "Lower bound of the sampled interval")]
    pub min: f64,

    #[serde(default = "default_max")]
    #[schemars(title = "Max", description = "Upper bound (exclusive) of the interval")]
    pub max: f64,

    #[serde(default)]
    #[schemars(
        title = "Max Events",
        description = "Upper bound on events; empty = infinite"
    )]
    pub max_events: Option<u64>,

    #[serde(default = "default_seed")]
    #[schemars(title = "Seed", description = "PRNG seed")]
    pub seed: u64,
}

impl Default for PoissonParams {
    fn default() -> Self {
        Self {
            mean: default_mean(),
            min: default_min(),
            max: default_max(),
            max_events: None,
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ClusterParams {
    #[schemars(
        title = "Mean Clusters",
        description = "Mean number of cluster centres per event",
        range(min = 0.0)
    )]
    pub centres_mean: f64,

    #[schemars(
        title = "Mean Cluster Size",
        description = "Mean number of samples emitted per centre",
        range(min = 0.0)
    )]
    pub children_mean: f64,

    #[serde(default = "default_spread")]
    #[schemars(
        title = "Spread",
        description = "Standard deviation of samples around their centre",
        range(min = 0.0)
    )]
    pub spread: f64,

    #[serde(default = "default_min")]
    #[schemars(title = "Min", description = "Lower bound of the sampled interval")]
    pub min: f64,

    #[serde(default = "default_max")]
    #[schemars(title = "Max", description = "Upper bound (exclusive) of the interval")]
    pub max: f64,

    #[serde(default)]
    #[schemars(
        title = "Max Events",
        description = "Upper bound on events; empty = infinite"
    )]
    pub max_events: Option<u64>,

    #[serde(default = "default_seed")]
    #[schemars(title = "Seed", description = "PRNG seed")]
    pub seed: u64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            centres_mean: 2.0,
            children_mean: 4.0,
            spread: default_spread(),
            min: default_min(),
            max: default_max(),
            max_events: None,
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, EnumDiscriminants)]
#[serde(tag = "type", content = "params", rename_all = "kebab-case")]
#[strum_discriminants(name(StreamKind))]
#[strum_discriminants(derive(EnumIter, EnumString, Display, IntoStaticStr, EnumMessage))]
#[strum_discriminants(strum(serialize_all = "kebab-case"))]
pub enum StreamChoice {
    #[strum_discriminants(strum(
        message = "Poisson Generator",
        detailed_message = "Uniform samples with Poisson multiplicity; the uncorrelated baseline."
    ))]
    PoissonGenerator(PoissonParams),

    #[strum_discriminants(strum(
        message = "Cluster Generator",
        detailed_message = "Neyman-Scott clusters of samples around random centres."
    ))]
    ClusterGenerator(ClusterParams),
}

impl StreamChoice {
    pub fn kind(&self) -> StreamKind {
        self.into()
    }

    pub fn with_defaults(kind: StreamKind) -> Self {
        match kind {
            StreamKind::PoissonGenerator => Self::PoissonGenerator(PoissonParams::default()),
            StreamKind::ClusterGenerator => Self::ClusterGenerator(ClusterParams::default()),
        }
    }

    pub fn schema() -> Schema {
        schema_for!(StreamChoice)
    }
}

/// Everything a [`ScalingAnalysis`](crate::tasks::ScalingAnalysis) run needs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AnalysisConfig {
    #[schemars(title = "Estimators", description = "Estimators fed by the stream")]
    pub estimators: Vec<EstimatorChoice>,

    #[schemars(title = "Stream", description = "Source of events")]
    pub stream: StreamChoice,

    #[serde(default)]
    #[schemars(
        title = "Max Events",
        description = "Stop after this many events (None = unlimited)"
    )]
    pub max_events: Option<u64>,

    #[serde(default)]
    #[schemars(
        title = "Max Seconds",
        description = "Stop after this many seconds (None = unlimited)"
    )]
    pub max_seconds: Option<u64>,

    #[serde(default = "default_sample_frequency")]
    #[schemars(
        title = "Sample Frequency",
        description = "Report progress every N events",
        range(min = 1)
    )]
    pub sample_frequency: u64,
}

impl AnalysisConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid analysis configuration")
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn schema() -> Schema {
        schema_for!(AnalysisConfig)
    }
}
