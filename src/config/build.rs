use log::info;

use crate::config::{
    AnalysisConfig, BuildError, BunchingParams, ClusterParams, EstimatorChoice, FactorialParams,
    PoissonParams, StreamChoice,
};
use crate::estimators::{BunchingParameters, FactorialMoments, FluctuationEstimator};
use crate::streams::EventStream;
use crate::streams::generators::{ClusterEventGenerator, PoissonEventGenerator};
use crate::tasks::ScalingAnalysis;

fn max_events(v: Option<u64>) -> Result<Option<usize>, BuildError> {
    v.map(|v| {
        usize::try_from(v)
            .map_err(|_| BuildError::InvalidParameter("max_events too large for usize".into()))
    })
    .transpose()
}

impl TryFrom<BunchingParams> for BunchingParameters {
    type Error = BuildError;

    fn try_from(p: BunchingParams) -> Result<Self, Self::Error> {
        Ok(BunchingParameters::new(
            p.order,
            p.resolutions,
            p.step,
            p.min,
            p.max,
        )?)
    }
}

impl TryFrom<FactorialParams> for FactorialMoments {
    type Error = BuildError;

    fn try_from(p: FactorialParams) -> Result<Self, Self::Error> {
        Ok(FactorialMoments::new(
            p.order,
            p.resolutions,
            p.step,
            p.min,
            p.max,
        )?)
    }
}

impl TryFrom<PoissonParams> for PoissonEventGenerator {
    type Error = BuildError;

    fn try_from(p: PoissonParams) -> Result<Self, Self::Error> {
        PoissonEventGenerator::new(p.mean, p.min, p.max, max_events(p.max_events)?, p.seed)
            .map_err(BuildError::from)
    }
}

impl TryFrom<ClusterParams> for ClusterEventGenerator {
    type Error = BuildError;

    fn try_from(p: ClusterParams) -> Result<Self, Self::Error> {
        ClusterEventGenerator::new(
            p.centres_mean,
            p.children_mean,
            p.spread,
            p.min,
            p.max,
            max_events(p.max_events)?,
            p.seed,
        )
        .map_err(BuildError::from)
    }
}

pub fn build_estimator(
    choice: EstimatorChoice,
) -> Result<Box<dyn FluctuationEstimator>, BuildError> {
    match choice {
        EstimatorChoice::BunchingParameters(p) => {
            let e = BunchingParameters::try_from(p)?;
            Ok(Box::new(e))
        }
        EstimatorChoice::FactorialMoments(p) => {
            let e = FactorialMoments::try_from(p)?;
            Ok(Box::new(e))
        }
    }
}

pub fn build_stream(choice: StreamChoice) -> Result<Box<dyn EventStream>, BuildError> {
    match choice {
        StreamChoice::PoissonGenerator(p) => {
            let s = PoissonEventGenerator::try_from(p)?;
            Ok(Box::new(s))
        }
        StreamChoice::ClusterGenerator(p) => {
            let s = ClusterEventGenerator::try_from(p)?;
            Ok(Box::new(s))
        }
    }
}

pub fn build_analysis(config: AnalysisConfig) -> Result<ScalingAnalysis, BuildError> {
    if config.estimators.is_empty() {
        return Err(BuildError::InvalidParameter(
            "at least one estimator is required".into(),
        ));
    }
    let estimators = config
        .estimators
        .into_iter()
        .map(build_estimator)
        .collect::<Result<Vec<_>, _>>()?;
    let stream = build_stream(config.stream)?;
    info!("built analysis with {} estimators", estimators.len());

    Ok(ScalingAnalysis::new(
        estimators,
        stream,
        config.max_events,
        config.max_seconds,
        config.sample_frequency,
    )?)
}
