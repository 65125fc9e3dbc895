use thiserror::Error;

use crate::estimator::EstimatorError;
use crate::pattern::PatternError;

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("estimator: {0}")]
    Estimator(#[from] EstimatorError),
    #[error("access pattern: {0}")]
    Pattern(#[from] PatternError),
    #[error("failed to load configuration: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
