pub mod config;
pub mod error;
pub mod estimator;
pub mod inference;
pub mod pattern;
pub mod probe;
pub mod report;
pub mod sweep;

pub use crate::config::GeometryConfig;
pub use crate::error::GeometryError;
pub use crate::inference::{CacheInference, Inference, Parameter};
pub use crate::probe::{LatencyProbe, MemoryProbe};
