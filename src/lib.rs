pub mod arc_builder;
pub mod arcfit_errors;
pub mod archive;
pub mod config;
pub mod constants;
pub mod estimator;
pub mod execution;
pub mod pipeline;
pub mod reference;
pub mod results;
pub mod sigma_model;
pub mod store;

pub use arcfit_errors::ArcfitError;
pub use config::PipelineConfig;
pub use estimator::{AmbiguityEstimator, EstimationRequest, EstimationResult, LambdaMethod};
pub use execution::{
    partitioned::PartitionedStrategy, sequential::SequentialStrategy, ExecutionMode,
    ExecutionStrategy, FailurePolicy,
};
pub use pipeline::{Pipeline, RunOutput};
pub use results::{ResultSet, SlotStatus};
pub use store::{PointRecord, Store};
