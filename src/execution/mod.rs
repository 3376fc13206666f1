//! # Execution strategies
//!
//! An [`ExecutionStrategy`] runs *arc construction → estimation* for every position of
//! a work list and returns one [`PointOutcome`] per position, **in work-list order**.
//! Two strategies are provided:
//!
//! * [`sequential::SequentialStrategy`] – a plain loop over the work list,
//! * [`partitioned::PartitionedStrategy`] – a partitioned parallel map on a dedicated
//!   rayon pool, gathered by position.
//!
//! Both must produce identical outcomes for identical jobs, whatever the partition
//! count. Workers only read the store, the arc builder and the estimator; each point
//! produces an independent outcome.
//!
//! Failure policy
//! -----------------
//! Per-point failures (shape mismatch, estimation failure) follow one run-wide
//! [`FailurePolicy`]:
//! * `FailFast` – the strategy fails with the error of the **lowest-position** failing
//!   point, in both strategies.
//! * `SkipPoint` – the failing outcome is returned and its slot is later marked failed.
//!
//! Any other error (e.g. a position outside the store) ends the run under both policies.
pub mod partitioned;
pub mod sequential;

use std::fmt;

use serde::Deserialize;

use crate::{
    arc_builder::ArcBuilder,
    arcfit_errors::ArcfitError,
    constants::Meter,
    estimator::{AmbiguityEstimator, EstimationRequest, EstimationResult, LambdaMethod, NoisePriors},
    store::Store,
};

/// Run-wide handling of per-point failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    FailFast,
    SkipPoint,
}

impl FailurePolicy {
    /// Whether `err` stops the run. Only per-point errors can be skipped.
    pub fn is_fatal(&self, err: &ArcfitError) -> bool {
        *self == FailurePolicy::FailFast || !err.is_per_point()
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::FailFast => f.write_str("fail_fast"),
            FailurePolicy::SkipPoint => f.write_str("skip_point"),
        }
    }
}

/// Which strategy a configured run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sequential,
    #[default]
    Partitioned,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sequential => f.write_str("sequential"),
            ExecutionMode::Partitioned => f.write_str("partitioned"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = ArcfitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(ExecutionMode::Sequential),
            "partitioned" => Ok(ExecutionMode::Partitioned),
            other => Err(ArcfitError::InvalidPipelineParameter(format!(
                "unknown execution mode '{other}'"
            ))),
        }
    }
}

/// Outcome of one work-list position.
#[derive(Debug, PartialEq)]
pub struct PointOutcome {
    pub position: usize,
    pub result: Result<EstimationResult, ArcfitError>,
}

/// Everything a strategy needs to process the work list. Shared read-only by workers.
pub struct ArcJob<'a> {
    pub store: &'a Store,
    pub builder: &'a ArcBuilder<'a>,
    pub estimator: &'a dyn AmbiguityEstimator,
    pub wavelength: Meter,
    pub priors: NoisePriors,
    pub method: LambdaMethod,
    pub positions: Vec<usize>,
    pub failure_policy: FailurePolicy,
}

impl ArcJob<'_> {
    /// Build the arc of `position` and estimate it.
    pub fn process(&self, position: usize) -> PointOutcome {
        PointOutcome {
            position,
            result: self.estimate_point(position),
        }
    }

    fn estimate_point(&self, position: usize) -> Result<EstimationResult, ArcfitError> {
        let target = self
            .store
            .point(position)
            .ok_or(ArcfitError::SlotOutOfRange(position))?;
        let arc = self.builder.build(position, target)?;

        let request = EstimationRequest {
            wavelength: self.wavelength,
            arc: &arc,
            priors: &self.priors,
            method: self.method,
        };
        let result = self
            .estimator
            .estimate(&request)
            .map_err(|err| ArcfitError::EstimationFailed {
                point: position,
                reason: err.to_string(),
            })?;

        let n_epochs = self.store.n_epochs();
        for (field, found) in [("y_hat", result.y_hat.len()), ("phs_unw_init", result.phs_unw_init.len())] {
            if found != n_epochs {
                return Err(ArcfitError::ShapeMismatch {
                    point: position,
                    field,
                    expected: n_epochs,
                    found,
                });
            }
        }
        Ok(result)
    }
}

/// Runs an [`ArcJob`] and returns its outcomes in work-list order.
pub trait ExecutionStrategy: Send + Sync {
    fn name(&self) -> String;

    fn execute(&self, job: &ArcJob<'_>) -> Result<Vec<PointOutcome>, ArcfitError>;
}

/// Apply the failure policy to a complete, ordered list of outcomes.
pub(crate) fn enforce_failure_policy(
    mut outcomes: Vec<PointOutcome>,
    policy: FailurePolicy,
) -> Result<Vec<PointOutcome>, ArcfitError> {
    let first_fatal = outcomes
        .iter()
        .position(|o| matches!(&o.result, Err(err) if policy.is_fatal(err)));
    if let Some(first) = first_fatal {
        if let Err(err) = outcomes.swap_remove(first).result {
            return Err(err);
        }
    }
    Ok(outcomes)
}
