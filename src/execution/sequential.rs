use tracing::debug;

use crate::{
    arcfit_errors::ArcfitError,
    execution::{ArcJob, ExecutionStrategy, PointOutcome},
};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};
#[cfg(feature = "progress")]
use std::time::Duration;

/// Processes the work list one position at a time, in order.
///
/// Under [`FailurePolicy::FailFast`](crate::execution::FailurePolicy::FailFast) the loop
/// stops at the first failing position.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialStrategy;

#[cfg(feature = "progress")]
fn progress_bar(total: usize) -> Option<ProgressBar> {
    let pb = ProgressBar::new((total as u64).max(1));
    let style = ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | {per_sec} | ETA {eta_precise}",
    )
    .ok()?;
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(200));
    Some(pb)
}

impl ExecutionStrategy for SequentialStrategy {
    fn name(&self) -> String {
        "sequential".to_string()
    }

    fn execute(&self, job: &ArcJob<'_>) -> Result<Vec<PointOutcome>, ArcfitError> {
        #[cfg(feature = "progress")]
        let pb = progress_bar(job.positions.len());

        let outcomes = run_in_order(job, || {
            #[cfg(feature = "progress")]
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        });

        #[cfg(feature = "progress")]
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        outcomes
    }
}

/// Process the work list in order, calling `tick` after each position. Stops at the
/// first error the failure policy treats as fatal.
fn run_in_order(
    job: &ArcJob<'_>,
    mut tick: impl FnMut(),
) -> Result<Vec<PointOutcome>, ArcfitError> {
    let mut outcomes = Vec::with_capacity(job.positions.len());

    for &position in &job.positions {
        debug!(position, total = job.positions.len(), "estimating arc");
        let outcome = job.process(position);
        tick();

        match outcome.result {
            Err(err) if job.failure_policy.is_fatal(&err) => return Err(err),
            result => outcomes.push(PointOutcome { position, result }),
        }
    }

    Ok(outcomes)
}

#[cfg(test)]
mod sequential_test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        arc_builder::ArcBuilder,
        estimator::{EstimationError, EstimationRequest, EstimationResult, LambdaMethod, NoisePriors},
        execution::{execution_test_utils::digest_estimator, FailurePolicy},
        sigma_model::SigmaModel,
        store::{store_test_utils::synthetic_point, Store},
    };

    #[test]
    fn test_fail_fast_stops_at_first_failure() {
        let points = (0..6)
            .map(|i| synthetic_point(i, 4, i as f64, 0.1 + 0.01 * i as f64))
            .collect();
        let store = Store::new(points).unwrap();
        let builder = ArcBuilder::new(&store, 0, SigmaModel::default()).unwrap();

        let calls = AtomicUsize::new(0);
        let fail_third = |request: &EstimationRequest<'_>| -> Result<EstimationResult, EstimationError> {
            if calls.fetch_add(1, Ordering::SeqCst) == 2 {
                return Err(EstimationError::SingularNormalMatrix);
            }
            digest_estimator(request)
        };

        let mut job = ArcJob {
            store: &store,
            builder: &builder,
            estimator: &fail_third,
            wavelength: 0.055,
            priors: NoisePriors::default(),
            method: LambdaMethod::IntegerRounding,
            positions: vec![1, 2, 3, 4, 5],
            failure_policy: FailurePolicy::FailFast,
        };

        let err = SequentialStrategy.execute(&job).unwrap_err();
        assert!(matches!(err, ArcfitError::EstimationFailed { point: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // a position outside the store is not absorbed by skip_point
        job.failure_policy = FailurePolicy::SkipPoint;
        job.positions = vec![1, 42, 2];
        assert_eq!(
            SequentialStrategy.execute(&job).unwrap_err(),
            ArcfitError::SlotOutOfRange(42)
        );
    }
}
