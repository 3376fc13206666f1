use std::ops::Range;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    arcfit_errors::ArcfitError,
    execution::{enforce_failure_policy, ArcJob, ExecutionStrategy, PointOutcome},
};

/// Partitioned parallel map over the work list.
///
/// The work list is cut into `n_partitions` contiguous partitions (see
/// [`partition_bounds`]), each partition is mapped on a worker of a transient rayon pool
/// with one thread per non-empty partition, and the per-partition outputs are gathered **by
/// partition index**, then flattened. Completion order never reaches the output.
#[derive(Debug, Clone, Copy)]
pub struct PartitionedStrategy {
    n_partitions: usize,
    strict: bool,
}

impl PartitionedStrategy {
    pub fn new(n_partitions: usize) -> Result<Self, ArcfitError> {
        if n_partitions == 0 {
            return Err(ArcfitError::InvalidPipelineParameter(
                "n_partitions must be >= 1".into(),
            ));
        }
        Ok(PartitionedStrategy {
            n_partitions,
            strict: false,
        })
    }

    /// Require the partition count to divide the work list evenly.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn n_partitions(&self) -> usize {
        self.n_partitions
    }

    /// Check the partition count against a work list of `len` positions.
    pub fn check_layout(&self, len: usize) -> Result<(), ArcfitError> {
        if self.strict && len % self.n_partitions != 0 {
            return Err(ArcfitError::InvalidPipelineParameter(format!(
                "strict partitioning: {} partitions do not divide {} arcs",
                self.n_partitions, len
            )));
        }
        Ok(())
    }
}

/// Contiguous index ranges splitting `len` items into `n_partitions` parts.
///
/// Sizes differ by at most one, larger partitions first. Empty partitions (when
/// `len < n_partitions`) are dropped, so every returned range is non-empty.
pub fn partition_bounds(len: usize, n_partitions: usize) -> Vec<Range<usize>> {
    let n_partitions = n_partitions.max(1);
    let base = len / n_partitions;
    let extra = len % n_partitions;

    let mut bounds = Vec::with_capacity(n_partitions);
    let mut start = 0;
    for k in 0..n_partitions {
        let size = base + usize::from(k < extra);
        if size == 0 {
            break;
        }
        bounds.push(start..start + size);
        start += size;
    }
    bounds
}

impl ExecutionStrategy for PartitionedStrategy {
    fn name(&self) -> String {
        format!("partitioned({})", self.n_partitions)
    }

    fn execute(&self, job: &ArcJob<'_>) -> Result<Vec<PointOutcome>, ArcfitError> {
        self.check_layout(job.positions.len())?;

        let bounds = partition_bounds(job.positions.len(), self.n_partitions);
        info!(
            n_partitions = self.n_partitions,
            non_empty = bounds.len(),
            arcs = job.positions.len(),
            "partitioned execution"
        );

        // one thread per non-empty partition
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(bounds.len().max(1))
            .build()?;

        let gathered: Vec<Vec<PointOutcome>> = pool.install(|| {
            bounds
                .par_iter()
                .enumerate()
                .map(|(k, range)| {
                    debug!(partition = k, size = range.len(), "partition started");
                    job.positions[range.clone()]
                        .iter()
                        .map(|&position| job.process(position))
                        .collect::<Vec<_>>()
                })
                .collect()
        });

        let outcomes: Vec<PointOutcome> = gathered.into_iter().flatten().collect();
        debug_assert!(outcomes
            .iter()
            .map(|o| o.position)
            .eq(job.positions.iter().copied()));

        enforce_failure_policy(outcomes, job.failure_policy)
    }
}

#[cfg(test)]
mod partitioned_test {
    use super::*;

    #[test]
    fn test_partition_bounds_even() {
        assert_eq!(partition_bounds(12, 4), vec![0..3, 3..6, 6..9, 9..12]);
    }

    #[test]
    fn test_partition_bounds_uneven() {
        let bounds = partition_bounds(10, 4);
        assert_eq!(bounds, vec![0..3, 3..6, 6..8, 8..10]);
        let sizes: Vec<usize> = bounds.iter().map(|r| r.len()).collect();
        assert!(sizes.iter().max().unwrap() - sizes.iter().min().unwrap() <= 1);
    }

    #[test]
    fn test_partition_bounds_degenerate() {
        assert_eq!(partition_bounds(2, 5), vec![0..1, 1..2]);
        assert!(partition_bounds(0, 3).is_empty());
        assert_eq!(partition_bounds(3, 1), vec![0..3]);
    }

    #[test]
    fn test_partition_bounds_cover_everything() {
        for len in 0..30 {
            for n in 1..12 {
                let flat: Vec<usize> = partition_bounds(len, n).into_iter().flatten().collect();
                assert_eq!(flat, (0..len).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_strict_layout() {
        let strategy = PartitionedStrategy::new(4).unwrap().strict(true);
        assert!(strategy.check_layout(8).is_ok());
        assert!(matches!(
            strategy.check_layout(10),
            Err(ArcfitError::InvalidPipelineParameter(_))
        ));
        assert!(PartitionedStrategy::new(4).unwrap().check_layout(10).is_ok());
        assert!(PartitionedStrategy::new(0).is_err());
    }
}
