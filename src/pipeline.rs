//! # Batch pipeline
//!
//! [`Pipeline`] drives one run over a [`Store`]:
//!
//! 1. select the reference point (lowest initial NMAD),
//! 2. build the work list according to the [`ReferencePolicy`](crate::reference::ReferencePolicy),
//! 3. hand arc construction and estimation to an [`ExecutionStrategy`],
//! 4. place every outcome in a [`ResultSet`] at its store position,
//! 5. optionally persist the result set (see [`Pipeline::persist`]).
//!
//! The estimator is injected: any [`AmbiguityEstimator`] (including a plain closure)
//! can be used. For identical inputs, the sequential strategy and the partitioned
//! strategy with any partition count produce bit-identical result sets.
use std::time::Instant;

use tracing::info;

use crate::{
    arc_builder::ArcBuilder,
    arcfit_errors::ArcfitError,
    archive::write_state_archive,
    config::PipelineConfig,
    estimator::AmbiguityEstimator,
    execution::{ArcJob, ExecutionMode, ExecutionStrategy},
    reference::{select_reference, work_positions},
    results::{aggregate, ResultSet},
    store::{parquet_reader::read_store, parquet_writer::write_augmented_store, Store},
};

/// Output of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    /// Store position of the reference point
    pub reference: usize,
    pub results: ResultSet,
}

pub struct Pipeline<E: AmbiguityEstimator> {
    config: PipelineConfig,
    estimator: E,
}

impl<E: AmbiguityEstimator> Pipeline<E> {
    pub fn new(config: PipelineConfig, estimator: E) -> Self {
        Pipeline { config, estimator }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// Estimate every point of `store` relative to the reference with `strategy`.
    ///
    /// Return
    /// ----------
    /// * the reference position and the aggregated results,
    /// * the first point failure under the fail-fast policy,
    /// * [`ArcfitError::NoValidReference`] if no point has a usable initial NMAD.
    pub fn run(
        &self,
        store: &Store,
        strategy: &dyn ExecutionStrategy,
    ) -> Result<RunOutput, ArcfitError> {
        let start = Instant::now();

        let reference = select_reference(&store.nmad_init())?;
        let builder = ArcBuilder::new(store, reference, self.config.sigma_model)?;
        let positions = work_positions(store.len(), reference, self.config.reference_policy);

        info!(
            reference,
            reference_id = builder.reference().id,
            points = store.len(),
            epochs = store.n_epochs(),
            arcs = positions.len(),
            strategy = %strategy.name(),
            "starting arc estimation"
        );

        let job = ArcJob {
            store,
            builder: &builder,
            estimator: &self.estimator,
            wavelength: self.config.wavelength,
            priors: self.config.priors,
            method: self.config.method,
            positions,
            failure_policy: self.config.failure_policy,
        };
        let outcomes = strategy.execute(&job)?;
        let results = aggregate(store.len(), store.n_epochs(), reference, outcomes)?;

        info!(
            failed = results.failed().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "arc estimation finished"
        );
        Ok(RunOutput { reference, results })
    }

    /// [`run`](Self::run) with the strategy selected by the configuration, or by `mode`
    /// when given.
    pub fn run_configured(
        &self,
        store: &Store,
        mode: Option<ExecutionMode>,
    ) -> Result<RunOutput, ArcfitError> {
        let strategy = self
            .config
            .strategy_for(mode.unwrap_or(self.config.execution))?;
        self.run(store, strategy.as_ref())
    }

    /// Write the state archive and the augmented store to the configured paths.
    pub fn persist(&self, store: &Store, output: &RunOutput) -> Result<(), ArcfitError> {
        let paths = &self.config.paths;
        write_state_archive(&paths.archive, &output.results)?;
        write_augmented_store(
            &paths.input,
            &paths.augmented_store,
            paths.overwrite_source,
            store,
            &output.results,
        )
    }

    /// Load the configured input store, run and persist.
    ///
    /// An output path that would replace the source without `overwrite_source` is
    /// rejected before the store is read.
    pub fn run_from_disk(&self, mode: Option<ExecutionMode>) -> Result<RunOutput, ArcfitError> {
        self.config.paths.check_source_overwrite()?;
        let store = read_store(&self.config.paths.input, None)?.truncated(self.config.num_points)?;
        let output = self.run_configured(&store, mode)?;
        self.persist(&store, &output)?;
        Ok(output)
    }
}
