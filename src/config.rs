//! # Run configuration
//!
//! [`PipelineConfig`] gathers every tunable of a run: physical constants, a-priori
//! noise, LAMBDA method, sigma model, execution strategy and file locations.
//!
//! A configuration is obtained either from a TOML file ([`PipelineConfig::from_file`])
//! or programmatically through [`PipelineConfig::builder`]. Both paths go through the
//! same validation. Every field is optional in TOML; a missing field takes its default.
//!
//! ```toml
//! wavelength = 0.055465763
//! method = 2
//! sigma_model = "mean_2_sigma"
//! execution = "partitioned"
//! n_partitions = 12
//!
//! [priors]
//! sigma_vel = 0.0001
//!
//! [paths]
//! input = "data/stm.parquet"
//! archive = "x_hat_Q_xhat.npz"
//! augmented_store = "stm_init_unw.parquet"
//! ```
use std::{
    cmp::Ordering::Greater,
    fmt, fs,
};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::{
    arcfit_errors::ArcfitError,
    constants::{Meter, DEFAULT_PARTITIONS, S1_WAVELENGTH},
    estimator::{LambdaMethod, NoisePriors},
    execution::{
        partitioned::PartitionedStrategy, sequential::SequentialStrategy, ExecutionMode,
        ExecutionStrategy, FailurePolicy,
    },
    reference::ReferencePolicy,
    sigma_model::SigmaModel,
    store::parquet_writer::same_file,
};

/// Input and output locations.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathConfig {
    /// Source store (long-format Parquet)
    pub input: Utf8PathBuf,
    /// Output `.npz` archive with `x_hat` and `Q_xhat`
    pub archive: Utf8PathBuf,
    /// Output store augmented with `y_hat` and `phs_unw_init`
    pub augmented_store: Utf8PathBuf,
    /// Allow `augmented_store` to replace `input`
    pub overwrite_source: bool,
}

impl PathConfig {
    /// Fail when `augmented_store` is `input` and `overwrite_source` is off.
    pub fn check_source_overwrite(&self) -> Result<(), ArcfitError> {
        if !self.overwrite_source && same_file(&self.input, &self.augmented_store) {
            return Err(ArcfitError::SourceOverwriteDenied(
                self.augmented_store.to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        PathConfig {
            input: Utf8PathBuf::from("data/stm.parquet"),
            archive: Utf8PathBuf::from("x_hat_Q_xhat.npz"),
            augmented_store: Utf8PathBuf::from("stm_init_unw.parquet"),
            overwrite_source: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Radar wavelength (m)
    pub wavelength: Meter,
    pub priors: NoisePriors,
    /// LAMBDA method; the built-in `RoundingEstimator` serves `2` only
    pub method: LambdaMethod,
    pub sigma_model: SigmaModel,
    /// Process only the first `num_points` points of the store
    pub num_points: Option<usize>,
    pub n_partitions: usize,
    pub execution: ExecutionMode,
    /// Reject partition counts that do not divide the work list
    pub strict_partitioning: bool,
    pub failure_policy: FailurePolicy,
    pub reference_policy: ReferencePolicy,
    pub paths: PathConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            wavelength: S1_WAVELENGTH,
            priors: NoisePriors::default(),
            method: LambdaMethod::IntegerBootstrapping,
            sigma_model: SigmaModel::default(),
            num_points: None,
            n_partitions: DEFAULT_PARTITIONS,
            execution: ExecutionMode::default(),
            strict_partitioning: false,
            failure_policy: FailurePolicy::default(),
            reference_policy: ReferencePolicy::default(),
            paths: PathConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Load and validate a TOML configuration file.
    ///
    /// Return
    /// ----------
    /// * [`ArcfitError::ConfigFileError`] when the file cannot be read or parsed,
    /// * [`ArcfitError::InvalidPipelineParameter`] when a value fails validation.
    pub fn from_file(path: &Utf8Path) -> Result<Self, ArcfitError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ArcfitError::ConfigFileError(format!("{path}: {e}")))?;
        Self::from_toml(&content)
            .map_err(|e| match e {
                ArcfitError::ConfigFileError(msg) => {
                    ArcfitError::ConfigFileError(format!("{path}: {msg}"))
                }
                other => other,
            })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ArcfitError> {
        let config: PipelineConfig =
            toml::from_str(content).map_err(|e| ArcfitError::ConfigFileError(e.to_string()))?;
        config.validate()
    }

    fn validate(self) -> Result<Self, ArcfitError> {
        self.into_builder().build()
    }

    /// Builder seeded with this configuration, to override some fields.
    pub fn into_builder(self) -> PipelineConfigBuilder {
        PipelineConfigBuilder { config: self }
    }

    /// Execution strategy selected by `execution`, sized by `n_partitions`.
    pub fn strategy(&self) -> Result<Box<dyn ExecutionStrategy>, ArcfitError> {
        self.strategy_for(self.execution)
    }

    /// Same as [`strategy`](Self::strategy) with an explicit mode.
    pub fn strategy_for(&self, mode: ExecutionMode) -> Result<Box<dyn ExecutionStrategy>, ArcfitError> {
        Ok(match mode {
            ExecutionMode::Sequential => Box::new(SequentialStrategy),
            ExecutionMode::Partitioned => Box::new(
                PartitionedStrategy::new(self.n_partitions)?.strict(self.strict_partitioning),
            ),
        })
    }
}

/// Builder for [`PipelineConfig`], with validation.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wavelength(mut self, v: Meter) -> Self {
        self.config.wavelength = v;
        self
    }
    pub fn priors(mut self, v: NoisePriors) -> Self {
        self.config.priors = v;
        self
    }
    pub fn method(mut self, v: LambdaMethod) -> Self {
        self.config.method = v;
        self
    }
    pub fn sigma_model(mut self, v: SigmaModel) -> Self {
        self.config.sigma_model = v;
        self
    }
    pub fn num_points(mut self, v: Option<usize>) -> Self {
        self.config.num_points = v;
        self
    }
    pub fn n_partitions(mut self, v: usize) -> Self {
        self.config.n_partitions = v;
        self
    }
    pub fn execution(mut self, v: ExecutionMode) -> Self {
        self.config.execution = v;
        self
    }
    pub fn strict_partitioning(mut self, v: bool) -> Self {
        self.config.strict_partitioning = v;
        self
    }
    pub fn failure_policy(mut self, v: FailurePolicy) -> Self {
        self.config.failure_policy = v;
        self
    }
    pub fn reference_policy(mut self, v: ReferencePolicy) -> Self {
        self.config.reference_policy = v;
        self
    }
    pub fn paths(mut self, v: PathConfig) -> Self {
        self.config.paths = v;
        self
    }

    /// Return true iff x > 0.0 and finite.
    #[inline]
    fn gt0(x: f64) -> bool {
        x.is_finite() && x.partial_cmp(&0.0) == Some(Greater)
    }

    /// Finalize the builder.
    ///
    /// Validation rules
    /// -----------------
    /// * `wavelength > 0`
    /// * every a-priori sigma `> 0` and finite
    /// * `n_partitions >= 1`
    /// * `num_points`, when set, `>= 1`
    /// * `paths.augmented_store` differs from `paths.input` unless
    ///   `paths.overwrite_source` is set
    pub fn build(self) -> Result<PipelineConfig, ArcfitError> {
        let c = &self.config;

        if !Self::gt0(c.wavelength) {
            return Err(ArcfitError::InvalidPipelineParameter(
                "wavelength must be > 0".into(),
            ));
        }
        if !c.priors.as_vector().iter().all(|s| Self::gt0(*s)) {
            return Err(ArcfitError::InvalidPipelineParameter(
                "a-priori sigmas must be finite and > 0".into(),
            ));
        }
        if c.n_partitions == 0 {
            return Err(ArcfitError::InvalidPipelineParameter(
                "n_partitions must be >= 1".into(),
            ));
        }
        if c.num_points == Some(0) {
            return Err(ArcfitError::InvalidPipelineParameter(
                "num_points must be >= 1 when set".into(),
            ));
        }
        c.paths.check_source_overwrite()?;

        Ok(self.config)
    }
}

impl fmt::Display for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 44;
            writeln!(f, "Arc Estimation Parameters")?;
            writeln!(f, "-------------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = " ".repeat(PARAM_COL.saturating_sub(s.len()).max(1));
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Model]")?;
            line!("wavelength = {}", self.wavelength, "radar wavelength (m)")?;
            line!("method = {}", self.method, "LAMBDA method")?;
            line!("sigma_model = {}", self.sigma_model, "NMAD → phase sigma model")?;
            line!("sigma_offset = {}", self.priors.sigma_offset, "offset prior (m)")?;
            line!("sigma_vel = {}", self.priors.sigma_vel, "velocity prior (m/yr)")?;
            line!("sigma_h = {}", self.priors.sigma_h, "height prior (m)")?;
            line!("sigma_ther = {}", self.priors.sigma_ther, "thermal prior (m/°C)")?;

            writeln!(f, "[Execution]")?;
            line!("execution = {}", self.execution, "strategy")?;
            line!("n_partitions = {}", self.n_partitions, "partitioned strategy only")?;
            line!("strict_partitioning = {}", self.strict_partitioning, "even partitions required")?;
            line!("failure_policy = {}", self.failure_policy, "per-point failures")?;
            line!("reference_policy = {}", self.reference_policy, "reference slot content")?;
            let num_points = self
                .num_points
                .map_or_else(|| "all".to_string(), |n| n.to_string());
            line!("num_points = {}", num_points, "points processed")?;

            writeln!(f, "[Paths]")?;
            line!("input = {}", self.paths.input, "source store")?;
            line!("archive = {}", self.paths.archive, "x_hat / Q_xhat archive")?;
            line!("augmented_store = {}", self.paths.augmented_store, "store with y_hat / phs_unw_init")?;
            line!("overwrite_source = {}", self.paths.overwrite_source, "allow in-place output")
        } else {
            write!(
                f,
                "PipelineConfig(method={}, sigma_model={}, execution={}, n_partitions={}, failure_policy={})",
                self.method.code(),
                self.sigma_model,
                self.execution,
                self.n_partitions,
                self.failure_policy
            )
        }
    }
}
