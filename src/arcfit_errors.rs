use thiserror::Error;

use crate::constants::PointId;

#[derive(Error, Debug)]
pub enum ArcfitError {
    #[error("Invalid sigma model: {0} (choose 'mean' or 'mean_2_sigma')")]
    InvalidSigmaModel(String),

    #[error("Invalid LAMBDA method: {0} (expected an integer in 1..=5)")]
    InvalidLambdaMethod(i64),

    #[error("LAMBDA method not supported by this estimator: {0}")]
    UnsupportedMethod(String),

    #[error("Invalid pipeline parameter: {0}")]
    InvalidPipelineParameter(String),

    #[error("Unable to read configuration file: {0}")]
    ConfigFileError(String),

    #[error("Store contains no point")]
    EmptyStore,

    #[error("No valid reference point: every initial NMAD is NaN")]
    NoValidReference,

    #[error("Point {point}: field '{field}' has {found} epochs, expected {expected}")]
    ShapeMismatch {
        point: usize,
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Store row is missing for point {id} at epoch {epoch}")]
    MissingEpoch { id: PointId, epoch: u32 },

    #[error("Store has more than one row for point {id} at epoch {epoch}")]
    DuplicateRow { id: PointId, epoch: u32 },

    #[error("Column '{0}' not found or of unexpected type in the store")]
    MissingColumn(String),

    #[error("Estimation failed for point {point}: {reason}")]
    EstimationFailed { point: usize, reason: String },

    #[error("Result slot {0} was already written")]
    SlotAlreadyWritten(usize),

    #[error("Result slot {0} is out of range")]
    SlotOutOfRange(usize),

    #[error("Refusing to overwrite the source store {0} (set overwrite_source to allow it)")]
    SourceOverwriteDenied(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow_schema::ArrowError),

    #[error("Thread pool creation failed: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
}

impl ArcfitError {
    /// Whether this error belongs to a single point and may be absorbed by the
    /// `skip_point` failure policy.
    pub fn is_per_point(&self) -> bool {
        matches!(
            self,
            ArcfitError::ShapeMismatch { .. } | ArcfitError::EstimationFailed { .. }
        )
    }
}

impl PartialEq for ArcfitError {
    fn eq(&self, other: &Self) -> bool {
        use ArcfitError::*;
        match (self, other) {
            (InvalidSigmaModel(a), InvalidSigmaModel(b)) => a == b,
            (InvalidLambdaMethod(a), InvalidLambdaMethod(b)) => a == b,
            (UnsupportedMethod(a), UnsupportedMethod(b)) => a == b,
            (InvalidPipelineParameter(a), InvalidPipelineParameter(b)) => a == b,
            (ConfigFileError(a), ConfigFileError(b)) => a == b,
            (
                ShapeMismatch {
                    point: p1,
                    field: f1,
                    expected: e1,
                    found: n1,
                },
                ShapeMismatch {
                    point: p2,
                    field: f2,
                    expected: e2,
                    found: n2,
                },
            ) => p1 == p2 && f1 == f2 && e1 == e2 && n1 == n2,
            (MissingEpoch { id: a, epoch: e1 }, MissingEpoch { id: b, epoch: e2 }) => {
                a == b && e1 == e2
            }
            (DuplicateRow { id: a, epoch: e1 }, DuplicateRow { id: b, epoch: e2 }) => {
                a == b && e1 == e2
            }
            (MissingColumn(a), MissingColumn(b)) => a == b,
            (
                EstimationFailed {
                    point: p1,
                    reason: r1,
                },
                EstimationFailed {
                    point: p2,
                    reason: r2,
                },
            ) => p1 == p2 && r1 == r2,
            (SlotAlreadyWritten(a), SlotAlreadyWritten(b)) => a == b,
            (SlotOutOfRange(a), SlotOutOfRange(b)) => a == b,
            (SourceOverwriteDenied(a), SourceOverwriteDenied(b)) => a == b,

            // Foreign errors are not comparable: equal if same variant
            (IoError(_), IoError(_)) => true,
            (ParquetError(_), ParquetError(_)) => true,
            (ArrowError(_), ArrowError(_)) => true,
            (ThreadPoolError(_), ThreadPoolError(_)) => true,

            (EmptyStore, EmptyStore) => true,
            (NoValidReference, NoValidReference) => true,

            _ => false,
        }
    }
}
