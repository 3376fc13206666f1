//! # Result aggregation
//!
//! A [`ResultSet`] holds the four fixed-shape output arrays of a run, indexed by store
//! position:
//!
//! | field          | shape   |
//! |----------------|---------|
//! | `x_hat`        | N × 4   |
//! | `Q_xhat`       | 4 × 4 × N |
//! | `y_hats`       | N × T   |
//! | `phs_unw_init` | N × T   |
//!
//! Every slot is **written once**. Its [`SlotStatus`] records what it holds: the
//! zero-filled reference, an estimate, a failure (NaN-filled) or nothing yet.
use nalgebra::{DMatrix, DVector, Matrix4, Vector4};
use tracing::warn;

use crate::{
    arcfit_errors::ArcfitError,
    constants::N_STATE,
    estimator::EstimationResult,
    execution::PointOutcome,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SlotStatus {
    Pending,
    Reference,
    Estimated,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    x_hat: DMatrix<f64>,
    q_xhat: Vec<Matrix4<f64>>,
    y_hats: DMatrix<f64>,
    phs_unw_init: DMatrix<f64>,
    status: Vec<SlotStatus>,
}

impl ResultSet {
    /// Zero-filled result set for `n_points` points of `n_epochs` epochs.
    pub fn zeros(n_points: usize, n_epochs: usize) -> Self {
        ResultSet {
            x_hat: DMatrix::zeros(n_points, N_STATE),
            q_xhat: vec![Matrix4::zeros(); n_points],
            y_hats: DMatrix::zeros(n_points, n_epochs),
            phs_unw_init: DMatrix::zeros(n_points, n_epochs),
            status: vec![SlotStatus::Pending; n_points],
        }
    }

    #[inline]
    pub fn n_points(&self) -> usize {
        self.status.len()
    }

    #[inline]
    pub fn n_epochs(&self) -> usize {
        self.y_hats.ncols()
    }

    fn claim(&mut self, position: usize) -> Result<(), ArcfitError> {
        match self.status.get(position) {
            None => Err(ArcfitError::SlotOutOfRange(position)),
            Some(SlotStatus::Pending) => Ok(()),
            Some(_) => Err(ArcfitError::SlotAlreadyWritten(position)),
        }
    }

    /// Write an estimation result into slot `position`.
    pub fn place(&mut self, position: usize, result: &EstimationResult) -> Result<(), ArcfitError> {
        self.claim(position)?;
        let n_epochs = self.n_epochs();
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

        self.x_hat.set_row(position, &result.x_hat.transpose());
        self.q_xhat[position] = result.q_xhat;
        self.y_hats.set_row(position, &result.y_hat.transpose());
        self.phs_unw_init.set_row(position, &result.phs_unw_init.transpose());
        self.status[position] = SlotStatus::Estimated;
        Ok(())
    }

    /// Mark slot `position` as the zero-filled reference.
    pub fn mark_reference(&mut self, position: usize) -> Result<(), ArcfitError> {
        self.claim(position)?;
        self.status[position] = SlotStatus::Reference;
        Ok(())
    }

    /// Mark slot `position` as failed; its values become NaN.
    pub fn mark_failed(&mut self, position: usize, reason: String) -> Result<(), ArcfitError> {
        self.claim(position)?;
        self.x_hat.row_mut(position).fill(f64::NAN);
        self.q_xhat[position].fill(f64::NAN);
        self.y_hats.row_mut(position).fill(f64::NAN);
        self.phs_unw_init.row_mut(position).fill(f64::NAN);
        self.status[position] = SlotStatus::Failed(reason);
        Ok(())
    }

    /// Estimated state matrix (N × 4).
    pub fn x_hat(&self) -> &DMatrix<f64> {
        &self.x_hat
    }

    /// State covariance of each point.
    pub fn q_xhat(&self) -> &[Matrix4<f64>] {
        &self.q_xhat
    }

    /// Covariance tensor `Q_xhat[i, j, k]` (4 × 4 × N) flattened in row-major order.
    pub fn q_xhat_tensor(&self) -> Vec<f64> {
        let n = self.n_points();
        let mut tensor = Vec::with_capacity(N_STATE * N_STATE * n);
        for i in 0..N_STATE {
            for j in 0..N_STATE {
                tensor.extend(self.q_xhat.iter().map(|q| q[(i, j)]));
            }
        }
        tensor
    }

    /// Reconstructed phase series (N × T).
    pub fn y_hats(&self) -> &DMatrix<f64> {
        &self.y_hats
    }

    /// Initial unwrapped phase series (N × T).
    pub fn phs_unw_init(&self) -> &DMatrix<f64> {
        &self.phs_unw_init
    }

    pub fn status(&self) -> &[SlotStatus] {
        &self.status
    }

    /// The four fields of slot `position`, if it holds an estimate.
    pub fn slot(&self, position: usize) -> Option<EstimationResult> {
        match self.status.get(position)? {
            SlotStatus::Estimated => Some(EstimationResult {
                x_hat: Vector4::from_iterator(self.x_hat.row(position).iter().copied()),
                q_xhat: self.q_xhat[position],
                y_hat: DVector::from_iterator(self.n_epochs(), self.y_hats.row(position).iter().copied()),
                phs_unw_init: DVector::from_iterator(
                    self.n_epochs(),
                    self.phs_unw_init.row(position).iter().copied(),
                ),
            }),
            _ => None,
        }
    }

    pub fn pending(&self) -> Vec<usize> {
        self.positions_where(|s| *s == SlotStatus::Pending)
    }

    pub fn failed(&self) -> Vec<usize> {
        self.positions_where(|s| matches!(s, SlotStatus::Failed(_)))
    }

    fn positions_where(&self, predicate: impl Fn(&SlotStatus) -> bool) -> Vec<usize> {
        self.status
            .iter()
            .enumerate()
            .filter(|(_, s)| predicate(s))
            .map(|(position, _)| position)
            .collect()
    }

    /// Equality of every stored value down to the bit pattern (NaN included) and of
    /// every slot status.
    pub fn bit_identical(&self, other: &ResultSet) -> bool {
        fn same<'a>(a: impl Iterator<Item = &'a f64>, b: impl Iterator<Item = &'a f64>) -> bool {
            a.map(|v| v.to_bits()).eq(b.map(|v| v.to_bits()))
        }
        self.status == other.status
            && self.x_hat.shape() == other.x_hat.shape()
            && self.y_hats.shape() == other.y_hats.shape()
            && same(self.x_hat.iter(), other.x_hat.iter())
            && same(
                self.q_xhat.iter().flat_map(|q| q.iter()),
                other.q_xhat.iter().flat_map(|q| q.iter()),
            )
            && same(self.y_hats.iter(), other.y_hats.iter())
            && same(self.phs_unw_init.iter(), other.phs_unw_init.iter())
    }
}

/// Place ordered outcomes into a fresh [`ResultSet`].
///
/// Arguments
/// -----------------
/// * `n_points`, `n_epochs`: shape of the store.
/// * `reference`: reference position, marked [`SlotStatus::Reference`] when it is not
///   part of the outcomes.
/// * `outcomes`: strategy output; per-point failures are placed as NaN-filled failed
///   slots, any other error is returned.
pub fn aggregate(
    n_points: usize,
    n_epochs: usize,
    reference: usize,
    outcomes: Vec<PointOutcome>,
) -> Result<ResultSet, ArcfitError> {
    let mut results = ResultSet::zeros(n_points, n_epochs);
    let mut reference_estimated = false;

    for outcome in outcomes {
        reference_estimated |= outcome.position == reference;
        match outcome.result {
            Ok(result) => results.place(outcome.position, &result)?,
            Err(err) if !err.is_per_point() => return Err(err),
            Err(err) => {
                warn!(position = outcome.position, error = %err, "point skipped");
                results.mark_failed(outcome.position, err.to_string())?;
            }
        }
    }

    if !reference_estimated {
        results.mark_reference(reference)?;
    }
    Ok(results)
}

#[cfg(test)]
mod results_test {
    use super::*;

    fn result(seed: f64, n_epochs: usize) -> EstimationResult {
        EstimationResult {
            x_hat: Vector4::new(seed, seed + 1.0, seed + 2.0, seed + 3.0),
            q_xhat: Matrix4::from_fn(|i, j| seed * 10.0 + (i * 4 + j) as f64),
            y_hat: DVector::from_fn(n_epochs, |t, _| seed + t as f64),
            phs_unw_init: DVector::from_fn(n_epochs, |t, _| -seed - t as f64),
        }
    }

    #[test]
    fn test_place_and_read_back() {
        let mut results = ResultSet::zeros(3, 5);
        let r = result(2.0, 5);
        results.place(2, &r).unwrap();

        assert_eq!(results.slot(2).unwrap(), r);
        assert_eq!(results.x_hat().row(2)[3], 5.0);
        assert_eq!(results.y_hats()[(2, 4)], 6.0);
        assert_eq!(results.pending(), vec![0, 1]);
    }

    #[test]
    fn test_write_once() {
        let mut results = ResultSet::zeros(2, 3);
        results.place(0, &result(1.0, 3)).unwrap();
        assert_eq!(
            results.place(0, &result(1.0, 3)).unwrap_err(),
            ArcfitError::SlotAlreadyWritten(0)
        );
        assert_eq!(
            results.place(5, &result(1.0, 3)).unwrap_err(),
            ArcfitError::SlotOutOfRange(5)
        );
        results.mark_reference(1).unwrap();
        assert_eq!(results.mark_failed(1, "x".into()).unwrap_err(), ArcfitError::SlotAlreadyWritten(1));
    }

    #[test]
    fn test_wrong_epoch_count() {
        let mut results = ResultSet::zeros(2, 3);
        assert!(matches!(
            results.place(0, &result(1.0, 4)),
            Err(ArcfitError::ShapeMismatch { point: 0, .. })
        ));
        assert_eq!(results.status()[0], SlotStatus::Pending);
    }

    #[test]
    fn test_q_xhat_tensor_layout() {
        let mut results = ResultSet::zeros(2, 1);
        results.place(0, &result(0.0, 1)).unwrap();
        results.place(1, &result(1.0, 1)).unwrap();
        let tensor = results.q_xhat_tensor();

        assert_eq!(tensor.len(), 32);
        // Q[i, j, k] lives at (i * 4 + j) * N + k
        for i in 0..4 {
            for j in 0..4 {
                for k in 0..2 {
                    assert_eq!(tensor[(i * 4 + j) * 2 + k], results.q_xhat()[k][(i, j)]);
                }
            }
        }
    }

    #[test]
    fn test_aggregate_with_failure() {
        let outcomes = vec![
            PointOutcome {
                position: 0,
                result: Ok(result(1.0, 2)),
            },
            PointOutcome {
                position: 2,
                result: Err(ArcfitError::EstimationFailed {
                    point: 2,
                    reason: "diverged".into(),
                }),
            },
        ];
        let results = aggregate(3, 2, 1, outcomes).unwrap();

        assert_eq!(results.status()[0], SlotStatus::Estimated);
        assert_eq!(results.status()[1], SlotStatus::Reference);
        assert!(matches!(results.status()[2], SlotStatus::Failed(_)));
        assert!(results.x_hat()[(2, 0)].is_nan());
        assert_eq!(results.x_hat().row(1).iter().sum::<f64>(), 0.0);
        assert_eq!(results.failed(), vec![2]);
        assert!(results.pending().is_empty());
        assert!(results.bit_identical(&results.clone()));
    }

    #[test]
    fn test_aggregate_rejects_run_level_error() {
        let outcomes = vec![
            PointOutcome {
                position: 0,
                result: Ok(result(1.0, 2)),
            },
            PointOutcome {
                position: 2,
                result: Err(ArcfitError::SlotOutOfRange(2)),
            },
        ];
        assert_eq!(
            aggregate(3, 2, 1, outcomes).unwrap_err(),
            ArcfitError::SlotOutOfRange(2)
        );
    }
}
