//! # Space-time store of point time series
//!
//! A [`Store`] holds, for every selected point, the full time series needed to build
//! arcs: complex single-difference observations, incremental NMAD, geometry
//! sensitivity (h2ph), elapsed time and temperature, plus the scalar initial NMAD used
//! to select the reference point.
//!
//! Positions `0..N-1` in the store are the **correspondence contract** of the whole
//! pipeline: result slot `i` always belongs to the point at position `i`.
//!
//! ## On-disk layout
//!
//! Stores are read from and written to Parquet in long layout, one row per
//! `(point, epoch)`; see [`parquet_reader`] and [`parquet_writer`].
pub mod parquet_reader;
pub mod parquet_writer;

use nalgebra::{Complex, DVector};

use crate::{
    arcfit_errors::ArcfitError,
    constants::{Celsius, Nmad, PointId, Year},
};

/// Full time series of one spatial point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    /// External identifier (`space` coordinate of the source store)
    pub id: PointId,
    /// Complex single-difference observation per epoch
    pub sd_complex: DVector<Complex<f64>>,
    /// NMAD of the incremental time series per epoch
    pub nmad_inc: DVector<Nmad>,
    /// NMAD of the initial time series, used for reference selection
    pub nmad_init: Nmad,
    /// Height-to-phase sensitivity per epoch
    pub h2ph: DVector<f64>,
    /// Elapsed time per epoch
    pub years: DVector<Year>,
    /// Temperature per epoch
    pub temperature: DVector<Celsius>,
}

impl PointRecord {
    /// Check that every per-epoch field of the point has `n_epochs` values.
    ///
    /// `position` is the store position reported in the error.
    pub fn check_epochs(&self, position: usize, n_epochs: usize) -> Result<(), ArcfitError> {
        let fields: [(&'static str, usize); 5] = [
            ("sd_complex", self.sd_complex.len()),
            ("nmad_inc", self.nmad_inc.len()),
            ("h2ph", self.h2ph.len()),
            ("years", self.years.len()),
            ("temperature", self.temperature.len()),
        ];
        for (field, found) in fields {
            if found != n_epochs {
                return Err(ArcfitError::ShapeMismatch {
                    point: position,
                    field,
                    expected: n_epochs,
                    found,
                });
            }
        }
        Ok(())
    }
}

/// Ordered, read-only collection of [`PointRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct Store {
    points: Vec<PointRecord>,
    epochs: Vec<u32>,
    n_epochs: usize,
}

impl Store {
    /// Build a store from points in position order.
    ///
    /// The epoch count of the store is the length of the first point's observation
    /// series. Per-point shape consistency is not enforced here: a malformed point is
    /// reported when its arc is built, under the run's failure policy.
    pub fn new(points: Vec<PointRecord>) -> Result<Self, ArcfitError> {
        let n_epochs = points
            .first()
            .map(|p| p.sd_complex.len())
            .ok_or(ArcfitError::EmptyStore)?;
        let epochs = (0..n_epochs as u32).collect();
        Ok(Store {
            points,
            epochs,
            n_epochs,
        })
    }

    /// Build a store from points and the labels (`time` coordinate) of its epochs.
    pub fn from_parts(points: Vec<PointRecord>, epochs: Vec<u32>) -> Result<Self, ArcfitError> {
        let mut store = Store::new(points)?;
        if epochs.len() != store.n_epochs {
            return Err(ArcfitError::ShapeMismatch {
                point: 0,
                field: "time",
                expected: store.n_epochs,
                found: epochs.len(),
            });
        }
        store.epochs = epochs;
        Ok(store)
    }

    /// Keep only the first `num_points` points (partial runs for debugging).
    pub fn truncated(mut self, num_points: Option<usize>) -> Result<Self, ArcfitError> {
        if let Some(n) = num_points {
            if n == 0 {
                return Err(ArcfitError::EmptyStore);
            }
            self.points.truncate(n);
        }
        Ok(self)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn n_epochs(&self) -> usize {
        self.n_epochs
    }

    /// Labels of the epochs (`time` coordinate of the source store).
    pub fn epochs(&self) -> &[u32] {
        &self.epochs
    }

    #[inline]
    pub fn point(&self, position: usize) -> Option<&PointRecord> {
        self.points.get(position)
    }

    pub fn points(&self) -> &[PointRecord] {
        &self.points
    }

    /// Initial NMAD of every point, in position order.
    pub fn nmad_init(&self) -> DVector<Nmad> {
        DVector::from_iterator(self.len(), self.points.iter().map(|p| p.nmad_init))
    }
}

#[cfg(test)]
pub(crate) mod store_test_utils {
    use super::*;

    /// Deterministic point with `t` epochs, shaped by `seed`.
    pub(crate) fn synthetic_point(id: PointId, t: usize, seed: f64, nmad_init: Nmad) -> PointRecord {
        PointRecord {
            id,
            sd_complex: DVector::from_fn(t, |i, _| {
                Complex::from_polar(1.0 + 0.1 * seed, 0.7 * seed * (i as f64 + 1.0))
            }),
            nmad_inc: DVector::from_fn(t, |i, _| 0.05 + 0.01 * seed + 0.002 * i as f64),
            nmad_init,
            h2ph: DVector::from_fn(t, |i, _| 1.0e-4 * (1.0 + seed) * (i as f64 - 2.0)),
            years: DVector::from_fn(t, |i, _| i as f64 * 12.0 / 365.25),
            temperature: DVector::from_fn(t, |i, _| 10.0 + 5.0 * (i as f64).sin()),
        }
    }
}
