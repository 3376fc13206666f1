//! # Arc construction
//!
//! An arc pairs the fixed reference point with one target point. Its observations are
//! the **double-differenced** wrapped phase, the propagated phase sigma of both points
//! and the mean height-to-phase sensitivity of the pair:
//!
//! ```text
//! phs_wrapped    = arg(sd_ref · conj(sd_target))            ∈ (-π, π]
//! sigma_phs_apri = sqrt(σ(nmad_inc_ref)² + σ(nmad_inc_target)²)
//! h2ph_arc       = (h2ph_ref + h2ph_target) / 2
//! ```
//!
//! where `σ` is the arc [`SigmaModel`] (`mean_2_sigma` by default). The time and
//! temperature series of the target are passed through unchanged.
use std::f64::consts::PI;

use nalgebra::DVector;

use crate::{
    arcfit_errors::ArcfitError,
    constants::{Celsius, Radian, Year},
    sigma_model::SigmaModel,
    store::{PointRecord, Store},
};

/// Estimation problem of one (reference, target) arc.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcObservation {
    pub phs_wrapped: DVector<Radian>,
    pub sigma_phs_apri: DVector<f64>,
    pub h2ph_arc: DVector<f64>,
    pub years: DVector<Year>,
    pub temp: DVector<Celsius>,
}

impl ArcObservation {
    #[inline]
    pub fn n_epochs(&self) -> usize {
        self.phs_wrapped.len()
    }
}

/// Builds arcs against a fixed reference point.
///
/// The reference sigma series is computed once at construction.
#[derive(Debug, Clone)]
pub struct ArcBuilder<'s> {
    reference: &'s PointRecord,
    reference_position: usize,
    sigma_ref: DVector<f64>,
    sigma_model: SigmaModel,
    n_epochs: usize,
}

impl<'s> ArcBuilder<'s> {
    /// Create a builder for the reference at `reference_position` in `store`.
    ///
    /// Fails if the position is out of range or if the reference itself does not hold
    /// `store.n_epochs()` values in every per-epoch field: no arc can be built then.
    pub fn new(
        store: &'s Store,
        reference_position: usize,
        sigma_model: SigmaModel,
    ) -> Result<Self, ArcfitError> {
        let reference = store
            .point(reference_position)
            .ok_or(ArcfitError::SlotOutOfRange(reference_position))?;
        reference.check_epochs(reference_position, store.n_epochs())?;

        Ok(ArcBuilder {
            reference,
            reference_position,
            sigma_ref: sigma_model.sigma_series(&reference.nmad_inc),
            sigma_model,
            n_epochs: store.n_epochs(),
        })
    }

    pub fn reference(&self) -> &PointRecord {
        self.reference
    }

    pub fn reference_position(&self) -> usize {
        self.reference_position
    }

    pub fn sigma_model(&self) -> SigmaModel {
        self.sigma_model
    }

    /// Build the arc from the reference to `target`, found at `position` in the store.
    pub fn build(&self, position: usize, target: &PointRecord) -> Result<ArcObservation, ArcfitError> {
        target.check_epochs(position, self.n_epochs)?;

        let sigma_target = self.sigma_model.sigma_series(&target.nmad_inc);
        let sigma_phs_apri = sigma_target.zip_map(&self.sigma_ref, |s_t, s_r| {
            (s_t * s_t + s_r * s_r).sqrt()
        });

        let phs_wrapped = self
            .reference
            .sd_complex
            .zip_map(&target.sd_complex, |r, t| half_open_angle((r * t.conj()).arg()));

        let h2ph_arc = self
            .reference
            .h2ph
            .zip_map(&target.h2ph, |r, t| (r + t) / 2.0);

        Ok(ArcObservation {
            phs_wrapped,
            sigma_phs_apri,
            h2ph_arc,
            years: target.years.clone(),
            temp: target.temperature.clone(),
        })
    }
}

/// Map `atan2` output from `[-π, π]` to `(-π, π]`.
#[inline]
fn half_open_angle(angle: Radian) -> Radian {
    if angle <= -PI {
        PI
    } else {
        angle
    }
}
