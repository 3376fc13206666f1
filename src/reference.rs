//! # Reference point selection
//!
//! All arcs share a single reference point: the most stable point of the store, i.e.
//! the one with the **lowest initial NMAD**. The reference is fixed for the whole run.
use std::fmt;

use nalgebra::DVector;
use serde::Deserialize;

use crate::{arcfit_errors::ArcfitError, constants::Nmad};

/// What the reference point's own result slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePolicy {
    /// The reference is not estimated; its slot stays zero-filled.
    #[default]
    ZeroFilled,
    /// The reference is estimated against itself like any other point.
    SelfArc,
}

impl fmt::Display for ReferencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferencePolicy::ZeroFilled => f.write_str("zero_filled"),
            ReferencePolicy::SelfArc => f.write_str("self_arc"),
        }
    }
}

/// Position of the minimum initial NMAD.
///
/// Ties resolve to the first position. NaN values are never selected.
///
/// Return
/// ----------
/// * [`ArcfitError::EmptyStore`] for an empty input,
/// * [`ArcfitError::NoValidReference`] when every value is NaN.
pub fn select_reference(nmad_init: &DVector<Nmad>) -> Result<usize, ArcfitError> {
    if nmad_init.is_empty() {
        return Err(ArcfitError::EmptyStore);
    }
    nmad_init
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(position, _)| position)
        .ok_or(ArcfitError::NoValidReference)
}

/// Store positions to estimate, in ascending order.
pub fn work_positions(n_points: usize, reference: usize, policy: ReferencePolicy) -> Vec<usize> {
    match policy {
        ReferencePolicy::ZeroFilled => (0..n_points).filter(|&p| p != reference).collect(),
        ReferencePolicy::SelfArc => (0..n_points).collect(),
    }
}
