//! # NMAD to phase sigma conversion
//!
//! The noise of a phase observation is not measured directly: it is approximated from
//! the **Normalized Median Absolute Deviation** (NMAD) of the incremental phase time
//! series through an empirical cubic polynomial
//!
//! ```text
//! sigma = a + b·nmad + c·nmad² + d·nmad³
//! ```
//!
//! The polynomial is a calibration, not a physical model. Two calibrations exist:
//!
//! - [`SigmaModel::Mean`] – fitted on the mean of the simulated sigma curves,
//! - [`SigmaModel::Mean2Sigma`] – fitted on the mean + 2σ envelope (conservative).
//!
//! A model can be created from its name:
//!
//! ```rust
//! use arcfit::sigma_model::SigmaModel;
//! let model: SigmaModel = "mean_2_sigma".parse().unwrap();
//! assert_eq!(model, SigmaModel::Mean2Sigma);
//! ```
use std::{fmt, str::FromStr};

use nalgebra::DVector;
use serde::Deserialize;

use crate::{arcfit_errors::ArcfitError, constants::Nmad};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum SigmaModel {
    Mean,
    #[default]
    Mean2Sigma,
}

impl SigmaModel {
    /// Polynomial coefficients `(a, b, c, d)` of the calibration.
    pub fn coefficients(&self) -> (f64, f64, f64, f64) {
        match self {
            SigmaModel::Mean => (-0.0144869469, 2.00028682, -5.23271341, 21.1111801),
            SigmaModel::Mean2Sigma => (0.01907808, 1.2852969, 1.90052824, 11.60677721),
        }
    }

    /// Phase sigma for a single NMAD value.
    #[inline]
    pub fn sigma(&self, nmad: Nmad) -> f64 {
        let (a, b, c, d) = self.coefficients();
        a + b * nmad + c * nmad.powi(2) + d * nmad.powi(3)
    }

    /// Element-wise phase sigma of an NMAD series.
    pub fn sigma_series(&self, nmad: &DVector<Nmad>) -> DVector<f64> {
        nmad.map(|v| self.sigma(v))
    }

    pub fn name(&self) -> &'static str {
        match self {
            SigmaModel::Mean => "mean",
            SigmaModel::Mean2Sigma => "mean_2_sigma",
        }
    }
}

impl FromStr for SigmaModel {
    type Err = ArcfitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(SigmaModel::Mean),
            "mean_2_sigma" => Ok(SigmaModel::Mean2Sigma),
            other => Err(ArcfitError::InvalidSigmaModel(other.to_string())),
        }
    }
}

impl TryFrom<String> for SigmaModel {
    type Error = ArcfitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for SigmaModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Convert an NMAD series to phase sigmas with a model given by name.
///
/// Arguments
/// -----------------
/// * `nmad`: NMAD value of each epoch.
/// * `model`: `"mean"` or `"mean_2_sigma"`.
///
/// Return
/// ----------
/// * The phase sigma of each epoch, or [`ArcfitError::InvalidSigmaModel`] for any other
///   model name.
pub fn nmad_to_sigma_phase(nmad: &DVector<Nmad>, model: &str) -> Result<DVector<f64>, ArcfitError> {
    let model: SigmaModel = model.parse()?;
    Ok(model.sigma_series(nmad))
}
