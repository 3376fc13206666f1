//! # Integer-ambiguity / parameter estimation contract
//!
//! Every arc is handed to an estimator that resolves the integer phase ambiguities and
//! estimates four parameters per point: offset, velocity, height correction and thermal
//! expansion coefficient. The numerical method is not part of this crate's contract;
//! only its **signature** and its **fixed 4-tuple output** are:
//!
//! ```text
//! (wavelength, phs_wrapped, sigma_phs_apri, years, h2ph_arc, temp,
//!  sigma_offset, sigma_vel, sigma_h, sigma_ther, method)
//!     -> (x_hat[4], Q_xhat[4×4], y_hat[T], phs_unw_init[T])
//! ```
//!
//! Any type implementing [`AmbiguityEstimator`] can be plugged into the pipeline,
//! including plain closures. Estimators are shared read-only by parallel workers and
//! must therefore be `Send + Sync` and deterministic for identical inputs.
//!
//! [`baseline::RoundingEstimator`] is a small reference implementation of the
//! integer rounding method.
pub mod baseline;

use std::{fmt, str::FromStr};

use nalgebra::{DVector, Matrix4, Vector4};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    arc_builder::ArcObservation,
    arcfit_errors::ArcfitError,
    constants::{Meter, SIGMA_H, SIGMA_OFFSET, SIGMA_THER, SIGMA_VEL},
};

/// Ambiguity resolution method of the LAMBDA family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "i64")]
pub enum LambdaMethod {
    /// 1: integer least squares with shrinking search
    IlsShrinking,
    /// 2: integer rounding
    IntegerRounding,
    /// 3: integer bootstrapping
    IntegerBootstrapping,
    /// 4: partial ambiguity resolution
    PartialAmbiguityResolution,
    /// 5: integer least squares with ratio test
    IlsRatioTest,
}

impl LambdaMethod {
    /// Numeric selector (1..=5) expected by LAMBDA implementations.
    pub fn code(&self) -> u8 {
        match self {
            LambdaMethod::IlsShrinking => 1,
            LambdaMethod::IntegerRounding => 2,
            LambdaMethod::IntegerBootstrapping => 3,
            LambdaMethod::PartialAmbiguityResolution => 4,
            LambdaMethod::IlsRatioTest => 5,
        }
    }
}

impl TryFrom<i64> for LambdaMethod {
    type Error = ArcfitError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(LambdaMethod::IlsShrinking),
            2 => Ok(LambdaMethod::IntegerRounding),
            3 => Ok(LambdaMethod::IntegerBootstrapping),
            4 => Ok(LambdaMethod::PartialAmbiguityResolution),
            5 => Ok(LambdaMethod::IlsRatioTest),
            other => Err(ArcfitError::InvalidLambdaMethod(other)),
        }
    }
}

impl FromStr for LambdaMethod {
    type Err = ArcfitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code: i64 = s
            .trim()
            .parse()
            .map_err(|_| ArcfitError::InvalidPipelineParameter(format!("method '{s}' is not an integer")))?;
        LambdaMethod::try_from(code)
    }
}

impl fmt::Display for LambdaMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LambdaMethod::IlsShrinking => "ILS with shrinking search",
            LambdaMethod::IntegerRounding => "integer rounding",
            LambdaMethod::IntegerBootstrapping => "integer bootstrapping",
            LambdaMethod::PartialAmbiguityResolution => "PAR",
            LambdaMethod::IlsRatioTest => "ILS with ratio test",
        };
        write!(f, "{} ({})", self.code(), label)
    }
}

/// A-priori sigmas of the four unknown parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NoisePriors {
    /// Offset (m)
    pub sigma_offset: Meter,
    /// Velocity (m/yr)
    pub sigma_vel: f64,
    /// Height correction (m)
    pub sigma_h: Meter,
    /// Thermal expansion coefficient (m/°C)
    pub sigma_ther: f64,
}

impl Default for NoisePriors {
    fn default() -> Self {
        NoisePriors {
            sigma_offset: SIGMA_OFFSET,
            sigma_vel: SIGMA_VEL,
            sigma_h: SIGMA_H,
            sigma_ther: SIGMA_THER,
        }
    }
}

impl NoisePriors {
    pub fn as_vector(&self) -> Vector4<f64> {
        Vector4::new(self.sigma_offset, self.sigma_vel, self.sigma_h, self.sigma_ther)
    }
}

/// Inputs of one estimator call.
#[derive(Debug, Clone, Copy)]
pub struct EstimationRequest<'a> {
    pub wavelength: Meter,
    pub arc: &'a ArcObservation,
    pub priors: &'a NoisePriors,
    pub method: LambdaMethod,
}

/// Output of one estimator call.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimationResult {
    /// Estimated state: offset, velocity, height correction, thermal coefficient
    pub x_hat: Vector4<f64>,
    /// Covariance of the estimated state
    pub q_xhat: Matrix4<f64>,
    /// Phase time series reconstructed from the estimated state
    pub y_hat: DVector<f64>,
    /// Initial unwrapped phase time series
    pub phs_unw_init: DVector<f64>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimationError {
    #[error("normal matrix is singular")]
    SingularNormalMatrix,

    #[error("non-finite value in the arc observations")]
    NonFiniteInput,

    #[error("method {0} is not handled by this estimator")]
    UnsupportedMethod(LambdaMethod),

    #[error("{0}")]
    Other(String),
}

/// An integer-ambiguity / parameter estimator for a single arc.
pub trait AmbiguityEstimator: Send + Sync {
    fn estimate(&self, request: &EstimationRequest<'_>) -> Result<EstimationResult, EstimationError>;
}

impl<F> AmbiguityEstimator for F
where
    F: Fn(&EstimationRequest<'_>) -> Result<EstimationResult, EstimationError> + Send + Sync,
{
    fn estimate(&self, request: &EstimationRequest<'_>) -> Result<EstimationResult, EstimationError> {
        self(request)
    }
}

#[cfg(test)]
mod estimator_test {
    use super::*;

    #[test]
    fn test_method_codes() {
        for code in 1..=5 {
            let method = LambdaMethod::try_from(code).unwrap();
            assert_eq!(method.code() as i64, code);
        }
        assert_eq!(
            LambdaMethod::try_from(6).unwrap_err(),
            ArcfitError::InvalidLambdaMethod(6)
        );
        assert_eq!(
            LambdaMethod::try_from(0).unwrap_err(),
            ArcfitError::InvalidLambdaMethod(0)
        );
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("3".parse::<LambdaMethod>().unwrap(), LambdaMethod::IntegerBootstrapping);
        assert!("three".parse::<LambdaMethod>().is_err());
    }

    #[test]
    fn test_default_priors() {
        let priors = NoisePriors::default();
        assert_eq!(priors.as_vector(), Vector4::new(0.001, 0.0001, 5.0, 0.00005));
    }
}
