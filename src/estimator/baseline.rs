//! # Baseline estimator: temporal unwrapping + integer rounding
//!
//! A lightweight [`AmbiguityEstimator`] handling [`LambdaMethod::IntegerRounding`] only.
//! It is meant to make the pipeline runnable end to end and to serve as a reference
//! for the estimator contract, not to replace a full LAMBDA implementation.
//!
//! Model
//! -----------------
//! For each epoch `t` the arc phase (radians) is modelled as
//!
//! ```text
//! φ_t = -(4π/λ) · (offset + vel·years_t + dh·h2ph_t + ther·temp_t)
//! ```
//!
//! Steps
//! -----------------
//! 1. `phs_unw_init`: temporal unwrapping of the wrapped phase (a ±2π correction is
//!    accumulated whenever two consecutive epochs differ by π or more).
//! 2. Float solution: regularised weighted least squares on `phs_unw_init` with weights
//!    `1/σ_t²` and zero-mean priors `1/σ_p²` on the four parameters.
//! 3. Integer rounding: `k_t = round((φ̂_t − φ_wrapped,t) / 2π)`.
//! 4. Fixed solution: the same least squares on `φ_wrapped + 2π·k`, giving
//!    `x_hat`, `Q_xhat = (AᵀWA + P)⁻¹` and `y_hat = A·x_hat`.
use std::f64::consts::PI;

use nalgebra::{Cholesky, DMatrix, DVector, Matrix4, Vector4};

use crate::{
    arcfit_errors::ArcfitError,
    constants::DPI,
    estimator::{
        AmbiguityEstimator, EstimationError, EstimationRequest, EstimationResult, LambdaMethod,
    },
};

#[derive(Debug, Clone, Copy, Default)]
pub struct RoundingEstimator;

impl RoundingEstimator {
    /// Create the estimator, checking that it can serve `method`.
    ///
    /// Only [`LambdaMethod::IntegerRounding`] (`method = 2`) is served. The configuration
    /// default, integer bootstrapping (`method = 3`), is rejected with a message naming
    /// the setting to change.
    pub fn for_method(method: LambdaMethod) -> Result<Self, ArcfitError> {
        match method {
            LambdaMethod::IntegerRounding => Ok(RoundingEstimator),
            other => Err(ArcfitError::UnsupportedMethod(format!(
                "{other}; the built-in estimator only serves integer rounding, set `method = 2` in the configuration"
            ))),
        }
    }
}

/// Unwrap a phase series along time.
///
/// Consecutive differences of `π` or more (in absolute value) are brought back into
/// `[-π, π)` by adding a multiple of `2π`, and the correction is carried to every later
/// epoch. A jump of exactly `+π` is kept as `+π`.
pub fn temporal_unwrap(phase: &DVector<f64>) -> DVector<f64> {
    let mut unwrapped = phase.clone();
    let mut correction = 0.0;
    for t in 1..phase.len() {
        let d = phase[t] - phase[t - 1];
        let mut dd = (d + PI).rem_euclid(DPI) - PI;
        if dd == -PI && d > 0.0 {
            dd = PI;
        }
        if d.abs() >= PI {
            correction += dd - d;
        }
        unwrapped[t] = phase[t] + correction;
    }
    unwrapped
}

/// Design matrix of the phase model, one row per epoch.
fn design_matrix(request: &EstimationRequest<'_>) -> DMatrix<f64> {
    let arc = request.arc;
    let scale = -4.0 * PI / request.wavelength;
    DMatrix::from_fn(arc.n_epochs(), 4, |t, j| {
        scale
            * match j {
                0 => 1.0,
                1 => arc.years[t],
                2 => arc.h2ph_arc[t],
                _ => arc.temp[t],
            }
    })
}

struct NormalSystem {
    a: DMatrix<f64>,
    weights: DVector<f64>,
    cholesky: Cholesky<f64, nalgebra::U4>,
}

impl NormalSystem {
    fn new(request: &EstimationRequest<'_>) -> Result<Self, EstimationError> {
        let a = design_matrix(request);
        let weights = request.arc.sigma_phs_apri.map(|s| 1.0 / (s * s));
        let prior_weights: Vector4<f64> = request.priors.as_vector().map(|s| 1.0 / (s * s));

        let mut normal = Matrix4::from_diagonal(&prior_weights);
        for t in 0..a.nrows() {
            let row = a.row(t);
            for i in 0..4 {
                for j in 0..4 {
                    normal[(i, j)] += row[i] * weights[t] * row[j];
                }
            }
        }
        if normal.iter().any(|v| !v.is_finite()) {
            return Err(EstimationError::NonFiniteInput);
        }

        let cholesky = Cholesky::new(normal).ok_or(EstimationError::SingularNormalMatrix)?;
        Ok(NormalSystem {
            a,
            weights,
            cholesky,
        })
    }

    fn solve(&self, y: &DVector<f64>) -> Vector4<f64> {
        let mut rhs = Vector4::zeros();
        for t in 0..self.a.nrows() {
            for i in 0..4 {
                rhs[i] += self.a[(t, i)] * self.weights[t] * y[t];
            }
        }
        self.cholesky.solve(&rhs)
    }

    fn predict(&self, x: &Vector4<f64>) -> DVector<f64> {
        &self.a * DVector::from_column_slice(x.as_slice())
    }
}

impl AmbiguityEstimator for RoundingEstimator {
    fn estimate(&self, request: &EstimationRequest<'_>) -> Result<EstimationResult, EstimationError> {
        if request.method != LambdaMethod::IntegerRounding {
            return Err(EstimationError::UnsupportedMethod(request.method));
        }
        let arc = request.arc;
        if arc.phs_wrapped.iter().any(|v| !v.is_finite()) {
            return Err(EstimationError::NonFiniteInput);
        }

        let system = NormalSystem::new(request)?;

        let phs_unw_init = temporal_unwrap(&arc.phs_wrapped);
        let x_float = system.solve(&phs_unw_init);
        let predicted = system.predict(&x_float);

        let phs_fixed = arc.phs_wrapped.zip_map(&predicted, |wrapped, model| {
            wrapped + DPI * ((model - wrapped) / DPI).round()
        });

        let x_hat = system.solve(&phs_fixed);
        let y_hat = system.predict(&x_hat);

        Ok(EstimationResult {
            x_hat,
            q_xhat: system.cholesky.inverse(),
            y_hat,
            phs_unw_init,
        })
    }
}

#[cfg(test)]
mod baseline_test {
    use super::*;
    use crate::{arc_builder::ArcObservation, estimator::NoisePriors};
    use approx::assert_relative_eq;

    fn wrap(v: f64) -> f64 {
        let w = (v + PI).rem_euclid(DPI) - PI;
        if w <= -PI {
            PI
        } else {
            w
        }
    }

    #[test]
    fn test_temporal_unwrap() {
        let truth = DVector::from_vec(vec![0.0, 2.0, 4.0, 6.0, 8.0, 7.0, 5.0]);
        let wrapped = truth.map(wrap);
        let unwrapped = temporal_unwrap(&wrapped);
        for (u, t) in unwrapped.iter().zip(truth.iter()) {
            assert_relative_eq!(*u, *t, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_unsupported_method() {
        let err = RoundingEstimator::for_method(LambdaMethod::IntegerBootstrapping).unwrap_err();
        assert!(matches!(err, ArcfitError::UnsupportedMethod(_)));
        let message = err.to_string();
        assert!(message.contains(&LambdaMethod::IntegerBootstrapping.to_string()));
        assert!(message.contains("set `method = 2`"), "{message}");
        assert!(RoundingEstimator::for_method(LambdaMethod::IntegerRounding).is_ok());
    }

    #[test]
    fn test_recovers_linear_motion() {
        let wavelength = 0.055465763;
        let n = 40;
        let years = DVector::from_fn(n, |t, _| t as f64 * 12.0 / 365.25);
        let velocity = 0.02;
        let truth = years.map(|y| -4.0 * PI / wavelength * velocity * y);

        let arc = ArcObservation {
            phs_wrapped: truth.map(wrap),
            sigma_phs_apri: DVector::from_element(n, 0.3),
            h2ph_arc: DVector::zeros(n),
            years,
            temp: DVector::zeros(n),
        };
        let priors = NoisePriors {
            sigma_vel: 0.1,
            ..NoisePriors::default()
        };
        let request = EstimationRequest {
            wavelength,
            arc: &arc,
            priors: &priors,
            method: LambdaMethod::IntegerRounding,
        };

        let result = RoundingEstimator.estimate(&request).unwrap();
        assert_eq!(result.y_hat.len(), n);
        assert_eq!(result.phs_unw_init.len(), n);
        assert_relative_eq!(result.x_hat[1], velocity, epsilon = 1e-4);
        for (y, t) in result.y_hat.iter().zip(truth.iter()) {
            assert!((y - t).abs() < 0.5);
        }
        // covariance is symmetric with a positive diagonal
        for i in 0..4 {
            assert!(result.q_xhat[(i, i)] > 0.0);
            for j in 0..4 {
                assert_relative_eq!(result.q_xhat[(i, j)], result.q_xhat[(j, i)], epsilon = 1e-12);
            }
        }
    }
}
