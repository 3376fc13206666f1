#![allow(dead_code)]

use std::f64::consts::PI;

use approx::assert_relative_eq;
use arcfit::{
    estimator::{EstimationError, EstimationRequest, EstimationResult},
    PointRecord, ResultSet, Store,
};
use nalgebra::{Complex, DVector, Matrix4, Vector4};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Random store of `n_points` points with `n_epochs` epochs, reproducible from `seed`.
pub fn synthetic_store(n_points: usize, n_epochs: usize, seed: u64) -> Store {
    let mut rng = StdRng::seed_from_u64(seed);
    let years = DVector::from_fn(n_epochs, |t, _| t as f64 * 6.0 / 365.25);
    let temperature = DVector::from_fn(n_epochs, |t, _| 12.0 + 8.0 * (t as f64 * 0.4).sin());

    let points = (0..n_points)
        .map(|i| PointRecord {
            id: 1000 + i as u32,
            sd_complex: DVector::from_fn(n_epochs, |_, _| {
                Complex::from_polar(rng.random_range(0.5..1.5), rng.random_range(-PI..PI))
            }),
            nmad_inc: DVector::from_fn(n_epochs, |_, _| rng.random_range(0.02..0.3)),
            nmad_init: rng.random_range(0.05..0.5),
            h2ph: DVector::from_fn(n_epochs, |_, _| rng.random_range(-2.0e-3..2.0e-3)),
            years: years.clone(),
            temperature: temperature.clone(),
        })
        .collect();
    Store::new(points).unwrap()
}

/// Deterministic stand-in for a LAMBDA estimator: every output is a closed-form
/// function of the arc.
pub fn mock_estimator(request: &EstimationRequest<'_>) -> Result<EstimationResult, EstimationError> {
    let arc = request.arc;
    let mean = |v: &DVector<f64>| v.iter().sum::<f64>() / v.len() as f64;
    Ok(EstimationResult {
        x_hat: Vector4::new(
            mean(&arc.phs_wrapped),
            mean(&arc.sigma_phs_apri),
            mean(&arc.h2ph_arc),
            request.priors.sigma_vel * request.wavelength,
        ),
        q_xhat: Matrix4::from_fn(|i, j| {
            arc.sigma_phs_apri[(i + j) % arc.n_epochs()] * (1.0 + i as f64 - j as f64)
        }),
        y_hat: arc.phs_wrapped.clone(),
        phs_unw_init: arc.phs_wrapped.zip_map(&arc.temp, |p, t| p + 1.0e-3 * t),
    })
}

/// [`mock_estimator`] failing on arcs whose mean wrapped phase is positive.
pub fn picky_estimator(request: &EstimationRequest<'_>) -> Result<EstimationResult, EstimationError> {
    let phase = request.arc.phs_wrapped.iter().sum::<f64>();
    if phase > 0.0 {
        return Err(EstimationError::Other(format!("rejected arc (phase sum {phase:.3})")));
    }
    mock_estimator(request)
}

pub fn assert_results_close(actual: &ResultSet, expected: &ResultSet, epsilon: f64) {
    assert_eq!(actual.status(), expected.status());
    assert_relative_eq!(actual.x_hat(), expected.x_hat(), epsilon = epsilon);
    assert_relative_eq!(actual.y_hats(), expected.y_hats(), epsilon = epsilon);
    assert_relative_eq!(actual.phs_unw_init(), expected.phs_unw_init(), epsilon = epsilon);
    for (a, e) in actual.q_xhat().iter().zip(expected.q_xhat()) {
        assert_relative_eq!(a, e, epsilon = epsilon);
    }
}
