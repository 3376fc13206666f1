//! # Dense state archive (`.npz`)
//!
//! The estimated states and their covariances do not share the per-epoch layout of the
//! store, so they are written to a separate NumPy archive with two arrays:
//!
//! * `x_hat` – `float64`, shape `(N, 4)`
//! * `Q_xhat` – `float64`, shape `(4, 4, N)`
//!
//! Both arrays are C-ordered, so the archive loads directly with `numpy.load`.
use std::io;

use camino::Utf8Path;
use nalgebra::{DMatrix, Matrix4};
use npyz::{
    npz::{NpzArchive, NpzWriter},
    WriterBuilder,
};
use tracing::info;

use crate::{arcfit_errors::ArcfitError, constants::N_STATE, results::ResultSet};

pub const X_HAT: &str = "x_hat";
pub const Q_XHAT: &str = "Q_xhat";

/// States and covariances read back from an archive.
#[derive(Debug, Clone, PartialEq)]
pub struct StateArchive {
    pub x_hat: DMatrix<f64>,
    pub q_xhat: Vec<Matrix4<f64>>,
}

fn write_npz(path: &Utf8Path, results: &ResultSet) -> io::Result<()> {
    let n = results.n_points() as u64;
    let mut npz = NpzWriter::create(path)?;

    let mut writer = npz
        .array(X_HAT, Default::default())?
        .default_dtype()
        .shape(&[n, N_STATE as u64])
        .begin_nd()?;
    for i in 0..results.n_points() {
        for value in results.x_hat().row(i).iter() {
            writer.push(value)?;
        }
    }
    writer.finish()?;

    let mut writer = npz
        .array(Q_XHAT, Default::default())?
        .default_dtype()
        .shape(&[N_STATE as u64, N_STATE as u64, n])
        .begin_nd()?;
    for value in results.q_xhat_tensor().iter() {
        writer.push(value)?;
    }
    writer.finish()?;

    Ok(())
}

/// Write `x_hat` and `Q_xhat` of `results` to the archive at `path`.
pub fn write_state_archive(path: &Utf8Path, results: &ResultSet) -> Result<(), ArcfitError> {
    write_npz(path, results)?;
    info!(path = %path, points = results.n_points(), "state archive written");
    Ok(())
}

fn read_array(archive: &mut NpzArchive<std::io::BufReader<std::fs::File>>, name: &str) -> Result<(Vec<u64>, Vec<f64>), ArcfitError> {
    let npy = archive
        .by_name(name)?
        .ok_or_else(|| ArcfitError::MissingColumn(name.to_string()))?;
    let shape = npy.shape().to_vec();
    let data = npy.into_vec::<f64>()?;
    Ok((shape, data))
}

/// Read an archive written by [`write_state_archive`].
pub fn read_state_archive(path: &Utf8Path) -> Result<StateArchive, ArcfitError> {
    let mut archive = NpzArchive::open(path)?;

    let (shape, data) = read_array(&mut archive, X_HAT)?;
    let n = match shape[..] {
        [n, 4] => n as usize,
        _ => {
            return Err(ArcfitError::ShapeMismatch {
                point: 0,
                field: "x_hat",
                expected: N_STATE,
                found: shape.get(1).copied().unwrap_or(0) as usize,
            })
        }
    };
    let x_hat = DMatrix::from_row_slice(n, N_STATE, &data);

    let (shape, data) = read_array(&mut archive, Q_XHAT)?;
    if shape != [N_STATE as u64, N_STATE as u64, n as u64] {
        return Err(ArcfitError::ShapeMismatch {
            point: 0,
            field: "Q_xhat",
            expected: n,
            found: shape.last().copied().unwrap_or(0) as usize,
        });
    }
    let q_xhat = (0..n)
        .map(|k| Matrix4::from_fn(|i, j| data[(i * N_STATE + j) * n + k]))
        .collect();

    Ok(StateArchive { x_hat, q_xhat })
}
