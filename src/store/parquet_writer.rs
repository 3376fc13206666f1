use std::{fs, fs::File, sync::Arc};

use arrow_array::{ArrayRef, Float64Array, RecordBatch, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use camino::{Utf8Path, Utf8PathBuf};
use parquet::arrow::ArrowWriter;
use tracing::info;

use crate::{
    arcfit_errors::ArcfitError,
    results::ResultSet,
    store::{parquet_reader::*, Store},
};

fn store_schema(augmented: bool) -> Schema {
    let mut fields = vec![
        Field::new(COL_SPACE, DataType::UInt32, false),
        Field::new(COL_TIME, DataType::UInt32, false),
    ];
    fields.extend(
        STORE_COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Float64, false)),
    );
    if augmented {
        fields.push(Field::new(COL_Y_HAT, DataType::Float64, false));
        fields.push(Field::new(COL_PHS_UNW_INIT, DataType::Float64, false));
    }
    Schema::new(fields)
}

/// Long-format record batch of `store`, with the unwrapping fields of `results` when
/// given.
fn store_batch(store: &Store, results: Option<&ResultSet>) -> Result<RecordBatch, ArcfitError> {
    let n_epochs = store.n_epochs();
    let n_rows = store.len() * n_epochs;

    if let Some(results) = results {
        if results.n_points() != store.len() || results.n_epochs() != n_epochs {
            return Err(ArcfitError::ShapeMismatch {
                point: results.n_points(),
                field: "result set",
                expected: n_epochs,
                found: results.n_epochs(),
            });
        }
    }

    let mut space = Vec::with_capacity(n_rows);
    let mut time = Vec::with_capacity(n_rows);
    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(n_rows); STORE_COLUMNS.len()];
    let mut y_hat = Vec::with_capacity(n_rows);
    let mut phs_unw_init = Vec::with_capacity(n_rows);

    for (position, point) in store.points().iter().enumerate() {
        point.check_epochs(position, n_epochs)?;
        for (t, epoch) in store.epochs().iter().enumerate() {
            space.push(point.id);
            time.push(*epoch);
            let row = [
                point.sd_complex[t].re,
                point.sd_complex[t].im,
                point.nmad_inc[t],
                point.h2ph[t],
                point.years[t],
                point.temperature[t],
                point.nmad_init,
            ];
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
            if let Some(results) = results {
                y_hat.push(results.y_hats()[(position, t)]);
                phs_unw_init.push(results.phs_unw_init()[(position, t)]);
            }
        }
    }

    let mut arrays: Vec<ArrayRef> = vec![
        Arc::new(UInt32Array::from(space)),
        Arc::new(UInt32Array::from(time)),
    ];
    arrays.extend(
        columns
            .into_iter()
            .map(|c| Arc::new(Float64Array::from(c)) as ArrayRef),
    );
    if results.is_some() {
        arrays.push(Arc::new(Float64Array::from(y_hat)));
        arrays.push(Arc::new(Float64Array::from(phs_unw_init)));
    }

    Ok(RecordBatch::try_new(
        Arc::new(store_schema(results.is_some())),
        arrays,
    )?)
}

fn write_batch(path: &Utf8Path, batch: &RecordBatch) -> Result<(), ArcfitError> {
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// Write `store` as a long-format Parquet file readable by
/// [`read_store`](crate::store::parquet_reader::read_store).
pub fn write_store(path: &Utf8Path, store: &Store) -> Result<(), ArcfitError> {
    write_batch(path, &store_batch(store, None)?)
}

/// True when `a` and `b` resolve to the same file, or are equal paths when either
/// cannot be resolved.
pub(crate) fn same_file(a: &Utf8Path, b: &Utf8Path) -> bool {
    match (a.canonicalize_utf8(), b.canonicalize_utf8()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Write a copy of `store` augmented with the `y_hat` and `phs_unw_init` fields of
/// `results`.
///
/// Arguments
/// ---------
/// * `source`: path the store was loaded from
/// * `destination`: output path
/// * `overwrite_source`: allow `destination` to be `source`; the file is then written
///   next to the source and renamed over it
///
/// Return
/// ------
/// * [`ArcfitError::SourceOverwriteDenied`] when `destination` is the source and
///   overwriting is not allowed; any I/O or Parquet failure otherwise
pub fn write_augmented_store(
    source: &Utf8Path,
    destination: &Utf8Path,
    overwrite_source: bool,
    store: &Store,
    results: &ResultSet,
) -> Result<(), ArcfitError> {
    let batch = store_batch(store, Some(results))?;

    if same_file(source, destination) {
        if !overwrite_source {
            return Err(ArcfitError::SourceOverwriteDenied(destination.to_string()));
        }
        let staging = Utf8PathBuf::from(format!("{destination}.tmp"));
        write_batch(&staging, &batch)?;
        fs::rename(&staging, destination)?;
    } else {
        write_batch(destination, &batch)?;
    }

    info!(path = %destination, rows = batch.num_rows(), "augmented store written");
    Ok(())
}
