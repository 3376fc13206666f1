use std::collections::BTreeMap;
use std::fs::File;

use arrow_array::{Array, Float64Array, RecordBatch, UInt32Array};
use camino::Utf8Path;
use itertools::Itertools;
use nalgebra::{Complex, DMatrix, DVector};
use parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ProjectionMask};
use tracing::info;

use crate::{
    arcfit_errors::ArcfitError,
    constants::PointId,
    store::{PointRecord, Store},
};

pub const COL_SPACE: &str = "space";
pub const COL_TIME: &str = "time";
pub const COL_SD_RE: &str = "sd_re";
pub const COL_SD_IM: &str = "sd_im";
pub const COL_NMAD_INC: &str = "nmad_inc";
pub const COL_H2PH: &str = "h2ph";
pub const COL_YEARS: &str = "years";
pub const COL_TEMPERATURE: &str = "temperature";
pub const COL_NMAD_INIT: &str = "nmad_init";
pub const COL_Y_HAT: &str = "y_hat";
pub const COL_PHS_UNW_INIT: &str = "phs_unw_init";

/// Per-epoch f64 columns of an input store, in the order they are gathered.
pub const STORE_COLUMNS: [&str; 7] = [
    COL_SD_RE,
    COL_SD_IM,
    COL_NMAD_INC,
    COL_H2PH,
    COL_YEARS,
    COL_TEMPERATURE,
    COL_NMAD_INIT,
];

const DEFAULT_BATCH_SIZE: usize = 2048;

/// Long-format columns gathered into `N × T` matrices.
///
/// Rows are ordered by ascending point id, columns by ascending epoch.
#[derive(Debug, Clone)]
pub struct WideTable {
    pub ids: Vec<PointId>,
    pub epochs: Vec<u32>,
    pub fields: Vec<DMatrix<f64>>,
}

/// The two per-epoch fields attached to an augmented store.
#[derive(Debug, Clone, PartialEq)]
pub struct UnwrapFields {
    pub ids: Vec<PointId>,
    pub y_hats: DMatrix<f64>,
    pub phs_unw_init: DMatrix<f64>,
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array, ArcfitError> {
    let column = batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
        .ok_or_else(|| ArcfitError::MissingColumn(name.to_string()))?;
    if column.null_count() > 0 {
        return Err(ArcfitError::MissingColumn(format!("{name} (contains nulls)")));
    }
    Ok(column)
}

fn f64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array, ArcfitError> {
    let column = batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
        .ok_or_else(|| ArcfitError::MissingColumn(name.to_string()))?;
    if column.null_count() > 0 {
        return Err(ArcfitError::MissingColumn(format!("{name} (contains nulls)")));
    }
    Ok(column)
}

/// Read the `space`, `time` and the requested f64 columns of a long-format Parquet
/// file and pivot them to one `N × T` matrix per column.
///
/// Arguments
/// ---------
/// * `parquet`: path to the Parquet file
/// * `columns`: names of the f64 columns to gather
/// * `batch_size`: reader batch size, 2048 when `None`
///
/// Return
/// ------
/// * the pivoted table, or [`ArcfitError::MissingEpoch`] when a point lacks a row for
///   one of the epochs present in the file
/// * [`ArcfitError::DuplicateRow`] when a `(space, time)` pair appears twice
pub fn read_wide_table(
    parquet: &Utf8Path,
    columns: &[&str],
    batch_size: Option<usize>,
) -> Result<WideTable, ArcfitError> {
    let file = File::open(parquet)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let schema_descr = builder.metadata().file_metadata().schema_descr_ptr();
    let all_fields = schema_descr.columns();

    let projection_indices = [COL_SPACE, COL_TIME]
        .iter()
        .chain(columns.iter())
        .map(|name| {
            all_fields
                .iter()
                .position(|f| f.name() == *name)
                .ok_or_else(|| ArcfitError::MissingColumn(name.to_string()))
        })
        .collect::<Result<Vec<usize>, ArcfitError>>()?;

    let mask = ProjectionMask::leaves(&schema_descr, projection_indices);

    let reader = builder
        .with_projection(mask)
        .with_batch_size(batch_size.unwrap_or(DEFAULT_BATCH_SIZE))
        .build()?;

    let mut rows: BTreeMap<(PointId, u32), Vec<f64>> = BTreeMap::new();

    for maybe_batch in reader {
        let batch = maybe_batch?;

        let space = u32_column(&batch, COL_SPACE)?;
        let time = u32_column(&batch, COL_TIME)?;
        let values = columns
            .iter()
            .map(|name| f64_column(&batch, name))
            .collect::<Result<Vec<_>, ArcfitError>>()?;

        for row in 0..batch.num_rows() {
            let (id, epoch) = (space.value(row), time.value(row));
            let previous = rows.insert((id, epoch), values.iter().map(|v| v.value(row)).collect());
            if previous.is_some() {
                return Err(ArcfitError::DuplicateRow { id, epoch });
            }
        }
    }

    // keys are sorted by (id, epoch)
    let ids: Vec<PointId> = rows.keys().map(|(id, _)| *id).dedup().collect();
    let epochs: Vec<u32> = rows
        .keys()
        .map(|(_, epoch)| *epoch)
        .sorted_unstable()
        .dedup()
        .collect();

    let mut fields = vec![DMatrix::zeros(ids.len(), epochs.len()); columns.len()];
    for (i, id) in ids.iter().enumerate() {
        for (t, epoch) in epochs.iter().enumerate() {
            let values = rows.get(&(*id, *epoch)).ok_or(ArcfitError::MissingEpoch {
                id: *id,
                epoch: *epoch,
            })?;
            for (field, value) in fields.iter_mut().zip(values) {
                field[(i, t)] = *value;
            }
        }
    }

    Ok(WideTable {
        ids,
        epochs,
        fields,
    })
}

/// Load a [`Store`] from a long-format Parquet file.
///
/// The file must contain the columns `space` and `time` (u32) and
/// `sd_re`, `sd_im`, `nmad_inc`, `h2ph`, `years`, `temperature`, `nmad_init` (f64).
/// Store positions follow ascending `space` ids and epochs ascending `time`.
/// `nmad_init` is constant per point; the value of the first epoch is used.
pub fn read_store(parquet: &Utf8Path, batch_size: Option<usize>) -> Result<Store, ArcfitError> {
    let table = read_wide_table(parquet, &STORE_COLUMNS, batch_size)?;

    let [sd_re, sd_im, nmad_inc, h2ph, years, temperature, nmad_init] = &table.fields[..] else {
        return Err(ArcfitError::MissingColumn("store columns".into()));
    };

    let row = |m: &DMatrix<f64>, i: usize| DVector::from_iterator(m.ncols(), m.row(i).iter().copied());

    let points = table
        .ids
        .iter()
        .enumerate()
        .map(|(i, id)| PointRecord {
            id: *id,
            sd_complex: DVector::from_iterator(
                sd_re.ncols(),
                sd_re
                    .row(i)
                    .iter()
                    .zip(sd_im.row(i).iter())
                    .map(|(re, im)| Complex::new(*re, *im)),
            ),
            nmad_inc: row(nmad_inc, i),
            nmad_init: nmad_init[(i, 0)],
            h2ph: row(h2ph, i),
            years: row(years, i),
            temperature: row(temperature, i),
        })
        .collect();

    let store = Store::from_parts(points, table.epochs)?;
    info!(path = %parquet, points = store.len(), epochs = store.n_epochs(), "store loaded");
    Ok(store)
}

/// Reload the `y_hat` and `phs_unw_init` fields of an augmented store.
pub fn read_unwrap_fields(parquet: &Utf8Path) -> Result<UnwrapFields, ArcfitError> {
    let mut table = read_wide_table(parquet, &[COL_Y_HAT, COL_PHS_UNW_INIT], None)?;
    let phs_unw_init = table.fields.pop().ok_or_else(|| ArcfitError::MissingColumn(COL_PHS_UNW_INIT.into()))?;
    let y_hats = table.fields.pop().ok_or_else(|| ArcfitError::MissingColumn(COL_Y_HAT.into()))?;
    Ok(UnwrapFields {
        ids: table.ids,
        y_hats,
        phs_unw_init,
    })
}
