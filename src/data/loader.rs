use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, ArrayRef, Float32Array, Float64Array, Float64Builder, Int32Array, Int64Array,
    LargeListArray, LargeStringArray, ListArray, ListBuilder, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::{Dataset, Label, SampleRecord, Spectrum};

/// Header of the trailing label column in exported tables.
pub const LABEL_COLUMN: &str = "label";

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load an exported dataset table.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – `0,1,…,W-1,label` numeric table
/// * `.parquet` – `spectrum` list column, `label`, optional `source`
pub fn load_file(path: &Path) -> Result<Dataset> {
    match extension(path).as_str() {
        "parquet" | "pq" => load_parquet(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported dataset extension: .{other}"),
    }
}

/// Write the dataset to `path`, format chosen by extension as in [`load_file`].
pub fn save_file(dataset: &Dataset, path: &Path) -> Result<()> {
    let written = match extension(path).as_str() {
        "parquet" | "pq" => save_parquet(dataset, path),
        "csv" => save_csv(dataset, path),
        other => bail!("Unsupported dataset extension: .{other}"),
    };
    written.with_context(|| format!("writing dataset to {}", path.display()))?;
    log::info!(
        "Wrote {} × {} dataset to {}",
        dataset.len(),
        dataset.n_columns(),
        path.display()
    );
    Ok(())
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// CSV layout: header `0,1,…,W-1,label`, then one row per sample.  The
/// label column must come last and hold `0` or `1`.
fn load_csv(path: &Path) -> Result<Dataset> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers = reader.headers().context("reading CSV headers")?.clone();

    match headers.iter().last() {
        Some(LABEL_COLUMN) => {}
        _ => bail!("CSV must end with a '{LABEL_COLUMN}' column"),
    }
    let width = headers.len() - 1;

    let mut records = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        if record.len() != width + 1 {
            bail!(
                "CSV row {row_no}: expected {} fields, found {}",
                width + 1,
                record.len()
            );
        }

        let values = record
            .iter()
            .take(width)
            .enumerate()
            .map(|(j, tok)| {
                tok.trim()
                    .parse::<f64>()
                    .with_context(|| format!("Row {row_no}, bin {j}: '{tok}' is not a number"))
            })
            .collect::<Result<Vec<_>>>()?;
        let label = parse_label(record.get(width).unwrap_or(""), row_no)?;

        records.push(SampleRecord {
            spectrum: Spectrum::new(values),
            label,
        });
    }

    Ok(Dataset::from_records(records)?)
}

fn parse_label(tok: &str, row: usize) -> Result<Label> {
    let value: f64 = tok
        .trim()
        .parse()
        .with_context(|| format!("Row {row}: label '{tok}' is not a number"))?;
    if value.fract() != 0.0 {
        bail!("Row {row}: label {value} is not 0 or 1");
    }
    Label::from_index(value as i64).with_context(|| format!("Row {row}: label {value} is not 0 or 1"))
}

fn save_csv(dataset: &Dataset, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;

    let mut header: Vec<String> = (0..dataset.width()).map(|j| j.to_string()).collect();
    header.push(LABEL_COLUMN.to_string());
    writer.write_record(&header)?;

    for record in dataset.records() {
        let mut row: Vec<String> = record
            .spectrum
            .values
            .iter()
            .map(|v| v.to_string())
            .collect();
        row.push(record.label.to_string());
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

fn dataset_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(
            "spectrum",
            DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
            false,
        ),
        Field::new(LABEL_COLUMN, DataType::Int64, false),
        Field::new("source", DataType::Utf8, true),
    ]))
}

fn save_parquet(dataset: &Dataset, path: &Path) -> Result<()> {
    let mut spectrum_builder = ListBuilder::new(Float64Builder::new());
    for record in dataset.records() {
        let values = spectrum_builder.values();
        for &v in &record.spectrum.values {
            values.append_value(v);
        }
        spectrum_builder.append(true);
    }

    let labels = Int64Array::from(
        dataset
            .records()
            .iter()
            .map(|r| r.label.index() as i64)
            .collect::<Vec<_>>(),
    );
    let sources = StringArray::from(
        dataset
            .records()
            .iter()
            .map(|r| r.spectrum.source.as_deref())
            .collect::<Vec<_>>(),
    );

    let schema = dataset_schema();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(spectrum_builder.finish()),
            Arc::new(labels),
            Arc::new(sources),
        ],
    )
    .context("building record batch")?;

    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

/// Expected schema:
/// - `spectrum`: List<Float64> or LargeList<Float64/Float32>
/// - `label`: Int64 or Int32 holding 0 / 1
/// - `source`: optional Utf8 file name
fn load_parquet(path: &Path) -> Result<Dataset> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut records = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let spectrum_idx = schema
            .index_of("spectrum")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'spectrum' column"))?;
        let label_idx = schema
            .index_of(LABEL_COLUMN)
            .map_err(|_| anyhow::anyhow!("Parquet file missing '{LABEL_COLUMN}' column"))?;
        let source_col = schema.index_of("source").ok().map(|i| batch.column(i));

        let spectrum_col = batch.column(spectrum_idx);
        let label_col = batch.column(label_idx);

        for row in 0..batch.num_rows() {
            let row_no = records.len();
            let values = extract_f64_list(spectrum_col, row)
                .with_context(|| format!("Row {row_no}: failed to read 'spectrum'"))?;
            let raw_label = extract_i64(label_col, row)
                .with_context(|| format!("Row {row_no}: failed to read '{LABEL_COLUMN}'"))?;
            let label = Label::from_index(raw_label)
                .with_context(|| format!("Row {row_no}: label {raw_label} is not 0 or 1"))?;

            let mut spectrum = Spectrum::new(values);
            if let Some(name) = source_col.and_then(|c| extract_string(c, row)) {
                spectrum = spectrum.with_source(name);
            }
            records.push(SampleRecord { spectrum, label });
        }
    }

    Ok(Dataset::from_records(records)?)
}

// -- Parquet / Arrow helpers --

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &ArrayRef, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => col
            .as_any()
            .downcast_ref::<ListArray>()
            .context("expected ListArray")?
            .value(row),
        DataType::LargeList(_) => col
            .as_any()
            .downcast_ref::<LargeListArray>()
            .context("expected LargeListArray")?
            .value(row),
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        f64_arr
            .iter()
            .enumerate()
            .map(|(bin, v)| v.with_context(|| format!("null value in bin {bin}")))
            .collect()
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        f32_arr
            .iter()
            .enumerate()
            .map(|(bin, v)| {
                v.map(f64::from)
                    .with_context(|| format!("null value in bin {bin}"))
            })
            .collect()
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

fn extract_i64(col: &ArrayRef, row: usize) -> Result<i64> {
    if col.is_null(row) {
        bail!("null label");
    }
    if let Some(arr) = col.as_any().downcast_ref::<Int64Array>() {
        Ok(arr.value(row))
    } else if let Some(arr) = col.as_any().downcast_ref::<Int32Array>() {
        Ok(i64::from(arr.value(row)))
    } else {
        bail!("Expected Int64 or Int32 label column, got {:?}", col.data_type())
    }
}

fn extract_string(col: &ArrayRef, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    if let Some(arr) = col.as_any().downcast_ref::<StringArray>() {
        Some(arr.value(row).to_string())
    } else {
        col.as_any()
            .downcast_ref::<LargeStringArray>()
            .map(|arr| arr.value(row).to_string())
    }
}
