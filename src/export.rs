use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::dataset::Dataset;
use crate::error::Result;

/// Write `dataset` as CSV with a header row:
/// `station_id,timestamp,measurement_type,value,quality_flag`.
pub fn write_csv<W: Write>(dataset: &Dataset, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in dataset {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_csv_file(dataset: &Dataset, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    write_csv(dataset, file)?;
    info!(path = %path.display(), records = dataset.len(), "wrote csv");
    Ok(())
}

/// Write `dataset` as a JSON array of records using the CSV column names as keys.
pub fn write_json<W: Write>(dataset: &Dataset, writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, dataset.records())?;
    Ok(())
}
