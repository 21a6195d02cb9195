use crate::core::models::run::RunRecord;
use std::io::Write;
use std::path::Path;

const HEADER: [&str; 7] = ["id", "value", "status", "output", "log", "elapsed_s", "error"];

/// Writes a tab-separated outcome table, one row per record in the given order.
pub fn write_report<'a, W: Write>(
    records: impl IntoIterator<Item = &'a RunRecord>,
    writer: W,
) -> Result<(), csv::Error> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    csv_writer.write_record(HEADER)?;

    for record in records {
        let elapsed = record
            .elapsed
            .map(|d| format!("{:.3}", d.as_secs_f64()))
            .unwrap_or_default();
        let error = record
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        csv_writer.write_record([
            record.item.id.to_string(),
            record.item.value.to_string(),
            record.status.to_string(),
            record.output_path.display().to_string(),
            record.log_path.display().to_string(),
            elapsed,
            error,
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn persist_report<'a>(
    records: impl IntoIterator<Item = &'a RunRecord>,
    path: &Path,
) -> Result<(), csv::Error> {
    let file = std::fs::File::create(path)?;
    write_report(records, file)
}
