use crate::core::models::work_item::{WorkItem, WorkItemId};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const ID_WIDTH: usize = 14;
const VALUE_WIDTH: usize = 15;

/// Integral values print without a fractional part so event counts read as integers.
fn format_value(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        value.to_string()
    }
}

pub fn format_line(item: &WorkItem) -> String {
    format!(
        "{:>id_w$} {:>value_w$}",
        item.id.to_string(),
        format_value(item.value),
        id_w = ID_WIDTH,
        value_w = VALUE_WIDTH
    )
}

/// Writes one `<id:>14> <value:>15>` line per item, in iteration order.
pub fn write_manifest<'a>(
    items: impl IntoIterator<Item = &'a WorkItem>,
    writer: &mut impl Write,
) -> io::Result<()> {
    for item in items {
        writeln!(writer, "{}", format_line(item))?;
    }
    writer.flush()
}

/// Creates (or truncates) the manifest at `path` and writes the run list into it.
pub fn persist_manifest<'a>(
    items: impl IntoIterator<Item = &'a WorkItem>,
    path: &Path,
) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_manifest(items, &mut writer)
}

/// Reads a manifest back into `(id, value)` pairs.
pub fn read_manifest(path: &Path) -> io::Result<Vec<(WorkItemId, f64)>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for (index, line_res) in reader.lines().enumerate() {
        let line = line_res?;
        if line.trim().is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let (Some(id), Some(value), None) = (tokens.next(), tokens.next(), tokens.next()) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Malformed manifest line {}: '{}'", index + 1, line),
            ));
        };
        let value: f64 = value.parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid value on manifest line {}: '{}'", index + 1, value),
            )
        })?;
        entries.push((WorkItemId::from(id), value));
    }
    Ok(entries)
}
