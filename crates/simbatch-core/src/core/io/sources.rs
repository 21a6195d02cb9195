use crate::core::models::work_item::{WorkItem, WorkItemId};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Cannot open work item source '{path}': {source}", path = path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("I/O error while reading work items: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse {
        line: usize,
        kind: SourceParseErrorKind,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Required column '{0}' is missing from the CSV header")]
    MissingColumn(&'static str),
    #[error("Exposure must be finite and positive (got {0})")]
    InvalidExposure(f64),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SourceParseErrorKind {
    #[error("Line has an identifier but no value column")]
    MissingValue,
    #[error("Invalid numeric value '{0}'")]
    InvalidValue(String),
    #[error("Value '{0}' is not finite")]
    NonFiniteValue(String),
    #[error("Invalid metadata token '{0}' (expected key=value)")]
    InvalidMetadata(String),
    #[error("Empty identifier")]
    EmptyId,
}

/// How the value column of a source is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ParseMode {
    /// The value is used as-is.
    #[default]
    Count,
    /// The value is a rate; the stored value is `round(rate * exposure)`.
    Rate { exposure: f64 },
}

impl ParseMode {
    fn validate(&self) -> Result<(), SourceError> {
        match *self {
            ParseMode::Rate { exposure } if !(exposure.is_finite() && exposure > 0.0) => {
                Err(SourceError::InvalidExposure(exposure))
            }
            _ => Ok(()),
        }
    }

    pub fn apply(&self, raw: f64) -> f64 {
        match *self {
            ParseMode::Count => raw,
            ParseMode::Rate { exposure } => (raw * exposure).round(),
        }
    }
}

/// Anything that can produce the work list of a batch.
pub trait WorkItemSource {
    fn load(&self) -> Result<Vec<WorkItem>, SourceError>;
}

impl WorkItemSource for Vec<WorkItem> {
    fn load(&self) -> Result<Vec<WorkItem>, SourceError> {
        Ok(self.clone())
    }
}

impl WorkItemSource for [WorkItem] {
    fn load(&self) -> Result<Vec<WorkItem>, SourceError> {
        Ok(self.to_vec())
    }
}

fn parse_value(token: &str, line: usize, mode: ParseMode) -> Result<f64, SourceError> {
    let raw: f64 = token.parse().map_err(|_| SourceError::Parse {
        line,
        kind: SourceParseErrorKind::InvalidValue(token.to_string()),
    })?;
    if !raw.is_finite() {
        return Err(SourceError::Parse {
            line,
            kind: SourceParseErrorKind::NonFiniteValue(token.to_string()),
        });
    }
    Ok(mode.apply(raw))
}

fn open(path: &Path) -> Result<File, SourceError> {
    File::open(path).map_err(|source| SourceError::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Whitespace-separated rates table.
///
/// ```text
/// # id            rate          metadata...
/// 481090000000    1.5e-4        isotope=Cd-109 z=48 a=109
/// 270600000000    2.0e-5        isotope=Co-60
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RatesFile {
    pub path: PathBuf,
    pub mode: ParseMode,
}

impl RatesFile {
    pub fn new(path: impl Into<PathBuf>, mode: ParseMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    pub fn read_from(
        reader: &mut impl BufRead,
        mode: ParseMode,
    ) -> Result<Vec<WorkItem>, SourceError> {
        mode.validate()?;
        let mut items = Vec::new();

        for (index, line_res) in reader.lines().enumerate() {
            let line_num = index + 1;
            let line = line_res?;
            let content = match line.split_once('#') {
                Some((before, _)) => before,
                None => line.as_str(),
            };
            let mut tokens = content.split_whitespace();
            let Some(id_token) = tokens.next() else {
                continue;
            };
            let value_token = tokens.next().ok_or(SourceError::Parse {
                line: line_num,
                kind: SourceParseErrorKind::MissingValue,
            })?;
            let value = parse_value(value_token, line_num, mode)?;

            let mut metadata = BTreeMap::new();
            for token in tokens {
                match token.split_once('=') {
                    Some((key, val)) if !key.is_empty() => {
                        metadata.insert(key.to_string(), val.to_string());
                    }
                    _ => {
                        return Err(SourceError::Parse {
                            line: line_num,
                            kind: SourceParseErrorKind::InvalidMetadata(token.to_string()),
                        });
                    }
                }
            }

            items.push(WorkItem {
                id: WorkItemId::from(id_token),
                value,
                metadata,
            });
        }

        Ok(items)
    }
}

impl WorkItemSource for RatesFile {
    fn load(&self) -> Result<Vec<WorkItem>, SourceError> {
        debug!(path = %self.path.display(), mode = ?self.mode, "Reading rates file.");
        let mut reader = BufReader::new(open(&self.path)?);
        Self::read_from(&mut reader, self.mode)
    }
}

/// CSV table with a header row. Columns `id` and `value` are required; every
/// other column is carried as metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvFile {
    pub path: PathBuf,
    pub mode: ParseMode,
}

impl CsvFile {
    pub fn new(path: impl Into<PathBuf>, mode: ParseMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    pub fn read_from(reader: impl Read, mode: ParseMode) -> Result<Vec<WorkItem>, SourceError> {
        mode.validate()?;
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let id_col = headers
            .iter()
            .position(|h| h == "id")
            .ok_or(SourceError::MissingColumn("id"))?;
        let value_col = headers
            .iter()
            .position(|h| h == "value")
            .ok_or(SourceError::MissingColumn("value"))?;

        let mut items = Vec::new();
        for (index, record_res) in csv_reader.records().enumerate() {
            let record = record_res?;
            let line_num = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(index + 2);

            let id_token = record.get(id_col).unwrap_or("");
            if id_token.is_empty() {
                return Err(SourceError::Parse {
                    line: line_num,
                    kind: SourceParseErrorKind::EmptyId,
                });
            }
            let value_token = record.get(value_col).unwrap_or("");
            if value_token.is_empty() {
                return Err(SourceError::Parse {
                    line: line_num,
                    kind: SourceParseErrorKind::MissingValue,
                });
            }
            let value = parse_value(value_token, line_num, mode)?;

            let metadata = headers
                .iter()
                .zip(record.iter())
                .enumerate()
                .filter(|(col, _)| *col != id_col && *col != value_col)
                .map(|(_, (key, val))| (key.to_string(), val.to_string()))
                .collect();

            items.push(WorkItem {
                id: WorkItemId::from(id_token),
                value,
                metadata,
            });
        }
        Ok(items)
    }
}

impl WorkItemSource for CsvFile {
    fn load(&self) -> Result<Vec<WorkItem>, SourceError> {
        debug!(path = %self.path.display(), mode = ?self.mode, "Reading CSV work list.");
        Self::read_from(open(&self.path)?, self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const RATES: &str = "\
# id            rate      metadata
481090000000    1.5e-4    isotope=Cd-109 z=48 a=109

270600000000    2.0e-5    # trailing comment
    7           0.25
";

    #[test]
    fn rates_file_reads_ids_values_and_metadata_in_count_mode() {
        let items = RatesFile::read_from(&mut Cursor::new(RATES), ParseMode::Count).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].id, WorkItemId::Numeric(481090000000));
        assert_eq!(items[0].value, 1.5e-4);
        assert_eq!(items[0].meta("isotope"), Some("Cd-109"));
        assert_eq!(items[0].meta("z"), Some("48"));
        assert!(items[1].metadata.is_empty());
        assert_eq!(items[2].id, WorkItemId::Numeric(7));
    }

    #[test]
    fn rate_mode_multiplies_by_exposure_and_rounds() {
        let mode = ParseMode::Rate { exposure: 1.0e6 };
        let items = RatesFile::read_from(&mut Cursor::new(RATES), mode).unwrap();
        assert_eq!(items[0].value, 150.0);
        assert_eq!(items[1].value, 20.0);
        assert_eq!(items[2].value, 250000.0);
    }

    #[test]
    fn rate_mode_rejects_non_positive_exposure() {
        let mode = ParseMode::Rate { exposure: 0.0 };
        let err = RatesFile::read_from(&mut Cursor::new(RATES), mode).unwrap_err();
        assert!(matches!(err, SourceError::InvalidExposure(e) if e == 0.0));
    }

    #[test]
    fn rates_file_reports_line_of_malformed_value() {
        let text = "1 10\n2 ten\n";
        let err = RatesFile::read_from(&mut Cursor::new(text), ParseMode::Count).unwrap_err();
        match err {
            SourceError::Parse { line, kind } => {
                assert_eq!(line, 2);
                assert_eq!(kind, SourceParseErrorKind::InvalidValue("ten".into()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rates_file_rejects_missing_value_and_bad_metadata() {
        let err = RatesFile::read_from(&mut Cursor::new("5\n"), ParseMode::Count).unwrap_err();
        assert!(matches!(
            err,
            SourceError::Parse { line: 1, kind: SourceParseErrorKind::MissingValue }
        ));

        let err =
            RatesFile::read_from(&mut Cursor::new("5 1.0 oops\n"), ParseMode::Count).unwrap_err();
        assert!(matches!(
            err,
            SourceError::Parse { kind: SourceParseErrorKind::InvalidMetadata(_), .. }
        ));
    }

    #[test]
    fn rates_file_rejects_non_finite_values() {
        let err = RatesFile::read_from(&mut Cursor::new("5 inf\n"), ParseMode::Count).unwrap_err();
        assert!(matches!(
            err,
            SourceError::Parse { kind: SourceParseErrorKind::NonFiniteValue(_), .. }
        ));
    }

    #[test]
    fn missing_file_surfaces_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = RatesFile::new(dir.path().join("absent.dat"), ParseMode::Count);
        assert!(matches!(source.load(), Err(SourceError::Open { .. })));
    }

    #[test]
    fn csv_file_maps_extra_columns_to_metadata() {
        let text = "id,value,isotope,energy\n1001,12.5,Cd-109,0.0\nCo-60,3,Co-60,58.6\n";
        let items = CsvFile::read_from(text.as_bytes(), ParseMode::Count).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, WorkItemId::Numeric(1001));
        assert_eq!(items[0].value, 12.5);
        assert_eq!(items[0].meta("isotope"), Some("Cd-109"));
        assert_eq!(items[1].id, WorkItemId::Named("Co-60".into()));
        assert_eq!(items[1].meta("energy"), Some("58.6"));
        assert_eq!(items[1].metadata.len(), 2);
    }

    #[test]
    fn csv_file_requires_id_and_value_columns() {
        let err = CsvFile::read_from("id,rate\n1,2\n".as_bytes(), ParseMode::Count).unwrap_err();
        assert!(matches!(err, SourceError::MissingColumn("value")));
    }

    #[test]
    fn csv_file_load_from_path_applies_rate_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rates.csv");
        std::fs::write(&path, "id,value\n1,0.5\n2,0.004\n").unwrap();

        let items = CsvFile::new(&path, ParseMode::Rate { exposure: 1000.0 })
            .load()
            .unwrap();
        assert_eq!(items[0].value, 500.0);
        assert_eq!(items[1].value, 4.0);
    }

    #[test]
    fn in_memory_vec_is_a_source() {
        let items = vec![WorkItem::new(1u64, 2.0)];
        assert_eq!(items.load().unwrap(), items);
    }
}
