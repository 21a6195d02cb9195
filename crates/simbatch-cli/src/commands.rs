pub mod plan;
pub mod run;

use crate::config::{SourceFormat, SourceSpec};
use simbatch::core::io::sources::{CsvFile, RatesFile, WorkItemSource};

fn open_source(spec: &SourceSpec) -> Box<dyn WorkItemSource> {
    match spec.format {
        SourceFormat::Rates => Box::new(RatesFile::new(&spec.path, spec.mode)),
        SourceFormat::Csv => Box::new(CsvFile::new(&spec.path, spec.mode)),
    }
}
