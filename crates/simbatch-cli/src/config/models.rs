use crate::invoker::CommandSpec;
use simbatch::core::io::sources::ParseMode;
use simbatch::engine::config::BatchConfig;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Rates,
    Csv,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    pub path: PathBuf,
    pub format: SourceFormat,
    pub mode: ParseMode,
}

pub struct AppConfig {
    pub source: SourceSpec,
    pub batch: BatchConfig,
    /// Absent when neither the file nor the command line names a program.
    pub command: Option<CommandSpec>,
}
