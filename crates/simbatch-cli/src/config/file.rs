use crate::error::{CliError, Result};
use serde::Deserialize;
use simbatch::core::selection::SortOrder;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub label: Option<String>,
    pub source: Option<FileSourceConfig>,
    pub selection: Option<FileSelectionConfig>,
    pub naming: Option<FileNamingConfig>,
    pub execution: Option<FileExecutionConfig>,
    pub command: Option<FileCommandConfig>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileSourceFormat {
    Rates,
    Csv,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileParseMode {
    Count,
    Rate,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSourceConfig {
    pub path: Option<PathBuf>,
    pub format: Option<FileSourceFormat>,
    pub mode: Option<FileParseMode>,
    pub exposure: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileFilterKind {
    All,
    Above,
    AtLeast,
    Below,
    AtMost,
    Between,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSelectionConfig {
    pub filter: Option<FileFilterKind>,
    pub threshold: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub order: Option<SortOrder>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileNamingConfig {
    pub output: Option<String>,
    pub log: Option<String>,
    pub directory: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileExecutionConfig {
    pub workers: Option<usize>,
    pub test_run: Option<bool>,
    pub manifest: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

/// `seed = 42` or `seed = "from-id"`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum FileSeed {
    Fixed(u64),
    Policy(String),
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileCommandConfig {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub working_dir: Option<PathBuf>,
    pub seed: Option<FileSeed>,
    pub env: Option<BTreeMap<String, String>>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}
