use crate::core::models::work_item::WorkItemId;
use crate::core::naming::{NamingScheme, NamingTemplate, TemplateError};
use crate::core::selection::{SortOrder, ValueFilter};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Worker count must be at least 1 (got {0})")]
    InvalidWorkerCount(usize),

    #[error("Duplicate work item id: {0}")]
    DuplicateId(WorkItemId),

    #[error("Runs {first} and {second} both map to '{path}'", path = path.display())]
    PathCollision {
        path: PathBuf,
        first: WorkItemId,
        second: WorkItemId,
    },

    #[error("Invalid naming template: {0}")]
    Template(#[from] TemplateError),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SelectionConfig {
    pub filter: ValueFilter,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionConfig {
    pub worker_count: usize,
    /// Execute only the first planned run; the rest stay pending.
    pub test_run: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub naming: NamingScheme,
    pub selection: SelectionConfig,
    pub execution: ExecutionConfig,
    pub manifest_path: PathBuf,
    pub report_path: Option<PathBuf>,
}

#[derive(Default)]
pub struct BatchConfigBuilder {
    label: Option<String>,
    output_template: Option<String>,
    log_template: Option<String>,
    directory: Option<PathBuf>,
    filter: Option<ValueFilter>,
    order: Option<SortOrder>,
    worker_count: Option<usize>,
    test_run: Option<bool>,
    manifest_path: Option<PathBuf>,
    report_path: Option<PathBuf>,
}

impl BatchConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
    pub fn output_template(mut self, template: impl Into<String>) -> Self {
        self.output_template = Some(template.into());
        self
    }
    pub fn log_template(mut self, template: impl Into<String>) -> Self {
        self.log_template = Some(template.into());
        self
    }
    pub fn directory(mut self, directory: Option<PathBuf>) -> Self {
        self.directory = directory;
        self
    }
    pub fn filter(mut self, filter: ValueFilter) -> Self {
        self.filter = Some(filter);
        self
    }
    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }
    pub fn worker_count(mut self, workers: usize) -> Self {
        self.worker_count = Some(workers);
        self
    }
    pub fn test_run(mut self, enabled: bool) -> Self {
        self.test_run = Some(enabled);
        self
    }
    pub fn manifest_path(mut self, path: PathBuf) -> Self {
        self.manifest_path = Some(path);
        self
    }
    pub fn report_path(mut self, path: Option<PathBuf>) -> Self {
        self.report_path = path;
        self
    }

    pub fn build(self) -> Result<BatchConfig, ConfigError> {
        let output = self
            .output_template
            .ok_or(ConfigError::MissingParameter("output_template"))?;
        let log = self
            .log_template
            .ok_or(ConfigError::MissingParameter("log_template"))?;

        let naming = NamingScheme {
            output: NamingTemplate::parse(&output)?,
            log: NamingTemplate::parse(&log)?,
            label: self.label.unwrap_or_default(),
            directory: self.directory,
        };

        let worker_count = self
            .worker_count
            .ok_or(ConfigError::MissingParameter("worker_count"))?;
        if worker_count == 0 {
            return Err(ConfigError::InvalidWorkerCount(worker_count));
        }

        Ok(BatchConfig {
            naming,
            selection: SelectionConfig {
                filter: self.filter.unwrap_or_default(),
                order: self.order.unwrap_or_default(),
            },
            execution: ExecutionConfig {
                worker_count,
                test_run: self.test_run.unwrap_or(false),
            },
            manifest_path: self
                .manifest_path
                .ok_or(ConfigError::MissingParameter("manifest_path"))?,
            report_path: self.report_path,
        })
    }
}
