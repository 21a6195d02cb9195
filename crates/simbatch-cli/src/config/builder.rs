use super::defaults::DefaultsConfig;
use super::file::{
    FileCommandConfig, FileConfig, FileFilterKind, FileParseMode, FileSeed, FileSelectionConfig,
    FileSourceConfig, FileSourceFormat,
};
use super::models::{AppConfig, SourceFormat, SourceSpec};
use crate::cli::BatchArgs;
use crate::error::{CliError, Result};
use crate::invoker::{CommandSpec, SeedPolicy};
use simbatch::core::io::sources::ParseMode;
use simbatch::core::selection::{SortOrder, ValueFilter};
use simbatch::engine::config::BatchConfigBuilder;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Merges built-in defaults, the config file, `-S` overrides and command-line flags,
/// in increasing order of precedence.
///
/// `program` is the trailing `-- PROGRAM ARGS...` of `run`; when non-empty it replaces
/// the program and arguments of the `[command]` table.
pub fn build_config(args: &BatchArgs, program: &[String]) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = if let Some(config_path) = &args.config {
        FileConfig::from_file(config_path)?
    } else {
        FileConfig::default()
    };

    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let label = args
        .label
        .clone()
        .or(file_config.label.take())
        .unwrap_or(defaults.label.clone());

    let source = merge_source(args.source.as_deref(), file_config.source.take())?;

    let selection_file = file_config.selection.take().unwrap_or_default();
    let filter = match args.threshold {
        Some(threshold) => ValueFilter::Above { threshold },
        None => merge_filter(&selection_file)?,
    };
    let order = selection_file.order.unwrap_or(defaults.order);

    let naming_file = file_config.naming.take().unwrap_or_default();
    let exec_file = file_config.execution.take().unwrap_or_default();

    let workers = args
        .workers
        .or(exec_file.workers)
        .unwrap_or(defaults.workers);
    let test_run = args.test_run || exec_file.test_run.unwrap_or(false);
    let manifest = args
        .manifest
        .clone()
        .or(exec_file.manifest)
        .unwrap_or_else(|| PathBuf::from(&defaults.manifest));
    let report = args.report.clone().or(exec_file.report);

    let batch = BatchConfigBuilder::new()
        .label(label.clone())
        .output_template(naming_file.output.unwrap_or(defaults.output_template.clone()))
        .log_template(naming_file.log.unwrap_or(defaults.log_template.clone()))
        .directory(naming_file.directory)
        .filter(filter)
        .order(order)
        .worker_count(workers)
        .test_run(test_run)
        .manifest_path(manifest)
        .report_path(report)
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let command = merge_command(file_config.command.take(), program, &defaults)?;

    Ok(AppConfig {
        source,
        batch,
        command,
    })
}

fn merge_source(cli_path: Option<&Path>, file_val: Option<FileSourceConfig>) -> Result<SourceSpec> {
    let file_val = file_val.unwrap_or_default();
    let path = cli_path
        .map(Path::to_path_buf)
        .or(file_val.path)
        .ok_or_else(|| {
            CliError::Config(
                "No work-item source given; use --source or set `source.path`".to_string(),
            )
        })?;

    let format = match file_val.format {
        Some(FileSourceFormat::Rates) => SourceFormat::Rates,
        Some(FileSourceFormat::Csv) => SourceFormat::Csv,
        None => infer_format(&path),
    };

    let mode = match (file_val.mode, file_val.exposure) {
        (None | Some(FileParseMode::Count), _) => ParseMode::Count,
        (Some(FileParseMode::Rate), Some(exposure)) if exposure.is_finite() && exposure > 0.0 => {
            ParseMode::Rate { exposure }
        }
        (Some(FileParseMode::Rate), Some(exposure)) => {
            return Err(CliError::Config(format!(
                "`source.exposure` must be a positive number, got {}",
                exposure
            )));
        }
        (Some(FileParseMode::Rate), None) => {
            return Err(CliError::Config(
                "`source.mode = \"rate\"` requires `source.exposure`".to_string(),
            ));
        }
    };

    Ok(SourceSpec { path, format, mode })
}

fn infer_format(path: &Path) -> SourceFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => SourceFormat::Csv,
        _ => SourceFormat::Rates,
    }
}

fn merge_filter(file_val: &FileSelectionConfig) -> Result<ValueFilter> {
    let threshold = |kind: &str| {
        file_val.threshold.ok_or_else(|| {
            CliError::Config(format!("`selection.filter = \"{}\"` requires `threshold`", kind))
        })
    };

    let filter = match file_val.filter {
        None if file_val.threshold.is_some() => ValueFilter::Above {
            threshold: threshold("above")?,
        },
        None | Some(FileFilterKind::All) => ValueFilter::All,
        Some(FileFilterKind::Above) => ValueFilter::Above {
            threshold: threshold("above")?,
        },
        Some(FileFilterKind::AtLeast) => ValueFilter::AtLeast {
            threshold: threshold("at-least")?,
        },
        Some(FileFilterKind::Below) => ValueFilter::Below {
            threshold: threshold("below")?,
        },
        Some(FileFilterKind::AtMost) => ValueFilter::AtMost {
            threshold: threshold("at-most")?,
        },
        Some(FileFilterKind::Between) => match (file_val.min, file_val.max) {
            (Some(min), Some(max)) if min <= max => ValueFilter::Between { min, max },
            (Some(min), Some(max)) => {
                return Err(CliError::Config(format!(
                    "`selection.min` ({}) is greater than `selection.max` ({})",
                    min, max
                )));
            }
            _ => {
                return Err(CliError::Config(
                    "`selection.filter = \"between\"` requires `min` and `max`".to_string(),
                ));
            }
        },
    };
    Ok(filter)
}

fn merge_command(
    file_val: Option<FileCommandConfig>,
    program: &[String],
    defaults: &DefaultsConfig,
) -> Result<Option<CommandSpec>> {
    let file_val = file_val.unwrap_or_default();

    let (program, args) = match program.split_first() {
        Some((head, tail)) => (Some(head.clone()), tail.to_vec()),
        None => (file_val.program, file_val.args.unwrap_or_default()),
    };
    let Some(program) = program else {
        return Ok(None);
    };

    let seed = match file_val.seed {
        None => SeedPolicy::Fixed(defaults.seed),
        Some(FileSeed::Fixed(n)) => SeedPolicy::Fixed(n),
        Some(FileSeed::Policy(p)) => parse_seed(&p)?,
    };

    Ok(Some(CommandSpec {
        program,
        args,
        working_dir: file_val.working_dir,
        env: file_val.env.unwrap_or_default(),
        seed,
    }))
}

fn parse_seed(value: &str) -> Result<SeedPolicy> {
    match value.trim() {
        "from-id" => Ok(SeedPolicy::FromId),
        other => other.parse().map(SeedPolicy::Fixed).map_err(|_| {
            CliError::Config(format!(
                "Invalid seed '{}'; expected \"from-id\" or an integer",
                other
            ))
        }),
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value)))
}

fn parse_enum<'de, T: serde::Deserialize<'de>>(key: &str, value: &'de str) -> Result<T> {
    T::deserialize(serde::de::value::StrDeserializer::<serde::de::value::Error>::new(
        value.trim(),
    ))
    .map_err(|e| CliError::Config(format!("Invalid value for {}: {}", key, e)))
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let Some((key, value_str)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let key = key.trim();

        match key {
            "label" => config.label = Some(value_str.to_string()),
            "source.path" => {
                config.source.get_or_insert_with(Default::default).path =
                    Some(PathBuf::from(value_str))
            }
            "source.format" => {
                config.source.get_or_insert_with(Default::default).format =
                    Some(parse_enum(key, value_str)?)
            }
            "source.mode" => {
                config.source.get_or_insert_with(Default::default).mode =
                    Some(parse_enum(key, value_str)?)
            }
            "source.exposure" => {
                config.source.get_or_insert_with(Default::default).exposure =
                    Some(parse_value(key, value_str, "float")?)
            }
            "selection.filter" => {
                config.selection.get_or_insert_with(Default::default).filter =
                    Some(parse_enum(key, value_str)?)
            }
            "selection.threshold" => {
                config.selection.get_or_insert_with(Default::default).threshold =
                    Some(parse_value(key, value_str, "float")?)
            }
            "selection.min" => {
                config.selection.get_or_insert_with(Default::default).min =
                    Some(parse_value(key, value_str, "float")?)
            }
            "selection.max" => {
                config.selection.get_or_insert_with(Default::default).max =
                    Some(parse_value(key, value_str, "float")?)
            }
            "selection.order" => {
                let order: SortOrder = value_str
                    .parse()
                    .map_err(|e| CliError::Config(format!("Invalid value for {}: {}", key, e)))?;
                config.selection.get_or_insert_with(Default::default).order = Some(order)
            }
            "naming.output" => {
                config.naming.get_or_insert_with(Default::default).output =
                    Some(value_str.to_string())
            }
            "naming.log" => {
                config.naming.get_or_insert_with(Default::default).log =
                    Some(value_str.to_string())
            }
            "naming.directory" => {
                config.naming.get_or_insert_with(Default::default).directory =
                    Some(PathBuf::from(value_str))
            }
            "execution.workers" => {
                config.execution.get_or_insert_with(Default::default).workers =
                    Some(parse_value(key, value_str, "integer")?)
            }
            "execution.test-run" => {
                config.execution.get_or_insert_with(Default::default).test_run =
                    Some(parse_value(key, value_str, "boolean")?)
            }
            "execution.manifest" => {
                config.execution.get_or_insert_with(Default::default).manifest =
                    Some(PathBuf::from(value_str))
            }
            "execution.report" => {
                config.execution.get_or_insert_with(Default::default).report =
                    Some(PathBuf::from(value_str))
            }
            "command.program" => {
                config.command.get_or_insert_with(Default::default).program =
                    Some(value_str.to_string())
            }
            "command.working-dir" => {
                config.command.get_or_insert_with(Default::default).working_dir =
                    Some(PathBuf::from(value_str))
            }
            "command.seed" => {
                let seed = match value_str.trim().parse::<u64>() {
                    Ok(n) => FileSeed::Fixed(n),
                    Err(_) => FileSeed::Policy(value_str.to_string()),
                };
                config.command.get_or_insert_with(Default::default).seed = Some(seed)
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}
