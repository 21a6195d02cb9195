use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "The simbatch developers",
    version,
    about = "simbatch - distribute Monte-Carlo simulation runs across a bounded pool of worker processes.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Select work items, write the run manifest and execute every run in parallel.
    Run(RunArgs),
    /// Select work items and write the run manifest without executing anything.
    Plan(BatchArgs),
}

/// Options shared by every command that builds a batch.
#[derive(Args, Debug, Clone, Default)]
pub struct BatchArgs {
    /// Path to the batch configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the work-item source file.
    #[arg(long, value_name = "PATH")]
    pub source: Option<PathBuf>,

    /// Override the batch label substituted into file-name templates.
    #[arg(long, value_name = "NAME")]
    pub label: Option<String>,

    /// Number of runs to execute concurrently.
    #[arg(short = 'j', long = "workers", value_name = "NUM")]
    pub workers: Option<usize>,

    /// Keep only items whose value is strictly above this threshold.
    #[arg(short, long, value_name = "FLOAT")]
    pub threshold: Option<f64>,

    /// Execute only the first planned run.
    #[arg(long)]
    pub test_run: bool,

    /// Override the run manifest path.
    #[arg(short, long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// Write a tab-separated per-run report to this path.
    #[arg(short, long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S execution.workers=8
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub batch: BatchArgs,

    /// Simulation program and its argument templates, overriding `[command]`.
    /// Example: -- simulate --events {events} --output {output}
    #[arg(last = true, value_name = "PROGRAM ARGS")]
    pub program: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_overrides_and_trailing_program() {
        let cli = Cli::try_parse_from([
            "simbatch",
            "-vv",
            "run",
            "-c",
            "batch.toml",
            "-j",
            "8",
            "--threshold",
            "100",
            "--test-run",
            "-S",
            "label=CdTeWafer",
            "--",
            "simulate",
            "--events",
            "{events}",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let Commands::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.batch.config, Some(PathBuf::from("batch.toml")));
        assert_eq!(args.batch.workers, Some(8));
        assert_eq!(args.batch.threshold, Some(100.0));
        assert!(args.batch.test_run);
        assert_eq!(args.batch.set_values, vec!["label=CdTeWafer"]);
        assert_eq!(args.program, vec!["simulate", "--events", "{events}"]);
    }

    #[test]
    fn plan_takes_no_program() {
        let cli = Cli::try_parse_from(["simbatch", "plan", "--source", "rates.dat"]).unwrap();
        let Commands::Plan(args) = cli.command else {
            panic!("expected plan subcommand");
        };
        assert_eq!(args.source, Some(PathBuf::from("rates.dat")));
        assert!(Cli::try_parse_from(["simbatch", "plan", "--", "simulate"]).is_err());
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["simbatch", "-q", "-v", "plan"]).is_err());
    }
}
