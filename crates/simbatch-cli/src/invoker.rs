use simbatch::core::models::run::InvocationError;
use simbatch::core::models::work_item::{WorkItem, WorkItemId};
use simbatch::engine::invoker::RunInvoker;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

/// How the `{seed}` placeholder is filled for each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedPolicy {
    Fixed(u64),
    /// The numeric id itself, or a stable FNV-1a hash of a named id.
    FromId,
}

impl SeedPolicy {
    pub fn seed_for(&self, id: &WorkItemId) -> u64 {
        match (self, id) {
            (SeedPolicy::Fixed(seed), _) => *seed,
            (SeedPolicy::FromId, WorkItemId::Numeric(n)) => *n,
            (SeedPolicy::FromId, WorkItemId::Named(name)) => fnv1a(name.as_bytes()),
        }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}

/// The external program a batch runs once per work item.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub seed: SeedPolicy,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgTemplateError {
    #[error("Unclosed placeholder in argument '{0}'")]
    Unclosed(String),
    #[error("Unmatched '}}' in argument '{0}'")]
    UnmatchedClosingBrace(String),
    #[error("Unknown placeholder '{{{name}}}' in argument '{arg}'")]
    UnknownPlaceholder { arg: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ArgSegment {
    Literal(String),
    Id,
    Value,
    Events,
    Output,
    Log,
    Label,
    Seed,
    Meta(String),
}

fn parse_arg(arg: &str) -> Result<Vec<ArgSegment>, ArgTemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = arg.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '}' => return Err(ArgTemplateError::UnmatchedClosingBrace(arg.to_string())),
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    name.push(inner);
                }
                if !closed {
                    return Err(ArgTemplateError::Unclosed(arg.to_string()));
                }
                if !literal.is_empty() {
                    segments.push(ArgSegment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(match name.as_str() {
                    "id" => ArgSegment::Id,
                    "value" => ArgSegment::Value,
                    "events" => ArgSegment::Events,
                    "output" => ArgSegment::Output,
                    "log" => ArgSegment::Log,
                    "label" => ArgSegment::Label,
                    "seed" => ArgSegment::Seed,
                    _ => match name.strip_prefix("meta:") {
                        Some(key) if !key.is_empty() => ArgSegment::Meta(key.to_string()),
                        _ => {
                            return Err(ArgTemplateError::UnknownPlaceholder {
                                arg: arg.to_string(),
                                name,
                            });
                        }
                    },
                });
            }
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(ArgSegment::Literal(literal));
    }
    Ok(segments)
}

/// Runs one OS process per work item with stdout and stderr captured in the run's log file.
///
/// Arguments may reference `{id}`, `{value}`, `{events}`, `{output}`, `{log}`, `{label}`,
/// `{seed}` and `{meta:KEY}`; `{{` and `}}` produce literal braces.
#[derive(Debug, Clone)]
pub struct CommandInvoker {
    program: String,
    args: Vec<Vec<ArgSegment>>,
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    seed: SeedPolicy,
    label: String,
}

impl CommandInvoker {
    pub fn new(spec: CommandSpec, label: impl Into<String>) -> Result<Self, ArgTemplateError> {
        let args = spec
            .args
            .iter()
            .map(|a| parse_arg(a))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            program: spec.program,
            args,
            working_dir: spec.working_dir,
            env: spec.env,
            seed: spec.seed,
            label: label.into(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Renders the argument list for one run.
    pub fn render_args(
        &self,
        item: &WorkItem,
        output_path: &Path,
        log_path: &Path,
    ) -> Result<Vec<String>, InvocationError> {
        self.args
            .iter()
            .map(|segments| {
                let mut rendered = String::new();
                for segment in segments {
                    match segment {
                        ArgSegment::Literal(s) => rendered.push_str(s),
                        ArgSegment::Id => rendered.push_str(&item.id.to_string()),
                        ArgSegment::Value => rendered.push_str(&item.value.to_string()),
                        ArgSegment::Events => rendered.push_str(&item.event_count().to_string()),
                        ArgSegment::Output => rendered.push_str(&output_path.to_string_lossy()),
                        ArgSegment::Log => rendered.push_str(&log_path.to_string_lossy()),
                        ArgSegment::Label => rendered.push_str(&self.label),
                        ArgSegment::Seed => {
                            rendered.push_str(&self.seed.seed_for(&item.id).to_string())
                        }
                        ArgSegment::Meta(key) => {
                            let value = item.meta(key).ok_or_else(|| {
                                InvocationError::other(format!(
                                    "Work item {} has no metadata '{}'",
                                    item.id, key
                                ))
                            })?;
                            rendered.push_str(value);
                        }
                    }
                }
                Ok(rendered)
            })
            .collect()
    }
}

fn io_error(path: &Path, e: std::io::Error) -> InvocationError {
    InvocationError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

impl RunInvoker for CommandInvoker {
    fn invoke(
        &self,
        item: &WorkItem,
        output_path: &Path,
        log_path: &Path,
    ) -> Result<(), InvocationError> {
        // The child may run in another directory; both paths must name what the record names.
        let output_path = std::path::absolute(output_path).map_err(|e| io_error(output_path, e))?;
        let log_path = std::path::absolute(log_path).map_err(|e| io_error(log_path, e))?;
        let args = self.render_args(item, &output_path, &log_path)?;

        let stdout = File::create(&log_path).map_err(|e| io_error(&log_path, e))?;
        let stderr = stdout.try_clone().map_err(|e| io_error(&log_path, e))?;

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(id = %item.id, program = %self.program, ?args, "Spawning run.");
        let status = command
            .status()
            .map_err(|e| InvocationError::Launch(format!("{}: {}", self.program, e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(InvocationError::ExitStatus {
                code: status.code(),
                message: format!("see log '{}'", log_path.display()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn spec(program: &str, args: &[&str]) -> CommandSpec {
        CommandSpec {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            working_dir: None,
            env: BTreeMap::new(),
            seed: SeedPolicy::FromId,
        }
    }

    #[test]
    fn renders_every_placeholder() {
        let invoker = CommandInvoker::new(
            spec(
                "simulate",
                &[
                    "--run={id}",
                    "{value}",
                    "{events}",
                    "{output}",
                    "{log}",
                    "{label}",
                    "{seed}",
                    "{meta:isotope}",
                    "{{literal}}",
                ],
            ),
            "CdTeWafer",
        )
        .unwrap();
        let item = WorkItem::new(481090u64, 249.6).with_metadata("isotope", "Cd109");

        let args = invoker
            .render_args(&item, Path::new("out.root"), Path::new("out.log"))
            .unwrap();

        assert_eq!(
            args,
            vec![
                "--run=481090",
                "249.6",
                "250",
                "out.root",
                "out.log",
                "CdTeWafer",
                "481090",
                "Cd109",
                "{literal}",
            ]
        );
    }

    #[test]
    fn missing_metadata_fails_the_run() {
        let invoker = CommandInvoker::new(spec("simulate", &["{meta:energy}"]), "x").unwrap();
        let err = invoker
            .render_args(&WorkItem::new(1u64, 1.0), Path::new("o"), Path::new("l"))
            .unwrap_err();
        assert!(matches!(err, InvocationError::Other(msg) if msg.contains("energy")));
    }

    #[test]
    fn invalid_argument_templates_are_rejected() {
        assert_eq!(
            CommandInvoker::new(spec("s", &["{events"]), "x").unwrap_err(),
            ArgTemplateError::Unclosed("{events".to_string())
        );
        assert!(matches!(
            CommandInvoker::new(spec("s", &["{evnts}"]), "x").unwrap_err(),
            ArgTemplateError::UnknownPlaceholder { name, .. } if name == "evnts"
        ));
        assert!(matches!(
            CommandInvoker::new(spec("s", &["a}b"]), "x").unwrap_err(),
            ArgTemplateError::UnmatchedClosingBrace(_)
        ));
    }

    #[test]
    fn seed_policies() {
        assert_eq!(SeedPolicy::Fixed(0).seed_for(&WorkItemId::Numeric(9)), 0);
        assert_eq!(SeedPolicy::FromId.seed_for(&WorkItemId::Numeric(9)), 9);
        let named = WorkItemId::Named("Cs137".to_string());
        assert_eq!(
            SeedPolicy::FromId.seed_for(&named),
            SeedPolicy::FromId.seed_for(&named)
        );
        assert_ne!(
            SeedPolicy::FromId.seed_for(&named),
            SeedPolicy::FromId.seed_for(&WorkItemId::Named("Co60".to_string()))
        );
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
    }

    #[cfg(unix)]
    #[test]
    fn output_of_the_process_lands_in_the_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("run.log");
        let output = dir.path().join("run.root");
        let mut s = spec(
            "/bin/sh",
            &["-c", "echo events=$1; echo oops >&2; printf x > \"$2\"", "sh", "{events}", "{output}"],
        );
        s.env.insert("SIMBATCH_TEST".to_string(), "1".to_string());
        let invoker = CommandInvoker::new(s, "x").unwrap();

        invoker
            .invoke(&WorkItem::new(3u64, 80.0), &output, &log)
            .unwrap();

        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.contains("events=80"));
        assert!(content.contains("oops"));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "x");
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_a_failed_run() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = CommandInvoker::new(spec("/bin/sh", &["-c", "exit 3"]), "x").unwrap();

        let err = invoker
            .invoke(
                &WorkItem::new(1u64, 1.0),
                &dir.path().join("o"),
                &dir.path().join("l"),
            )
            .unwrap_err();

        assert!(matches!(err, InvocationError::ExitStatus { code: Some(3), .. }));
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn relative_paths_resolve_against_the_launch_directory() {
        let base = tempfile::tempdir().unwrap();
        let engine_dir = base.path().join("engine");
        std::fs::create_dir(&engine_dir).unwrap();
        let mut s = spec("/bin/sh", &["-c", "pwd; printf x > \"$1\"", "sh", "{output}"]);
        s.working_dir = Some(engine_dir.clone());
        let invoker = CommandInvoker::new(s, "x").unwrap();

        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(base.path()).unwrap();
        let result = invoker.invoke(
            &WorkItem::new(7u64, 1.0),
            Path::new("run_7.root"),
            Path::new("run_7.log"),
        );
        std::env::set_current_dir(previous).unwrap();

        result.unwrap();
        assert_eq!(std::fs::read_to_string(base.path().join("run_7.root")).unwrap(), "x");
        assert!(!engine_dir.join("run_7.root").exists());
        let log = std::fs::read_to_string(base.path().join("run_7.log")).unwrap();
        assert!(log.trim_end().ends_with("engine"));
    }

    #[test]
    fn missing_program_is_a_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let invoker =
            CommandInvoker::new(spec("simbatch-no-such-program-xyz", &[]), "x").unwrap();

        let err = invoker
            .invoke(
                &WorkItem::new(1u64, 1.0),
                &dir.path().join("o"),
                &dir.path().join("l"),
            )
            .unwrap_err();

        assert!(matches!(err, InvocationError::Launch(_)));
    }

    #[test]
    fn unwritable_log_is_an_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = CommandInvoker::new(spec("true", &[]), "x").unwrap();
        let log = dir.path().join("missing").join("run.log");

        let err = invoker
            .invoke(&WorkItem::new(1u64, 1.0), &dir.path().join("o"), &log)
            .unwrap_err();

        assert!(matches!(err, InvocationError::Io { path, .. } if path == log));
    }
}
