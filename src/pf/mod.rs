//! pf (packet filter) state-table collector.
//!
//! Runs `pfctl -s info`, optionally through sudo, and turns the "State
//! Table" counters into one metric per cycle. A cycle either yields a
//! complete metric or an error; never a partial metric.
//!
//! Cycles must not run concurrently on one collector. The command cache is
//! the only state carried between cycles.

pub mod command;
pub mod stanza;
pub mod state_table;

use crate::accumulator::Accumulator;
use crate::config::PfConfig;
use crate::metric::Metric;
use command::{CommandSpec, ResolvedCommand, INFO_ARGS};
use stanza::{OutputFormat, ParseContext, PfctlFormat, Stanza};
use std::ffi::OsString;
use std::num::ParseIntError;
use std::process::ExitStatus;

/// Errors from one pf collection cycle.
#[derive(Debug)]
pub enum PfError {
    /// The command or the elevation wrapper is not on the search path.
    NotFound { program: String },
    /// The process could not be started, so no stderr exists.
    Spawn {
        command: String,
        source: std::io::Error,
    },
    /// The process exited unsuccessfully.
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    /// A registered stanza header never appeared in the output.
    HeaderNotFound { command: String },
    /// A recognized counter had a value that is not a valid i64.
    InvalidValue {
        label: String,
        text: String,
        source: ParseIntError,
    },
    /// A required counter was absent from its stanza.
    MissingData { label: String, command: String },
}

impl std::fmt::Display for PfError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PfError::NotFound { program } => write!(f, "can't locate {program}"),
            PfError::Spawn { command, source } => {
                write!(f, "error running {command}: {source} (unable to get stderr)")
            }
            PfError::Failed {
                command,
                status,
                stderr,
            } => {
                if stderr.is_empty() {
                    write!(f, "error running {command}: {status}: (no stderr output)")
                } else {
                    write!(f, "error running {command}: {status}: {stderr}")
                }
            }
            PfError::HeaderNotFound { command } => {
                write!(f, "cannot find header in {command} output")
            }
            PfError::InvalidValue {
                label,
                text,
                source,
            } => write!(f, "invalid value {text:?} for \"{label}\": {source}"),
            PfError::MissingData { label, command } => {
                write!(f, "data for \"{label}\" not found in {command} output")
            }
        }
    }
}

impl std::error::Error for PfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PfError::Spawn { source, .. } => Some(source),
            PfError::InvalidValue { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Gathers pf counters once per call.
pub struct PfCollector {
    spec: CommandSpec,
    search_path: Option<OsString>,
    resolved: Option<ResolvedCommand>,
    stanzas: Vec<Stanza>,
    format: PfctlFormat,
}

impl PfCollector {
    pub fn new(config: &PfConfig) -> Self {
        Self {
            spec: CommandSpec {
                program: config.command.clone(),
                args: INFO_ARGS.iter().map(|a| a.to_string()).collect(),
                elevate: config.use_sudo,
                elevate_with: config.sudo_command.clone(),
            },
            search_path: config.search_path.as_ref().map(OsString::from),
            resolved: None,
            stanzas: vec![state_table::stanza()],
            format: PfctlFormat,
        }
    }

    /// Run one cycle and hand the result to `acc`.
    ///
    /// Errors go to the accumulator rather than the caller so the next
    /// cycle runs regardless. Returns whether the cycle produced metrics.
    pub fn gather(&mut self, acc: &dyn Accumulator) -> bool {
        match self.collect() {
            Ok(metrics) => {
                for metric in metrics {
                    acc.add_metric(metric);
                }
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "pf collection failed");
                acc.add_error(Box::new(e));
                false
            }
        }
    }

    /// Run one cycle: resolve (first time only), execute, parse.
    pub fn collect(&mut self) -> Result<Vec<Metric>, PfError> {
        let output = self.command()?.run()?;
        self.parse_output(&output)
    }

    /// Parse captured `pfctl -s info` output.
    pub fn parse_output(&self, output: &str) -> Result<Vec<Metric>, PfError> {
        let ctx = ParseContext {
            format: &self.format as &dyn OutputFormat,
            command: &self.spec.program,
        };
        stanza::scan(output, &self.stanzas, &ctx)
    }

    /// Resolved command, looked up on first use. A failed lookup is not
    /// cached, so the next cycle tries again.
    fn command(&mut self) -> Result<&ResolvedCommand, PfError> {
        let resolved = match self.resolved.take() {
            Some(resolved) => resolved,
            None => {
                let resolved = match &self.search_path {
                    Some(path) => self.spec.resolve_in(path)?,
                    None => self.spec.resolve()?,
                };
                tracing::info!(
                    executable = %resolved.executable.display(),
                    args = ?resolved.args,
                    "resolved pf status command"
                );
                resolved
            }
        };
        Ok(self.resolved.insert(resolved))
    }
}
