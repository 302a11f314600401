//! CLI execution and pipeline orchestration.
//!
//! Wires the stages in order (configuration, discovery, parsing,
//! evaluation, IR construction, emission), carrying the diagnostic sink and
//! the unknown-construct registry through all of them. Any recorded error
//! short-circuits the pipeline at the next stage boundary; emission is
//! additionally skipped whenever an error exists at its entry. A panic
//! inside a stage is captured as an `INTERNAL` diagnostic instead of
//! aborting the process.

mod error;

pub use error::RunnerError;

use crate::cli::Cli;
use crate::cmake_gen::{self, EmitOptions};
use crate::config::ConversionConfig;
use crate::diagnostics::{DiagCode, Diagnostic, DiagnosticSink, Stage};
use crate::eval::{self, ParsedMakefile};
use crate::ir;
use crate::makefile::{discovery, parser};
use crate::unknown::UnknownRegistry;
use crate::workspace::{OsWorkspace, Workspace};
use anyhow::Result;
use std::io::{self, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Cooperative cancellation flag, checked between pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Run the translation against the real filesystem, rendering diagnostics
/// to stdout. Returns the process exit code.
pub fn run(cli: &Cli) -> Result<i32> {
    let workspace = OsWorkspace::new();
    let mut stdout = io::stdout().lock();
    run_with(cli, &workspace, &CancelFlag::new(), &mut stdout)
}

/// The full pipeline over an arbitrary workspace and output stream.
pub fn run_with(
    cli: &Cli,
    workspace: &dyn Workspace,
    cancel: &CancelFlag,
    out: &mut impl Write,
) -> Result<i32> {
    let mut sink = DiagnosticSink::new();
    let mut unknowns = UnknownRegistry::new();

    let source_dir = workspace.absolutize(&cli.source_dir)?;
    if !workspace.exists(&source_dir) {
        return Err(RunnerError::SourceDirMissing {
            path: source_dir,
            help: "pass --source-dir pointing at the directory holding the Makefile".to_owned(),
        }
        .into());
    }
    let output_dir = workspace.absolutize(&cli.output_dir)?;

    debug!(source_dir = %source_dir, "loading configuration");
    let mut config = guarded(Stage::Config, &mut sink, |sink| {
        ConversionConfig::load(cli.config.as_deref(), cli.strict, workspace, sink)
    })
    .unwrap_or_default();
    if cli.with_packaging {
        config.packaging_enabled = true;
    }

    'pipeline: {
        if sink.any_error() || cancel.is_cancelled() {
            break 'pipeline;
        }

        debug!("discovering Makefile graph");
        let Some((_, sources)) = guarded(Stage::Discovery, &mut sink, |sink| {
            discovery::discover(&source_dir, cli.entry_makefile.as_deref(), workspace, sink)
        }) else {
            break 'pipeline;
        };
        if sink.any_error() || cancel.is_cancelled() {
            break 'pipeline;
        }

        debug!(files = sources.len(), "parsing");
        let Some(parsed) = guarded(Stage::Parse, &mut sink, |sink| {
            sources
                .iter()
                .map(|source| ParsedMakefile {
                    path: source.path.clone(),
                    nodes: parser::parse(&source.text, &source.path, sink, &mut unknowns),
                })
                .collect::<Vec<_>>()
        }) else {
            break 'pipeline;
        };
        if sink.any_error() || cancel.is_cancelled() {
            break 'pipeline;
        }

        debug!("evaluating");
        let Some(facts) = guarded(Stage::Evaluate, &mut sink, |sink| {
            eval::evaluate(&parsed, &source_dir, &config, workspace, sink, &mut unknowns)
        }) else {
            break 'pipeline;
        };
        if sink.any_error() || cancel.is_cancelled() {
            break 'pipeline;
        }

        debug!("building project IR");
        let Some(project) = guarded(Stage::BuildGraph, &mut sink, |sink| {
            ir::build_project(&facts, &config, &source_dir, sink, &mut unknowns)
        }) else {
            break 'pipeline;
        };
        if sink.any_error() || cancel.is_cancelled() {
            break 'pipeline;
        }

        debug!(targets = project.targets.len(), "emitting CMake");
        let options = EmitOptions {
            output_dir,
            packaging: config.packaging_enabled,
        };
        let files = guarded(Stage::Emit, &mut sink, |sink| {
            cmake_gen::generate(&project, &options, sink, &mut unknowns)
        })
        .unwrap_or_default();
        if cli.dry_run {
            for file in &files {
                writeln!(out, "would write {}", file.path)?;
            }
        } else {
            // The sink was error-free at emission entry (checked above);
            // errors raised while rendering still leave placeholder files
            // worth writing.
            cmake_gen::flush(&files, workspace, &mut sink);
        }
    }

    sink.render(out, cli.verbose > 0)?;
    if !unknowns.is_empty() {
        writeln!(
            out,
            "{} construct(s) need manual review; see the unknown-construct report",
            unknowns.len()
        )?;
    }
    Ok(sink.exit_code())
}

/// Run one stage, converting a panic into an `INTERNAL` error diagnostic so
/// a bug in one stage still yields a rendered report and exit status 1.
fn guarded<T>(
    stage: Stage,
    sink: &mut DiagnosticSink,
    f: impl FnOnce(&mut DiagnosticSink) -> T,
) -> Option<T> {
    let result = catch_unwind(AssertUnwindSafe(|| f(&mut *sink)));
    match result {
        Ok(value) => Some(value),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unexpected internal fault".to_owned());
            sink.push(
                Diagnostic::error(DiagCode::Internal, format!("stage panicked: {message}"))
                    .from_stage(stage),
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::MemWorkspace;

    fn cli_for(source: &str, output: &str) -> Cli {
        use clap::Parser;
        Cli::parse_from(["mk2cmake", "--source-dir", source, "--output-dir", output])
    }

    #[test]
    fn missing_source_dir_is_a_runner_error() {
        let workspace = MemWorkspace::new();
        let cli = cli_for("/nowhere", "/out");
        let mut out = Vec::new();
        let err = run_with(&cli, &workspace, &CancelFlag::new(), &mut out)
            .expect_err("must fail before the pipeline");
        assert!(err.to_string().contains("/nowhere"));
    }

    #[test]
    fn guarded_converts_panics_to_internal_diagnostics() {
        let mut sink = DiagnosticSink::new();
        let result: Option<()> = guarded(Stage::Evaluate, &mut sink, |_| {
            panic!("boom");
        });
        assert!(result.is_none());
        let diag = sink.iter().next().expect("internal diagnostic");
        assert_eq!(diag.code, DiagCode::Internal);
        assert!(diag.message.contains("boom"));
        assert_eq!(sink.exit_code(), 1);
    }

    #[test]
    fn cancellation_stops_before_discovery() {
        let workspace = MemWorkspace::new();
        workspace.add_file("/proj/Makefile", "app: main.c\n\tgcc -o app main.c\n");
        let cli = cli_for("/proj", "/out");
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut out = Vec::new();
        let code = run_with(&cli, &workspace, &cancel, &mut out).expect("run");
        assert_eq!(code, 0);
        assert!(workspace.file("/out/CMakeLists.txt").is_none());
    }
}
