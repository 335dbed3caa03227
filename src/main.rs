//! Thin CLI wrapper around [`ratos_postprocessor::facade`] (spec §6). Owns
//! argument parsing, the JSON progress protocol, and environment/version
//! plumbing; no pipeline logic lives here.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use ratos_postprocessor::facade::{FacadeOpts, PostProcessor};
use ratos_postprocessor::warning::WarningSink;
use ratos_postprocessor::{ProcessingConfig, Warning};

/// Post-process a G-code file for a dual-carriage (IDEX) printer.
#[derive(Debug, Parser)]
#[command(name = "ratos-postprocessor", version)]
struct Opts {
    /// Emit newline-delimited JSON progress records on stdout instead of
    /// human-readable log lines on stderr.
    #[arg(long)]
    non_interactive: bool,

    /// Target printer has a second (IDEX) carriage.
    #[arg(short = 'i', long = "idex")]
    idex: bool,

    /// Overwrite `output` if it already exists.
    #[arg(short = 'o', long)]
    overwrite: bool,

    /// Write the result back over `input`, overwriting it in place.
    #[arg(short = 'O', long = "overwrite-input")]
    overwrite_input: bool,

    /// Accept slicer versions outside the known allow-list as a warning
    /// instead of a hard error.
    #[arg(short = 'a', long = "allow-unsupported-slicer-versions")]
    allow_unsupported_slicer_versions: bool,

    /// Accept files whose generator could not be identified at all.
    #[arg(short = 'u', long = "allow-unknown-generator")]
    allow_unknown_generator: bool,

    input: PathBuf,
    output: Option<PathBuf>,
}

#[derive(Debug, serde::Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
enum ProgressRecord<'a> {
    Progress { message: &'a str },
    Warning { warning: &'a Warning },
    Error { message: String },
    Success { file: &'a str },
    Waiting,
}

/// Emits each warning as its own `{"result": "warning", ...}` record when
/// running non-interactively; logs via `tracing` otherwise.
struct CliWarningSink {
    non_interactive: bool,
}

impl WarningSink for CliWarningSink {
    fn warn(&mut self, warning: Warning) {
        if self.non_interactive {
            emit(&ProgressRecord::Warning { warning: &warning });
        } else {
            tracing::warn!(%warning, "non-fatal warning");
        }
    }
}

fn emit(record: &ProgressRecord) {
    if let Ok(line) = serde_json::to_string(record) {
        println!("{line}");
    }
}

fn main() -> ExitCode {
    let opts = Opts::parse();

    if opts.non_interactive {
        emit(&ProgressRecord::Waiting);
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    match run(&opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            if opts.non_interactive {
                emit(&ProgressRecord::Error {
                    message: message.clone(),
                });
            } else {
                tracing::error!(%message, "post-processing failed");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(opts: &Opts) -> Result<(), String> {
    let output = resolve_output_path(opts);

    let config = ProcessingConfig {
        printer_has_idex: opts.idex,
        allow_unsupported_slicers: opts.allow_unsupported_slicer_versions,
        allow_unknown_generator: opts.allow_unknown_generator,
        ..ProcessingConfig::default()
    };

    let facade_opts = FacadeOpts {
        config,
        current_post_processor_version: post_processor_version(),
        current_file_format_version: ratos_postprocessor::analysis::SCHEMA_VERSION,
        overwrite: opts.overwrite || opts.overwrite_input,
        cancellation: ratos_postprocessor::cancel::CancellationToken::new(),
    };

    if opts.non_interactive {
        emit(&ProgressRecord::Progress {
            message: "post-processing started",
        });
    }

    let mut warnings = CliWarningSink {
        non_interactive: opts.non_interactive,
    };

    let processor = PostProcessor::new();
    processor
        .transform(&opts.input, &output, &facade_opts, &mut warnings)
        .map_err(|e| e.to_string())?;

    if opts.non_interactive {
        emit(&ProgressRecord::Success {
            file: output.to_string_lossy().as_ref(),
        });
    }

    Ok(())
}

/// `--overwrite-input` writes back over `input`; otherwise `output` must be
/// given explicitly (spec §6's CLI surface: `<input> [output]`).
fn resolve_output_path(opts: &Opts) -> PathBuf {
    if opts.overwrite_input {
        opts.input.clone()
    } else {
        opts.output.clone().unwrap_or_else(|| opts.input.clone())
    }
}

/// Computes the post-processor's own version via `git describe` run inside
/// `RATOS_SCRIPT_DIR`, falling back to the crate version if the variable is
/// unset or the invocation fails (spec §6).
fn post_processor_version() -> semver::Version {
    std::env::var("RATOS_SCRIPT_DIR")
        .ok()
        .and_then(|dir| {
            std::process::Command::new("git")
                .arg("describe")
                .arg("--tags")
                .arg("--always")
                .current_dir(dir)
                .output()
                .ok()
        })
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .and_then(|raw| semver::Version::parse(raw.trim().trim_start_matches('v')).ok())
        .unwrap_or_else(|| {
            semver::Version::parse(env!("CARGO_PKG_VERSION"))
                .expect("CARGO_PKG_VERSION is a valid semver string")
        })
}
