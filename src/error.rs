//! Crate-wide error taxonomy (spec §7).
//!
//! [`PostProcessError`] covers every kind that aborts the stream. Non-fatal
//! kinds (heuristic smells, invalid metadata) are [`Warning`] values routed
//! through a [`crate::warning::WarningSink`] instead — they never reach this
//! type.

use crate::identification::{Flavour, GeneratorIdentification};

/// Abort-the-stream error kinds (spec §7: invalid input, already processed,
/// internal inconsistency, resource, cancellation).
#[derive(Debug, thiserror::Error)]
pub enum PostProcessError {
    /// No recognizable generator identification line was found in the header.
    #[error("slicer identification not found in file header")]
    SlicerIdentificationNotFound,

    /// The header already carries a "processed by" line.
    #[error("file was already processed by {}", describe_processed(identification))]
    AlreadyProcessed {
        identification: Box<GeneratorIdentification>,
    },

    /// The identified generator/version combination is not on the allow-list.
    #[error("slicer {flavour:?} version {version} is not supported")]
    SlicerNotSupported {
        flavour: Flavour,
        version: semver::Version,
    },

    /// A `G2`/`G3` arc command was encountered; arcs are not supported.
    #[error("arcs (G2/G3) are not supported (line {line}: {text:?})")]
    ArcsNotSupported { line: usize, text: String },

    /// A movement or tool-change command appeared before `START_PRINT`.
    #[error("expected START_PRINT before the first movement/tool-change (line {line}: {text:?})")]
    StartPrintNotFound { line: usize, text: String },

    /// A tool-change had no following XY-bearing move within the scan window.
    #[error("no XY move found after tool change (line {line})")]
    NoXyMoveAfterToolchange { line: usize },

    /// A generic malformed-input condition tied to a specific line.
    #[error("G-code error at line {line}: {reason} ({text:?})")]
    GCodeError {
        line: usize,
        text: String,
        reason: String,
    },

    /// A dispatcher or window invariant was violated; this is a programmer
    /// error and must never be silently suppressed.
    #[error("internal inconsistency: {0}")]
    Internal(String),

    /// The output path exists and overwrite was not requested.
    #[error("output path already exists: {0}")]
    AlreadyExists(String),

    /// The output path is not writable.
    #[error("output path is not writable: {0}")]
    NotWritable(String),

    /// A retro-patch replacement did not fit inside its reserved bookmark.
    #[error(
        "replacement for bookmark {key} needs {needed} bytes but only {available} were reserved"
    )]
    ReplacementTooLarge {
        key: u64,
        needed: usize,
        available: usize,
    },

    /// A bookmark lookup failed at finalisation time.
    #[error("no bookmark registered for key {0}")]
    BookmarkMissing(u64),

    /// Generic I/O failure, stringified at the system boundary so the error
    /// stays cheap to construct and to compare in tests.
    #[error("I/O error: {0}")]
    Io(String),

    /// The pipeline was cancelled via a [`crate::cancel::CancellationToken`].
    #[error("processing was cancelled")]
    Cancelled,

    /// Control-signal used internally to unwind a quick-inspection-only pass
    /// once the minimal fields are known. Never surfaced to a CLI caller —
    /// the facade catches it and converts it into a normal `Ok` result.
    #[error("inspection complete")]
    InspectionComplete,
}

fn describe_processed(identification: &GeneratorIdentification) -> String {
    match &identification.post_processor_version {
        Some(v) => format!("RatOS.PostProcessor {v}"),
        None => "an unknown version".to_string(),
    }
}

impl From<std::io::Error> for PostProcessError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Result alias used throughout the pipeline.
pub type Result<T> = std::result::Result<T, PostProcessError>;

/// Non-fatal warning kinds (spec §7: heuristic smell, metadata).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", content = "message")]
pub enum Warning {
    /// A heuristic scan (e.g. the toolchange retract/z-hop walk) ran to its
    /// bound without finding its expected sentinel.
    HeuristicSmell { line: usize, detail: String },
    /// The analysis trailer failed a length or base64 sanity check.
    InvalidMetadata { detail: String },
    /// An unsupported slicer version was accepted because the caller passed
    /// `allow_unsupported_slicer_versions`.
    UnsupportedVersionAllowed {
        flavour: Flavour,
        version: semver::Version,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::HeuristicSmell { line, detail } => {
                write!(f, "heuristic smell at line {line}: {detail}")
            }
            Warning::InvalidMetadata { detail } => write!(f, "invalid metadata: {detail}"),
            Warning::UnsupportedVersionAllowed { flavour, version } => write!(
                f,
                "unsupported slicer version accepted: {flavour:?} {version}"
            ),
        }
    }
}
