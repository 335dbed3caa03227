//! Spec §4.7 item 1 — identify the generator from the file header.

use crate::dispatcher::{Action, Outcome};
use crate::error::{PostProcessError, Result, Warning};
use crate::identification::{Flavour, GeneratorIdentification};
use crate::metadata;
use crate::state::{BookmarkedLine, ProcessingState};
use crate::window::{LineCursor, LineHandle};

const HEADER_PAD: usize = 100;

/// Runs once, on the first line of the stream. Always removes itself and
/// stops the sequence for that line, whether it succeeds or fails.
#[derive(Default)]
pub struct IdentifyGeneratorAction;

impl IdentifyGeneratorAction {
    pub fn new() -> Self {
        Self
    }
}

impl Action for IdentifyGeneratorAction {
    fn apply(
        &mut self,
        cursor: &mut dyn LineCursor,
        handle: LineHandle,
        state: &mut ProcessingState,
    ) -> Result<Outcome> {
        let first = cursor.text(handle)?.to_string();
        let mut blob = first.clone();
        for neighbour in cursor.scan_forward(handle, 2) {
            blob.push('\n');
            blob.push_str(cursor.text(neighbour)?);
        }

        let ident = metadata::parse_header(&blob)?;
        tracing::debug!(generator = %ident.generator_name, flavour = ?ident.flavour, "identified generator");

        if ident.is_processed() {
            return Err(PostProcessError::AlreadyProcessed {
                identification: Box::new(ident),
            });
        }
        if ident.generator_name.is_empty() {
            return Err(PostProcessError::SlicerIdentificationNotFound);
        }

        self.check_version(state, &ident)?;
        state.identification = Some(ident);

        let key = cursor.allocate_bookmark_key();
        let padded = super::pad(&first, HEADER_PAD);
        cursor.set_text(handle, padded)?;
        cursor.set_bookmark(handle, key)?;
        state.first_line = Some(BookmarkedLine { handle, key });

        Ok(Outcome::remove_and_stop())
    }
}

impl IdentifyGeneratorAction {
    fn check_version(&self, state: &mut ProcessingState, ident: &GeneratorIdentification) -> Result<()> {
        let supported = match ident.flavour {
            Some(Flavour::Unknown) | None => state.config.allow_unknown_generator,
            Some(_) => version_allowed(ident),
        };
        if supported {
            return Ok(());
        }

        let flavour = ident.flavour.unwrap_or(Flavour::Unknown);
        let version = ident
            .generator_version
            .clone()
            .unwrap_or_else(|| semver::Version::new(0, 0, 0));

        if state.config.allow_unsupported_slicers {
            tracing::warn!(?flavour, %version, "accepting unsupported slicer version");
            state.push_warning(Warning::UnsupportedVersionAllowed { flavour, version });
            Ok(())
        } else {
            Err(PostProcessError::SlicerNotSupported { flavour, version })
        }
    }
}

/// The allow-list from spec §4.7 item 1: PrusaSlicer `2.8.x`, OrcaSlicer
/// `2.1.1|2.2.0`, SuperSlicer `2.5.59|2.5.60`, RatOS dialect `0.1`.
pub(crate) fn version_allowed(ident: &GeneratorIdentification) -> bool {
    match ident.flavour {
        Some(Flavour::RatOsDialect) => ident.ratos_dialect_version.as_deref() == Some("0.1"),
        Some(Flavour::PrusaSlicer) => ident
            .generator_version
            .as_ref()
            .is_some_and(|v| v.major == 2 && v.minor == 8),
        Some(Flavour::OrcaSlicer) => ident.generator_version.as_ref().is_some_and(|v| {
            matches!((v.major, v.minor, v.patch), (2, 1, 1) | (2, 2, 0))
        }),
        Some(Flavour::SuperSlicer) => ident.generator_version.as_ref().is_some_and(|v| {
            matches!((v.major, v.minor, v.patch), (2, 5, 59) | (2, 5, 60))
        }),
        Some(Flavour::Unknown) | None => false,
    }
}
