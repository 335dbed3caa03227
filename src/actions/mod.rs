//! C7 — the transform action library (spec §4.7).
//!
//! Each submodule is one numbered item from spec §4.7's dispatch order.
//! [`build_default_sequence`] assembles them into the [`crate::dispatcher::Sequence`]
//! the facade drives one line at a time.

pub mod capture_slicer_config;
pub mod common_commands;
pub mod find_start_print;
pub mod fix_layer_temperature;
pub mod identify_generator;
pub mod toolchange;

use crate::identification::{Flavour, FlavourSet};
use crate::window::{LineCursor, LineHandle};

use crate::dispatcher::{Sequence, SequenceItem, SubSequence};

/// Exact marker text prepended to a line this crate has commented out.
/// Kept as a single constant so every action agrees on its byte length —
/// several bookmarks are padded by exactly `REMOVED_BY_PREFIX.len()` bytes
/// so the finalisation retro-patch fits without reallocating.
pub(crate) const REMOVED_BY_PREFIX: &str = "; Removed by RatOS post processor: ";

/// Extra bytes reserved on the `_ON_LAYER_CHANGE LAYER=2` line so the
/// finalisation retro-patch can append one corrected `M104` line per used
/// tool inside the same byte extent. Spec §4.7 item 4 asks for the line to
/// be "padded and bookmarked" but does not fix a byte count the way it does
/// for the header (100) and `START_PRINT` (250) lines; 500 bytes covers a
/// realistic tool count (IDEX printers rarely exceed a handful of tools)
/// without growing unboundedly — see DESIGN.md.
pub(crate) const LAYER2_RESERVE_PADDING: usize = 500;

/// Pads `text` with `extra` trailing space characters (G-code-compatible
/// whitespace, spec §3's bookmark invariant).
pub(crate) fn pad(text: &str, extra: usize) -> String {
    let mut out = String::with_capacity(text.len() + extra);
    out.push_str(text);
    for _ in 0..extra {
        out.push(' ');
    }
    out
}

/// Prepends the removed-by marker to `text`.
pub(crate) fn mark_removed(text: &str) -> String {
    format!("{REMOVED_BY_PREFIX}{text}")
}

/// True if any line within `radius` callback-steps of `handle` (inclusive,
/// both directions) contains `needle`. Used by the toolchange heuristic to
/// exempt lines near a `;WIPE_END` marker from retract/z-hop redaction.
pub(crate) fn nearby_contains(
    cursor: &dyn LineCursor,
    handle: LineHandle,
    radius: isize,
    needle: &str,
) -> bool {
    for offset in -radius..=radius {
        if let Some(h) = cursor.get_line(handle, offset) {
            if cursor.text(h).map(|t| t.contains(needle)).unwrap_or(false) {
                return true;
            }
        }
    }
    false
}

/// Assembles the full C7 action sequence in the dispatch order fixed by
/// spec §4.7: identify generator, find `START_PRINT`, the common-commands
/// sub-sequence (first-move capture, extent tracking, toolchange rewrite),
/// the Orca/Super-only layer-2 temperature fix, and slicer-config capture.
pub fn build_default_sequence() -> Sequence {
    let orca_super = FlavourSet::of(&[Flavour::OrcaSlicer, Flavour::SuperSlicer]);

    Sequence::new(vec![
        SequenceItem::Action(Box::new(identify_generator::IdentifyGeneratorAction::new())),
        SequenceItem::Action(Box::new(find_start_print::FindStartPrintAction::new())),
        SequenceItem::SubSequence(SubSequence {
            entry: Box::new(common_commands::CommonCommandsEntry::new()),
            inner: vec![
                Box::new(common_commands::FirstMoveCaptureAction::new()),
                Box::new(common_commands::ExtentTrackingAction::new()),
                Box::new(toolchange::ToolchangeRewriteAction::new()),
            ],
        }),
        SequenceItem::Action(Box::new(
            fix_layer_temperature::FixLayerTemperatureAction::new(orca_super),
        )),
        SequenceItem::Action(Box::new(capture_slicer_config::BeginScanAction::new())),
    ])
}
