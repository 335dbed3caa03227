//! Spec §4.7 item 4 — Orca/Super-only layer-2 extruder temperature fix.

use crate::dispatcher::{Action, ActionFilter, Outcome};
use crate::error::Result;
use crate::identification::FlavourSet;
use crate::state::{BookmarkedLine, ProcessingState};
use crate::window::{LineCursor, LineHandle};

const M104_SCAN_LINES: usize = 9;

/// Runs once, on the `_ON_LAYER_CHANGE LAYER=2` marker line, gated to
/// Orca/Super flavours via its [`ActionFilter`].
pub struct FixLayerTemperatureAction {
    filter: ActionFilter,
}

impl FixLayerTemperatureAction {
    pub fn new(flavours: FlavourSet) -> Self {
        FixLayerTemperatureAction {
            filter: ActionFilter::flavours(flavours),
        }
    }
}

impl Action for FixLayerTemperatureAction {
    fn apply(
        &mut self,
        cursor: &mut dyn LineCursor,
        handle: LineHandle,
        state: &mut ProcessingState,
    ) -> Result<Outcome> {
        let text = cursor.text(handle)?.to_string();
        if !is_layer2_marker(&text) {
            return Ok(Outcome::continue_());
        }

        tracing::debug!(line = handle.line_number(), "found layer-2 marker");

        let key = cursor.allocate_bookmark_key();
        let padded = super::pad(&text, super::LAYER2_RESERVE_PADDING);
        cursor.set_text(handle, padded)?;
        cursor.set_bookmark(handle, key)?;
        state.layer2_line = Some(BookmarkedLine { handle, key });

        for neighbour in cursor.scan_forward(handle, M104_SCAN_LINES) {
            let line_text = cursor.text(neighbour)?.to_string();
            if is_m104_temp_line(&line_text) {
                let key = cursor.allocate_bookmark_key();
                let padded = super::pad(&line_text, super::REMOVED_BY_PREFIX.len());
                cursor.set_text(neighbour, padded)?;
                cursor.set_bookmark(neighbour, key)?;
                state.extruder_temp_lines.push(BookmarkedLine {
                    handle: neighbour,
                    key,
                });
            }
        }

        Ok(Outcome::remove_and_continue())
    }

    fn filter(&self) -> Option<&ActionFilter> {
        Some(&self.filter)
    }
}

fn is_layer2_marker(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with("_ON_LAYER_CHANGE") && trimmed.contains("LAYER=2")
}

fn is_m104_temp_line(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with("M104") && trimmed.contains('S')
}
