//! Spec §4.7 item 5 — capture the embedded slicer config block.
//!
//! The begin marker differs per flavour, and the embedded config itself is
//! useless without knowing which block we're in, so this is modelled as two
//! actions: [`BeginScanAction`] looks for any of the three begin markers and
//! self-replaces with a [`CaptureConfigAction`] once one is found.

use crate::dispatcher::{Action, Outcome};
use crate::error::Result;
use crate::state::ProcessingState;
use crate::window::{LineCursor, LineHandle};

const PRUSA_BEGIN: &str = "; prusaslicer_config = begin";
const PRUSA_END: &str = "; prusaslicer_config = end";
const SUPER_BEGIN: &str = "; superslicer_config = begin";
const SUPER_END: &str = "; superslicer_config = end";
const RATOS_BEGIN: &str = "; CONFIG_BLOCK_START";
const RATOS_END: &str = "; CONFIG_BLOCK_END";

/// Watches every line for one of the three config-block begin markers.
#[derive(Default)]
pub struct BeginScanAction;

impl BeginScanAction {
    pub fn new() -> Self {
        Self
    }
}

impl Action for BeginScanAction {
    fn apply(
        &mut self,
        cursor: &mut dyn LineCursor,
        handle: LineHandle,
        _state: &mut ProcessingState,
    ) -> Result<Outcome> {
        let text = cursor.text(handle)?.trim();
        let end_marker = if text.eq_ignore_ascii_case(PRUSA_BEGIN) {
            Some(PRUSA_END)
        } else if text.eq_ignore_ascii_case(SUPER_BEGIN) {
            Some(SUPER_END)
        } else if text.eq_ignore_ascii_case(RATOS_BEGIN) {
            Some(RATOS_END)
        } else {
            None
        };

        match end_marker {
            Some(end_marker) => Ok(Outcome::continue_().replaced_by(Box::new(
                CaptureConfigAction::new(end_marker),
            ))),
            None => Ok(Outcome::continue_()),
        }
    }
}

/// Runs once the begin marker has been seen; parses every `; key = value`
/// line into [`ProcessingState::slicer_config`] until its end marker, then
/// self-replaces back to a fresh [`BeginScanAction`] so a second config block
/// later in the file (unusual, but not forbidden) is still picked up.
struct CaptureConfigAction {
    end_marker: &'static str,
}

impl CaptureConfigAction {
    fn new(end_marker: &'static str) -> Self {
        CaptureConfigAction { end_marker }
    }
}

impl Action for CaptureConfigAction {
    fn apply(
        &mut self,
        cursor: &mut dyn LineCursor,
        handle: LineHandle,
        state: &mut ProcessingState,
    ) -> Result<Outcome> {
        let text = cursor.text(handle)?.trim();

        if text.eq_ignore_ascii_case(self.end_marker) {
            return Ok(Outcome::continue_().replaced_by(Box::new(BeginScanAction::new())));
        }

        if let Some((key, value)) = parse_config_line(text) {
            state.slicer_config.insert(key, value);
        }

        Ok(Outcome::continue_())
    }
}

/// Parses `; key = value`, tolerating the leading `;` and surrounding
/// whitespace every flavour's config block dump uses.
fn parse_config_line(text: &str) -> Option<(String, String)> {
    let rest = text.strip_prefix(';')?.trim_start();
    let (key, value) = rest.split_once('=')?;
    Some((key.trim().to_string(), value.trim().to_string()))
}
