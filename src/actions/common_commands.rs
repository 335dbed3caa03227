//! Spec §4.7 item 3 — the common-commands sub-sequence: an entry action that
//! parses the line once, and inner actions that react to the parsed command.

use crate::command;
use crate::dispatcher::{Action, Outcome};
use crate::error::{PostProcessError, Result};
use crate::state::ProcessingState;
use crate::window::{LineCursor, LineHandle};

/// Parses the current line into a [`command::Command`] and stores it on
/// state for the inner actions to read. Stops the outer sequence when a
/// command was recognised (so later top-level actions don't also see a
/// `G`/`T` line); otherwise skips the inner actions and lets the outer
/// sequence continue.
#[derive(Default)]
pub struct CommonCommandsEntry;

impl CommonCommandsEntry {
    pub fn new() -> Self {
        Self
    }
}

impl Action for CommonCommandsEntry {
    fn apply(
        &mut self,
        cursor: &mut dyn LineCursor,
        handle: LineHandle,
        state: &mut ProcessingState,
    ) -> Result<Outcome> {
        let text = cursor.text(handle)?;
        match command::parse(text) {
            Some(cmd) => {
                state.current_command = Some(cmd);
                Ok(Outcome::stop())
            }
            None => Ok(Outcome::continue_().skipping_sub_sequence()),
        }
    }
}

/// Latches the first observed `G1 X.. Y..` move (spec §4.6). Throws the
/// quick-inspection control signal the instant quick-inspection-only mode
/// is set and the latch has just been set for the first time.
#[derive(Default)]
pub struct FirstMoveCaptureAction;

impl FirstMoveCaptureAction {
    pub fn new() -> Self {
        Self
    }
}

impl Action for FirstMoveCaptureAction {
    fn apply(
        &mut self,
        _cursor: &mut dyn LineCursor,
        _handle: LineHandle,
        state: &mut ProcessingState,
    ) -> Result<Outcome> {
        let Some(cmd) = state.current_command.clone() else {
            return Ok(Outcome::continue_());
        };
        if cmd.is_motion() && cmd.has_xy() {
            let x: f64 = cmd.x.as_deref().unwrap_or("0").parse().unwrap_or(0.0);
            let y: f64 = cmd.y.as_deref().unwrap_or("0").parse().unwrap_or(0.0);
            let just_latched = state.latch_first_move(x, y);
            if just_latched && state.config.quick_inspection_only {
                return Err(PostProcessError::InspectionComplete);
            }
        }
        Ok(Outcome::continue_())
    }
}

/// Tracks the running X extent and rejects arcs (spec §4.6, §4.7 item 3).
#[derive(Default)]
pub struct ExtentTrackingAction;

impl ExtentTrackingAction {
    pub fn new() -> Self {
        Self
    }
}

impl Action for ExtentTrackingAction {
    fn apply(
        &mut self,
        cursor: &mut dyn LineCursor,
        handle: LineHandle,
        state: &mut ProcessingState,
    ) -> Result<Outcome> {
        let Some(cmd) = state.current_command.clone() else {
            return Ok(Outcome::continue_());
        };
        if cmd.is_arc() {
            return Err(PostProcessError::ArcsNotSupported {
                line: handle.line_number() as usize,
                text: cursor.text(handle)?.to_string(),
            });
        }
        if cmd.is_motion() {
            if let Some(x) = cmd.x.as_deref().and_then(|v| v.parse::<f64>().ok()) {
                state.observe_x_extent(x);
            }
        }
        Ok(Outcome::continue_())
    }
}
