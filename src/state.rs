//! C6 — processing state (spec §3, §4.6): the single per-stream object
//! threaded through every action call.

use std::collections::BTreeMap;

use crate::command::Command;
use crate::error::Warning;
use crate::identification::{GeneratorIdentification, ToolTemp};
use crate::window::LineHandle;

/// Immutable-for-the-run configuration flags (spec §3 "immutable config
/// flags"), plus the window sizing and scan-bound knobs spec §9 asks to be
/// configurable rather than silently hardcoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingConfig {
    pub printer_has_idex: bool,
    pub quick_inspection_only: bool,
    pub allow_unsupported_slicers: bool,
    pub allow_unknown_generator: bool,
    pub lines_behind: usize,
    pub lines_ahead: usize,
    /// Upper bound for the forward/backward toolchange scans (spec §4.7.x,
    /// §9 open question: kept configurable rather than a silent constant).
    pub toolshift_forward_scan_lines: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        ProcessingConfig {
            printer_has_idex: false,
            quick_inspection_only: false,
            allow_unsupported_slicers: false,
            allow_unknown_generator: false,
            lines_behind: crate::window::DEFAULT_LINES_BEHIND,
            lines_ahead: crate::window::DEFAULT_LINES_AHEAD,
            toolshift_forward_scan_lines: 19,
        }
    }
}

/// A bookmarked line this crate may need to rewrite at finalisation: the
/// window handle used while the line is still in flight, and the bookmark
/// key used to look it up afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookmarkedLine {
    pub handle: LineHandle,
    pub key: crate::bookmark::BookmarkKey,
}

/// Per-stream mutable state shared by every action (spec §3, §4.6).
#[derive(Debug, Clone)]
pub struct ProcessingState {
    pub config: ProcessingConfig,

    pub identification: Option<GeneratorIdentification>,

    pub first_line: Option<BookmarkedLine>,
    pub start_print_line: Option<BookmarkedLine>,
    pub layer2_line: Option<BookmarkedLine>,
    /// `M104 S…` lines found after the layer-2 marker, each padded and
    /// bookmarked so it can be commented out at finalisation.
    pub extruder_temp_lines: Vec<BookmarkedLine>,

    pub extruder_temps: Vec<ToolTemp>,
    pub tool_change_count: u32,
    pub used_tools: Vec<u32>,
    pub first_move_x: Option<f64>,
    pub first_move_y: Option<f64>,
    pub min_x: f64,
    pub max_x: f64,
    pub has_purge_tower: Option<bool>,
    pub slicer_config: BTreeMap<String, String>,

    /// Reset before each line is dispatched (spec §3 "per-line scratch").
    pub current_command: Option<Command>,

    /// Non-fatal warnings accumulated during the run, in order. Drained into
    /// the caller's `WarningSink` by the facade once the stream completes
    /// (spec §7, §9 "warning sink" design note).
    pub warnings: Vec<Warning>,
}

impl ProcessingState {
    pub fn new(config: ProcessingConfig) -> Self {
        ProcessingState {
            config,
            identification: None,
            first_line: None,
            start_print_line: None,
            layer2_line: None,
            extruder_temp_lines: Vec::new(),
            extruder_temps: Vec::new(),
            tool_change_count: 0,
            used_tools: Vec::new(),
            first_move_x: None,
            first_move_y: None,
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            has_purge_tower: None,
            slicer_config: BTreeMap::new(),
            current_command: None,
            warnings: Vec::new(),
        }
    }

    /// Clears the per-line scratch slot; called by the dispatcher before
    /// running the action sequence for a new line.
    pub fn reset_per_line_scratch(&mut self) {
        self.current_command = None;
    }

    pub fn push_warning(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    /// Records `tool` in `used_tools`, preserving insertion order and
    /// admitting no duplicates (spec §4.6).
    pub fn record_used_tool(&mut self, tool: u32) {
        if !self.used_tools.contains(&tool) {
            self.used_tools.push(tool);
        }
    }

    /// Extends the running X extent. No-op until the first call (spec
    /// §4.6: `min_x`/`max_x` stay at +∞/−∞ until the first `G1 X…`).
    pub fn observe_x_extent(&mut self, x: f64) {
        if x < self.min_x {
            self.min_x = x;
        }
        if x > self.max_x {
            self.max_x = x;
        }
    }

    /// Latches the first observed move coordinates. Returns `true` the
    /// first time it is called, `false` on every later call (spec §4.6:
    /// "latch on first observation").
    pub fn latch_first_move(&mut self, x: f64, y: f64) -> bool {
        if self.first_move_x.is_some() {
            return false;
        }
        self.first_move_x = Some(x);
        self.first_move_y = Some(y);
        true
    }
}
