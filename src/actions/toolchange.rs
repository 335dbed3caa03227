//! Spec §4.7.x — toolchange → toolshift.

use crate::command;
use crate::dispatcher::{Action, Outcome};
use crate::error::{PostProcessError, Result, Warning};
use crate::state::ProcessingState;
use crate::window::{LineCursor, LineHandle};

use super::{mark_removed, nearby_contains};

/// The only handler for `T<n>` lines inside the common-commands
/// sub-sequence. Never removes itself: every tool change in the file is
/// rewritten (or, for the first one, commented out).
#[derive(Default)]
pub struct ToolchangeRewriteAction;

impl ToolchangeRewriteAction {
    pub fn new() -> Self {
        Self
    }
}

impl Action for ToolchangeRewriteAction {
    fn apply(
        &mut self,
        cursor: &mut dyn LineCursor,
        handle: LineHandle,
        state: &mut ProcessingState,
    ) -> Result<Outcome> {
        let Some(cmd) = state.current_command.clone() else {
            return Ok(Outcome::continue_());
        };
        if !cmd.is_tool_change() {
            return Ok(Outcome::continue_());
        }
        let Some(tool) = cmd.tool_number() else {
            return Ok(Outcome::continue_());
        };

        let is_first = state.tool_change_count == 0;
        state.tool_change_count += 1;

        if is_first {
            let text = cursor.text(handle)?.to_string();
            cursor.set_text(handle, mark_removed(&text))?;
            return Ok(Outcome::stop());
        }

        state.record_used_tool(tool);

        let scan_bound = state.config.toolshift_forward_scan_lines;

        if state.has_purge_tower.is_none() {
            let found = cursor.scan_back(handle, 100).iter().any(|h| {
                cursor
                    .text(*h)
                    .map(|t| t.contains("; CP TOOLCHANGE START"))
                    .unwrap_or(false)
            });
            state.has_purge_tower = Some(found);
        }
        let has_purge_tower = state.has_purge_tower.unwrap_or(false);

        if !has_purge_tower {
            self.redact_retract_and_zhop(cursor, handle, state, scan_bound)?;
        }

        let (xy, z_moves, e_only) = self.collect_forward(cursor, handle, scan_bound)?;

        let Some((x, y)) = xy else {
            return Err(PostProcessError::NoXyMoveAfterToolchange {
                line: handle.line_number() as usize,
            });
        };

        if z_moves.len() > 2 {
            state.push_warning(Warning::HeuristicSmell {
                line: handle.line_number() as usize,
                detail: format!(
                    "{} Z moves found after toolchange, expected at most 2",
                    z_moves.len()
                ),
            });
        }

        if !has_purge_tower {
            for h in &e_only {
                let t = cursor.text(*h)?.to_string();
                cursor.set_text(*h, mark_removed(&t))?;
            }
            if z_moves.len() > 1 {
                for (h, _) in &z_moves[..z_moves.len() - 1] {
                    let t = cursor.text(*h)?.to_string();
                    cursor.set_text(*h, mark_removed(&t))?;
                }
            }
        }

        let mut replacement = format!("T{tool} X{x} Y{y}");
        if let Some((_, z)) = z_moves.last() {
            replacement.push_str(&format!(" Z{z}"));
        }
        cursor.set_text(handle, replacement)?;

        Ok(Outcome::stop())
    }
}

impl ToolchangeRewriteAction {
    /// Walks backward up to `scan_bound` lines. Comments out every
    /// retract/Z move unless it sits within two lines of `;WIPE_END`, and
    /// stops as soon as it hits the first XY-bearing move.
    fn redact_retract_and_zhop(
        &self,
        cursor: &mut dyn LineCursor,
        handle: LineHandle,
        state: &mut ProcessingState,
        scan_bound: usize,
    ) -> Result<()> {
        let back = cursor.scan_back(handle, scan_bound);
        let mut found_xy_stop = false;
        for h in back {
            let text = cursor.text(h)?.to_string();
            let Some(cmd) = command::parse(&text) else {
                continue;
            };
            if !cmd.is_motion() {
                continue;
            }
            if cmd.has_xy() {
                found_xy_stop = true;
                break;
            }
            if cmd.e.is_some() || cmd.z.is_some() {
                if !nearby_contains(cursor, h, 2, ";WIPE_END") {
                    cursor.set_text(h, mark_removed(&text))?;
                }
            }
        }
        if !found_xy_stop {
            state.push_warning(Warning::HeuristicSmell {
                line: handle.line_number() as usize,
                detail: "backward retract/z-hop scan exhausted without finding an XY stop"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Walks forward up to `scan_bound` lines collecting the first
    /// XY-bearing move, every Z-bearing move, and every E-only move.
    #[allow(clippy::type_complexity)]
    fn collect_forward(
        &self,
        cursor: &dyn LineCursor,
        handle: LineHandle,
        scan_bound: usize,
    ) -> Result<(
        Option<(String, String)>,
        Vec<(LineHandle, String)>,
        Vec<LineHandle>,
    )> {
        let mut first_xy = None;
        let mut z_moves = Vec::new();
        let mut e_only = Vec::new();

        for h in cursor.scan_forward(handle, scan_bound) {
            let text = cursor.text(h)?.to_string();
            let Some(cmd) = command::parse(&text) else {
                continue;
            };
            if !cmd.is_motion() {
                continue;
            }
            if cmd.has_xy() {
                if first_xy.is_none() {
                    first_xy = Some((cmd.x.clone().unwrap(), cmd.y.clone().unwrap()));
                }
            } else if let Some(z) = &cmd.z {
                z_moves.push((h, z.clone()));
            } else if cmd.e.is_some() {
                e_only.push(h);
            }
        }

        Ok((first_xy, z_moves, e_only))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmark::{BookmarkKey, EncoderItem};
    use crate::state::ProcessingConfig;
    use crate::window::{LineSink, Window};

    #[derive(Default)]
    struct VecSink(Vec<EncoderItem>);
    impl LineSink for VecSink {
        fn push(&mut self, item: EncoderItem) -> Result<()> {
            self.0.push(item);
            Ok(())
        }
        fn allocate_key(&mut self) -> BookmarkKey {
            0
        }
    }

    /// Feeds every line with a no-op callback (the fixtures are far smaller
    /// than the window's capacity, so the real processing only happens on
    /// `flush`), then flushes while dispatching a fresh
    /// [`ToolchangeRewriteAction`] to every `T<n>` line encountered, in
    /// order.
    fn run(lines: &[&str]) -> (Result<()>, ProcessingState, Vec<String>) {
        let mut window = Window::with_defaults(VecSink::default());
        let mut state = ProcessingState::new(ProcessingConfig::default());
        for line in lines {
            window.feed_line((*line).to_string(), |_, _| Ok(())).unwrap();
        }

        let mut rewrites = Vec::new();
        let result = window.flush(|win, h| {
            let text = win.text(h)?.to_string();
            if command::parse(&text).is_some_and(|c| c.is_tool_change()) {
                state.current_command = command::parse(&text);
                let mut action = ToolchangeRewriteAction::new();
                action.apply(win, h, &mut state)?;
                rewrites.push(win.text(h)?.to_string());
            }
            Ok(())
        });

        (result, state, rewrites)
    }

    #[test]
    fn first_tool_change_is_commented_out() {
        let (result, state, rewrites) = run(&["T0"]);
        assert!(result.is_ok());
        assert!(rewrites[0].starts_with("; Removed by RatOS post processor: "));
        assert_eq!(state.tool_change_count, 1);
    }

    #[test]
    fn later_tool_change_without_purge_tower_is_rewritten() {
        let (result, state, rewrites) =
            run(&["T0", "G1 X1 Y1", "G1 Z5", "T1", "G1 X10 Y20", "G1 Z6"]);
        assert!(result.is_ok());
        assert!(rewrites[1].starts_with("T1 X10 Y20"));
        assert_eq!(state.used_tools, vec![1]);
    }

    #[test]
    fn no_xy_move_after_toolchange_is_typed_error() {
        let (result, _, _) = run(&["T0", "G1 Z1", "T1", "G1 Z2"]);
        assert!(matches!(
            result,
            Err(PostProcessError::NoXyMoveAfterToolchange { .. })
        ));
    }
}
