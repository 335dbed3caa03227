//! Spec §4.7 item 2 — locate `START_PRINT`/`RMMU_START_PRINT`.

use crate::command;
use crate::dispatcher::{Action, Outcome};
use crate::error::{PostProcessError, Result};
use crate::identification::ToolTemp;
use crate::state::{BookmarkedLine, ProcessingState};
use crate::window::{LineCursor, LineHandle};

const START_PRINT_PAD: usize = 250;

/// Runs on every line until `START_PRINT` is found (or an error aborts the
/// stream); then removes itself and stops the sequence for that line.
#[derive(Default)]
pub struct FindStartPrintAction;

impl FindStartPrintAction {
    pub fn new() -> Self {
        Self
    }
}

impl Action for FindStartPrintAction {
    fn apply(
        &mut self,
        cursor: &mut dyn LineCursor,
        handle: LineHandle,
        state: &mut ProcessingState,
    ) -> Result<Outcome> {
        let text = cursor.text(handle)?.to_string();
        let trimmed = text.trim_start();

        if trimmed.is_empty() || trimmed.starts_with(';') {
            return Ok(Outcome::continue_());
        }

        if let Some(rest) = start_print_rest(trimmed) {
            capture_start_print_params(rest, state);
            tracing::debug!(line = handle.line_number(), "found START_PRINT");

            let key = cursor.allocate_bookmark_key();
            let padded = super::pad(&text, START_PRINT_PAD);
            cursor.set_text(handle, padded)?;
            cursor.set_bookmark(handle, key)?;
            state.start_print_line = Some(BookmarkedLine { handle, key });

            return Ok(Outcome::remove_and_stop());
        }

        if let Some(cmd) = command::parse(&text) {
            if cmd.is_motion() || cmd.is_arc() || cmd.is_tool_change() {
                return Err(PostProcessError::StartPrintNotFound {
                    line: handle.line_number() as usize,
                    text,
                });
            }
        }

        Ok(Outcome::continue_())
    }
}

/// Returns the text after the `START_PRINT`/`RMMU_START_PRINT` token if
/// `trimmed` starts with one, case-insensitively.
fn start_print_rest(trimmed: &str) -> Option<&str> {
    for token in ["RMMU_START_PRINT", "START_PRINT"] {
        if trimmed.len() >= token.len() && trimmed[..token.len()].eq_ignore_ascii_case(token) {
            return Some(trimmed[token.len()..].trim_start());
        }
    }
    None
}

fn capture_start_print_params(rest: &str, state: &mut ProcessingState) {
    for token in rest.split_whitespace() {
        if let Some(v) = token.strip_prefix("INITIAL_TOOL=") {
            if let Ok(tool) = v.parse::<u32>() {
                state.record_used_tool(tool);
            }
        } else if let Some(v) = token.strip_prefix("EXTRUDER_OTHER_LAYER_TEMP=") {
            for (tool, temp) in v.split(',').enumerate() {
                if let Ok(temp) = temp.trim().parse::<u32>() {
                    state.extruder_temps.push(ToolTemp {
                        tool: tool as u32,
                        temp,
                    });
                }
            }
        }
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

    /// Feeds every line with a no-op callback (these fixtures are far
    /// smaller than the window's default capacity, so real processing only
    /// happens on `flush`), then flushes while dispatching the action to
    /// every line until `START_PRINT` is found or an error aborts the scan.
    fn run(lines: &[&str]) -> (Result<()>, ProcessingState) {
        let mut window = Window::with_defaults(VecSink::default());
        let mut state = ProcessingState::new(ProcessingConfig::default());
        let mut action = FindStartPrintAction::new();
        for line in lines {
            window.feed_line((*line).to_string(), |_, _| Ok(())).unwrap();
        }
        let result = window.flush(|win, h| {
            if state.start_print_line.is_none() {
                action.apply(win, h, &mut state)?;
            }
            Ok(())
        });
        (result, state)
    }

    #[test]
    fn finds_start_print_and_bookmarks_it() {
        let (result, state) = run(&["; comment", "START_PRINT INITIAL_TOOL=0", "G1 X1 Y1"]);
        assert!(result.is_ok());
        assert!(state.start_print_line.is_some());
        assert_eq!(state.used_tools, vec![0]);
    }

    #[test]
    fn finds_rmmu_start_print_case_insensitively() {
        let (result, state) = run(&["rmmu_start_print initial_tool=1"]);
        assert!(result.is_ok());
        assert_eq!(state.used_tools, vec![1]);
    }

    #[test]
    fn captures_extruder_other_layer_temp_csv() {
        let (result, state) = run(&["START_PRINT EXTRUDER_OTHER_LAYER_TEMP=200,205"]);
        assert!(result.is_ok());
        assert_eq!(
            state.extruder_temps,
            vec![
                ToolTemp { tool: 0, temp: 200 },
                ToolTemp { tool: 1, temp: 205 },
            ]
        );
    }

    #[test]
    fn movement_before_start_print_is_typed_error() {
        let (result, _) = run(&["G1 X1 Y1", "START_PRINT"]);
        assert!(matches!(result, Err(PostProcessError::StartPrintNotFound { .. })));
    }

    #[test]
    fn tool_change_before_start_print_is_typed_error() {
        let (result, _) = run(&["T0", "START_PRINT"]);
        assert!(matches!(result, Err(PostProcessError::StartPrintNotFound { .. })));
    }

    #[test]
    fn comment_lines_before_start_print_are_tolerated() {
        let (result, state) = run(&["; a comment", "; another", "START_PRINT"]);
        assert!(result.is_ok());
        assert!(state.start_print_line.is_some());
    }
}
