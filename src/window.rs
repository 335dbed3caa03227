//! C4 — sliding-window line processor (spec §4.4, §9).
//!
//! The window never hands out long-lived references to buffered lines.
//! Instead it hands out [`LineHandle`] values — plain sequence numbers that
//! double as the "generation" design note in spec §9 describes — and every
//! access re-validates the handle against the current buffer contents.
//! A handle that refers to a line already evicted from the window is a
//! detected error, not undefined behaviour.

use std::collections::VecDeque;

use crate::bookmark::{BookmarkKey, EncoderLine, EncoderItem};
use crate::error::{PostProcessError, Result};

/// Default number of lines of trailing context kept in the window.
pub const DEFAULT_LINES_BEHIND: usize = 20;
/// Default number of lines of leading context kept in the window.
pub const DEFAULT_LINES_AHEAD: usize = 100;

/// A callback-scoped handle to a buffered line: its 1-based original line
/// number, which also serves as its generation stamp. Valid only while the
/// line remains inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineHandle(u64);

impl LineHandle {
    pub fn line_number(self) -> u64 {
        self.0
    }

    /// Test-only constructor for callers that exercise a handle-consuming
    /// API without driving a full window (e.g. the dispatcher's unit tests).
    #[cfg(test)]
    pub(crate) fn for_test(n: u64) -> Self {
        LineHandle(n)
    }
}

/// Destination for lines (or removal markers) as they leave the window, in
/// stream order.
pub trait LineSink {
    fn push(&mut self, item: EncoderItem) -> Result<()>;
    fn allocate_key(&mut self) -> BookmarkKey;
}

impl<W: std::io::Write> LineSink for crate::bookmark::BookmarkingEncoder<W> {
    fn push(&mut self, item: EncoderItem) -> Result<()> {
        crate::bookmark::BookmarkingEncoder::push(self, item)
    }

    fn allocate_key(&mut self) -> BookmarkKey {
        crate::bookmark::BookmarkingEncoder::allocate_key(self)
    }
}

struct Slot {
    line_number: u64,
    text: EncoderLine,
    bookmark_key: Option<BookmarkKey>,
}

/// The callback-facing view of the window (spec §4.4's "context" object),
/// expressed as a trait so the action dispatcher and transform actions
/// never need to know which sink type the window is writing to.
pub trait LineCursor {
    fn text(&self, handle: LineHandle) -> Result<&str>;
    fn is_removed(&self, handle: LineHandle) -> Result<bool>;
    fn set_text(&mut self, handle: LineHandle, text: String) -> Result<()>;
    fn remove(&mut self, handle: LineHandle) -> Result<()>;
    fn set_bookmark(&mut self, handle: LineHandle, key: BookmarkKey) -> Result<()>;
    fn get_line(&self, handle: LineHandle, offset: isize) -> Option<LineHandle>;
    fn scan_forward(&self, handle: LineHandle, n: usize) -> Vec<LineHandle>;
    fn scan_back(&self, handle: LineHandle, n: usize) -> Vec<LineHandle>;
    fn allocate_bookmark_key(&mut self) -> BookmarkKey;
}

/// Ring-buffered forward-only line processor. Generic over the sink that
/// receives lines as they are evicted from the window.
pub struct Window<S: LineSink> {
    lines_behind: usize,
    lines_ahead: usize,
    capacity: usize,
    buf: VecDeque<Slot>,
    filled: bool,
    next_line_number: u64,
    sink: S,
}

impl<S: LineSink> Window<S> {
    pub fn new(sink: S, lines_behind: usize, lines_ahead: usize) -> Self {
        Window {
            lines_behind,
            lines_ahead,
            capacity: lines_behind + lines_ahead + 1,
            buf: VecDeque::with_capacity(lines_behind + lines_ahead + 1),
            filled: false,
            next_line_number: 1,
            sink,
        }
    }

    pub fn with_defaults(sink: S) -> Self {
        Self::new(sink, DEFAULT_LINES_BEHIND, DEFAULT_LINES_AHEAD)
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consumes the window and returns its sink. Call after [`Window::flush`]
    /// has drained every buffered line.
    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn allocate_bookmark_key(&mut self) -> BookmarkKey {
        self.sink.allocate_key()
    }

    /// Feeds one more input line into the window, invoking `callback` for
    /// every position whose turn as "current" has arrived (zero, one, or —
    /// during the initial fill — several times).
    pub fn feed_line<F>(&mut self, text: String, mut callback: F) -> Result<()>
    where
        F: FnMut(&mut Window<S>, LineHandle) -> Result<()>,
    {
        let slot = Slot {
            line_number: self.next_line_number,
            text: EncoderLine::Text(text),
            bookmark_key: None,
        };
        self.next_line_number += 1;

        if !self.filled {
            self.buf.push_back(slot);
            if self.buf.len() == self.capacity {
                self.filled = true;
                for idx in 0..=self.lines_behind {
                    self.invoke(idx, &mut callback)?;
                }
            }
            return Ok(());
        }

        let evicted = self
            .buf
            .pop_front()
            .ok_or_else(|| PostProcessError::Internal("window underflow on evict".into()))?;
        self.emit(evicted)?;
        self.buf.push_back(slot);
        self.invoke(self.lines_behind, &mut callback)
    }

    /// Call once all input lines have been fed. Invokes `callback` on every
    /// position that has not yet had a turn as "current", then pushes the
    /// remainder of the buffer to the sink.
    pub fn flush<F>(&mut self, mut callback: F) -> Result<()>
    where
        F: FnMut(&mut Window<S>, LineHandle) -> Result<()>,
    {
        let start = if self.filled { self.lines_behind + 1 } else { 0 };
        let end = self.buf.len();
        for idx in start..end {
            self.invoke(idx, &mut callback)?;
        }
        while let Some(slot) = self.buf.pop_front() {
            self.emit(slot)?;
        }
        Ok(())
    }

    fn invoke<F>(&mut self, idx: usize, callback: &mut F) -> Result<()>
    where
        F: FnMut(&mut Window<S>, LineHandle) -> Result<()>,
    {
        let line_number = self
            .buf
            .get(idx)
            .ok_or_else(|| PostProcessError::Internal(format!("no slot at window index {idx}")))?
            .line_number;
        callback(self, LineHandle(line_number))
    }

    fn emit(&mut self, slot: Slot) -> Result<()> {
        self.sink.push(EncoderItem {
            line: slot.text,
            bookmark_key: slot.bookmark_key,
        })
    }

    fn resolve(&self, handle: LineHandle) -> Result<usize> {
        let front = self
            .buf
            .front()
            .ok_or_else(|| PostProcessError::Internal("window is empty".into()))?;
        if handle.0 < front.line_number {
            return Err(PostProcessError::Internal(format!(
                "stale line handle: line {} has already left the window",
                handle.0
            )));
        }
        let idx = (handle.0 - front.line_number) as usize;
        if idx >= self.buf.len() {
            return Err(PostProcessError::Internal(format!(
                "line handle {} is beyond the window",
                handle.0
            )));
        }
        Ok(idx)
    }

    /// Current text of the line referenced by `handle`.
    pub fn text(&self, handle: LineHandle) -> Result<&str> {
        let idx = self.resolve(handle)?;
        match &self.buf[idx].text {
            EncoderLine::Text(s) => Ok(s.as_str()),
            EncoderLine::Removed => Ok(""),
        }
    }

    /// True if the line has been marked for removal (will not be emitted).
    pub fn is_removed(&self, handle: LineHandle) -> Result<bool> {
        let idx = self.resolve(handle)?;
        Ok(matches!(self.buf[idx].text, EncoderLine::Removed))
    }

    /// Replaces the text of the line referenced by `handle`.
    pub fn set_text(&mut self, handle: LineHandle, text: impl Into<String>) -> Result<()> {
        let idx = self.resolve(handle)?;
        self.buf[idx].text = EncoderLine::Text(text.into());
        Ok(())
    }

    /// Marks the line as removed: the encoder will skip emitting it.
    pub fn remove(&mut self, handle: LineHandle) -> Result<()> {
        let idx = self.resolve(handle)?;
        self.buf[idx].text = EncoderLine::Removed;
        Ok(())
    }

    /// Reserves a bookmark key for the line. May only be called once per
    /// line; a duplicate call is an error.
    pub fn set_bookmark(&mut self, handle: LineHandle, key: BookmarkKey) -> Result<()> {
        let idx = self.resolve(handle)?;
        if self.buf[idx].bookmark_key.is_some() {
            return Err(PostProcessError::Internal(format!(
                "line {} already carries a bookmark key",
                handle.0
            )));
        }
        self.buf[idx].bookmark_key = Some(key);
        Ok(())
    }

    /// Returns a handle to the line `offset` callback-steps from `handle`
    /// (negative = behind, positive = ahead), or `None` if it falls outside
    /// the window or the stream.
    pub fn get_line(&self, handle: LineHandle, offset: isize) -> Option<LineHandle> {
        let target = handle.0 as i64 + offset as i64;
        if target < 1 {
            return None;
        }
        let target = LineHandle(target as u64);
        self.resolve(target).ok().map(|_| target)
    }

    /// Handles for up to `n` lines ahead of `handle`, nearest first, stopping
    /// at the first one outside the window.
    pub fn scan_forward(&self, handle: LineHandle, n: usize) -> Vec<LineHandle> {
        let mut out = Vec::with_capacity(n);
        for k in 1..=n as isize {
            match self.get_line(handle, k) {
                Some(h) => out.push(h),
                None => break,
            }
        }
        out
    }

    /// Handles for up to `n` lines behind `handle`, nearest first, stopping
    /// at the first one outside the window.
    pub fn scan_back(&self, handle: LineHandle, n: usize) -> Vec<LineHandle> {
        let mut out = Vec::with_capacity(n);
        for k in 1..=n as isize {
            match self.get_line(handle, -k) {
                Some(h) => out.push(h),
                None => break,
            }
        }
        out
    }
}

impl<S: LineSink> LineCursor for Window<S> {
    fn text(&self, handle: LineHandle) -> Result<&str> {
        Window::text(self, handle)
    }

    fn is_removed(&self, handle: LineHandle) -> Result<bool> {
        Window::is_removed(self, handle)
    }

    fn set_text(&mut self, handle: LineHandle, text: String) -> Result<()> {
        Window::set_text(self, handle, text)
    }

    fn remove(&mut self, handle: LineHandle) -> Result<()> {
        Window::remove(self, handle)
    }

    fn set_bookmark(&mut self, handle: LineHandle, key: BookmarkKey) -> Result<()> {
        Window::set_bookmark(self, handle, key)
    }

    fn get_line(&self, handle: LineHandle, offset: isize) -> Option<LineHandle> {
        Window::get_line(self, handle, offset)
    }

    fn scan_forward(&self, handle: LineHandle, n: usize) -> Vec<LineHandle> {
        Window::scan_forward(self, handle, n)
    }

    fn scan_back(&self, handle: LineHandle, n: usize) -> Vec<LineHandle> {
        Window::scan_back(self, handle, n)
    }

    fn allocate_bookmark_key(&mut self) -> BookmarkKey {
        Window::allocate_bookmark_key(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default, Clone)]
    struct VecSink(Rc<RefCell<Vec<EncoderItem>>>);

    impl LineSink for VecSink {
        fn push(&mut self, item: EncoderItem) -> Result<()> {
            self.0.borrow_mut().push(item);
            Ok(())
        }

        fn allocate_key(&mut self) -> BookmarkKey {
            0
        }
    }

    fn lines(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("L{i}")).collect()
    }

    #[test]
    fn callback_sees_stream_from_the_start_after_first_fill() {
        let sink = VecSink::default();
        let mut window = Window::new(sink, 2, 2); // capacity 5
        let mut seen = Vec::new();
        for line in lines(5) {
            window
                .feed_line(line, |win, h| {
                    seen.push(win.text(h)?.to_string());
                    Ok(())
                })
                .unwrap();
        }
        // First fill (5 lines) triggers a catch-up over positions 0..=2 (lines_behind=2):
        // L1, L2, L3 are all presented before steady-state begins.
        assert_eq!(seen, vec!["L1", "L2", "L3"]);
    }

    #[test]
    fn steady_state_presents_one_line_per_push_after_fill() {
        let sink = VecSink::default();
        let mut window = Window::new(sink, 2, 2);
        let mut seen = Vec::new();
        for line in lines(8) {
            window
                .feed_line(line, |win, h| {
                    seen.push(win.text(h)?.to_string());
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(seen, vec!["L1", "L2", "L3", "L4", "L5", "L6"]);
    }

    #[test]
    fn flush_presents_remaining_lines_then_emits_everything() {
        let sink = VecSink::default();
        let mut window = Window::new(sink.clone(), 2, 2);
        let mut seen = Vec::new();
        for line in lines(8) {
            window
                .feed_line(line, |win, h| {
                    seen.push(win.text(h)?.to_string());
                    Ok(())
                })
                .unwrap();
        }
        window
            .flush(|win, h| {
                seen.push(win.text(h)?.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(
            seen,
            vec!["L1", "L2", "L3", "L4", "L5", "L6", "L7", "L8"]
        );

        let emitted: Vec<String> = sink
            .0
            .borrow()
            .iter()
            .map(|item| match &item.line {
                EncoderLine::Text(t) => t.clone(),
                EncoderLine::Removed => "<removed>".to_string(),
            })
            .collect();
        assert_eq!(emitted, lines(8));
    }

    #[test]
    fn flush_on_short_file_processes_every_line() {
        // Fewer lines than the window's capacity (5): the window never
        // reaches "filled", so flush must still walk every buffered line.
        let sink = VecSink::default();
        let mut window = Window::new(sink, 2, 2);
        let mut seen = Vec::new();
        for line in lines(3) {
            window
                .feed_line(line, |win, h| {
                    seen.push(win.text(h)?.to_string());
                    Ok(())
                })
                .unwrap();
        }
        assert!(seen.is_empty(), "no callback before the window fills");
        window
            .flush(|win, h| {
                seen.push(win.text(h)?.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec!["L1", "L2", "L3"]);
    }

    #[test]
    fn get_line_neighbourhood_matches_text_seen_k_steps_earlier_or_later() {
        let sink = VecSink::default();
        let mut window = Window::new(sink, 2, 2);
        for line in lines(8) {
            window
                .feed_line(line, |win, h| {
                    if win.text(h)? == "L4" {
                        assert_eq!(win.get_line(h, -1).and_then(|n| win.text(n).ok()), Some("L3"));
                        assert_eq!(win.get_line(h, 1).and_then(|n| win.text(n).ok()), Some("L5"));
                        assert_eq!(win.get_line(h, -2).and_then(|n| win.text(n).ok()), Some("L2"));
                        assert_eq!(win.get_line(h, 2).and_then(|n| win.text(n).ok()), Some("L6"));
                    }
                    Ok(())
                })
                .unwrap();
        }
    }

    #[test]
    fn get_line_out_of_window_returns_none() {
        let sink = VecSink::default();
        let mut window = Window::new(sink, 2, 2);
        for line in lines(8) {
            window
                .feed_line(line, |win, h| {
                    if win.text(h)? == "L4" {
                        assert!(win.get_line(h, -3).is_none());
                        assert!(win.get_line(h, 3).is_none());
                    }
                    Ok(())
                })
                .unwrap();
        }
    }

    #[test]
    fn scan_forward_returns_handles_nearest_first() {
        let sink = VecSink::default();
        let mut window = Window::new(sink, 2, 2);
        for line in lines(8) {
            window
                .feed_line(line, |win, h| {
                    if win.text(h)? == "L4" {
                        let fwd = win.scan_forward(h, 5);
                        let texts: Vec<&str> =
                            fwd.iter().map(|h| win.text(*h).unwrap()).collect();
                        assert_eq!(texts, vec!["L5", "L6"]);
                    }
                    Ok(())
                })
                .unwrap();
        }
    }

    #[test]
    fn scan_back_returns_handles_nearest_first() {
        let sink = VecSink::default();
        let mut window = Window::new(sink, 2, 2);
        for line in lines(8) {
            window
                .feed_line(line, |win, h| {
                    if win.text(h)? == "L4" {
                        let back = win.scan_back(h, 5);
                        let texts: Vec<&str> =
                            back.iter().map(|h| win.text(*h).unwrap()).collect();
                        assert_eq!(texts, vec!["L3", "L2"]);
                    }
                    Ok(())
                })
                .unwrap();
        }
    }

    #[test]
    fn set_text_replaces_line_content() {
        let sink = VecSink::default();
        let mut window = Window::new(sink.clone(), 1, 1);
        for line in lines(4) {
            window
                .feed_line(line, |win, h| {
                    if win.text(h)? == "L2" {
                        win.set_text(h, "REPLACED")?;
                    }
                    Ok(())
                })
                .unwrap();
        }
        window.flush(|_, _| Ok(())).unwrap();
        let emitted: Vec<String> = sink
            .0
            .borrow()
            .iter()
            .map(|item| match &item.line {
                EncoderLine::Text(t) => t.clone(),
                EncoderLine::Removed => "<removed>".to_string(),
            })
            .collect();
        assert_eq!(emitted, vec!["L1", "REPLACED", "L3", "L4"]);
    }

    #[test]
    fn remove_marks_line_as_skipped_on_emission() {
        let sink = VecSink::default();
        let mut window = Window::new(sink.clone(), 1, 1);
        for line in lines(4) {
            window
                .feed_line(line, |win, h| {
                    if win.text(h)? == "L2" {
                        win.remove(h)?;
                    }
                    Ok(())
                })
                .unwrap();
        }
        window.flush(|_, _| Ok(())).unwrap();
        let emitted: Vec<String> = sink
            .0
            .borrow()
            .iter()
            .map(|item| match &item.line {
                EncoderLine::Text(t) => t.clone(),
                EncoderLine::Removed => "<removed>".to_string(),
            })
            .collect();
        assert_eq!(emitted, vec!["L1", "<removed>", "L3", "L4"]);
    }

    #[test]
    fn set_bookmark_twice_on_same_line_is_an_error() {
        let sink = VecSink::default();
        let mut window = Window::new(sink, 1, 1);
        let mut saw_error = false;
        for line in lines(4) {
            let result = window.feed_line(line, |win, h| {
                if win.text(h)? == "L2" {
                    win.set_bookmark(h, 0)?;
                    win.set_bookmark(h, 1)?;
                }
                Ok(())
            });
            if result.is_err() {
                saw_error = true;
                break;
            }
        }
        assert!(saw_error, "duplicate bookmark on the same line must error");
    }

    #[test]
    fn stale_handle_access_after_eviction_is_an_error() {
        let sink = VecSink::default();
        let mut window = Window::new(sink, 1, 1); // capacity 3
        let mut stale: Option<LineHandle> = None;
        for line in lines(10) {
            window
                .feed_line(line, |win, h| {
                    if win.text(h)? == "L1" {
                        stale = Some(h);
                    }
                    Ok(())
                })
                .unwrap();
        }
        let stale = stale.expect("L1 must have been seen");
        assert!(window.text(stale).is_err());
    }
}
