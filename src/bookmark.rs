//! C3 — bookmark registry and bookmarking byte encoder (spec §4.3).

use std::collections::HashMap;
use std::io::Write;

use crate::error::{PostProcessError, Result};

/// A byte-range handle reserved in the output stream for a line that may
/// need to be rewritten after the stream ends (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    /// The line text as it was written (including any padding, but not the
    /// trailing newline).
    pub original_text: String,
    /// Byte offset at which the line was written to the output sink.
    pub offset: u64,
    /// Byte length occupied by the line in the output, including its
    /// terminating newline.
    pub length: u64,
}

/// Opaque identity used to look up a [`Bookmark`] after emission.
pub type BookmarkKey = u64;

/// Tracks byte offset/length of every line the action layer elected to pad
/// for a later in-place rewrite.
#[derive(Debug, Default)]
pub struct BookmarkRegistry {
    bookmarks: HashMap<BookmarkKey, Bookmark>,
    next_key: BookmarkKey,
}

impl BookmarkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh, never-before-used key.
    pub fn allocate_key(&mut self) -> BookmarkKey {
        let key = self.next_key;
        self.next_key += 1;
        key
    }

    /// Records a bookmark under `key`. Fails if `key` was already recorded.
    pub fn record(
        &mut self,
        key: BookmarkKey,
        original_text: String,
        offset: u64,
        length: u64,
    ) -> Result<()> {
        if self.bookmarks.contains_key(&key) {
            return Err(PostProcessError::Internal(format!(
                "duplicate bookmark key {key}"
            )));
        }
        self.bookmarks.insert(
            key,
            Bookmark {
                original_text,
                offset,
                length,
            },
        );
        Ok(())
    }

    /// Looks up a bookmark by key; a miss is a typed error (spec §4.3).
    pub fn get(&self, key: BookmarkKey) -> Result<&Bookmark> {
        self.bookmarks
            .get(&key)
            .ok_or(PostProcessError::BookmarkMissing(key))
    }
}

/// A single item pushed into the [`BookmarkingEncoder`]: either a line of
/// text, or the "removed" sentinel that causes the encoder to skip emission
/// entirely (spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderLine {
    Text(String),
    Removed,
}

/// One unit of work for the encoder: a line plus an optional bookmark key to
/// record once it has been written.
#[derive(Debug, Clone)]
pub struct EncoderItem {
    pub line: EncoderLine,
    pub bookmark_key: Option<BookmarkKey>,
}

impl EncoderItem {
    pub fn text(text: impl Into<String>) -> Self {
        EncoderItem {
            line: EncoderLine::Text(text.into()),
            bookmark_key: None,
        }
    }

    pub fn bookmarked(text: impl Into<String>, key: BookmarkKey) -> Self {
        EncoderItem {
            line: EncoderLine::Text(text.into()),
            bookmark_key: Some(key),
        }
    }

    pub fn removed() -> Self {
        EncoderItem {
            line: EncoderLine::Removed,
            bookmark_key: None,
        }
    }
}

/// Consumes lines and writes `<line><newline>` to `sink`, recording a
/// bookmark for any item that carries a key (spec §4.3).
pub struct BookmarkingEncoder<W: Write> {
    sink: W,
    registry: BookmarkRegistry,
    offset: u64,
}

impl<W: Write> BookmarkingEncoder<W> {
    pub fn new(sink: W) -> Self {
        BookmarkingEncoder {
            sink,
            registry: BookmarkRegistry::new(),
            offset: 0,
        }
    }

    pub fn allocate_key(&mut self) -> BookmarkKey {
        self.registry.allocate_key()
    }

    pub fn current_offset(&self) -> u64 {
        self.offset
    }

    /// Encodes and writes `item`, recording its bookmark if present.
    /// `Removed` lines are skipped entirely: nothing is written and the
    /// running offset does not move.
    pub fn push(&mut self, item: EncoderItem) -> Result<()> {
        let text = match item.line {
            EncoderLine::Removed => return Ok(()),
            EncoderLine::Text(t) => t,
        };

        let mut encoded = text.clone().into_bytes();
        encoded.push(b'\n');
        let length = encoded.len() as u64;

        if let Some(key) = item.bookmark_key {
            self.registry.record(key, text, self.offset, length)?;
        }

        self.sink.write_all(&encoded)?;
        self.offset += length;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }

    /// Finishes the forward pass, returning the inner sink and the
    /// completed registry for use during finalisation.
    pub fn finish(mut self) -> Result<(W, BookmarkRegistry)> {
        self.flush()?;
        Ok((self.sink, self.registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_rejects_duplicate_keys() {
        let mut reg = BookmarkRegistry::new();
        reg.record(0, "a".into(), 0, 2).unwrap();
        let err = reg.record(0, "b".into(), 2, 2).unwrap_err();
        assert!(matches!(err, PostProcessError::Internal(_)));
    }

    #[test]
    fn registry_lookup_miss_is_typed_error() {
        let reg = BookmarkRegistry::new();
        let err = reg.get(42).unwrap_err();
        assert!(matches!(err, PostProcessError::BookmarkMissing(42)));
    }

    #[test]
    fn encoder_writes_line_plus_newline() {
        let mut buf = Vec::new();
        let mut enc = BookmarkingEncoder::new(&mut buf);
        enc.push(EncoderItem::text("G1 X10")).unwrap();
        enc.flush().unwrap();
        assert_eq!(buf, b"G1 X10\n");
    }

    #[test]
    fn removed_line_is_skipped_and_offset_unchanged() {
        let mut buf = Vec::new();
        let mut enc = BookmarkingEncoder::new(&mut buf);
        enc.push(EncoderItem::text("G1 X10")).unwrap();
        let offset_before = enc.current_offset();
        enc.push(EncoderItem::removed()).unwrap();
        assert_eq!(enc.current_offset(), offset_before);
    }

    #[test]
    fn bookmark_offset_matches_actual_write_position() {
        let mut buf = Vec::new();
        let mut enc = BookmarkingEncoder::new(&mut buf);
        enc.push(EncoderItem::text("first")).unwrap(); // 6 bytes incl newline
        let key = enc.allocate_key();
        enc.push(EncoderItem::bookmarked("second", key)).unwrap();
        let (_, registry) = enc.finish().unwrap();
        let bm = registry.get(key).unwrap();
        assert_eq!(bm.offset, 6);
        assert_eq!(bm.length, 7); // "second\n"
        assert_eq!(bm.original_text, "second");
    }

    #[test]
    fn bookmark_monotonicity_across_multiple_bookmarks() {
        let mut buf = Vec::new();
        let mut enc = BookmarkingEncoder::new(&mut buf);
        let key_a = enc.allocate_key();
        enc.push(EncoderItem::bookmarked("AAAA", key_a)).unwrap();
        let key_b = enc.allocate_key();
        enc.push(EncoderItem::bookmarked("BB", key_b)).unwrap();
        let (_, registry) = enc.finish().unwrap();

        let a = registry.get(key_a).unwrap();
        let b = registry.get(key_b).unwrap();
        assert!(a.offset < b.offset);
        assert!(a.offset + a.length <= b.offset);
    }

    #[test]
    fn bookmarked_line_padded_with_spaces_preserves_length_on_patch() {
        // Simulates: pad with spaces, later replace with shorter real content.
        let mut buf = Vec::new();
        let mut enc = BookmarkingEncoder::new(&mut buf);
        let key = enc.allocate_key();
        let padded = format!("; header{}", " ".repeat(20));
        enc.push(EncoderItem::bookmarked(padded.clone(), key))
            .unwrap();
        let (_, registry) = enc.finish().unwrap();
        let bm = registry.get(key).unwrap();
        assert_eq!(bm.length, (padded.len() + 1) as u64);
    }
}
