//! Folding table of contents.
//!
//! Three levels built from indentation heuristics: level 0 lines start in
//! column 0, level 1 lines are indented exactly three spaces, level 2
//! lines are indented exactly seven spaces with a continuation indented at
//! least eleven.  This was made for manual pages, where it yields a handy
//! section outline; for anything else it is plain text folding.

use anyhow::Result;

use crate::document::Document;

/// One TOC entry: a line start offset and its indentation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocEntry {
    pub pos: usize,
    pub level: u8,
}

/// The TOC of one document.
///
/// `pointer` is the entry navigation currently works at, `first` the entry
/// at the top of the TOC page.  `last` is the entry following the page, or
/// `None` when the final entry is on the current page.
#[derive(Debug, Clone, Default)]
pub struct Toc {
    entries: Vec<TocEntry>,
    pub pointer: usize,
    pub first: usize,
    pub last: Option<usize>,
}

/// Leading space count and the byte that follows, on the normalized line.
fn indent_of(normalized: &[u8]) -> (usize, Option<u8>) {
    let spaces = normalized.iter().take_while(|&&b| b == b' ').count();
    (spaces, normalized.get(spaces).copied())
}

/// Build the TOC by scanning the whole document.
///
/// Preserves the reader position.  Returns an empty TOC for content
/// without any qualifying line.
pub fn build(doc: &mut Document) -> Result<Toc> {
    let pos_save = doc.pos();
    doc.set_pos(0);

    let mut metas: Vec<(usize, usize, Option<u8>)> = Vec::new();
    while let Some(line) = doc.get_this_line()? {
        let (spaces, next) = indent_of(&line.normalized);
        metas.push((line.pos, spaces, next));
    }
    doc.set_pos(pos_save);

    let mut entries = Vec::new();
    for (i, &(pos, spaces, next)) in metas.iter().enumerate() {
        let level = match (spaces, next) {
            (0, Some(b)) if b != b'\t' && b != b'{' && b != b'}' && b != b'\n' => Some(0),
            (3, Some(b)) if b != b' ' => Some(1),
            (7, Some(b)) if b != b' ' => {
                // Level 2 needs a continuation line indented by eleven or
                // more; at EOF the lookahead fails and no entry is made.
                match metas.get(i + 1) {
                    Some(&(_, next_spaces, _)) if next_spaces >= 11 => Some(2),
                    _ => None,
                }
            }
            _ => None,
        };
        if let Some(level) = level {
            debug_assert!(entries.last().map_or(true, |e: &TocEntry| e.pos < pos));
            entries.push(TocEntry { pos, level });
        }
    }

    Ok(Toc {
        entries,
        pointer: 0,
        first: 0,
        last: None,
    })
}

impl Toc {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, index: usize) -> Option<TocEntry> {
        self.entries.get(index).copied()
    }

    /// The entry the navigation pointer sits at.
    pub fn pointer_entry(&self) -> TocEntry {
        self.entries[self.pointer.min(self.entries.len().saturating_sub(1))]
    }

    /// Index of the entry starting exactly at `pos`, if it is visible at
    /// `level`.
    pub fn index_at_pos(&self, pos: usize, level: u8) -> Option<usize> {
        let idx = self.entries.partition_point(|e| e.pos < pos);
        match self.entries.get(idx) {
            Some(e) if e.pos == pos && e.level <= level => Some(idx),
            _ => None,
        }
    }

    /// First visible entry at or after `from`.
    pub fn next_visible(&self, from: usize, level: u8) -> Option<usize> {
        (from..self.entries.len()).find(|&i| self.entries[i].level <= level)
    }

    /// Last visible entry at or before `from`.
    pub fn prev_visible(&self, from: usize, level: u8) -> Option<usize> {
        (0..=from.min(self.entries.len().saturating_sub(1)))
            .rev()
            .find(|&i| self.entries[i].level <= level)
    }

    /// Move the pointer `n` visible entries forward and pin the page top
    /// there.
    pub fn fw(&mut self, mut n: usize, level: u8) {
        while n > 0 && self.pointer + 1 < self.entries.len() {
            self.pointer += 1;
            if self.entries[self.pointer].level <= level {
                n -= 1;
            }
        }
        self.first = self.pointer;
    }

    /// Move the pointer `n` visible entries backward and pin the page top
    /// there.
    pub fn bw(&mut self, mut n: usize, level: u8) {
        while n > 0 && self.pointer > 0 {
            self.pointer -= 1;
            if self.entries[self.pointer].level <= level {
                n -= 1;
            }
        }
        self.first = self.pointer;
    }

    /// Position the pointer at the entry with the given offset (or the
    /// nearest one toward it).
    pub fn rewind(&mut self, pos: usize) {
        let idx = self.entries.partition_point(|e| e.pos < pos);
        self.pointer = idx.min(self.entries.len().saturating_sub(1));
    }

    /// Position for a full last page: pointer to the final entry, then
    /// back up almost one page of visible entries.
    pub fn rewind_end(&mut self, page_rows: usize, level: u8) {
        self.pointer = self.entries.len().saturating_sub(1);
        self.bw(page_rows, level);
    }

    /// Move the pointer to the last visible entry before `file_pos`.
    ///
    /// Leaves the pointer untouched and returns false when there is none.
    pub fn move_to_prev(&mut self, file_pos: usize, level: u8) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let mut i = self.pointer.min(self.entries.len() - 1);
        loop {
            if self.entries[i].pos < file_pos && self.entries[i].level <= level {
                self.pointer = i;
                return true;
            }
            if i == 0 {
                return false;
            }
            i -= 1;
        }
    }

    /// Move the pointer to the first visible entry after `file_pos`.
    ///
    /// Leaves the pointer untouched and returns false when there is none.
    pub fn move_to_next(&mut self, file_pos: usize, level: u8) -> bool {
        let start = self.entries.partition_point(|e| e.pos <= file_pos);
        match self.next_visible(start, level) {
            Some(i) => {
                self.pointer = i;
                true
            }
            None => false,
        }
    }

    /// Translate the cursor row on the TOC page into the entry offset.
    pub fn offset_at_cursor(&self, cursor: usize, level: u8) -> Option<usize> {
        let mut count = 0;
        let mut idx = self.first;
        while let Some(e) = self.entries.get(idx) {
            if e.level <= level {
                if count == cursor {
                    return Some(e.pos);
                }
                count += 1;
            }
            idx += 1;
        }
        None
    }

    /// Adjust the page top to an entry visible at `level`, searching
    /// backward first, then forward.
    pub fn first_adjust(&mut self, level: u8) {
        if let Some(i) = self.prev_visible(self.first, level) {
            self.first = i;
        } else if let Some(i) = self.next_visible(self.first, level) {
            self.first = i;
        }
    }
}

/// The visible TOC entry whose line contains `pos`, if any.
pub fn pos_to_toc(doc: &mut Document, pos: usize) -> Result<Option<usize>> {
    let old_pos = doc.pos();
    doc.set_pos(pos);
    doc.goto_bol()?;
    let line_start = doc.pos();
    doc.set_pos(old_pos);

    let level = doc.toc_level;
    Ok(doc
        .toc
        .as_ref()
        .and_then(|toc| toc.index_at_pos(line_start, level)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANISH: &[u8] = b"NAME\n   lsp - pager\nSYNOPSIS\n   lsp [opts]\n";

    fn toc_of(bytes: &[u8]) -> (Document, Toc) {
        let mut doc = Document::from_bytes("t", bytes);
        let toc = build(&mut doc).unwrap();
        (doc, toc)
    }

    #[test]
    fn test_build_two_levels() {
        let (_, toc) = toc_of(MANISH);
        assert_eq!(toc.len(), 4);
        assert_eq!(toc.entry(0).unwrap(), TocEntry { pos: 0, level: 0 });
        assert_eq!(toc.entry(1).unwrap(), TocEntry { pos: 5, level: 1 });
        assert_eq!(toc.entry(2).unwrap(), TocEntry { pos: 20, level: 0 });
        assert_eq!(toc.entry(3).unwrap(), TocEntry { pos: 29, level: 1 });
    }

    #[test]
    fn test_build_level_two_needs_continuation() {
        let bytes = b"TOP\n       deep entry\n           continuation\n";
        let (_, toc) = toc_of(bytes);
        assert_eq!(toc.len(), 2);
        assert_eq!(toc.entry(1).unwrap().level, 2);
    }

    #[test]
    fn test_build_level_two_rejected_without_continuation() {
        let bytes = b"TOP\n       deep entry\nother\n";
        let (_, toc) = toc_of(bytes);
        assert_eq!(toc.len(), 2);
        assert!(toc.entries.iter().all(|e| e.level != 2));
    }

    #[test]
    fn test_build_level_two_at_eof() {
        // The lookahead finds no next line, so no level-2 entry is made.
        let bytes = b"TOP\n       deep entry\n";
        let (_, toc) = toc_of(bytes);
        assert_eq!(toc.len(), 1);
    }

    #[test]
    fn test_build_skips_braces_and_blank() {
        let bytes = b"{\nreal\n}\n\n";
        let (_, toc) = toc_of(bytes);
        assert_eq!(toc.len(), 1);
        assert_eq!(toc.entry(0).unwrap().pos, 2);
    }

    #[test]
    fn test_build_normalizes_before_classifying() {
        // A bold heading still counts as a level-0 line.
        let bytes = b"N\x08NA\x08AM\x08ME\x08E\n   sub\n";
        let (_, toc) = toc_of(bytes);
        assert_eq!(toc.len(), 2);
        assert_eq!(toc.entry(0).unwrap().level, 0);
    }

    #[test]
    fn test_empty_document_has_empty_toc() {
        let (_, toc) = toc_of(b"");
        assert!(toc.is_empty());
    }

    #[test]
    fn test_fw_bw_skip_invisible() {
        let (_, mut toc) = toc_of(MANISH);
        toc.fw(1, 0);
        // Level-1 entries are skipped at visible level 0.
        assert_eq!(toc.pointer_entry().pos, 20);
        toc.bw(1, 0);
        assert_eq!(toc.pointer_entry().pos, 0);
    }

    #[test]
    fn test_fw_all_levels() {
        let (_, mut toc) = toc_of(MANISH);
        toc.fw(1, 2);
        assert_eq!(toc.pointer_entry().pos, 5);
    }

    #[test]
    fn test_index_at_pos_respects_level() {
        let (_, toc) = toc_of(MANISH);
        assert_eq!(toc.index_at_pos(20, 0), Some(2));
        assert_eq!(toc.index_at_pos(5, 0), None);
        assert_eq!(toc.index_at_pos(5, 1), Some(1));
        assert_eq!(toc.index_at_pos(7, 1), None);
    }

    #[test]
    fn test_pos_to_toc_maps_line_interior() {
        let (mut doc, toc) = toc_of(MANISH);
        doc.toc = Some(toc);
        doc.toc_level = 1;
        // Offset 7 is inside the "   lsp - pager" line starting at 5.
        assert_eq!(pos_to_toc(&mut doc, 7).unwrap(), Some(1));
        doc.toc_level = 0;
        assert_eq!(pos_to_toc(&mut doc, 7).unwrap(), None);
    }

    #[test]
    fn test_pos_to_toc_roundtrip_for_entries() {
        let (mut doc, toc) = toc_of(MANISH);
        doc.toc = Some(toc.clone());
        doc.toc_level = 2;
        for (i, e) in toc.entries.iter().enumerate() {
            assert_eq!(pos_to_toc(&mut doc, e.pos).unwrap(), Some(i));
        }
    }

    #[test]
    fn test_move_to_prev_next() {
        let (_, mut toc) = toc_of(MANISH);
        toc.pointer = 3;
        assert!(toc.move_to_prev(20, 0));
        assert_eq!(toc.pointer_entry().pos, 0);
        assert!(toc.move_to_next(0, 0));
        assert_eq!(toc.pointer_entry().pos, 20);
        assert!(!toc.move_to_next(29, 0));
    }

    #[test]
    fn test_offset_at_cursor() {
        let (_, mut toc) = toc_of(MANISH);
        toc.first = 0;
        assert_eq!(toc.offset_at_cursor(1, 0), Some(20));
        assert_eq!(toc.offset_at_cursor(1, 2), Some(5));
    }

    #[test]
    fn test_rewind_end() {
        let (_, mut toc) = toc_of(MANISH);
        toc.rewind_end(10, 2);
        assert_eq!(toc.first, 0);
        toc.rewind_end(1, 2);
        assert_eq!(toc.pointer_entry().pos, 20);
    }

    #[test]
    fn test_first_adjust_falls_back() {
        let (_, mut toc) = toc_of(b"   only sub\ntop\n");
        // First entry is level 1; at level 0 adjust moves forward to the
        // level-0 entry.
        toc.first = 0;
        toc.first_adjust(0);
        assert_eq!(toc.entries[toc.first].level, 0);
    }
}
