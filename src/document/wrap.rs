//! Window-line partitioning and motion.
//!
//! Physical lines can be wider than the window.  Partitioning simulates
//! cell output (tab expansion, `^M` expansion, multibyte widths, zero-width
//! control runs) to find the raw offsets where a line wraps, and the motion
//! helpers translate "n window lines forward/backward" into reader
//! positions.

use anyhow::{bail, Result};
use unicode_width::UnicodeWidthChar;

use super::line::{char_len, decode_char, sgr_len, Line};
use super::Document;

/// Width-dependent layout parameters shared by wrapping and rendering.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    /// Usable window width in cells.
    pub width: usize,
    /// Tab stops every this many cells.
    pub tab_width: usize,
    /// Pass `\r` through instead of expanding it to `^M`.
    pub keep_cr: bool,
}

impl Layout {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            tab_width: 8,
            keep_cr: false,
        }
    }

    /// Cell width of the payload character starting at `bytes`, at column
    /// `col`.
    pub(crate) fn cell_width(&self, bytes: &[u8], col: usize) -> usize {
        match bytes.first() {
            None | Some(b'\n') => 0,
            Some(b'\t') => self.tab_width - (col % self.tab_width),
            Some(b'\r') if !self.keep_cr => 2,
            Some(0) => 2,
            _ => {
                let (ch, _) = decode_char(bytes);
                ch.width().unwrap_or(1).max(1)
            }
        }
    }
}

/// Advance past the zero-width control run at `i`: SGR sequences and
/// overstrike prefix pairs.  Returns the index of the payload character.
pub(crate) fn skip_control_run(raw: &[u8], mut i: usize) -> usize {
    loop {
        if let Some(l) = sgr_len(&raw[i..]) {
            i += l;
            continue;
        }
        let cl = char_len(&raw[i..]);
        if i + cl < raw.len() && raw[i + cl] == b'\x08' && raw[i] != b'\t' {
            i += cl + 1;
            continue;
        }
        return i;
    }
}

impl Line {
    /// Partition the line into window lines for the given layout.
    ///
    /// Records in `self.wlines` the raw offset where each window line
    /// starts.  A trailing window line that would contain only the newline
    /// is not counted.
    pub fn add_wlines(&mut self, layout: &Layout) {
        let mut wlines = vec![0];
        let mut col = 0;
        let mut i = 0;
        let mut fresh_wline = false;

        while i < self.raw.len() {
            if col >= layout.width {
                wlines.push(i);
                col = 0;
                fresh_wline = true;
            }

            i = skip_control_run(&self.raw, i);
            if i >= self.raw.len() {
                break;
            }

            if self.raw[i] == b'\n' {
                if fresh_wline {
                    wlines.pop();
                }
                break;
            }
            fresh_wline = false;

            col += layout.cell_width(&self.raw[i..], col);
            i += char_len(&self.raw[i..]);
        }

        self.wlines = wlines;
    }
}

impl Document {
    /// Advance the reader forward by `n` window lines.
    pub fn wline_fw(&mut self, mut n: usize, layout: &Layout) -> Result<()> {
        while n > 0 {
            let Some(mut line) = self.line_from_here()? else {
                return Ok(());
            };
            line.add_wlines(layout);
            if n < line.wlines.len() {
                self.set_pos(line.pos + line.wlines[n]);
                return Ok(());
            }
            n -= line.wlines.len();
            self.set_pos(line.pos + line.len());
        }
        Ok(())
    }

    /// Move the reader backward by `n` window lines.
    ///
    /// Must be called with the reader at the top of the current page.
    pub fn wline_bw(&mut self, mut n: usize, layout: &Layout) -> Result<()> {
        if self.pos() == 0 || n == 0 {
            return Ok(());
        }

        let page_top = self.pos();
        let Some(mut line) = self.get_this_line()? else {
            return self.goto_last_wpage(n, layout);
        };
        self.set_pos(line.pos);
        line.add_wlines(layout);

        let Some(wline) = line.wlines.iter().position(|&w| line.pos + w == page_top) else {
            bail!("cannot find start of current page at {}", page_top);
        };

        if n <= wline {
            self.set_pos(line.pos + line.wlines[wline - n]);
            return Ok(());
        }
        n -= wline;

        // Step across previous physical lines, consuming their window
        // lines from the bottom.
        while n > 0 {
            if self.pos() == 0 {
                break;
            }
            self.set_prev_line()?;
            let Some(mut line) = self.get_this_line()? else {
                break;
            };
            self.set_pos(line.pos);
            line.add_wlines(layout);

            if n <= line.wlines.len() {
                self.set_pos(line.pos + line.wlines[line.wlines.len() - n]);
                break;
            }
            n -= line.wlines.len();
        }
        Ok(())
    }

    /// Read to EOF and position at the top of the last renderable page of
    /// `rows` window lines.
    pub fn goto_last_wpage(&mut self, rows: usize, layout: &Layout) -> Result<()> {
        self.read_all()?;
        let size = self.size.unwrap_or(self.seek());
        let mut boundary = size;
        let mut need = rows;

        while need > 0 && boundary > 0 {
            self.set_pos(boundary - 1);
            let Some(mut line) = self.get_this_line()? else {
                break;
            };
            line.add_wlines(layout);
            if line.wlines.len() >= need {
                self.set_pos(line.pos + line.wlines[line.wlines.len() - need]);
                return Ok(());
            }
            need -= line.wlines.len();
            boundary = line.pos;
        }

        self.set_pos(0);
        Ok(())
    }

    /// Advance the reader by `n` physical lines (chop-lines motion).
    pub fn forward_lines(&mut self, n: usize) -> Result<()> {
        let mut seen = 0;
        while seen < n {
            match self.getch()? {
                Some(b'\n') => seen += 1,
                Some(_) => {}
                None => break,
            }
        }
        Ok(())
    }

    /// Move the reader back by `n` physical lines.
    pub fn backward_lines(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            if self.pos() == 0 {
                break;
            }
            self.set_prev_line()?;
        }
        Ok(())
    }

    /// Consume lines until `n` empty lines have passed.
    pub fn forward_empty_lines(&mut self, mut n: usize) -> Result<()> {
        while n > 0 {
            let Some(line) = self.line_from_here()? else {
                break;
            };
            if line.is_blank() {
                n -= 1;
            }
        }
        Ok(())
    }

    /// Scroll forward `n` window lines (or physical lines when chopping).
    ///
    /// Starts from the top of the current page; a no-op when the page
    /// already reaches EOF.
    pub fn cmd_forward(&mut self, n: usize, layout: &Layout, chop: bool) -> Result<()> {
        self.set_pos(self.page_first);
        if self.size == Some(self.page_last) {
            return Ok(());
        }
        if chop {
            self.forward_lines(n)
        } else {
            self.wline_fw(n, layout)
        }
    }

    /// Scroll backward `n` window lines (or physical lines when chopping)
    /// from the top of the current page.
    pub fn cmd_backward(&mut self, n: usize, layout: &Layout, chop: bool) -> Result<()> {
        self.set_pos(self.page_first);
        if chop {
            self.backward_lines(n)
        } else {
            self.wline_bw(n, layout)
        }
    }

    /// Advance line-wise until the running word count would exceed
    /// `target`, positioning at the start of the line that crosses it.
    pub fn forward_words(&mut self, target: usize) -> Result<()> {
        let mut sum = 0;
        loop {
            let start = self.pos();
            let Some(line) = self.line_from_here()? else {
                break;
            };
            sum += line.count_words();
            if sum > target {
                self.set_pos(start);
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn layout(width: usize) -> Layout {
        Layout::new(width)
    }

    #[test]
    fn test_add_wlines_short_line() {
        let mut line = Line::new(0, b"short\n".to_vec());
        line.add_wlines(&layout(80));
        assert_eq!(line.wlines, vec![0]);
    }

    #[test]
    fn test_add_wlines_wraps_at_width() {
        // 15 payload chars at width 10 wrap into two window lines.
        let mut line = Line::new(0, b"abcdefghijklmno\n".to_vec());
        line.add_wlines(&layout(10));
        assert_eq!(line.wlines, vec![0, 10]);
    }

    #[test]
    fn test_add_wlines_exact_width_not_counted() {
        // A line of exactly the window width leaves the newline as the only
        // content of the continuation, which is not counted.
        let mut line = Line::new(0, b"0123456789\n".to_vec());
        line.add_wlines(&layout(10));
        assert_eq!(line.wlines, vec![0]);
    }

    #[test]
    fn test_add_wlines_sgr_zero_width() {
        let mut line = Line::new(0, b"\x1b[1mabcdefghij\x1b[mklm\n".to_vec());
        line.add_wlines(&layout(10));
        assert_eq!(line.wlines.len(), 2);
        // The continuation starts at the closing SGR sequence.
        assert_eq!(line.wlines[1], 14);
    }

    #[test]
    fn test_add_wlines_tab_expansion() {
        // Tab expands to the next multiple of 8: "a\tbb..." at width 10
        // puts 'a' + 7 tab cells + 2 chars on the first window line.
        let mut line = Line::new(0, b"a\tbbbb\n".to_vec());
        line.add_wlines(&layout(10));
        assert_eq!(line.wlines, vec![0, 4]);
    }

    #[test]
    fn test_add_wlines_carriage_return_two_cells() {
        // \r counts as the two cells of "^M".
        let mut line = Line::new(0, b"abc\rdef\n".to_vec());
        line.add_wlines(&layout(6));
        assert_eq!(line.wlines, vec![0, 5]);
    }

    #[test]
    fn test_add_wlines_keep_cr() {
        let mut line = Line::new(0, b"abc\rdef\n".to_vec());
        let mut l = layout(6);
        l.keep_cr = true;
        line.add_wlines(&l);
        assert_eq!(line.wlines, vec![0, 6]);
    }

    #[test]
    fn test_wline_fw_positions_at_boundary() {
        let mut doc = Document::from_bytes("t", b"abcdefghijklmno\n");
        doc.wline_fw(1, &layout(10)).unwrap();
        assert_eq!(doc.pos(), 10);
    }

    #[test]
    fn test_wline_fw_across_lines() {
        let mut doc = Document::from_bytes("t", b"one\ntwo\nthree\n");
        doc.wline_fw(2, &layout(80)).unwrap();
        assert_eq!(doc.pos(), 8);
    }

    #[test]
    fn test_wline_bw_within_line() {
        let mut doc = Document::from_bytes("t", b"abcdefghijklmno\n");
        doc.set_pos(10);
        doc.page_first = 10;
        doc.wline_bw(1, &layout(10)).unwrap();
        assert_eq!(doc.pos(), 0);
    }

    #[test]
    fn test_wline_bw_across_lines() {
        let mut doc = Document::from_bytes("t", b"one\ntwo\nthree\n");
        doc.set_pos(8);
        doc.wline_bw(2, &layout(80)).unwrap();
        assert_eq!(doc.pos(), 0);
    }

    #[test]
    fn test_fw_then_bw_roundtrip() {
        let mut doc = Document::from_bytes("t", b"one\ntwo\nthree\nfour\nfive\n");
        let l = layout(80);
        doc.set_pos(4);
        doc.wline_fw(2, &l).unwrap();
        let there = doc.pos();
        doc.wline_bw(2, &l).unwrap();
        assert_eq!(doc.pos(), 4);
        doc.wline_fw(2, &l).unwrap();
        assert_eq!(doc.pos(), there);
    }

    #[test]
    fn test_goto_last_wpage() {
        let mut doc = Document::from_bytes("t", b"1\n2\n3\n4\n5\n");
        doc.goto_last_wpage(2, &layout(80)).unwrap();
        // Last two lines start at offset 6.
        assert_eq!(doc.pos(), 6);
    }

    #[test]
    fn test_goto_last_wpage_short_file() {
        let mut doc = Document::from_bytes("t", b"only\n");
        doc.goto_last_wpage(10, &layout(80)).unwrap();
        assert_eq!(doc.pos(), 0);
    }

    #[test]
    fn test_goto_last_wpage_wrapped_line() {
        // One physical line of three window lines; a two-row page starts
        // at the second window line.
        let mut doc = Document::from_bytes("t", b"aaaaabbbbbccc\n");
        doc.goto_last_wpage(2, &layout(5)).unwrap();
        assert_eq!(doc.pos(), 5);
    }

    #[test]
    fn test_forward_lines_chop() {
        let mut doc = Document::from_bytes("t", b"one\ntwo\nthree\n");
        doc.forward_lines(2).unwrap();
        assert_eq!(doc.pos(), 8);
    }

    #[test]
    fn test_backward_lines() {
        let mut doc = Document::from_bytes("t", b"one\ntwo\nthree\n");
        doc.set_pos(8);
        doc.backward_lines(2).unwrap();
        assert_eq!(doc.pos(), 0);
    }

    #[test]
    fn test_forward_empty_lines() {
        let mut doc = Document::from_bytes("t", b"a\n\nb\n\nc\n");
        doc.forward_empty_lines(2).unwrap();
        assert_eq!(doc.pos(), 6);
    }

    #[test]
    fn test_forward_words() {
        let mut doc = Document::from_bytes("t", b"one two\nthree four five\nsix\n");
        doc.forward_words(3).unwrap();
        // Sum exceeds 3 within the second line, so stay at its start.
        assert_eq!(doc.pos(), 8);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn wlines_start_at_zero_and_ascend(
                bytes in proptest::collection::vec(any::<u8>(), 1..200),
                width in 2usize..40,
            ) {
                let mut line = Line::new(0, bytes);
                line.add_wlines(&Layout::new(width));
                prop_assert_eq!(line.wlines[0], 0);
                prop_assert!(line.wlines.windows(2).all(|w| w[0] < w[1]));
                prop_assert!(line.wlines.iter().all(|&w| w < line.raw.len().max(1)));
            }

            #[test]
            fn fw_bw_roundtrip_on_line_starts(
                nlines in 1usize..20,
                steps in 1usize..10,
            ) {
                let bytes: Vec<u8> = (0..nlines)
                    .flat_map(|i| format!("line number {i}\n").into_bytes())
                    .collect();
                let mut doc = Document::from_bytes("t", &bytes);
                let l = Layout::new(80);
                let steps = steps.min(nlines - 1);
                doc.wline_fw(steps, &l).unwrap();
                let there = doc.pos();
                doc.wline_bw(steps, &l).unwrap();
                prop_assert_eq!(doc.pos(), 0);
                doc.wline_fw(steps, &l).unwrap();
                prop_assert_eq!(doc.pos(), there);
            }
        }
    }
}
