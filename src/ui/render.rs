//! Page rendering.
//!
//! One page is drawn cell by cell: each payload character carries the
//! layered combination of the running SGR state, its overstrike
//! emphasis, any search-match highlight, and (in TOC mode) the cursor
//! row.  Tabs expand against the logical column, `\r` shows as `^M`, NUL
//! as `^@`, and long lines either wrap onto further window rows or get
//! chopped with a `>` marker.

use anyhow::Result;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Modifier;

use crate::document::{char_len, decode_char, sgr_len, Document, Layout};
use crate::search::Searcher;
use crate::style::{decode_sgr, PairId, PairTable, BOLD_PAIR, DEFAULT_PAIR, REVERSE_PAIR, UL_PAIR};

/// Everything one page draw needs.
pub struct RenderCtx<'a> {
    pub doc: &'a mut Document,
    pub pairs: &'a mut PairTable,
    /// Present when highlight mode is on and matches should be drawn.
    pub searcher: Option<Searcher<'a>>,
    pub layout: Layout,
    pub chop_lines: bool,
    pub line_numbers: bool,
    /// Horizontal shift in cells.
    pub shift: u8,
}

/// Width of the line-number gutter, `%7ld|`.
const GUTTER: u16 = 8;

/// Overstrike emphasis of a single glyph.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Overstrike {
    None,
    Bold,
    ItalicUnderline,
    BoldItalic,
}

impl Overstrike {
    fn attrs(self) -> (Modifier, PairId) {
        match self {
            Overstrike::None => (Modifier::empty(), DEFAULT_PAIR),
            Overstrike::Bold => (Modifier::BOLD, BOLD_PAIR),
            Overstrike::ItalicUnderline => (Modifier::ITALIC | Modifier::UNDERLINED, UL_PAIR),
            Overstrike::BoldItalic => (Modifier::BOLD | Modifier::ITALIC, BOLD_PAIR),
        }
    }
}

/// Classify and consume the overstrike prefixes at `i`.
///
/// Returns the new index (at the payload character) and the emphasis.
/// `_\bX` is italic underline, `X\bX` bold, `_\bX\bX` bold italic; tabs
/// are never treated as overstruck.
fn take_overstrikes(raw: &[u8], mut i: usize) -> (usize, Overstrike) {
    let mut prefixes: Vec<char> = Vec::new();
    loop {
        let cl = char_len(&raw[i..]);
        if i + cl < raw.len() && raw[i + cl] == b'\x08' && raw[i] != b'\t' {
            let (ch, _) = decode_char(&raw[i..]);
            prefixes.push(ch);
            i += cl + 1;
            continue;
        }
        break;
    }

    if prefixes.is_empty() {
        return (i, Overstrike::None);
    }
    let (payload, _) = decode_char(&raw[i..]);
    let emphasis = match (prefixes.len(), prefixes[0]) {
        (1, '_') if payload != '_' => Overstrike::ItalicUnderline,
        (1, _) => Overstrike::Bold,
        (_, '_') if payload != '_' => Overstrike::BoldItalic,
        (_, _) => Overstrike::Bold,
    };
    (i, emphasis)
}

/// Decode the SGR state already passed in the head of a line, for pages
/// that start in the middle of a long physical line.
fn preload_leading_sgr(
    doc: &mut Document,
    pairs: &mut PairTable,
    attr: &mut Modifier,
    pair: &mut PairId,
) -> Result<()> {
    let pos = doc.pos();
    let Some(line) = doc.line_at_pos(pos)? else {
        return Ok(());
    };
    let head = &line.raw[..(pos - line.pos).min(line.len())];

    let mut i = 0;
    while i < head.len() {
        if let Some(l) = sgr_len(&head[i..]) {
            decode_sgr(&head[i..i + l], attr, pair, pairs);
            i += l;
        } else {
            i += char_len(&head[i..]);
        }
    }
    Ok(())
}

/// What a payload character expands to on screen.
fn expansion(ch: char, col: usize, layout: &Layout) -> (String, usize) {
    match ch {
        '\t' => {
            let n = layout.tab_width - (col % layout.tab_width);
            (" ".repeat(n), n)
        }
        '\r' if !layout.keep_cr => ("^M".to_string(), 2),
        '\0' => ("^@".to_string(), 2),
        _ => {
            let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(1).max(1);
            (ch.to_string(), w)
        }
    }
}

/// Draw one page of the current document into `buf`.
///
/// The bottom row of `area` is left for the status line.  In normal mode
/// the document position ends up at `page_last` so a subsequent forward
/// command starts correctly.
pub fn display_page(ctx: &mut RenderCtx, buf: &mut Buffer, area: Rect) -> Result<()> {
    let rows = area.height.saturating_sub(1);
    let gutter = if ctx.line_numbers { GUTTER } else { 0 };
    let maxx = area.width.saturating_sub(gutter).max(1);
    let toc_mode = ctx.doc.mode.toc;

    if !toc_mode {
        // Nothing lies past EOF; re-render the page we already have.
        if ctx.doc.at_eof() && ctx.doc.pos() != 0 {
            let first = ctx.doc.page_first;
            ctx.doc.set_pos(first);
        }
        ctx.doc.page_first = ctx.doc.pos();
    }
    ctx.doc.cmatch_cell = None;

    // In TOC mode the page walks entries starting at the pinned top.
    let mut toc_idx = if toc_mode {
        let toc = ctx.doc.toc.as_ref().expect("TOC mode without TOC");
        toc.next_visible(toc.first, ctx.doc.toc_level)
    } else {
        None
    };
    let mut top_line: Option<usize> = None;
    let mut toc_last = None;

    let current_match = ctx.doc.current_match;
    let mut y: u16 = 0;

    'page: while y < rows {
        let mut attr = Modifier::empty();
        let mut pair = DEFAULT_PAIR;

        // Long lines spill over pages; pick up their SGR state.
        if !toc_mode && !ctx.doc.at_bol()? {
            preload_leading_sgr(ctx.doc, ctx.pairs, &mut attr, &mut pair)?;
        }

        let line = if toc_mode {
            match toc_idx {
                Some(idx) => {
                    let toc = ctx.doc.toc.as_ref().expect("checked above");
                    let pos = toc.entry(idx).expect("visible index").pos;
                    ctx.doc.line_at_pos(pos)?
                }
                None => None,
            }
        } else {
            ctx.doc.line_from_here()?
        };
        let Some(line) = line else {
            break;
        };

        if top_line.is_none() {
            top_line = Some(line.pos);
        }

        if ctx.line_numbers {
            let n = ctx.doc.pos2line(line.pos)?;
            let text = format!("{n:7}|");
            buf.set_string(area.x, area.y + y, text, ctx.pairs.style(Modifier::empty(), DEFAULT_PAIR));
        }

        let matches = match ctx.searcher.as_mut() {
            Some(searcher) => searcher.line_matches(&line),
            None => Vec::new(),
        };
        let is_refs = ctx
            .searcher
            .as_ref()
            .map(|s| s.is_refs)
            .unwrap_or(false);

        // TOC cursor handling: on the last page the cursor may not point
        // past the final entry.
        let cursor_row = if toc_mode && ctx.searcher.is_none() {
            let toc = ctx.doc.toc.as_ref().expect("checked above");
            let at_last = toc
                .next_visible(toc_idx.unwrap_or(0) + 1, ctx.doc.toc_level)
                .is_none();
            if at_last && ctx.doc.toc_cursor > y as usize {
                ctx.doc.toc_cursor = y as usize;
            }
            Some(ctx.doc.toc_cursor)
        } else {
            None
        };

        let mut lindex = 0;
        let mut x: u16 = gutter;
        let mut line_x: usize = 0;
        let mut col: usize = 0;
        let mut cm_pending = false;

        'line: while lindex < line.len() {
            // Zero-width control runs first.
            while let Some(l) = sgr_len(&line.raw[lindex..]) {
                decode_sgr(&line.raw[lindex..lindex + l], &mut attr, &mut pair, ctx.pairs);
                lindex += l;
                if lindex >= line.len() {
                    break 'line;
                }
            }
            let (after, emphasis) = take_overstrikes(&line.raw, lindex);
            lindex = after;
            if lindex >= line.len() {
                break 'line;
            }

            // Match overlay for this glyph.
            let mut in_match = false;
            for m in &matches {
                if m.so <= lindex && lindex < m.eo {
                    in_match = true;
                }
                if Some(line.pos + m.so) == current_match.map(|c| c.so) {
                    if lindex >= m.eo && !cm_pending {
                        // First cell after the current match.
                        ctx.doc.cmatch_cell = Some((area.y + y, area.x + x));
                        cm_pending = true;
                    }
                }
            }

            let (ch, ch_len) = decode_char(&line.raw[lindex..]);

            if ch == '\n' {
                if !toc_mode {
                    ctx.doc.page_last = line.pos + lindex + 1;
                }
                break 'line;
            }

            // Effective attributes, most specific layer wins.
            let style = if in_match {
                if is_refs {
                    ctx.pairs.style(Modifier::UNDERLINED, UL_PAIR)
                } else {
                    ctx.pairs.style(Modifier::REVERSED, REVERSE_PAIR)
                }
            } else if cursor_row == Some(y as usize) {
                ctx.pairs.style(Modifier::REVERSED, REVERSE_PAIR)
            } else if emphasis != Overstrike::None {
                let (a, p) = emphasis.attrs();
                ctx.pairs.style(a, p)
            } else {
                ctx.pairs.style(attr, pair)
            };

            // Chop replaces the cell in the final column by `>`, unless
            // the line ends right here anyway.
            let only_newline_left = {
                let mut j = lindex + ch_len;
                while let Some(l) = sgr_len(&line.raw[j..]) {
                    j += l;
                }
                j >= line.len() || line.raw[j] == b'\n'
            };

            let (text, _width) = expansion(ch, col, &ctx.layout);
            for cell in text.chars() {
                // Horizontal shift suppresses leading cells but keeps
                // the layout counters running.
                if line_x >= ctx.shift as usize {
                    if ctx.chop_lines && x == area.width - 1 && !only_newline_left {
                        buf.set_string(area.x + x, area.y + y, ">", style);
                        // Skip the rest of the physical line.
                        if !toc_mode {
                            let eol = line.pos + line.len();
                            ctx.doc.set_pos(eol);
                            ctx.doc.page_last = eol;
                        }
                        break 'line;
                    }

                    if x >= gutter + maxx {
                        // Wrap onto the next window row.
                        y += 1;
                        x = gutter;
                        if y >= rows {
                            if !toc_mode {
                                ctx.doc.page_last = line.pos + lindex;
                                ctx.doc.set_pos(line.pos + lindex);
                            }
                            break 'page;
                        }
                    }

                    let cw = unicode_width::UnicodeWidthChar::width(cell).unwrap_or(1).max(1) as u16;
                    buf.set_string(area.x + x, area.y + y, cell.to_string(), style);
                    x += cw;
                }
                line_x += 1;
                col += 1;
            }

            if !toc_mode {
                ctx.doc.page_last = line.pos + lindex + ch_len;
            }
            lindex += ch_len;
        }

        // A match ending exactly at the newline still needs its cursor
        // cell.
        if !cm_pending {
            if let (Some(cm), true) = (current_match, !matches.is_empty()) {
                let ends_here = matches
                    .iter()
                    .any(|m| line.pos + m.so == cm.so && lindex >= m.eo);
                if ends_here {
                    ctx.doc.cmatch_cell = Some((area.y + y, area.x + x));
                }
            }
        }

        y += 1;

        if toc_mode {
            let toc = ctx.doc.toc.as_ref().expect("checked above");
            let next = toc.next_visible(toc_idx.unwrap_or(0) + 1, ctx.doc.toc_level);
            toc_last = next;
            match next {
                Some(idx) => toc_idx = Some(idx),
                None => break 'page,
            }
        }
    }

    if toc_mode {
        let level = ctx.doc.toc_level;
        if let Some(top) = top_line {
            let idx = {
                let toc = ctx.doc.toc.as_ref().expect("checked above");
                toc.index_at_pos(top, level)
            };
            if let (Some(idx), Some(toc)) = (idx, ctx.doc.toc.as_mut()) {
                toc.first = idx;
            }
        }
        if let Some(toc) = ctx.doc.toc.as_mut() {
            toc.last = toc_last;
        }
    } else {
        let page_last = ctx.doc.page_last;
        ctx.doc.set_pos(page_last);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Match;
    use crate::refs::{RefCache, Verifier};
    use crate::search::{compile_refs, compile_user};

    fn render_to_buffer(ctx: &mut RenderCtx, width: u16, height: u16) -> Buffer {
        let area = Rect::new(0, 0, width, height);
        let mut buf = Buffer::empty(area);
        display_page(ctx, &mut buf, area).unwrap();
        buf
    }

    fn row_text(buf: &Buffer, y: u16) -> String {
        let area = buf.area;
        (0..area.width)
            .map(|x| buf[(x, y)].symbol().chars().next().unwrap_or(' '))
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    fn plain_ctx<'a>(doc: &'a mut Document, pairs: &'a mut PairTable) -> RenderCtx<'a> {
        RenderCtx {
            doc,
            pairs,
            searcher: None,
            layout: Layout::new(80),
            chop_lines: false,
            line_numbers: false,
            shift: 0,
        }
    }

    #[test]
    fn test_render_plain_lines() {
        let mut doc = Document::from_bytes("t", b"first\nsecond\n");
        let mut pairs = PairTable::new(true);
        let mut ctx = plain_ctx(&mut doc, &mut pairs);
        let buf = render_to_buffer(&mut ctx, 80, 10);
        assert_eq!(row_text(&buf, 0), "first");
        assert_eq!(row_text(&buf, 1), "second");
        assert_eq!(doc.page_first, 0);
        assert_eq!(doc.page_last, 13);
        assert_eq!(doc.pos(), 13);
    }

    #[test]
    fn test_render_sgr_bold_cells() {
        let mut doc = Document::from_bytes("t", b"Hello \x1b[1mworld\x1b[m\n");
        let mut pairs = PairTable::new(true);
        let mut ctx = plain_ctx(&mut doc, &mut pairs);
        let buf = render_to_buffer(&mut ctx, 80, 5);
        assert_eq!(row_text(&buf, 0), "Hello world");
        assert!(!buf[(5, 0)].style().add_modifier.contains(Modifier::BOLD));
        for x in 6..11 {
            assert!(
                buf[(x, 0)].style().add_modifier.contains(Modifier::BOLD),
                "cell {x} should be bold"
            );
        }
        // The reset before the newline leaves no trailing attribute.
        assert!(!buf[(11, 0)].style().add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_render_overstrike_bold() {
        let mut doc = Document::from_bytes("t", b"b\x08bo\x08ol\x08ld\x08d\n");
        let mut pairs = PairTable::new(true);
        let mut ctx = plain_ctx(&mut doc, &mut pairs);
        let buf = render_to_buffer(&mut ctx, 80, 5);
        assert_eq!(row_text(&buf, 0), "bold");
        for x in 0..4 {
            assert!(buf[(x, 0)].style().add_modifier.contains(Modifier::BOLD));
        }
    }

    #[test]
    fn test_render_overstrike_italic_underline() {
        let mut doc = Document::from_bytes("t", b"_\x08it\n");
        let mut pairs = PairTable::new(true);
        let mut ctx = plain_ctx(&mut doc, &mut pairs);
        let buf = render_to_buffer(&mut ctx, 80, 5);
        assert_eq!(row_text(&buf, 0), "it");
        assert!(buf[(0, 0)]
            .style()
            .add_modifier
            .contains(Modifier::UNDERLINED));
        assert!(!buf[(1, 0)]
            .style()
            .add_modifier
            .contains(Modifier::UNDERLINED));
    }

    #[test]
    fn test_render_carriage_return_expansion() {
        let mut doc = Document::from_bytes("t", b"abc\rdef\n");
        let mut pairs = PairTable::new(true);
        let mut ctx = plain_ctx(&mut doc, &mut pairs);
        let buf = render_to_buffer(&mut ctx, 80, 5);
        assert_eq!(row_text(&buf, 0), "abc^Mdef");
    }

    #[test]
    fn test_render_nul_expansion() {
        let mut doc = Document::from_bytes("t", b"a\x00b\n");
        let mut pairs = PairTable::new(true);
        let mut ctx = plain_ctx(&mut doc, &mut pairs);
        let buf = render_to_buffer(&mut ctx, 80, 5);
        assert_eq!(row_text(&buf, 0), "a^@b");
    }

    #[test]
    fn test_render_tab_expansion() {
        let mut doc = Document::from_bytes("t", b"a\tb\n");
        let mut pairs = PairTable::new(true);
        let mut ctx = plain_ctx(&mut doc, &mut pairs);
        let buf = render_to_buffer(&mut ctx, 80, 5);
        assert_eq!(row_text(&buf, 0), "a       b");
    }

    #[test]
    fn test_render_wraps_long_line() {
        let mut doc = Document::from_bytes("t", b"abcdefghijklmno\n");
        let mut pairs = PairTable::new(true);
        let mut ctx = RenderCtx {
            layout: Layout::new(10),
            ..plain_ctx(&mut doc, &mut pairs)
        };
        let buf = render_to_buffer(&mut ctx, 10, 5);
        assert_eq!(row_text(&buf, 0), "abcdefghij");
        assert_eq!(row_text(&buf, 1), "klmno");
    }

    #[test]
    fn test_render_page_break_mid_line_sets_page_last() {
        let mut doc = Document::from_bytes("t", b"abcdefghijklmnopqrst\n");
        let mut pairs = PairTable::new(true);
        let mut ctx = RenderCtx {
            layout: Layout::new(10),
            ..plain_ctx(&mut doc, &mut pairs)
        };
        // One content row: the line spills past the page.
        let buf = render_to_buffer(&mut ctx, 10, 2);
        assert_eq!(row_text(&buf, 0), "abcdefghij");
        assert_eq!(doc.page_last, 10);
        assert_eq!(doc.pos(), 10);
    }

    #[test]
    fn test_render_chop_lines() {
        let mut doc = Document::from_bytes("t", b"abcdefghijklmno\nshort\n");
        let mut pairs = PairTable::new(true);
        let mut ctx = RenderCtx {
            chop_lines: true,
            layout: Layout::new(10),
            ..plain_ctx(&mut doc, &mut pairs)
        };
        let buf = render_to_buffer(&mut ctx, 10, 5);
        assert_eq!(row_text(&buf, 0), "abcdefghi>");
        assert_eq!(row_text(&buf, 1), "short");
    }

    #[test]
    fn test_render_horizontal_shift() {
        let mut doc = Document::from_bytes("t", b"abcdef\n");
        let mut pairs = PairTable::new(true);
        let mut ctx = RenderCtx {
            shift: 2,
            ..plain_ctx(&mut doc, &mut pairs)
        };
        let buf = render_to_buffer(&mut ctx, 80, 5);
        assert_eq!(row_text(&buf, 0), "cdef");
    }

    #[test]
    fn test_render_line_numbers_gutter() {
        let mut doc = Document::from_bytes("t", b"one\ntwo\n");
        let mut pairs = PairTable::new(true);
        let mut ctx = RenderCtx {
            line_numbers: true,
            ..plain_ctx(&mut doc, &mut pairs)
        };
        let buf = render_to_buffer(&mut ctx, 80, 5);
        assert_eq!(row_text(&buf, 0), "      1|one");
        assert_eq!(row_text(&buf, 1), "      2|two");
    }

    #[test]
    fn test_render_search_match_standout_and_cursor() {
        let mut doc = Document::from_bytes("t", b"Hello \x1b[1mworld\x1b[m\n");
        doc.current_match = Some(Match { so: 11, eo: 14 });
        doc.mode.set_search();
        doc.mode.highlight = true;
        let re = compile_user("orl", false).unwrap();
        let mut grefs = RefCache::new();
        let verifier = Verifier::default();
        let mut pairs = PairTable::new(true);
        let mut ctx = RenderCtx {
            doc: &mut doc,
            pairs: &mut pairs,
            searcher: Some(Searcher {
                regex: &re,
                is_refs: false,
                grefs: &mut grefs,
                verifier: &verifier,
            }),
            layout: Layout::new(80),
            chop_lines: false,
            line_numbers: false,
            shift: 0,
        };
        let buf = render_to_buffer(&mut ctx, 80, 5);
        for x in 7..10 {
            assert!(
                buf[(x, 0)].style().add_modifier.contains(Modifier::REVERSED),
                "cell {x} should be standout"
            );
        }
        assert!(!buf[(6, 0)].style().add_modifier.contains(Modifier::REVERSED));
        // Cursor cell sits right after the match.
        assert_eq!(doc.cmatch_cell, Some((0, 10)));
    }

    #[test]
    fn test_render_refs_match_underline() {
        let mut doc = Document::from_bytes("t", b"See lsp(1) here\n");
        doc.current_match = Some(Match { so: 4, eo: 10 });
        doc.mode.set_refs();
        doc.mode.highlight = true;
        let re = compile_refs().unwrap();
        let mut grefs = RefCache::new();
        let verifier = Verifier {
            enabled: false,
            ..Verifier::default()
        };
        let mut pairs = PairTable::new(true);
        let mut ctx = RenderCtx {
            doc: &mut doc,
            pairs: &mut pairs,
            searcher: Some(Searcher {
                regex: &re,
                is_refs: true,
                grefs: &mut grefs,
                verifier: &verifier,
            }),
            layout: Layout::new(80),
            chop_lines: false,
            line_numbers: false,
            shift: 0,
        };
        let buf = render_to_buffer(&mut ctx, 80, 5);
        for x in 4..10 {
            assert!(
                buf[(x, 0)]
                    .style()
                    .add_modifier
                    .contains(Modifier::UNDERLINED),
                "cell {x} should be underlined"
            );
        }
    }

    #[test]
    fn test_render_toc_page() {
        let bytes = b"NAME\n   lsp - pager\nSYNOPSIS\n   lsp [opts]\n";
        let mut doc = Document::from_bytes("t", bytes);
        doc.toc = Some(crate::toc::build(&mut doc).unwrap());
        doc.mode.toc = true;
        doc.toc_level = 0;
        let mut pairs = PairTable::new(true);
        let mut ctx = plain_ctx(&mut doc, &mut pairs);
        let buf = render_to_buffer(&mut ctx, 80, 5);
        assert_eq!(row_text(&buf, 0), "NAME");
        assert_eq!(row_text(&buf, 1), "SYNOPSIS");
        assert_eq!(row_text(&buf, 2), "");
    }

    #[test]
    fn test_render_toc_all_levels() {
        let bytes = b"NAME\n   lsp - pager\nSYNOPSIS\n   lsp [opts]\n";
        let mut doc = Document::from_bytes("t", bytes);
        doc.toc = Some(crate::toc::build(&mut doc).unwrap());
        doc.mode.toc = true;
        doc.toc_level = 1;
        let mut pairs = PairTable::new(true);
        let mut ctx = plain_ctx(&mut doc, &mut pairs);
        let buf = render_to_buffer(&mut ctx, 80, 6);
        assert_eq!(row_text(&buf, 0), "NAME");
        assert_eq!(row_text(&buf, 1), "   lsp - pager");
        assert_eq!(row_text(&buf, 2), "SYNOPSIS");
        assert_eq!(row_text(&buf, 3), "   lsp [opts]");
    }

    #[test]
    fn test_render_empty_document() {
        let mut doc = Document::from_bytes("t", b"");
        let mut pairs = PairTable::new(true);
        let mut ctx = plain_ctx(&mut doc, &mut pairs);
        let buf = render_to_buffer(&mut ctx, 80, 5);
        assert_eq!(row_text(&buf, 0), "");
    }

    #[test]
    fn test_render_passes_non_sgr_escape_verbatim() {
        let mut doc = Document::from_bytes("t", b"a\x1b[2Jb\n");
        let mut pairs = PairTable::new(true);
        let mut ctx = plain_ctx(&mut doc, &mut pairs);
        let buf = render_to_buffer(&mut ctx, 80, 5);
        // The escape is not SGR; its bytes land on screen as characters.
        let row = row_text(&buf, 0);
        assert!(row.contains('a') && row.contains('b'));
        assert!(row.contains('['));
    }
}
