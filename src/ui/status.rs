//! The status line at the bottom of the window.

use anyhow::Result;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Modifier;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::document::Document;
use crate::style::{PairTable, REVERSE_PAIR};

const HELP_HINT: &str = " ('h'elp / 'q'uit)";

/// Display name of a document; stdin has none and gets a synthetic one.
pub fn display_name(doc: &Document) -> &str {
    if doc.name.is_empty() {
        "*stdin*"
    } else {
        &doc.name
    }
}

/// Cut a string down to at most `cols` display columns, on character
/// boundaries.  Document names are arbitrary UTF-8 and may carry wide
/// characters.
fn truncate_columns(text: &mut String, cols: usize) {
    let mut used = 0;
    for (i, ch) in text.char_indices() {
        let cw = ch.width().unwrap_or(1).max(1);
        if used + cw > cols {
            text.truncate(i);
            return;
        }
        used += cw;
    }
}

/// Compose the status line text: document name and line position on the
/// left, a transient prompt centered, the help hint on the right.
fn status_text(doc: &mut Document, prompt: Option<&str>, width: usize) -> Result<String> {
    let mut left = String::new();
    if doc.ftype.manpage {
        left.push_str("Manual page ");
    }
    left.push_str(display_name(doc));

    let line_no = doc.pos2line(doc.page_first)?;
    if doc.size.is_none() || doc.seek() < doc.size.unwrap_or(0) {
        left.push_str(&format!(" line {line_no}"));
    } else {
        left.push_str(&format!(" line {line_no}/{}", doc.lines_count()));
    }

    let mut text = left;
    truncate_columns(&mut text, width);

    if let Some(prompt) = prompt {
        let start = width.saturating_sub(prompt.width()) / 2;
        truncate_columns(&mut text, start);
        let used = text.width();
        if used < start {
            text.push_str(&" ".repeat(start - used));
        }
        text.push_str(prompt);
    }

    let used = text.width();
    if used + HELP_HINT.width() <= width {
        let pad = width - HELP_HINT.width() - used;
        text.push_str(&" ".repeat(pad));
        text.push_str(HELP_HINT);
    }

    Ok(text)
}

/// Draw the status line into the bottom row of `area`.
pub fn render_status_line(
    doc: &mut Document,
    prompt: Option<&str>,
    pairs: &PairTable,
    buf: &mut Buffer,
    area: Rect,
) -> Result<()> {
    if area.height == 0 {
        return Ok(());
    }
    let y = area.y + area.height - 1;
    let width = area.width as usize;
    let style = pairs.style(Modifier::REVERSED, REVERSE_PAIR);

    let mut text = status_text(doc, prompt, width)?;
    let used = text.width();
    if used < width {
        text.push_str(&" ".repeat(width - used));
    }
    buf.set_string(area.x, y, text, style);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_stdin() {
        let doc = Document::from_bytes("", b"x\n");
        assert_eq!(display_name(&doc), "*stdin*");
        let doc = Document::from_bytes("file.txt", b"x\n");
        assert_eq!(display_name(&doc), "file.txt");
    }

    #[test]
    fn test_status_text_fully_read_shows_total() {
        let mut doc = Document::from_bytes("f", b"a\nb\nc\n");
        doc.page_first = 2;
        let text = status_text(&mut doc, None, 80).unwrap();
        assert!(text.starts_with("f line 2/3"), "{text:?}");
        assert!(text.ends_with(HELP_HINT));
    }

    #[test]
    fn test_status_text_manpage_prefix() {
        let mut doc = Document::from_bytes("lsp(1)", b"x\n");
        doc.ftype.manpage = true;
        let text = status_text(&mut doc, None, 80).unwrap();
        assert!(text.starts_with("Manual page lsp(1) line 1/1"));
    }

    #[test]
    fn test_status_text_centers_prompt() {
        let mut doc = Document::from_bytes("f", b"x\n");
        let text = status_text(&mut doc, Some("Pattern not found"), 80).unwrap();
        let start = text.find("Pattern not found").unwrap();
        assert!((25..40).contains(&start), "prompt at {start}");
    }

    #[test]
    fn test_status_text_truncates_multibyte_name_on_char_boundary() {
        // A long UTF-8 name must not be cut mid-character.
        let name = "ä".repeat(60);
        let mut doc = Document::from_bytes(name, b"x\n");
        let text = status_text(&mut doc, None, 40).unwrap();
        assert!(text.width() <= 40, "{} columns", text.width());
        assert!(text.starts_with("ääää"));
    }

    #[test]
    fn test_status_text_counts_wide_characters() {
        // CJK characters occupy two columns each.
        let name = "漢".repeat(30);
        let mut doc = Document::from_bytes(name, b"x\n");
        let text = status_text(&mut doc, Some("note"), 24).unwrap();
        assert!(text.width() <= 24, "{} columns", text.width());
        assert!(text.contains("note"));
    }

    #[test]
    fn test_truncate_columns() {
        let mut s = "ab漢cd".to_string();
        truncate_columns(&mut s, 3);
        // The wide character does not fit in the remaining column.
        assert_eq!(s, "ab");
        let mut s = "ab漢cd".to_string();
        truncate_columns(&mut s, 4);
        assert_eq!(s, "ab漢");
        let mut s = "short".to_string();
        truncate_columns(&mut s, 40);
        assert_eq!(s, "short");
    }

    #[test]
    fn test_render_status_line_fills_row() {
        let mut doc = Document::from_bytes("f", b"x\n");
        let pairs = PairTable::new(true);
        let area = Rect::new(0, 0, 40, 5);
        let mut buf = Buffer::empty(area);
        render_status_line(&mut doc, None, &pairs, &mut buf, area).unwrap();
        assert!(buf[(0, 4)]
            .style()
            .add_modifier
            .contains(Modifier::REVERSED));
    }
}
