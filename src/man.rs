//! Man-page loading and repositioning.
//!
//! The loader runs as a child on the slave side of a pseudoterminal so it
//! formats its output for a terminal of our size.  With `PAGER=lsp_cat`
//! the helper prefixes the payload with a sentinel line carrying the
//! authoritative page name; when the sentinel is missing we fall back to
//! detecting the classic `NAME(n) ... NAME(n)` heading.

use std::io::Read;

use anyhow::{Context, Result};
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use regex::bytes::RegexBuilder;

use crate::config::{expand_command, Options};
use crate::document::{Document, Source};
use crate::refs::{canonical, parse_reference, RefCache};
use crate::search::REFS_PATTERN;

/// Section heuristic captured before a reload, used to find the same spot
/// afterwards.
///
/// Word counts are unreliable under re-hyphenation, so empty lines take
/// over as soon as one is seen between the viewed position and the
/// header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reposition {
    /// Normalized header line content, or `None` at the top of the page.
    pub section: Option<String>,
    pub words: usize,
    pub elines: usize,
}

/// Parse the `<lsp-man-pn>NAME</lsp-man-pn>` sentinel line.
pub fn parse_sentinel(line: &[u8]) -> Option<String> {
    let line = match line.last() {
        Some(b'\n') => &line[..line.len() - 1],
        _ => line,
    };
    let text = std::str::from_utf8(line).ok()?;
    let rest = text.strip_prefix("<lsp-man-pn>")?;
    let name = rest.strip_suffix("</lsp-man-pn>")?;
    Some(name.to_string())
}

/// Check the first line for the `NAME(n) ... NAME(n)` heading of a
/// formatted manual page and return the page name.
pub fn detect_manpage(doc: &mut Document, man_case: bool) -> Result<Option<String>> {
    let Some(line) = doc.line_at_pos(0)? else {
        return Ok(None);
    };

    let pattern = format!("{REFS_PATTERN} {{2,}}.+ {{2,}}{REFS_PATTERN}");
    let regex = RegexBuilder::new(&pattern)
        .unicode(false)
        .build()
        .context("man-page heading regex failed to compile")?;

    let hay = line.normalized_sans_newline();
    if !regex.is_match(hay) {
        tracing::debug!(name = %doc.name, "not a manual page");
        return Ok(None);
    }

    let end = hay.iter().position(|&b| b == b')').map(|i| i + 1);
    let Some(end) = end else {
        return Ok(None);
    };
    let name = String::from_utf8_lossy(&hay[..end]).to_string();
    let name = canonical(&name, man_case);
    tracing::debug!(%name, "manual page detected");
    Ok(Some(name))
}

/// Split a loader command template into argv tokens with `%n`/`%s`
/// expanded.
fn loader_argv(template: &str, page: &str) -> Vec<String> {
    let (name, section) = parse_reference(page);
    template
        .split_whitespace()
        .map(|tok| expand_command(tok, &name, &section))
        .filter(|tok| !tok.is_empty())
        .collect()
}

/// Load `doc.name` through the configured man command on a PTY of the
/// given size.
///
/// Reads all output into the document and reaps the child.  Returns the
/// authoritative page name from the sentinel or the heading, if any.
pub fn exec_man(doc: &mut Document, opts: &Options, rows: u16, cols: u16) -> Result<Option<String>> {
    let pty = native_pty_system();
    let pair = pty
        .openpty(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| anyhow::anyhow!("openpty failed: {e}"))?;

    let argv = loader_argv(&opts.reload_command, &doc.name);
    anyhow::ensure!(!argv.is_empty(), "empty man loader command");

    let mut cmd = CommandBuilder::new(&argv[0]);
    cmd.args(&argv[1..]);
    // The helper emits the sentinel line and then cats the payload.  When
    // a MANPAGER is configured it shadows PAGER, so override that one.
    if std::env::var_os("MANPAGER").is_some() {
        cmd.env("MANPAGER", "lsp_cat");
    } else {
        cmd.env("PAGER", "lsp_cat");
    }

    let child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| anyhow::anyhow!("could not run {:?}: {e}", argv[0]))?;
    drop(pair.slave);

    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| anyhow::anyhow!("pty reader: {e}"))?;

    // Consume the first line eagerly to check for the sentinel; whatever
    // else arrived is fed back ahead of the remaining output.
    let mut head = Vec::new();
    let mut sentinel_name = None;
    let mut buf = [0u8; 512];
    loop {
        if head.contains(&b'\n') {
            break;
        }
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
            Err(e) if e.raw_os_error() == Some(5) => break,
            Err(e) => return Err(e).context("reading man output"),
        }
    }

    if let Some(nl) = head.iter().position(|&b| b == b'\n') {
        if let Some(name) = parse_sentinel(&head[..=nl]) {
            sentinel_name = Some(name);
            head.drain(..=nl);
        }
    }

    doc.pending = head;
    doc.attach_source(
        Source::Pty {
            reader,
            child,
            _master: pair.master,
        },
        0,
        None,
    );
    doc.read_all()?;

    doc.ftype.manpage = true;
    doc.ftype.lsp_loaded = true;

    if sentinel_name.is_some() {
        return Ok(sentinel_name);
    }
    detect_manpage(doc, opts.man_case_sensitivity)
}

/// Start the apropos enumerator and return the pseudo-document fed by its
/// pipe, with the first block read.
pub fn open_apropos(opts: &Options) -> Result<Document> {
    let mut child = std::process::Command::new("sh")
        .arg("-c")
        .arg(&opts.apropos_command)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .spawn()
        .with_context(|| format!("could not run {:?}", opts.apropos_command))?;
    let reader = child.stdout.take().expect("stdout was piped");

    let mut doc = Document::new("Apropos");
    doc.attach_source(Source::Child { reader, child }, 0, None);
    doc.read_block()?;
    Ok(doc)
}

/// Intern every page listed in the apropos document as a known-valid
/// reference.
///
/// Apropos lines read `xyz(nn) - description`; the part up to the closing
/// parenthesis is the reference.
pub fn apropos_create_grefs(doc: &mut Document, grefs: &mut RefCache, man_case: bool) -> Result<()> {
    doc.read_all()?;
    let save = doc.pos();
    doc.set_pos(0);
    while let Some(line) = doc.get_this_line()? {
        let hay = line.normalized_sans_newline();
        if let Some(end) = hay.iter().position(|&b| b == b')') {
            let spelling = String::from_utf8_lossy(&hay[..=end]);
            grefs.mark_valid(&canonical(&spelling, man_case));
        }
    }
    doc.set_pos(save);
    Ok(())
}

/// Whether the first byte of the normalized line makes it a section
/// header.
fn is_section_header(normalized: &[u8]) -> bool {
    matches!(normalized.first(), Some(&b) if b != b' ' && b != b'\n')
}

/// Capture the section/word/empty-line heuristic around `page_first`.
pub fn get_section(doc: &mut Document) -> Result<Reposition> {
    let save = doc.pos();
    doc.set_pos(doc.page_first);
    doc.goto_bol()?;

    let mut words = 0;
    let mut elines = 0;
    let mut past_words = false;
    let mut section = None;

    while doc.pos() > 0 {
        let Some(line) = doc.get_prev_line()? else {
            break;
        };
        if is_section_header(&line.normalized) {
            section = Some(
                String::from_utf8_lossy(line.normalized_sans_newline()).to_string(),
            );
            break;
        }
        if line.is_blank() {
            past_words = true;
            elines += 1;
        } else if !past_words {
            words += line.count_words();
        }
        doc.set_pos(line.pos);
    }

    doc.set_pos(save);
    Ok(Reposition {
        section,
        words,
        elines,
    })
}

/// After a reload, navigate back to the captured section and offset.
pub fn reposition(doc: &mut Document, rep: &Reposition) -> Result<()> {
    doc.set_pos(0);

    if let Some(section) = &rep.section {
        // Find the identically named header.
        loop {
            let start = doc.pos();
            let Some(line) = doc.line_from_here()? else {
                doc.set_pos(0);
                break;
            };
            if is_section_header(&line.normalized)
                && String::from_utf8_lossy(line.normalized_sans_newline()) == *section
            {
                doc.set_pos(start + line.len());
                break;
            }
        }
    }

    doc.forward_empty_lines(rep.elines)?;
    doc.forward_words(rep.words)?;
    doc.goto_bol()?;
    doc.page_first = doc.pos();
    Ok(())
}
