//! Regex search over documents.
//!
//! Matches are computed against the normalized view of each line and
//! translated back to raw byte offsets through `normalize_count`.  The
//! same machinery drives user searches and reference highlighting; in refs
//! mode every candidate goes through the validation cache and invalid ones
//! are skipped.
//!
//! The regex engine runs in byte mode so offsets stay byte offsets even
//! for non-UTF-8 input.

use anyhow::{Context, Result};
use regex::bytes::{Regex, RegexBuilder};

use crate::document::{
    char_len, normalize, normalize_count, skip_control_run, ActiveRegex, Document, Layout, Line,
    Match,
};
use crate::refs::{RefCache, Verifier};
use crate::toc;

/// Token shape of a man-page reference like `printf(3)` or `foo(3posix)`.
pub const REFS_PATTERN: &str = r"[A-Za-z0-9.:_+-]+\((n|[0-9])[^)]{0,8}\)";

/// Search direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// Window geometry the search alignment works with.
#[derive(Debug, Clone, Copy)]
pub struct ViewGeom {
    /// Total window rows including the status line.
    pub maxy: usize,
    pub layout: Layout,
    pub chop_lines: bool,
    /// Align matches to the top window line instead of the emacs-like
    /// half-page policy.
    pub match_top: bool,
}

/// Compile the user search pattern.
///
/// Returns the engine's error text for the status line on bad patterns.
pub fn compile_user(pattern: &str, case_sensitive: bool) -> std::result::Result<Regex, String> {
    RegexBuilder::new(pattern)
        .unicode(false)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| e.to_string())
}

/// Compile the fixed reference pattern.  Failure here is a programming
/// error and fatal.
pub fn compile_refs() -> Result<Regex> {
    RegexBuilder::new(REFS_PATTERN)
        .unicode(false)
        .build()
        .context("reference regex failed to compile")
}

/// One search pass: the compiled expression plus the validation context
/// used in refs mode.
pub struct Searcher<'a> {
    pub regex: &'a Regex,
    pub is_refs: bool,
    pub grefs: &'a mut RefCache,
    pub verifier: &'a Verifier,
}

impl Searcher<'_> {
    fn validate_span(&mut self, line: &Line, nso: usize, neo: usize) -> bool {
        if !self.is_refs {
            return true;
        }
        let spelling = String::from_utf8_lossy(&line.normalized_sans_newline()[nso..neo]);
        self.grefs.validate(&spelling, self.verifier)
    }

    /// All matches in a line, left to right, as line-relative raw spans.
    ///
    /// Invalid references are filtered out.  Zero-length matches advance
    /// by one payload character so collection always terminates.
    pub fn line_matches(&mut self, line: &Line) -> Vec<Match> {
        let hay = line.normalized_sans_newline();
        let mut out = Vec::new();
        let mut at = 0;

        while at <= hay.len() {
            let Some(m) = self.regex.find_at(hay, at) else {
                break;
            };
            if self.validate_span(line, m.start(), m.end()) {
                out.push(Match {
                    so: normalize_count(&line.raw, m.start()),
                    eo: normalize_count(&line.raw, m.end()),
                });
            }
            at = if m.end() > m.start() {
                m.end()
            } else {
                m.end() + char_len(&hay[m.end()..]).max(1)
            };
        }

        out
    }

    /// First match at or after the current reader position, line by line
    /// to EOF.  Restores the reader position; validation is the caller's
    /// business.
    fn file_next_candidate(&mut self, doc: &mut Document) -> Result<Option<Match>> {
        let start_pos = doc.pos();
        let mut result = None;

        loop {
            let Some(line) = doc.get_this_line()? else {
                break;
            };
            let hay = line.normalized_sans_newline();
            let offset = if start_pos > line.pos {
                normalize(&line.raw[..(start_pos - line.pos).min(line.len())])
                    .len()
                    .min(hay.len())
            } else {
                0
            };

            if let Some(m) = self.regex.find_at(hay, offset) {
                result = Some(Match {
                    so: line.pos + normalize_count(&line.raw, m.start()),
                    eo: line.pos + normalize_count(&line.raw, m.end()),
                });
                break;
            }
        }

        doc.set_pos(start_pos);
        Ok(result)
    }

    /// Like `file_next_candidate`, but visits only TOC lines visible at
    /// the current level.
    fn toc_next_candidate(&mut self, doc: &mut Document) -> Result<Option<Match>> {
        if doc.toc.is_none() {
            return Ok(None);
        }
        let start_pos = doc.pos();
        let start_pointer = doc.toc.as_ref().unwrap().pointer;
        let level = doc.toc_level;
        let mut result = None;

        loop {
            let Some(line) = doc.get_this_line()? else {
                break;
            };
            let hay = line.normalized_sans_newline();
            let offset = if start_pos > line.pos {
                normalize(&line.raw[..(start_pos - line.pos).min(line.len())])
                    .len()
                    .min(hay.len())
            } else {
                0
            };

            if let Some(m) = self.regex.find_at(hay, offset) {
                result = Some(Match {
                    so: line.pos + normalize_count(&line.raw, m.start()),
                    eo: line.pos + normalize_count(&line.raw, m.end()),
                });
                break;
            }

            let mut toc = doc.toc.take().expect("toc checked above");
            let moved = toc.move_to_next(line.pos, level);
            let next_pos = toc.pointer_entry().pos;
            doc.toc = Some(toc);
            if !moved {
                break;
            }
            doc.set_pos(next_pos);
        }

        doc.set_pos(start_pos);
        if let Some(toc) = doc.toc.as_mut() {
            toc.pointer = start_pointer;
        }
        Ok(result)
    }

    /// Scan backward from a prepared line: the last match in each line
    /// wins, stepping to previous lines until one matches.
    fn find_prev_match(
        &mut self,
        doc: &mut Document,
        mut line: Option<Line>,
    ) -> Result<Option<Match>> {
        while let Some(current) = line {
            let matches = self.line_matches(&current);
            if let Some(last) = matches.last() {
                return Ok(Some(Match {
                    so: current.pos + last.so,
                    eo: current.pos + last.eo,
                }));
            }
            doc.set_pos(current.pos);
            line = if doc.mode.toc {
                let level = doc.toc_level;
                let pos = doc.pos();
                let prev = if let Some(toc) = doc.toc.as_mut() {
                    if toc.move_to_prev(pos, level) {
                        Some(toc.pointer_entry().pos)
                    } else {
                        None
                    }
                } else {
                    None
                };
                match prev {
                    Some(pos) => {
                        doc.set_pos(pos);
                        doc.get_this_line()?
                    }
                    None => None,
                }
            } else {
                doc.get_prev_line()?
            };
        }
        Ok(None)
    }
}

/// Whether `pos` is visible on the current page (TOC folding included).
pub fn pos_is_current_page(doc: &mut Document, pos: usize) -> Result<bool> {
    if !doc.mode.toc {
        return Ok(doc.page_first <= pos && pos < doc.page_last);
    }
    let Some(toc) = doc.toc.as_ref() else {
        return Ok(false);
    };
    let Some(first) = toc.entry(toc.first) else {
        return Ok(false);
    };
    let below_last = match toc.last.and_then(|i| toc.entry(i)) {
        Some(last) => last.pos > pos,
        // The final TOC entry is on this page.
        None => true,
    };
    if first.pos <= pos && below_last {
        return Ok(toc::pos_to_toc(doc, pos)?.is_some());
    }
    Ok(false)
}

/// Grow a zero-length match so stepping from it makes progress: one
/// control run plus one character, or a single byte at line end.
fn extend_zero_length(doc: &mut Document, m: Match) -> Result<Match> {
    if m.so != m.eo {
        return Ok(m);
    }
    let Some(line) = doc.line_at_pos(m.so)? else {
        return Ok(Match {
            so: m.so,
            eo: m.so + 1,
        });
    };
    let rel = m.so - line.pos;
    let eo = if rel >= line.len() {
        m.so + 1
    } else {
        let j = skip_control_run(&line.raw, rel);
        line.pos + j + char_len(&line.raw[j..]).max(1)
    };
    Ok(Match { so: m.so, eo })
}

fn enter_found_match(doc: &mut Document, is_refs: bool, m: Match) {
    if is_refs {
        doc.mode.set_refs();
        doc.active_regex = ActiveRegex::Refs;
    } else {
        doc.mode.set_search();
        doc.active_regex = ActiveRegex::Search;
    }
    doc.mode.highlight = true;
    doc.current_match = Some(m);
}

/// Find the next match and align the view around it.
///
/// Returns false when the pattern was not found; the document position is
/// then restored to the top of the page.
pub fn search_next(searcher: &mut Searcher, doc: &mut Document, geom: &ViewGeom) -> Result<bool> {
    let same_kind = if searcher.is_refs {
        doc.mode.is_refs()
    } else {
        doc.mode.is_search()
    };

    // Continue behind the current match if it is on screen, else start at
    // the top of the page.
    let on_page = match doc.current_match {
        Some(m) if doc.mode.highlight => pos_is_current_page(doc, m.so)?,
        _ => false,
    };
    if on_page {
        let m = doc.current_match.expect("checked above");
        // A kind switch (search to refs or back) re-inspects the match
        // start: users may spot a reference inside a pattern match.
        doc.set_pos(if same_kind { m.eo } else { m.so });
    } else if doc.mode.toc {
        if let Some(toc) = doc.toc.as_mut() {
            toc.pointer = toc.first;
            let pos = toc.pointer_entry().pos;
            doc.set_pos(pos);
        }
    } else {
        doc.set_pos(doc.page_first);
    }

    let found = loop {
        let candidate = if doc.mode.toc {
            searcher.toc_next_candidate(doc)?
        } else {
            searcher.file_next_candidate(doc)?
        };
        let Some(m) = candidate else {
            break None;
        };

        if searcher.is_refs {
            let valid = match doc.line_at_pos(m.so)? {
                Some(line) => {
                    let nso = normalize(&line.raw[..m.so - line.pos]).len();
                    let neo = normalize(&line.raw[..m.eo - line.pos]).len();
                    searcher.validate_span(&line, nso, neo)
                }
                None => false,
            };
            if !valid {
                // Skip the invalid candidate and continue behind it.
                doc.set_pos(m.eo);
                continue;
            }
        }
        break Some(m);
    };

    let Some(m) = found else {
        if doc.mode.toc {
            if let Some(toc) = doc.toc.as_mut() {
                toc.pointer = toc.first;
            }
        } else {
            doc.set_pos(doc.page_first);
        }
        return Ok(false);
    };

    let m = extend_zero_length(doc, m)?;
    enter_found_match(doc, searcher.is_refs, m);
    align_to_match(doc, geom)?;
    Ok(true)
}

/// Find the previous match and align the view around it.
pub fn search_prev(searcher: &mut Searcher, doc: &mut Document, geom: &ViewGeom) -> Result<bool> {
    let on_page = match doc.current_match {
        Some(m) if doc.mode.highlight => pos_is_current_page(doc, m.so)?,
        _ => false,
    };
    if on_page {
        let m = doc.current_match.expect("checked above");
        doc.set_pos(m.so);
    } else if doc.mode.toc {
        if let Some(toc) = doc.toc.as_mut() {
            toc.pointer = toc.first;
            let pos = toc.pointer_entry().pos;
            doc.set_pos(pos);
        }
    } else {
        doc.set_pos(doc.page_first);
    }

    // No backward searching from the beginning of the file.
    if doc.pos() == 0 {
        return Ok(false);
    }

    // Start in the previous line, or in the head of the current one when
    // the position sits behind an earlier match.
    let line = if doc.at_bol()? {
        if doc.mode.toc {
            let level = doc.toc_level;
            let pos = doc.pos();
            let prev = if let Some(toc) = doc.toc.as_mut() {
                if toc.move_to_prev(pos, level) {
                    Some(toc.pointer_entry().pos)
                } else {
                    None
                }
            } else {
                None
            };
            match prev {
                Some(p) => {
                    doc.set_pos(p);
                    doc.get_this_line()?
                }
                None => None,
            }
        } else {
            doc.get_prev_line()?
        }
    } else {
        let cut_at = doc.pos();
        match doc.get_this_line()? {
            Some(mut line) => {
                line.cut_tail(cut_at.clamp(line.pos, line.pos + line.len()));
                Some(line)
            }
            None => None,
        }
    };

    let Some(m) = searcher.find_prev_match(doc, line)? else {
        if doc.mode.toc {
            if let Some(toc) = doc.toc.as_mut() {
                toc.pointer = toc.first;
            }
        } else {
            doc.set_pos(doc.page_first);
        }
        return Ok(false);
    };

    let m = extend_zero_length(doc, m)?;
    enter_found_match(doc, searcher.is_refs, m);
    align_to_match(doc, geom)?;
    Ok(true)
}

/// Position the page (or TOC) around the current match.
pub fn align_to_match(doc: &mut Document, geom: &ViewGeom) -> Result<()> {
    if doc.mode.toc {
        align_toc_to_match(doc, geom)
    } else {
        align_page_to_match(doc, geom)
    }
}

/// Emacs-like placement: half a window forward when the match is on the
/// last line, stand still when it is on the page, else half a window above
/// the match.  With `match_top` the match line simply becomes the top.
fn align_page_to_match(doc: &mut Document, geom: &ViewGeom) -> Result<()> {
    let m = doc
        .current_match
        .context("alignment without an active match")?;

    if geom.match_top {
        doc.set_pos(m.so);
        doc.goto_bol()?;
        return Ok(());
    }

    let match_line = doc.pos2line(m.so)?;
    let bottom_line = doc.pos2line(doc.page_last.saturating_sub(1))?;

    if match_line == bottom_line {
        doc.cmd_forward(geom.maxy / 2, &geom.layout, geom.chop_lines)?;
    } else if pos_is_current_page(doc, m.so)? {
        doc.set_pos(doc.page_first);
    } else {
        let start = doc
            .line_start(match_line)
            .context("line start for match unknown")?;
        doc.set_pos(start);
        doc.backward_lines(geom.maxy / 2)?;
    }
    Ok(())
}

fn align_toc_to_match(doc: &mut Document, geom: &ViewGeom) -> Result<()> {
    let m = doc
        .current_match
        .context("alignment without an active match")?;
    if doc.toc.is_none() {
        return Ok(());
    }

    let match_line = doc.pos2line(m.so)?;
    let bottom_pos = {
        let toc = doc.toc.as_ref().expect("checked above");
        toc.last.and_then(|i| toc.entry(i)).map(|e| e.pos)
    };
    let on_page = pos_is_current_page(doc, m.so)?;
    let level = doc.toc_level;
    let match_entry = toc::pos_to_toc(doc, m.so)?;

    let bottom_line = match bottom_pos {
        Some(pos) => Some(doc.pos2line(pos)?),
        None => None,
    };

    let mut toc = doc.toc.take().expect("checked above");
    if bottom_line == Some(match_line) {
        toc.pointer = toc.first;
        toc.fw(geom.maxy / 2, level);
    } else if on_page {
        toc.pointer = toc.first;
    } else if let Some(idx) = match_entry {
        toc.pointer = idx;
        toc.bw(geom.maxy / 2, level);
    }
    doc.toc = Some(toc);
    Ok(())
}
