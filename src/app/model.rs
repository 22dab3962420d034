//! The complete application state.
//!
//! All state lives here: the document ring, the compiled search
//! expressions, the reference cache, interned color pairs, and the window
//! geometry.  Commands operate on the ring's current document.

use std::fs::File;

use anyhow::{Context, Result};
use regex::bytes::Regex;

use crate::config::Options;
use crate::document::{ActiveRegex, Document, DocumentRing, Layout};
use crate::man;
use crate::refs::{canonical, RefCache, Verifier};
use crate::search::{self, Direction, Searcher, ViewGeom};
use crate::style::PairTable;
use crate::toc;

pub const NOT_FOUND: &str = "Pattern not found";

/// Name of the open-files list pseudo-document.
pub const FILES_LIST_NAME: &str = "List of open files";

/// Name of the built-in help page.
pub const HELP_PAGE: &str = "lsp-help(1)";

/// Modal input state of the bottom line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Reading a line of input at the bottom of the screen.
    Prompt { kind: PromptKind, buffer: String },
    /// `-` was pressed; the next key names the option to toggle.
    ToggleMenu,
    /// Selecting a file in the open-files list; the cursor row.
    FileSelect { line_no: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    SearchForward,
    SearchBackward,
    ManPage,
}

pub struct Model {
    pub ring: DocumentRing,
    pub opts: Options,
    pub grefs: RefCache,
    pub pairs: PairTable,
    /// Fixed expression for man-page references.
    pub refs_regex: Regex,
    /// Compiled user search pattern, if any.
    pub search_regex: Option<Regex>,
    pub search_string: String,
    pub search_string_old: String,
    pub search_direction: Direction,
    /// Persistent preference: align matches to the top window line.
    pub match_top: bool,
    /// Tracks double-presses of Ctrl-L.
    pub last_key_was_ctrl_l: bool,
    /// Invert the alignment policy for the next alignment only.
    pub invert_align_once: bool,
    /// Transient message for the middle of the status line.
    pub prompt: Option<String>,
    pub input: InputMode,
    /// Cursor placed by a mouse click.
    pub cursor: Option<(u16, u16)>,
    /// Horizontal shift in cells; saturates instead of wrapping.
    pub shift: u8,
    pub maxy: u16,
    pub maxx: u16,
    pub should_quit: bool,
    pub(crate) tee: Option<File>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("documents", &self.ring.len())
            .field("maxy", &self.maxy)
            .field("maxx", &self.maxx)
            .finish_non_exhaustive()
    }
}

impl Model {
    pub fn new(opts: Options, size: (u16, u16)) -> Result<Self> {
        let color = opts.color;
        Ok(Self {
            ring: DocumentRing::new(),
            opts,
            grefs: RefCache::new(),
            pairs: PairTable::new(color),
            refs_regex: search::compile_refs()?,
            search_regex: None,
            search_string: String::new(),
            search_string_old: String::new(),
            search_direction: Direction::Forward,
            match_top: false,
            last_key_was_ctrl_l: false,
            invert_align_once: false,
            prompt: None,
            input: InputMode::Normal,
            cursor: None,
            shift: 0,
            maxy: size.1,
            maxx: size.0,
            should_quit: false,
            tee: None,
        })
    }

    pub fn show_prompt(&mut self, text: impl Into<String>) {
        self.prompt = Some(text.into());
    }

    /// Width available for content, accounting for the line-number gutter.
    pub fn content_width(&self) -> usize {
        let gutter = if self.opts.line_numbers { 8 } else { 0 };
        (self.maxx as usize).saturating_sub(gutter).max(1)
    }

    pub fn layout(&self) -> Layout {
        Layout {
            width: self.content_width(),
            tab_width: self.opts.tab_width,
            keep_cr: self.opts.keep_cr,
        }
    }

    pub fn geom(&self) -> ViewGeom {
        ViewGeom {
            maxy: self.maxy as usize,
            layout: self.layout(),
            chop_lines: self.opts.chop_lines,
            match_top: self.match_top ^ self.invert_align_once,
        }
    }

    /// Content rows on a page (everything but the status line).
    pub fn page_rows(&self) -> usize {
        (self.maxy as usize).saturating_sub(1)
    }

    pub fn verifier(&self) -> Verifier {
        Verifier {
            enabled: self.opts.verify,
            with_apropos: self.opts.verify_with_apropos,
            command: self.opts.verify_command.clone(),
            man_case: self.opts.man_case_sensitivity,
        }
    }

    /// Give a new document the shared tee handle, then add it to the ring.
    pub fn add_document(&mut self, mut doc: Document, new_current: bool) -> bool {
        if let Some(tee) = self.tee.as_ref() {
            doc.tee = tee.try_clone().ok();
        }
        self.ring.add(doc, new_current)
    }

    // ── Navigation ────────────────────────────────────────────────────

    pub fn forward(&mut self, n: usize) -> Result<()> {
        let layout = self.layout();
        let chop = self.opts.chop_lines;
        self.ring.current_mut().cmd_forward(n, &layout, chop)
    }

    pub fn backward(&mut self, n: usize) -> Result<()> {
        let layout = self.layout();
        let chop = self.opts.chop_lines;
        let n = if n == 0 { self.page_rows() } else { n };
        self.ring.current_mut().cmd_backward(n, &layout, chop)
    }

    pub fn goto_start(&mut self) -> Result<()> {
        let doc = self.ring.current_mut();
        if doc.mode.toc {
            if let Some(t) = doc.toc.as_mut() {
                t.pointer = 0;
                t.first = 0;
            }
            doc.toc_cursor = 0;
        } else {
            doc.set_pos(0);
        }
        Ok(())
    }

    pub fn goto_end(&mut self) -> Result<()> {
        let rows = self.page_rows();
        let layout = self.layout();
        let level = self.ring.current().toc_level;
        let doc = self.ring.current_mut();
        if doc.mode.toc {
            if let Some(t) = doc.toc.as_mut() {
                t.rewind_end(rows.saturating_sub(1), level);
            }
        } else {
            doc.goto_last_wpage(rows, &layout)?;
        }
        Ok(())
    }

    /// Advance one page.  Outside TOC mode the reader already sits at
    /// `page_last`, so the next draw continues naturally; the TOC page
    /// top moves to the first undrawn entry.
    pub fn page_forward(&mut self) {
        let doc = self.ring.current_mut();
        if doc.mode.toc {
            if let Some(t) = doc.toc.as_mut() {
                if let Some(last) = t.last {
                    t.first = last;
                    t.pointer = last;
                }
            }
        }
    }

    pub fn shift_right(&mut self) {
        self.shift = self.shift.saturating_add(1);
        self.reset_to_page_top();
    }

    pub fn shift_left(&mut self) {
        self.shift = self.shift.saturating_sub(1);
        self.reset_to_page_top();
    }

    /// Park the reader at the top of the current page (or TOC page).
    pub fn reset_to_page_top(&mut self) {
        let doc = self.ring.current_mut();
        if doc.mode.toc {
            if let Some(t) = doc.toc.as_mut() {
                t.pointer = t.first;
            }
        } else {
            let first = doc.page_first;
            doc.set_pos(first);
        }
    }

    // ── Searching ─────────────────────────────────────────────────────

    /// Run the user search with the prepared pattern in `search_string`.
    ///
    /// An empty pattern re-uses the previous one; with neither, highlight
    /// is simply turned off.
    pub fn run_search(&mut self, fresh_pattern: bool) -> Result<()> {
        if self.search_string.is_empty() {
            if self.search_string_old.is_empty() {
                let doc = self.ring.current_mut();
                doc.mode.highlight = false;
                let first = doc.page_first;
                doc.set_pos(first);
                return Ok(());
            }
            self.search_string = self.search_string_old.clone();
        } else if fresh_pattern {
            self.search_regex = None;
        }

        if self.search_regex.is_none() {
            match search::compile_user(&self.search_string, self.opts.case_sensitivity) {
                Ok(re) => self.search_regex = Some(re),
                Err(err) => {
                    self.ring.current_mut().mode.highlight = false;
                    self.show_prompt(err);
                    return Ok(());
                }
            }
        }

        self.ring.current_mut().active_regex = ActiveRegex::Search;
        match self.search_direction {
            Direction::Forward => self.search_next(),
            Direction::Backward => self.search_prev(),
        }
    }

    fn with_searcher<R>(
        &mut self,
        is_refs: bool,
        f: impl FnOnce(&mut Searcher, &mut Document, &ViewGeom) -> Result<R>,
    ) -> Result<Option<R>> {
        let geom = self.geom();
        let verifier = self.verifier();
        let Model {
            ring,
            grefs,
            refs_regex,
            search_regex,
            ..
        } = self;
        let regex = if is_refs {
            &*refs_regex
        } else {
            match search_regex.as_ref() {
                Some(re) => re,
                None => return Ok(None),
            }
        };
        let mut searcher = Searcher {
            regex,
            is_refs,
            grefs,
            verifier: &verifier,
        };
        f(&mut searcher, ring.current_mut(), &geom).map(Some)
    }

    /// `n` key: continue the user search forward.
    pub fn search_next(&mut self) -> Result<()> {
        self.prepare_apropos_validation()?;
        let found = self.with_searcher(false, search::search_next)?;
        match found {
            Some(false) => self.show_prompt(NOT_FOUND),
            Some(true) => self.invert_align_once = false,
            None => self.reset_to_page_top(),
        }
        Ok(())
    }

    /// `p` key: continue the user search backward.
    pub fn search_prev(&mut self) -> Result<()> {
        self.prepare_apropos_validation()?;
        let found = self.with_searcher(false, search::search_prev)?;
        match found {
            Some(false) => self.show_prompt(NOT_FOUND),
            Some(true) => self.invert_align_once = false,
            None => self.reset_to_page_top(),
        }
        Ok(())
    }

    /// TAB / Shift-TAB: move between valid references.
    pub fn search_refs(&mut self, direction: Direction) -> Result<()> {
        self.prepare_apropos_validation()?;
        self.ring.current_mut().active_regex = ActiveRegex::Refs;
        let found = match direction {
            Direction::Forward => self.with_searcher(true, search::search_next)?,
            Direction::Backward => self.with_searcher(true, search::search_prev)?,
        };
        if found == Some(false) {
            self.show_prompt(NOT_FOUND);
        }
        Ok(())
    }

    /// Apropos-backed validation needs the snapshot loaded up front.
    fn prepare_apropos_validation(&mut self) -> Result<()> {
        if !self.opts.verify_with_apropos || !self.opts.verify {
            return Ok(());
        }
        if self.ring.find("Apropos").is_some() && !self.grefs.is_empty() {
            return Ok(());
        }
        let man_case = self.opts.man_case_sensitivity;
        let mut doc = man::open_apropos(&self.opts)?;
        man::apropos_create_grefs(&mut doc, &mut self.grefs, man_case)?;
        self.add_document(doc, false);
        Ok(())
    }

    // ── References and man pages ──────────────────────────────────────

    /// ENTER on a highlighted reference: open it as a new document.
    pub fn visit_reference(&mut self) -> Result<()> {
        let Some(m) = self.ring.current().current_match else {
            return Ok(());
        };
        let man_case = self.opts.man_case_sensitivity;
        let spelling = {
            let doc = self.ring.current_mut();
            let Some(line) = doc.line_at_pos(m.so)? else {
                return Ok(());
            };
            let raw = &line.raw[m.so - line.pos..(m.eo - line.pos).min(line.len())];
            String::from_utf8_lossy(&crate::document::normalize(raw)).to_string()
        };
        let name = canonical(&spelling, man_case);
        self.open_manpage(&name)
    }

    /// Open (or switch to) a manual page by reference name.
    pub fn open_manpage(&mut self, name: &str) -> Result<()> {
        let doc = Document::new(name);
        if !self.add_document(doc, true) {
            // Already open; just switched to it.
            return Ok(());
        }

        let (rows, cols) = (self.maxy, self.maxx);
        let opts = self.opts.clone();
        let loaded = {
            let doc = self.ring.current_mut();
            man::exec_man(doc, &opts, rows, cols)
        };

        let detected = match loaded {
            Ok(name) => name,
            Err(err) => {
                // Leave the ring unchanged on loader failure.
                self.ring.kill_current();
                self.show_prompt(format!("unable to load {name}"));
                tracing::debug!(error = %err, name, "man loader failed");
                return Ok(());
            }
        };

        if let Some(detected) = detected {
            if detected != self.ring.current().name {
                match self.ring.find(&detected) {
                    Some(index) => {
                        // The page was already open under its real name.
                        self.ring.kill_current();
                        self.ring.move_here(index);
                    }
                    None => self.ring.current_mut().name = detected,
                }
            }
        }
        Ok(())
    }

    /// `a` key: show the apropos pseudo-document.
    pub fn cmd_apropos(&mut self) -> Result<()> {
        if self.ring.find("Apropos").is_some() {
            self.add_document(Document::new("Apropos"), true);
            return Ok(());
        }
        let mut doc = man::open_apropos(&self.opts)?;
        if self.opts.verify_with_apropos {
            let man_case = self.opts.man_case_sensitivity;
            man::apropos_create_grefs(&mut doc, &mut self.grefs, man_case)?;
        }
        self.add_document(doc, true);
        Ok(())
    }

    // ── The document ring ─────────────────────────────────────────────

    /// `B` key: build the open-files list and enter selection mode.
    pub fn files_list(&mut self) -> Result<()> {
        if self.ring.len() < 2 {
            self.show_prompt("No other files opened.");
            return Ok(());
        }
        let names = self.ring.names_from_prev();
        let mut doc = Document::new(FILES_LIST_NAME);
        for name in names {
            if name == FILES_LIST_NAME {
                continue;
            }
            let display = if name.is_empty() { "*stdin*" } else { name.as_str() };
            doc.add_line(display);
        }
        self.add_document(doc, true);
        self.input = InputMode::FileSelect { line_no: 0 };
        self.show_prompt("Select file and press ENTER.");
        Ok(())
    }

    /// Commit a file-list selection: kill the list, switch to the choice.
    pub fn file_select_commit(&mut self, line_no: usize) -> Result<()> {
        let name = {
            let doc = self.ring.current_mut();
            let first_line = doc.pos2line(doc.page_first)?;
            match doc.line_start(first_line + line_no) {
                Some(start) => match doc.line_at_pos(start)? {
                    Some(line) => {
                        String::from_utf8_lossy(line.normalized_sans_newline()).to_string()
                    }
                    None => return Ok(()),
                },
                None => return Ok(()),
            }
        };
        self.ring.kill_current();
        let lookup = if name == "*stdin*" { "" } else { &name };
        if let Some(index) = self.ring.find(lookup) {
            self.ring.move_here(index);
        }
        self.input = InputMode::Normal;
        Ok(())
    }

    /// Leave the file list without selecting.
    pub fn file_select_cancel(&mut self) {
        self.ring.kill_current();
        self.input = InputMode::Normal;
    }

    /// `c` key: kill the current document; quitting on the last one.
    pub fn kill_current(&mut self) {
        if self.ring.len() <= 1 {
            self.should_quit = true;
            return;
        }
        self.ring.kill_current();
    }

    /// `q` key: leave TOC mode first; inside the help page kill it; else
    /// quit.
    pub fn quit(&mut self) {
        let doc = self.ring.current_mut();
        if doc.mode.toc {
            doc.mode.toc = false;
            let first = doc.page_first;
            doc.set_pos(first);
            return;
        }
        if doc.name == HELP_PAGE {
            self.kill_current();
            return;
        }
        self.should_quit = true;
    }

    // ── TOC mode ──────────────────────────────────────────────────────

    /// `T` key outside TOC mode: build (if needed) and enter the TOC.
    pub fn toc_enter(&mut self) -> Result<()> {
        let doc = self.ring.current_mut();
        if doc.lines_count() == 0 {
            self.show_prompt("No TOC for empty files");
            return Ok(());
        }
        if doc.toc.is_none() {
            doc.toc = Some(toc::build(doc)?);
        }
        let toc = doc.toc.as_mut().expect("just built");
        if toc.is_empty() {
            doc.toc = None;
            self.show_prompt("No TOC for this file");
            return Ok(());
        }
        toc.pointer = toc.first;
        doc.mode.toc = true;
        Ok(())
    }

    /// `T` key inside TOC mode: cycle the visible level.
    pub fn toc_cycle_level(&mut self) {
        let doc = self.ring.current_mut();
        doc.toc_level = (doc.toc_level + 1) % 3;
        let level = doc.toc_level;
        if let Some(t) = doc.toc.as_mut() {
            // Dropping levels can hide the page top; move it somewhere
            // visible.
            if level == 0 {
                t.first_adjust(level);
            }
            t.pointer = t.first;
        }
    }

    /// ENTER in TOC mode: jump the document to the cursor entry.
    pub fn toc_select(&mut self) {
        let doc = self.ring.current_mut();
        let target = doc.toc.as_ref().and_then(|t| {
            t.offset_at_cursor(doc.toc_cursor, doc.toc_level)
        });
        doc.mode.toc = false;
        if let Some(pos) = target {
            doc.set_pos(pos);
        }
    }

    /// Down arrow in TOC mode.
    pub fn toc_down(&mut self) {
        let rows = self.page_rows();
        let half = (self.maxy / 2) as usize;
        let doc = self.ring.current_mut();
        doc.mode.highlight = false;
        let level = doc.toc_level;
        let Some(t) = doc.toc.as_mut() else {
            return;
        };

        let has_next = t.next_visible(t.pointer + 1, level).is_some();
        t.pointer = t.first;
        if has_next {
            if doc.toc_cursor + 1 < rows {
                doc.toc_cursor += 1;
            } else {
                t.fw(half, level);
                doc.toc_cursor = half.saturating_sub(1);
            }
        }
    }

    /// Up arrow in TOC mode.
    pub fn toc_up(&mut self) {
        let half = (self.maxy / 2) as usize;
        let doc = self.ring.current_mut();
        doc.mode.highlight = false;
        let level = doc.toc_level;
        let Some(t) = doc.toc.as_mut() else {
            return;
        };

        t.pointer = t.first;
        if doc.toc_cursor > 0 {
            doc.toc_cursor -= 1;
        } else if t.prev_visible(t.first.saturating_sub(1), level).is_some() && t.first > 0 {
            t.bw(half, level);
            doc.toc_cursor = half.saturating_sub(1);
        }
    }

    /// Page movement inside the TOC.
    pub fn toc_page_backward(&mut self) {
        let rows = self.page_rows();
        let doc = self.ring.current_mut();
        let level = doc.toc_level;
        if let Some(t) = doc.toc.as_mut() {
            t.pointer = t.first;
            t.bw(rows, level);
        }
    }

    // ── Option toggles (`-` submenu) ──────────────────────────────────

    pub fn toggle_option(&mut self, key: char) {
        match key {
            'h' => {
                let doc = self.ring.current_mut();
                doc.mode.highlight = !doc.mode.highlight;
            }
            'i' => {
                self.opts.case_sensitivity = !self.opts.case_sensitivity;
                self.show_prompt(if self.opts.case_sensitivity {
                    "Case sensitivity ON"
                } else {
                    "Case sensitivity OFF"
                });
                // An active search pattern must be recompiled.
                if self.search_regex.is_some() {
                    self.search_regex =
                        search::compile_user(&self.search_string, self.opts.case_sensitivity).ok();
                }
            }
            'c' => {
                self.opts.chop_lines = !self.opts.chop_lines;
                self.show_prompt(if self.opts.chop_lines {
                    "Chopping lines that do not fit."
                } else {
                    "Lines chopping turned OFF."
                });
            }
            'n' => {
                self.opts.line_numbers = !self.opts.line_numbers;
            }
            'V' => {
                self.opts.verify = !self.opts.verify;
                self.show_prompt(if self.opts.verify {
                    "Verification of references turned ON."
                } else {
                    "Verification of references turned OFF."
                });
            }
            _ => {}
        }
    }

    // ── Ctrl-L alignment ──────────────────────────────────────────────

    /// First press realigns the current match with the inverted policy;
    /// a second press in a row toggles the persistent preference.
    pub fn ctrl_l(&mut self) -> Result<()> {
        if self.last_key_was_ctrl_l {
            self.match_top = !self.match_top;
            self.invert_align_once = false;
            self.show_prompt(if self.match_top {
                "Matches align to the top line."
            } else {
                "Matches align emacs-like."
            });
        } else {
            self.invert_align_once = true;
        }

        if self.ring.current().current_match.is_some() {
            let geom = self.geom();
            search::align_to_match(self.ring.current_mut(), &geom)?;
        }
        Ok(())
    }

    // ── Resize and reload ─────────────────────────────────────────────

    /// Window size changed: reflow, reloading width-sensitive documents.
    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        let width_changed = cols != self.maxx;
        self.maxx = cols;
        self.maxy = rows;

        self.reset_to_page_top();
        if !width_changed {
            return Ok(());
        }

        if auto_reloadable(self.ring.current()) {
            self.reload_current()?;
        }
        for doc in self.ring.others_mut() {
            if auto_reloadable(doc) {
                doc.do_reload = true;
            }
        }
        Ok(())
    }

    /// Reload the current document if a resize deferred it.
    pub fn deferred_reload(&mut self) -> Result<()> {
        if self.ring.current().do_reload {
            self.reload_current()?;
        }
        Ok(())
    }

    /// Re-invoke the loader (man pages) or re-read the file (regular
    /// files), repositioning near the previously viewed content.
    pub fn reload_current(&mut self) -> Result<()> {
        let (rows, cols) = (self.maxy, self.maxx);
        let opts = self.opts.clone();
        let layout = self.layout();
        let page_rows = self.page_rows();

        self.ring.current_mut().do_reload = false;

        if self.ring.current().ftype.lsp_loaded {
            let doc = self.ring.current_mut();
            let rep = man::get_section(doc)?;
            let had_toc = doc.toc.is_some();
            doc.toc = None;
            doc.reset();
            man::exec_man(doc, &opts, rows, cols)?;
            if had_toc {
                doc.toc = Some(toc::build(doc)?);
            }
            man::reposition(doc, &rep)?;
            return Ok(());
        }

        if self.ring.current().ftype.stdin || self.ring.current().name.is_empty() {
            self.show_prompt("Reload not supported for this input.");
            return Ok(());
        }

        // Regular file: re-open and refill up to the previously shown
        // page.
        let (page_first, name, rep_name) = {
            let doc = self.ring.current_mut();
            let saved = (doc.page_first, doc.name.clone(), doc.rep_name.clone());
            doc.reset();
            saved
        };
        let path = rep_name.as_deref().unwrap_or(&name);
        match Document::open_path(path, None) {
            Ok(fresh) => {
                let doc = self.ring.current_mut();
                doc.source = fresh.source;
                doc.size = fresh.size;
            }
            Err(err) => {
                self.show_prompt(format!("{err:#}"));
                return Ok(());
            }
        }

        let doc = self.ring.current_mut();
        while doc.seek() <= page_first && !doc.at_source_eof() {
            if doc.read_block()? == 0 {
                break;
            }
        }
        if doc.size.map_or(false, |size| page_first >= size) {
            // The file shrank below the old page; show its end.
            doc.goto_last_wpage(page_rows, &layout)?;
        } else {
            doc.set_pos(page_first);
            doc.goto_bol()?;
        }
        let pos = doc.pos();
        doc.page_first = pos;
        Ok(())
    }
}

/// Whether a document reflows on width changes: man pages we loaded
/// ourselves, or man-formatted stdin piped from man itself.
pub fn auto_reloadable(doc: &Document) -> bool {
    if doc.ftype.lsp_loaded {
        return true;
    }
    doc.ftype.stdin && doc.ftype.manpage && parent_is_man()
}

/// Best-effort check whether our parent process is man(1).
fn parent_is_man() -> bool {
    #[cfg(target_os = "linux")]
    {
        let ppid = std::os::unix::process::parent_id();
        match std::fs::read_to_string(format!("/proc/{ppid}/comm")) {
            Ok(comm) => comm.trim() == "man",
            Err(_) => false,
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

/// Build the initial ring from file arguments, or stdin when none are
/// given.
pub fn init_ring(model: &mut Model, files: &[String]) -> Result<()> {
    if let Some(path) = model.opts.output_file.clone() {
        model.tee = Some(
            File::create(&path)
                .with_context(|| format!("{}: cannot open output file", path.display()))?,
        );
    }

    if files.is_empty() {
        use std::io::IsTerminal;
        if std::io::stdin().is_terminal() {
            anyhow::bail!("stdin is a tty; nothing to page");
        }
        let mut doc = Document::open_stdin();
        if let Some(tee) = model.tee.as_ref() {
            doc.tee = tee.try_clone().ok();
        }
        doc.read_block()?;
        if let Ok(pn) = std::env::var("MAN_PN") {
            doc.name = pn;
            doc.ftype.manpage = true;
        } else if let Some(name) = man::detect_manpage(&mut doc, model.opts.man_case_sensitivity)? {
            doc.name = name;
            doc.ftype.manpage = true;
        }
        model.ring.add(doc, false);
        return Ok(());
    }

    let env_open = model.opts.env_open.clone();
    for name in files {
        let mut doc = Document::open_path(name, env_open.as_deref())?;
        if let Some(tee) = model.tee.as_ref() {
            doc.tee = tee.try_clone().ok();
        }
        doc.read_block()?;
        model.ring.add(doc, false);
    }
    Ok(())
}
