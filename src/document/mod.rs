//! Lazily loaded byte documents and their paging state.
//!
//! Every input the pager shows (files on disk, stdin, man-page loader
//! output, internal lists) is a [`Document`]: a byte store filled on demand
//! in `blksize`-sized blocks, an index of physical-line start offsets grown
//! as bytes stream in, and the per-document cursor and mode state.
//!
//! Blocks are never evicted and never reorder, so the store is a plain
//! vector indexed by `pos / blksize`.

mod line;
mod ring;
mod wrap;

pub use line::{
    char_len, decode_char, is_sgr_sequence, normalize, normalize_count, sgr_len, Line,
};
pub use ring::DocumentRing;
pub use wrap::Layout;
pub(crate) use wrap::skip_control_run;

use std::fs::File;
use std::io::Read;

use anyhow::{bail, Context, Result};

use crate::toc::Toc;

/// Fallback block size for sources we cannot stat (pipes, PTYs).
const DEFAULT_BLKSIZE: usize = 4096;

/// `read(2)` reports EIO at the end of PTY output; treat it as EOF.
const EIO: i32 = 5;

/// A regex search match as absolute byte offsets into the owning document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Start offset (inclusive).
    pub so: usize,
    /// End offset (exclusive).
    pub eo: usize,
}

/// Per-document mode bits.
///
/// Search and refs are mutually exclusive; the setters keep it that way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mode {
    search: bool,
    refs: bool,
    pub toc: bool,
    pub highlight: bool,
}

impl Mode {
    pub fn is_search(self) -> bool {
        self.search
    }

    pub fn is_refs(self) -> bool {
        self.refs
    }

    pub fn is_search_or_refs(self) -> bool {
        self.search || self.refs
    }

    pub fn set_search(&mut self) {
        self.search = true;
        self.refs = false;
    }

    pub fn set_refs(&mut self) {
        self.refs = true;
        self.search = false;
    }

    pub fn unset_search_or_refs(&mut self) {
        self.search = false;
        self.refs = false;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Which compiled expression currently drives highlighting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActiveRegex {
    #[default]
    None,
    Search,
    Refs,
}

/// What kind of input a document came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ftype {
    /// Content is a formatted manual page.
    pub manpage: bool,
    /// We invoked the man-page loader for it ourselves, so it can be
    /// re-invoked on resize.
    pub lsp_loaded: bool,
    /// Fed from standard input.
    pub stdin: bool,
}

/// An open input backing a document.
pub(crate) enum Source {
    /// A plain readable stream (regular file, stdin).
    Reader(Box<dyn Read + Send>),
    /// A popen-style child whose stdout we drain, reaped at EOF.
    Child {
        reader: std::process::ChildStdout,
        child: std::process::Child,
    },
    /// A child on the slave side of a pseudoterminal.
    Pty {
        reader: Box<dyn Read + Send>,
        child: Box<dyn portable_pty::Child + Send + Sync>,
        // Keeping the master alive keeps the slave side open.
        _master: Box<dyn portable_pty::MasterPty + Send>,
    },
}

impl Source {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Source::Reader(r) => r.read(buf),
            Source::Child { reader, .. } => reader.read(buf),
            Source::Pty { reader, .. } => reader.read(buf),
        }
    }

    /// Close the source, reaping the child process if there is one.
    fn close(self) {
        match self {
            Source::Reader(_) => {}
            Source::Child { reader, mut child } => {
                drop(reader);
                let _ = child.wait();
            }
            Source::Pty {
                reader,
                mut child,
                _master,
            } => {
                drop(reader);
                let _ = child.wait();
            }
        }
    }
}

struct Block {
    seek: usize,
    bytes: Vec<u8>,
}

/// A lazily loaded byte source with paging state.
pub struct Document {
    /// Name, unique within the ring.  Empty for stdin.
    pub name: String,
    /// Replacement file name supplied by a preprocessor, if any.
    pub rep_name: Option<String>,
    pub(crate) source: Option<Source>,
    /// Bytes to serve before reading from the source (preprocessor probe
    /// byte, re-injected sentinel line).
    pub(crate) pending: Vec<u8>,
    /// Total size, once known.  Becomes `Some` when a bounded source is
    /// opened or an unbounded one reaches EOF.
    pub size: Option<usize>,
    /// Bytes read from the source into blocks so far.
    seek: usize,
    blksize: usize,
    blocks: Vec<Block>,
    /// Start offsets of physical lines within `[0, seek)`; `lines[0] == 0`.
    lines: Vec<usize>,
    /// The last consumed byte was a newline, so the next byte read starts a
    /// line.
    pending_nl: bool,
    /// The reader's current byte offset.
    pos: usize,
    /// First byte of the most recently rendered page.
    pub page_first: usize,
    /// One past the last byte of the most recently rendered page.
    pub page_last: usize,
    pub mode: Mode,
    pub current_match: Option<Match>,
    /// Window cell just after the current match, for cursor placement.
    pub cmatch_cell: Option<(u16, u16)>,
    pub active_regex: ActiveRegex,
    pub toc: Option<Toc>,
    /// Row index of the active entry on the current TOC page.
    pub toc_cursor: usize,
    /// Visible TOC indentation level (0, 1 or 2).
    pub toc_level: u8,
    pub ftype: Ftype,
    /// Deferred-reload flag set by the resize handler.
    pub do_reload: bool,
    /// Duplicate every chunk read from the source into this file.
    pub(crate) tee: Option<File>,
}

impl Document {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rep_name: None,
            source: None,
            pending: Vec::new(),
            size: None,
            seek: 0,
            blksize: 0,
            blocks: Vec::new(),
            lines: vec![0],
            pending_nl: false,
            pos: 0,
            page_first: 0,
            page_last: 0,
            mode: Mode::default(),
            current_match: None,
            cmatch_cell: None,
            active_regex: ActiveRegex::None,
            toc: None,
            toc_cursor: 0,
            toc_level: 0,
            ftype: Ftype::default(),
            do_reload: false,
            tee: None,
        }
    }

    /// Create a fully materialized document from a byte buffer.
    ///
    /// Used for internal pseudo-documents and in tests.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Self {
        let mut doc = Self::new(name);
        for chunk in bytes.split_inclusive(|&b| b == b'\n') {
            doc.append_line_bytes(chunk);
        }
        doc.size = Some(doc.seek);
        doc.blksize = doc.seek.max(1);
        doc
    }

    /// Attach an open source with a known block size and (for regular
    /// files) a known size.
    pub(crate) fn attach_source(&mut self, source: Source, blksize: usize, size: Option<usize>) {
        self.source = Some(source);
        self.blksize = if blksize == 0 { DEFAULT_BLKSIZE } else { blksize };
        self.size = size;
    }

    /// Append one line of text to an internal document.
    ///
    /// Such documents are small (file lists and the like) and live in a
    /// single block.
    pub fn add_line(&mut self, text: &str) {
        debug_assert!(self.source.is_none());
        let mut bytes = text.as_bytes().to_vec();
        if bytes.last() != Some(&b'\n') {
            bytes.push(b'\n');
        }
        self.append_line_bytes(&bytes);
        self.size = Some(self.seek);
    }

    fn append_line_bytes(&mut self, bytes: &[u8]) {
        if self.blocks.is_empty() {
            self.blocks.push(Block {
                seek: 0,
                bytes: Vec::new(),
            });
        }
        let start = self.seek;
        self.blocks[0].bytes.extend_from_slice(bytes);
        self.scan_lines(start, bytes);
        self.seek += bytes.len();
        // A single growing block; keep its nominal size in step.
        self.blksize = self.seek.max(1);
    }

    /// Number of physical lines seen so far.  A file with content and no
    /// newline has one line, an empty file has zero.
    pub fn lines_count(&self) -> usize {
        if self.size == Some(0) {
            0
        } else {
            self.lines.len()
        }
    }

    pub fn seek(&self) -> usize {
        self.seek
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn blksize(&self) -> usize {
        self.blksize
    }

    /// Whether every byte of the source has been read.
    pub fn at_source_eof(&self) -> bool {
        self.size == Some(self.seek)
    }

    /// Whether the reader sits at EOF.
    pub fn at_eof(&self) -> bool {
        self.size == Some(self.pos)
    }

    /// Reposition the reader.
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Record line starts contained in a chunk appended at `start`.
    ///
    /// The line start implied by a newline in the chunk's final byte is
    /// deferred until the next chunk arrives, so a trailing newline at EOF
    /// never records a phantom line.
    fn scan_lines(&mut self, start: usize, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        if self.pending_nl && start != 0 {
            self.lines.push(start);
        }
        for (i, &b) in chunk[..chunk.len() - 1].iter().enumerate() {
            if b == b'\n' {
                self.lines.push(start + i + 1);
            }
        }
        self.pending_nl = *chunk.last().unwrap() == b'\n';
    }

    /// Read the next block of data from the source.
    ///
    /// Returns the number of bytes read; 0 means the source is exhausted
    /// and has been closed.
    pub fn read_block(&mut self) -> Result<usize> {
        if self.at_source_eof() {
            return Ok(0);
        }
        if self.blksize == 0 {
            self.blksize = DEFAULT_BLKSIZE;
        }

        let mut size_to_read = match self.size {
            Some(size) => (size - self.seek).min(self.blksize),
            None => self.blksize,
        };

        // Fill the tail block before allocating a new one.
        let free = match self.blocks.last() {
            Some(b) => self.blksize - b.bytes.len(),
            None => 0,
        };
        if free > 0 {
            size_to_read = size_to_read.min(free);
        } else {
            self.blocks.push(Block {
                seek: self.seek,
                bytes: Vec::with_capacity(self.blksize),
            });
        }

        let mut buf = vec![0u8; size_to_read.max(1)];
        let mut nread = 0;

        // Serve injected bytes (preprocessor probe, sentinel line) first.
        if !self.pending.is_empty() {
            let n = self.pending.len().min(buf.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            nread = n;
        }

        if nread < buf.len() {
            match self.source.as_mut() {
                None => {
                    if nread == 0 {
                        self.finish_source();
                        return Ok(0);
                    }
                }
                Some(source) => match source.read(&mut buf[nread..]) {
                    Ok(n) => nread += n,
                    Err(e) if e.raw_os_error() == Some(EIO) => {
                        tracing::debug!(name = %self.name, "EIO on read, treating as EOF");
                    }
                    Err(e) => {
                        return Err(e).with_context(|| format!("{}: read failed", self.name));
                    }
                },
            }
        }

        if nread == 0 {
            tracing::debug!(name = %self.name, seek = self.seek, "EOF detected");
            self.finish_source();
            return Ok(0);
        }

        if nread < size_to_read {
            tracing::debug!(
                name = %self.name,
                seek = self.seek,
                nread,
                size_to_read,
                "short read"
            );
        }

        buf.truncate(nread);
        self.commit_chunk(&buf);
        Ok(nread)
    }

    fn commit_chunk(&mut self, chunk: &[u8]) {
        if let Some(tee) = self.tee.as_mut() {
            use std::io::Write;
            if let Err(e) = tee.write_all(chunk) {
                tracing::debug!(error = %e, "tee write failed");
            }
        }
        let start = self.seek;
        self.blocks
            .last_mut()
            .expect("read_block ensured a tail block")
            .bytes
            .extend_from_slice(chunk);
        self.scan_lines(start, chunk);
        self.seek += chunk.len();
    }

    /// Mark the source exhausted: close it and pin the size.
    fn finish_source(&mut self) {
        if let Some(source) = self.source.take() {
            source.close();
        }
        if self.size.is_none() {
            self.size = Some(self.seek);
        }
    }

    /// Read all remaining data from the source.
    pub fn read_all(&mut self) -> Result<()> {
        while !self.at_source_eof() {
            if self.read_block()? == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Byte at an absolute offset, which must already be in a block.
    fn byte_at(&self, pos: usize) -> Result<u8> {
        let idx = pos / self.blksize;
        let off = pos % self.blksize;
        match self.blocks.get(idx) {
            Some(block) if off < block.bytes.len() => Ok(block.bytes[off]),
            _ => bail!(
                "{}: block store has no byte at {} (seek {})",
                self.name,
                pos,
                self.seek
            ),
        }
    }

    /// The next byte from the reader, or `None` at EOF.
    pub fn getch(&mut self) -> Result<Option<u8>> {
        if self.at_eof() {
            return Ok(None);
        }
        // At most a few reads are needed to make the position available.
        while self.pos >= self.seek {
            if self.read_block()? == 0 {
                return Ok(None);
            }
        }
        let b = self.byte_at(self.pos)?;
        self.pos += 1;
        Ok(Some(b))
    }

    /// Unget the last received byte.
    pub fn ungetch(&mut self) {
        if self.pos > 0 {
            self.pos -= 1;
        }
    }

    /// Peek at the next byte without consuming it.
    pub fn peek_fw(&mut self) -> Result<Option<u8>> {
        let b = self.getch()?;
        if b.is_some() {
            self.ungetch();
        }
        Ok(b)
    }

    /// The byte just before the current position, or `None` at the start.
    pub fn peek_bw(&self) -> Result<Option<u8>> {
        if self.pos == 0 {
            return Ok(None);
        }
        Ok(Some(self.byte_at(self.pos - 1)?))
    }

    /// Whether the reader sits at the beginning of a line.
    pub fn at_bol(&self) -> Result<bool> {
        Ok(self.pos == 0 || self.peek_bw()? == Some(b'\n'))
    }

    /// Move to the beginning of the current line.
    pub fn goto_bol(&mut self) -> Result<()> {
        while self.pos > 0 && self.peek_bw()? != Some(b'\n') {
            self.pos -= 1;
        }
        Ok(())
    }

    /// Move to the beginning of the previous line.
    pub fn set_prev_line(&mut self) -> Result<()> {
        self.goto_bol()?;
        loop {
            self.ungetch();
            match self.peek_bw()? {
                Some(b'\n') | None => break,
                _ => {}
            }
        }
        Ok(())
    }

    /// Extract the line starting at the current position, which may be in
    /// the middle of a physical line.  Advances the reader past it.
    pub fn line_from_here(&mut self) -> Result<Option<Line>> {
        if self.at_eof() {
            return Ok(None);
        }
        let pos = self.pos;

        // A trailing newline at EOF yields no further line.
        let Some(first) = self.getch()? else {
            return Ok(None);
        };

        let mut raw = Vec::with_capacity(128);
        raw.push(first);
        if first != b'\n' {
            while let Some(b) = self.getch()? {
                raw.push(b);
                if b == b'\n' {
                    break;
                }
            }
        }

        Ok(Some(Line::new(pos, raw)))
    }

    /// The full line containing the current position.  Advances past it.
    pub fn get_this_line(&mut self) -> Result<Option<Line>> {
        if self.at_eof() {
            return Ok(None);
        }
        self.goto_bol()?;
        self.line_from_here()
    }

    /// The line before the one containing the current position, or `None`
    /// in the first line.  Leaves the reader right after the returned
    /// line, i.e. where it was called.
    pub fn get_prev_line(&mut self) -> Result<Option<Line>> {
        self.goto_bol()?;
        if self.pos == 0 {
            return Ok(None);
        }
        self.set_prev_line()?;
        self.get_this_line()
    }

    /// The full line containing an arbitrary offset, preserving the reader
    /// position.
    pub fn line_at_pos(&mut self, pos: usize) -> Result<Option<Line>> {
        let old_pos = self.pos;
        self.set_pos(pos);
        let line = self.get_this_line();
        self.set_pos(old_pos);
        line
    }

    /// 1-based number of the line containing `pos`.
    pub fn pos2line(&mut self, pos: usize) -> Result<usize> {
        if pos > self.seek {
            self.read_all()?;
        }
        if let Some(size) = self.size {
            if pos > size {
                bail!("{}: position {} beyond file size {}", self.name, pos, size);
            }
            if pos == size {
                return Ok(self.lines.len());
            }
        }
        Ok(self.lines.partition_point(|&start| start <= pos))
    }

    /// Start offset of the 1-based line `line_no`, if known.
    pub fn line_start(&self, line_no: usize) -> Option<usize> {
        self.lines.get(line_no.checked_sub(1)?).copied()
    }

    pub fn clear_match(&mut self) {
        self.current_match = None;
        self.cmatch_cell = None;
    }

    /// Reset the document prior to re-reading its input.
    pub fn reset(&mut self) {
        if let Some(source) = self.source.take() {
            source.close();
        }
        self.blocks.clear();
        self.pending.clear();
        self.size = None;
        self.seek = 0;
        self.page_last = 0;
        self.pos = 0;
        self.lines = vec![0];
        self.pending_nl = false;
        self.clear_match();
    }

    /// Open a file as a document, honoring a `LSP_OPEN`/`LESSOPEN`
    /// preprocessor specification.
    ///
    /// A spec starting with `|` pipes the preprocessor's stdout to us; the
    /// pipe is probed with a one-byte read and the original file is used
    /// when it stays empty.  Without `|` the preprocessor prints a
    /// replacement file name.
    pub fn open_path(name: &str, env_open: Option<&str>) -> Result<Self> {
        let mut doc = Self::new(name);

        if let Some(spec) = env_open {
            if let Some(pipe_spec) = spec.strip_prefix('|') {
                if doc.open_preprocessor_pipe(pipe_spec, name)? {
                    return Ok(doc);
                }
            } else if let Some(replacement) = run_replacement_preprocessor(spec, name)? {
                tracing::debug!(name, replacement = %replacement, "opening replacement file");
                doc.open_regular(&replacement)?;
                doc.rep_name = Some(replacement);
                return Ok(doc);
            }
        }

        doc.open_regular(name)?;
        Ok(doc)
    }

    fn open_regular(&mut self, path: &str) -> Result<()> {
        let file = File::open(path).with_context(|| format!("{path}: cannot open"))?;
        let meta = file
            .metadata()
            .with_context(|| format!("{path}: cannot stat"))?;

        let ftype = meta.file_type();
        #[cfg(unix)]
        let is_fifo = std::os::unix::fs::FileTypeExt::is_fifo(&ftype);
        #[cfg(not(unix))]
        let is_fifo = false;
        if !ftype.is_file() && !is_fifo {
            bail!("{path}: unsupported file type");
        }

        let size = ftype.is_file().then(|| meta.len() as usize);
        #[cfg(unix)]
        let blksize = std::os::unix::fs::MetadataExt::blksize(&meta) as usize;
        #[cfg(not(unix))]
        let blksize = DEFAULT_BLKSIZE;

        self.attach_source(Source::Reader(Box::new(file)), blksize, size);
        Ok(())
    }

    /// Try the `|`-form preprocessor.  Returns false when the pipe stayed
    /// empty and the original file should be used instead.
    fn open_preprocessor_pipe(&mut self, spec: &str, name: &str) -> Result<bool> {
        let command = spec.replace("%s", name);
        let mut child = std::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .spawn()
            .with_context(|| format!("could not start preprocessor {spec:?}"))?;
        let mut reader = child.stdout.take().expect("stdout was piped");

        // Probe with one byte; it cannot be pushed back into the pipe, so
        // it is queued for the first block read.
        let mut probe = [0u8; 1];
        let n = reader.read(&mut probe)?;
        if n == 0 {
            let _ = child.wait();
            return Ok(false);
        }

        self.pending.push(probe[0]);
        self.attach_source(Source::Child { reader, child }, DEFAULT_BLKSIZE, None);
        Ok(true)
    }

    /// Feed the document from standard input.
    pub fn open_stdin() -> Self {
        let mut doc = Self::new("");
        doc.ftype.stdin = true;
        doc.attach_source(
            Source::Reader(Box::new(std::io::stdin())),
            DEFAULT_BLKSIZE,
            None,
        );
        doc
    }

    /// Verify the line-index and block-store invariants.  Test support.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        assert_eq!(self.lines[0], 0);
        assert!(self.lines.windows(2).all(|w| w[0] < w[1]));
        let mut expect = 0;
        for block in &self.blocks {
            assert_eq!(block.seek, expect);
            expect += block.bytes.len();
        }
        assert_eq!(expect, self.seek);
        for &start in &self.lines[1..] {
            assert_eq!(self.byte_at(start - 1).unwrap(), b'\n');
        }
    }
}

/// Run the replacement-name form of the preprocessor: its stdout names
/// the file to read instead, or stays empty.
fn run_replacement_preprocessor(spec: &str, name: &str) -> Result<Option<String>> {
    let command = spec.replace("%s", name);
    let output = std::process::Command::new("sh")
        .arg("-c")
        .arg(&command)
        .stdin(std::process::Stdio::null())
        .output()
        .with_context(|| format!("could not start preprocessor {spec:?}"))?;

    let replacement = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if replacement.is_empty() {
        tracing::debug!(name, "no replacement file from preprocessor");
        Ok(None)
    } else {
        Ok(Some(replacement))
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("seek", &self.seek)
            .field("pos", &self.pos)
            .finish_non_exhaustive()
    }
}
