//! Runtime options and command templates.
//!
//! Options come from the command line and from the `LSP_OPTIONS`
//! environment variable (tokenized with `"..."` quoting, merged before the
//! real argv).  The man-loader and reference-verify commands are templates
//! carrying exactly one `%n` (page name) and one `%s` (section).

use std::path::PathBuf;

use anyhow::{bail, Result};

/// Effective runtime options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Truncate long lines with a `>` marker instead of wrapping.
    pub chop_lines: bool,
    /// Preload the apropos pseudo-document at startup.
    pub load_apropos: bool,
    /// Command producing the apropos listing.
    pub apropos_command: String,
    /// Case-sensitive searching.
    pub case_sensitivity: bool,
    /// Case-sensitive manual-page names.
    pub man_case_sensitivity: bool,
    /// Pass `\r` through instead of showing `^M`.
    pub keep_cr: bool,
    /// Show a line-number gutter.
    pub line_numbers: bool,
    /// Colored output.
    pub color: bool,
    /// Tee all read input to this path.
    pub output_file: Option<PathBuf>,
    /// Debug log path (mkstemp-style template).
    pub log_file: Option<PathBuf>,
    /// Man-loader command template.
    pub reload_command: String,
    /// Validate references before highlighting them.
    pub verify: bool,
    /// Reference validator command template.
    pub verify_command: String,
    /// Validate against the apropos snapshot instead of a command.
    pub verify_with_apropos: bool,
    /// Initial forward search pattern.
    pub search_string: String,
    pub tab_width: usize,
    /// Preprocessor specification from `LSP_OPEN` / `LESSOPEN`.
    pub env_open: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            chop_lines: false,
            load_apropos: false,
            apropos_command: "apropos . | sort | sed 's/ (/(/'".to_string(),
            case_sensitivity: false,
            man_case_sensitivity: false,
            keep_cr: false,
            line_numbers: false,
            color: true,
            output_file: None,
            log_file: None,
            reload_command: "man %s %n".to_string(),
            verify: true,
            verify_command: "man -w %s %n > /dev/null 2>&1".to_string(),
            verify_with_apropos: false,
            search_string: String::new(),
            tab_width: 8,
            env_open: None,
        }
    }
}

impl Options {
    /// Read the preprocessor spec: `LSP_OPEN` wins over `LESSOPEN`.
    pub fn read_env_open(&mut self) {
        self.env_open = std::env::var("LSP_OPEN")
            .ok()
            .or_else(|| std::env::var("LESSOPEN").ok());
    }
}

/// Expand a command template: `%n` becomes the page name, `%s` the
/// section.  An empty section collapses an adjacent `.` or `(` (and its
/// closing `)`), so `man %n.%s` degrades to `man name`.
pub fn expand_command(template: &str, name: &str, section: &str) -> String {
    let mut out = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('n') => {
                chars.next();
                out.push_str(name);
            }
            Some('s') => {
                chars.next();
                if section.is_empty() {
                    match out.chars().last() {
                        Some('.') => {
                            out.pop();
                        }
                        Some('(') => {
                            out.pop();
                            if chars.peek() == Some(&')') {
                                chars.next();
                            }
                        }
                        _ => {}
                    }
                } else {
                    out.push_str(section);
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Check that a command template carries exactly one `%n` and one `%s`.
pub fn validate_template(template: &str) -> Result<()> {
    let count = |needle: &str| template.match_indices(needle).count();
    if count("%n") != 1 || count("%s") != 1 {
        bail!(
            "command template must contain exactly one %n and one %s: {:?}",
            template
        );
    }
    Ok(())
}

/// Break an `LSP_OPTIONS` value into argv-style tokens.
///
/// Tokens are separated by runs of spaces; `"..."` groups spaces into one
/// token.  Unmatched quotes are an error.
pub fn tokenize_options(options: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_word = false;

    for c in options.trim_start().chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                in_word = true;
            }
            ' ' if !in_quotes => {
                if in_word {
                    tokens.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            _ => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if in_quotes {
        bail!("unmatched quotes in options: {:?}", options);
    }
    if in_word {
        tokens.push(current);
    }

    Ok(tokens)
}

/// Expand a mkstemp-style template path: the trailing `XXXXXX` is replaced
/// with a unique suffix.
pub fn expand_log_template(path: &std::path::Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if !name.ends_with("XXXXXX") {
        bail!("log file must match a mkstemp template ending in XXXXXX");
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let suffix = format!("{:06x}{:x}", nanos & 0xff_ffff, std::process::id());
    let expanded = name.trim_end_matches("XXXXXX");
    Ok(path.with_file_name(format!("{expanded}{suffix}")))
}
