//! lsp - list pages.
//!
//! An interactive pager for byte streams, specialized for manual pages.
//!
//! # Usage
//!
//! ```bash
//! lsp file.txt
//! man -P lsp printf
//! lsp -a                 # start with the apropos list preloaded
//! ```

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use lsp::app::App;
use lsp::config::{self, Options};

/// An interactive terminal pager specialized for manual pages
#[derive(Parser, Debug)]
#[command(name = "lsp", about, long_about = None, disable_version_flag = true)]
struct Cli {
    /// Files to page; reads stdin when empty
    #[arg(value_name = "FILE")]
    files: Vec<String>,

    /// Preload the apropos page list at startup
    #[arg(short = 'a', long = "load-apropos")]
    load_apropos: bool,

    /// Chop long lines instead of wrapping (truncate with '>')
    #[arg(short = 'c', long = "chop-lines")]
    chop_lines: bool,

    /// Case-insensitive search
    #[arg(short = 'i', long = "no-case")]
    no_case: bool,

    /// Case-sensitive manual-page names
    #[arg(short = 'I', long = "man-case")]
    man_case: bool,

    /// Do not translate carriage returns to ^M
    #[arg(long = "keep-cr")]
    keep_cr: bool,

    /// Debug log path (mkstemp template ending in XXXXXX)
    #[arg(short = 'l', long = "log-file", value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Show a line-number gutter
    #[arg(short = 'n', long = "line-numbers")]
    line_numbers: bool,

    /// Disable colored output
    #[arg(long = "no-color")]
    no_color: bool,

    /// Duplicate all read input into this file (truncated first)
    #[arg(short = 'o', long = "output-file", value_name = "PATH")]
    output_file: Option<PathBuf>,

    /// Man loader template; must contain exactly one %n and one %s
    #[arg(long = "reload-command", value_name = "FMT")]
    reload_command: Option<String>,

    /// Initial forward search pattern
    #[arg(short = 's', long = "search-string", value_name = "PATTERN")]
    search_string: Option<String>,

    /// Disable reference validation
    #[arg(short = 'V', long = "no-verify")]
    no_verify: bool,

    /// Reference validator template; must contain exactly one %n and one %s
    #[arg(long = "verify-command", value_name = "FMT")]
    verify_command: Option<String>,

    /// Validate references against the apropos snapshot
    #[arg(long = "verify-with-apropos")]
    verify_with_apropos: bool,

    /// Print version and exit
    #[arg(short = 'v', long = "version")]
    version: bool,
}

impl Cli {
    fn into_options(self) -> Result<(Options, Vec<String>)> {
        let mut opts = Options::default();
        opts.load_apropos = self.load_apropos;
        opts.chop_lines = self.chop_lines;
        if self.no_case {
            // Searches are case-insensitive by default; -i toggles.
            opts.case_sensitivity = true;
        }
        opts.man_case_sensitivity = self.man_case;
        opts.keep_cr = self.keep_cr;
        opts.line_numbers = self.line_numbers;
        if self.no_color {
            opts.color = false;
        }
        opts.output_file = self.output_file;
        opts.log_file = self.log_file;
        if let Some(cmd) = self.reload_command {
            config::validate_template(&cmd)?;
            opts.reload_command = cmd;
        }
        if self.no_verify {
            opts.verify = false;
        }
        if let Some(cmd) = self.verify_command {
            config::validate_template(&cmd)?;
            opts.verify_command = cmd;
        }
        opts.verify_with_apropos = self.verify_with_apropos;
        if let Some(pattern) = self.search_string {
            opts.search_string = pattern;
        }
        opts.read_env_open();
        Ok((opts, self.files))
    }
}

/// Build the effective argv: `LSP_OPTIONS` tokens first, then the real
/// command line.
fn effective_args() -> Result<Vec<String>> {
    let mut args: Vec<String> = std::env::args().collect();
    if let Ok(env_opts) = std::env::var("LSP_OPTIONS") {
        let tokens = config::tokenize_options(&env_opts)?;
        args.splice(1..1, tokens);
    }
    Ok(args)
}

/// The pager only works interactively; with stdout redirected it degrades
/// to a plain copy of its input.
fn run_as_cat(files: &[String]) -> Result<()> {
    if files.is_empty() {
        std::io::copy(&mut std::io::stdin().lock(), &mut std::io::stdout().lock())?;
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let err = std::process::Command::new("cat").args(files).exec();
        Err(err).context("exec cat failed")
    }
    #[cfg(not(unix))]
    {
        for file in files {
            let mut f = std::fs::File::open(file)?;
            std::io::copy(&mut f, &mut std::io::stdout().lock())?;
        }
        Ok(())
    }
}

fn init_logging(opts: &Options) -> Result<()> {
    if let Some(template) = &opts.log_file {
        let path = config::expand_log_template(template)?;
        let file = std::fs::File::create(&path)
            .with_context(|| format!("{}: cannot open log file", path.display()))?;
        tracing_subscriber::fmt()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(tracing::Level::WARN.into()),
            )
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    // git-diff(1) exports COLUMNS, which would pin our layout to the old
    // width across resizes.
    std::env::remove_var("COLUMNS");

    let cli = Cli::parse_from(effective_args()?);
    if cli.version {
        println!("lsp version {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let (opts, files) = cli.into_options()?;

    if !std::io::stdout().is_terminal() {
        return run_as_cat(&files);
    }

    init_logging(&opts)?;

    App::new(opts, files).run().context("lsp failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_parse() {
        let cli = Cli::try_parse_from(["lsp", "-a", "-c", "-n", "file.1"]).unwrap();
        assert!(cli.load_apropos);
        assert!(cli.chop_lines);
        assert!(cli.line_numbers);
        assert_eq!(cli.files, vec!["file.1"]);
    }

    #[test]
    fn test_long_flags_parse() {
        let cli = Cli::try_parse_from([
            "lsp",
            "--no-color",
            "--keep-cr",
            "--verify-with-apropos",
            "--search-string",
            "needle",
        ])
        .unwrap();
        assert!(cli.no_color);
        assert!(cli.keep_cr);
        assert!(cli.verify_with_apropos);
        assert_eq!(cli.search_string.as_deref(), Some("needle"));
    }

    #[test]
    fn test_reload_command_template_validated() {
        let cli = Cli::try_parse_from(["lsp", "--reload-command", "man %s"]).unwrap();
        assert!(cli.into_options().is_err());

        let cli = Cli::try_parse_from(["lsp", "--reload-command", "man %s %n"]).unwrap();
        let (opts, _) = cli.into_options().unwrap();
        assert_eq!(opts.reload_command, "man %s %n");
    }

    #[test]
    fn test_no_case_enables_sensitivity() {
        let cli = Cli::try_parse_from(["lsp", "-i"]).unwrap();
        let (opts, _) = cli.into_options().unwrap();
        assert!(opts.case_sensitivity);
    }

    #[test]
    fn test_no_verify_flag() {
        let cli = Cli::try_parse_from(["lsp", "-V"]).unwrap();
        let (opts, _) = cli.into_options().unwrap();
        assert!(!opts.verify);
    }
}
