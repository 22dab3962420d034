#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::collapsible_if,
    clippy::collapsible_else_if,
    clippy::items_after_statements,
    clippy::uninlined_format_args
)]

//! # lsp
//!
//! An interactive terminal pager for byte streams, specialized for
//! manual pages.
//!
//! lsp pages anything but knows man pages well: it interprets SGR color
//! sequences and grotty backspace overstrikes, follows cross-references
//! between pages, folds content into a three-level table of contents, and
//! reflows width-sensitive pages when the window resizes.
//!
//! ## Modules
//!
//! - [`app`]: model, messages and the event loop
//! - [`document`]: lazily loaded byte documents, lines, wrapping
//! - [`search`]: regex search over normalized content
//! - [`toc`]: the folding table of contents
//! - [`refs`]: man-page references and their validation cache
//! - [`man`]: the man-page loader and apropos plumbing
//! - [`style`]: SGR decoding and color pairs
//! - [`ui`]: page and status-line rendering
//! - [`config`]: options and command templates

pub mod app;
pub mod config;
pub mod document;
pub mod man;
pub mod refs;
pub mod search;
pub mod style;
pub mod toc;
pub mod ui;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::app::{App, Message, Model};
    pub use crate::config::Options;
    pub use crate::document::{Document, DocumentRing, Line};
}
