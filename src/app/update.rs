//! Messages and state transitions.
//!
//! Every user intent and system event is a [`Message`]; [`update`] applies
//! it to the [`Model`].  Heavy work (searching, loading man pages) happens
//! in the model's command methods.

use anyhow::Result;

use crate::app::model::{InputMode, Model, PromptKind, HELP_PAGE};
use crate::search::Direction;

/// All possible events and actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    // Navigation
    /// Advance one page (the display continues from `page_last`).
    PageForward,
    /// Scroll back one page.
    PageBackward,
    /// Scroll forward n lines.
    Forward(usize),
    /// Scroll backward n lines.
    Backward(usize),
    GoToStart,
    GoToEnd,
    ShiftLeft,
    ShiftRight,

    // Search
    /// Open the search prompt.
    StartSearch(Direction),
    /// Continue the user search.
    SearchNext,
    SearchPrev,
    /// Move between references.
    RefsNext,
    RefsPrev,
    /// Open the reference under the current match.
    VisitReference,

    // Prompt editing (search pattern, man-page name)
    PromptInput(char),
    PromptBackspace,
    PromptCommit,
    PromptCancel,

    // Documents
    /// Open the man-page name prompt.
    OpenManPrompt,
    /// Show the apropos pseudo-document.
    Apropos,
    /// Show the open-files list.
    FilesList,
    /// Kill the current document.
    KillFile,
    /// Open the help page.
    Help,
    /// Re-read the current document.
    Reload,

    // File-select mode
    SelectUp,
    SelectDown,
    SelectCommit,
    SelectCancel,

    // TOC
    /// Build/enter the TOC, or cycle the level inside it.
    TocToggle,
    /// Jump to the TOC cursor entry.
    TocSelect,
    TocUp,
    TocDown,

    // Modes
    /// `-` pressed: the next key names an option.
    ToggleMenu,
    ToggleOption(char),
    Escape,
    CtrlL,

    // Window
    Resize(u16, u16),
    MouseClick(u16, u16),
    Quit,
}

/// Whether a message keeps refs mode alive; anything else leaving a refs
/// context clears highlighting.
fn keeps_refs_mode(msg: &Message) -> bool {
    matches!(
        msg,
        Message::RefsNext
            | Message::RefsPrev
            | Message::VisitReference
            | Message::Resize(_, _)
    )
}

/// Apply a message to the model.
pub fn update(model: &mut Model, msg: Message) -> Result<()> {
    if model.ring.is_empty() {
        model.should_quit = true;
        return Ok(());
    }

    if model.ring.current().mode.is_refs() && !keeps_refs_mode(&msg) {
        let doc = model.ring.current_mut();
        doc.mode.highlight = false;
        doc.mode.unset_search_or_refs();
    }

    let was_ctrl_l = matches!(msg, Message::CtrlL);

    // After a draw the reader sits at `page_last`, which is exactly what
    // paging forward wants.  Every other command starts from the page top
    // and repositions on its own terms.
    if !matches!(msg, Message::PageForward) {
        model.reset_to_page_top();
    }

    match msg {
        Message::PageForward => {
            model.cursor = None;
            model.page_forward();
        }
        Message::PageBackward => {
            model.cursor = None;
            if model.ring.current().mode.toc {
                model.toc_page_backward();
            } else {
                model.backward(0)?;
            }
        }
        Message::Forward(n) => {
            model.cursor = None;
            model.forward(n)?;
        }
        Message::Backward(n) => {
            model.cursor = None;
            model.backward(n)?;
        }
        Message::GoToStart => {
            model.cursor = None;
            model.goto_start()?;
        }
        Message::GoToEnd => {
            model.cursor = None;
            model.goto_end()?;
        }
        Message::ShiftLeft => model.shift_left(),
        Message::ShiftRight => model.shift_right(),

        Message::StartSearch(direction) => {
            model.cursor = None;
            model.search_direction = direction;
            if !model.search_string.is_empty() {
                model.search_string_old = model.search_string.clone();
            }
            model.search_string.clear();
            model.input = InputMode::Prompt {
                kind: match direction {
                    Direction::Forward => PromptKind::SearchForward,
                    Direction::Backward => PromptKind::SearchBackward,
                },
                buffer: String::new(),
            };
        }
        Message::SearchNext => {
            model.cursor = None;
            if model.search_regex.is_some() {
                model.ring.current_mut().active_regex = crate::document::ActiveRegex::Search;
                model.search_next()?;
            } else {
                model.reset_to_page_top();
            }
        }
        Message::SearchPrev => {
            model.cursor = None;
            if model.search_regex.is_some() {
                model.ring.current_mut().active_regex = crate::document::ActiveRegex::Search;
                model.search_prev()?;
            } else {
                model.reset_to_page_top();
            }
        }
        Message::RefsNext => {
            model.cursor = None;
            model.search_refs(Direction::Forward)?;
        }
        Message::RefsPrev => {
            model.cursor = None;
            model.search_refs(Direction::Backward)?;
        }
        Message::VisitReference => {
            model.cursor = None;
            model.visit_reference()?;
        }

        Message::PromptInput(c) => {
            if let InputMode::Prompt { buffer, .. } = &mut model.input {
                buffer.push(c);
            }
        }
        Message::PromptBackspace => {
            if let InputMode::Prompt { buffer, .. } = &mut model.input {
                buffer.pop();
            }
        }
        Message::PromptCommit => {
            if let InputMode::Prompt { kind, buffer } = model.input.clone() {
                model.input = InputMode::Normal;
                match kind {
                    PromptKind::SearchForward | PromptKind::SearchBackward => {
                        model.search_string = buffer;
                        model.run_search(true)?;
                    }
                    PromptKind::ManPage => {
                        if !buffer.is_empty() {
                            model.open_manpage(&buffer)?;
                        }
                    }
                }
            }
        }
        Message::PromptCancel => {
            model.input = InputMode::Normal;
        }

        Message::OpenManPrompt => {
            model.input = InputMode::Prompt {
                kind: PromptKind::ManPage,
                buffer: String::new(),
            };
        }
        Message::Apropos => {
            model.ring.current_mut().mode.reset();
            model.cmd_apropos()?;
        }
        Message::FilesList => {
            model.ring.current_mut().mode.reset();
            model.files_list()?;
        }
        Message::KillFile => {
            model.ring.current_mut().mode.reset();
            model.kill_current();
        }
        Message::Help => {
            model.open_manpage(HELP_PAGE)?;
        }
        Message::Reload => {
            model.reload_current()?;
        }

        Message::SelectUp => {
            if let InputMode::FileSelect { line_no } = &mut model.input {
                if *line_no > 0 {
                    *line_no -= 1;
                }
            }
            model.show_prompt("Select file and press ENTER.");
        }
        Message::SelectDown => {
            let limit = model.ring.current().lines_count().saturating_sub(1);
            if let InputMode::FileSelect { line_no } = &mut model.input {
                if *line_no < limit {
                    *line_no += 1;
                }
            }
            model.show_prompt("Select file and press ENTER.");
        }
        Message::SelectCommit => {
            if let InputMode::FileSelect { line_no } = model.input {
                model.file_select_commit(line_no)?;
            }
        }
        Message::SelectCancel => {
            model.file_select_cancel();
        }

        Message::TocToggle => {
            if model.ring.current().mode.toc {
                model.toc_cycle_level();
            } else {
                model.toc_enter()?;
            }
        }
        Message::TocSelect => {
            model.toc_select();
        }
        Message::TocUp => model.toc_up(),
        Message::TocDown => model.toc_down(),

        Message::ToggleMenu => {
            model.reset_to_page_top();
            model.input = InputMode::ToggleMenu;
        }
        Message::ToggleOption(c) => {
            model.input = InputMode::Normal;
            model.toggle_option(c);
        }
        Message::Escape => {
            model.cursor = None;
            model.ring.current_mut().mode.highlight = false;
            model.reset_to_page_top();
        }
        Message::CtrlL => {
            model.ctrl_l()?;
        }

        Message::Resize(cols, rows) => {
            model.cursor = None;
            model.resize(cols, rows)?;
        }
        Message::MouseClick(row, col) => {
            model.cursor = Some((row, col));
            model.reset_to_page_top();
        }
        Message::Quit => {
            model.quit();
        }
    }

    model.last_key_was_ctrl_l = was_ctrl_l;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::document::Document;

    fn model() -> Model {
        let mut model = Model::new(Options::default(), (80, 24)).unwrap();
        let mut doc = Document::from_bytes("t", b"See lsp(1) for needle details\nmore\n");
        doc.page_last = doc.size.unwrap();
        model.ring.add(doc, false);
        model
    }

    #[test]
    fn test_start_search_enters_prompt() {
        let mut m = model();
        update(&mut m, Message::StartSearch(Direction::Forward)).unwrap();
        assert!(matches!(
            m.input,
            InputMode::Prompt {
                kind: PromptKind::SearchForward,
                ..
            }
        ));
    }

    #[test]
    fn test_prompt_editing_and_commit() {
        let mut m = model();
        update(&mut m, Message::StartSearch(Direction::Forward)).unwrap();
        for c in "needle".chars() {
            update(&mut m, Message::PromptInput(c)).unwrap();
        }
        update(&mut m, Message::PromptBackspace).unwrap();
        update(&mut m, Message::PromptInput('e')).unwrap();
        update(&mut m, Message::PromptCommit).unwrap();
        assert_eq!(m.search_string, "needle");
        assert!(m.ring.current().mode.highlight);
        assert_eq!(m.input, InputMode::Normal);
    }

    #[test]
    fn test_prompt_cancel() {
        let mut m = model();
        update(&mut m, Message::StartSearch(Direction::Backward)).unwrap();
        update(&mut m, Message::PromptCancel).unwrap();
        assert_eq!(m.input, InputMode::Normal);
        assert!(!m.ring.current().mode.highlight);
    }

    #[test]
    fn test_non_refs_key_clears_refs_mode() {
        let mut m = model();
        m.opts.verify = false;
        update(&mut m, Message::RefsNext).unwrap();
        assert!(m.ring.current().mode.is_refs());
        assert!(m.ring.current().mode.highlight);

        update(&mut m, Message::Forward(1)).unwrap();
        assert!(!m.ring.current().mode.is_refs());
        assert!(!m.ring.current().mode.highlight);
    }

    #[test]
    fn test_refs_keys_keep_refs_mode() {
        let mut m = model();
        m.opts.verify = false;
        update(&mut m, Message::RefsNext).unwrap();
        update(&mut m, Message::RefsPrev).unwrap();
        assert!(m.ring.current().mode.is_refs());
    }

    #[test]
    fn test_escape_clears_highlight() {
        let mut m = model();
        m.search_string = "needle".to_string();
        m.run_search(true).unwrap();
        assert!(m.ring.current().mode.highlight);
        update(&mut m, Message::Escape).unwrap();
        assert!(!m.ring.current().mode.highlight);
    }

    #[test]
    fn test_toggle_menu_flow() {
        let mut m = model();
        update(&mut m, Message::ToggleMenu).unwrap();
        assert_eq!(m.input, InputMode::ToggleMenu);
        update(&mut m, Message::ToggleOption('c')).unwrap();
        assert_eq!(m.input, InputMode::Normal);
        assert!(m.opts.chop_lines);
    }

    #[test]
    fn test_ctrl_l_tracking() {
        let mut m = model();
        update(&mut m, Message::CtrlL).unwrap();
        assert!(m.last_key_was_ctrl_l);
        update(&mut m, Message::Forward(1)).unwrap();
        assert!(!m.last_key_was_ctrl_l);
    }

    #[test]
    fn test_quit_message() {
        let mut m = model();
        update(&mut m, Message::Quit).unwrap();
        assert!(m.should_quit);
    }

    #[test]
    fn test_resize_updates_geometry() {
        let mut m = model();
        update(&mut m, Message::Resize(100, 40)).unwrap();
        assert_eq!((m.maxx, m.maxy), (100, 40));
    }

    #[test]
    fn test_mouse_click_places_cursor() {
        let mut m = model();
        update(&mut m, Message::MouseClick(3, 7)).unwrap();
        assert_eq!(m.cursor, Some((3, 7)));
    }
}
