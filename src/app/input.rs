//! Event-to-message translation.
//!
//! Key bindings follow the pager tradition: space/`f` pages forward, `b`
//! back, `/` and `?` search, TAB walks references, `T` folds the TOC.
//! Modal states (line prompts, the `-` toggle menu, the file list) grab
//! the keyboard until they finish.

use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};

use crate::app::model::{InputMode, Model};
use crate::app::Message;
use crate::search::Direction;

/// Translate a terminal event into a message, if it means anything in the
/// current state.  Resize events are debounced by the caller.
pub fn handle_event(event: Event, model: &Model) -> Option<Message> {
    match event {
        Event::Key(key) if key.kind != KeyEventKind::Release => handle_key(key, model),
        Event::Mouse(mouse) => handle_mouse(mouse, model),
        _ => None,
    }
}

fn handle_key(key: KeyEvent, model: &Model) -> Option<Message> {
    match &model.input {
        InputMode::Prompt { .. } => handle_prompt_key(key),
        InputMode::ToggleMenu => match key.code {
            KeyCode::Char(c) => Some(Message::ToggleOption(c)),
            KeyCode::Esc => Some(Message::ToggleOption('\0')),
            _ => None,
        },
        InputMode::FileSelect { .. } => handle_file_select_key(key),
        InputMode::Normal => handle_normal_key(key, model),
    }
}

fn handle_prompt_key(key: KeyEvent) -> Option<Message> {
    match key.code {
        KeyCode::Enter => Some(Message::PromptCommit),
        KeyCode::Esc => Some(Message::PromptCancel),
        KeyCode::Backspace => Some(Message::PromptBackspace),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Message::PromptInput(c))
        }
        _ => None,
    }
}

fn handle_file_select_key(key: KeyEvent) -> Option<Message> {
    match key.code {
        KeyCode::Up => Some(Message::SelectUp),
        KeyCode::Down => Some(Message::SelectDown),
        KeyCode::Enter => Some(Message::SelectCommit),
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(Message::SelectCancel),
        _ => None,
    }
}

fn handle_normal_key(key: KeyEvent, model: &Model) -> Option<Message> {
    let doc = model.ring.current();
    let in_toc = doc.mode.toc;

    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('l') => Some(Message::CtrlL),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Char(' ') | KeyCode::Char('f') | KeyCode::PageDown => Some(Message::PageForward),
        KeyCode::Char('b') | KeyCode::PageUp => Some(Message::PageBackward),
        KeyCode::Char('e') => Some(Message::Forward(1)),
        KeyCode::Down => {
            if in_toc {
                Some(Message::TocDown)
            } else {
                Some(Message::Forward(1))
            }
        }
        KeyCode::Char('y') => Some(Message::Backward(1)),
        KeyCode::Up => {
            if in_toc {
                Some(Message::TocUp)
            } else {
                Some(Message::Backward(1))
            }
        }
        KeyCode::Enter => {
            if in_toc {
                Some(Message::TocSelect)
            } else if doc.mode.is_refs() && doc.current_match.is_some() {
                Some(Message::VisitReference)
            } else {
                Some(Message::Forward(1))
            }
        }
        KeyCode::Char('g') | KeyCode::Char('<') => Some(Message::GoToStart),
        KeyCode::Char('G') | KeyCode::Char('>') => Some(Message::GoToEnd),
        KeyCode::Left => Some(Message::ShiftLeft),
        KeyCode::Right => Some(Message::ShiftRight),

        KeyCode::Char('/') => Some(Message::StartSearch(Direction::Forward)),
        KeyCode::Char('?') => Some(Message::StartSearch(Direction::Backward)),
        KeyCode::Char('n') => Some(Message::SearchNext),
        KeyCode::Char('p') => Some(Message::SearchPrev),
        KeyCode::Tab => Some(Message::RefsNext),
        KeyCode::BackTab => Some(Message::RefsPrev),

        KeyCode::Char('T') => Some(Message::TocToggle),
        KeyCode::Char('m') => Some(Message::OpenManPrompt),
        KeyCode::Char('a') => Some(Message::Apropos),
        KeyCode::Char('B') => Some(Message::FilesList),
        KeyCode::Char('c') => Some(Message::KillFile),
        KeyCode::Char('h') => Some(Message::Help),
        KeyCode::Char('r') => Some(Message::Reload),
        KeyCode::Char('-') => Some(Message::ToggleMenu),
        KeyCode::Esc => Some(Message::Escape),
        KeyCode::Char('q') | KeyCode::Char('Q') => Some(Message::Quit),
        _ => None,
    }
}

fn handle_mouse(mouse: MouseEvent, model: &Model) -> Option<Message> {
    if model.input != InputMode::Normal {
        return None;
    }
    match mouse.kind {
        MouseEventKind::ScrollUp => Some(Message::Backward(1)),
        MouseEventKind::ScrollDown => Some(Message::Forward(1)),
        MouseEventKind::Down(MouseButton::Left) => {
            Some(Message::MouseClick(mouse.row, mouse.column))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::document::Document;

    fn model() -> Model {
        let mut model = Model::new(Options::default(), (80, 24)).unwrap();
        model
            .ring
            .add(Document::from_bytes("t", b"content\n"), false);
        model
    }

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn test_basic_navigation_keys() {
        let m = model();
        assert_eq!(
            handle_event(key(KeyCode::Char(' ')), &m),
            Some(Message::PageForward)
        );
        assert_eq!(
            handle_event(key(KeyCode::Char('b')), &m),
            Some(Message::PageBackward)
        );
        assert_eq!(
            handle_event(key(KeyCode::Down), &m),
            Some(Message::Forward(1))
        );
        assert_eq!(
            handle_event(key(KeyCode::Char('q')), &m),
            Some(Message::Quit)
        );
    }

    #[test]
    fn test_search_keys() {
        let m = model();
        assert_eq!(
            handle_event(key(KeyCode::Char('/')), &m),
            Some(Message::StartSearch(Direction::Forward))
        );
        assert_eq!(handle_event(key(KeyCode::Tab), &m), Some(Message::RefsNext));
        assert_eq!(
            handle_event(key(KeyCode::BackTab), &m),
            Some(Message::RefsPrev)
        );
    }

    #[test]
    fn test_enter_in_toc_selects() {
        let mut m = model();
        m.ring.current_mut().mode.toc = true;
        assert_eq!(
            handle_event(key(KeyCode::Enter), &m),
            Some(Message::TocSelect)
        );
        assert_eq!(handle_event(key(KeyCode::Down), &m), Some(Message::TocDown));
    }

    #[test]
    fn test_enter_on_reference_visits() {
        let mut m = model();
        {
            let doc = m.ring.current_mut();
            doc.mode.set_refs();
            doc.current_match = Some(crate::document::Match { so: 0, eo: 3 });
        }
        assert_eq!(
            handle_event(key(KeyCode::Enter), &m),
            Some(Message::VisitReference)
        );
    }

    #[test]
    fn test_prompt_mode_captures_chars() {
        let mut m = model();
        m.input = InputMode::Prompt {
            kind: crate::app::model::PromptKind::SearchForward,
            buffer: String::new(),
        };
        assert_eq!(
            handle_event(key(KeyCode::Char('q')), &m),
            Some(Message::PromptInput('q'))
        );
        assert_eq!(
            handle_event(key(KeyCode::Enter), &m),
            Some(Message::PromptCommit)
        );
    }

    #[test]
    fn test_toggle_menu_captures_next_key() {
        let mut m = model();
        m.input = InputMode::ToggleMenu;
        assert_eq!(
            handle_event(key(KeyCode::Char('i')), &m),
            Some(Message::ToggleOption('i'))
        );
    }

    #[test]
    fn test_ctrl_l() {
        let m = model();
        let ev = Event::Key(KeyEvent::new(KeyCode::Char('l'), KeyModifiers::CONTROL));
        assert_eq!(handle_event(ev, &m), Some(Message::CtrlL));
    }

    #[test]
    fn test_mouse_wheel_scrolls() {
        let m = model();
        let ev = Event::Mouse(MouseEvent {
            kind: MouseEventKind::ScrollDown,
            column: 0,
            row: 0,
            modifiers: KeyModifiers::NONE,
        });
        assert_eq!(handle_event(ev, &m), Some(Message::Forward(1)));
    }
}
