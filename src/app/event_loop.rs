//! The main event loop.
//!
//! Blocks on terminal events, translates them to messages, updates the
//! model and redraws.  Resize storms (users dragging window corners) are
//! absorbed by a debouncer so the expensive reflow happens once.

use std::io::stdout;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture, Event};
use crossterm::execute;
use ratatui::layout::Rect;
use ratatui::style::Modifier;
use ratatui::{DefaultTerminal, Frame};

use crate::app::model::{init_ring, InputMode, Model, PromptKind};
use crate::app::{input, update, App, Message};
use crate::document::ActiveRegex;
use crate::search::{Direction, Searcher};
use crate::style::{DEFAULT_PAIR, REVERSE_PAIR};
use crate::ui;

/// Coalesces bursts of resize events into one reflow.
pub(super) struct ResizeDebouncer {
    delay_ms: u64,
    pending: Option<(u16, u16, u64)>,
}

impl ResizeDebouncer {
    pub(super) fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            pending: None,
        }
    }

    pub(super) fn queue(&mut self, width: u16, height: u16, now_ms: u64) {
        self.pending = Some((width, height, now_ms));
    }

    pub(super) fn take_ready(&mut self, now_ms: u64) -> Option<(u16, u16)> {
        let (width, height, queued_at) = self.pending?;
        if now_ms.saturating_sub(queued_at) >= self.delay_ms {
            self.pending = None;
            Some((width, height))
        } else {
            None
        }
    }

    pub(super) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl App {
    /// Run the pager until the user quits.
    pub fn run(&self) -> Result<()> {
        let mut terminal = ratatui::init();
        let _ = execute!(stdout(), EnableMouseCapture);

        let result = self.event_loop(&mut terminal);

        let _ = execute!(stdout(), DisableMouseCapture);
        ratatui::restore();
        result
    }

    fn event_loop(&self, terminal: &mut DefaultTerminal) -> Result<()> {
        let size = terminal.size()?;
        let mut model = Model::new(self.opts.clone(), (size.width, size.height))?;
        init_ring(&mut model, &self.files)?;
        if model.ring.is_empty() {
            bail!("no input to page");
        }
        if model.opts.load_apropos {
            model.cmd_apropos()?;
        }

        let mut pending_search = !model.opts.search_string.is_empty();
        let start = Instant::now();
        let mut debouncer = ResizeDebouncer::new(200);
        let mut needs_render = true;

        loop {
            let now_ms = start.elapsed().as_millis() as u64;
            if let Some((width, height)) = debouncer.take_ready(now_ms) {
                update(&mut model, Message::Resize(width, height))?;
                needs_render = true;
            }

            if needs_render {
                model.deferred_reload()?;
                let mut view_result = Ok(());
                terminal.draw(|frame| view_result = view(&mut model, frame))?;
                view_result?;
                needs_render = false;

                if model.pairs.take_exhausted() {
                    model.show_prompt("Out of color pairs; using default colors.");
                    needs_render = true;
                }

                // An initial -s pattern fires after the first page shows.
                if pending_search {
                    pending_search = false;
                    model.search_direction = Direction::Forward;
                    model.search_string = model.opts.search_string.clone();
                    model.run_search(true)?;
                    needs_render = true;
                    continue;
                }
            }

            if model.should_quit {
                break;
            }

            let poll_ms = if debouncer.is_pending() { 10 } else { 250 };
            if event::poll(Duration::from_millis(poll_ms))? {
                // Coalesce queued events into a single render.
                loop {
                    match event::read()? {
                        Event::Resize(width, height) => debouncer.queue(width, height, now_ms),
                        ev => {
                            if let Some(msg) = input::handle_event(ev, &model) {
                                update(&mut model, msg)?;
                                needs_render = true;
                            }
                        }
                    }
                    if !event::poll(Duration::from_millis(0))? {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Draw one frame: the page, then the bottom line (status, or an input
/// prompt), then cursor placement.
fn view(model: &mut Model, frame: &mut Frame) -> Result<()> {
    let area = frame.area();
    if area.height == 0 || area.width == 0 {
        return Ok(());
    }
    model.maxy = area.height;
    model.maxx = area.width;

    let layout = model.layout();
    let chop_lines = model.opts.chop_lines;
    let line_numbers = model.opts.line_numbers;
    let shift = model.shift;
    let prompt = model.prompt.take();
    let verifier = model.verifier();
    let input_state = model.input.clone();
    let click_cursor = model.cursor;

    let Model {
        ring,
        grefs,
        pairs,
        refs_regex,
        search_regex,
        ..
    } = model;
    let doc = ring.current_mut();

    let searcher = if doc.mode.highlight {
        match doc.active_regex {
            ActiveRegex::Refs => Some(Searcher {
                regex: refs_regex,
                is_refs: true,
                grefs,
                verifier: &verifier,
            }),
            ActiveRegex::Search => search_regex.as_ref().map(|regex| Searcher {
                regex,
                is_refs: false,
                grefs,
                verifier: &verifier,
            }),
            ActiveRegex::None => None,
        }
    } else {
        None
    };

    let mut ctx = ui::RenderCtx {
        doc,
        pairs: &mut *pairs,
        searcher,
        layout,
        chop_lines,
        line_numbers,
        shift,
    };
    ui::display_page(&mut ctx, frame.buffer_mut(), area)?;
    drop(ctx);

    let doc = ring.current_mut();

    if let InputMode::FileSelect { line_no } = input_state {
        let y = area.y + line_no as u16;
        if y + 1 < area.y + area.height {
            frame.buffer_mut().set_style(
                Rect::new(area.x, y, area.width, 1),
                pairs.style(Modifier::REVERSED, REVERSE_PAIR),
            );
        }
    }

    let bottom = area.y + area.height - 1;
    match &input_state {
        InputMode::Prompt { kind, buffer } => {
            let lead = match kind {
                PromptKind::SearchForward => "/",
                PromptKind::SearchBackward => "?",
                PromptKind::ManPage => "Enter name of manpage, e.g. xyz(n): ",
            };
            let text = format!("{lead}{buffer}");
            let padded = format!("{text:<width$}", width = area.width as usize);
            frame.buffer_mut().set_string(
                area.x,
                bottom,
                padded,
                pairs.style(Modifier::empty(), DEFAULT_PAIR),
            );
            let x = (text.len() as u16).min(area.width.saturating_sub(1));
            frame.set_cursor_position((area.x + x, bottom));
        }
        _ => {
            ui::render_status_line(doc, prompt.as_deref(), pairs, frame.buffer_mut(), area)?;
            if let Some((y, x)) = doc.cmatch_cell {
                frame.set_cursor_position((x, y));
            } else if let Some((row, col)) = click_cursor {
                frame.set_cursor_position((col, row));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debouncer_holds_until_quiet() {
        let mut d = ResizeDebouncer::new(200);
        d.queue(100, 40, 0);
        assert!(d.is_pending());
        assert_eq!(d.take_ready(100), None);
        assert_eq!(d.take_ready(200), Some((100, 40)));
        assert!(!d.is_pending());
    }

    #[test]
    fn test_debouncer_restarts_on_new_event() {
        let mut d = ResizeDebouncer::new(200);
        d.queue(100, 40, 0);
        d.queue(90, 30, 150);
        assert_eq!(d.take_ready(200), None);
        assert_eq!(d.take_ready(350), Some((90, 30)));
    }
}
