//! SGR decoding and color-pair interning.
//!
//! Display attributes travel through the engine as a pair of small values:
//! a [`Modifier`] mask and a color-pair id.  Pairs are interned on first
//! use, up to a fixed limit; exhaustion falls back to the default pair and
//! is reported once on the status line.

use ratatui::style::{Color, Modifier, Style};

use crate::document::sgr_len;

/// Identifier of an interned (foreground, background) pair.
pub type PairId = u16;

pub const DEFAULT_PAIR: PairId = 0;
/// Pair used for bold text and `c\bc` overstrikes.
pub const BOLD_PAIR: PairId = 1;
/// Pair used for underlined text and `_\bc` overstrikes.
pub const UL_PAIR: PairId = 2;
/// Pair used for standout: search matches, the status line, TOC cursor.
pub const REVERSE_PAIR: PairId = 3;

/// Interned color pairs.
pub struct PairTable {
    pairs: Vec<(Color, Color)>,
    limit: usize,
    color: bool,
    /// A pair allocation failed; reported once via the status line.
    pub exhausted: bool,
}

impl PairTable {
    pub fn new(color: bool) -> Self {
        Self {
            pairs: vec![
                (Color::Reset, Color::Reset),
                (Color::Blue, Color::Reset),
                (Color::Cyan, Color::Reset),
                (Color::White, Color::Magenta),
            ],
            limit: 256,
            color,
            exhausted: false,
        }
    }

    /// Pair with the given colors, interning a new one on first use.
    ///
    /// Falls back to the default pair when the table is full.
    pub fn pair(&mut self, fg: Color, bg: Color) -> PairId {
        if let Some(id) = self.pairs.iter().position(|&p| p == (fg, bg)) {
            return id as PairId;
        }
        if self.pairs.len() >= self.limit {
            self.exhausted = true;
            return DEFAULT_PAIR;
        }
        self.pairs.push((fg, bg));
        (self.pairs.len() - 1) as PairId
    }

    /// Report pair exhaustion once, for the status line.
    pub fn take_exhausted(&mut self) -> bool {
        std::mem::take(&mut self.exhausted)
    }

    pub fn colors(&self, id: PairId) -> (Color, Color) {
        self.pairs
            .get(id as usize)
            .copied()
            .unwrap_or((Color::Reset, Color::Reset))
    }

    /// Terminal style for an attribute mask and pair.
    pub fn style(&self, attr: Modifier, pair: PairId) -> Style {
        let mut style = Style::default().add_modifier(attr);
        if self.color {
            let (fg, bg) = self.colors(pair);
            if fg != Color::Reset {
                style = style.fg(fg);
            }
            if bg != Color::Reset {
                style = style.bg(bg);
            }
        }
        style
    }
}

fn standard_color(n: u64) -> Color {
    match n {
        0 => Color::Black,
        1 => Color::Red,
        2 => Color::Green,
        3 => Color::Yellow,
        4 => Color::Blue,
        5 => Color::Magenta,
        6 => Color::Cyan,
        _ => Color::Gray,
    }
}

fn bright_color(n: u64) -> Color {
    match n {
        0 => Color::DarkGray,
        1 => Color::LightRed,
        2 => Color::LightGreen,
        3 => Color::LightYellow,
        4 => Color::LightBlue,
        5 => Color::LightMagenta,
        6 => Color::LightCyan,
        _ => Color::White,
    }
}

/// Decode the SGR sequence at the start of `seq` into `attr` and `pair`.
///
/// Returns the length of the processed sequence; the caller must have
/// verified it with [`sgr_len`] first.  Only a subset of SGR parameters is
/// implemented; unknown ones are logged and ignored.
pub fn decode_sgr(
    seq: &[u8],
    attr: &mut Modifier,
    pair: &mut PairId,
    pairs: &mut PairTable,
) -> usize {
    let Some(len) = sgr_len(seq) else {
        return 0;
    };

    if len == 3 {
        // Bare "\e[m" resets everything.
        *attr = Modifier::empty();
        *pair = DEFAULT_PAIR;
        return len;
    }

    let (mut fg, mut bg) = pairs.colors(*pair);

    let params: Vec<u64> = seq[2..len - 1]
        .split(|&b| b == b';')
        .map(|p| {
            std::str::from_utf8(p)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0)
        })
        .collect();

    let mut i = 0;
    while i < params.len() {
        let n = params[i];
        match n {
            0 => {
                *attr = Modifier::empty();
                (fg, bg) = pairs.colors(DEFAULT_PAIR);
            }
            1 => {
                *attr = Modifier::BOLD;
                (fg, bg) = pairs.colors(BOLD_PAIR);
            }
            2 => *attr = Modifier::DIM,
            3 => *attr = Modifier::ITALIC,
            4 | 9 | 21 => {
                // Strike-through is shown as underline.
                *attr = Modifier::UNDERLINED;
                (fg, bg) = pairs.colors(UL_PAIR);
            }
            5 | 6 => *attr = Modifier::SLOW_BLINK,
            7 => {
                *attr = Modifier::REVERSED;
                (fg, bg) = pairs.colors(REVERSE_PAIR);
            }
            8 => *attr = Modifier::HIDDEN,
            22 => {
                attr.remove(Modifier::BOLD | Modifier::DIM);
                fg = Color::Reset;
                bg = Color::Reset;
            }
            24 => {
                attr.remove(Modifier::UNDERLINED);
                fg = Color::Reset;
                bg = Color::Reset;
            }
            30..=37 => fg = standard_color(n - 30),
            39 => fg = Color::Reset,
            40..=47 => bg = standard_color(n - 40),
            49 => bg = Color::Reset,
            90..=97 => fg = bright_color(n - 90),
            100..=107 => bg = bright_color(n - 100),
            38 | 48 => {
                // 256-color form "38;5;n"; anything else is passed over.
                if params.get(i + 1) == Some(&5) {
                    if let Some(&idx) = params.get(i + 2) {
                        let color = Color::Indexed(idx.min(255) as u8);
                        if n == 38 {
                            fg = color;
                        } else {
                            bg = color;
                        }
                        i += 2;
                    }
                }
            }
            _ => {
                tracing::debug!(param = n, "unhandled SGR parameter");
            }
        }
        i += 1;
    }

    *pair = pairs.pair(fg, bg);
    len
}
