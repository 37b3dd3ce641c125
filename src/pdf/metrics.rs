//! Helvetica text metrics and the auto-fit algorithm.
//!
//! Field values and evidence-page text are set in the Base-14 Helvetica
//! family, so rendered widths can be computed from the standard PostScript
//! metrics (1/1000 em units) without loading a font file.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Smallest font size the auto-fit will choose.
pub const MIN_FIT_SIZE: f32 = 8.0;

/// Largest font size the auto-fit will choose.
pub const MAX_FIT_SIZE: f32 = 16.0;

/// Fraction of the box width the fitted text may occupy.
pub const FIT_WIDTH_RATIO: f32 = 0.9;

fn helvetica_widths() -> &'static HashMap<char, f32> {
    static WIDTHS: OnceLock<HashMap<char, f32>> = OnceLock::new();
    WIDTHS.get_or_init(|| {
        let mut widths = HashMap::new();

        // Whitespace and punctuation
        widths.insert(' ', 278.0);
        widths.insert('.', 278.0);
        widths.insert(',', 278.0);
        widths.insert('-', 333.0);
        widths.insert(':', 278.0);
        widths.insert(';', 278.0);
        widths.insert('!', 333.0);
        widths.insert('?', 500.0);
        widths.insert('\'', 222.0);
        widths.insert('"', 400.0);
        widths.insert('(', 333.0);
        widths.insert(')', 333.0);
        widths.insert('[', 333.0);
        widths.insert(']', 333.0);
        widths.insert('/', 278.0);
        widths.insert('\\', 278.0);
        widths.insert('@', 1015.0);
        widths.insert('#', 556.0);
        widths.insert('$', 556.0);
        widths.insert('%', 889.0);
        widths.insert('&', 667.0);
        widths.insert('*', 389.0);
        widths.insert('+', 584.0);
        widths.insert('=', 584.0);
        widths.insert('<', 584.0);
        widths.insert('>', 584.0);
        widths.insert('|', 260.0);
        widths.insert('_', 556.0);

        for digit in '0'..='9' {
            widths.insert(digit, 556.0);
        }

        for (ch, w) in [
            ('A', 667.0), ('B', 667.0), ('C', 722.0), ('D', 722.0), ('E', 667.0),
            ('F', 611.0), ('G', 778.0), ('H', 722.0), ('I', 278.0), ('J', 500.0),
            ('K', 667.0), ('L', 556.0), ('M', 833.0), ('N', 722.0), ('O', 778.0),
            ('P', 667.0), ('Q', 778.0), ('R', 722.0), ('S', 667.0), ('T', 611.0),
            ('U', 722.0), ('V', 667.0), ('W', 944.0), ('X', 667.0), ('Y', 667.0),
            ('Z', 611.0),
        ] {
            widths.insert(ch, w);
        }

        for (ch, w) in [
            ('a', 556.0), ('b', 556.0), ('c', 500.0), ('d', 556.0), ('e', 556.0),
            ('f', 278.0), ('g', 556.0), ('h', 556.0), ('i', 222.0), ('j', 222.0),
            ('k', 500.0), ('l', 222.0), ('m', 833.0), ('n', 556.0), ('o', 556.0),
            ('p', 556.0), ('q', 556.0), ('r', 333.0), ('s', 500.0), ('t', 278.0),
            ('u', 556.0), ('v', 500.0), ('w', 722.0), ('x', 500.0), ('y', 500.0),
            ('z', 500.0),
        ] {
            widths.insert(ch, w);
        }

        widths
    })
}

/// Rendered width of `text` in Helvetica at `font_size`, in points.
///
/// Unknown characters fall back to 500/1000 em, matching the usual
/// treatment of unmapped glyphs.
pub fn text_width(text: &str, font_size: f32) -> f32 {
    let widths = helvetica_widths();
    let units: f32 = text.chars().map(|c| widths.get(&c).copied().unwrap_or(500.0)).sum();
    units * font_size / 1000.0
}

/// Choose the largest font size in `[MIN_FIT_SIZE, MAX_FIT_SIZE]` whose
/// rendered width fits within `FIT_WIDTH_RATIO` of `box_width`.
///
/// Falls back to `MIN_FIT_SIZE` when nothing fits. Never fails.
pub fn fit_font_size(text: &str, box_width: f32) -> f32 {
    let budget = box_width * FIT_WIDTH_RATIO;
    let mut size = MAX_FIT_SIZE;
    while size > MIN_FIT_SIZE {
        if text_width(text, size) <= budget {
            return size;
        }
        size -= 1.0;
    }
    MIN_FIT_SIZE
}

/// Truncate `text` to at most `budget` characters, appending an ellipsis
/// marker when anything was cut.
pub fn truncate_chars(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    let kept: String = text.chars().take(budget.saturating_sub(3)).collect();
    format!("{}...", kept)
}
