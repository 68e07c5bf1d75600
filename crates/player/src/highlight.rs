//! Word highlighting for the text view

use std::ops::Range;

/// Byte range of the word under a boundary offset
///
/// `char_offset` counts characters, as host boundary callbacks do. Returns an
/// empty range when the offset is out of bounds or points at whitespace.
pub fn word_range(text: &str, char_offset: usize) -> Range<usize> {
    let Some((byte, c)) = text.char_indices().nth(char_offset) else {
        return 0..0;
    };
    if c.is_whitespace() {
        return byte..byte;
    }

    let start = text[..byte]
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);

    let end = text[byte..]
        .find(char::is_whitespace)
        .map(|i| byte + i)
        .unwrap_or(text.len());

    start..end
}
