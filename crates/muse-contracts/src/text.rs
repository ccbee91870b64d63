/// Strips `*` emphasis markers and collapses whitespace runs to single spaces.
///
/// Total and idempotent: any input yields a trimmed string with no `*` and no
/// two consecutive whitespace characters.
pub fn normalize(text: &str) -> String {
    text.split(|ch: char| ch.is_whitespace())
        .map(|word| word.replace('*', ""))
        .filter(|word| !word.is_empty())
        .collect::<Vec<String>>()
        .join(" ")
}

/// Keeps at most `max_chars` characters (not bytes) of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
