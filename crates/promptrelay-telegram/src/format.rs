//! Message sizing helpers. Telegram counts characters, not bytes.

/// Longest text a single `sendMessage` accepts.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// The first `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Split `text` into pieces of at most `max` characters, preferring to cut
/// after a newline when one falls in the second half of a piece.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    let mut pieces = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let head = truncate_chars(rest, max);
        if head.len() == rest.len() {
            pieces.push(rest.to_string());
            break;
        }

        let cut = match head.rfind('\n') {
            Some(nl) if nl + 1 >= head.len() / 2 => nl + 1,
            _ => head.len(),
        };
        pieces.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }

    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn short_text_is_one_piece() {
        assert_eq!(split_message("done.\n", 4096), vec!["done.\n"]);
        assert!(split_message("", 4096).is_empty());
    }

    #[test]
    fn splits_on_newlines_when_possible() {
        let text = "aaaa\nbbbb\ncccc\n";
        let pieces = split_message(text, 8);
        assert_eq!(pieces, vec!["aaaa\n", "bbbb\n", "cccc\n"]);
        assert_eq!(pieces.concat(), text);
    }

    #[test]
    fn hard_split_without_newlines() {
        let text = "é".repeat(10);
        let pieces = split_message(&text, 4);
        assert_eq!(pieces.len(), 3);
        assert!(pieces.iter().all(|p| p.chars().count() <= 4));
        assert_eq!(pieces.concat(), text);
    }
}
