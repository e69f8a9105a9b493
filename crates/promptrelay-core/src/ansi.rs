//! Terminal control sequence removal.
//!
//! Prompt heuristics and operator notifications work on visible text only,
//! so colors, cursor motion, erase commands and window-title updates are
//! dropped before anything looks at the output.

const ESC: u8 = 0x1B;
const BEL: u8 = 0x07;

/// Remove control sequences from raw terminal bytes and decode the rest.
///
/// Covers CSI (`ESC [`), OSC terminated by BEL or `ESC \`, and two-byte
/// `ESC x` escapes. The 8-bit `0x9B` CSI form is left alone because that byte
/// is also a UTF-8 continuation byte. Carriage returns are dropped so
/// `\r\n` line endings from the terminal come out as `\n`. Invalid UTF-8 is
/// replaced rather than rejected.
pub fn strip_ansi(input: &[u8]) -> String {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        match input[i] {
            ESC => i = skip_escape(input, i + 1),
            b'\r' => i += 1,
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }

    match String::from_utf8(out) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// Convenience wrapper for text that has already been decoded.
pub fn strip_ansi_str(input: &str) -> String {
    strip_ansi(input.as_bytes())
}

/// `pos` points just past the ESC byte. Returns the index after the sequence.
fn skip_escape(input: &[u8], pos: usize) -> usize {
    let Some(&kind) = input.get(pos) else {
        return pos;
    };
    match kind {
        b'[' => skip_csi_body(input, pos + 1),
        b']' => skip_osc_body(input, pos + 1),
        _ => skip_nf_body(input, pos),
    }
}

/// `ESC 7`, `ESC M`, `ESC ( B`: intermediate bytes (0x20-0x2F) then one
/// final byte (0x30-0x7E).
fn skip_nf_body(input: &[u8], mut pos: usize) -> usize {
    while pos < input.len() && (0x20..=0x2F).contains(&input[pos]) {
        pos += 1;
    }
    if pos < input.len() && (0x30..=0x7E).contains(&input[pos]) {
        pos += 1;
    }
    pos
}

/// Parameter and intermediate bytes (0x20-0x3F) then one final byte (0x40-0x7E).
fn skip_csi_body(input: &[u8], mut pos: usize) -> usize {
    while pos < input.len() && (0x20..=0x3F).contains(&input[pos]) {
        pos += 1;
    }
    if pos < input.len() && (0x40..=0x7E).contains(&input[pos]) {
        pos += 1;
    }
    pos
}

/// Everything up to and including BEL or the `ESC \` string terminator.
fn skip_osc_body(input: &[u8], mut pos: usize) -> usize {
    while pos < input.len() {
        match input[pos] {
            BEL => return pos + 1,
            ESC if input.get(pos + 1) == Some(&b'\\') => return pos + 2,
            _ => pos += 1,
        }
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(strip_ansi(b"Build succeeded."), "Build succeeded.");
    }

    #[test]
    fn removes_sgr_colors() {
        assert_eq!(strip_ansi(b"\x1b[1;32mok\x1b[0m done"), "ok done");
    }

    #[test]
    fn removes_cursor_and_erase() {
        assert_eq!(strip_ansi(b"\x1b[2K\x1b[1Gspinner\x1b[3A"), "spinner");
        assert_eq!(strip_ansi(b"\x1b[?25lhidden cursor\x1b[?25h"), "hidden cursor");
    }

    #[test]
    fn removes_charset_designation() {
        // `tput sgr0` under xterm-256color.
        assert_eq!(strip_ansi(b"\x1b[1mContinue?\x1b(B\x1b[m\r\n"), "Continue?\n");
        assert_eq!(strip_ansi(b"\x1b7saved\x1b8"), "saved");
        assert_eq!(strip_ansi(b"\x1b)0line"), "line");
    }

    #[test]
    fn removes_osc_title_both_terminators() {
        assert_eq!(strip_ansi(b"\x1b]0;kiro\x07after"), "after");
        assert_eq!(strip_ansi(b"\x1b]2;kiro\x1b\\after"), "after");
    }

    #[test]
    fn continuation_byte_0x9b_is_text() {
        // U+011B encodes as C4 9B.
        assert_eq!(strip_ansi("\x1b[1mě\x1b[0m".as_bytes()), "ě");
    }

    #[test]
    fn normalizes_crlf() {
        assert_eq!(strip_ansi(b"one\r\ntwo\r\n"), "one\ntwo\n");
    }

    #[test]
    fn dangling_escape_at_end() {
        assert_eq!(strip_ansi(b"Proceed? \x1b"), "Proceed? ");
        assert_eq!(strip_ansi(b"Proceed? \x1b["), "Proceed? ");
    }

    #[test]
    fn keeps_multibyte_text() {
        let input = "\x1b[36m✔\x1b[0m Déployé".as_bytes();
        assert_eq!(strip_ansi(input), "✔ Déployé");
    }

    #[test]
    fn str_wrapper_matches_bytes() {
        assert_eq!(strip_ansi_str("\x1b[33mwarn\x1b[0m"), "warn");
    }
}
