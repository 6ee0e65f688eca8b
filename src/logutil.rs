//! Helpers for putting chat input into log lines.
//! Chat messages may hold newlines or control characters; logs stay one line per record.

/// Default preview length for chat text in logs, in characters.
pub const LOG_PREVIEW_CHARS: usize = 120;

/// Escape a user message for single-line logging, capped at [`LOG_PREVIEW_CHARS`].
pub fn escape_log(s: &str) -> String {
    escape_log_capped(s, LOG_PREVIEW_CHARS)
}

/// Escape `s` for a single log line:
/// - `\n`, `\r`, `\t` and backslash become their escaped forms
/// - other control characters become `\xNN`
/// - text past `max_chars` characters is replaced with `…`
pub fn escape_log_capped(s: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(s.len().min(max_chars * 4) + 4);
    for (count, ch) in s.chars().enumerate() {
        if count >= max_chars {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_newlines_and_tabs() {
        assert_eq!(escape_log("Омск\nТомск\t!"), "Омск\\nТомск\\t!");
    }

    #[test]
    fn caps_by_characters_not_bytes() {
        let esc = escape_log_capped("Барнаул", 3);
        assert_eq!(esc, "Бар…");
    }
}
