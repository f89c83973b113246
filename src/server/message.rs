//! Text that goes over the wire to chat clients.

use chrono::{DateTime, Local};

/// Local-time stamp used in every chat line and join announcement
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Cursor up one line, then clear it.
pub const ERASE_PREVIOUS_LINE: &str = "\x1b[1A\x1b[K";

/// `[<ts>] <name> joined the chat!`
pub fn join_announcement(name: &str, at: &DateTime<Local>) -> String {
    format!("[{}] {} joined the chat!", at.format(TIMESTAMP_FORMAT), name)
}

/// `[<ts>][<name>]: <text>`
pub fn chat_line(name: &str, text: &str, at: &DateTime<Local>) -> String {
    format!("[{}][{}]: {}", at.format(TIMESTAMP_FORMAT), name, text)
}

/// Decode one raw line (invalid UTF-8 is replaced, not rejected) and drop
/// the line terminator along with any other trailing whitespace.
pub fn clean_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 12, 5, 7).unwrap()
    }

    #[test]
    fn test_join_announcement_format() {
        assert_eq!(
            join_announcement("alice", &noon()),
            "[2024-03-09 12:05:07] alice joined the chat!"
        );
    }

    #[test]
    fn test_chat_line_format() {
        assert_eq!(chat_line("A", "hello", &noon()), "[2024-03-09 12:05:07][A]: hello");
    }

    #[test]
    fn test_chat_line_empty_name_and_text() {
        assert_eq!(chat_line("", "", &noon()), "[2024-03-09 12:05:07][]: ");
    }

    #[test]
    fn test_clean_line_trims_trailing_only() {
        assert_eq!(clean_line(b"  hi there \r\n"), "  hi there");
        assert_eq!(clean_line(b"\n"), "");
    }

    #[test]
    fn test_clean_line_lossy_utf8() {
        assert_eq!(clean_line(b"caf\xff\n"), "caf\u{FFFD}");
    }
}
