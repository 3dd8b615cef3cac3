//! Terminal noise filter.
//!
//! Strips escape sequences and control bytes from pty output and classifies the
//! remaining text as signal or garbage. Classification only applies to the legacy
//! raw-text path; structured event lines never reach [`is_garbage`].

use once_cell::sync::Lazy;
use regex::Regex;

// ========== Patterns ==========

/// CSI sequences (colors, cursor movement, erase, ...)
static CSI_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]").expect("invalid CSI pattern"));

/// OSC sequences ending with BEL or ST (or cut off at the end of the chunk)
static OSC_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\][^\x07\x1b]*(?:\x07|\x1b\\|$)").expect("invalid OSC pattern")
});

/// DCS/SOS/PM/APC strings, charset selection, and single-char private escapes
static DEVICE_CONTROL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\x1b[P^_X][^\x1b]*(?:\x1b\\|$)",
        r"|\x1b[()*+][A-Za-z0-9]",
        r"|\x1b[=>78MNODEHcZ]",
    ))
    .expect("invalid device control pattern")
});

/// Control characters other than newline, tab and ESC
static CONTROL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x00-\x08\x0b-\x1a\x1c-\x1f\x7f]").expect("invalid control pattern")
});

static MULTI_SPACE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" {2,}").expect("invalid space pattern"));

/// Left-over positional/mode-setting sequence with its ESC already gone (e.g. "[2K", "[?25l")
static ESCAPE_REMNANT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[(?:\?[0-9;]*|[0-9;]+)[A-Za-z]").expect("invalid remnant pattern")
});

/// Multiplexer status lines: "[main] 0:zsh*", "12:30 ...", "17-Oct-26 ...", "2026-10-17 ..."
static STATUS_LINE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^\[[^\]]+\]\s*\d+:\S",
        r"|^\d{1,2}:\d{2}(?::\d{2})?(?:\s|$)",
        r"|^\d{1,2}[-/. ][A-Za-z]{3,9}[-/. ]\d{2,4}",
        r"|^\d{4}-\d{2}-\d{2}",
    ))
    .expect("invalid status line pattern")
});

/// Lifecycle banners printed by the terminal host around reconnects
static LIFECYCLE_BANNER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)session restored|server exited|reconnected")
        .expect("invalid lifecycle banner pattern")
});

/// Lines shorter than this (in chars) are never signal.
const MIN_SIGNAL_CHARS: usize = 3;

/// Minimum share of printable ASCII, in tenths.
const MIN_PRINTABLE_TENTHS: usize = 7;

// ========== Stripping ==========

/// Remove escape sequences and control characters, keeping all other text as-is.
///
/// Used for streamed text deltas, where spacing and newlines are content.
pub fn strip_escapes(text: &str) -> String {
    let text = CSI_PATTERN.replace_all(text, "");
    let text = OSC_PATTERN.replace_all(&text, "");
    let text = DEVICE_CONTROL_PATTERN.replace_all(&text, "");
    let text = CONTROL_PATTERN.replace_all(&text, "");
    text.replace('\x1b', "")
}

/// Remove terminal noise from a chunk, collapse space runs and trim the edges.
///
/// Idempotent: `strip(&strip(x)) == strip(x)`.
pub fn strip(text: &str) -> String {
    let text = strip_escapes(text);
    MULTI_SPACE_PATTERN.replace_all(&text, " ").trim().to_string()
}

// ========== Classification ==========

/// Heuristically decide whether an already-stripped line is terminal garbage.
///
/// Tuned to drop a short real line rather than render escape remnants.
pub fn is_garbage(cleaned: &str) -> bool {
    let total = cleaned.chars().count();
    if total < MIN_SIGNAL_CHARS {
        return true;
    }

    let noisy = cleaned
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '[' | ']' | '(' | ')' | '{' | '}' | '<' | '>'))
        .count();
    if noisy * 2 > total {
        return true;
    }

    if ESCAPE_REMNANT_PATTERN.is_match(cleaned) || STATUS_LINE_PATTERN.is_match(cleaned) {
        return true;
    }

    let printable = cleaned
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ' || *c == '\t')
        .count();
    printable * 10 < total * MIN_PRINTABLE_TENTHS
}

/// Whether a stripped line is a terminal-host lifecycle banner.
pub fn is_lifecycle_banner(cleaned: &str) -> bool {
    LIFECYCLE_BANNER_PATTERN.is_match(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_colors() {
        assert_eq!(strip("\x1b[32mHello\x1b[0m World"), "Hello World");
    }

    #[test]
    fn test_strip_osc_title() {
        assert_eq!(strip("\x1b]0;claude: repo\x07prompt ready"), "prompt ready");
        assert_eq!(strip("\x1b]8;;http://x\x1b\\link"), "link");
    }

    #[test]
    fn test_strip_private_modes_and_charsets() {
        assert_eq!(strip("\x1b[?25l\x1b(Btext\x1b="), "text");
        assert_eq!(strip("\x1bPq#0;2;0;0;0\x1b\\after"), "after");
    }

    #[test]
    fn test_strip_controls_and_spaces() {
        assert_eq!(strip("  a\r\x08   b\tc  "), "a b\tc");
        assert_eq!(strip("line one\nline two"), "line one\nline two");
    }

    #[test]
    fn test_strip_is_idempotent() {
        let inputs = [
            "\x1b[2K\x1b[1G",
            "\x1b\x01[31mred",
            "a \x01 b",
            "\x1b]0;unterminated",
            "  \x1b[1m bold \x1b[0m  ",
            "x\x1b",
            "\x1b\x1b[[0m",
            "tab\t \t end",
            "",
        ];
        for input in inputs {
            let once = strip(input);
            assert_eq!(strip(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_strip_escapes_preserves_spacing() {
        assert_eq!(strip_escapes(" world\n"), " world\n");
        assert_eq!(strip_escapes("\x1b[1m  bold"), "  bold");
    }

    #[test]
    fn test_cursor_clear_is_garbage() {
        assert!(is_garbage(&strip("\x1b[2K\x1b[1G")));
    }

    #[test]
    fn test_short_lines_are_garbage() {
        assert!(is_garbage(""));
        assert!(is_garbage("ok"));
        assert!(!is_garbage("yes"));
    }

    #[test]
    fn test_remnants_are_garbage() {
        assert!(is_garbage("[2K[1G"));
        assert!(is_garbage("[?2004h"));
        assert!(is_garbage("[1;32mhello"));
        assert!(is_garbage("12;34;56"));
    }

    #[test]
    fn test_status_lines_are_garbage() {
        assert!(is_garbage("[main] 0:zsh* 1:vim-"));
        assert!(is_garbage("12:30 up 3 days"));
        assert!(is_garbage("17-Oct-26 session"));
        assert!(is_garbage("2026-10-17 something happened"));
    }

    #[test]
    fn test_non_ascii_heavy_is_garbage() {
        assert!(is_garbage("▁▂▃▄▅▆▇█"));
        assert!(!is_garbage("café au lait"));
    }

    #[test]
    fn test_plain_text_is_signal() {
        assert!(!is_garbage("hello"));
        assert!(!is_garbage("please refactor the parser"));
        assert!(!is_garbage("fix bug #12 in main.rs"));
        assert!(!is_garbage("[WIP] tidy the parser"));
    }

    #[test]
    fn test_lifecycle_banners() {
        assert!(is_lifecycle_banner("[Session restored]"));
        assert!(is_lifecycle_banner("Server exited with code 0"));
        assert!(is_lifecycle_banner("reconnected to pty"));
        assert!(!is_lifecycle_banner("hello"));
    }
}
