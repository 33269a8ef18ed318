use once_cell::sync::Lazy;
use regex::Regex;

static FORBIDDEN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Replace characters that are unsafe in file names, then collapse each
/// whitespace run, both with `replacement`.
pub fn sanitize_with(input: &str, replacement: char) -> String {
    let mut buf = [0u8; 4];
    let replacement: &str = replacement.encode_utf8(&mut buf);
    let replaced = FORBIDDEN.replace_all(input, replacement);
    WHITESPACE.replace_all(&replaced, replacement).into_owned()
}

/// File name stem for a note created from `title`: `-` separated, lowercase.
pub fn sanitize_note_filename(title: &str) -> String {
    sanitize_with(title, '-').to_lowercase()
}

/// Prefix key tying image attachments to a note: `_` separated, case kept.
pub fn sanitize_note_base(name: &str) -> String {
    sanitize_with(name, '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_filename_replaces_forbidden() {
        assert_eq!(sanitize_note_filename("my<file>name"), "my-file-name");
        assert_eq!(sanitize_note_filename(r#"a<b>c:d"e/f\g|h?i*j"#), "a-b-c-d-e-f-g-h-i-j");
    }

    #[test]
    fn test_note_filename_whitespace_and_case() {
        assert_eq!(sanitize_note_filename("my note title"), "my-note-title");
        assert_eq!(sanitize_note_filename("my   note"), "my-note");
        assert_eq!(sanitize_note_filename("MyNote"), "mynote");
        assert_eq!(sanitize_note_filename("tab\tand\nnewline"), "tab-and-newline");
    }

    #[test]
    fn test_note_base_uses_underscore() {
        assert_eq!(sanitize_note_base("my note"), "my_note");
        assert_eq!(sanitize_note_base("a:b/c"), "a_b_c");
        assert_eq!(sanitize_note_base("Already_Clean"), "Already_Clean");
    }

    #[test]
    fn test_forbidden_then_whitespace_are_separate_passes() {
        // "a < b" -> "a _ b" -> "a___b"
        assert_eq!(sanitize_note_base("a < b"), "a___b");
    }

    #[test]
    fn test_no_length_limit() {
        let long = "x".repeat(1000);
        assert_eq!(sanitize_note_filename(&long).len(), 1000);
    }

    #[test]
    fn test_idempotent() {
        let inputs = ["My Note", "a<b>c", "  spaced  out  ", "日本語 メモ", "Mixed/Case\\Path", ""];
        for input in inputs {
            let once = sanitize_note_filename(input);
            assert_eq!(sanitize_note_filename(&once), once);
            let once = sanitize_note_base(input);
            assert_eq!(sanitize_note_base(&once), once);
        }
    }
}
