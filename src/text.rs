//! Text normalization and tokenization.
//!
//! These are the leaf operations of the pipeline: every piece of text
//! (ingested pages, chunk slices, incoming queries) passes through
//! [`normalize`] and [`tokenize`] before anything is scored, so both
//! functions must be pure and deterministic.

/// Normalize line endings and whitespace.
///
/// Converts `\r\n` and `\r` to `\n`, collapses runs of three or more
/// consecutive newlines down to one blank line, and trims leading and
/// trailing whitespace. Empty input yields empty output.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(unified.len());
    let mut newline_run = 0usize;
    for ch in unified.chars() {
        if ch == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                out.push(ch);
            }
        } else {
            newline_run = 0;
            out.push(ch);
        }
    }

    out.trim().to_string()
}

/// Split text into retrieval tokens.
///
/// A token is either a single CJK ideograph (U+4E00..=U+9FFF) or a maximal
/// run of ASCII letters, digits, and underscores, lowercased. Everything
/// else (punctuation, other scripts, whitespace) is a separator and is
/// dropped; no token ever spans a separator.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            word.push(ch.to_ascii_lowercase());
        } else {
            if !word.is_empty() {
                tokens.push(std::mem::take(&mut word));
            }
            if is_cjk_ideograph(ch) {
                tokens.push(ch.to_string());
            }
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }

    tokens
}

fn is_cjk_ideograph(ch: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(normalize("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_normalize_collapses_blank_lines() {
        assert_eq!(normalize("a\n\n\n\n\nb"), "a\n\nb");
        // Exactly one blank line is preserved as-is.
        assert_eq!(normalize("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_normalize_trims() {
        assert_eq!(normalize("  hello \n"), "hello");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \n\n  "), "");
    }

    #[test]
    fn test_tokenize_ascii_runs() {
        assert_eq!(
            tokenize("Hello, world_2!"),
            vec!["hello".to_string(), "world_2".to_string()]
        );
    }

    #[test]
    fn test_tokenize_cjk_per_character() {
        assert_eq!(
            tokenize("苹果 富含"),
            vec!["苹", "果", "富", "含"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_tokenize_mixed_cjk_and_ascii() {
        // A CJK character terminates the surrounding ASCII run.
        assert_eq!(
            tokenize("abc苹def"),
            vec!["abc".to_string(), "苹".to_string(), "def".to_string()]
        );
    }

    #[test]
    fn test_tokenize_drops_other_scripts() {
        // Cyrillic and punctuation are separators, not tokens.
        assert_eq!(tokenize("тест abc!"), vec!["abc".to_string()]);
        assert!(tokenize("...").is_empty());
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_tokenize_deterministic() {
        let text = "The 快 brown 狐 jumps_9";
        assert_eq!(tokenize(text), tokenize(text));
    }
}
