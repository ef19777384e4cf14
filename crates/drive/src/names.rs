//! Filename policy.
//!
//! Two independent checks guard the namespace: the reserved-device and
//! excluded-character filter applied on every create, and the wildcard
//! mask matcher used by directory enumeration.

use std::path::Path;

use regex::RegexBuilder;
use tracing::error;

/// The sole reserved filename extension. Entries carrying it are hidden
/// from ordinary enumeration and reachable only through the dedicated
/// hidden-file operations.
pub const HIDDEN_EXTENSION: &str = ".ms_hidden";

/// Characters that may never appear in a name component.
const EXCLUDED_CHARS: &str = "\"\\/<>?:*|";

/// Regex metacharacters escaped before wildcard translation.
const NEEDS_ESCAPE: &str = ".[]{}()+|^$";

/// True when `name` ends with the reserved hidden extension.
pub fn is_hidden_name(name: &str) -> bool {
    name.to_lowercase().ends_with(HIDDEN_EXTENSION)
}

/// Reject names that collide with the classical reserved device set
/// (`con`, `prn`, `aux`, `nul`, `com1`–`com9`, `lpt1`–`lpt9`, `clock$`,
/// extension ignored) or contain an excluded character.
pub fn excluded_filename(name: &str) -> bool {
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    // The reserved device set is pure ASCII.
    let reserved = stem.is_ascii()
        && match stem.len() {
            3 => matches!(stem.as_str(), "con" | "prn" | "aux" | "nul"),
            4 => {
                let (head, tail) = stem.split_at(3);
                (head == "com" || head == "lpt")
                    && tail.chars().all(|c| c.is_ascii_digit() && c != '0')
            }
            6 => stem == "clock$",
            _ => false,
        };
    if reserved {
        return true;
    }

    name.chars().any(|c| EXCLUDED_CHARS.contains(c))
}

fn mask_to_regex(mask: &str) -> String {
    let mut pattern = String::with_capacity(mask.len() * 2);
    for c in mask.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c if NEEDS_ESCAPE.contains(c) => {
                pattern.push('\\');
                pattern.push(c);
            }
            c => pattern.push(c),
        }
    }
    pattern
}

/// Case-insensitive full match of `name` against an enumeration mask
/// (`*` matches any run, `?` matches one character).
pub fn matches_mask(mask: &str, name: &str) -> bool {
    let pattern = format!("^{}$", mask_to_regex(mask));
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(name),
        Err(err) => {
            error!("bad enumeration mask {:?}: {}", mask, err);
            false
        }
    }
}

/// Case-insensitive substring match of `name` against a mask.
pub fn searches_mask(mask: &str, name: &str) -> bool {
    let pattern = mask_to_regex(mask);
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(name),
        Err(err) => {
            error!("bad search mask {:?}: {}", mask, err);
            false
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reserved_device_names() {
        for name in ["con", "CON", "prn", "aux", "NUL", "con.txt", "Aux.log"] {
            assert!(excluded_filename(name), "{name} should be excluded");
        }
        for n in 1..=9 {
            assert!(excluded_filename(&format!("com{n}")));
            assert!(excluded_filename(&format!("LPT{n}.dat")));
        }
        assert!(excluded_filename("clock$"));

        assert!(!excluded_filename("com0"));
        assert!(!excluded_filename("lpt0"));
        assert!(!excluded_filename("com10"));
        assert!(!excluded_filename("console"));
        assert!(!excluded_filename("ordinary.txt"));
    }

    #[test]
    fn test_excluded_characters() {
        for name in ["a<b", "a>b", "a:b", "a|b", "a?b", "a*b", "a\"b", "a\\b"] {
            assert!(excluded_filename(name), "{name} should be excluded");
        }
        assert!(!excluded_filename("plain-name_1.txt"));
    }

    #[test]
    fn test_matches_mask() {
        assert!(matches_mask("*", "anything.txt"));
        assert!(matches_mask("*.txt", "notes.txt"));
        assert!(matches_mask("*.TXT", "notes.txt"));
        assert!(!matches_mask("*.txt", "notes.txt.bak"));
        assert!(matches_mask("file?.rs", "file1.rs"));
        assert!(!matches_mask("file?.rs", "file12.rs"));
        // Regex specials in the mask are literals.
        assert!(matches_mask("a+b.txt", "a+b.txt"));
        assert!(!matches_mask("a+b.txt", "aab.txt"));
    }

    #[test]
    fn test_searches_mask() {
        assert!(searches_mask("note", "my-notes.txt"));
        assert!(searches_mask("NOTE", "my-notes.txt"));
        assert!(!searches_mask("draft", "my-notes.txt"));
    }

    #[test]
    fn test_hidden_names() {
        assert!(is_hidden_name("secret.ms_hidden"));
        assert!(is_hidden_name("SECRET.MS_HIDDEN"));
        assert!(!is_hidden_name("secret.hidden"));
        assert!(!is_hidden_name("ms_hidden"));
    }
}
