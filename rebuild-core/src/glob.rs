//! Minimal shell-style glob expansion backing the `glob()` script primitive.
//!
//! Supports `*` (any run of characters, not crossing a path separator),
//! `**` (any run of characters, crossing separators), and `?` (one
//! character). No character classes or brace expansion; recipes that need
//! more should shell out via `sys()`.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Expands `pattern` (interpreted relative to `root` if not absolute)
/// against the filesystem, returning matching paths in walk order.
pub fn expand(root: &Path, pattern: &str) -> Vec<PathBuf> {
    let pattern_path = Path::new(pattern);
    let (base, rel_pattern) = if pattern_path.is_absolute() {
        literal_prefix(pattern_path)
    } else {
        let (lit, rel) = literal_prefix(pattern_path);
        (root.join(lit), rel)
    };

    let base = if base.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        base
    };

    if !base.exists() {
        return Vec::new();
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(&base).into_iter().filter_map(Result::ok) {
        let rel = entry.path().strip_prefix(&base).unwrap_or(entry.path());
        if rel.as_os_str().is_empty() {
            continue;
        }
        if matches(&rel_pattern, &rel.to_string_lossy()) {
            out.push(entry.path().to_path_buf());
        }
    }
    out.sort();
    out
}

/// Splits a pattern into its longest wildcard-free leading directory
/// component and the remaining pattern to match against paths under it.
fn literal_prefix(pattern: &Path) -> (PathBuf, String) {
    let mut literal = PathBuf::new();
    let mut rest: Vec<String> = Vec::new();
    let mut in_literal = true;
    for component in pattern.components() {
        let s = component.as_os_str().to_string_lossy().into_owned();
        if in_literal && !s.contains(['*', '?']) {
            literal.push(&s);
        } else {
            in_literal = false;
            rest.push(s);
        }
    }
    (literal, rest.join("/"))
}

fn matches(pattern: &str, text: &str) -> bool {
    if pattern.is_empty() {
        return text.is_empty();
    }
    match_chars(&pattern.chars().collect::<Vec<_>>(), &text.chars().collect::<Vec<_>>())
}

fn match_chars(pattern: &[char], text: &[char]) -> bool {
    if pattern.is_empty() {
        return text.is_empty();
    }
    match pattern[0] {
        '*' => {
            if pattern.len() >= 2 && pattern[1] == '*' {
                // `**`: matches across separators, including empty.
                (0..=text.len()).any(|i| match_chars(&pattern[2..], &text[i..]))
            } else {
                // `*`: matches within one path segment.
                (0..=text.len())
                    .take_while(|&i| text[..i].iter().all(|&c| c != '/'))
                    .any(|i| match_chars(&pattern[1..], &text[i..]))
            }
        }
        '?' => !text.is_empty() && match_chars(&pattern[1..], &text[1..]),
        c => !text.is_empty() && text[0] == c && match_chars(&pattern[1..], &text[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn matches_simple_star() {
        assert!(matches("*.rs", "main.rs"));
        assert!(!matches("*.rs", "main.txt"));
    }

    #[test]
    fn star_does_not_cross_separator() {
        assert!(!matches("*.rs", "src/main.rs"));
        assert!(matches("src/*.rs", "src/main.rs"));
    }

    #[test]
    fn double_star_crosses_separators() {
        assert!(matches("**/*.rs", "a/b/c.rs"));
        assert!(matches("**/*.rs", "c.rs"));
    }

    #[test]
    fn expand_finds_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src").join("a.rs"), "").unwrap();
        fs::write(dir.path().join("src").join("b.txt"), "").unwrap();

        let matches = expand(dir.path(), "src/*.rs");
        assert_eq!(matches.len(), 1);
        assert!(matches[0].ends_with("a.rs"));
    }

    #[test]
    fn expand_missing_base_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let matches = expand(dir.path(), "nope/*.rs");
        assert!(matches.is_empty());
    }
}
