//! File reference extraction from message content.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex_lite::Regex;

/// Extensions accepted for bare file names without a directory part.
const KNOWN_EXTENSIONS: &[&str] = &[
    "c", "cpp", "cs", "css", "env", "go", "h", "hpp", "html", "java", "js", "json", "jsx", "kt",
    "lock", "md", "php", "py", "rb", "rs", "scss", "sh", "sql", "svelte", "swift", "toml", "ts",
    "tsx", "txt", "vue", "xml", "yaml", "yml",
];

static PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:~|\.{1,2})?/?(?:[\w\-.@]+/)*[\w\-.@]*[\w\-]\.([A-Za-z][A-Za-z0-9]{0,7})$")
        .unwrap_or_else(|e| panic!("file reference pattern is invalid: {e}"))
});

static BACKTICK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`([^`\s]+)`")
        .unwrap_or_else(|e| panic!("backtick pattern is invalid: {e}"))
});

/// Paths mentioned in `content`, deduplicated and sorted.
///
/// Accepts anything with a directory part and an extension
/// (`src/app.tsx`, `./lib/db.rs`), and bare names with a well-known
/// extension (`Cargo.toml`). URLs are ignored.
pub fn extract_file_references(content: &str) -> BTreeSet<String> {
    let quoted = BACKTICK_RE
        .captures_iter(content)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()));
    let bare = content.split_whitespace();

    quoted
        .chain(bare)
        .map(trim_token)
        .filter(|token| is_file_reference(token))
        .map(str::to_string)
        .collect()
}

fn trim_token(token: &str) -> &str {
    token
        .trim_matches(|c: char| matches!(c, '`' | '"' | '\'' | '(' | ')' | '[' | ']' | '{' | '}' | '<' | '>' | ',' | ';' | ':' | '!' | '?'))
        .trim_end_matches('.')
}

fn is_file_reference(token: &str) -> bool {
    if token.is_empty() || token.contains("://") {
        return false;
    }
    let Some(caps) = PATH_RE.captures(token) else {
        return false;
    };
    if token.contains('/') {
        return true;
    }
    caps.get(1)
        .is_some_and(|ext| KNOWN_EXTENSIONS.contains(&ext.as_str().to_ascii_lowercase().as_str()))
}
