use std::sync::LazyLock;

use regex::Regex;

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"));

/// Converts a title into a URL-friendly slug: lowercase, runs of
/// non-alphanumeric characters collapsed into single dashes.
pub fn slugify(input: &str) -> String {
    let lower = input.to_lowercase();
    NON_ALNUM
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string()
}
