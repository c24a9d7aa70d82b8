//! Text helpers shared by agents, the task log, and persistence.

/// Truncate to at most `max` characters on a char boundary, appending an
/// ellipsis when anything was cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}...")
}

/// Character count used as the "word count" metric. Counting chars instead
/// of whitespace-separated words keeps CJK and Latin content comparable.
pub fn char_count(text: &str) -> usize {
    text.chars().count()
}

/// Sanitize a title into a filesystem-safe stem.
pub fn safe_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c
            } else if c.is_whitespace() || c == '-' || c == '_' {
                '_'
            } else {
                '\0'
            }
        })
        .filter(|&c| c != '\0')
        .collect();
    let collapsed = cleaned
        .split('_')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if collapsed.is_empty() {
        "untitled".to_string()
    } else {
        truncate_chars(&collapsed, 60).trim_end_matches("...").to_string()
    }
}

/// First `max` characters of each line joined with ` | `, used when a
/// multi-line blob must fit into a one-line description.
pub fn flatten_lines(text: &str, max: usize) -> String {
    let flat = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" | ");
    truncate_chars(&flat, max)
}
