//! Shell escaping, quoting and heredoc embedding.

/// Escape a value for use inside single quotes.
/// Replaces `'` with `'\''` (end quote, escaped quote, start quote).
pub fn escape_single_quote_content(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Quote a path for shell execution (always quotes).
pub fn quote_path(path: &str) -> String {
    format!("'{}'", escape_single_quote_content(path))
}

/// Join command fragments so each runs only if the previous one succeeded.
pub fn chain(parts: &[String]) -> String {
    parts.join(" && ")
}

/// Feed `body` to `command` through a quoted heredoc.
///
/// The delimiter is quoted, so the remote shell performs no expansion inside
/// the body. Values embedded this way never reach a process argument list.
pub fn heredoc(command: &str, delimiter: &str, body: &str) -> String {
    let body = body.strip_suffix('\n').unwrap_or(body);
    format!("{} << '{}'\n{}\n{}", command, delimiter, body, delimiter)
}

/// Reduce free text to a single line safe to embed in a heredoc body.
///
/// Control characters (newlines included) are dropped, so a value can never
/// forge a heredoc terminator line.
pub fn single_line(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// First non-empty line of a command body, bounded in length.
///
/// Used when reporting a failed command: heredoc payloads (SQL grants,
/// configuration files) start on the second line and stay out of reports.
pub fn command_summary(command: &str, max_chars: usize) -> String {
    let line = command
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");

    if line.chars().count() <= max_chars {
        return line.to_string();
    }

    let mut out: String = line.chars().take(max_chars).collect();
    out.push('…');
    out
}
