use crate::error::Error;
use crate::Result;

/// Normalize a user-supplied identifier (e.g. a server ID) to `lower-kebab`.
pub fn slugify_id(value: &str, field_name: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation_invalid_argument(
            field_name,
            format!("{} cannot be empty", capitalize(field_name)),
            None,
            None,
        ));
    }

    let out = slug(trimmed, '-');

    if out.is_empty() {
        return Err(Error::validation_invalid_argument(
            field_name,
            format!(
                "{} must contain at least one letter or number",
                capitalize(field_name)
            ),
            None,
            None,
        ));
    }

    Ok(out)
}

/// Slug `value` with `separator`.
///
/// ASCII letters are lower-cased, whitespace and `-`/`_` collapse into a single
/// separator, and every other character (dots included) is dropped.
pub fn slug(value: &str, separator: char) -> String {
    let mut out = String::new();
    let mut prev_was_sep = false;

    for ch in value.trim().chars() {
        let normalized = match ch {
            'a'..='z' | '0'..='9' => Some(ch),
            'A'..='Z' => Some(ch.to_ascii_lowercase()),
            _ if ch.is_whitespace() || ch == '_' || ch == '-' => Some(separator),
            _ => None,
        };

        if let Some(c) = normalized {
            if c == separator {
                if out.is_empty() || prev_was_sep {
                    continue;
                }
                out.push(separator);
                prev_was_sep = true;
            } else {
                out.push(c);
                prev_was_sep = false;
            }
        }
    }

    while out.ends_with(separator) {
        out.pop();
    }

    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}
