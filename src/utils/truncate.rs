//! Byte-budget truncation that never splits a UTF-8 character.
//!
//! Step output keeps its head (tools print useful context first); failure
//! diagnostics keep their tail (the actual error is printed last).

/// Keep at most `max_bytes` from the start of `value`.
pub fn head(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Keep at most `max_bytes` from the end of `value`.
pub fn tail(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut start = value.len() - max_bytes;
    while !value.is_char_boundary(start) {
        start += 1;
    }
    &value[start..]
}

const ELISION: &str = "\n…\n";

/// Bound a failure message: the first line (which names the failing step) is
/// kept, then as much of the end of the message as fits.
pub fn failure_message(message: &str, max_bytes: usize) -> String {
    if message.len() <= max_bytes {
        return message.to_string();
    }

    let (first, rest) = match message.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => return tail(message, max_bytes).to_string(),
    };

    let first = head(first, max_bytes / 2);
    let remaining = max_bytes.saturating_sub(first.len() + ELISION.len());
    format!("{}{}{}", first, ELISION, tail(rest, remaining))
}
