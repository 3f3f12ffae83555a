//! Exit-status sentinel appended after every checked command.
//!
//! The command body runs in a subshell with stdin detached, so neither an
//! `exit` inside the body nor a tool that reads stdin can swallow the
//! trailing `echo` that reports the status.

use uuid::Uuid;

/// A fresh marker token; unique per call so step output cannot predict it.
pub fn new_marker() -> String {
    format!("__WPSTACK_EXIT_{}__", Uuid::new_v4().simple())
}

/// Wrap `command` so its combined output is followed by `<marker>:<status>`.
pub fn wrap(command: &str, marker: &str) -> String {
    format!("(\n{}\n) < /dev/null 2>&1\necho \"{}:$?\"\n", command, marker)
}

/// Find the marker line within the last `window` lines of `output`.
///
/// Returns the exit status and the output with the marker line removed.
/// Lines further from the end are never considered, so a step that happens
/// to print a marker-shaped line earlier cannot fake its own status.
pub fn extract(output: &str, marker: &str, window: usize) -> Option<(i32, String)> {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(window);

    for idx in (start..lines.len()).rev() {
        let Some(code) = parse_marker_line(lines[idx], marker) else {
            continue;
        };

        let kept: Vec<&str> = lines[..idx]
            .iter()
            .chain(lines[idx + 1..].iter())
            .copied()
            .collect();
        return Some((code, kept.join("\n")));
    }

    None
}

fn parse_marker_line(line: &str, marker: &str) -> Option<i32> {
    line.trim()
        .strip_prefix(marker)?
        .strip_prefix(':')?
        .parse::<i32>()
        .ok()
}
