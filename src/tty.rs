//! Terminal I/O utilities for CLI.
//!
//! Provides TTY detection and reading secrets from stdin.

use std::io::{self, BufRead, IsTerminal, Read, Write};

pub fn is_stdin_tty() -> bool {
    io::stdin().is_terminal()
}

/// Read a secret: one prompted line on a terminal, all of stdin otherwise.
///
/// Piped input keeps its internal newlines so private keys survive intact.
pub fn read_secret(message: &str) -> wpstack::Result<String> {
    let stdin = io::stdin();

    if is_stdin_tty() {
        eprint!("{}", message);
        io::stderr().flush().ok();

        let mut line = String::new();
        stdin.lock().read_line(&mut line).map_err(|e| {
            wpstack::Error::internal_io(e.to_string(), Some("read stdin".to_string()))
        })?;
        return Ok(line.trim_end_matches(['\r', '\n']).to_string());
    }

    let mut buf = String::new();
    stdin.lock().read_to_string(&mut buf).map_err(|e| {
        wpstack::Error::internal_io(e.to_string(), Some("read stdin".to_string()))
    })?;
    Ok(buf.trim_end_matches(['\r', '\n']).to_string())
}

/// Print status message to stderr if running in a terminal.
pub fn status(message: &str) {
    if io::stderr().is_terminal() {
        eprintln!("{}", message);
    }
}
