use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Base wpstack directory (`$WPSTACK_HOME`, else `~/.config/wpstack/`).
pub fn wpstack() -> Result<PathBuf> {
    if let Ok(custom) = env::var("WPSTACK_HOME") {
        if !custom.trim().is_empty() {
            return Ok(PathBuf::from(shellexpand::tilde(&custom).to_string()));
        }
    }

    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("wpstack"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("wpstack"))
    }
}

/// Global wpstack.json config file path
pub fn wpstack_json() -> Result<PathBuf> {
    Ok(wpstack()?.join("wpstack.json"))
}

/// Servers directory
pub fn servers() -> Result<PathBuf> {
    Ok(wpstack()?.join("servers"))
}

/// Job database path
pub fn jobs_db() -> Result<PathBuf> {
    Ok(wpstack()?.join("jobs.db"))
}
