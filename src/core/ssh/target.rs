use std::fmt;
use std::path::PathBuf;

use crate::error::TargetDetails;

/// A secret string that never prints its value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone)]
pub enum PrivateKey {
    /// Key file already on this machine.
    File(PathBuf),
    /// Key material held in memory; written to a private temp file while a session is open.
    Material(Secret),
}

/// Credentials for one target. Key auth is attempted before password auth.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub key: Option<PrivateKey>,
    pub password: Option<Secret>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.password.is_none()
    }
}

/// Everything needed to (re)open a session to one machine.
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub server_id: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub credentials: Credentials,
}

impl SshTarget {
    pub fn details(&self) -> TargetDetails {
        TargetDetails {
            server_id: self.server_id.clone(),
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
        }
    }

    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_debug_is_redacted() {
        let creds = Credentials {
            key: None,
            password: Some(Secret::new("hunter2")),
        };
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn empty_credentials() {
        assert!(Credentials::default().is_empty());
    }
}
