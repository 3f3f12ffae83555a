use serde::{Deserialize, Serialize};

/// Validated input for one provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobParameters {
    pub domain: String,
    pub admin_email: String,
    pub site_title: String,
    /// Requested runtime version; anything off the whitelist is coerced.
    #[serde(default)]
    pub php_version: Option<String>,
}

impl JobParameters {
    pub fn new(domain: impl Into<String>, admin_email: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            admin_email: admin_email.into(),
            site_title: DEFAULT_SITE_TITLE.to_string(),
            php_version: None,
        }
    }
}

pub const DEFAULT_SITE_TITLE: &str = "My WordPress Site";

/// Supported PHP-FPM releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhpVersion {
    #[serde(rename = "8.1")]
    V8_1,
    #[serde(rename = "8.2")]
    V8_2,
    #[serde(rename = "8.3")]
    V8_3,
    #[serde(rename = "8.4")]
    V8_4,
}

impl PhpVersion {
    pub const DEFAULT: PhpVersion = PhpVersion::V8_3;
    pub const ALL: [PhpVersion; 4] = [
        PhpVersion::V8_1,
        PhpVersion::V8_2,
        PhpVersion::V8_3,
        PhpVersion::V8_4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhpVersion::V8_1 => "8.1",
            PhpVersion::V8_2 => "8.2",
            PhpVersion::V8_3 => "8.3",
            PhpVersion::V8_4 => "8.4",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|v| v.as_str() == value)
    }

    /// Whitelisted version for `requested`, or the default.
    pub fn coerce(requested: Option<&str>) -> Self {
        match requested {
            Some(value) => Self::parse(value).unwrap_or_else(|| {
                tracing::warn!(requested = value, fallback = Self::DEFAULT.as_str(), "unsupported PHP version");
                Self::DEFAULT
            }),
            None => Self::DEFAULT,
        }
    }

    pub fn fpm_service(&self) -> String {
        format!("php{}-fpm", self.as_str())
    }

    pub fn fpm_socket(&self) -> String {
        format!("/var/run/php/php{}-fpm.sock", self.as_str())
    }
}

/// Reduce user input to a bare host name.
///
/// Drops any `http://`/`https://` prefix and trailing slashes, then every
/// character outside `[A-Za-z0-9.-]`, and lower-cases the result.
pub fn sanitize_domain(raw: &str) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();

    let without_scheme = if lower.starts_with("https://") {
        &trimmed[8..]
    } else if lower.starts_with("http://") {
        &trimmed[7..]
    } else {
        trimmed
    };

    without_scheme
        .trim_end_matches('/')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-')
        .collect::<String>()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_scheme_slash_and_case() {
        assert_eq!(sanitize_domain("HTTPS://Example.COM/"), "example.com");
        assert_eq!(sanitize_domain("http://shop.example.org///"), "shop.example.org");
        assert_eq!(sanitize_domain("  blog.example.net "), "blog.example.net");
    }

    #[test]
    fn sanitize_drops_shell_metacharacters() {
        assert_eq!(sanitize_domain("example.com;rm -rf /"), "example.comrm-rf");
        assert_eq!(sanitize_domain("ex$(id)ample.com"), "exidample.com");
        assert_eq!(sanitize_domain("a'b\"c`d.com"), "abcd.com");
    }

    #[test]
    fn php_version_whitelist() {
        assert_eq!(PhpVersion::coerce(Some("8.2")), PhpVersion::V8_2);
        assert_eq!(PhpVersion::coerce(Some("8.4")), PhpVersion::V8_4);
        assert_eq!(PhpVersion::coerce(Some("7.4")), PhpVersion::V8_3);
        assert_eq!(PhpVersion::coerce(Some("8.3; reboot")), PhpVersion::V8_3);
        assert_eq!(PhpVersion::coerce(None), PhpVersion::DEFAULT);
    }

    #[test]
    fn php_socket_follows_version() {
        assert_eq!(PhpVersion::V8_1.fpm_socket(), "/var/run/php/php8.1-fpm.sock");
        assert_eq!(PhpVersion::V8_4.fpm_service(), "php8.4-fpm");
    }
}
