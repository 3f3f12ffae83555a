use rand::distr::Alphanumeric;
use rand::Rng;

use crate::ssh::Secret;

/// Names of the eight wp-config authentication keys and salts, in file order.
pub const SALT_NAMES: [&str; 8] = [
    "AUTH_KEY",
    "SECURE_AUTH_KEY",
    "LOGGED_IN_KEY",
    "NONCE_KEY",
    "AUTH_SALT",
    "SECURE_AUTH_SALT",
    "LOGGED_IN_SALT",
    "NONCE_SALT",
];

const SALT_LENGTH: usize = 64;
const DB_PASSWORD_LENGTH: usize = 32;
const DB_USER_SUFFIX_LENGTH: usize = 8;

// No quote, backslash, backtick or `$`: values land in single-quoted PHP
// literals and SQL strings inside heredoc bodies.
const SALT_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!#%&()*+,-./:;<=>?@[]^_{|}~";

/// Credentials generated once per job and shared by every step that needs them.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub db_user: String,
    pub db_password: Secret,
    pub salts: Vec<(&'static str, Secret)>,
}

impl Secrets {
    pub fn generate() -> Self {
        let mut rng = rand::rng();

        let suffix: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(DB_USER_SUFFIX_LENGTH)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();

        let password: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(DB_PASSWORD_LENGTH)
            .map(char::from)
            .collect();

        let salts = SALT_NAMES
            .iter()
            .map(|name| {
                let value: String = (0..SALT_LENGTH)
                    .map(|_| char::from(SALT_ALPHABET[rng.random_range(0..SALT_ALPHABET.len())]))
                    .collect();
                (*name, Secret::new(value))
            })
            .collect();

        Self {
            db_user: format!("wpu_{}", suffix),
            db_password: Secret::new(password),
            salts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_embeddable(value: &str) -> bool {
        !value.chars().any(|c| matches!(c, '\'' | '\\' | '"' | '`' | '$') || c.is_control())
    }

    #[test]
    fn shapes() {
        let secrets = Secrets::generate();

        assert!(secrets.db_user.starts_with("wpu_"));
        assert_eq!(secrets.db_user.len(), 12);
        assert!(secrets.db_user[4..]
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_eq!(secrets.db_password.expose().len(), 32);
        assert_eq!(secrets.salts.len(), 8);
        assert!(secrets.salts.iter().all(|(_, v)| v.expose().len() == 64));
    }

    #[test]
    fn alphabets_never_break_quoting() {
        assert!(is_embeddable(std::str::from_utf8(SALT_ALPHABET).unwrap()));

        for _ in 0..50 {
            let secrets = Secrets::generate();
            assert!(is_embeddable(&secrets.db_user));
            assert!(is_embeddable(secrets.db_password.expose()));
            for (_, salt) in &secrets.salts {
                assert!(is_embeddable(salt.expose()));
            }
        }
    }

    #[test]
    fn each_generation_is_fresh() {
        let a = Secrets::generate();
        let b = Secrets::generate();
        assert_ne!(a.db_user, b.db_user);
        assert_ne!(a.db_password, b.db_password);
    }
}
