//! SSH secrets in the system keychain (macOS Keychain, Linux Secret Service,
//! Windows Credential Manager). Server JSON files never hold secrets.

use crate::{Error, ErrorCode, Result};
use keyring::Entry;
use serde_json::Value;

const SERVICE_NAME: &str = "wpstack";

pub const PASSWORD: &str = "password";
pub const PRIVATE_KEY: &str = "private_key";

fn keyring_error(e: keyring::Error) -> Error {
    Error::new(
        ErrorCode::InternalUnexpected,
        format!("Keychain error: {}", e),
        Value::Null,
    )
}

/// Where server secrets live. The keychain in production, a map in tests.
pub trait SecretStore {
    fn get(&self, server_id: &str, name: &str) -> Result<Option<String>>;
    fn store(&self, server_id: &str, name: &str, value: &str) -> Result<()>;
    fn delete(&self, server_id: &str, name: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Keychain;

impl SecretStore for Keychain {
    fn get(&self, server_id: &str, name: &str) -> Result<Option<String>> {
        get(server_id, name)
    }

    fn store(&self, server_id: &str, name: &str, value: &str) -> Result<()> {
        store(server_id, name, value)
    }

    fn delete(&self, server_id: &str, name: &str) -> Result<()> {
        delete(server_id, name)
    }
}

/// Key format: `<server-id>:<secret-name>`
fn entry(server_id: &str, name: &str) -> Result<Entry> {
    Entry::new(SERVICE_NAME, &format!("{}:{}", server_id, name)).map_err(keyring_error)
}

pub fn store(server_id: &str, name: &str, value: &str) -> Result<()> {
    entry(server_id, name)?
        .set_password(value)
        .map_err(keyring_error)
}

/// Returns `None` if the secret doesn't exist.
pub fn get(server_id: &str, name: &str) -> Result<Option<String>> {
    match entry(server_id, name)?.get_password() {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(keyring_error(e)),
    }
}

pub fn delete(server_id: &str, name: &str) -> Result<()> {
    match entry(server_id, name)?.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(keyring_error(e)),
    }
}

/// Remove every secret held for a server.
pub fn clear_server(server_id: &str) -> Result<()> {
    delete(server_id, PASSWORD)?;
    delete(server_id, PRIVATE_KEY)
}

#[cfg(test)]
pub(crate) mod memory {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::SecretStore;
    use crate::Result;

    #[derive(Default)]
    pub struct MemorySecrets {
        values: RefCell<HashMap<String, String>>,
    }

    impl SecretStore for MemorySecrets {
        fn get(&self, server_id: &str, name: &str) -> Result<Option<String>> {
            Ok(self.values.borrow().get(&format!("{}:{}", server_id, name)).cloned())
        }

        fn store(&self, server_id: &str, name: &str, value: &str) -> Result<()> {
            self.values
                .borrow_mut()
                .insert(format!("{}:{}", server_id, name), value.to_string());
            Ok(())
        }

        fn delete(&self, server_id: &str, name: &str) -> Result<()> {
            self.values.borrow_mut().remove(&format!("{}:{}", server_id, name));
            Ok(())
        }
    }
}
