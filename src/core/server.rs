use crate::error::{Error, Result};
use crate::paths;
use crate::utils::{slugify, validation};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// A target machine. Secrets are kept in the keychain, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    #[serde(skip_deserializing, default)]
    pub id: String,
    pub host: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_port() -> u16 {
    22
}

impl Server {
    pub fn new(id: &str, host: &str) -> Result<Self> {
        let server = Self {
            id: slugify::slugify_id(id, "id")?,
            host: host.trim().to_string(),
            user: default_user(),
            port: default_port(),
            identity_file: None,
        };
        server.validate()?;
        Ok(server)
    }

    pub fn validate(&self) -> Result<()> {
        validation::require_non_empty(&self.host, "host", "Server host is required")?;
        validation::require_non_empty(&self.user, "user", "Server user is required")?;
        if self.port == 0 {
            return Err(Error::validation_invalid_argument(
                "port",
                "Port must be between 1 and 65535",
                Some(self.id.clone()),
                None,
            ));
        }
        Ok(())
    }
}

/// Server records as JSON files, one per server, under `servers/`.
#[derive(Debug, Clone)]
pub struct ServerRegistry {
    dir: PathBuf,
}

impl ServerRegistry {
    pub fn open_default() -> Result<Self> {
        Ok(Self::at(paths::servers()?))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.path(id).exists()
    }

    pub fn load(&self, id: &str) -> Result<Server> {
        let path = self.path(id);
        if !path.exists() {
            return Err(Error::server_not_found(id));
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
        })?;
        let mut server: Server = serde_json::from_str(&content)
            .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))?;
        server.id = id.to_string();
        Ok(server)
    }

    /// All readable server records, sorted by id. Unparseable files are skipped.
    pub fn list(&self) -> Result<Vec<Server>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("list {}", self.dir.display())))
        })?;

        let mut servers: Vec<Server> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| {
                let id = path.file_stem()?.to_string_lossy().to_string();
                match self.load(&id) {
                    Ok(server) => Some(server),
                    Err(err) => {
                        tracing::warn!(server = %id, error = %err, "skipping unreadable server record");
                        None
                    }
                }
            })
            .collect();

        servers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(servers)
    }

    pub fn save(&self, server: &Server) -> Result<()> {
        server.validate()?;
        fs::create_dir_all(&self.dir).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("create {}", self.dir.display())))
        })?;

        let content = serde_json::to_string_pretty(server)
            .map_err(|e| Error::internal_json(e.to_string(), Some("serialize server".to_string())))?;
        let path = self.path(&server.id);
        fs::write(&path, content).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("write {}", path.display())))
        })
    }

    /// Save a new server, refusing to overwrite an existing id.
    pub fn create(&self, server: &Server) -> Result<()> {
        if self.exists(&server.id) {
            return Err(Error::validation_invalid_argument(
                "server.id",
                format!("server '{}' already exists", server.id),
                Some(server.id.clone()),
                None,
            ));
        }
        self.save(server)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let path = self.path(id);
        if !path.exists() {
            return Err(Error::server_not_found(id));
        }
        fs::remove_file(&path).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("delete {}", path.display())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn defaults_apply_when_fields_are_missing() {
        let server: Server = serde_json::from_str(r#"{"host":"203.0.113.7"}"#).unwrap();
        assert_eq!(server.user, "root");
        assert_eq!(server.port, 22);
        assert!(server.identity_file.is_none());
    }

    #[test]
    fn new_normalizes_id() {
        let server = Server::new("Web Server 1", "203.0.113.7").unwrap();
        assert_eq!(server.id, "web-server-1");
        assert!(Server::new("web1", "  ").is_err());
    }

    #[test]
    fn create_load_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ServerRegistry::at(dir.path().join("servers"));

        let mut server = Server::new("web1", "203.0.113.7").unwrap();
        server.port = 2222;
        registry.create(&server).unwrap();
        registry.create(&Server::new("alpha", "198.51.100.2").unwrap()).unwrap();

        let loaded = registry.load("web1").unwrap();
        assert_eq!(loaded.id, "web1");
        assert_eq!(loaded.port, 2222);

        let ids: Vec<String> = registry.list().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["alpha", "web1"]);

        assert!(registry.create(&server).is_err());

        registry.delete("web1").unwrap();
        assert_eq!(registry.load("web1").unwrap_err().code, ErrorCode::ServerNotFound);
    }

    #[test]
    fn list_of_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ServerRegistry::at(dir.path().join("nope"));
        assert!(registry.list().unwrap().is_empty());
    }
}
