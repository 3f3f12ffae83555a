use clap::{Args, Subcommand};
use serde::Serialize;

use wpstack::credentials::{CredentialResolver, RegistryResolver};
use wpstack::defaults;
use wpstack::keychain::{self, Keychain};
use wpstack::server::{Server, ServerRegistry};
use wpstack::ssh::{OpenSshConnector, RemoteSession};

use super::CmdResult;

#[derive(Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerOutput {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    server: Option<Server>,
    #[serde(skip_serializing_if = "Option::is_none")]
    servers: Option<Vec<Server>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    credentials: Option<CredentialSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    connected: Option<bool>,
}

/// Which secrets exist for a server. Never the secrets themselves.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
    identity_file: Option<String>,
    has_private_key: bool,
    has_password: bool,
}

#[derive(Args)]
pub struct ServerArgs {
    #[command(subcommand)]
    command: ServerCommand,
}

#[derive(Subcommand)]
enum ServerCommand {
    /// Register a new target server
    Create {
        /// Server ID
        id: String,
        /// SSH host
        #[arg(long)]
        host: String,
        /// SSH username (default: root)
        #[arg(long)]
        user: Option<String>,
        /// SSH port (default: 22)
        #[arg(long)]
        port: Option<u16>,
        /// Private key file to authenticate with
        #[arg(long)]
        identity_file: Option<String>,
    },
    /// Display server configuration and which credentials are stored
    Show {
        /// Server ID
        server_id: String,
    },
    /// List all configured servers
    List,
    /// Remove a server and its stored secrets
    Delete {
        /// Server ID
        server_id: String,
    },
    /// Store the SSH password in the system keychain (read from stdin)
    SetPassword {
        /// Server ID
        server_id: String,
    },
    /// Remove the stored SSH password
    UnsetPassword {
        /// Server ID
        server_id: String,
    },
    /// Store SSH private key material in the system keychain
    SetKey {
        /// Server ID
        server_id: String,
        /// Read the key from this file instead of stdin
        #[arg(long)]
        from_file: Option<String>,
    },
    /// Open a session, run a trivial command and disconnect
    Test {
        /// Server ID
        server_id: String,
    },
}

pub fn run(args: ServerArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<ServerOutput> {
    let registry = ServerRegistry::open_default()?;

    match args.command {
        ServerCommand::Create {
            id,
            host,
            user,
            port,
            identity_file,
        } => {
            let mut server = Server::new(&id, &host)?;
            if let Some(user) = user {
                server.user = user;
            }
            if let Some(port) = port {
                server.port = port;
            }
            server.identity_file = identity_file;
            registry.create(&server)?;

            Ok((
                ServerOutput {
                    command: "server.create".to_string(),
                    server_id: Some(server.id.clone()),
                    server: Some(server),
                    updated: Some(vec!["created".to_string()]),
                    ..Default::default()
                },
                0,
            ))
        }
        ServerCommand::Show { server_id } => {
            let server = registry.load(&server_id)?;
            let credentials = CredentialSummary {
                identity_file: server.identity_file.clone(),
                has_private_key: keychain::get(&server_id, keychain::PRIVATE_KEY)?.is_some(),
                has_password: keychain::get(&server_id, keychain::PASSWORD)?.is_some(),
            };

            Ok((
                ServerOutput {
                    command: "server.show".to_string(),
                    server_id: Some(server_id),
                    server: Some(server),
                    credentials: Some(credentials),
                    ..Default::default()
                },
                0,
            ))
        }
        ServerCommand::List => Ok((
            ServerOutput {
                command: "server.list".to_string(),
                servers: Some(registry.list()?),
                ..Default::default()
            },
            0,
        )),
        ServerCommand::Delete { server_id } => {
            registry.delete(&server_id)?;
            keychain::clear_server(&server_id)?;

            Ok((
                ServerOutput {
                    command: "server.delete".to_string(),
                    server_id: Some(server_id.clone()),
                    deleted: Some(vec![server_id]),
                    ..Default::default()
                },
                0,
            ))
        }
        ServerCommand::SetPassword { server_id } => {
            registry.load(&server_id)?;
            let password = crate::tty::read_secret("SSH password: ")?;
            if password.is_empty() {
                return Err(wpstack::Error::validation_missing_argument(vec![
                    "password".to_string(),
                ]));
            }
            keychain::store(&server_id, keychain::PASSWORD, &password)?;

            Ok((secret_updated("server.set_password", server_id, "password"), 0))
        }
        ServerCommand::UnsetPassword { server_id } => {
            registry.load(&server_id)?;
            keychain::delete(&server_id, keychain::PASSWORD)?;

            Ok((
                ServerOutput {
                    command: "server.unset_password".to_string(),
                    server_id: Some(server_id),
                    deleted: Some(vec!["password".to_string()]),
                    ..Default::default()
                },
                0,
            ))
        }
        ServerCommand::SetKey {
            server_id,
            from_file,
        } => {
            registry.load(&server_id)?;
            let material = match from_file {
                Some(path) => {
                    let path = shellexpand::tilde(&path).to_string();
                    std::fs::read_to_string(&path).map_err(|e| {
                        wpstack::Error::internal_io(e.to_string(), Some(format!("read {}", path)))
                    })?
                }
                None => crate::tty::read_secret("Paste private key, then Ctrl-D: ")?,
            };
            if material.trim().is_empty() {
                return Err(wpstack::Error::validation_missing_argument(vec![
                    "privateKey".to_string(),
                ]));
            }
            keychain::store(&server_id, keychain::PRIVATE_KEY, &material)?;

            Ok((secret_updated("server.set_key", server_id, "privateKey"), 0))
        }
        ServerCommand::Test { server_id } => {
            let resolver = RegistryResolver::new(registry, Keychain);
            let target = resolver.resolve(&server_id)?;
            let connected = RemoteSession::test_connectivity(
                OpenSshConnector::default(),
                target,
                &defaults::load_defaults(),
            )?;

            Ok((
                ServerOutput {
                    command: "server.test".to_string(),
                    server_id: Some(server_id),
                    connected: Some(connected),
                    ..Default::default()
                },
                if connected { 0 } else { 10 },
            ))
        }
    }
}

fn secret_updated(command: &str, server_id: String, field: &str) -> ServerOutput {
    ServerOutput {
        command: command.to_string(),
        server_id: Some(server_id),
        updated: Some(vec![field.to_string()]),
        ..Default::default()
    }
}
