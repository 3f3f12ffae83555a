mod client;
pub mod marker;
mod session;
mod target;

pub use client::{OpenSshChannel, OpenSshConnector};
pub use session::{Channel, Connector, RemoteSession};
pub use target::{Credentials, PrivateKey, Secret, SshTarget};

#[cfg(test)]
pub(crate) use session::testing;
