// Public modules
pub mod catalog;
pub mod credentials;
pub mod defaults;
pub mod error;
pub mod job;
pub mod keychain;
pub mod pipeline;
pub mod server;
pub mod ssh;
pub mod store;

// Internal modules - not part of public API
pub(crate) mod paths;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
pub use pipeline::{PipelineDriver, RunOutcome};
