//! Credential storage and request-signing. Rotation itself is out of
//! scope here — this crate stores whatever values a collaborator supplies
//! and signs outgoing requests with the current one.

pub mod cache;
pub mod error;
pub mod injector;
pub mod refresh;

pub use cache::{CredentialCache, RefreshRequests};
pub use error::CredentialError;
pub use injector::{inject, SigningRequest};
pub use refresh::{run_refresh_loop, AzureTokenSource, GcpTokenSource, TokenSource};
