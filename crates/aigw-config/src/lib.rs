//! The gateway's data model: `Backend`, `RouteRule`, `Credential`, and the
//! `FilterConfig` snapshot that ties them together. This crate has no
//! request-handling logic of its own — it is consumed read-only by
//! `aigw-router`, `aigw-schema`, `aigw-credential`, `aigw-loadbalancer` and
//! `aigw-extproc`.

pub mod backend;
pub mod credential;
pub mod filter_config;
pub mod route;
pub mod schema;

pub use backend::{Backend, BackendId, DynamicBackendSpec, Endpoint};
pub use credential::{Credential, CredentialRef};
pub use filter_config::{ConfigInvalid, FilterConfig};
pub use route::{AIGatewayRoute, BackendRef, Matcher, RouteRule, MODEL_HEADER};
pub use schema::{ApiSchema, SchemaFamily};
