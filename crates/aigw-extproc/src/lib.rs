//! The Envoy external-processing gRPC service: one bidirectional stream per
//! HTTP exchange, walking request headers/body then response headers/body
//! through `aigw-router`, `aigw-schema`, `aigw-credential`, and
//! `aigw-loadbalancer` before handing the rewritten message back to Envoy.

pub mod convert;
pub mod error;
pub mod service;
pub mod state;

pub use aigw_protos::envoy::service::ext_proc::v3::external_processor_server::ExternalProcessorServer;
pub use service::Gateway;
