//! The Envoy Gateway extension-server side of this gateway: rewrites
//! generated clusters and HTTP Connection Managers so ordinary backends get
//! the upstream ext_proc filter wired in, and InferencePool-routed clusters
//! get rewritten to dispatch through an external endpoint picker.

mod error;
mod service;

pub use aigw_protos::envoygateway::extension::v1alpha1::envoy_gateway_extension_server::EnvoyGatewayExtensionServer;
pub use aigw_protos::grpc::health::v1::health_server::HealthServer;
pub use error::XdsError;
pub use service::{HealthService, XdsExtension};
