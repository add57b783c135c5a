use aigw_core::Strng;
use serde::{Deserialize, Serialize};

use crate::credential::CredentialRef;
use crate::schema::ApiSchema;

/// `{name, namespace}` identity of a `Backend`, matching the Kubernetes-style
/// naming the reconciliation collaborator uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendId {
	pub name: Strng,
	pub namespace: Strng,
}

impl std::fmt::Display for BackendId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}.{}", self.name, self.namespace)
	}
}

/// A configured upstream LLM provider. Created by the (out-of-scope)
/// reconciliation collaborator, consumed read-only by the core through a
/// `FilterConfig` snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backend {
	pub id: BackendId,
	pub schema: ApiSchema,
	pub credential_ref: CredentialRef,
	pub model_name_override: Option<Strng>,
	pub hostname_template: Strng,
	/// Weighted-random selection weight within a priority tier. A weight of
	/// `0` makes the backend reachable only via fallback to a lower
	/// priority tier.
	pub weight: u32,
	/// `None` for statically addressed backends; `Some` marks the backend
	/// as DNS-resolved and load-balanced per request by
	/// `aigw-loadbalancer::DynamicLoadBalancer`.
	#[serde(default)]
	pub dynamic: Option<DynamicBackendSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicBackendSpec {
	pub hostnames: Vec<Strng>,
	pub port: u16,
	/// Models this backend is known to serve. Empty means unrestricted —
	/// any model name is accepted. Non-empty lets `DynamicLoadBalancer`
	/// reject a request for a model the backend was never configured with
	/// instead of forwarding it and letting the upstream 404.
	#[serde(default)]
	pub models: Vec<Strng>,
}

/// A single resolved address backing a dynamic [`Backend`]. Endpoints
/// back-reference their backend by a stable index into the owning
/// `DynamicLoadBalancer`'s backend table rather than by pointer, so the
/// endpoint set can be atomically replaced on DNS refresh without touching
/// backend identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
	pub ip: std::net::IpAddr,
	pub port: u16,
	pub hostname: Option<Strng>,
	pub backend_index: usize,
}

impl Endpoint {
	pub fn socket_addr(&self) -> std::net::SocketAddr {
		std::net::SocketAddr::new(self.ip, self.port)
	}
}
