use aigw_core::Strng;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{Backend, BackendId};
use crate::route::AIGatewayRoute;

/// The full configuration snapshot the request path reads. Never mutated in
/// place: the config-load collaborator builds a new `FilterConfig` and
/// installs it behind an `aigw_core::Snapshot` so readers never observe a
/// torn update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
	/// Monotonically increasing, so logs/metrics can be tagged with the
	/// generation that served a request.
	pub generation: u64,
	pub routes: Vec<AIGatewayRoute>,
	pub backends: IndexMap<BackendId, Backend>,
	#[serde(default = "default_body_buffer_limit")]
	pub body_buffer_limit: usize,
	#[serde(default = "default_service_name")]
	pub service_name: Strng,
}

fn default_body_buffer_limit() -> usize {
	50 * 1024 * 1024
}

fn default_service_name() -> Strng {
	Strng::from("ai-gateway")
}

#[derive(Debug, Error)]
pub enum ConfigInvalid {
	#[error("backend {0} referenced by route {1} is not defined")]
	DanglingBackendRef(BackendId, Strng),
	#[error("backend {0} has negative weight")]
	NegativeWeight(BackendId),
	#[error("failed to parse config: {0}")]
	Parse(#[from] serde_yaml::Error),
}

impl FilterConfig {
	pub fn from_yaml(s: &str) -> Result<Self, ConfigInvalid> {
		let cfg: FilterConfig = serde_yaml::from_str(s)?;
		cfg.validate()?;
		Ok(cfg)
	}

	/// Validates referential integrity. Negative weights can't occur at the
	/// Rust type level (`weight: u32`); the `NegativeWeight` variant exists
	/// for config loaders that accept a signed wire type before narrowing
	/// it.
	pub fn validate(&self) -> Result<(), ConfigInvalid> {
		for route in &self.routes {
			for rule in &route.rules {
				for backend_ref in &rule.backends {
					if !self.backends.contains_key(&backend_ref.backend) {
						return Err(ConfigInvalid::DanglingBackendRef(
							backend_ref.backend.clone(),
							route.name.clone(),
						));
					}
				}
			}
		}
		Ok(())
	}

	pub fn route(&self, name: &str, namespace: &str) -> Option<&AIGatewayRoute> {
		self
			.routes
			.iter()
			.find(|r| r.name == name && r.namespace == namespace)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backend::DynamicBackendSpec;
	use crate::credential::CredentialRef;
	use crate::route::{BackendRef, RouteRule};
	use crate::schema::ApiSchema;

	fn backend(name: &str) -> Backend {
		Backend {
			id: BackendId {
				name: Strng::from(name),
				namespace: Strng::from("default"),
			},
			schema: ApiSchema::OpenAI(None),
			credential_ref: CredentialRef(Strng::from("cred")),
			model_name_override: None,
			hostname_template: Strng::from("api.openai.com"),
			weight: 1,
			dynamic: None,
		}
	}

	#[test]
	fn rejects_dangling_backend_ref() {
		let mut backends = IndexMap::new();
		let b = backend("openai");
		backends.insert(b.id.clone(), b);
		let cfg = FilterConfig {
			generation: 1,
			routes: vec![AIGatewayRoute {
				name: Strng::from("route1"),
				namespace: Strng::from("default"),
				rules: vec![RouteRule {
					matchers: vec![],
					backends: vec![BackendRef {
						backend: BackendId {
							name: Strng::from("missing"),
							namespace: Strng::from("default"),
						},
						weight: 1,
						priority: 0,
					}],
				}],
			}],
			backends,
			body_buffer_limit: default_body_buffer_limit(),
			service_name: default_service_name(),
		};
		assert!(matches!(
			cfg.validate(),
			Err(ConfigInvalid::DanglingBackendRef(..))
		));
	}

	#[test]
	fn dynamic_backend_roundtrips_through_yaml() {
		let mut b = backend("pool");
		b.dynamic = Some(DynamicBackendSpec {
			hostnames: vec![Strng::from("foo.io"), Strng::from("example.com")],
			port: 9999,
			models: vec![],
		});
		let mut backends = IndexMap::new();
		backends.insert(b.id.clone(), b);
		let cfg = FilterConfig {
			generation: 1,
			routes: vec![],
			backends,
			body_buffer_limit: default_body_buffer_limit(),
			service_name: default_service_name(),
		};
		let yaml = serde_yaml::to_string(&cfg).unwrap();
		let round_tripped = FilterConfig::from_yaml(&yaml).unwrap();
		assert_eq!(round_tripped.backends.len(), 1);
	}
}
