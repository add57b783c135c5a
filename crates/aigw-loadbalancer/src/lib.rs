//! DNS-backed endpoint selection for `dynamic` backends. Resolution runs on
//! a refresh interval owned by the app binary, never on the request path;
//! `select` only ever reads the most recently resolved snapshot.

pub mod error;
mod resolver;

use std::net::SocketAddr;

use aigw_config::{Backend, BackendId, Endpoint};
use aigw_core::{Snapshot, Strng};
use aigw_schema::HeaderMutation;
use rand::Rng;

pub use error::LoadBalancerError;
use resolver::Dns;

/// One dynamic backend's resolved addresses plus the headers needed to
/// route an Envoy request to a specific one of them.
pub struct SelectedEndpoint {
	pub original_dst: SocketAddr,
	pub use_original_dst: bool,
	pub host: Option<Strng>,
}

impl SelectedEndpoint {
	pub fn header_mutations(&self) -> Vec<HeaderMutation> {
		let mut mutations = vec![
			HeaderMutation::Set("x-ai-eg-original-dst".to_string(), self.original_dst.to_string()),
			HeaderMutation::Set(
				"x-ai-eg-use-original-dst".to_string(),
				self.use_original_dst.to_string(),
			),
		];
		if let Some(host) = &self.host {
			mutations.push(HeaderMutation::Set("host".to_string(), host.to_string()));
		}
		mutations
	}
}

/// Resolves hostnames for every `dynamic` backend and serves uniform-random
/// endpoint selection for each. One instance covers all dynamic backends in
/// a `FilterConfig` generation; backends are addressed by their index into
/// the slice this was built from.
pub struct DynamicLoadBalancer {
	dns: Dns,
	backends: Vec<Backend>,
	endpoints: Snapshot<Vec<Endpoint>>,
}

impl DynamicLoadBalancer {
	pub async fn from_system_resolver(backends: Vec<Backend>) -> anyhow::Result<Self> {
		Self::build(Dns::system()?, backends).await
	}

	pub async fn from_dns_server(server: SocketAddr, backends: Vec<Backend>) -> Self {
		Self::build(Dns::with_server(server), backends)
			.await
			.expect("fixed-server resolution never fails at construction")
	}

	async fn build(dns: Dns, backends: Vec<Backend>) -> anyhow::Result<Self> {
		let endpoints = resolve_all(&dns, &backends).await;
		Ok(Self {
			dns,
			backends,
			endpoints: Snapshot::new(endpoints),
		})
	}

	/// Re-resolves every hostname and atomically swaps the endpoint set.
	/// Outstanding `select` calls against the old snapshot are unaffected.
	pub async fn refresh(&self) {
		let endpoints = resolve_all(&self.dns, &self.backends).await;
		self.endpoints.store(endpoints);
	}

	pub fn select(&self, backend_index: usize, model: Option<&str>) -> Result<SelectedEndpoint, LoadBalancerError> {
		let backend = self
			.backends
			.get(backend_index)
			.expect("backend_index is assigned by this type and always valid");

		if let (Some(model), Some(spec)) = (model, backend.dynamic.as_ref()) {
			if !spec.models.is_empty() && !spec.models.iter().any(|m| m.as_str() == model) {
				return Err(LoadBalancerError::ModelNotFound(
					backend.id.clone(),
					Strng::from(model),
				));
			}
		}

		let pool = self.endpoints.load();
		let candidates: Vec<&Endpoint> = pool.iter().filter(|e| e.backend_index == backend_index).collect();
		if candidates.is_empty() {
			return Err(LoadBalancerError::NoEndpoints(backend.id.clone()));
		}
		let chosen = candidates[rand::rng().random_range(0..candidates.len())];
		Ok(SelectedEndpoint {
			original_dst: chosen.socket_addr(),
			use_original_dst: true,
			host: chosen.hostname.clone(),
		})
	}

	pub fn backend_id(&self, backend_index: usize) -> Option<&BackendId> {
		self.backends.get(backend_index).map(|b| &b.id)
	}

	/// Reverse of [`Self::backend_id`]: the index a `Backend` was resolved
	/// at, so a caller holding a `BackendId` from `Router::resolve` can call
	/// [`Self::select`].
	pub fn index_of(&self, id: &BackendId) -> Option<usize> {
		self.backends.iter().position(|b| &b.id == id)
	}
}

async fn resolve_all(dns: &Dns, backends: &[Backend]) -> Vec<Endpoint> {
	let mut endpoints = Vec::new();
	for (backend_index, backend) in backends.iter().enumerate() {
		let Some(spec) = backend.dynamic.as_ref() else {
			continue;
		};
		for hostname in &spec.hostnames {
			match dns.lookup(hostname.as_str()).await {
				Ok(ips) => endpoints.extend(ips.into_iter().map(|ip| Endpoint {
					ip,
					port: spec.port,
					hostname: Some(hostname.clone()),
					backend_index,
				})),
				Err(error) => {
					tracing::warn!(%hostname, %error, "dns resolution failed, dropping hostname from this generation");
				},
			}
		}
	}
	endpoints
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;
	use std::net::Ipv4Addr;

	use aigw_config::{ApiSchema, CredentialRef, DynamicBackendSpec};

	use super::*;

	fn pool_backend(hostnames: &[&str], port: u16, models: &[&str]) -> Backend {
		Backend {
			id: BackendId {
				name: Strng::from("pool"),
				namespace: Strng::from("default"),
			},
			schema: ApiSchema::OpenAI(None),
			credential_ref: CredentialRef(Strng::from("cred")),
			model_name_override: None,
			hostname_template: Strng::from("pool"),
			weight: 1,
			dynamic: Some(DynamicBackendSpec {
				hostnames: hostnames.iter().map(|h| Strng::from(*h)).collect(),
				port,
				models: models.iter().map(|m| Strng::from(*m)).collect(),
			}),
		}
	}

	async fn lb_with_fixed_dns(backend: Backend, table: HashMap<String, Vec<std::net::IpAddr>>) -> DynamicLoadBalancer {
		DynamicLoadBalancer::build(Dns::Fixed(table), vec![backend])
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn resolves_and_selects_an_endpoint() {
		let backend = pool_backend(&["foo.io", "example.com"], 9999, &[]);
		let table = HashMap::from([
			("foo.io".to_string(), vec![std::net::IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))]),
			(
				"example.com".to_string(),
				vec![std::net::IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2))],
			),
		]);
		let lb = lb_with_fixed_dns(backend, table).await;
		let selected = lb.select(0, Some("known-model")).unwrap();
		assert!(selected.use_original_dst);
		assert!(
			selected.original_dst == "1.1.1.1:9999".parse().unwrap()
				|| selected.original_dst == "2.2.2.2:9999".parse().unwrap()
		);
		assert!(selected.host.is_some());
	}

	#[tokio::test]
	async fn index_of_finds_the_matching_backend() {
		let backend = pool_backend(&["foo.io"], 443, &[]);
		let id = backend.id.clone();
		let lb = lb_with_fixed_dns(backend, HashMap::new()).await;
		assert_eq!(lb.index_of(&id), Some(0));
		let other = BackendId {
			name: Strng::from("missing"),
			namespace: Strng::from("default"),
		};
		assert_eq!(lb.index_of(&other), None);
	}

	#[tokio::test]
	async fn empty_endpoint_set_is_an_error() {
		let backend = pool_backend(&["nowhere.invalid"], 443, &[]);
		let lb = lb_with_fixed_dns(backend, HashMap::new()).await;
		let err = lb.select(0, None).unwrap_err();
		assert!(matches!(err, LoadBalancerError::NoEndpoints(_)));
	}

	#[tokio::test]
	async fn unknown_model_is_rejected_before_dns_lookup_matters() {
		let backend = pool_backend(&["foo.io"], 443, &["gpt-4o"]);
		let table = HashMap::from([(
			"foo.io".to_string(),
			vec![std::net::IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))],
		)]);
		let lb = lb_with_fixed_dns(backend, table).await;
		let err = lb.select(0, Some("not-configured")).unwrap_err();
		assert!(matches!(err, LoadBalancerError::ModelNotFound(..)));
	}

	#[tokio::test]
	async fn refresh_replaces_the_endpoint_snapshot() {
		let backend = pool_backend(&["foo.io"], 443, &[]);
		let table = HashMap::from([(
			"foo.io".to_string(),
			vec![std::net::IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))],
		)]);
		let lb = lb_with_fixed_dns(backend, table).await;
		assert!(lb.select(0, None).is_ok());

		// Simulate the hostname going dark on the next refresh.
		let empty_dns = Dns::Fixed(HashMap::new());
		let endpoints = resolve_all(&empty_dns, &lb.backends).await;
		lb.endpoints.store(endpoints);

		let err = lb.select(0, None).unwrap_err();
		assert!(matches!(err, LoadBalancerError::NoEndpoints(_)));
	}
}
