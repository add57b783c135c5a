//! Resolves an incoming request to a `(backend, schema, credential,
//! model override)` tuple plus a fallback chain, per `FilterConfig`'s
//! routes. Stateless: every call takes the current config snapshot and a
//! fresh PRNG seed, so there's nothing here that needs to survive a
//! config reload.

pub mod error;

use std::collections::BTreeMap;

use aigw_config::{AIGatewayRoute, Backend, BackendId, BackendRef, FilterConfig, MODEL_HEADER};
use aigw_schema::SchemaFamily;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub use error::RouterError;

/// The outcome of `Router::resolve`: the chosen backend plus a chain of
/// alternates to try if the upstream call to it fails. Backends within the
/// chosen priority tier that lost the weighted draw are not fallbacks —
/// only backends in strictly lower-priority tiers are.
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
	pub backend: &'a Backend,
	pub upstream_schema: SchemaFamily,
	pub credential_ref: aigw_config::CredentialRef,
	pub model_name_override: Option<String>,
	pub fallbacks: Vec<&'a Backend>,
}

#[derive(Default, Clone, Copy)]
pub struct Router;

impl Router {
	pub fn new() -> Self {
		Self
	}

	/// `route_name`/`route_namespace` identify the virtual host, as
	/// resolved by the Envoy-injected header or route metadata upstream of
	/// this call. `body_model` is the parsed request body's `model` field,
	/// used as the virtualization matcher's fallback source.
	pub fn resolve<'a>(
		&self,
		config: &'a FilterConfig,
		route_name: &str,
		route_namespace: &str,
		headers: &http::HeaderMap,
		body_model: Option<&str>,
	) -> Result<Resolution<'a>, RouterError> {
		let route = config
			.route(route_name, route_namespace)
			.ok_or_else(|| RouterError::UnknownRoute {
				name: route_name.to_string(),
				namespace: route_namespace.to_string(),
			})?;

		let rule = self
			.matching_rule(route, headers, body_model)
			.ok_or_else(|| RouterError::NoMatchingRule {
				name: route_name.to_string(),
				namespace: route_namespace.to_string(),
				model: model_for_error(headers, body_model),
			})?;

		let tiers = partition_by_priority(&rule.backends);
		let mut rng = ChaCha8Rng::seed_from_u64(rand::rng().random());

		let mut chosen: Option<&BackendRef> = None;
		let mut fallback_refs: Vec<&BackendRef> = Vec::new();

		for (_, tier) in tiers {
			if chosen.is_none() {
				let candidates: Vec<&BackendRef> = tier.iter().copied().filter(|b| b.weight > 0).collect();
				if let Some(pick) = weighted_pick(&mut rng, &candidates) {
					chosen = Some(pick);
					fallback_refs.extend(
						tier
							.iter()
							.copied()
							.filter(|b| b.backend != pick.backend),
					);
					continue;
				}
			}
			fallback_refs.extend(tier.iter().copied());
		}

		let chosen = chosen.ok_or_else(|| RouterError::NoMatchingRule {
			name: route_name.to_string(),
			namespace: route_namespace.to_string(),
			model: model_for_error(headers, body_model),
		})?;

		let backend = lookup(config, &chosen.backend)?;
		let fallbacks = fallback_refs
			.into_iter()
			.map(|r| lookup(config, &r.backend))
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Resolution {
			backend,
			upstream_schema: backend.schema.family(),
			credential_ref: backend.credential_ref.clone(),
			model_name_override: backend.model_name_override.as_ref().map(|s| s.to_string()),
			fallbacks,
		})
	}

	fn matching_rule<'a>(
		&self,
		route: &'a AIGatewayRoute,
		headers: &http::HeaderMap,
		body_model: Option<&str>,
	) -> Option<&'a aigw_config::RouteRule> {
		route.rules.iter().find(|rule| rule.matches(headers, body_model))
	}
}

fn model_for_error(headers: &http::HeaderMap, body_model: Option<&str>) -> Option<String> {
	headers
		.get(MODEL_HEADER)
		.and_then(|v| v.to_str().ok())
		.or(body_model)
		.map(str::to_string)
}

fn partition_by_priority(backends: &[BackendRef]) -> Vec<(u32, Vec<&BackendRef>)> {
	let mut tiers: BTreeMap<u32, Vec<&BackendRef>> = BTreeMap::new();
	for b in backends {
		tiers.entry(b.priority).or_default().push(b);
	}
	tiers.into_iter().collect()
}

fn weighted_pick<'a>(rng: &mut ChaCha8Rng, candidates: &[&'a BackendRef]) -> Option<&'a BackendRef> {
	let total: u64 = candidates.iter().map(|b| u64::from(b.weight)).sum();
	if total == 0 {
		return None;
	}
	let mut draw = rng.random_range(0..total);
	for c in candidates {
		let weight = u64::from(c.weight);
		if draw < weight {
			return Some(c);
		}
		draw -= weight;
	}
	unreachable!("draw is bounded by total weight")
}

fn lookup<'a>(config: &'a FilterConfig, id: &BackendId) -> Result<&'a Backend, RouterError> {
	config
		.backends
		.get(id)
		.ok_or_else(|| RouterError::DanglingBackend(id.clone()))
}

#[cfg(test)]
mod tests {
	use aigw_config::{ApiSchema, CredentialRef, DynamicBackendSpec, Matcher, RouteRule};
	use aigw_core::Strng;
	use indexmap::IndexMap;

	use super::*;

	fn backend(name: &str, weight: u32) -> (BackendId, Backend) {
		let id = BackendId {
			name: Strng::from(name),
			namespace: Strng::from("default"),
		};
		let backend = Backend {
			id: id.clone(),
			schema: ApiSchema::OpenAI(None),
			credential_ref: CredentialRef(Strng::from("cred")),
			model_name_override: None,
			hostname_template: Strng::from("api.openai.com"),
			weight,
			dynamic: None,
		};
		(id, backend)
	}

	fn config_with(rule: RouteRule, backends: Vec<(BackendId, Backend)>) -> FilterConfig {
		let mut map = IndexMap::new();
		for (id, b) in backends {
			map.insert(id, b);
		}
		FilterConfig {
			generation: 1,
			routes: vec![AIGatewayRoute {
				name: Strng::from("route1"),
				namespace: Strng::from("default"),
				rules: vec![rule],
			}],
			backends: map,
			body_buffer_limit: 1024,
			service_name: Strng::from("ai-gateway"),
		}
	}

	fn headers() -> http::HeaderMap {
		http::HeaderMap::new()
	}

	#[test]
	fn unknown_route_is_rejected() {
		let cfg = FilterConfig {
			generation: 1,
			routes: vec![],
			backends: IndexMap::new(),
			body_buffer_limit: 1024,
			service_name: Strng::from("ai-gateway"),
		};
		let router = Router::new();
		let err = router
			.resolve(&cfg, "route1", "default", &headers(), Some("gpt-4o"))
			.unwrap_err();
		assert!(matches!(err, RouterError::UnknownRoute { .. }));
	}

	#[test]
	fn single_backend_is_always_chosen() {
		let (id, b) = backend("openai", 1);
		let rule = RouteRule {
			matchers: vec![],
			backends: vec![BackendRef {
				backend: id.clone(),
				weight: 1,
				priority: 0,
			}],
		};
		let cfg = config_with(rule, vec![(id.clone(), b)]);
		let router = Router::new();
		let res = router
			.resolve(&cfg, "route1", "default", &headers(), None)
			.unwrap();
		assert_eq!(res.backend.id, id);
		assert!(res.fallbacks.is_empty());
	}

	#[test]
	fn zero_weight_backend_only_reachable_via_fallback() {
		let (primary_id, primary) = backend("primary", 0);
		let (fallback_id, fallback) = backend("fallback", 1);
		let rule = RouteRule {
			matchers: vec![],
			backends: vec![
				BackendRef {
					backend: primary_id.clone(),
					weight: 0,
					priority: 0,
				},
				BackendRef {
					backend: fallback_id.clone(),
					weight: 1,
					priority: 1,
				},
			],
		};
		let cfg = config_with(rule, vec![(primary_id.clone(), primary), (fallback_id.clone(), fallback)]);
		let router = Router::new();
		let res = router
			.resolve(&cfg, "route1", "default", &headers(), None)
			.unwrap();
		assert_eq!(res.backend.id, fallback_id);
		assert_eq!(res.fallbacks.len(), 1);
		assert_eq!(res.fallbacks[0].id, primary_id);
	}

	#[test]
	fn lower_priority_backends_become_fallbacks() {
		let (top_id, top) = backend("top", 1);
		let (low_id, low) = backend("low", 1);
		let rule = RouteRule {
			matchers: vec![],
			backends: vec![
				BackendRef {
					backend: top_id.clone(),
					weight: 1,
					priority: 0,
				},
				BackendRef {
					backend: low_id.clone(),
					weight: 1,
					priority: 1,
				},
			],
		};
		let cfg = config_with(rule, vec![(top_id.clone(), top), (low_id.clone(), low)]);
		let router = Router::new();
		let res = router
			.resolve(&cfg, "route1", "default", &headers(), None)
			.unwrap();
		assert_eq!(res.backend.id, top_id);
		assert_eq!(res.fallbacks.len(), 1);
		assert_eq!(res.fallbacks[0].id, low_id);
	}

	#[test]
	fn no_match_falls_back_to_openai_shaped_404() {
		let (id, b) = backend("openai", 1);
		let rule = RouteRule {
			matchers: vec![Matcher::HeaderExact {
				name: Strng::from(MODEL_HEADER),
				value: Strng::from("gpt-4o"),
			}],
			backends: vec![BackendRef {
				backend: id.clone(),
				weight: 1,
				priority: 0,
			}],
		};
		let cfg = config_with(rule, vec![(id, b)]);
		let router = Router::new();
		let err = router
			.resolve(&cfg, "route1", "default", &headers(), Some("not-configured"))
			.unwrap_err();
		assert_eq!(err.status_code(), 404);
		let body = err.openai_body();
		let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
		assert!(
			json["error"]["message"]
				.as_str()
				.unwrap()
				.contains("not-configured")
		);
	}

	#[test]
	fn dynamic_backend_survives_lookup() {
		let (id, mut b) = backend("pool", 1);
		b.dynamic = Some(DynamicBackendSpec {
			hostnames: vec![Strng::from("example.com")],
			port: 443,
			models: vec![],
		});
		let rule = RouteRule {
			matchers: vec![],
			backends: vec![BackendRef {
				backend: id.clone(),
				weight: 1,
				priority: 0,
			}],
		};
		let cfg = config_with(rule, vec![(id, b)]);
		let router = Router::new();
		let res = router
			.resolve(&cfg, "route1", "default", &headers(), None)
			.unwrap();
		assert!(res.backend.dynamic.is_some());
	}
}
