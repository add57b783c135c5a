use std::sync::Arc;

use aigw_config::{FilterConfig, Matcher, RouteRule};
use aigw_core::Snapshot;
use aigw_protos::envoy::config::cluster::v3::cluster::{DiscoveryType, LbPolicy};
use aigw_protos::envoy::config::cluster::v3::{Cluster, HttpFilter, HttpProtocolOptions};
use aigw_protos::envoy::config::core::v3::{Address, Metadata};
use aigw_protos::envoy::config::listener::v3::Filter;
use aigw_protos::envoygateway::extension::v1alpha1::envoy_gateway_extension_server::EnvoyGatewayExtension;
use aigw_protos::envoygateway::extension::v1alpha1::{
	PostHCMModifyRequest, PostHCMModifyResponse, PostTranslateModifyRequest, PostTranslateModifyResponse,
};
use aigw_protos::grpc::health::v1::health_server::Health;
use aigw_protos::grpc::health::v1::health_check_response::ServingStatus;
use aigw_protos::grpc::health::v1::{HealthCheckRequest, HealthCheckResponse};
use prost_wkt_types::{Duration as PbDuration, Struct as PbStruct};
use regex::Regex;
use tonic::{Request, Response, Status};

use crate::error::XdsError;

const METADATA_NAMESPACE: &str = "aigateway.envoy.io";
const UPSTREAM_CODEC_FILTER: &str = "envoy.filters.http.upstream_codec";
const EXT_PROC_FILTER_NAME: &str = "envoy.filters.http.ext_proc/aigateway";
const INFERENCEPOOL_MARKER: &str = "inferencepool";
const INFERENCE_POOL_METADATA_KEY: &str = "per_route_rule_inference_pool";
const ORIGINAL_DST_HEADER: &str = "x-gateway-destination-endpoint";
const DEFAULT_ENDPOINTPICKER_PORT: u16 = 9002;

fn json_to_struct(value: serde_json::Value) -> Result<PbStruct, XdsError> {
	serde_json::from_value(value).map_err(XdsError::Metadata)
}

fn backend_name_metadata(name: &str) -> Result<Metadata, XdsError> {
	Ok(Metadata {
		filter_metadata: std::collections::HashMap::from([(
			METADATA_NAMESPACE.to_string(),
			json_to_struct(serde_json::json!({ "backend_name": name }))?,
		)]),
	})
}

/// One HTTP filter this hook wants present in every HCM filter chain,
/// discovered while processing an InferencePool cluster in
/// `post_translate_modify`. Handed to the next `post_hcm_modify` call for
/// the same xDS snapshot — Envoy Gateway always calls the cluster hook
/// before the listener hook within one generation.
#[derive(Debug, Clone, PartialEq)]
struct InferenceFilterSpec {
	name: String,
	typed_config: PbStruct,
}

/// `httproute/<ns>/<name>/rule/<i>` — the cluster naming scheme Envoy
/// Gateway uses for clusters generated from an `AIGatewayRoute` rule.
struct ClusterRef {
	namespace: String,
	route: String,
	rule_index: usize,
}

fn parse_cluster_name(name: &str) -> Option<ClusterRef> {
	static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
	let re = PATTERN.get_or_init(|| Regex::new(r"^httproute/([^/]+)/([^/]+)/rule/(\d+)$").unwrap());
	let caps = re.captures(name)?;
	Some(ClusterRef {
		namespace: caps[1].to_string(),
		route: caps[2].to_string(),
		rule_index: caps[3].parse().ok()?,
	})
}

fn matcher_value_contains(matcher: &Matcher, needle: &str) -> bool {
	match matcher {
		Matcher::HeaderExact { value, .. } | Matcher::HeaderPrefix { value, .. } => {
			value.as_str().to_ascii_lowercase().contains(needle)
		},
		Matcher::HeaderRegex { pattern, .. } => pattern.0.as_str().to_ascii_lowercase().contains(needle),
	}
}

fn is_inference_pool_rule(rule: &RouteRule) -> bool {
	rule.matchers.iter().any(|m| matcher_value_contains(m, INFERENCEPOOL_MARKER))
}

/// `ns/name/svc/port` as carried on the incoming cluster's
/// `per_route_rule_inference_pool` metadata entry — Envoy Gateway's own xDS
/// generation populates this before the hook ever sees the cluster.
struct InferencePoolRef {
	name: String,
	namespace: String,
	service: String,
	port: u16,
}

/// Struct fields round-trip through `serde_json::Value` (mirroring the
/// google.protobuf.Value JSON mapping), so this is the only reliable way to
/// pull a plain string back out of a `prost_wkt_types::Value`.
fn struct_field_as_string(s: &PbStruct, key: &str) -> Option<String> {
	let value = s.fields.get(key)?;
	serde_json::to_value(value).ok()?.as_str().map(str::to_string)
}

fn read_inference_pool_ref(cluster: &Cluster) -> Option<InferencePoolRef> {
	let value = struct_field_as_string(cluster.metadata.as_ref()?.filter_metadata.get(METADATA_NAMESPACE)?, INFERENCE_POOL_METADATA_KEY)?;
	let mut parts = value.splitn(4, '/');
	let namespace = parts.next()?.to_string();
	let name = parts.next()?.to_string();
	let service = parts.next()?.to_string();
	let port = parts.next().and_then(|p| p.parse().ok()).unwrap_or(DEFAULT_ENDPOINTPICKER_PORT);
	Some(InferencePoolRef { name, namespace, service, port })
}

fn ext_proc_filter_typed_config(route: &str, namespace: &str) -> Result<PbStruct, XdsError> {
	json_to_struct(serde_json::json!({
		"grpc_service": {
			"envoy_grpc": {
				"cluster_name": format!("envoyextensionpolicy/{namespace}/ai-eg-route-extproc-{route}/extproc/0"),
			},
			"timeout": "30s",
		},
		"processing_mode": {
			"request_body_mode": "BUFFERED",
			"response_body_mode": "BUFFERED",
		},
		"request_attributes": ["xds.upstream_host_metadata"],
		"metadata_options": {
			"receiving_namespaces": { "untyped": [METADATA_NAMESPACE] },
		},
	}))
	.map_err(Into::into)
}

fn endpointpicker_filter_typed_config(cluster_name: &str) -> Result<PbStruct, XdsError> {
	json_to_struct(serde_json::json!({
		"grpc_service": {
			"envoy_grpc": { "cluster_name": cluster_name },
		},
		"processing_mode": {
			"request_body_mode": "FULL_DUPLEX_STREAMED",
			"response_body_mode": "FULL_DUPLEX_STREAMED",
		},
		"failure_mode_allow": false,
	}))
}

impl From<serde_json::Error> for XdsError {
	fn from(e: serde_json::Error) -> Self {
		XdsError::Metadata(e)
	}
}

/// Inserts the upstream `ExternalProcessor` filter immediately before the
/// terminal `upstream_codec`, appending `upstream_codec` if the cluster's
/// protocol options didn't carry one yet.
fn inject_upstream_ext_proc_filter(cluster: &mut Cluster, route: &str, namespace: &str) -> Result<(), XdsError> {
	let typed_config = ext_proc_filter_typed_config(route, namespace)?;
	let options = cluster.typed_extension_protocol_options.get_or_insert_with(HttpProtocolOptions::default);
	if options.http_filters.iter().any(|f| f.name == EXT_PROC_FILTER_NAME) {
		return Ok(());
	}
	let ext_proc = HttpFilter {
		name: EXT_PROC_FILTER_NAME.to_string(),
		typed_config: Some(typed_config),
		is_optional: false,
	};
	match options.http_filters.iter().position(|f| f.name == UPSTREAM_CODEC_FILTER) {
		Some(pos) => options.http_filters.insert(pos, ext_proc),
		None => {
			options.http_filters.push(ext_proc);
			options.http_filters.push(HttpFilter {
				name: UPSTREAM_CODEC_FILTER.to_string(),
				typed_config: None,
				is_optional: false,
			});
		},
	}
	Ok(())
}

/// Attaches `backend_name` metadata to each load-assignment endpoint, in
/// declaration order against the rule's backend list. Per the invariant, a
/// count mismatch is logged and the cluster is returned untouched rather
/// than annotated partially.
fn annotate_endpoint_metadata(cluster: &mut Cluster, rule: &RouteRule, config: &FilterConfig) -> bool {
	let endpoints: Vec<_> = cluster
		.load_assignment
		.iter_mut()
		.flat_map(|la| la.endpoints.iter_mut())
		.flat_map(|locality| locality.lb_endpoints.iter_mut())
		.collect();

	if endpoints.len() != rule.backends.len() {
		tracing::warn!(
			cluster = %cluster.name,
			endpoints = endpoints.len(),
			backends = rule.backends.len(),
			"endpoint count does not match backend count, leaving cluster unmodified"
		);
		return false;
	}

	for (endpoint, backend_ref) in endpoints.into_iter().zip(&rule.backends) {
		let Some(backend) = config.backends.get(&backend_ref.backend) else {
			tracing::warn!(backend = %backend_ref.backend, "route rule backend is not defined in the current config");
			continue;
		};
		let name = format!("{}.{}", backend.id.name, backend.id.namespace);
		match backend_name_metadata(&name) {
			Ok(metadata) => endpoint.metadata = Some(metadata),
			Err(error) => tracing::warn!(%error, "failed to build endpoint metadata"),
		}
	}
	true
}

/// Rewrites `cluster` into the `ORIGINAL_DST` shape InferencePool routing
/// needs and returns the companion `STRICT_DNS` cluster plus the HTTP
/// filter spec to carry over to `post_hcm_modify`.
fn rewrite_inference_pool_cluster(cluster: &mut Cluster, pool: &InferencePoolRef) -> Result<(Cluster, InferenceFilterSpec), XdsError> {
	cluster.r#type = DiscoveryType::OriginalDst as i32;
	cluster.lb_policy = LbPolicy::ClusterProvided as i32;
	cluster.use_http_header_for_original_dst = true;
	cluster.original_dst_header_name = ORIGINAL_DST_HEADER.to_string();
	cluster.connect_timeout = Some(PbDuration { seconds: 60, nanos: 0 });

	let companion_name = format!("envoy.clusters.endpointpicker_{}_{}_ext_proc", pool.name, pool.namespace);
	let companion = Cluster {
		name: companion_name.clone(),
		r#type: DiscoveryType::StrictDns as i32,
		lb_policy: LbPolicy::RoundRobin as i32,
		load_assignment: Some(aigw_protos::envoy::config::endpoint::v3::ClusterLoadAssignment {
			cluster_name: companion_name.clone(),
			endpoints: vec![aigw_protos::envoy::config::endpoint::v3::LocalityLbEndpoints {
				lb_endpoints: vec![aigw_protos::envoy::config::endpoint::v3::LbEndpoint {
					endpoint: Some(aigw_protos::envoy::config::endpoint::v3::Endpoint {
						address: Some(Address {
							socket_address_host: format!("{}.{}.svc", pool.service, pool.namespace),
							socket_address_port: u32::from(pool.port),
						}),
						hostname: String::new(),
					}),
					metadata: None,
					load_balancing_weight: 1,
				}],
			}],
		}),
		connect_timeout: Some(PbDuration { seconds: 60, nanos: 0 }),
		metadata: None,
		typed_extension_protocol_options: Some(HttpProtocolOptions {
			http_filters: Vec::new(),
			explicit_http_config_protocol: "HTTP2".to_string(),
		}),
		use_http_header_for_original_dst: false,
		original_dst_header_name: String::new(),
		transport_socket: Some(aigw_protos::envoy::config::core::v3::TransportSocket {
			name: "envoy.transport_sockets.tls".to_string(),
			typed_config: Some(json_to_struct(serde_json::json!({ "allow_renegotiation": false, "sni": pool.service }))?),
		}),
	};

	let filter_name = format!("envoy.filters.http.endpointpicker_{}_{}_ext_proc", pool.name, pool.namespace);
	let filter = InferenceFilterSpec {
		name: filter_name,
		typed_config: endpointpicker_filter_typed_config(&companion_name)?,
	};
	Ok((companion, filter))
}

/// Implements the Envoy-Gateway xDS post-translate hooks plus
/// `grpc.health.v1`. Holds the same `FilterConfig` snapshot the extproc
/// stream handler reads, so the two servers agree on the backend set a
/// given cluster maps to.
pub struct XdsExtension {
	config: Arc<Snapshot<FilterConfig>>,
	inference_filters: Snapshot<Vec<InferenceFilterSpec>>,
}

impl XdsExtension {
	pub fn new(config: Arc<Snapshot<FilterConfig>>) -> Self {
		Self {
			config,
			inference_filters: Snapshot::new(Vec::new()),
		}
	}

	fn process_cluster(&self, config: &FilterConfig, mut cluster: Cluster, extra: &mut Vec<Cluster>, filters: &mut Vec<InferenceFilterSpec>) -> Cluster {
		let Some(cluster_ref) = parse_cluster_name(&cluster.name) else {
			return cluster;
		};
		let Some(route) = config.route(&cluster_ref.route, &cluster_ref.namespace) else {
			return cluster;
		};
		let Some(rule) = route.rules.get(cluster_ref.rule_index) else {
			return cluster;
		};

		if !annotate_endpoint_metadata(&mut cluster, rule, config) {
			return cluster;
		}

		if is_inference_pool_rule(rule) {
			let Some(pool) = read_inference_pool_ref(&cluster) else {
				tracing::warn!(cluster = %cluster.name, "inference pool rule missing per_route_rule_inference_pool metadata");
				return cluster;
			};
			match rewrite_inference_pool_cluster(&mut cluster, &pool) {
				Ok((companion, filter)) => {
					extra.push(companion);
					filters.push(filter);
				},
				Err(error) => tracing::warn!(%error, "failed to rewrite inference pool cluster"),
			}
			return cluster;
		}

		if let Err(error) = inject_upstream_ext_proc_filter(&mut cluster, &cluster_ref.route, &cluster_ref.namespace) {
			tracing::warn!(%error, "failed to inject upstream ext_proc filter");
		}
		cluster
	}
}

#[tonic::async_trait]
impl EnvoyGatewayExtension for XdsExtension {
	async fn post_translate_modify(
		&self,
		request: Request<PostTranslateModifyRequest>,
	) -> Result<Response<PostTranslateModifyResponse>, Status> {
		let req = request.into_inner();
		let config = self.config.load();

		let mut extra_clusters = Vec::new();
		let mut discovered_filters = Vec::new();
		let mut clusters: Vec<Cluster> = req
			.clusters
			.into_iter()
			.map(|c| self.process_cluster(&config, c, &mut extra_clusters, &mut discovered_filters))
			.collect();
		clusters.extend(extra_clusters);

		if !discovered_filters.is_empty() {
			self.inference_filters.store(discovered_filters);
		}

		Ok(Response::new(PostTranslateModifyResponse {
			clusters,
			secrets: req.secrets,
		}))
	}

	async fn post_hcm_modify(&self, request: Request<PostHCMModifyRequest>) -> Result<Response<PostHCMModifyResponse>, Status> {
		let mut req = request.into_inner();
		let filters = self.inference_filters.load();

		if let Some(listener) = &mut req.listener {
			for chain in &mut listener.filter_chains {
				for spec in filters.iter() {
					if chain.filters.iter().any(|f| f.name == spec.name) {
						continue;
					}
					chain.filters.push(Filter {
						name: spec.name.clone(),
						typed_config: Some(spec.typed_config.clone()),
					});
				}
			}
		}

		Ok(Response::new(PostHCMModifyResponse { listener: req.listener }))
	}
}

/// Minimal `grpc.health.v1.Health` responder: this gateway has no internal
/// degraded state to report yet, so every known service (including the
/// empty string, meaning "the whole server") reports `SERVING`.
pub struct HealthService;

#[tonic::async_trait]
impl Health for HealthService {
	async fn check(&self, _request: Request<HealthCheckRequest>) -> Result<Response<HealthCheckResponse>, Status> {
		Ok(Response::new(HealthCheckResponse {
			status: ServingStatus::Serving as i32,
		}))
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use aigw_config::{ApiSchema, Backend, BackendId, BackendRef, CredentialRef};
	use aigw_core::Strng;
	use aigw_protos::envoy::config::endpoint::v3::{ClusterLoadAssignment, Endpoint, LbEndpoint, LocalityLbEndpoints};
	use aigw_protos::envoy::config::listener::v3::{FilterChain, Listener};
	use indexmap::IndexMap;

	use super::*;

	fn backend(name: &str) -> (BackendId, Backend) {
		let id = BackendId {
			name: Strng::from(name),
			namespace: Strng::from("default"),
		};
		(
			id.clone(),
			Backend {
				id,
				schema: ApiSchema::OpenAI(None),
				credential_ref: CredentialRef(Strng::from("cred")),
				model_name_override: None,
				hostname_template: Strng::from("api.openai.com"),
				weight: 1,
				dynamic: None,
			},
		)
	}

	fn config_with_rule(rule: RouteRule) -> FilterConfig {
		let (id, b) = backend("openai");
		let mut backends = IndexMap::new();
		backends.insert(id.clone(), b);
		FilterConfig {
			generation: 1,
			routes: vec![aigw_config::AIGatewayRoute {
				name: Strng::from("chat"),
				namespace: Strng::from("ns1"),
				rules: vec![rule],
			}],
			backends,
			body_buffer_limit: 1024,
			service_name: Strng::from("ai-gateway"),
		}
	}

	fn cluster_with_one_endpoint(name: &str) -> Cluster {
		Cluster {
			name: name.to_string(),
			r#type: DiscoveryType::Static as i32,
			lb_policy: LbPolicy::RoundRobin as i32,
			load_assignment: Some(ClusterLoadAssignment {
				cluster_name: name.to_string(),
				endpoints: vec![LocalityLbEndpoints {
					lb_endpoints: vec![LbEndpoint {
						endpoint: Some(Endpoint {
							address: Some(Address {
								socket_address_host: "1.2.3.4".to_string(),
								socket_address_port: 443,
							}),
							hostname: String::new(),
						}),
						metadata: None,
						load_balancing_weight: 1,
					}],
				}],
			}),
			connect_timeout: None,
			metadata: None,
			typed_extension_protocol_options: None,
			use_http_header_for_original_dst: false,
			original_dst_header_name: String::new(),
			transport_socket: None,
		}
	}

	fn extension_for(config: FilterConfig) -> XdsExtension {
		XdsExtension::new(Arc::new(Snapshot::new(config)))
	}

	#[test]
	fn parses_well_formed_cluster_names() {
		let parsed = parse_cluster_name("httproute/ns1/chat/rule/2").unwrap();
		assert_eq!(parsed.namespace, "ns1");
		assert_eq!(parsed.route, "chat");
		assert_eq!(parsed.rule_index, 2);
	}

	#[test]
	fn unrelated_cluster_names_do_not_parse() {
		assert!(parse_cluster_name("envoy.clusters.endpointpicker_pool1_ns1_ext_proc").is_none());
	}

	#[tokio::test]
	async fn annotates_and_injects_ext_proc_filter_for_matching_cluster() {
		let rule = RouteRule {
			matchers: vec![],
			backends: vec![BackendRef {
				backend: BackendId {
					name: Strng::from("openai"),
					namespace: Strng::from("default"),
				},
				weight: 1,
				priority: 0,
			}],
		};
		let extension = extension_for(config_with_rule(rule));
		let req = Request::new(PostTranslateModifyRequest {
			clusters: vec![cluster_with_one_endpoint("httproute/ns1/chat/rule/0")],
			secrets: vec![],
		});
		let resp = extension.post_translate_modify(req).await.unwrap().into_inner();
		assert_eq!(resp.clusters.len(), 1);
		let cluster = &resp.clusters[0];
		let endpoint_metadata = cluster.load_assignment.as_ref().unwrap().endpoints[0].lb_endpoints[0]
			.metadata
			.as_ref()
			.unwrap();
		let backend_name = struct_field_as_string(&endpoint_metadata.filter_metadata[METADATA_NAMESPACE], "backend_name").unwrap();
		assert_eq!(backend_name, "openai.default");

		let filters = &cluster.typed_extension_protocol_options.as_ref().unwrap().http_filters;
		assert_eq!(filters[0].name, EXT_PROC_FILTER_NAME);
	}

	#[tokio::test]
	async fn endpoint_backend_count_mismatch_leaves_cluster_unmodified() {
		let rule = RouteRule {
			matchers: vec![],
			backends: vec![
				BackendRef {
					backend: BackendId { name: Strng::from("a"), namespace: Strng::from("default") },
					weight: 1,
					priority: 0,
				},
				BackendRef {
					backend: BackendId { name: Strng::from("b"), namespace: Strng::from("default") },
					weight: 1,
					priority: 0,
				},
			],
		};
		let extension = extension_for(config_with_rule(rule));
		let req = Request::new(PostTranslateModifyRequest {
			clusters: vec![cluster_with_one_endpoint("httproute/ns1/chat/rule/0")],
			secrets: vec![],
		});
		let resp = extension.post_translate_modify(req).await.unwrap().into_inner();
		assert!(resp.clusters[0].typed_extension_protocol_options.is_none());
	}

	#[tokio::test]
	async fn inference_pool_rule_rewrites_cluster_and_feeds_hcm_hook() {
		let rule = RouteRule {
			matchers: vec![Matcher::HeaderExact {
				name: Strng::from("x-ai-eg-model"),
				value: Strng::from("inferencepool-llama"),
			}],
			backends: vec![BackendRef {
				backend: BackendId { name: Strng::from("openai"), namespace: Strng::from("default") },
				weight: 1,
				priority: 0,
			}],
		};
		let extension = extension_for(config_with_rule(rule));
		let mut cluster = cluster_with_one_endpoint("httproute/ns1/chat/rule/0");
		cluster.metadata = Some(Metadata {
			filter_metadata: HashMap::from([(
				METADATA_NAMESPACE.to_string(),
				json_to_struct(serde_json::json!({
					"per_route_rule_inference_pool": "ns1/pool1/picker-svc/9002",
				}))
				.unwrap(),
			)]),
		});
		let req = Request::new(PostTranslateModifyRequest {
			clusters: vec![cluster],
			secrets: vec![],
		});
		let resp = extension.post_translate_modify(req).await.unwrap().into_inner();
		assert_eq!(resp.clusters.len(), 2);
		assert_eq!(resp.clusters[0].r#type, DiscoveryType::OriginalDst as i32);
		assert!(resp.clusters[0].use_http_header_for_original_dst);
		assert_eq!(resp.clusters[1].name, "envoy.clusters.endpointpicker_pool1_ns1_ext_proc");

		let hcm_req = Request::new(PostHCMModifyRequest {
			listener: Some(Listener {
				name: "listener1".to_string(),
				filter_chains: vec![FilterChain { filters: vec![] }],
			}),
		});
		let hcm_resp = extension.post_hcm_modify(hcm_req).await.unwrap().into_inner();
		let listener = hcm_resp.listener.unwrap();
		assert_eq!(listener.filter_chains[0].filters[0].name, "envoy.filters.http.endpointpicker_pool1_ns1_ext_proc");
	}

	#[tokio::test]
	async fn repeated_invocation_is_idempotent() {
		let rule = RouteRule {
			matchers: vec![],
			backends: vec![BackendRef {
				backend: BackendId { name: Strng::from("openai"), namespace: Strng::from("default") },
				weight: 1,
				priority: 0,
			}],
		};
		let extension = extension_for(config_with_rule(rule));
		let cluster = cluster_with_one_endpoint("httproute/ns1/chat/rule/0");
		let req1 = Request::new(PostTranslateModifyRequest {
			clusters: vec![cluster.clone()],
			secrets: vec![],
		});
		let req2 = Request::new(PostTranslateModifyRequest {
			clusters: vec![cluster],
			secrets: vec![],
		});
		let resp1 = extension.post_translate_modify(req1).await.unwrap().into_inner();
		let resp2 = extension.post_translate_modify(req2).await.unwrap().into_inner();
		assert_eq!(resp1.clusters[0].typed_extension_protocol_options, resp2.clusters[0].typed_extension_protocol_options);
	}

	#[tokio::test]
	async fn health_check_reports_serving() {
		let service = HealthService;
		let resp = service
			.check(Request::new(HealthCheckRequest { service: String::new() }))
			.await
			.unwrap()
			.into_inner();
		assert_eq!(resp.status, ServingStatus::Serving as i32);
	}
}
