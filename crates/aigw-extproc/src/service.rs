use std::sync::Arc;
use std::time::SystemTime;

use aigw_config::{ApiSchema, Credential, FilterConfig};
use aigw_core::Snapshot;
use aigw_credential::{CredentialCache, SigningRequest};
use aigw_loadbalancer::DynamicLoadBalancer;
use aigw_protos::envoy::config::core::v3::HeaderMap as ProtoHeaderMap;
use aigw_protos::envoy::service::ext_proc::v3::common_response::ResponseStatus;
use aigw_protos::envoy::service::ext_proc::v3::external_processor_server::ExternalProcessor;
use aigw_protos::envoy::service::ext_proc::v3::processing_mode::{BodySendMode, HeaderSendMode};
use aigw_protos::envoy::service::ext_proc::v3::{
	BodyResponse, CommonResponse, HeadersResponse, HttpBody, HttpHeaders, ProcessingMode, ProcessingRequest,
	ProcessingResponse, TrailersResponse, processing_request, processing_response,
};
use aigw_router::Router;
use aigw_schema::registry::{Operation, TranslatorContext};
use aigw_schema::{SchemaFamily, SchemaRegistry};
use aigw_telemetry::{GatewayMetrics, GenAiOperation, Tracer};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::convert::{body_mutation, header_mutations_to_proto, proto_headers_to_http, raw_header};
use crate::error::{immediate_response, openai_error_response};
use crate::state::RequestState;

const ROUTE_NAME_HEADER: &str = "x-ai-eg-route-name";
const ROUTE_NAMESPACE_HEADER: &str = "x-ai-eg-route-namespace";
const DEFAULT_ROUTE_NAME: &str = "default";
const DEFAULT_ROUTE_NAMESPACE: &str = "default";

/// One answer to a `ProcessingRequest`: the response to send plus whether
/// the stream should be torn down afterward (an `ImmediateResponse` always
/// ends the exchange; Envoy closes the stream once it's delivered).
struct Step {
	response: ProcessingResponse,
	terminal: bool,
}

impl Step {
	fn terminal(immediate: aigw_protos::envoy::service::ext_proc::v3::ImmediateResponse) -> Self {
		Self {
			response: ProcessingResponse {
				response: Some(processing_response::Response::ImmediateResponse(immediate)),
				mode_override: None,
				dynamic_metadata: None,
			},
			terminal: true,
		}
	}

	fn request_headers(mode_override: Option<ProcessingMode>) -> Self {
		Self {
			response: ProcessingResponse {
				response: Some(processing_response::Response::RequestHeaders(HeadersResponse {
					response: Some(continue_response(None, None)),
				})),
				mode_override,
				dynamic_metadata: None,
			},
			terminal: false,
		}
	}

	fn request_body(
		header_mutation: Option<aigw_protos::envoy::service::ext_proc::v3::HeaderMutation>,
		body: Option<bytes::Bytes>,
		mode_override: Option<ProcessingMode>,
	) -> Self {
		Self {
			response: ProcessingResponse {
				response: Some(processing_response::Response::RequestBody(BodyResponse {
					response: Some(continue_response(header_mutation, body.map(body_mutation))),
				})),
				mode_override,
				dynamic_metadata: None,
			},
			terminal: false,
		}
	}

	fn response_headers(mutations: &[aigw_schema::HeaderMutation]) -> Self {
		Self {
			response: ProcessingResponse {
				response: Some(processing_response::Response::ResponseHeaders(HeadersResponse {
					response: Some(continue_response(Some(header_mutations_to_proto(mutations)), None)),
				})),
				mode_override: None,
				dynamic_metadata: None,
			},
			terminal: false,
		}
	}

	fn response_body(mutations: &[aigw_schema::HeaderMutation], body: Option<bytes::Bytes>) -> Self {
		let header_mutation = if mutations.is_empty() { None } else { Some(header_mutations_to_proto(mutations)) };
		Self {
			response: ProcessingResponse {
				response: Some(processing_response::Response::ResponseBody(BodyResponse {
					response: Some(continue_response(header_mutation, body.map(body_mutation))),
				})),
				mode_override: None,
				dynamic_metadata: None,
			},
			terminal: false,
		}
	}

	fn passthrough_trailers(on_request_side: bool) -> Self {
		let trailers = TrailersResponse { header_mutation: None };
		let response = if on_request_side {
			processing_response::Response::RequestTrailers(trailers)
		} else {
			processing_response::Response::ResponseTrailers(trailers)
		};
		Self {
			response: ProcessingResponse {
				response: Some(response),
				mode_override: None,
				dynamic_metadata: None,
			},
			terminal: false,
		}
	}
}

fn continue_response(
	header_mutation: Option<aigw_protos::envoy::service::ext_proc::v3::HeaderMutation>,
	body_mutation: Option<aigw_protos::envoy::service::ext_proc::v3::BodyMutation>,
) -> CommonResponse {
	CommonResponse {
		status: ResponseStatus::Continue as i32,
		header_mutation,
		body_mutation,
	}
}

fn initial_mode_override() -> ProcessingMode {
	ProcessingMode {
		request_header_mode: HeaderSendMode::Default as i32,
		response_header_mode: HeaderSendMode::Send as i32,
		request_body_mode: BodySendMode::Buffered as i32,
		response_body_mode: BodySendMode::Streamed as i32,
		request_trailer_mode: HeaderSendMode::Skip as i32,
		response_trailer_mode: HeaderSendMode::Skip as i32,
	}
}

/// Translates a translator's requested response-body mode override, if any,
/// into the `ProcessingMode` delta Envoy expects alongside the `RequestBody`
/// response. `None` leaves the mode set by [`initial_mode_override`] alone.
fn response_mode_override(mode: aigw_schema::ModeOverride) -> ProcessingMode {
	let mut mode_override = initial_mode_override();
	mode_override.response_body_mode = match mode {
		aigw_schema::ModeOverride::Buffered => BodySendMode::Buffered as i32,
		aigw_schema::ModeOverride::Streamed => BodySendMode::Streamed as i32,
	};
	mode_override
}

/// The operation family a request path implies. Incoming requests are
/// always OpenAI-shaped, so the path alone (not the upstream schema) picks
/// the operation.
fn operation_from_path(path: &str) -> (Operation, GenAiOperation) {
	if path.ends_with("/embeddings") {
		(Operation::Embeddings, GenAiOperation::Embeddings)
	} else if path.ends_with("/rerank") {
		(Operation::Rerank, GenAiOperation::Rerank)
	} else if path.contains("/images/generations") {
		(Operation::Images, GenAiOperation::ImageGeneration)
	} else {
		(Operation::ChatCompletions, GenAiOperation::ChatCompletion)
	}
}

/// Wires together every collaborator the `ExternalProcessor` stream handler
/// needs. Cheap to clone: every field is an `Arc` (or, for `Router` and
/// `SchemaRegistry`, a zero-sized value), so `process` clones one per
/// inbound stream to move into its spawned task.
#[derive(Clone)]
pub struct Gateway {
	config: Arc<Snapshot<FilterConfig>>,
	router: Router,
	schema_registry: SchemaRegistry,
	credentials: Arc<CredentialCache>,
	loadbalancer: Arc<DynamicLoadBalancer>,
	tracer: Arc<Tracer>,
	metrics: Arc<GatewayMetrics>,
}

impl Gateway {
	pub fn new(
		config: Arc<Snapshot<FilterConfig>>,
		credentials: Arc<CredentialCache>,
		loadbalancer: Arc<DynamicLoadBalancer>,
		tracer: Arc<Tracer>,
		metrics: Arc<GatewayMetrics>,
	) -> Self {
		Self {
			config,
			router: Router::new(),
			schema_registry: SchemaRegistry::new(),
			credentials,
			loadbalancer,
			tracer,
			metrics,
		}
	}

	fn handle_request_headers(&self, state: &mut RequestState, msg: HttpHeaders) -> Step {
		let proto_headers = msg.headers.unwrap_or_default();
		state.path = raw_header(&proto_headers, ":path").unwrap_or("/").to_string();
		state.headers = proto_headers_to_http(&proto_headers);
		Step::request_headers(Some(initial_mode_override()))
	}

	async fn handle_request_body(&self, state: &mut RequestState, msg: HttpBody) -> Step {
		if state.would_overflow(&msg.body) {
			return Step::terminal(openai_error_response(413, "request body exceeds the configured buffer limit"));
		}
		state.body_buf.extend_from_slice(&msg.body);
		if !msg.end_of_stream {
			return Step::request_body(None, None, None);
		}

		let body_bytes = state.body_buf.split().freeze();
		let parsed: serde_json::Value = match serde_json::from_slice(&body_bytes) {
			Ok(v) => v,
			Err(_) => return Step::terminal(openai_error_response(400, "request body is not valid JSON")),
		};
		let model = parsed.get("model").and_then(|v| v.as_str()).map(str::to_string);
		state.request_model = model.clone();
		state.streaming = parsed.get("stream").and_then(|v| v.as_bool()).unwrap_or(false);

		let config = self.config.load();
		let route_name = state
			.headers
			.get(ROUTE_NAME_HEADER)
			.and_then(|v| v.to_str().ok())
			.unwrap_or(DEFAULT_ROUTE_NAME);
		let route_namespace = state
			.headers
			.get(ROUTE_NAMESPACE_HEADER)
			.and_then(|v| v.to_str().ok())
			.unwrap_or(DEFAULT_ROUTE_NAMESPACE);

		let resolution = match self
			.router
			.resolve(&config, route_name, route_namespace, &state.headers, model.as_deref())
		{
			Ok(r) => r,
			Err(err) => return Step::terminal(immediate_response(err.status_code(), err.openai_body())),
		};

		let credential = match self.credentials.get(&resolution.credential_ref).await {
			Ok(c) => c,
			Err(err) => return Step::terminal(openai_error_response(err.status_code(), &err.to_string())),
		};

		let (operation, genai_operation) = operation_from_path(&state.path);
		let azure_api_version = match &resolution.backend.schema {
			ApiSchema::AzureOpenAI(v) => Some(v.as_ref().map(ToString::to_string).unwrap_or_else(|| "2024-06-01".to_string())),
			_ => None,
		};
		let (gcp_project, gcp_location) = match (&resolution.backend.schema, &credential) {
			(ApiSchema::GcpVertex(location), Credential::Gcp { project_id, .. }) => (
				Some(project_id.to_string()),
				Some(location.as_ref().map(ToString::to_string).unwrap_or_else(|| "us-central1".to_string())),
			),
			_ => (None, None),
		};
		let ctx = TranslatorContext {
			operation,
			azure_api_version,
			gcp_project,
			gcp_location,
		};

		let mut translator = match self.schema_registry.translator(SchemaFamily::OpenAI, resolution.upstream_schema, &ctx) {
			Ok(t) => t,
			Err(err) => return Step::terminal(openai_error_response(400, &err.to_string())),
		};

		let translation = match translator.request_body(&body_bytes, resolution.model_name_override.as_deref()) {
			Ok(t) => t,
			Err(err) => return Step::terminal(openai_error_response(err.status_code(), &err.to_string())),
		};

		let mut header_mutations = translation.headers;

		if resolution.backend.dynamic.is_some() {
			match self.loadbalancer.index_of(&resolution.backend.id) {
				Some(index) => match self.loadbalancer.select(index, model.as_deref()) {
					Ok(selected) => header_mutations.extend(selected.header_mutations()),
					Err(err) => return Step::terminal(openai_error_response(err.status_code(), &err.to_string())),
				},
				None => {
					tracing::warn!(backend = %resolution.backend.id, "dynamic backend missing from load balancer table");
				},
			}
		}

		let signing_body = translation.body.as_deref().unwrap_or_else(|| body_bytes.as_ref());
		let signing = SigningRequest {
			method: "POST",
			uri: state.path.as_str(),
			headers: &[],
			body: signing_body,
		};
		match aigw_credential::inject(&resolution.credential_ref, &credential, SystemTime::now(), &signing) {
			Ok(mutations) => header_mutations.extend(mutations),
			Err(err) => return Step::terminal(openai_error_response(err.status_code(), &err.to_string())),
		}

		let system = resolution.upstream_schema.to_string();
		let span = self
			.tracer
			.start(genai_operation, &system, model.as_deref().unwrap_or("unknown"));

		state.operation = Some(genai_operation);
		state.credential_ref = Some(resolution.credential_ref.clone());
		state.span = Some(span);
		state.translator = Some(translator);

		let header_mutation = if header_mutations.is_empty() {
			None
		} else {
			Some(header_mutations_to_proto(&header_mutations))
		};
		let mode_override = translation.mode_override.map(response_mode_override);
		Step::request_body(header_mutation, translation.body, mode_override)
	}

	fn handle_response_headers(&self, state: &mut RequestState, msg: HttpHeaders) -> Step {
		let headers = msg.headers.map(|h| proto_headers_to_http(&h)).unwrap_or_default();
		let mutations = match &mut state.translator {
			Some(translator) => translator.response_headers(&headers),
			None => Vec::new(),
		};
		Step::response_headers(&mutations)
	}

	async fn handle_response_body(&self, state: &mut RequestState, msg: HttpBody) -> Step {
		let Some(translator) = &mut state.translator else {
			return Step::response_body(&[], None);
		};

		let translated = match translator.response_body(&msg.body, msg.end_of_stream).await {
			Ok(t) => t,
			Err(error) => {
				tracing::warn!(%error, "response translation failed mid-stream, passing remaining chunks through unmodified");
				state.translator = None;
				if let Some(span) = state.span.take() {
					span.end_error(error.to_string());
				}
				return Step::response_body(&[], None);
			},
		};

		if let Some(operation) = state.operation {
			if let Some(usage) = &translated.usage {
				if !state.usage_recorded {
					self.metrics.record_usage(operation, usage);
					state.record_usage(usage);
				}
			}
			if translated.body.is_some() {
				let is_first_emitted_chunk = state.first_chunk_at.is_none();
				let latency = state.observe_response_chunk();
				if is_first_emitted_chunk {
					self.metrics.record_first_token_latency(operation, latency);
				} else {
					self.metrics.record_inter_token_latency(operation, latency);
				}
			}
		}

		if msg.end_of_stream {
			if let (Some(operation), false) = (state.operation, state.usage_recorded) {
				self.metrics.record_usage_missing(operation);
			}
			if let Some(span) = state.span.take() {
				span.end_ok();
			}
		}

		Step::response_body(&translated.headers, translated.body)
	}
}

#[tonic::async_trait]
impl ExternalProcessor for Gateway {
	type ProcessStream = ReceiverStream<Result<ProcessingResponse, Status>>;

	async fn process(&self, request: Request<Streaming<ProcessingRequest>>) -> Result<Response<Self::ProcessStream>, Status> {
		let mut inbound = request.into_inner();
		let (tx, rx) = mpsc::channel(32);
		let gateway = self.clone();

		tokio::spawn(async move {
			let body_buffer_limit = gateway.config.load().body_buffer_limit;
			let mut state = RequestState::new(body_buffer_limit);

			loop {
				let message = match inbound.message().await {
					Ok(Some(m)) => m,
					Ok(None) => break,
					Err(status) => {
						tracing::warn!(%status, "ext_proc stream read failed");
						break;
					},
				};

				let Some(request) = message.request else { continue };
				let step = match request {
					processing_request::Request::RequestHeaders(h) => gateway.handle_request_headers(&mut state, h),
					processing_request::Request::RequestBody(b) => gateway.handle_request_body(&mut state, b).await,
					processing_request::Request::RequestTrailers(_) => Step::passthrough_trailers(true),
					processing_request::Request::ResponseHeaders(h) => gateway.handle_response_headers(&mut state, h),
					processing_request::Request::ResponseBody(b) => gateway.handle_response_body(&mut state, b).await,
					processing_request::Request::ResponseTrailers(_) => Step::passthrough_trailers(false),
				};

				let terminal = step.terminal;
				if tx.send(Ok(step.response)).await.is_err() {
					break;
				}
				if terminal {
					break;
				}
			}

			if let Some(span) = state.span.take() {
				span.end_cancelled();
			}
		});

		Ok(Response::new(ReceiverStream::new(rx)))
	}
}

#[cfg(test)]
mod tests {
	use aigw_config::{Backend, BackendId, CredentialRef};
	use aigw_core::Strng;
	use aigw_protos::envoy::config::core::v3::HeaderValue as ProtoHeaderValue;
	use indexmap::IndexMap;
	use opentelemetry_sdk::trace::SdkTracerProvider;

	use super::*;

	fn headers_message(entries: &[(&str, &str)]) -> HttpHeaders {
		HttpHeaders {
			headers: Some(ProtoHeaderMap {
				headers: entries
					.iter()
					.map(|(k, v)| ProtoHeaderValue {
						key: k.to_string(),
						value: v.to_string(),
						raw_value_is_string: false,
					})
					.collect(),
			}),
			end_of_stream: false,
		}
	}

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

	fn config() -> FilterConfig {
		let (id, b) = backend("openai");
		let mut backends = IndexMap::new();
		backends.insert(id.clone(), b);
		FilterConfig {
			generation: 1,
			routes: vec![aigw_config::AIGatewayRoute {
				name: Strng::from(DEFAULT_ROUTE_NAME),
				namespace: Strng::from(DEFAULT_ROUTE_NAMESPACE),
				rules: vec![aigw_config::RouteRule {
					matchers: vec![],
					backends: vec![aigw_config::BackendRef {
						backend: id,
						weight: 1,
						priority: 0,
					}],
				}],
			}],
			backends,
			body_buffer_limit: 1024 * 1024,
			service_name: Strng::from("ai-gateway"),
		}
	}

	async fn test_gateway() -> Gateway {
		let (cache, _rx) = CredentialCache::new();
		cache
			.set(
				CredentialRef(Strng::from("cred")),
				Credential::ApiKey(secrecy::SecretString::from("sk-test")),
			)
			.await;
		let lb = DynamicLoadBalancer::from_dns_server("127.0.0.1:53".parse().unwrap(), vec![]).await;
		let tracer = Tracer::new(SdkTracerProvider::builder().build(), "ai-gateway-test");
		let mut registry = prometheus_client::registry::Registry::default();
		let metrics = GatewayMetrics::new(&mut registry);
		Gateway::new(
			Arc::new(Snapshot::new(config())),
			cache,
			Arc::new(lb),
			Arc::new(tracer),
			Arc::new(metrics),
		)
	}

	#[tokio::test]
	async fn request_headers_extracts_path_and_sets_mode_override() {
		let gateway = test_gateway().await;
		let mut state = RequestState::new(1024);
		let step = gateway.handle_request_headers(&mut state, headers_message(&[(":path", "/v1/chat/completions")]));
		assert_eq!(state.path, "/v1/chat/completions");
		assert!(step.response.mode_override.is_some());
		assert!(!step.terminal);
	}

	#[tokio::test]
	async fn full_request_body_resolves_backend_and_opens_a_span() {
		let gateway = test_gateway().await;
		let mut state = RequestState::new(1024 * 1024);
		gateway.handle_request_headers(&mut state, headers_message(&[(":path", "/v1/chat/completions")]));

		let body = bytes::Bytes::from(
			serde_json::to_vec(&serde_json::json!({
				"model": "gpt-4o",
				"messages": [{"role": "user", "content": "hi"}],
			}))
			.unwrap(),
		);
		let step = gateway
			.handle_request_body(
				&mut state,
				HttpBody {
					body,
					end_of_stream: true,
				},
			)
			.await;

		assert!(!step.terminal);
		assert!(state.span.is_some());
		assert!(state.translator.is_some());
		assert_eq!(state.request_model.as_deref(), Some("gpt-4o"));
	}

	#[tokio::test]
	async fn unknown_route_ends_the_exchange_with_an_immediate_response() {
		let gateway = test_gateway().await;
		let mut state = RequestState::new(1024);
		state
			.headers
			.insert(ROUTE_NAME_HEADER, http::HeaderValue::from_static("missing-route"));
		let body = bytes::Bytes::from(serde_json::to_vec(&serde_json::json!({"model": "gpt-4o"})).unwrap());
		let step = gateway
			.handle_request_body(
				&mut state,
				HttpBody {
					body,
					end_of_stream: true,
				},
			)
			.await;
		assert!(step.terminal);
		assert_matches::assert_matches!(
			step.response.response,
			Some(processing_response::Response::ImmediateResponse(r)) if r.status_code == 404
		);
	}

	#[tokio::test]
	async fn oversized_body_is_rejected_before_buffering() {
		let gateway = test_gateway().await;
		let mut state = RequestState::new(4);
		let step = gateway
			.handle_request_body(
				&mut state,
				HttpBody {
					body: bytes::Bytes::from_static(b"way too much"),
					end_of_stream: false,
				},
			)
			.await;
		assert!(step.terminal);
		assert_matches::assert_matches!(
			step.response.response,
			Some(processing_response::Response::ImmediateResponse(r)) if r.status_code == 413
		);
	}

	#[test]
	fn path_maps_to_embeddings_operation() {
		let (op, genai) = operation_from_path("/v1/embeddings");
		assert_eq!(op, Operation::Embeddings);
		assert_eq!(genai, GenAiOperation::Embeddings);
	}

	#[test]
	fn unmatched_path_defaults_to_chat_completions() {
		let (op, genai) = operation_from_path("/v1/chat/completions");
		assert_eq!(op, Operation::ChatCompletions);
		assert_eq!(genai, GenAiOperation::ChatCompletion);
	}
}
