use aigw_protos::envoy::service::ext_proc::v3::ImmediateResponse;
use bytes::Bytes;

/// The OpenAI error-envelope `type` field to use for a given HTTP status,
/// for the error paths (credential, load-balancer, translation) that don't
/// already carry their own OpenAI-shaped body.
fn error_type_for_status(status_code: u16) -> &'static str {
	match status_code {
		401 => "authentication_error",
		429 => "rate_limit_error",
		503 => "service_unavailable_error",
		_ => "invalid_request_error",
	}
}

/// Builds an `ImmediateResponse` carrying a freshly rendered OpenAI-shaped
/// error body, for failures that only have a `Display` message to work
/// with (credential, load-balancer, and translation errors).
pub fn openai_error_response(status_code: u16, message: &str) -> ImmediateResponse {
	let body = aigw_schema::error::openai_error_body(message, error_type_for_status(status_code), None);
	immediate_response(status_code, body)
}

/// Builds the Envoy `ImmediateResponse` that ends the HTTP exchange early:
/// used for every failure mode this gateway can diagnose before the
/// upstream is ever called (router/translator/credential errors).
pub fn immediate_response(status_code: u16, body: Bytes) -> ImmediateResponse {
	ImmediateResponse {
		status_code: u32::from(status_code),
		headers: Some(aigw_protos::envoy::service::ext_proc::v3::HeaderMutation {
			set_headers: vec![aigw_protos::envoy::config::core::v3::HeaderValueOption {
				header: Some(aigw_protos::envoy::config::core::v3::HeaderValue {
					key: "content-type".to_string(),
					value: "application/json".to_string(),
					raw_value_is_string: false,
				}),
				..Default::default()
			}],
			remove_headers: Vec::new(),
		}),
		body,
		details: String::new(),
	}
}
