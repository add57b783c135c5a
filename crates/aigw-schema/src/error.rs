use bytes::Bytes;
use serde_json::json;

/// The canonical OpenAI error envelope every translator and the router fall
/// back to when surfacing a non-2xx or malformed upstream response: the
/// payload is rewritten to this shape whenever the upstream's own error
/// body isn't already JSON in OpenAI's format.
pub fn openai_error_body(message: &str, error_type: &str, code: Option<&str>) -> Bytes {
	let body = json!({
		"error": {
			"message": message,
			"type": error_type,
			"param": serde_json::Value::Null,
			"code": code,
		}
	});
	Bytes::from(serde_json::to_vec(&body).expect("static shape always serializes"))
}

pub fn no_matching_route(model: Option<&str>) -> Bytes {
	let message = match model {
		Some(m) => format!(
			"No matching route found. model \"{m}\" is not configured in the Gateway."
		),
		None => "No matching route found. model specified is not configured in the Gateway.".to_string(),
	};
	openai_error_body(&message, "invalid_request_error", None)
}
