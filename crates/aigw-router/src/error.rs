use aigw_config::BackendId;
use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
	#[error("no route {namespace}/{name}")]
	UnknownRoute { name: String, namespace: String },
	#[error("no rule in {namespace}/{name} matched the request")]
	NoMatchingRule { name: String, namespace: String, model: Option<String> },
	#[error("route rule selected backend {0} which is not defined in the current config")]
	DanglingBackend(BackendId),
}

impl RouterError {
	pub fn status_code(&self) -> u16 {
		404
	}

	/// Renders the OpenAI-shaped error body the extproc response surfaces
	/// to the caller. `DanglingBackend` should never happen against a
	/// config that passed `FilterConfig::validate`, but if it does the
	/// caller still deserves a well-formed error rather than a panic.
	pub fn openai_body(&self) -> Bytes {
		let model = match self {
			RouterError::NoMatchingRule { model, .. } => model.as_deref(),
			_ => None,
		};
		aigw_schema::error::no_matching_route(model)
	}
}
