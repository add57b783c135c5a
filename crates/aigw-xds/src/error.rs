#[derive(Debug, thiserror::Error)]
pub enum XdsError {
	#[error("failed to encode filter metadata: {0}")]
	Metadata(#[source] serde_json::Error),
}
