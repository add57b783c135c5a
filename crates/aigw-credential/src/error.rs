/// Credential-path error taxonomy. All three variants surface to the
/// client as HTTP 401; the distinction matters for logs and metrics, not
/// for the wire response.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
	#[error("no credential registered for {0}")]
	Missing(aigw_config::CredentialRef),
	#[error("credential for {0} is past its hard expiry deadline")]
	Expired(aigw_config::CredentialRef),
	#[error("failed to sign request with credential for {reference}: {source}")]
	Unauthorized {
		reference: aigw_config::CredentialRef,
		#[source]
		source: anyhow::Error,
	},
}

impl CredentialError {
	pub fn status_code(&self) -> u16 {
		401
	}
}
