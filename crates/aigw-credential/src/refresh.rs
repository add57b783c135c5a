use std::sync::Arc;
use std::time::SystemTime;

use aigw_config::{Credential, CredentialRef};
use secrecy::SecretString;

use crate::cache::{CredentialCache, RefreshRequests};

/// Fetches a fresh bearer token for one non-static credential kind. Azure
/// and GCP both reduce to "call the provider's token endpoint, get back a
/// bearer + expiry"; the provider-specific client lives behind this trait
/// so the refresh loop stays provider-agnostic.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
	async fn fetch(&self) -> anyhow::Result<(SecretString, SystemTime)>;
}

pub struct AzureTokenSource {
	credential: Arc<dyn azure_core::credentials::TokenCredential>,
	scope: String,
}

impl AzureTokenSource {
	pub fn from_default_credential(scope: impl Into<String>) -> anyhow::Result<Self> {
		let credential = azure_identity::DefaultAzureCredentialBuilder::new().build()?;
		Ok(Self {
			credential,
			scope: scope.into(),
		})
	}
}

#[async_trait::async_trait]
impl TokenSource for AzureTokenSource {
	async fn fetch(&self) -> anyhow::Result<(SecretString, SystemTime)> {
		let token = self.credential.get_token(&[self.scope.as_str()], None).await?;
		Ok((
			SecretString::from(token.token.secret().to_string()),
			token.expires_on.into(),
		))
	}
}

pub struct GcpTokenSource {
	credentials: google_cloud_auth::credentials::Credentials,
}

impl GcpTokenSource {
	pub async fn from_application_default() -> anyhow::Result<Self> {
		let credentials = google_cloud_auth::credentials::Builder::default().build()?;
		Ok(Self { credentials })
	}
}

#[async_trait::async_trait]
impl TokenSource for GcpTokenSource {
	async fn fetch(&self) -> anyhow::Result<(SecretString, SystemTime)> {
		let token = self.credentials.token().await?;
		let expires_at = token
			.expires_at
			.map(Into::into)
			.unwrap_or_else(|| SystemTime::now() + aigw_config::CREDENTIAL_GRACE_WINDOW);
		Ok((SecretString::from(token.token), expires_at))
	}
}

/// Drains refresh requests off the cache's channel and re-fetches the
/// corresponding token. Runs for the lifetime of the process; errors are
/// logged and the stale credential is left in place for the next request
/// to retry.
pub async fn run_refresh_loop(
	cache: Arc<CredentialCache>,
	mut requests: RefreshRequests,
	sources: impl Fn(&CredentialRef) -> Option<Arc<dyn TokenSource>>,
) {
	while let Some(reference) = requests.0.recv().await {
		let Some(source) = sources(&reference) else {
			tracing::warn!(%reference, "refresh requested for credential with no token source");
			continue;
		};
		match source.fetch().await {
			Ok((bearer, expires_at)) => {
				let refreshed = build_refreshed(&cache, &reference, bearer, expires_at).await;
				if let Some(credential) = refreshed {
					cache.set(reference, credential).await;
				}
			},
			Err(error) => {
				tracing::warn!(%reference, %error, "credential refresh failed, keeping stale value");
			},
		}
	}
}

async fn build_refreshed(
	cache: &CredentialCache,
	reference: &CredentialRef,
	bearer: SecretString,
	expires_at: SystemTime,
) -> Option<Credential> {
	match cache.get(reference).await.ok()? {
		Credential::Azure { .. } => Some(Credential::Azure { bearer, expires_at }),
		Credential::Gcp { project_id, .. } => Some(Credential::Gcp {
			bearer,
			project_id,
			expires_at,
		}),
		other => Some(other),
	}
}
