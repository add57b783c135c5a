use std::time::SystemTime;

use aigw_core::Strng;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// A handle naming a [`Credential`] without exposing its value. Backends and
/// routes carry a `CredentialRef`; the actual secret lives in the
/// credential cache, populated and rotated by an out-of-scope collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialRef(pub Strng);

impl std::fmt::Display for CredentialRef {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.0.fmt(f)
	}
}

/// The current value behind a [`CredentialRef`]. Opaque to everything except
/// `aigw-credential`'s injector strategies.
#[derive(Clone)]
pub enum Credential {
	ApiKey(SecretString),
	AwsSigV4 {
		access_key_id: SecretString,
		secret_access_key: SecretString,
		session_token: Option<SecretString>,
		region: Strng,
	},
	Azure {
		bearer: SecretString,
		expires_at: SystemTime,
	},
	Gcp {
		bearer: SecretString,
		project_id: Strng,
		expires_at: SystemTime,
	},
}

impl std::fmt::Debug for Credential {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Credential::ApiKey(_) => f.debug_tuple("ApiKey").field(&"<redacted>").finish(),
			Credential::AwsSigV4 { region, .. } => f
				.debug_struct("AwsSigV4")
				.field("region", region)
				.finish_non_exhaustive(),
			Credential::Azure { expires_at, .. } => f
				.debug_struct("Azure")
				.field("expires_at", expires_at)
				.finish_non_exhaustive(),
			Credential::Gcp {
				project_id,
				expires_at,
				..
			} => f
				.debug_struct("Gcp")
				.field("project_id", project_id)
				.field("expires_at", expires_at)
				.finish_non_exhaustive(),
		}
	}
}

/// Grace window within which an expired bearer credential is still used
/// while a refresh is requested in the background. The request path never
/// blocks waiting on rotation; a stale-but-not-hard-expired credential is
/// preferable to added latency.
pub const CREDENTIAL_GRACE_WINDOW: std::time::Duration = std::time::Duration::from_secs(30);

impl Credential {
	/// `true` once a bearer-style credential is past its hard deadline
	/// (expiry + grace window) and must no longer be used.
	pub fn is_hard_expired(&self, now: SystemTime) -> bool {
		match self {
			Credential::Azure { expires_at, .. } | Credential::Gcp { expires_at, .. } => {
				now > *expires_at + CREDENTIAL_GRACE_WINDOW
			},
			Credential::ApiKey(_) | Credential::AwsSigV4 { .. } => false,
		}
	}

	/// `true` once expired but still within the grace window — the caller
	/// should request a refresh but may proceed with the stale value.
	pub fn needs_refresh(&self, now: SystemTime) -> bool {
		match self {
			Credential::Azure { expires_at, .. } | Credential::Gcp { expires_at, .. } => {
				now >= *expires_at
			},
			Credential::ApiKey(_) | Credential::AwsSigV4 { .. } => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn grace_window_allows_stale_read() {
		let now = SystemTime::now();
		let cred = Credential::Azure {
			bearer: SecretString::from("tok"),
			expires_at: now - std::time::Duration::from_secs(5),
		};
		assert!(cred.needs_refresh(now));
		assert!(!cred.is_hard_expired(now));
	}

	#[test]
	fn hard_deadline_past_grace_window() {
		let now = SystemTime::now();
		let cred = Credential::Gcp {
			bearer: SecretString::from("tok"),
			project_id: Strng::from("proj"),
			expires_at: now - (CREDENTIAL_GRACE_WINDOW + std::time::Duration::from_secs(1)),
		};
		assert!(cred.is_hard_expired(now));
	}
}
