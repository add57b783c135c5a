use std::collections::HashMap;
use std::sync::Arc;

use aigw_config::{Credential, CredentialRef};
use tokio::sync::{RwLock, mpsc};

use crate::error::CredentialError;

/// Holds the live [`Credential`] values behind each [`CredentialRef`].
/// Reads are the hot path (once per request) and use a shared read lock;
/// rotation is a rare write. Refresh itself is somebody else's job — this
/// cache only stores what it's given and tells that collaborator when a
/// value is stale.
pub struct CredentialCache {
	values: RwLock<HashMap<CredentialRef, Credential>>,
	refresh_tx: mpsc::UnboundedSender<CredentialRef>,
}

/// The receiving half a refresh collaborator drains. Kept separate from
/// [`CredentialCache`] so construction makes the channel's existence
/// explicit at the call site.
pub struct RefreshRequests(pub mpsc::UnboundedReceiver<CredentialRef>);

impl CredentialCache {
	pub fn new() -> (Arc<Self>, RefreshRequests) {
		let (tx, rx) = mpsc::unbounded_channel();
		(
			Arc::new(Self {
				values: RwLock::new(HashMap::new()),
				refresh_tx: tx,
			}),
			RefreshRequests(rx),
		)
	}

	pub async fn set(&self, reference: CredentialRef, credential: Credential) {
		self.values.write().await.insert(reference, credential);
	}

	/// Look up the current value for `reference`. If it needs a refresh but
	/// is still within its grace window, a refresh is enqueued and the
	/// stale value is returned anyway — the request path never blocks on
	/// rotation.
	pub async fn get(&self, reference: &CredentialRef) -> Result<Credential, CredentialError> {
		let now = std::time::SystemTime::now();
		let guard = self.values.read().await;
		let credential = guard
			.get(reference)
			.cloned()
			.ok_or_else(|| CredentialError::Missing(reference.clone()))?;
		drop(guard);

		if credential.is_hard_expired(now) {
			return Err(CredentialError::Expired(reference.clone()));
		}
		if credential.needs_refresh(now) {
			self.request_refresh(reference.clone());
		}
		Ok(credential)
	}

	/// One-shot: enqueue a refresh and return immediately. Never awaits the
	/// result.
	pub fn request_refresh(&self, reference: CredentialRef) {
		// An unbounded channel with a dropped receiver (refresh collaborator
		// shut down) is not this cache's problem to handle specially.
		let _ = self.refresh_tx.send(reference);
	}
}

#[cfg(test)]
mod tests {
	use std::time::{Duration, SystemTime};

	use super::*;

	#[tokio::test]
	async fn missing_credential_is_an_error() {
		let (cache, _rx) = CredentialCache::new();
		let err = cache
			.get(&CredentialRef(aigw_core::strng!("nope")))
			.await
			.unwrap_err();
		assert!(matches!(err, CredentialError::Missing(_)));
	}

	#[tokio::test]
	async fn stale_read_within_grace_window_still_returns_value() {
		let (cache, mut rx) = CredentialCache::new();
		let reference = CredentialRef(aigw_core::strng!("azure"));
		cache
			.set(
				reference.clone(),
				Credential::Azure {
					bearer: secrecy::SecretString::from("tok"),
					expires_at: SystemTime::now() - Duration::from_secs(1),
				},
			)
			.await;
		let got = cache.get(&reference).await.unwrap();
		assert!(matches!(got, Credential::Azure { .. }));
		assert_eq!(rx.0.try_recv().unwrap(), reference);
	}

	#[tokio::test]
	async fn hard_expired_credential_is_rejected() {
		let (cache, _rx) = CredentialCache::new();
		let reference = CredentialRef(aigw_core::strng!("gcp"));
		cache
			.set(
				reference.clone(),
				Credential::Gcp {
					bearer: secrecy::SecretString::from("tok"),
					project_id: aigw_core::strng!("proj"),
					expires_at: SystemTime::now()
						- (aigw_config::CREDENTIAL_GRACE_WINDOW + Duration::from_secs(1)),
				},
			)
			.await;
		let err = cache.get(&reference).await.unwrap_err();
		assert!(matches!(err, CredentialError::Expired(_)));
	}
}
