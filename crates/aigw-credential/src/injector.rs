use std::time::SystemTime;

use aigw_config::{Credential, CredentialRef};
use aigw_schema::HeaderMutation;
use aws_credential_types::Credentials as AwsCredentials;
use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningSettings, sign};
use aws_sigv4::sign::v4;

use crate::error::CredentialError;

/// The pieces of an outgoing request a [`Credential`] needs to sign or
/// stamp with an auth header. Borrowed, never owned — injection happens
/// once per request on the hot path.
pub struct SigningRequest<'a> {
	pub method: &'a str,
	pub uri: &'a str,
	pub headers: &'a [(&'a str, &'a str)],
	pub body: &'a [u8],
}

/// Produce the header mutations that authenticate `request` using
/// `credential`. AWS SigV4 signs the request with its body already final
/// — it must run after any [`aigw_schema::Translator`] body rewrite, never
/// before.
pub fn inject(
	reference: &CredentialRef,
	credential: &Credential,
	now: SystemTime,
	request: &SigningRequest<'_>,
) -> Result<Vec<HeaderMutation>, CredentialError> {
	match credential {
		Credential::ApiKey(key) => {
			use secrecy::ExposeSecret;
			Ok(vec![HeaderMutation::Set(
				"authorization".to_string(),
				format!("Bearer {}", key.expose_secret()),
			)])
		},
		Credential::AwsSigV4 {
			access_key_id,
			secret_access_key,
			session_token,
			region,
		} => sign_aws_sigv4(
			reference,
			access_key_id,
			secret_access_key,
			session_token.as_ref(),
			region,
			now,
			request,
		),
		Credential::Azure { bearer, expires_at } => {
			bearer_header(reference, bearer, *expires_at, now, Vec::new())
		},
		Credential::Gcp {
			bearer,
			project_id,
			expires_at,
		} => bearer_header(
			reference,
			bearer,
			*expires_at,
			now,
			vec![HeaderMutation::Set(
				"x-goog-user-project".to_string(),
				project_id.to_string(),
			)],
		),
	}
}

fn bearer_header(
	reference: &CredentialRef,
	bearer: &secrecy::SecretString,
	expires_at: SystemTime,
	now: SystemTime,
	mut extra: Vec<HeaderMutation>,
) -> Result<Vec<HeaderMutation>, CredentialError> {
	use secrecy::ExposeSecret;
	if now > expires_at + aigw_config::CREDENTIAL_GRACE_WINDOW {
		return Err(CredentialError::Expired(reference.clone()));
	}
	extra.push(HeaderMutation::Set(
		"authorization".to_string(),
		format!("Bearer {}", bearer.expose_secret()),
	));
	Ok(extra)
}

fn sign_aws_sigv4(
	reference: &CredentialRef,
	access_key_id: &secrecy::SecretString,
	secret_access_key: &secrecy::SecretString,
	session_token: Option<&secrecy::SecretString>,
	region: &aigw_core::Strng,
	now: SystemTime,
	request: &SigningRequest<'_>,
) -> Result<Vec<HeaderMutation>, CredentialError> {
	use secrecy::ExposeSecret;
	let credentials = AwsCredentials::new(
		access_key_id.expose_secret(),
		secret_access_key.expose_secret(),
		session_token.map(|t| t.expose_secret().to_string()),
		None,
		"aigw-credential",
	);
	let identity = credentials.into();
	let mut settings = SigningSettings::default();
	settings.payload_checksum_kind = aws_sigv4::http_request::PayloadChecksumKind::XAmzSha256;
	let params = v4::SigningParams::builder()
		.identity(&identity)
		.region(region.as_str())
		.name("bedrock")
		.time(now)
		.settings(settings)
		.build()
		.map_err(|e| CredentialError::Unauthorized {
			reference: reference.clone(),
			source: anyhow::anyhow!(e),
		})?
		.into();

	let signable = SignableRequest::new(
		request.method,
		request.uri,
		request.headers.iter().copied(),
		SignableBody::Bytes(request.body),
	)
	.map_err(|e| CredentialError::Unauthorized {
		reference: reference.clone(),
		source: anyhow::anyhow!(e),
	})?;

	let (instructions, _signature) = sign(signable, &params)
		.map_err(|e| CredentialError::Unauthorized {
			reference: reference.clone(),
			source: anyhow::anyhow!(e),
		})?
		.into_parts();

	Ok(instructions
		.headers()
		.map(|(name, value)| HeaderMutation::Set(name.to_string(), value.to_string()))
		.collect())
}
