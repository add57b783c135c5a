use aigw_protos::envoy::config::core::v3::{HeaderMap as ProtoHeaderMap, HeaderValue as ProtoHeaderValue, HeaderValueOption};
use aigw_protos::envoy::service::ext_proc::v3::{BodyMutation, HeaderMutation as ProtoHeaderMutation};
use aigw_schema::HeaderMutation;

/// `envoy.config.core.v3.HeaderMap` -> `http::HeaderMap`, skipping any
/// entry that isn't a well-formed header name/value (Envoy is trusted to
/// send valid ones, but a defensive gateway doesn't panic on the
/// assumption).
/// Looks up a header by name directly against the raw proto list, case
/// insensitively. Used for Envoy's HTTP/2 pseudo-headers (`:path`,
/// `:status`) which [`proto_headers_to_http`] necessarily drops, since
/// `:`-prefixed names aren't valid `http::HeaderName`s.
pub fn raw_header<'a>(headers: &'a ProtoHeaderMap, name: &str) -> Option<&'a str> {
	headers
		.headers
		.iter()
		.find(|h| h.key.eq_ignore_ascii_case(name))
		.map(|h| h.value.as_str())
}

pub fn proto_headers_to_http(headers: &ProtoHeaderMap) -> http::HeaderMap {
	let mut out = http::HeaderMap::new();
	for h in &headers.headers {
		let (Ok(name), Ok(value)) = (
			http::HeaderName::try_from(h.key.as_str()),
			http::HeaderValue::from_str(&h.value),
		) else {
			continue;
		};
		out.append(name, value);
	}
	out
}

pub fn header_mutations_to_proto(mutations: &[HeaderMutation]) -> ProtoHeaderMutation {
	let mut set_headers = Vec::new();
	let mut remove_headers = Vec::new();
	for m in mutations {
		match m {
			HeaderMutation::Set(name, value) => set_headers.push(HeaderValueOption {
				header: Some(ProtoHeaderValue {
					key: name.clone(),
					value: value.clone(),
					raw_value_is_string: false,
				}),
				..Default::default()
			}),
			HeaderMutation::Remove(name) => remove_headers.push(name.clone()),
		}
	}
	ProtoHeaderMutation {
		set_headers,
		remove_headers,
	}
}

pub fn body_mutation(body: bytes::Bytes) -> BodyMutation {
	BodyMutation {
		mutation: Some(aigw_protos::envoy::service::ext_proc::v3::body_mutation::Mutation::Body(body)),
	}
}
