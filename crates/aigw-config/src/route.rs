use aigw_core::Strng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::backend::BackendId;

/// The virtualization header used to select a model independent of the
/// upstream path.
pub const MODEL_HEADER: &str = "x-ai-eg-model";

/// A `Regex` that (de)serializes through its source pattern string, so
/// `Matcher::HeaderRegex` can round-trip through config files while keeping
/// the compiled automaton for the request hot path.
#[derive(Debug, Clone)]
pub struct CompiledRegex(pub std::sync::Arc<Regex>);

impl Serialize for CompiledRegex {
	fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(self.0.as_str())
	}
}

impl<'de> Deserialize<'de> for CompiledRegex {
	fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
		let s = String::deserialize(d)?;
		let re = Regex::new(&s).map_err(serde::de::Error::custom)?;
		Ok(CompiledRegex(std::sync::Arc::new(re)))
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Matcher {
	HeaderExact { name: Strng, value: Strng },
	HeaderPrefix { name: Strng, value: Strng },
	HeaderRegex { name: Strng, pattern: CompiledRegex },
}

impl Matcher {
	pub fn header_name(&self) -> &str {
		match self {
			Matcher::HeaderExact { name, .. }
			| Matcher::HeaderPrefix { name, .. }
			| Matcher::HeaderRegex { name, .. } => name.as_str(),
		}
	}

	pub fn matches(&self, value: &str) -> bool {
		match self {
			Matcher::HeaderExact { value: want, .. } => value == want.as_str(),
			Matcher::HeaderPrefix { value: want, .. } => value.starts_with(want.as_str()),
			Matcher::HeaderRegex { pattern, .. } => pattern.0.is_match(value),
		}
	}
}

/// A candidate backend within a [`RouteRule`], with its selection weight and
/// fallback priority. Lower `priority` values are tried first; within a
/// priority tier, backends are chosen by weighted random.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendRef {
	pub backend: BackendId,
	pub weight: u32,
	#[serde(default)]
	pub priority: u32,
}

/// One entry in an `AIGatewayRoute`: a set of matchers (all must match, i.e.
/// conjunctive) and the ordered/prioritized backends to use when they do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
	#[serde(default)]
	pub matchers: Vec<Matcher>,
	pub backends: Vec<BackendRef>,
}

impl RouteRule {
	/// Resolve `matchers` against request headers, falling back to
	/// `body.model` for the virtualization header when the header itself
	/// isn't present on the request.
	pub fn matches(&self, headers: &http::HeaderMap, body_model: Option<&str>) -> bool {
		self.matchers.iter().all(|m| {
			let name = m.header_name();
			let value = if name.eq_ignore_ascii_case(MODEL_HEADER) {
				headers
					.get(name)
					.and_then(|v| v.to_str().ok())
					.or(body_model)
			} else {
				headers.get(name).and_then(|v| v.to_str().ok())
			};
			value.is_some_and(|v| m.matches(v))
		})
	}
}

/// An ordered list of [`RouteRule`]s; first-match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIGatewayRoute {
	pub name: Strng,
	pub namespace: Strng,
	pub rules: Vec<RouteRule>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn headers(pairs: &[(&str, &str)]) -> http::HeaderMap {
		let mut h = http::HeaderMap::new();
		for (k, v) in pairs {
			h.insert(
				http::HeaderName::try_from(*k).unwrap(),
				http::HeaderValue::try_from(*v).unwrap(),
			);
		}
		h
	}

	#[test]
	fn model_header_falls_back_to_body() {
		let rule = RouteRule {
			matchers: vec![Matcher::HeaderExact {
				name: Strng::from(MODEL_HEADER),
				value: Strng::from("gpt-4o-mini"),
			}],
			backends: vec![],
		};
		assert!(rule.matches(&headers(&[]), Some("gpt-4o-mini")));
		assert!(!rule.matches(&headers(&[]), Some("other-model")));
	}

	#[test]
	fn header_wins_over_body_when_present() {
		let rule = RouteRule {
			matchers: vec![Matcher::HeaderExact {
				name: Strng::from(MODEL_HEADER),
				value: Strng::from("gpt-4o-mini"),
			}],
			backends: vec![],
		};
		assert!(rule.matches(
			&headers(&[(MODEL_HEADER, "gpt-4o-mini")]),
			Some("ignored-body-model")
		));
	}

	#[test]
	fn conjunctive_matchers_require_all() {
		let rule = RouteRule {
			matchers: vec![
				Matcher::HeaderExact {
					name: Strng::from("x-team"),
					value: Strng::from("payments"),
				},
				Matcher::HeaderPrefix {
					name: Strng::from(MODEL_HEADER),
					value: Strng::from("gpt-"),
				},
			],
			backends: vec![],
		};
		assert!(rule.matches(
			&headers(&[("x-team", "payments"), (MODEL_HEADER, "gpt-4o")]),
			None
		));
		assert!(!rule.matches(&headers(&[("x-team", "payments")]), Some("gpt-4o")));
	}
}
