//! `serde` helpers for human-readable durations in config files (`"30s"`,
//! `"500ms"`), matching the `go-parse-duration`-style strings accepted by the
//! Envoy Gateway configuration surface this gateway is extending.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
	s.serialize_str(&durationfmt::to_string(*d))
}

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
	let s = String::deserialize(d)?;
	let nanos = go_parse_duration::parse_duration(&s)
		.map_err(|e| serde::de::Error::custom(format!("{e:?}")))?;
	Ok(Duration::from_nanos(nanos.unsigned_abs()))
}

pub mod option {
	use super::*;

	pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
		match d {
			Some(d) => super::serialize(d, s),
			None => s.serialize_none(),
		}
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
		let s: Option<String> = Option::deserialize(d)?;
		s.map(|s| {
			go_parse_duration::parse_duration(&s)
				.map(|n| Duration::from_nanos(n.unsigned_abs()))
				.map_err(|e| serde::de::Error::custom(format!("{e:?}")))
		})
		.transpose()
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	#[derive(serde::Serialize, serde::Deserialize)]
	struct Wrapper(#[serde(with = "super")] Duration);

	#[test]
	fn round_trips_seconds() {
		let w: Wrapper = serde_json::from_str("\"30s\"").unwrap();
		assert_eq!(w.0, Duration::from_secs(30));
	}
}
