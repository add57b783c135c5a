use serde::{Deserialize, Serialize};

/// The wire schema a request or response body is shaped as. Every
/// `(input, output)` pair the [`crate::RouteRule`]/[`crate::Backend`] graph
/// can produce must have a registered translator — see
/// `aigw_schema::SchemaRegistry`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "version", rename_all = "camelCase")]
pub enum ApiSchema {
	OpenAI(Option<arcstr::ArcStr>),
	AwsBedrock(Option<arcstr::ArcStr>),
	AzureOpenAI(Option<arcstr::ArcStr>),
	GcpVertex(Option<arcstr::ArcStr>),
	GcpAnthropic(Option<arcstr::ArcStr>),
	Anthropic(Option<arcstr::ArcStr>),
	Cohere(Option<arcstr::ArcStr>),
}

impl ApiSchema {
	/// The schema ignoring its version, used as the `SchemaRegistry` lookup
	/// key: translators are versioned by provider family, not by the
	/// specific API version string a `Backend` happens to request.
	pub fn family(&self) -> SchemaFamily {
		match self {
			ApiSchema::OpenAI(_) => SchemaFamily::OpenAI,
			ApiSchema::AwsBedrock(_) => SchemaFamily::AwsBedrock,
			ApiSchema::AzureOpenAI(_) => SchemaFamily::AzureOpenAI,
			ApiSchema::GcpVertex(_) => SchemaFamily::GcpVertex,
			ApiSchema::GcpAnthropic(_) => SchemaFamily::GcpAnthropic,
			ApiSchema::Anthropic(_) => SchemaFamily::Anthropic,
			ApiSchema::Cohere(_) => SchemaFamily::Cohere,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SchemaFamily {
	OpenAI,
	AwsBedrock,
	AzureOpenAI,
	GcpVertex,
	GcpAnthropic,
	Anthropic,
	Cohere,
}

impl std::fmt::Display for SchemaFamily {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			SchemaFamily::OpenAI => "openai",
			SchemaFamily::AwsBedrock => "aws-bedrock",
			SchemaFamily::AzureOpenAI => "azure-openai",
			SchemaFamily::GcpVertex => "gcp-vertex",
			SchemaFamily::GcpAnthropic => "gcp-anthropic",
			SchemaFamily::Anthropic => "anthropic",
			SchemaFamily::Cohere => "cohere",
		};
		f.write_str(s)
	}
}
