use aigw_config::SchemaFamily;

use crate::provider::azureopenai::AzureEndpointKind;
use crate::provider::{anthropic, azureopenai, bedrock, cohere, openai, vertex};
use crate::translator::Translator;

/// Endpoint-specific context a factory needs beyond the schema pair itself
/// — which operation is being translated, and any backend-specific
/// parameters (Azure's api-version, Vertex's project/location).
#[derive(Debug, Clone)]
pub struct TranslatorContext {
	pub operation: Operation,
	pub azure_api_version: Option<String>,
	pub gcp_project: Option<String>,
	pub gcp_location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
	ChatCompletions,
	Embeddings,
	Images,
	Rerank,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
	#[error("no translator registered for {input} -> {output} ({operation:?})")]
	Unregistered {
		input: SchemaFamily,
		output: SchemaFamily,
		operation: Operation,
	},
	#[error("backend missing required field for translator construction: {0}")]
	MissingContext(&'static str),
}

/// Maps `(inputSchema, outputSchema)` to a fresh [`Translator`] per request.
/// The set of registered pairs is closed and known at config load time, so
/// dispatch is a match rather than open-ended plugin discovery.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaRegistry;

impl SchemaRegistry {
	pub fn new() -> Self {
		Self
	}

	pub fn translator(
		&self,
		input: SchemaFamily,
		output: SchemaFamily,
		ctx: &TranslatorContext,
	) -> Result<Box<dyn Translator>, RegistryError> {
		use Operation::*;
		use SchemaFamily::*;

		match (input, output, ctx.operation) {
			(OpenAI, OpenAI, ChatCompletions) => Ok(Box::new(openai::OpenAiTranslator::chat_completions())),
			(OpenAI, OpenAI, Embeddings) => Ok(Box::new(openai::OpenAiTranslator::embeddings())),
			(OpenAI, OpenAI, Images) => Ok(Box::new(openai::OpenAiTranslator::images())),
			(OpenAI, AwsBedrock, ChatCompletions) => Ok(Box::new(bedrock::BedrockConverseTranslator::new())),
			(OpenAI, Anthropic, ChatCompletions) | (OpenAI, GcpAnthropic, ChatCompletions) => {
				Ok(Box::new(anthropic::AnthropicTranslator::new()))
			},
			(OpenAI, AzureOpenAI, ChatCompletions) => {
				let version = ctx
					.azure_api_version
					.clone()
					.ok_or(RegistryError::MissingContext("azure_api_version"))?;
				Ok(Box::new(azureopenai::AzureOpenAiTranslator::new(
					AzureEndpointKind::ChatCompletions,
					version,
				)))
			},
			(OpenAI, AzureOpenAI, Embeddings) => {
				let version = ctx
					.azure_api_version
					.clone()
					.ok_or(RegistryError::MissingContext("azure_api_version"))?;
				Ok(Box::new(azureopenai::AzureOpenAiTranslator::new(
					AzureEndpointKind::Embeddings,
					version,
				)))
			},
			(OpenAI, GcpVertex, ChatCompletions) => {
				let project = ctx
					.gcp_project
					.clone()
					.ok_or(RegistryError::MissingContext("gcp_project"))?;
				let location = ctx
					.gcp_location
					.clone()
					.ok_or(RegistryError::MissingContext("gcp_location"))?;
				Ok(Box::new(vertex::VertexTranslator::new(project, location)))
			},
			(OpenAI, Cohere, Rerank) | (Cohere, Cohere, Rerank) => {
				Ok(Box::new(cohere::CohereRerankTranslator::new()))
			},
			_ => Err(RegistryError::Unregistered {
				input,
				output,
				operation: ctx.operation,
			}),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ctx(operation: Operation) -> TranslatorContext {
		TranslatorContext {
			operation,
			azure_api_version: Some("2024-06-01".to_string()),
			gcp_project: Some("proj".to_string()),
			gcp_location: Some("us-central1".to_string()),
		}
	}

	#[test]
	fn resolves_known_pairs() {
		let registry = SchemaRegistry::new();
		assert!(registry
			.translator(SchemaFamily::OpenAI, SchemaFamily::OpenAI, &ctx(Operation::ChatCompletions))
			.is_ok());
		assert!(registry
			.translator(SchemaFamily::OpenAI, SchemaFamily::AwsBedrock, &ctx(Operation::ChatCompletions))
			.is_ok());
	}

	#[test]
	fn rejects_unregistered_pair() {
		let registry = SchemaRegistry::new();
		let err = registry
			.translator(SchemaFamily::Cohere, SchemaFamily::AwsBedrock, &ctx(Operation::ChatCompletions))
			.unwrap_err();
		assert!(matches!(err, RegistryError::Unregistered { .. }));
	}

	#[test]
	fn missing_azure_context_is_an_error() {
		let registry = SchemaRegistry::new();
		let mut bad_ctx = ctx(Operation::ChatCompletions);
		bad_ctx.azure_api_version = None;
		let err = registry
			.translator(SchemaFamily::OpenAI, SchemaFamily::AzureOpenAI, &bad_ctx)
			.unwrap_err();
		assert!(matches!(err, RegistryError::MissingContext("azure_api_version")));
	}
}
