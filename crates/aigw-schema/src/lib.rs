//! Request/response translation between provider wire schemas. Everything
//! in this crate is pure — no I/O, no gRPC — so it can be driven directly
//! from `aigw-extproc`'s stream handler as well as unit-tested in
//! isolation.

pub mod error;
pub mod gzip;
mod provider;
pub mod registry;
pub mod sse;
pub mod translator;
pub mod types;

pub use registry::{Operation, RegistryError, SchemaRegistry, TranslatorContext};
pub use translator::{Translator, TranslatorState};
pub use types::{
	HeaderMutation, ModeOverride, RequestTranslation, ResponseBodyTranslation, TokenUsage,
	TranslationError,
};
