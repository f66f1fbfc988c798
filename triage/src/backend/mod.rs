//! Oracle backend abstraction layer.
//!
//! Provides a trait-based interface over the text-completion services that
//! classify complaints:
//! - OpenAI-compatible (Groq, OpenAI, vLLM, Ollama)
//! - Mock backend for testing

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{MockBackend, MockReply};
pub use openai::OpenAiBackend;
pub use traits::{CompletionRequest, CompletionResponse, OracleBackend, OracleError, Usage};
