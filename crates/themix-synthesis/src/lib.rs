//! themix-synthesis — Thematic grouping of aggregated enrichment results.
//!
//! One structured prompt, one model call, strict schema validation at the
//! response boundary. There is no automatic re-prompt on failure.

pub mod backend;
pub mod prompt;
pub mod schema;
pub mod synthesizer;

pub use backend::{LlmBackend, LlmError, LlmRequest, LlmResponse, Message, OpenAiBackend, OpenAiCompatibleBackend};
pub use synthesizer::ThemeSynthesizer;
