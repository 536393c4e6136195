//! Generation: providers, caching, validation and per-node records.
//!
//! Every call site that needs generated output goes through
//! [`GenerationProtocol::generate_validated`] with a prompt rendered by
//! [`PromptTemplates`] and a validator from [`validators`].

pub mod cache;
pub mod command;
pub mod prompt;
pub mod protocol;
pub mod provider;
pub mod records;
pub mod validators;

pub use cache::{CacheEntry, CacheLookup, GenerationCache};
pub use command::CommandProvider;
pub use prompt::{CallSite, Prompt, PromptFile, PromptTemplates};
pub use protocol::{GenerationProtocol, ValidatedGeneration};
pub use provider::{GenerationOutput, GenerationProvider, ModelDescriptor, extract_json_object};
pub use records::{GenerationRecord, GenerationRecords};
