//! The background side: turns transcripts into summaries.

pub mod gemini;
pub mod worker;

pub use gemini::{GeminiClient, build_prompt};
pub use worker::SummarizeWorker;
