//! AI analysis of reported civic issues.
//!
//! This module provides:
//! - [`GeminiClient`] for the Gemini `generateContent` API
//! - [`Analyzer`], which adds input validation and deterministic fallbacks
//! - [`AiResponse`], the structured result shared with the report flow

mod analyzer;
mod client;
mod prompt;
mod response;
pub mod retry;

pub use analyzer::{AnalysisRequest, AnalyzeError, Analyzer};
pub use client::{AiError, GeminiClient, GenerationConfig, InlineMedia, DEFAULT_MODEL, GEMINI_API_BASE_URL, GEMINI_API_KEY_ENV};
pub use prompt::{build_prompt, VERIFY_PROMPT};
pub use response::{extract_json, AiResponse};
pub use retry::RetryPolicy;
