// src/llm/mod.rs
pub mod gemini;
pub mod resolver;
