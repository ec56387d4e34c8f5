//! # keychat
//!
//! Terminal chat client for the Gemini `generateContent` API that spreads a
//! session across several API keys, rotating to the next key when one runs
//! out of quota or is rejected.
//!
//! - [`keys`]: key file loading and the rotating key pool
//! - [`conversation`]: rolling user/model history
//! - [`llm`]: the Gemini request engine and model resolution
//! - [`retry`]: the per-message retry/rotation state machine
//! - [`session`]: ties the above together for one chat session
//! - [`cli`]: the interactive REPL

pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod keys;
pub mod llm;
pub mod retry;
pub mod session;
