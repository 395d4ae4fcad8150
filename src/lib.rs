//! Sundai social media assistant.
//!
//! Drafts posts and replies from company documents with a language model,
//! sends them to a human reviewer over Telegram, and publishes approved
//! content to Mastodon. An HTTP API exposes the same lifecycle.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod approval;
pub mod chat;
pub mod config;
pub mod constants;
pub mod db;
pub mod docs;
pub mod generate;
pub mod llm;
pub mod service;
pub mod social;
pub mod web;
pub mod workflow;
