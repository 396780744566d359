//! The objects passed between the agent, the LLM provider, and the toolkits.
//!
//! The internal message model is provider-neutral: `providers::utils` converts
//! it to and from the OpenAI wire format. Tool output is an untyped
//! `serde_json::Value`; mappings and lists are serialized to a string before
//! they enter the conversation history.

pub mod message;
pub mod role;
pub mod tool;
