//! Wire formats for supported backends

pub mod ollama;
pub mod openai;
