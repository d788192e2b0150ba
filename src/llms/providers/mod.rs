//! Model provider implementations.
//!
//! Every agent talks to an OpenAI-compatible chat completions endpoint;
//! routing to a vendor happens through the model id (`vendor/model`) on the
//! gateway side.

pub mod openai;
