//! Model client implementations for keel.
//!
//! All clients implement the `keel_core::ModelClient` trait. The router
//! builds the right one for a `provider:model` id.

pub mod openai_compat;
pub mod retry;
pub mod router;

pub use openai_compat::OpenAiCompatClient;
pub use retry::RetryPolicy;
pub use router::{build_client, default_base_url};
