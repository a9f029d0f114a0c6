//! Context window management.
//!
//! The conversation is measured with a cheap character heuristic
//! ([`token::estimate_tokens`]) against a per-provider budget
//! ([`window::token_budget`]); past the budget, older history is
//! summarized by the model ([`compress::compress_messages`]).

pub mod compress;
pub mod token;
pub mod window;

pub use compress::{KEEP_RECENT, compress_messages};
pub use token::estimate_tokens;
pub use window::{context_window, token_budget};
