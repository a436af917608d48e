//! Chat-completion client and conversation history.

mod client;
mod history;

pub use client::{
    MessageBuilder, ModelClient, ModelConfig, ModelError, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_DELAY_SECS, DEFAULT_TIMEOUT_SECS,
};
pub use history::{ConversationHistory, DEFAULT_HISTORY_N};
