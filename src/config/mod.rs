//! Prompts, app table and console messages.

mod apps;
mod i18n;
mod prompts;

pub use apps::APP_PACKAGES;
pub use i18n::{get_messages, Messages};
pub use prompts::{build_mobile_prompt, build_prompt_messages, MOBILE_USE_PROMPT, SYSTEM_PROMPT};
