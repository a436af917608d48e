// Copyright 2025 Zhipu AI (Original Python implementation)
// Copyright 2025 ModerRAS (Rust implementation)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # vlm-phone-agent
//!
//! Drive an Android device over ADB from a vision-language model that answers
//! in the UI-TARS `Thought: ... / Action: ...` format.
//!
//! Each step captures a screenshot, sends it with the recent screenshots and
//! replies to an OpenAI-compatible chat-completion endpoint, parses the
//! action, maps its coordinates onto the device and performs it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vlm_phone_agent::{AdbDevice, AgentConfig, AgentRunner, ModelConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let model_config = ModelConfig::default().with_base_url("http://localhost:8000/v1");
//!     let agent_config = AgentConfig::default().with_max_steps(30);
//!     let device = Arc::new(AdbDevice::new("adb"));
//!
//!     let runner = AgentRunner::new(model_config, agent_config, device, None);
//!     runner.update_instruction("打开抖音极速版");
//!     let outcome = runner.run().await?;
//!
//!     println!("Run ended: {:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod adb;
pub mod agent;
pub mod config;
pub mod logging;
pub mod model;
pub mod settings;

pub use actions::{
    parse_action, parse_response, Action, ActionHandler, CoordinateSpace, DeviceAction,
    ParseError, Point, ScreenSize,
};
pub use adb::{AdbDevice, AdbError, Device, Screenshot};
pub use agent::{
    AgentConfig, AgentError, AgentRunner, RunOutcome, RunnerStatus, StepCallback, StepRecord,
};
pub use model::{ConversationHistory, MessageBuilder, ModelClient, ModelConfig, ModelError};
pub use settings::{AppSettings, SettingsError};
