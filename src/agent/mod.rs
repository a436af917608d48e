//! The automation loop.

mod runner;

pub use runner::{
    AgentConfig, AgentError, AgentRunner, RunOutcome, RunnerStatus, StepCallback, StepRecord,
    DEFAULT_STEP_INTERVAL_MS, STOP_JOIN_TIMEOUT,
};
