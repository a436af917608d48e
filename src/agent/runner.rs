//! The screenshot → model → action loop and its background control surface.

use parking_lot::Mutex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::actions::{
    parse_action, parse_response, ActionHandler, CoordinateSpace, DeviceAction, ParseError,
    ScreenSize, DEFAULT_WAIT_SECS,
};
use crate::adb::{AdbError, Device, Screenshot};
use crate::config::build_prompt_messages;
use crate::logging::SessionLog;
use crate::model::{ConversationHistory, ModelClient, ModelConfig, ModelError, DEFAULT_HISTORY_N};

/// Default pause between iterations, in milliseconds.
pub const DEFAULT_STEP_INTERVAL_MS: u64 = 100;

/// Poll interval of `wait`.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long `stop` waits for the worker to exit.
pub const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Agent errors.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Device error: {0}")]
    Device(#[from] AdbError),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Could not parse action: {0}")]
    Parse(#[from] ParseError),
    #[error("No instruction set")]
    NoInstruction,
    #[error("Agent is already running")]
    AlreadyRunning,
    #[error("Agent has not been started")]
    NotStarted,
    #[error("Worker task failed: {0}")]
    Task(String),
    #[error("Previous run failed: {0}")]
    Failed(String),
}

/// Configuration for the automation loop.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Screenshots sent per request.
    pub history_n: usize,
    pub coordinate_space: CoordinateSpace,
    /// Language code ("cn" for Chinese, "en" for English).
    pub lang: String,
    /// None runs until finished or stopped.
    pub max_steps: Option<u32>,
    pub step_interval_ms: u64,
    /// Pause for the `wait()` action.
    pub wait_secs: f64,
    /// Where `screenshot.png` and `last_screenshot.png` are kept.
    pub screenshot_dir: Option<PathBuf>,
    /// Write a transcript file per run.
    pub session_log: bool,
    pub verbose: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            history_n: DEFAULT_HISTORY_N,
            coordinate_space: CoordinateSpace::default(),
            lang: "cn".to_string(),
            max_steps: None,
            step_interval_ms: DEFAULT_STEP_INTERVAL_MS,
            wait_secs: DEFAULT_WAIT_SECS,
            screenshot_dir: None,
            session_log: false,
            verbose: false,
        }
    }
}

impl AgentConfig {
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_history_n(mut self, history_n: usize) -> Self {
        self.history_n = history_n.max(1);
        self
    }

    pub fn with_coordinate_space(mut self, space: CoordinateSpace) -> Self {
        self.coordinate_space = space;
        self
    }

    pub fn with_step_interval(mut self, interval_ms: u64) -> Self {
        self.step_interval_ms = interval_ms;
        self
    }

    pub fn with_wait_secs(mut self, wait_secs: f64) -> Self {
        self.wait_secs = wait_secs;
        self
    }

    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = Some(dir.into());
        self
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum RunOutcome {
    Finished(Option<String>),
    Stopped,
    MaxStepsReached,
}

/// One iteration, as handed to the step callback.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub iteration: u32,
    pub thought: String,
    /// Action call as written by the model.
    pub action_text: String,
    pub action: DeviceAction,
    pub raw_response: String,
    pub screen: ScreenSize,
}

/// Callback invoked after each parsed step, before the action runs.
pub type StepCallback = Arc<dyn Fn(&StepRecord) + Send + Sync>;

/// Snapshot of the runner for status displays.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunnerStatus {
    pub running: bool,
    pub iteration: u32,
    pub instruction: String,
    /// Latest raw model reply.
    pub latest_log: String,
    pub latest_thought: String,
    pub latest_action: String,
    pub outcome: Option<RunOutcome>,
    pub last_error: Option<String>,
    pub screen: Option<ScreenSize>,
}

#[derive(Debug, Default)]
struct RunState {
    /// Run that owns this state. Bumped by every claim.
    generation: u64,
    iteration: u32,
    latest_log: String,
    latest_thought: String,
    latest_action: String,
    outcome: Option<RunOutcome>,
    last_error: Option<String>,
    screen: Option<ScreenSize>,
}

struct RunnerShared {
    model: ModelClient,
    config: AgentConfig,
    device: Arc<dyn Device>,
    handler: ActionHandler,
    callback: Option<StepCallback>,
    /// Generation of the run holding the loop, 0 when idle.
    active: AtomicU64,
    instruction: Mutex<String>,
    state: Mutex<RunState>,
}

impl RunnerShared {
    /// Whether run `generation` may keep driving the device.
    fn owns(&self, generation: u64) -> bool {
        self.active.load(Ordering::SeqCst) == generation
    }

    /// Apply `f` unless a later run has claimed the state. Returns whether it ran.
    fn update_state(&self, generation: u64, f: impl FnOnce(&mut RunState)) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        f(&mut state);
        true
    }
}

/// Drives a device from model replies until the task is finished or stopped.
pub struct AgentRunner {
    shared: Arc<RunnerShared>,
    task: Mutex<Option<JoinHandle<Result<RunOutcome, AgentError>>>>,
}

impl AgentRunner {
    pub fn new(
        model_config: ModelConfig,
        agent_config: AgentConfig,
        device: Arc<dyn Device>,
        callback: Option<StepCallback>,
    ) -> Self {
        let handler = ActionHandler::new(agent_config.wait_secs);
        Self {
            shared: Arc::new(RunnerShared {
                model: ModelClient::new(model_config),
                config: agent_config,
                device,
                handler,
                callback,
                active: AtomicU64::new(0),
                instruction: Mutex::new(String::new()),
                state: Mutex::new(RunState::default()),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.shared.config
    }

    /// Replace the instruction. A running loop uses it from its next iteration.
    pub fn update_instruction(&self, instruction: impl Into<String>) {
        let instruction = instruction.into();
        tracing::info!("Instruction updated: {}", instruction);
        *self.shared.instruction.lock() = instruction;
    }

    pub fn instruction(&self) -> String {
        self.shared.instruction.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst) != 0
    }

    pub fn status(&self) -> RunnerStatus {
        let state = self.shared.state.lock();
        RunnerStatus {
            running: self.is_running(),
            iteration: state.iteration,
            instruction: self.instruction(),
            latest_log: state.latest_log.clone(),
            latest_thought: state.latest_thought.clone(),
            latest_action: state.latest_action.clone(),
            outcome: state.outcome.clone(),
            last_error: state.last_error.clone(),
            screen: state.screen,
        }
    }

    /// Run the loop on the current task until it ends.
    pub async fn run(&self) -> Result<RunOutcome, AgentError> {
        let generation = self.claim()?;
        run_loop(self.shared.clone(), generation).await
    }

    /// Run the loop on a background task.
    pub fn start(&self) -> Result<(), AgentError> {
        let generation = self.claim()?;
        let handle = tokio::spawn(run_loop(self.shared.clone(), generation));
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Ask the loop to stop and give the worker a moment to exit.
    pub async fn stop(&self) {
        self.shared.active.store(0, Ordering::SeqCst);

        let Some(mut handle) = self.task.lock().take() else {
            return;
        };
        match timeout(STOP_JOIN_TIMEOUT, &mut handle).await {
            Ok(Ok(Ok(outcome))) => tracing::info!("Agent stopped: {:?}", outcome),
            Ok(Ok(Err(e))) => tracing::warn!("Agent ended with error: {}", e),
            Ok(Err(e)) => tracing::error!("Agent worker panicked: {}", e),
            Err(_) => {
                tracing::warn!("Agent did not stop within {:?}", STOP_JOIN_TIMEOUT);
                *self.task.lock() = Some(handle);
            }
        }
    }

    /// Wait for the background run to end.
    ///
    /// Polls the running flag before joining, so dropping this future early
    /// leaves the worker joinable. Once joined, later calls report the last
    /// outcome.
    pub async fn wait(&self) -> Result<RunOutcome, AgentError> {
        while self.is_running() {
            sleep(WAIT_POLL_INTERVAL).await;
        }

        let handle = self.task.lock().take();
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| AgentError::Task(e.to_string()))?,
            None => {
                let state = self.shared.state.lock();
                match (&state.outcome, &state.last_error) {
                    (Some(outcome), _) => Ok(outcome.clone()),
                    (None, Some(error)) => Err(AgentError::Failed(error.clone())),
                    (None, None) => Err(AgentError::NotStarted),
                }
            }
        }
    }

    /// Hand the loop to a new run and return its generation. Rejects an empty
    /// instruction, an active run, or a worker that outlived `stop`.
    fn claim(&self) -> Result<u64, AgentError> {
        if self.shared.instruction.lock().trim().is_empty() {
            return Err(AgentError::NoInstruction);
        }
        if self.task.lock().as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(AgentError::AlreadyRunning);
        }

        let mut state = self.shared.state.lock();
        let generation = state.generation + 1;
        self.shared
            .active
            .compare_exchange(0, generation, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| AgentError::AlreadyRunning)?;
        *state = RunState {
            generation,
            ..RunState::default()
        };
        Ok(generation)
    }
}

impl Drop for AgentRunner {
    fn drop(&mut self) {
        self.shared.active.store(0, Ordering::SeqCst);
    }
}

/// Session transcript whose file writes run on the blocking pool.
#[derive(Default)]
struct Transcript(Option<Arc<Mutex<SessionLog>>>);

impl Transcript {
    async fn open(enabled: bool) -> Self {
        if !enabled {
            return Self::default();
        }
        match tokio::task::spawn_blocking(SessionLog::create_default).await {
            Ok(Ok(log)) => Self(Some(Arc::new(Mutex::new(log)))),
            Ok(Err(e)) => {
                tracing::warn!("Session log disabled: {}", e);
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Session log disabled: {}", e);
                Self::default()
            }
        }
    }

    async fn write<F>(&self, f: F)
    where
        F: FnOnce(&mut SessionLog) + Send + 'static,
    {
        let Some(log) = self.0.clone() else {
            return;
        };
        if let Err(e) = tokio::task::spawn_blocking(move || f(&mut log.lock())).await {
            tracing::warn!("Session log write failed: {}", e);
        }
    }
}

async fn run_loop(shared: Arc<RunnerShared>, generation: u64) -> Result<RunOutcome, AgentError> {
    let transcript = Transcript::open(shared.config.session_log).await;
    let task = format!("Task: {}", shared.instruction.lock());
    transcript.write(move |log| log.info(task)).await;

    let result = steps(&shared, generation, &transcript).await;

    // Record the result before clearing the flag so `wait` can rely on it.
    shared.update_state(generation, |state| match &result {
        Ok(outcome) => state.outcome = Some(outcome.clone()),
        Err(e) => state.last_error = Some(e.to_string()),
    });
    // A later run may already hold the flag.
    let _ = shared
        .active
        .compare_exchange(generation, 0, Ordering::SeqCst, Ordering::SeqCst);

    match &result {
        Ok(outcome) => {
            tracing::info!("Agent ended: {:?}", outcome);
            let line = format!("{:?}", outcome);
            transcript.write(move |log| log.success(line)).await;
        }
        Err(e) => {
            tracing::error!("Agent loop failed: {}", e);
            let line = e.to_string();
            transcript.write(move |log| log.error(line)).await;
        }
    }
    result
}

async fn steps(
    shared: &RunnerShared,
    generation: u64,
    transcript: &Transcript,
) -> Result<RunOutcome, AgentError> {
    let config = &shared.config;
    let mut history = ConversationHistory::new(config.history_n);

    loop {
        if !shared.owns(generation) {
            return Ok(RunOutcome::Stopped);
        }

        let mut iteration = 0;
        shared.update_state(generation, |state| {
            state.iteration += 1;
            iteration = state.iteration;
        });

        let device = shared.device.clone();
        let screenshot = blocking(move || device.screenshot()).await?;
        if !shared.owns(generation) {
            return Ok(RunOutcome::Stopped);
        }
        if let Some(dir) = config.screenshot_dir.clone() {
            let frame = screenshot.clone();
            if let Err(e) = blocking(move || rotate_screenshot(&dir, &frame)).await {
                tracing::warn!("Failed to save screenshot: {}", e);
            }
        }
        let screen = ScreenSize::new(screenshot.width, screenshot.height);
        history.push_screenshot(screenshot.base64_data);

        let instruction = shared.instruction.lock().clone();
        let prompt = build_prompt_messages(&instruction, &config.lang, config.coordinate_space);
        let messages = history.build_messages(&prompt);

        let reply = shared.model.request(&messages).await?;
        history.push_response(reply.clone());

        let parsed = parse_response(&reply);
        let action = parse_action(&parsed.action)?;
        let device_action = DeviceAction::resolve(&action, config.coordinate_space, screen);

        let current = shared.update_state(generation, |state| {
            state.latest_log = reply.clone();
            state.latest_thought = parsed.thought.clone();
            state.latest_action = device_action.to_string();
            state.screen = Some(screen);
        });
        // Another run has taken over; this reply is not reported.
        if !current {
            return Ok(RunOutcome::Stopped);
        }

        tracing::info!("Thought: {}", parsed.thought);
        tracing::info!("Action: {} -> {}", parsed.action, device_action);
        let thought = parsed.thought.clone();
        let action_line = format!("{} -> {}", parsed.action, device_action);
        transcript
            .write(move |log| {
                log.thinking(thought);
                log.action(action_line);
            })
            .await;

        if let Some(callback) = &shared.callback {
            callback(&StepRecord {
                iteration,
                thought: parsed.thought,
                action_text: parsed.action,
                action: device_action.clone(),
                raw_response: reply,
                screen,
            });
        }

        // A stop requested during the model call discards its action.
        if !shared.owns(generation) {
            return Ok(RunOutcome::Stopped);
        }

        let handler = shared.handler.clone();
        let device = shared.device.clone();
        let result = blocking(move || handler.execute(device.as_ref(), &device_action)).await?;
        if result.should_finish {
            return Ok(RunOutcome::Finished(result.message));
        }

        if config.max_steps.is_some_and(|max| iteration >= max) {
            return Ok(RunOutcome::MaxStepsReached);
        }
        sleep(Duration::from_millis(config.step_interval_ms)).await;
    }
}

/// Run a device call off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, AgentError>
where
    F: FnOnce() -> Result<T, AdbError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AgentError::Task(e.to_string()))?
        .map_err(AgentError::from)
}

/// Keep the previous frame as `last_screenshot.png` and write the new one.
fn rotate_screenshot(dir: &Path, screenshot: &Screenshot) -> Result<(), AdbError> {
    fs::create_dir_all(dir)?;
    let current = dir.join("screenshot.png");
    if current.exists() {
        fs::rename(&current, dir.join("last_screenshot.png"))?;
    }
    screenshot.save(&current)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullDevice;

    impl Device for NullDevice {
        fn screenshot(&self) -> Result<Screenshot, AdbError> {
            Ok(Screenshot::fallback(false))
        }
        fn tap(&self, _: i32, _: i32) -> Result<(), AdbError> {
            Ok(())
        }
        fn double_tap(&self, _: i32, _: i32) -> Result<(), AdbError> {
            Ok(())
        }
        fn long_press(&self, _: i32, _: i32, _: u64) -> Result<(), AdbError> {
            Ok(())
        }
        fn swipe(&self, _: i32, _: i32, _: i32, _: i32, _: Option<u64>) -> Result<(), AdbError> {
            Ok(())
        }
        fn back(&self) -> Result<(), AdbError> {
            Ok(())
        }
        fn home(&self) -> Result<(), AdbError> {
            Ok(())
        }
        fn enter(&self) -> Result<(), AdbError> {
            Ok(())
        }
        fn type_text(&self, _: &str) -> Result<(), AdbError> {
            Ok(())
        }
        fn launch_app(&self, _: &str) -> Result<(), AdbError> {
            Ok(())
        }
    }

    fn runner() -> AgentRunner {
        AgentRunner::new(
            ModelConfig::default(),
            AgentConfig::default(),
            Arc::new(NullDevice),
            None,
        )
    }

    #[tokio::test]
    async fn test_start_requires_instruction() {
        let runner = runner();
        assert!(matches!(runner.start(), Err(AgentError::NoInstruction)));
        runner.update_instruction("   ");
        assert!(matches!(runner.run().await, Err(AgentError::NoInstruction)));
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn test_wait_before_start() {
        assert!(matches!(runner().wait().await, Err(AgentError::NotStarted)));
    }

    #[test]
    fn test_update_instruction_and_status() {
        let runner = runner();
        runner.update_instruction("打开设置");
        assert_eq!(runner.instruction(), "打开设置");

        let status = runner.status();
        assert!(!status.running);
        assert_eq!(status.iteration, 0);
        assert_eq!(status.instruction, "打开设置");
        assert!(status.outcome.is_none());
    }

    #[test]
    fn test_stale_run_leaves_state_alone() {
        let runner = runner();
        runner.update_instruction("打开设置");
        let first = runner.claim().unwrap();
        assert!(matches!(runner.claim(), Err(AgentError::AlreadyRunning)));

        runner.shared.active.store(0, Ordering::SeqCst);
        let second = runner.claim().unwrap();
        assert_ne!(first, second);
        assert!(!runner.shared.owns(first));
        assert!(!runner.shared.update_state(first, |state| state.iteration = 7));
        assert!(runner.shared.update_state(second, |state| state.iteration = 1));
        assert_eq!(runner.status().iteration, 1);
    }

    #[test]
    fn test_rotate_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let shot = Screenshot::fallback(false);

        rotate_screenshot(dir.path(), &shot).unwrap();
        assert!(dir.path().join("screenshot.png").exists());
        assert!(!dir.path().join("last_screenshot.png").exists());

        rotate_screenshot(dir.path(), &shot).unwrap();
        assert!(dir.path().join("last_screenshot.png").exists());
    }

    #[test]
    fn test_outcome_serializes() {
        let json = serde_json::to_value(RunOutcome::Finished(Some("ok".into()))).unwrap();
        assert_eq!(json["status"], "finished");
        assert_eq!(json["message"], "ok");
        let json = serde_json::to_value(RunOutcome::Stopped).unwrap();
        assert_eq!(json["status"], "stopped");
    }
}
