//! ADB command plumbing for a single target device.

use std::process::{Command, Output};
use thiserror::Error;

/// Default settle delay after an input event, in milliseconds.
pub const DEFAULT_ACTION_DELAY_MS: u64 = 1000;

/// ADB errors.
#[derive(Error, Debug)]
pub enum AdbError {
    #[error("Failed to spawn `{adb}`: {source}")]
    Spawn {
        adb: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("Screenshot failed: {0}")]
    Screenshot(String),
    #[error("App not found: {0}")]
    AppNotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A device reachable through the `adb` binary.
///
/// # Example
/// ```rust,no_run
/// use vlm_phone_agent::adb::{AdbDevice, Device};
///
/// let device = AdbDevice::new("adb").with_device_id("emulator-5554");
/// let shot = device.screenshot().unwrap();
/// println!("{}x{}", shot.width, shot.height);
/// ```
#[derive(Debug, Clone)]
pub struct AdbDevice {
    adb_path: String,
    device_id: Option<String>,
    action_delay_ms: u64,
}

impl Default for AdbDevice {
    fn default() -> Self {
        Self::new("adb")
    }
}

impl AdbDevice {
    /// Create a device handle using the given `adb` binary.
    pub fn new(adb_path: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
            device_id: None,
            action_delay_ms: DEFAULT_ACTION_DELAY_MS,
        }
    }

    /// Target a specific device serial (`adb -s <id>`).
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Set the delay applied after every input event.
    pub fn with_action_delay(mut self, delay_ms: u64) -> Self {
        self.action_delay_ms = delay_ms;
        self
    }

    pub fn adb_path(&self) -> &str {
        &self.adb_path
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub(crate) fn action_delay_ms(&self) -> u64 {
        self.action_delay_ms
    }

    /// Arguments placed before every ADB subcommand.
    pub(crate) fn prefix_args(&self) -> Vec<String> {
        match &self.device_id {
            Some(id) => vec!["-s".to_string(), id.clone()],
            None => Vec::new(),
        }
    }

    /// Run an ADB subcommand and return its raw output without checking the status.
    pub(crate) fn output(&self, args: &[&str]) -> Result<Output, AdbError> {
        tracing::debug!(adb = %self.adb_path, ?args, "adb");
        Command::new(&self.adb_path)
            .args(self.prefix_args())
            .args(args)
            .output()
            .map_err(|source| AdbError::Spawn {
                adb: self.adb_path.clone(),
                source,
            })
    }

    /// Run an ADB subcommand, failing on a non-zero exit status.
    pub(crate) fn run(&self, args: &[&str]) -> Result<Output, AdbError> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(AdbError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Run a `shell` command on the device.
    pub(crate) fn shell(&self, args: &[&str]) -> Result<Output, AdbError> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("shell");
        full.extend_from_slice(args);
        self.run(&full)
    }
}
