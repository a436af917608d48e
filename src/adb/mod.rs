//! ADB (Android Debug Bridge) module for device interaction.

mod connection;
mod device;
pub mod input;
mod screenshot;

pub use connection::{AdbDevice, AdbError, DEFAULT_ACTION_DELAY_MS};
pub use device::{resolve_package, swipe_duration, DEFAULT_LONG_PRESS_MS};
pub use screenshot::{Screenshot, FALLBACK_HEIGHT, FALLBACK_WIDTH};

/// Operations the automation loop needs from a device.
///
/// Coordinates are device pixels.
pub trait Device: Send + Sync {
    fn screenshot(&self) -> Result<Screenshot, AdbError>;
    fn tap(&self, x: i32, y: i32) -> Result<(), AdbError>;
    fn double_tap(&self, x: i32, y: i32) -> Result<(), AdbError>;
    fn long_press(&self, x: i32, y: i32, duration_ms: u64) -> Result<(), AdbError>;
    fn swipe(
        &self,
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        duration_ms: Option<u64>,
    ) -> Result<(), AdbError>;
    fn back(&self) -> Result<(), AdbError>;
    fn home(&self) -> Result<(), AdbError>;
    fn enter(&self) -> Result<(), AdbError>;
    /// Replace the focused field's content with `text`.
    fn type_text(&self, text: &str) -> Result<(), AdbError>;
    fn launch_app(&self, app_name: &str) -> Result<(), AdbError>;
}

impl Device for AdbDevice {
    fn screenshot(&self) -> Result<Screenshot, AdbError> {
        self.capture_screenshot()
    }

    fn tap(&self, x: i32, y: i32) -> Result<(), AdbError> {
        AdbDevice::tap(self, x, y)
    }

    fn double_tap(&self, x: i32, y: i32) -> Result<(), AdbError> {
        AdbDevice::double_tap(self, x, y)
    }

    fn long_press(&self, x: i32, y: i32, duration_ms: u64) -> Result<(), AdbError> {
        AdbDevice::long_press(self, x, y, duration_ms)
    }

    fn swipe(
        &self,
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        duration_ms: Option<u64>,
    ) -> Result<(), AdbError> {
        AdbDevice::swipe(self, start_x, start_y, end_x, end_y, duration_ms)
    }

    fn back(&self) -> Result<(), AdbError> {
        AdbDevice::back(self)
    }

    fn home(&self) -> Result<(), AdbError> {
        AdbDevice::home(self)
    }

    fn enter(&self) -> Result<(), AdbError> {
        AdbDevice::enter(self)
    }

    fn type_text(&self, text: &str) -> Result<(), AdbError> {
        self.input_text(text)
    }

    fn launch_app(&self, app_name: &str) -> Result<(), AdbError> {
        AdbDevice::launch_app(self, app_name)
    }
}
