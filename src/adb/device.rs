//! Touch and key input for Android automation.

use std::thread;
use std::time::Duration;

use crate::config::APP_PACKAGES;

use super::connection::{AdbDevice, AdbError};

/// Default long press duration in milliseconds.
pub const DEFAULT_LONG_PRESS_MS: u64 = 3000;

/// Pick a swipe duration from the travelled distance.
pub fn swipe_duration(start_x: i32, start_y: i32, end_x: i32, end_y: i32) -> u64 {
    let dx = i64::from(start_x - end_x);
    let dy = i64::from(start_y - end_y);
    let dist_sq = (dx * dx + dy * dy) as u64;
    (dist_sq / 1000).clamp(1000, 2000)
}

/// Resolve an app display name (or raw package id) to a package id.
pub fn resolve_package(app_name: &str) -> Option<String> {
    let name = app_name.trim();
    if let Some(package) = APP_PACKAGES.get(name) {
        return Some(package.to_string());
    }
    if let Some((_, package)) = APP_PACKAGES
        .iter()
        .find(|(display, _)| display.eq_ignore_ascii_case(name))
    {
        return Some(package.to_string());
    }
    if name.contains('.') && !name.contains(char::is_whitespace) {
        return Some(name.to_string());
    }
    None
}

impl AdbDevice {
    fn settle(&self) {
        thread::sleep(Duration::from_millis(self.action_delay_ms()));
    }

    /// Tap at the specified coordinates.
    pub fn tap(&self, x: i32, y: i32) -> Result<(), AdbError> {
        self.shell(&["input", "tap", &x.to_string(), &y.to_string()])?;
        self.settle();
        Ok(())
    }

    /// Double tap at the specified coordinates.
    pub fn double_tap(&self, x: i32, y: i32) -> Result<(), AdbError> {
        let (xs, ys) = (x.to_string(), y.to_string());
        self.shell(&["input", "tap", &xs, &ys])?;
        thread::sleep(Duration::from_millis(100));
        self.shell(&["input", "tap", &xs, &ys])?;
        self.settle();
        Ok(())
    }

    /// Long press at the specified coordinates.
    pub fn long_press(&self, x: i32, y: i32, duration_ms: u64) -> Result<(), AdbError> {
        let (xs, ys) = (x.to_string(), y.to_string());
        self.shell(&["input", "swipe", &xs, &ys, &xs, &ys, &duration_ms.to_string()])?;
        self.settle();
        Ok(())
    }

    /// Swipe from start to end. The duration is derived from distance when `None`.
    pub fn swipe(
        &self,
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        duration_ms: Option<u64>,
    ) -> Result<(), AdbError> {
        let duration =
            duration_ms.unwrap_or_else(|| swipe_duration(start_x, start_y, end_x, end_y));

        self.shell(&[
            "input",
            "swipe",
            &start_x.to_string(),
            &start_y.to_string(),
            &end_x.to_string(),
            &end_y.to_string(),
            &duration.to_string(),
        ])?;
        self.settle();
        Ok(())
    }

    /// Press the back button.
    pub fn back(&self) -> Result<(), AdbError> {
        self.shell(&["input", "keyevent", "4"])?;
        self.settle();
        Ok(())
    }

    /// Press the home button.
    pub fn home(&self) -> Result<(), AdbError> {
        self.shell(&["input", "keyevent", "KEYCODE_HOME"])?;
        self.settle();
        Ok(())
    }

    /// Press enter.
    pub fn enter(&self) -> Result<(), AdbError> {
        self.shell(&["input", "keyevent", "66"])?;
        self.settle();
        Ok(())
    }

    /// Launch an app by display name or package id.
    pub fn launch_app(&self, app_name: &str) -> Result<(), AdbError> {
        let package =
            resolve_package(app_name).ok_or_else(|| AdbError::AppNotFound(app_name.to_string()))?;

        self.shell(&[
            "monkey",
            "-p",
            &package,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ])?;
        self.settle();
        Ok(())
    }
}
