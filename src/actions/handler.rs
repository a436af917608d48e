//! Executing parsed actions on a device.

use serde::Serialize;
use std::fmt;
use std::thread;
use std::time::Duration;

use crate::adb::{AdbError, Device, DEFAULT_LONG_PRESS_MS};

use super::coordinates::{CoordinateSpace, ScreenSize};
use super::parser::{Action, ScrollDirection};

/// Fraction of the screen covered by one scroll gesture.
pub const SCROLL_FRACTION: f64 = 0.4;

/// Default pause for `wait()`, in seconds.
pub const DEFAULT_WAIT_SECS: f64 = 5.0;

/// An action resolved to device pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceAction {
    Tap { x: i32, y: i32 },
    DoubleTap { x: i32, y: i32 },
    LongPress { x: i32, y: i32 },
    Hover { x: i32, y: i32 },
    Swipe { start: (i32, i32), end: (i32, i32) },
    Type { text: String, submit: bool },
    OpenApp { app_name: String },
    Home,
    Back,
    Wait,
    Finished { message: Option<String> },
}

impl DeviceAction {
    /// Map a model action onto the screen.
    pub fn resolve(action: &Action, space: CoordinateSpace, screen: ScreenSize) -> Self {
        let to_device = |p| space.to_device(p, screen);

        match action {
            Action::Click { point } => {
                let (x, y) = to_device(*point);
                DeviceAction::Tap { x, y }
            }
            Action::DoubleClick { point } => {
                let (x, y) = to_device(*point);
                DeviceAction::DoubleTap { x, y }
            }
            Action::LongPress { point } => {
                let (x, y) = to_device(*point);
                DeviceAction::LongPress { x, y }
            }
            Action::Hover { point } => {
                let (x, y) = to_device(*point);
                DeviceAction::Hover { x, y }
            }
            Action::Drag { start, end } => DeviceAction::Swipe {
                start: to_device(*start),
                end: to_device(*end),
            },
            Action::Scroll { point, direction } => {
                let start = point.map(to_device).unwrap_or_else(|| screen.center());
                DeviceAction::Swipe {
                    start,
                    end: scroll_end(start, *direction, screen),
                }
            }
            Action::Type { content } => match content.strip_suffix('\n') {
                Some(text) => DeviceAction::Type {
                    text: text.to_string(),
                    submit: true,
                },
                None => DeviceAction::Type {
                    text: content.clone(),
                    submit: false,
                },
            },
            Action::OpenApp { app_name } => DeviceAction::OpenApp {
                app_name: app_name.clone(),
            },
            Action::Home => DeviceAction::Home,
            Action::Back => DeviceAction::Back,
            Action::Wait => DeviceAction::Wait,
            Action::Finished { content } => DeviceAction::Finished {
                message: content.clone(),
            },
        }
    }
}

/// Finger end point for a scroll. Scrolling `down` reveals content below,
/// so the finger moves up.
fn scroll_end(start: (i32, i32), direction: ScrollDirection, screen: ScreenSize) -> (i32, i32) {
    let dx = (f64::from(screen.width) * SCROLL_FRACTION) as i64;
    let dy = (f64::from(screen.height) * SCROLL_FRACTION) as i64;
    let (x, y) = (i64::from(start.0), i64::from(start.1));

    match direction {
        ScrollDirection::Down => screen.clamp(x, y - dy),
        ScrollDirection::Up => screen.clamp(x, y + dy),
        ScrollDirection::Right => screen.clamp(x - dx, y),
        ScrollDirection::Left => screen.clamp(x + dx, y),
    }
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceAction::Tap { x, y } => write!(f, "tap({}, {})", x, y),
            DeviceAction::DoubleTap { x, y } => write!(f, "double_tap({}, {})", x, y),
            DeviceAction::LongPress { x, y } => write!(f, "long_press({}, {})", x, y),
            DeviceAction::Hover { x, y } => write!(f, "hover({}, {})", x, y),
            DeviceAction::Swipe { start, end } => write!(
                f,
                "swipe(({}, {}) -> ({}, {}))",
                start.0, start.1, end.0, end.1
            ),
            DeviceAction::Type { text, submit } => {
                write!(f, "type({:?}", text)?;
                if *submit {
                    write!(f, ", enter")?;
                }
                write!(f, ")")
            }
            DeviceAction::OpenApp { app_name } => write!(f, "open_app({})", app_name),
            DeviceAction::Home => write!(f, "press_home()"),
            DeviceAction::Back => write!(f, "press_back()"),
            DeviceAction::Wait => write!(f, "wait()"),
            DeviceAction::Finished { message } => {
                write!(f, "finished({})", message.as_deref().unwrap_or(""))
            }
        }
    }
}

/// Result of an action execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub should_finish: bool,
    pub message: Option<String>,
}

impl ActionResult {
    /// Create a successful result.
    pub fn success() -> Self {
        Self {
            should_finish: false,
            message: None,
        }
    }

    /// Create a finish result.
    pub fn finish(message: Option<String>) -> Self {
        Self {
            should_finish: true,
            message,
        }
    }
}

/// Executes resolved actions on a device.
#[derive(Debug, Clone)]
pub struct ActionHandler {
    wait_secs: f64,
    long_press_ms: u64,
}

impl Default for ActionHandler {
    fn default() -> Self {
        Self::new(DEFAULT_WAIT_SECS)
    }
}

impl ActionHandler {
    /// Create a handler that sleeps `wait_secs` on `wait()`.
    pub fn new(wait_secs: f64) -> Self {
        Self {
            wait_secs: wait_secs.max(0.0),
            long_press_ms: DEFAULT_LONG_PRESS_MS,
        }
    }

    /// Execute an action.
    pub fn execute(
        &self,
        device: &dyn Device,
        action: &DeviceAction,
    ) -> Result<ActionResult, AdbError> {
        match action {
            DeviceAction::Tap { x, y } => device.tap(*x, *y)?,
            DeviceAction::DoubleTap { x, y } => device.double_tap(*x, *y)?,
            DeviceAction::LongPress { x, y } => device.long_press(*x, *y, self.long_press_ms)?,
            DeviceAction::Hover { x, y } => {
                tracing::info!("Ignoring hover at ({}, {}) on a touch screen", x, y);
            }
            DeviceAction::Swipe { start, end } => {
                device.swipe(start.0, start.1, end.0, end.1, None)?
            }
            DeviceAction::Type { text, submit } => {
                device.type_text(text)?;
                if *submit {
                    device.enter()?;
                }
            }
            DeviceAction::OpenApp { app_name } => device.launch_app(app_name)?,
            DeviceAction::Home => device.home()?,
            DeviceAction::Back => device.back()?,
            DeviceAction::Wait => thread::sleep(Duration::from_secs_f64(self.wait_secs)),
            DeviceAction::Finished { message } => {
                return Ok(ActionResult::finish(message.clone()));
            }
        }
        Ok(ActionResult::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Point;
    use crate::adb::Screenshot;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingDevice {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingDevice {
        fn record(&self, call: String) -> Result<(), AdbError> {
            self.calls.lock().push(call);
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl Device for RecordingDevice {
        fn screenshot(&self) -> Result<Screenshot, AdbError> {
            Ok(Screenshot::fallback(false))
        }
        fn tap(&self, x: i32, y: i32) -> Result<(), AdbError> {
            self.record(format!("tap {} {}", x, y))
        }
        fn double_tap(&self, x: i32, y: i32) -> Result<(), AdbError> {
            self.record(format!("double_tap {} {}", x, y))
        }
        fn long_press(&self, x: i32, y: i32, duration_ms: u64) -> Result<(), AdbError> {
            self.record(format!("long_press {} {} {}", x, y, duration_ms))
        }
        fn swipe(
            &self,
            start_x: i32,
            start_y: i32,
            end_x: i32,
            end_y: i32,
            _duration_ms: Option<u64>,
        ) -> Result<(), AdbError> {
            self.record(format!("swipe {} {} {} {}", start_x, start_y, end_x, end_y))
        }
        fn back(&self) -> Result<(), AdbError> {
            self.record("back".to_string())
        }
        fn home(&self) -> Result<(), AdbError> {
            self.record("home".to_string())
        }
        fn enter(&self) -> Result<(), AdbError> {
            self.record("enter".to_string())
        }
        fn type_text(&self, text: &str) -> Result<(), AdbError> {
            self.record(format!("type {}", text))
        }
        fn launch_app(&self, app_name: &str) -> Result<(), AdbError> {
            if app_name == "missing" {
                return Err(AdbError::AppNotFound(app_name.to_string()));
            }
            self.record(format!("launch {}", app_name))
        }
    }

    const SCREEN: ScreenSize = ScreenSize {
        width: 1000,
        height: 2000,
    };

    #[test]
    fn test_resolve_click_relative() {
        let action = Action::Click {
            point: Point::new(250.0, 750.0),
        };
        assert_eq!(
            DeviceAction::resolve(&action, CoordinateSpace::Relative, SCREEN),
            DeviceAction::Tap { x: 250, y: 1500 }
        );
    }

    #[test]
    fn test_resolve_scroll_directions() {
        let down = Action::Scroll {
            point: None,
            direction: ScrollDirection::Down,
        };
        assert_eq!(
            DeviceAction::resolve(&down, CoordinateSpace::Relative, SCREEN),
            DeviceAction::Swipe {
                start: (500, 1000),
                end: (500, 200),
            }
        );

        let left = Action::Scroll {
            point: Some(Point::new(900.0, 500.0)),
            direction: ScrollDirection::Left,
        };
        // Finger moves right and is clamped at the edge.
        assert_eq!(
            DeviceAction::resolve(&left, CoordinateSpace::Relative, SCREEN),
            DeviceAction::Swipe {
                start: (900, 1000),
                end: (999, 1000),
            }
        );
    }

    #[test]
    fn test_resolve_type_submit() {
        let action = Action::Type {
            content: "hello\n".to_string(),
        };
        let resolved = DeviceAction::resolve(&action, CoordinateSpace::Relative, SCREEN);
        assert_eq!(
            resolved,
            DeviceAction::Type {
                text: "hello".to_string(),
                submit: true,
            }
        );
        assert_eq!(resolved.to_string(), "type(\"hello\", enter)");
    }

    #[test]
    fn test_display() {
        assert_eq!(DeviceAction::Tap { x: 1, y: 2 }.to_string(), "tap(1, 2)");
        assert_eq!(
            DeviceAction::Swipe {
                start: (1, 2),
                end: (3, 4)
            }
            .to_string(),
            "swipe((1, 2) -> (3, 4))"
        );
        assert_eq!(
            DeviceAction::Finished {
                message: Some("ok".to_string())
            }
            .to_string(),
            "finished(ok)"
        );
    }

    #[test]
    fn test_execute_dispatches_to_device() {
        let device = RecordingDevice::default();
        let handler = ActionHandler::new(0.0);

        let actions = [
            DeviceAction::Tap { x: 10, y: 20 },
            DeviceAction::LongPress { x: 1, y: 2 },
            DeviceAction::Swipe {
                start: (0, 100),
                end: (0, 10),
            },
            DeviceAction::Type {
                text: "abc".to_string(),
                submit: true,
            },
            DeviceAction::OpenApp {
                app_name: "微信".to_string(),
            },
            DeviceAction::Hover { x: 5, y: 5 },
            DeviceAction::Wait,
            DeviceAction::Back,
            DeviceAction::Home,
        ];
        for action in &actions {
            let result = handler.execute(&device, action).unwrap();
            assert!(!result.should_finish);
        }

        assert_eq!(
            device.calls(),
            vec![
                "tap 10 20",
                "long_press 1 2 3000",
                "swipe 0 100 0 10",
                "type abc",
                "enter",
                "launch 微信",
                "back",
                "home",
            ]
        );
    }

    #[test]
    fn test_execute_finished() {
        let device = RecordingDevice::default();
        let result = ActionHandler::default()
            .execute(
                &device,
                &DeviceAction::Finished {
                    message: Some("done".to_string()),
                },
            )
            .unwrap();
        assert_eq!(result, ActionResult::finish(Some("done".to_string())));
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_execute_propagates_device_errors() {
        let device = RecordingDevice::default();
        let err = ActionHandler::new(0.0)
            .execute(
                &device,
                &DeviceAction::OpenApp {
                    app_name: "missing".to_string(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, AdbError::AppNotFound(_)));
    }
}
