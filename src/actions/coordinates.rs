//! Mapping model coordinates onto device pixels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound of the relative coordinate range.
pub const RELATIVE_COORDINATE_MAX: f64 = 1000.0;

/// Qwen2.5-VL patch factor.
pub const IMAGE_FACTOR: u32 = 28;
/// Qwen2.5-VL smallest image area after resizing.
pub const MIN_PIXELS: u32 = 100 * 28 * 28;
/// Qwen2.5-VL largest image area after resizing.
pub const MAX_PIXELS: u32 = 1280 * 28 * 28;

/// Screen size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> (i32, i32) {
        ((self.width / 2) as i32, (self.height / 2) as i32)
    }

    /// Clamp a point into the screen.
    pub fn clamp(&self, x: i64, y: i64) -> (i32, i32) {
        let max_x = i64::from(self.width.saturating_sub(1));
        let max_y = i64::from(self.height.saturating_sub(1));
        (x.clamp(0, max_x) as i32, y.clamp(0, max_y) as i32)
    }
}

/// A point as written by the model, before mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Coordinate convention of the model's replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSpace {
    /// Integers in 0..=1000 relative to width and height (UI-TARS 1.0 / Qwen2-VL).
    #[default]
    Relative,
    /// Pixels of the smart-resized image the model saw (UI-TARS 1.5 / Qwen2.5-VL).
    Resized,
    /// Device pixels.
    Absolute,
}

impl CoordinateSpace {
    /// Line describing the convention to the model.
    pub fn prompt_note(&self) -> &'static str {
        match self {
            CoordinateSpace::Relative => {
                "Coordinates are integers from 0 to 1000, relative to the screenshot width (x) and height (y)."
            }
            CoordinateSpace::Resized | CoordinateSpace::Absolute => {
                "Coordinates are absolute pixels of the screenshot, x from the left edge and y from the top edge."
            }
        }
    }

    /// Map a model point to a device pixel, clamped into the screen.
    pub fn to_device(&self, point: Point, screen: ScreenSize) -> (i32, i32) {
        let (w, h) = (f64::from(screen.width), f64::from(screen.height));
        let (x, y) = match self {
            CoordinateSpace::Relative => (
                point.x * w / RELATIVE_COORDINATE_MAX,
                point.y * h / RELATIVE_COORDINATE_MAX,
            ),
            CoordinateSpace::Resized => {
                let (resized_h, resized_w) = smart_resize(
                    screen.height,
                    screen.width,
                    IMAGE_FACTOR,
                    MIN_PIXELS,
                    MAX_PIXELS,
                );
                (
                    point.x * w / f64::from(resized_w),
                    point.y * h / f64::from(resized_h),
                )
            }
            CoordinateSpace::Absolute => (point.x, point.y),
        };
        screen.clamp(x.trunc() as i64, y.trunc() as i64)
    }
}

impl fmt::Display for CoordinateSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateSpace::Relative => write!(f, "relative"),
            CoordinateSpace::Resized => write!(f, "resized"),
            CoordinateSpace::Absolute => write!(f, "absolute"),
        }
    }
}

impl FromStr for CoordinateSpace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "relative" | "rel" | "qwen2vl" | "1.0" => Ok(CoordinateSpace::Relative),
            "resized" | "qwen25vl" | "1.5" => Ok(CoordinateSpace::Resized),
            "absolute" | "abs" => Ok(CoordinateSpace::Absolute),
            other => Err(format!("unknown coordinate space: {}", other)),
        }
    }
}

/// Halves round to even.
fn round_by_factor(value: f64, factor: u32) -> u32 {
    ((value / f64::from(factor)).round_ties_even() as u32) * factor
}

fn floor_by_factor(value: f64, factor: u32) -> u32 {
    ((value / f64::from(factor)).floor() as u32) * factor
}

fn ceil_by_factor(value: f64, factor: u32) -> u32 {
    ((value / f64::from(factor)).ceil() as u32) * factor
}

/// Qwen2.5-VL image resize rule. Returns `(height, width)` such that both are
/// multiples of `factor` and the area lies within `[min_pixels, max_pixels]`,
/// keeping the aspect ratio as close as possible.
pub fn smart_resize(
    height: u32,
    width: u32,
    factor: u32,
    min_pixels: u32,
    max_pixels: u32,
) -> (u32, u32) {
    let (h, w) = (f64::from(height), f64::from(width));
    let mut h_bar = factor.max(round_by_factor(h, factor));
    let mut w_bar = factor.max(round_by_factor(w, factor));

    if u64::from(h_bar) * u64::from(w_bar) > u64::from(max_pixels) {
        let beta = (h * w / f64::from(max_pixels)).sqrt();
        h_bar = factor.max(floor_by_factor(h / beta, factor));
        w_bar = factor.max(floor_by_factor(w / beta, factor));
    } else if u64::from(h_bar) * u64::from(w_bar) < u64::from(min_pixels) {
        let beta = (f64::from(min_pixels) / (h * w)).sqrt();
        h_bar = ceil_by_factor(h * beta, factor);
        w_bar = ceil_by_factor(w * beta, factor);
    }

    (h_bar, w_bar)
}
