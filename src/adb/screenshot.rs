//! Screenshot capture from the Android device.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, RgbImage};
use std::fs;
use std::io::Cursor;
use std::path::Path;

use super::connection::{AdbDevice, AdbError};

const PNG_MAGIC: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// Size of the black frame used when the device refuses to capture.
pub const FALLBACK_WIDTH: u32 = 1080;
pub const FALLBACK_HEIGHT: u32 = 2400;

/// A captured screenshot.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub base64_data: String,
    pub width: u32,
    pub height: u32,
    pub is_sensitive: bool,
}

impl Screenshot {
    /// Create a new screenshot.
    pub fn new(base64_data: String, width: u32, height: u32, is_sensitive: bool) -> Self {
        Self {
            base64_data,
            width,
            height,
            is_sensitive,
        }
    }

    /// Build a screenshot from raw PNG bytes.
    pub fn from_png(png_data: &[u8]) -> Result<Self, AdbError> {
        if png_data.len() < PNG_MAGIC.len() {
            return Err(AdbError::Screenshot(format!(
                "data too small: {} bytes",
                png_data.len()
            )));
        }
        if &png_data[..PNG_MAGIC.len()] != PNG_MAGIC {
            return Err(AdbError::Screenshot(format!(
                "invalid PNG header: {:?}",
                &png_data[..PNG_MAGIC.len()]
            )));
        }

        let img = image::load_from_memory(png_data)
            .map_err(|e| AdbError::Screenshot(format!("failed to decode image: {}", e)))?;

        Ok(Self::new(
            STANDARD.encode(png_data),
            img.width(),
            img.height(),
            false,
        ))
    }

    /// Black frame returned for screens that cannot be captured.
    pub fn fallback(is_sensitive: bool) -> Self {
        let black = RgbImage::from_pixel(FALLBACK_WIDTH, FALLBACK_HEIGHT, image::Rgb([0, 0, 0]));

        let mut buffer = Cursor::new(Vec::new());
        let _ = DynamicImage::ImageRgb8(black).write_to(&mut buffer, image::ImageFormat::Png);

        Self::new(
            STANDARD.encode(buffer.into_inner()),
            FALLBACK_WIDTH,
            FALLBACK_HEIGHT,
            is_sensitive,
        )
    }

    /// Decode the PNG bytes.
    pub fn png_bytes(&self) -> Result<Vec<u8>, AdbError> {
        STANDARD
            .decode(&self.base64_data)
            .map_err(|e| AdbError::Screenshot(format!("invalid base64 data: {}", e)))
    }

    /// Write the PNG to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), AdbError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.png_bytes()?)?;
        Ok(())
    }
}

impl AdbDevice {
    /// Capture a screenshot with `adb exec-out screencap -p`.
    ///
    /// Secure screens (payment pages, DRM video) make screencap fail; those
    /// return a black frame with `is_sensitive` set instead of an error.
    pub fn capture_screenshot(&self) -> Result<Screenshot, AdbError> {
        let output = self.output(&["exec-out", "screencap", "-p"])?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("Status: -1") || stderr.contains("Failed") {
            tracing::warn!("Screenshot refused (sensitive screen): {}", stderr.trim());
            return Ok(Screenshot::fallback(true));
        }

        if !output.status.success() {
            return Err(AdbError::CommandFailed {
                command: "exec-out screencap -p".to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Screenshot::from_png(&output.stdout)
    }
}
