//! Text entry through ADB Keyboard.

use base64::{engine::general_purpose::STANDARD, Engine};
use std::thread;
use std::time::Duration;

use super::connection::{AdbDevice, AdbError};

/// IME id of ADB Keyboard (https://github.com/senzhk/ADBKeyBoard).
pub const ADB_KEYBOARD_IME: &str = "com.android.adbkeyboard/.AdbIME";

impl AdbDevice {
    /// Broadcast text to ADB Keyboard. The IME must already be active.
    pub fn broadcast_text(&self, text: &str) -> Result<(), AdbError> {
        let encoded = STANDARD.encode(text.as_bytes());
        self.shell(&["am", "broadcast", "-a", "ADB_INPUT_B64", "--es", "msg", &encoded])?;
        Ok(())
    }

    /// Clear the focused input field.
    pub fn clear_text(&self) -> Result<(), AdbError> {
        self.shell(&["am", "broadcast", "-a", "ADB_CLEAR_TEXT"])?;
        Ok(())
    }

    /// Switch to ADB Keyboard and return the IME that was active before.
    pub fn switch_to_adb_keyboard(&self) -> Result<String, AdbError> {
        let output = self.output(&["shell", "settings", "get", "secure", "default_input_method"])?;
        let current_ime = String::from_utf8_lossy(&output.stdout).trim().to_string();

        if !current_ime.contains(ADB_KEYBOARD_IME) {
            self.shell(&["ime", "set", ADB_KEYBOARD_IME])?;
        }

        // Warm up the keyboard
        self.broadcast_text("")?;

        Ok(current_ime)
    }

    /// Restore a previously active IME.
    pub fn restore_keyboard(&self, ime: &str) -> Result<(), AdbError> {
        if ime.is_empty() || ime.contains(ADB_KEYBOARD_IME) || ime == "null" {
            return Ok(());
        }
        self.shell(&["ime", "set", ime])?;
        Ok(())
    }

    /// Replace the content of the focused field with `text`.
    pub fn input_text(&self, text: &str) -> Result<(), AdbError> {
        let original_ime = self.switch_to_adb_keyboard()?;
        thread::sleep(Duration::from_secs(1));

        self.clear_text()?;
        thread::sleep(Duration::from_secs(1));

        let typed = self.broadcast_text(text);
        thread::sleep(Duration::from_secs(1));

        // Restore even if typing failed so the user's keyboard comes back.
        let restored = self.restore_keyboard(&original_ime);
        thread::sleep(Duration::from_secs(1));

        typed.and(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_payload_round_trips_unicode() {
        let text = "打开抖音, hello!";
        let encoded = STANDARD.encode(text.as_bytes());
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), text);
    }

    #[test]
    fn test_restore_skips_adb_keyboard() {
        // Would fail to spawn if it tried to run anything.
        let device = AdbDevice::new("/nonexistent/adb-binary-for-tests");
        assert!(device.restore_keyboard(ADB_KEYBOARD_IME).is_ok());
        assert!(device.restore_keyboard("").is_ok());
    }
}
