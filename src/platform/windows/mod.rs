//! Windows platform backend: WH_KEYBOARD_LL capture, SendInput injection.
//!
//! No special permission is needed for a low-level hook. Input source
//! switching is not implemented here; `select_input_source` reports
//! `PlatformError::Unsupported`.
//!
//! `keycodes` is plain Rust and compiles everywhere.

pub mod keycodes;

#[cfg(target_os = "windows")]
mod capture;
#[cfg(target_os = "windows")]
mod executor;

#[cfg(target_os = "windows")]
pub use self::imp::*;

#[cfg(target_os = "windows")]
mod imp {
    use super::capture::WindowsCapture;
    use super::executor::WindowsExecutor;
    use crate::platform::{ActionExecutor, InputCapture, PlatformError};

    /// Returns a `WindowsCapture` backed by `WH_KEYBOARD_LL`.
    pub fn create_input_capture() -> Result<Box<dyn InputCapture>, PlatformError> {
        Ok(Box::new(WindowsCapture::new()))
    }

    /// Returns a `WindowsExecutor` backed by `SendInput`.
    pub fn create_action_executor() -> Result<Box<dyn ActionExecutor>, PlatformError> {
        Ok(Box::new(WindowsExecutor::new()))
    }
}
