//! macOS platform backend.
//!
//! Capture: CGEventTap (HID level) via `MacOSCapture`.
//! Injection: CGEventPost via `MacOSExecutor`, lock state via IOKit, input
//! sources via Text Input Sources on the main dispatch queue.
//! Chord key: `remap` moves CapsLock onto F18 with `hidutil`.
//!
//! The tap requires Accessibility permission (and Input Monitoring on recent
//! releases). `MacOSCapture::start()` calls `AXIsProcessTrusted()` and returns
//! `PlatformError::PermissionDenied` if it has not been granted. Guide the
//! user to System Settings > Privacy & Security > Accessibility.
//!
//! `keycodes` and `remap` are plain Rust and compile everywhere.

pub mod keycodes;
pub mod remap;

#[cfg(target_os = "macos")]
mod capture;
#[cfg(target_os = "macos")]
mod executor;
#[cfg(target_os = "macos")]
mod input_source;

#[cfg(target_os = "macos")]
pub use self::imp::*;

#[cfg(target_os = "macos")]
mod imp {
    use std::ffi::c_void;
    use std::sync::mpsc::{self, TryRecvError};

    use super::capture::MacOSCapture;
    use super::executor::MacOSExecutor;
    use crate::platform::{ActionExecutor, InputCapture, PermissionStatuses, PlatformError};

    // -----------------------------------------------------------------------
    // FFI shared by the backend modules
    // -----------------------------------------------------------------------

    pub(super) type CFRunLoopRef = *mut c_void;
    pub(super) type CFStringRef = *const c_void;

    /// How long the main thread sleeps in its run loop between quit checks.
    const MAIN_LOOP_SLICE_SECS: f64 = 0.25;

    #[link(name = "ApplicationServices", kind = "framework")]
    extern "C" {
        /// Whether the process holds the Accessibility grant.
        pub(super) fn AXIsProcessTrusted() -> bool;

        /// Whether the process may listen to input events, without prompting.
        fn CGPreflightListenEventAccess() -> bool;
    }

    #[link(name = "CoreFoundation", kind = "framework")]
    extern "C" {
        /// Releases a Core Foundation object.
        pub(super) fn CFRelease(cf: *const c_void);

        /// Run loop of the calling thread.
        pub(super) fn CFRunLoopGetCurrent() -> CFRunLoopRef;

        /// Runs the current run loop for at most `seconds`.
        fn CFRunLoopRunInMode(mode: CFStringRef, seconds: f64, return_after_source: bool) -> i32;

        /// Default run loop mode.
        static kCFRunLoopDefaultMode: CFStringRef;
    }

    // -----------------------------------------------------------------------
    // Factories
    // -----------------------------------------------------------------------

    /// Accessibility is checked in `start()` so that `new()` always succeeds.
    pub fn create_input_capture() -> Result<Box<dyn InputCapture>, PlatformError> {
        Ok(Box::new(MacOSCapture::new()))
    }

    pub fn create_action_executor() -> Result<Box<dyn ActionExecutor>, PlatformError> {
        Ok(Box::new(MacOSExecutor::new()))
    }

    // -----------------------------------------------------------------------
    // Permissions & main loop
    // -----------------------------------------------------------------------

    fn granted(flag: bool) -> &'static str {
        if flag {
            "granted"
        } else {
            "not_granted"
        }
    }

    pub fn permission_statuses() -> PermissionStatuses {
        let (accessibility, input_monitoring) =
            unsafe { (AXIsProcessTrusted(), CGPreflightListenEventAccess()) };
        PermissionStatuses {
            platform: "macos",
            accessibility: granted(accessibility),
            input_monitoring: granted(input_monitoring),
        }
    }

    /// Pumps the main run loop, which also drains the main dispatch queue,
    /// until `quit` fires or disconnects.
    pub fn run_main_loop(quit: mpsc::Receiver<()>) {
        loop {
            unsafe { CFRunLoopRunInMode(kCFRunLoopDefaultMode, MAIN_LOOP_SLICE_SECS, false) };
            match quit.try_recv() {
                Err(TryRecvError::Empty) => continue,
                Ok(()) | Err(TryRecvError::Disconnected) => break,
            }
        }
        log::debug!("capture: main run loop finished");
    }
}
