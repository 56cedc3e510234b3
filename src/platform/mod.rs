//! Platform abstraction layer.
//!
//! Defines the `InputCapture` (event tap) and `ActionExecutor` (injection)
//! traits shared by the engine. Platform-specific implementations live in
//! child modules; their keycode tables are pure and compiled everywhere so
//! they stay testable, while the FFI halves are gated on the target OS.

pub mod macos;
pub mod windows;

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

use serde::Serialize;

use crate::keycode::{KeyCode, KeyState, Modifiers};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported on this platform: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// One keyboard event as delivered by a capture backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    /// Canonical key, `KeyCode::UNKNOWN` when the native code is unmapped.
    pub key: KeyCode,
    pub state: KeyState,
    /// Modifiers held when the event was generated.
    pub modifiers: Modifiers,
    /// Side-channel value read from the native event; see `crate::guard`.
    pub tag: i64,
}

/// What the capture backend does with the original event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Deliver the event unchanged.
    Pass,
    /// Suppress the event so no application sees it.
    Swallow,
}

/// Why the OS stopped delivering events to the tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapInterruption {
    /// The callback exceeded the OS latency budget. The tap was re-enabled.
    Timeout,
    /// Secure input or similar user-driven disable. The tap was re-enabled.
    UserInput,
    /// The process lost the permission it needs to observe input.
    PermissionRevoked,
}

/// Receives events on the capture thread, one at a time in arrival order.
pub trait EventHandler: Send {
    fn on_event(&mut self, event: InputEvent) -> Disposition;

    fn on_interruption(&mut self, reason: TapInterruption);
}

/// Calls the handler, converting a panic into `Disposition::Pass`.
///
/// Used by the OS callbacks: nothing may unwind across the FFI boundary.
pub(crate) fn deliver(handler: &mut dyn EventHandler, event: InputEvent) -> Disposition {
    match panic::catch_unwind(AssertUnwindSafe(|| handler.on_event(event))) {
        Ok(disposition) => disposition,
        Err(_) => {
            log::error!("capture: event handler panicked; passing {:?} through", event.key);
            Disposition::Pass
        }
    }
}

pub(crate) fn interrupt(handler: &mut dyn EventHandler, reason: TapInterruption) {
    if panic::catch_unwind(AssertUnwindSafe(|| handler.on_interruption(reason))).is_err() {
        log::error!("capture: event handler panicked while handling {reason:?}");
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// System-wide keyboard tap running on its own thread.
pub trait InputCapture: Send {
    /// Installs the tap and starts its dispatch loop. Errors surface before
    /// any background thread is left running.
    fn start(&mut self, handler: Box<dyn EventHandler>) -> Result<(), PlatformError>;

    /// Stops the dispatch loop and removes the tap. Idempotent.
    fn stop(&mut self) -> Result<(), PlatformError>;
}

/// A single synthesized keystroke: press and release `key` with `modifiers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStroke {
    pub key: KeyCode,
    pub modifiers: Modifiers,
}

impl KeyStroke {
    pub const fn new(key: KeyCode, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }

    pub const fn plain(key: KeyCode) -> Self {
        Self::new(key, Modifiers::NONE)
    }
}

/// Performs platform effects. Every injected event must carry
/// `crate::guard::stamp()`.
pub trait ActionExecutor: Send {
    /// Taps each stroke in order. `held` are the modifiers physically down
    /// at the time, which the stroke must not release.
    fn post_keys(&self, strokes: &[KeyStroke], held: Modifiers) -> Result<(), PlatformError>;

    /// Types literal text independent of the keyboard layout.
    fn type_text(&self, text: &str) -> Result<(), PlatformError>;

    /// Switches the OS input source by exact identifier.
    fn select_input_source(&self, source_id: &str) -> Result<(), PlatformError>;

    /// Flips the real hardware lock state of the chord key.
    fn toggle_chord_lock(&self) -> Result<(), PlatformError>;

    /// Starts `command_line` in the platform shell without waiting for it.
    fn run_command(&self, command_line: &str) -> Result<(), PlatformError> {
        crate::dispatch::spawn_detached(command_line)
    }
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

/// Capability flags the tap needs, as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionStatuses {
    pub platform: &'static str,
    pub accessibility: &'static str,
    pub input_monitoring: &'static str,
}

impl PermissionStatuses {
    /// True when nothing the tap needs is reported as missing.
    pub fn input_granted(&self) -> bool {
        self.accessibility != "not_granted" && self.input_monitoring != "not_granted"
    }
}

pub fn permission_statuses() -> PermissionStatuses {
    #[cfg(target_os = "macos")]
    {
        macos::permission_statuses()
    }

    #[cfg(not(target_os = "macos"))]
    {
        PermissionStatuses {
            platform: "other",
            accessibility: "not_required",
            input_monitoring: "not_required",
        }
    }
}

/// Whether the tap could observe input right now.
pub fn input_permission_granted() -> bool {
    permission_statuses().input_granted()
}

// ---------------------------------------------------------------------------
// Factories
// ---------------------------------------------------------------------------

/// True where `ActionExecutor::select_input_source` is implemented.
pub const SUPPORTS_INPUT_SOURCES: bool = cfg!(target_os = "macos");

/// Chord key as it arrives at the tap on this platform.
///
/// macOS reports CapsLock only as a lock-state flag, so `macos::remap` moves
/// it onto F18 below the tap, which delivers ordinary press/release pairs.
pub const fn default_chord_key() -> KeyCode {
    if cfg!(target_os = "macos") {
        KeyCode::F18
    } else {
        KeyCode::CAPS_LOCK
    }
}

pub fn create_input_capture() -> Result<Box<dyn InputCapture>, PlatformError> {
    #[cfg(target_os = "macos")]
    {
        macos::create_input_capture()
    }
    #[cfg(target_os = "windows")]
    {
        windows::create_input_capture()
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Err(PlatformError::Unavailable(format!(
            "no keyboard tap backend for {}",
            std::env::consts::OS
        )))
    }
}

pub fn create_action_executor() -> Result<Box<dyn ActionExecutor>, PlatformError> {
    #[cfg(target_os = "macos")]
    {
        macos::create_action_executor()
    }
    #[cfg(target_os = "windows")]
    {
        windows::create_action_executor()
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Err(PlatformError::Unavailable(format!(
            "no input injection backend for {}",
            std::env::consts::OS
        )))
    }
}

/// Blocks the calling (main) thread until `quit` fires or its sender drops.
///
/// On macOS the main run loop is pumped meanwhile so work queued onto the
/// main dispatch queue (input-source switches) gets executed.
pub fn run_main_loop(quit: mpsc::Receiver<()>) {
    #[cfg(target_os = "macos")]
    {
        macos::run_main_loop(quit);
    }
    #[cfg(not(target_os = "macos"))]
    {
        let _ = quit.recv();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
