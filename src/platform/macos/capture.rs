//! macOS keyboard tap via CGEventTap and CFRunLoop.
//!
//! The tap is created in `start()` itself, so a missing Accessibility grant
//! is reported to the caller as `PlatformError::PermissionDenied` and no
//! thread is left behind. The `keyboard-tap` thread then owns the mach port
//! and the `TapState` for the rest of their lives and frees both once its
//! run loop is stopped.
//!
//! The OS disables a tap whose callback is too slow, and again while secure
//! input is on. The callback re-enables it on the spot and tells the handler.

use std::ffi::c_void;
use std::ptr;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use super::keycodes::vkcode_to_keycode;
use super::imp::{AXIsProcessTrusted, CFRelease, CFRunLoopGetCurrent, CFRunLoopRef, CFStringRef};
use crate::keycode::{KeyState, Modifiers};
use crate::platform::{
    deliver, interrupt, Disposition, EventHandler, InputCapture, InputEvent, PlatformError,
    TapInterruption,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const CG_EVENT_KEY_DOWN: u32 = 10;
const CG_EVENT_KEY_UP: u32 = 11;
const CG_EVENT_FLAGS_CHANGED: u32 = 12;

/// kCGEventTapDisabledByTimeout
const CG_EVENT_TAP_DISABLED_BY_TIMEOUT: u32 = 0xFFFF_FFFE;
/// kCGEventTapDisabledByUserInput
const CG_EVENT_TAP_DISABLED_BY_USER_INPUT: u32 = 0xFFFF_FFFF;

const EVENT_MASK: u64 = (1u64 << CG_EVENT_KEY_DOWN)
    | (1u64 << CG_EVENT_KEY_UP)
    | (1u64 << CG_EVENT_FLAGS_CHANGED);

/// kCGKeyboardEventKeycode
const CG_KEYBOARD_EVENT_KEYCODE: u32 = 9;
/// kCGEventSourceUserData: carries the synthetic-event stamp.
pub(super) const CG_EVENT_SOURCE_USER_DATA: u32 = 42;

// CGEventFlags
pub(super) const FLAG_SHIFT: u64 = 0x0002_0000;
pub(super) const FLAG_CONTROL: u64 = 0x0004_0000;
pub(super) const FLAG_ALTERNATE: u64 = 0x0008_0000;
pub(super) const FLAG_COMMAND: u64 = 0x0010_0000;

/// kCGHIDEventTap: tap at the HID level, before event dispatch.
const CG_HID_EVENT_TAP: u32 = 0;
/// kCGHeadInsertEventTap
const CG_HEAD_INSERT_EVENT_TAP: u32 = 0;
/// kCGEventTapOptionDefault: active tap; the callback may suppress events.
const CG_EVENT_TAP_OPTION_DEFAULT: u32 = 0;

// ---------------------------------------------------------------------------
// Raw FFI
// ---------------------------------------------------------------------------

type CFMachPortRef = *mut c_void;
type CFRunLoopSourceRef = *mut c_void;
type CGEventRef = *mut c_void;
type CGEventTapProxy = *mut c_void;

type CGEventTapCallBack = unsafe extern "C" fn(
    proxy: CGEventTapProxy,
    event_type: u32,
    event: CGEventRef,
    user_info: *mut c_void,
) -> CGEventRef;

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    /// Installs a keyboard tap; null when the process lacks the grant.
    fn CGEventTapCreate(
        tap: u32,
        place: u32,
        options: u32,
        events_of_interest: u64,
        callback: CGEventTapCallBack,
        user_info: *mut c_void,
    ) -> CFMachPortRef;

    /// Turns a tap on or off without destroying it.
    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);

    /// Integer field of an event (keycode, source user data).
    fn CGEventGetIntegerValueField(event: CGEventRef, field: u32) -> i64;

    /// Modifier flags active when the event was generated.
    fn CGEventGetFlags(event: CGEventRef) -> u64;
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    /// Wraps the tap's mach port as a run loop source.
    fn CFMachPortCreateRunLoopSource(
        allocator: *mut c_void,
        port: CFMachPortRef,
        order: isize,
    ) -> CFRunLoopSourceRef;

    /// Attaches a source to a run loop in `mode`.
    fn CFRunLoopAddSource(rl: CFRunLoopRef, source: CFRunLoopSourceRef, mode: CFStringRef);

    /// Blocks the calling thread in its run loop until stopped.
    fn CFRunLoopRun();

    /// Makes `CFRunLoopRun` return on the owning thread.
    fn CFRunLoopStop(rl: CFRunLoopRef);

    /// Mode set that keeps the tap live during modal loops.
    static kCFRunLoopCommonModes: CFStringRef;
}

// ---------------------------------------------------------------------------
// Cross-thread handles
// ---------------------------------------------------------------------------

/// The tap thread's run loop. `CFRunLoopStop` is thread-safe.
struct RunLoopHandle(CFRunLoopRef);
unsafe impl Send for RunLoopHandle {}

/// Ownership of the callback state moving onto the tap thread.
struct StateHandoff(*mut TapState);
unsafe impl Send for StateHandoff {}

// ---------------------------------------------------------------------------
// Callback state
// ---------------------------------------------------------------------------

/// Passed to the C callback via `user_info`. Only the tap thread touches it.
struct TapState {
    handler: Box<dyn EventHandler>,
    /// Needed to re-enable the tap after the OS disables it.
    tap: CFMachPortRef,
}

// ---------------------------------------------------------------------------
// Public struct
// ---------------------------------------------------------------------------

pub struct MacOSCapture {
    run_loop: Option<RunLoopHandle>,
    thread: Option<JoinHandle<()>>,
}

impl MacOSCapture {
    pub fn new() -> Self {
        Self {
            run_loop: None,
            thread: None,
        }
    }
}

impl InputCapture for MacOSCapture {
    fn start(&mut self, handler: Box<dyn EventHandler>) -> Result<(), PlatformError> {
        if self.run_loop.is_some() {
            return Err(PlatformError::Other("keyboard tap already installed".into()));
        }

        if !unsafe { AXIsProcessTrusted() } {
            return Err(PlatformError::PermissionDenied(
                "process is not trusted for Accessibility (System Settings > Privacy & Security)"
                    .into(),
            ));
        }

        let state_ptr = Box::into_raw(Box::new(TapState {
            handler,
            tap: ptr::null_mut(),
        }));

        let tap_port = unsafe {
            CGEventTapCreate(
                CG_HID_EVENT_TAP,
                CG_HEAD_INSERT_EVENT_TAP,
                CG_EVENT_TAP_OPTION_DEFAULT,
                EVENT_MASK,
                event_tap_callback,
                state_ptr.cast::<c_void>(),
            )
        };

        if tap_port.is_null() {
            drop(unsafe { Box::from_raw(state_ptr) });
            return Err(PlatformError::PermissionDenied(
                "keyboard tap refused; check Input Monitoring in System Settings".into(),
            ));
        }

        // The tap is not on any run loop yet, so the callback cannot be running.
        unsafe { (*state_ptr).tap = tap_port };

        let (handoff_tx, handoff_rx) = mpsc::channel::<StateHandoff>();
        let (ready_tx, ready_rx) = mpsc::channel::<RunLoopHandle>();

        let thread = thread::Builder::new()
            .name("keyboard-tap".into())
            .spawn(move || {
                let Ok(StateHandoff(state_ptr)) = handoff_rx.recv() else {
                    return;
                };

                unsafe {
                    let port = (*state_ptr).tap;
                    let here = CFRunLoopGetCurrent();
                    let source = CFMachPortCreateRunLoopSource(ptr::null_mut(), port, 0);
                    CFRunLoopAddSource(here, source, kCFRunLoopCommonModes);
                    CFRelease(source.cast::<c_void>());
                    CGEventTapEnable(port, true);

                    let _ = ready_tx.send(RunLoopHandle(here));
                    log::info!("capture: keyboard tap installed");
                    CFRunLoopRun();

                    CGEventTapEnable(port, false);
                    CFRelease(port.cast::<c_void>());
                    drop(Box::from_raw(state_ptr));
                    log::info!("capture: keyboard tap removed");
                }
            })
            .map_err(|e| PlatformError::Other(format!("spawn keyboard-tap thread: {e}")));

        let thread = match thread {
            Ok(thread) => thread,
            Err(e) => {
                unsafe {
                    CFRelease(tap_port.cast::<c_void>());
                    drop(Box::from_raw(state_ptr));
                }
                return Err(e);
            }
        };
        let _ = handoff_tx.send(StateHandoff(state_ptr));

        let Ok(handle) = ready_rx.recv() else {
            let _ = thread.join();
            return Err(PlatformError::Other(
                "keyboard-tap thread ended during setup".into(),
            ));
        };
        self.run_loop = Some(handle);
        self.thread = Some(thread);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        let Some(RunLoopHandle(run_loop)) = self.run_loop.take() else {
            return Ok(());
        };
        unsafe { CFRunLoopStop(run_loop) };
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("capture: keyboard-tap thread panicked");
            }
        }
        Ok(())
    }
}

impl Drop for MacOSCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

// ---------------------------------------------------------------------------
// C callback
// ---------------------------------------------------------------------------

pub(super) fn modifiers_from_flags(flags: u64) -> Modifiers {
    Modifiers {
        shift: flags & FLAG_SHIFT != 0,
        ctrl: flags & FLAG_CONTROL != 0,
        alt: flags & FLAG_ALTERNATE != 0,
        meta: flags & FLAG_COMMAND != 0,
    }
}

/// Called by the OS on the tap thread for each keyboard event. Returning null
/// suppresses the event.
unsafe extern "C" fn event_tap_callback(
    _proxy: CGEventTapProxy,
    event_type: u32,
    event: CGEventRef,
    user_info: *mut c_void,
) -> CGEventRef {
    let state = &mut *(user_info as *mut TapState);

    let edge = match event_type {
        CG_EVENT_KEY_DOWN => KeyState::Down,
        CG_EVENT_KEY_UP => KeyState::Up,
        CG_EVENT_FLAGS_CHANGED => KeyState::FlagsChanged,
        CG_EVENT_TAP_DISABLED_BY_TIMEOUT | CG_EVENT_TAP_DISABLED_BY_USER_INPUT => {
            CGEventTapEnable(state.tap, true);
            let reason = if !AXIsProcessTrusted() {
                TapInterruption::PermissionRevoked
            } else if event_type == CG_EVENT_TAP_DISABLED_BY_TIMEOUT {
                TapInterruption::Timeout
            } else {
                TapInterruption::UserInput
            };
            log::warn!("capture: tap disabled by the system ({reason:?}), re-enabled");
            interrupt(state.handler.as_mut(), reason);
            return event;
        }
        _ => return event,
    };

    let native = CGEventGetIntegerValueField(event, CG_KEYBOARD_EVENT_KEYCODE);
    let input = InputEvent {
        key: vkcode_to_keycode(native as u16),
        state: edge,
        modifiers: modifiers_from_flags(CGEventGetFlags(event)),
        tag: CGEventGetIntegerValueField(event, CG_EVENT_SOURCE_USER_DATA),
    };

    match deliver(state.handler.as_mut(), input) {
        Disposition::Pass => event,
        Disposition::Swallow => {
            log::trace!("capture: swallowed {} {:?}", input.key, input.state);
            ptr::null_mut()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
