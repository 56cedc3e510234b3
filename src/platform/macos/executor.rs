//! macOS action executor.
//!
//! Keystrokes are posted with `CGEventPost` at the HID tap location from a
//! private event source, each stamped in `kCGEventSourceUserData` so our own
//! tap recognises and passes them. Posting is synchronous; no background
//! thread is needed.

use std::ffi::c_void;

use super::capture::{
    modifiers_from_flags, CG_EVENT_SOURCE_USER_DATA, FLAG_ALTERNATE, FLAG_COMMAND, FLAG_CONTROL,
    FLAG_SHIFT,
};
use super::imp::CFRelease;
use super::input_source;
use super::keycodes::keycode_to_vkcode;
use crate::guard;
use crate::keycode::Modifiers;
use crate::platform::{ActionExecutor, KeyStroke, PlatformError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// kCGHIDEventTap: posted events pass through every tap, including ours.
const CG_HID_EVENT_TAP: u32 = 0;

/// kCGEventSourceStatePrivate: flags of posted events are exactly what we set.
const CG_EVENT_SOURCE_STATE_PRIVATE: i32 = -1;

/// Virtual key used as the carrier for unicode text events.
const TEXT_CARRIER_VK: u16 = 0;

// IOKit lock-state selectors.
const KIO_HID_PARAM_CONNECT_TYPE: u32 = 1;
const KIO_HID_CAPS_LOCK_STATE: i32 = 1;

// ---------------------------------------------------------------------------
// Raw FFI
// ---------------------------------------------------------------------------

type CGEventRef = *mut c_void;
type CGEventSourceRef = *mut c_void;

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    /// Event source whose state the synthetic events share.
    fn CGEventSourceCreate(state_id: i32) -> CGEventSourceRef;

    /// New key-down or key-up event for a macOS virtual keycode.
    fn CGEventCreateKeyboardEvent(
        source: CGEventSourceRef,
        virtual_key: u16,
        key_down: bool,
    ) -> CGEventRef;

    /// Overwrites the modifier flags carried by an event.
    fn CGEventSetFlags(event: CGEventRef, flags: u64);

    /// Writes an integer field; used for the synthetic stamp.
    fn CGEventSetIntegerValueField(event: CGEventRef, field: u32, value: i64);

    /// Replaces the text a key event types.
    fn CGEventKeyboardSetUnicodeString(event: CGEventRef, length: usize, string: *const u16);

    /// Injects an event at the given tap location.
    fn CGEventPost(tap_location: u32, event: CGEventRef);
}

#[link(name = "IOKit", kind = "framework")]
extern "C" {
    /// Matching dictionary for IOKit services of class `name`.
    fn IOServiceMatching(name: *const i8) -> *mut c_void;

    /// First registered service matching the dictionary.
    fn IOServiceGetMatchingService(main_port: u32, matching: *mut c_void) -> u32;

    /// Opens a user client connection to a service.
    fn IOServiceOpen(service: u32, owning_task: u32, kind: u32, connect: *mut u32) -> i32;

    /// Closes a connection from `IOServiceOpen`.
    fn IOServiceClose(connect: u32) -> i32;

    /// Drops an IOKit object reference.
    fn IOObjectRelease(object: u32) -> i32;

    /// Reads a modifier lock (CapsLock) from the HID system.
    fn IOHIDGetModifierLockState(handle: u32, selector: i32, state: *mut bool) -> i32;

    /// Sets a modifier lock (CapsLock) in the HID system.
    fn IOHIDSetModifierLockState(handle: u32, selector: i32, state: bool) -> i32;
}

extern "C" {
    /// Port naming the current task.
    static mach_task_self_: u32;
}

fn flags_for(modifiers: Modifiers) -> u64 {
    let mut flags = 0;
    if modifiers.shift {
        flags |= FLAG_SHIFT;
    }
    if modifiers.ctrl {
        flags |= FLAG_CONTROL;
    }
    if modifiers.alt {
        flags |= FLAG_ALTERNATE;
    }
    if modifiers.meta {
        flags |= FLAG_COMMAND;
    }
    flags
}

// ---------------------------------------------------------------------------
// Public struct
// ---------------------------------------------------------------------------

/// Stateless: every post creates its own source and event and releases them.
pub struct MacOSExecutor;

impl MacOSExecutor {
    pub fn new() -> Self {
        MacOSExecutor
    }

    /// Creates, stamps, posts and releases one keyboard event.
    fn post(
        &self,
        vk: u16,
        key_down: bool,
        flags: u64,
        text: Option<&[u16]>,
    ) -> Result<(), PlatformError> {
        unsafe {
            let source = CGEventSourceCreate(CG_EVENT_SOURCE_STATE_PRIVATE);
            if source.is_null() {
                return Err(PlatformError::Other(
                    "no event source for injection".into(),
                ));
            }

            let event = CGEventCreateKeyboardEvent(source, vk, key_down);
            if event.is_null() {
                CFRelease(source.cast::<c_void>());
                return Err(PlatformError::Other(
                    format!("could not create key event for vk {vk:#04x}"),
                ));
            }

            CGEventSetFlags(event, flags);
            if let Some(units) = text {
                CGEventKeyboardSetUnicodeString(event, units.len(), units.as_ptr());
            }
            CGEventSetIntegerValueField(event, CG_EVENT_SOURCE_USER_DATA, guard::stamp());
            CGEventPost(CG_HID_EVENT_TAP, event);

            CFRelease(event.cast::<c_void>());
            CFRelease(source.cast::<c_void>());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ActionExecutor trait impl
// ---------------------------------------------------------------------------

impl ActionExecutor for MacOSExecutor {
    fn post_keys(&self, strokes: &[KeyStroke], held: Modifiers) -> Result<(), PlatformError> {
        for stroke in strokes {
            let Some(vk) = keycode_to_vkcode(stroke.key) else {
                log::debug!("executor: no macOS key code for {}, skipping", stroke.key);
                continue;
            };
            let flags = flags_for(stroke.modifiers.union(held));
            self.post(vk, true, flags, None)?;
            self.post(vk, false, flags, None)?;
        }
        log::trace!(
            "executor: posted {} strokes with {:?}",
            strokes.len(),
            modifiers_from_flags(flags_for(held))
        );
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), PlatformError> {
        let mut buf = [0u16; 2];
        for ch in text.chars() {
            let units = ch.encode_utf16(&mut buf);
            self.post(TEXT_CARRIER_VK, true, 0, Some(units))?;
            self.post(TEXT_CARRIER_VK, false, 0, Some(units))?;
        }
        Ok(())
    }

    fn select_input_source(&self, source_id: &str) -> Result<(), PlatformError> {
        input_source::queue_select(source_id.to_owned());
        Ok(())
    }

    fn toggle_chord_lock(&self) -> Result<(), PlatformError> {
        unsafe {
            let matching = IOServiceMatching(b"IOHIDSystem\0".as_ptr().cast());
            if matching.is_null() {
                return Err(PlatformError::Unavailable(
                    "IOServiceMatching(IOHIDSystem) returned null".into(),
                ));
            }
            // IOServiceGetMatchingService consumes `matching`.
            let service = IOServiceGetMatchingService(0, matching);
            if service == 0 {
                return Err(PlatformError::Unavailable("IOHIDSystem service not found".into()));
            }

            let mut connect: u32 = 0;
            let kr = IOServiceOpen(service, mach_task_self_, KIO_HID_PARAM_CONNECT_TYPE, &mut connect);
            IOObjectRelease(service);
            if kr != 0 {
                return Err(PlatformError::Other(format!("IOServiceOpen failed: {kr:#x}")));
            }

            let mut current = false;
            let mut kr = IOHIDGetModifierLockState(connect, KIO_HID_CAPS_LOCK_STATE, &mut current);
            if kr == 0 {
                kr = IOHIDSetModifierLockState(connect, KIO_HID_CAPS_LOCK_STATE, !current);
            }
            IOServiceClose(connect);

            if kr != 0 {
                return Err(PlatformError::Other(format!(
                    "IOHID modifier lock state call failed: {kr:#x}"
                )));
            }
            log::debug!("executor: CapsLock {} -> {}", current, !current);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
