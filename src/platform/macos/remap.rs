//! CapsLock -> F18 remap below the event tap, via `hidutil`.
//!
//! macOS reports CapsLock to taps only as a lock-state `FlagsChanged`, with no
//! usable press/release edge. Remapping it to F18 in the HID layer gives the
//! tap ordinary key-down/key-up events. The mapping is process-global and
//! outlives us, so it is always reverted on shutdown.

use std::process::Command;

use crate::platform::PlatformError;

/// HID usage page 7 (keyboard), usage 0x39: Caps Lock.
pub const HID_CAPS_LOCK: u64 = 0x7_0000_0039;
/// HID usage page 7 (keyboard), usage 0x6D: F18.
pub const HID_F18: u64 = 0x7_0000_006D;

const HIDUTIL: &str = "hidutil";

/// `UserKeyMapping` payload that sends Caps Lock to F18.
pub fn apply_payload() -> String {
    format!(
        r#"{{"UserKeyMapping":[{{"HIDKeyboardModifierMappingSrc":0x{HID_CAPS_LOCK:X},"HIDKeyboardModifierMappingDst":0x{HID_F18:X}}}]}}"#
    )
}

pub const REVERT_PAYLOAD: &str = r#"{"UserKeyMapping":[]}"#;

fn hidutil_set(payload: &str) -> Result<(), PlatformError> {
    let output = Command::new(HIDUTIL)
        .args(["property", "--set", payload])
        .output()
        .map_err(|e| PlatformError::Unavailable(format!("failed to run {HIDUTIL}: {e}")))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(PlatformError::Other(format!(
            "{HIDUTIL} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Active remap. Reverted on `revert()` or drop, whichever comes first.
#[derive(Debug)]
pub struct HardwareRemap {
    active: bool,
}

impl HardwareRemap {
    pub fn apply() -> Result<Self, PlatformError> {
        hidutil_set(&apply_payload())?;
        log::info!("remap: CapsLock -> F18 installed");
        Ok(Self { active: true })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn revert(&mut self) -> Result<(), PlatformError> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        hidutil_set(REVERT_PAYLOAD)?;
        log::info!("remap: CapsLock mapping restored");
        Ok(())
    }
}

impl Drop for HardwareRemap {
    fn drop(&mut self) {
        if let Err(e) = self.revert() {
            log::warn!("remap: failed to restore CapsLock mapping: {e}");
        }
    }
}
