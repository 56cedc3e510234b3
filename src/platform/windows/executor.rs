//! Windows action executor via SendInput.
//!
//! Every `KEYBDINPUT` carries `guard::stamp()` in `dwExtraInfo`, which the
//! low-level hook reads back so the engine passes our own events through.
//! Injection is synchronous: `SendInput` returns after the batch is queued.

use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYEVENTF_KEYUP, KEYEVENTF_UNICODE,
    VK_CAPITAL,
};

use super::keycodes::keycode_to_vkcode;
use crate::guard;
use crate::keycode::{KeyCode, Modifiers};
use crate::platform::{ActionExecutor, KeyStroke, PlatformError};

fn key_input(vk: u16, scan: u16, flags: u32) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk,
                wScan: scan,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: guard::stamp() as usize,
            },
        },
    }
}

/// Modifier keys in press order. Released in reverse.
fn modifier_keys(modifiers: Modifiers) -> Vec<KeyCode> {
    let mut keys = Vec::with_capacity(4);
    if modifiers.ctrl {
        keys.push(KeyCode::CTRL);
    }
    if modifiers.alt {
        keys.push(KeyCode::ALT);
    }
    if modifiers.shift {
        keys.push(KeyCode::SHIFT);
    }
    if modifiers.meta {
        keys.push(KeyCode::META);
    }
    keys
}

/// `(vk, flags)` pairs for one stroke: missing modifiers down, key down,
/// key up, modifiers up. Modifiers in `held` are already down and untouched.
fn stroke_sequence(stroke: &KeyStroke, held: Modifiers) -> Option<Vec<(u16, u32)>> {
    let (vk, flags) = keycode_to_vkcode(stroke.key)?;
    let pressed: Vec<(u16, u32)> = modifier_keys(stroke.modifiers.without(held))
        .into_iter()
        .filter_map(keycode_to_vkcode)
        .collect();

    let mut seq = Vec::with_capacity(pressed.len() * 2 + 2);
    seq.extend(pressed.iter().copied());
    seq.push((vk, flags));
    seq.push((vk, flags | KEYEVENTF_KEYUP));
    seq.extend(pressed.iter().rev().map(|&(v, f)| (v, f | KEYEVENTF_KEYUP)));
    Some(seq)
}

pub struct WindowsExecutor;

impl WindowsExecutor {
    pub fn new() -> Self {
        WindowsExecutor
    }

    fn send(&self, inputs: &[INPUT]) -> Result<(), PlatformError> {
        if inputs.is_empty() {
            return Ok(());
        }
        let sent = unsafe {
            SendInput(
                inputs.len() as u32,
                inputs.as_ptr(),
                std::mem::size_of::<INPUT>() as i32,
            )
        };
        if sent as usize != inputs.len() {
            // Blocked by UIPI when the foreground window runs elevated.
            return Err(PlatformError::Other(format!(
                "SendInput queued {sent} of {} events",
                inputs.len()
            )));
        }
        Ok(())
    }
}

impl ActionExecutor for WindowsExecutor {
    fn post_keys(&self, strokes: &[KeyStroke], held: Modifiers) -> Result<(), PlatformError> {
        let mut inputs = Vec::new();
        for stroke in strokes {
            match stroke_sequence(stroke, held) {
                Some(seq) => inputs.extend(seq.into_iter().map(|(vk, f)| key_input(vk, 0, f))),
                None => log::debug!("executor: no Windows VK code for {}, skipping", stroke.key),
            }
        }
        self.send(&inputs)?;
        log::trace!("executor: sent {} inputs for {} strokes", inputs.len(), strokes.len());
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), PlatformError> {
        let inputs: Vec<INPUT> = text
            .encode_utf16()
            .flat_map(|unit| {
                [
                    key_input(0, unit, KEYEVENTF_UNICODE),
                    key_input(0, unit, KEYEVENTF_UNICODE | KEYEVENTF_KEYUP),
                ]
            })
            .collect();
        self.send(&inputs)
    }

    fn select_input_source(&self, source_id: &str) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported(format!(
            "input source switching ({source_id})"
        )))
    }

    /// Taps VK_CAPITAL. The stamp lets the tap pass it, so the OS toggles
    /// the lock normally.
    fn toggle_chord_lock(&self) -> Result<(), PlatformError> {
        self.send(&[
            key_input(VK_CAPITAL, 0, 0),
            key_input(VK_CAPITAL, 0, KEYEVENTF_KEYUP),
        ])?;
        log::debug!("executor: CapsLock toggled");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_stroke_is_press_release() {
        let seq = stroke_sequence(&KeyStroke::plain(KeyCode::BACKSPACE), Modifiers::NONE);
        assert_eq!(seq, Some(vec![(0x08, 0), (0x08, KEYEVENTF_KEYUP)]));
    }

    #[test]
    fn missing_modifiers_wrap_the_key() {
        let stroke = KeyStroke::new(KeyCode::LEFT, Modifiers::CTRL);
        let seq = stroke_sequence(&stroke, Modifiers::NONE).unwrap();
        assert_eq!(
            seq,
            vec![
                (0x11, 0),
                (0x25, 0x0001),
                (0x25, 0x0001 | KEYEVENTF_KEYUP),
                (0x11, KEYEVENTF_KEYUP),
            ]
        );
    }

    #[test]
    fn held_modifiers_are_not_pressed_again() {
        let stroke = KeyStroke::new(KeyCode::LEFT, Modifiers::CTRL);
        let seq = stroke_sequence(&stroke, Modifiers::CTRL).unwrap();
        assert_eq!(seq.len(), 2);
    }

    #[test]
    fn unmapped_key_has_no_sequence() {
        assert!(stroke_sequence(&KeyStroke::plain(KeyCode::UNKNOWN), Modifiers::NONE).is_none());
    }

    #[test]
    fn input_source_switch_is_unsupported() {
        let executor = WindowsExecutor::new();
        assert!(matches!(
            executor.select_input_source("com.apple.keylayout.US"),
            Err(PlatformError::Unsupported(_))
        ));
    }
}
