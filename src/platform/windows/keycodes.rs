//! Windows virtual key code (u16) <-> KeyCode mapping.
//!
//! The canonical key space was defined after the Windows VK table, so almost
//! every key maps to itself. The exceptions are the left/right modifier
//! variants (VK_LSHIFT, VK_RCONTROL, ...) which collapse onto the generic
//! modifier on capture, and the extended-key flag needed for injection.

use crate::keycode::KeyCode;

/// `KEYEVENTF_EXTENDEDKEY`: set in `KEYBDINPUT.dwFlags` for extended keys.
pub const EXTENDED: u32 = 0x0001;

/// Canonical codes with a VK of the same value, besides the letter, digit and
/// function-key ranges.
const NAMED: &[KeyCode] = &[
    KeyCode::BACKSPACE,
    KeyCode::TAB,
    KeyCode::ENTER,
    KeyCode::SHIFT,
    KeyCode::CTRL,
    KeyCode::ALT,
    KeyCode::PAUSE,
    KeyCode::CAPS_LOCK,
    KeyCode::ESCAPE,
    KeyCode::SPACE,
    KeyCode::PAGE_UP,
    KeyCode::PAGE_DOWN,
    KeyCode::END,
    KeyCode::HOME,
    KeyCode::LEFT,
    KeyCode::UP,
    KeyCode::RIGHT,
    KeyCode::DOWN,
    KeyCode::PRINT_SCREEN,
    KeyCode::INSERT,
    KeyCode::DELETE,
    KeyCode::META,
    KeyCode::NUMPAD_0,
    KeyCode::NUMPAD_1,
    KeyCode::NUMPAD_2,
    KeyCode::NUMPAD_3,
    KeyCode::NUMPAD_4,
    KeyCode::NUMPAD_5,
    KeyCode::NUMPAD_6,
    KeyCode::NUMPAD_7,
    KeyCode::NUMPAD_8,
    KeyCode::NUMPAD_9,
    KeyCode::NUMPAD_MUL,
    KeyCode::NUMPAD_ADD,
    KeyCode::NUMPAD_SUB,
    KeyCode::NUMPAD_DECIMAL,
    KeyCode::NUMPAD_DIV,
    KeyCode::NUM_LOCK,
    KeyCode::SCROLL_LOCK,
    KeyCode::SEMICOLON,
    KeyCode::EQUAL,
    KeyCode::COMMA,
    KeyCode::MINUS,
    KeyCode::PERIOD,
    KeyCode::SLASH,
    KeyCode::BACKTICK,
    KeyCode::LEFT_BRACKET,
    KeyCode::BACKSLASH,
    KeyCode::RIGHT_BRACKET,
    KeyCode::APOSTROPHE,
];

/// Keys that need `KEYEVENTF_EXTENDEDKEY` when injected.
const EXTENDED_KEYS: &[KeyCode] = &[
    KeyCode::INSERT,
    KeyCode::DELETE,
    KeyCode::HOME,
    KeyCode::END,
    KeyCode::PAGE_UP,
    KeyCode::PAGE_DOWN,
    KeyCode::LEFT,
    KeyCode::UP,
    KeyCode::RIGHT,
    KeyCode::DOWN,
    KeyCode::NUMPAD_DIV,
    KeyCode::NUM_LOCK,
    KeyCode::PRINT_SCREEN,
    KeyCode::META,
];

fn is_mapped(key: KeyCode) -> bool {
    matches!(key.code(),
        0x30..=0x39 // digits
        | 0x41..=0x5A // letters
        | 0x70..=0x87 // F1-F24
    ) || NAMED.contains(&key)
}

/// Converts a Windows virtual key code to a canonical `KeyCode`,
/// `KeyCode::UNKNOWN` when unmapped (media keys, IME keys, mouse buttons).
pub fn vkcode_to_keycode(vk: u16) -> KeyCode {
    match vk {
        0xA0 | 0xA1 => KeyCode::SHIFT,
        0xA2 | 0xA3 => KeyCode::CTRL,
        0xA4 | 0xA5 => KeyCode::ALT,
        0x5C => KeyCode::META, // VK_RWIN
        _ if is_mapped(KeyCode(vk)) => KeyCode(vk),
        _ => KeyCode::UNKNOWN,
    }
}

/// Converts a canonical `KeyCode` to `(vk, extra_flags)` for `SendInput`.
pub fn keycode_to_vkcode(key: KeyCode) -> Option<(u16, u32)> {
    if !is_mapped(key) {
        return None;
    }
    let flags = if EXTENDED_KEYS.contains(&key) {
        EXTENDED
    } else {
        0
    };
    Some((key.code(), flags))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
