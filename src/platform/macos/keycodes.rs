//! macOS virtual key code (CGKeyCode, u16) <-> KeyCode mapping.
//!
//! Key codes are physical key positions per Apple HIToolbox/Events.h, which
//! assume an ANSI layout. Right-hand modifiers and a few alias keys are
//! accepted on capture but never produced for injection.

use crate::keycode::KeyCode;

/// Primary pairs. Both directions use these.
const KEYS: &[(u16, KeyCode)] = &[
    // Letters
    (0x00, KeyCode::A),
    (0x0B, KeyCode::B),
    (0x08, KeyCode::C),
    (0x02, KeyCode::D),
    (0x0E, KeyCode::E),
    (0x03, KeyCode::F),
    (0x05, KeyCode::G),
    (0x04, KeyCode::H),
    (0x22, KeyCode::I),
    (0x26, KeyCode::J),
    (0x28, KeyCode::K),
    (0x25, KeyCode::L),
    (0x2E, KeyCode::M),
    (0x2D, KeyCode::N),
    (0x1F, KeyCode::O),
    (0x23, KeyCode::P),
    (0x0C, KeyCode::Q),
    (0x0F, KeyCode::R),
    (0x01, KeyCode::S),
    (0x11, KeyCode::T),
    (0x20, KeyCode::U),
    (0x09, KeyCode::V),
    (0x0D, KeyCode::W),
    (0x07, KeyCode::X),
    (0x10, KeyCode::Y),
    (0x06, KeyCode::Z),
    // Top-row digits
    (0x1D, KeyCode::KEY_0),
    (0x12, KeyCode::KEY_1),
    (0x13, KeyCode::KEY_2),
    (0x14, KeyCode::KEY_3),
    (0x15, KeyCode::KEY_4),
    (0x17, KeyCode::KEY_5),
    (0x16, KeyCode::KEY_6),
    (0x1A, KeyCode::KEY_7),
    (0x1C, KeyCode::KEY_8),
    (0x19, KeyCode::KEY_9),
    // Function keys. F21-F24 have no macOS virtual key code.
    (0x7A, KeyCode::F1),
    (0x78, KeyCode::F2),
    (0x63, KeyCode::F3),
    (0x76, KeyCode::F4),
    (0x60, KeyCode::F5),
    (0x61, KeyCode::F6),
    (0x62, KeyCode::F7),
    (0x64, KeyCode::F8),
    (0x65, KeyCode::F9),
    (0x6D, KeyCode::F10),
    (0x67, KeyCode::F11),
    (0x6F, KeyCode::F12),
    (0x69, KeyCode::F13),
    (0x6B, KeyCode::F14),
    (0x71, KeyCode::F15),
    (0x6A, KeyCode::F16),
    (0x40, KeyCode::F17),
    // CapsLock arrives here once `remap` is installed.
    (0x4F, KeyCode::F18),
    (0x50, KeyCode::F19),
    (0x5A, KeyCode::F20),
    // Modifiers (left-hand)
    (0x3B, KeyCode::CTRL),
    (0x38, KeyCode::SHIFT),
    (0x3A, KeyCode::ALT),
    (0x37, KeyCode::META),
    // Navigation and editing
    (0x31, KeyCode::SPACE),
    (0x24, KeyCode::ENTER),
    (0x30, KeyCode::TAB),
    (0x35, KeyCode::ESCAPE),
    (0x33, KeyCode::BACKSPACE), // kVK_Delete
    (0x75, KeyCode::DELETE),    // kVK_ForwardDelete
    (0x72, KeyCode::INSERT),    // kVK_Help
    (0x73, KeyCode::HOME),
    (0x77, KeyCode::END),
    (0x74, KeyCode::PAGE_UP),
    (0x79, KeyCode::PAGE_DOWN),
    (0x7E, KeyCode::UP),
    (0x7D, KeyCode::DOWN),
    (0x7B, KeyCode::LEFT),
    (0x7C, KeyCode::RIGHT),
    // Lock keys
    (0x39, KeyCode::CAPS_LOCK),
    (0x47, KeyCode::NUM_LOCK), // kVK_ANSI_KeypadClear
    // Numeric keypad
    (0x52, KeyCode::NUMPAD_0),
    (0x53, KeyCode::NUMPAD_1),
    (0x54, KeyCode::NUMPAD_2),
    (0x55, KeyCode::NUMPAD_3),
    (0x56, KeyCode::NUMPAD_4),
    (0x57, KeyCode::NUMPAD_5),
    (0x58, KeyCode::NUMPAD_6),
    (0x59, KeyCode::NUMPAD_7),
    (0x5B, KeyCode::NUMPAD_8),
    (0x5C, KeyCode::NUMPAD_9),
    (0x45, KeyCode::NUMPAD_ADD),
    (0x4E, KeyCode::NUMPAD_SUB),
    (0x43, KeyCode::NUMPAD_MUL),
    (0x4B, KeyCode::NUMPAD_DIV),
    (0x41, KeyCode::NUMPAD_DECIMAL),
    // Punctuation
    (0x32, KeyCode::BACKTICK),
    (0x1B, KeyCode::MINUS),
    (0x18, KeyCode::EQUAL),
    (0x21, KeyCode::LEFT_BRACKET),
    (0x1E, KeyCode::RIGHT_BRACKET),
    (0x2A, KeyCode::BACKSLASH),
    (0x29, KeyCode::SEMICOLON),
    (0x27, KeyCode::APOSTROPHE),
    (0x2B, KeyCode::COMMA),
    (0x2F, KeyCode::PERIOD),
    (0x2C, KeyCode::SLASH),
];

/// Capture-only aliases.
const CAPTURE_ALIASES: &[(u16, KeyCode)] = &[
    (0x3E, KeyCode::CTRL),
    (0x3C, KeyCode::SHIFT),
    (0x3D, KeyCode::ALT),
    (0x36, KeyCode::META),
    (0x4C, KeyCode::ENTER), // kVK_ANSI_KeypadEnter
];

/// Injection-only aliases: PC keys that extended Apple keyboards put on F13-F15.
const INJECT_ALIASES: &[(KeyCode, u16)] = &[
    (KeyCode::PRINT_SCREEN, 0x69),
    (KeyCode::SCROLL_LOCK, 0x6B),
    (KeyCode::PAUSE, 0x71),
];

/// Converts a CGKeyCode to a canonical `KeyCode`, `KeyCode::UNKNOWN` when
/// unmapped (media keys, JIS-only keys).
pub fn vkcode_to_keycode(vk: u16) -> KeyCode {
    KEYS.iter()
        .chain(CAPTURE_ALIASES)
        .find(|&&(code, _)| code == vk)
        .map_or(KeyCode::UNKNOWN, |&(_, key)| key)
}

/// Converts a canonical `KeyCode` to the CGKeyCode used for injection.
pub fn keycode_to_vkcode(key: KeyCode) -> Option<u16> {
    KEYS.iter()
        .find(|&&(_, k)| k == key)
        .map(|&(vk, _)| vk)
        .or_else(|| {
            INJECT_ALIASES
                .iter()
                .find(|&&(k, _)| k == key)
                .map(|&(_, vk)| vk)
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
