//! Canonical key code space shared by the engine and the configuration layer.
//!
//! Codes are the numeric JavaScript `keyCode` values the configuration UI
//! records (`H` = 72, `,` = 188). Platform backends translate their native
//! codes into this space in `platform::<os>::keycodes`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A key in the canonical code space.
///
/// `KeyCode::UNKNOWN` is the sentinel produced for native codes that have no
/// canonical equivalent. It never matches a table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub const UNKNOWN: KeyCode = KeyCode(0);

    // Letters
    pub const A: KeyCode = KeyCode(65);
    pub const B: KeyCode = KeyCode(66);
    pub const C: KeyCode = KeyCode(67);
    pub const D: KeyCode = KeyCode(68);
    pub const E: KeyCode = KeyCode(69);
    pub const F: KeyCode = KeyCode(70);
    pub const G: KeyCode = KeyCode(71);
    pub const H: KeyCode = KeyCode(72);
    pub const I: KeyCode = KeyCode(73);
    pub const J: KeyCode = KeyCode(74);
    pub const K: KeyCode = KeyCode(75);
    pub const L: KeyCode = KeyCode(76);
    pub const M: KeyCode = KeyCode(77);
    pub const N: KeyCode = KeyCode(78);
    pub const O: KeyCode = KeyCode(79);
    pub const P: KeyCode = KeyCode(80);
    pub const Q: KeyCode = KeyCode(81);
    pub const R: KeyCode = KeyCode(82);
    pub const S: KeyCode = KeyCode(83);
    pub const T: KeyCode = KeyCode(84);
    pub const U: KeyCode = KeyCode(85);
    pub const V: KeyCode = KeyCode(86);
    pub const W: KeyCode = KeyCode(87);
    pub const X: KeyCode = KeyCode(88);
    pub const Y: KeyCode = KeyCode(89);
    pub const Z: KeyCode = KeyCode(90);

    // Top-row digits
    pub const KEY_0: KeyCode = KeyCode(48);
    pub const KEY_1: KeyCode = KeyCode(49);
    pub const KEY_2: KeyCode = KeyCode(50);
    pub const KEY_3: KeyCode = KeyCode(51);
    pub const KEY_4: KeyCode = KeyCode(52);
    pub const KEY_5: KeyCode = KeyCode(53);
    pub const KEY_6: KeyCode = KeyCode(54);
    pub const KEY_7: KeyCode = KeyCode(55);
    pub const KEY_8: KeyCode = KeyCode(56);
    pub const KEY_9: KeyCode = KeyCode(57);

    // Function keys (F1 = 112 .. F24 = 135)
    pub const F1: KeyCode = KeyCode(112);
    pub const F2: KeyCode = KeyCode(113);
    pub const F3: KeyCode = KeyCode(114);
    pub const F4: KeyCode = KeyCode(115);
    pub const F5: KeyCode = KeyCode(116);
    pub const F6: KeyCode = KeyCode(117);
    pub const F7: KeyCode = KeyCode(118);
    pub const F8: KeyCode = KeyCode(119);
    pub const F9: KeyCode = KeyCode(120);
    pub const F10: KeyCode = KeyCode(121);
    pub const F11: KeyCode = KeyCode(122);
    pub const F12: KeyCode = KeyCode(123);
    pub const F13: KeyCode = KeyCode(124);
    pub const F14: KeyCode = KeyCode(125);
    pub const F15: KeyCode = KeyCode(126);
    pub const F16: KeyCode = KeyCode(127);
    pub const F17: KeyCode = KeyCode(128);
    pub const F18: KeyCode = KeyCode(129);
    pub const F19: KeyCode = KeyCode(130);
    pub const F20: KeyCode = KeyCode(131);
    pub const F21: KeyCode = KeyCode(132);
    pub const F22: KeyCode = KeyCode(133);
    pub const F23: KeyCode = KeyCode(134);
    pub const F24: KeyCode = KeyCode(135);

    // Modifiers (left and right share one code)
    pub const SHIFT: KeyCode = KeyCode(16);
    pub const CTRL: KeyCode = KeyCode(17);
    pub const ALT: KeyCode = KeyCode(18);
    pub const META: KeyCode = KeyCode(91);

    // Navigation and editing
    pub const BACKSPACE: KeyCode = KeyCode(8);
    pub const TAB: KeyCode = KeyCode(9);
    pub const ENTER: KeyCode = KeyCode(13);
    pub const ESCAPE: KeyCode = KeyCode(27);
    pub const SPACE: KeyCode = KeyCode(32);
    pub const PAGE_UP: KeyCode = KeyCode(33);
    pub const PAGE_DOWN: KeyCode = KeyCode(34);
    pub const END: KeyCode = KeyCode(35);
    pub const HOME: KeyCode = KeyCode(36);
    pub const LEFT: KeyCode = KeyCode(37);
    pub const UP: KeyCode = KeyCode(38);
    pub const RIGHT: KeyCode = KeyCode(39);
    pub const DOWN: KeyCode = KeyCode(40);
    pub const INSERT: KeyCode = KeyCode(45);
    pub const DELETE: KeyCode = KeyCode(46);

    // Lock and system keys
    pub const PAUSE: KeyCode = KeyCode(19);
    pub const CAPS_LOCK: KeyCode = KeyCode(20);
    pub const PRINT_SCREEN: KeyCode = KeyCode(44);
    pub const NUM_LOCK: KeyCode = KeyCode(144);
    pub const SCROLL_LOCK: KeyCode = KeyCode(145);

    // Numeric keypad
    pub const NUMPAD_0: KeyCode = KeyCode(96);
    pub const NUMPAD_1: KeyCode = KeyCode(97);
    pub const NUMPAD_2: KeyCode = KeyCode(98);
    pub const NUMPAD_3: KeyCode = KeyCode(99);
    pub const NUMPAD_4: KeyCode = KeyCode(100);
    pub const NUMPAD_5: KeyCode = KeyCode(101);
    pub const NUMPAD_6: KeyCode = KeyCode(102);
    pub const NUMPAD_7: KeyCode = KeyCode(103);
    pub const NUMPAD_8: KeyCode = KeyCode(104);
    pub const NUMPAD_9: KeyCode = KeyCode(105);
    pub const NUMPAD_MUL: KeyCode = KeyCode(106);
    pub const NUMPAD_ADD: KeyCode = KeyCode(107);
    pub const NUMPAD_SUB: KeyCode = KeyCode(109);
    pub const NUMPAD_DECIMAL: KeyCode = KeyCode(110);
    pub const NUMPAD_DIV: KeyCode = KeyCode(111);

    // Punctuation / symbol keys (US ANSI positions)
    pub const SEMICOLON: KeyCode = KeyCode(186);
    pub const EQUAL: KeyCode = KeyCode(187);
    pub const COMMA: KeyCode = KeyCode(188);
    pub const MINUS: KeyCode = KeyCode(189);
    pub const PERIOD: KeyCode = KeyCode(190);
    pub const SLASH: KeyCode = KeyCode(191);
    pub const BACKTICK: KeyCode = KeyCode(192);
    pub const LEFT_BRACKET: KeyCode = KeyCode(219);
    pub const BACKSLASH: KeyCode = KeyCode(220);
    pub const RIGHT_BRACKET: KeyCode = KeyCode(221);
    pub const APOSTROPHE: KeyCode = KeyCode(222);

    pub const fn code(self) -> u16 {
        self.0
    }

    pub const fn is_unknown(self) -> bool {
        self.0 == KeyCode::UNKNOWN.0
    }
}

impl From<u16> for KeyCode {
    fn from(code: u16) -> Self {
        KeyCode(code)
    }
}

impl fmt::Display for KeyCode {
    /// Short human-readable label used in logs and console listings.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.0;
        match code {
            48..=57 | 65..=90 => write!(f, "{}", char::from(code as u8)),
            112..=135 => write!(f, "F{}", code - 111),
            0 => f.write_str("Unknown"),
            _ => {
                let label = match *self {
                    KeyCode::BACKSPACE => "Backspace",
                    KeyCode::TAB => "Tab",
                    KeyCode::ENTER => "Enter",
                    KeyCode::SHIFT => "Shift",
                    KeyCode::CTRL => "Ctrl",
                    KeyCode::ALT => "Alt",
                    KeyCode::META => "Meta",
                    KeyCode::CAPS_LOCK => "CapsLock",
                    KeyCode::ESCAPE => "Esc",
                    KeyCode::SPACE => "Space",
                    KeyCode::LEFT => "Left",
                    KeyCode::UP => "Up",
                    KeyCode::RIGHT => "Right",
                    KeyCode::DOWN => "Down",
                    KeyCode::HOME => "Home",
                    KeyCode::END => "End",
                    KeyCode::SEMICOLON => ";",
                    KeyCode::EQUAL => "=",
                    KeyCode::COMMA => ",",
                    KeyCode::MINUS => "-",
                    KeyCode::PERIOD => ".",
                    KeyCode::SLASH => "/",
                    KeyCode::BACKTICK => "`",
                    KeyCode::LEFT_BRACKET => "[",
                    KeyCode::BACKSLASH => "\\",
                    KeyCode::RIGHT_BRACKET => "]",
                    KeyCode::APOSTROPHE => "'",
                    _ => return write!(f, "Key{code}"),
                };
                f.write_str(label)
            }
        }
    }
}

/// Edge of a keyboard event as seen by the capture backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Down,
    Up,
    /// A modifier or lock key changed state (macOS `FlagsChanged`). Carries no
    /// press/release direction.
    FlagsChanged,
}

/// Modifier keys held while an event was generated, or applied to a
/// synthesized keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: false,
        meta: false,
    };
    pub const CTRL: Modifiers = Modifiers {
        ctrl: true,
        ..Modifiers::NONE
    };
    pub const ALT: Modifiers = Modifiers {
        alt: true,
        ..Modifiers::NONE
    };
    pub const META: Modifiers = Modifiers {
        meta: true,
        ..Modifiers::NONE
    };

    pub const fn is_empty(self) -> bool {
        !(self.shift || self.ctrl || self.alt || self.meta)
    }

    pub const fn union(self, other: Modifiers) -> Modifiers {
        Modifiers {
            shift: self.shift || other.shift,
            ctrl: self.ctrl || other.ctrl,
            alt: self.alt || other.alt,
            meta: self.meta || other.meta,
        }
    }

    /// Modifiers present in `self` but not in `other`.
    pub const fn without(self, other: Modifiers) -> Modifiers {
        Modifiers {
            shift: self.shift && !other.shift,
            ctrl: self.ctrl && !other.ctrl,
            alt: self.alt && !other.alt,
            meta: self.meta && !other.meta,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
