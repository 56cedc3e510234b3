//! The closed set of actions a chord can trigger.
//!
//! The serde representation is the configuration wire format:
//! `{ kind = "jump", direction = "up", count = 10 }`.

use serde::{Deserialize, Serialize};

use crate::table::MappingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directional {
    Left,
    Right,
    Up,
    Down,
    WordForward,
    WordBack,
    Home,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Independent {
    Backspace,
    NextLine,
    InsertQuotes,
}

/// Number of arrow taps a jump emits. Always within `1..=99`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u8")]
pub struct JumpCount(u8);

impl JumpCount {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 99;

    /// Clamps `count` into `MIN..=MAX`.
    pub fn new(count: u32) -> Self {
        JumpCount(count.clamp(Self::MIN as u32, Self::MAX as u32) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl From<u32> for JumpCount {
    fn from(count: u32) -> Self {
        JumpCount::new(count)
    }
}

impl From<JumpCount> for u8 {
    fn from(count: JumpCount) -> u8 {
        count.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Directional { action: Directional },
    Jump { direction: JumpDirection, count: JumpCount },
    Independent { action: Independent },
    InputSource { input_source_id: String },
    Command { command: String },
}

impl Action {
    pub fn directional(action: Directional) -> Self {
        Action::Directional { action }
    }

    pub fn jump(direction: JumpDirection, count: u32) -> Self {
        Action::Jump {
            direction,
            count: JumpCount::new(count),
        }
    }

    pub fn independent(action: Independent) -> Self {
        Action::Independent { action }
    }

    /// Builds an input-source switch. The identifier is matched exactly by the
    /// OS, so only emptiness is checked.
    pub fn input_source(input_source_id: impl Into<String>) -> Result<Self, MappingError> {
        let action = Action::InputSource {
            input_source_id: input_source_id.into(),
        };
        action.validate()?;
        Ok(action)
    }

    pub fn command(command: impl Into<String>) -> Result<Self, MappingError> {
        let action = Action::Command {
            command: command.into(),
        };
        action.validate()?;
        Ok(action)
    }

    /// Rejects actions that could not be dispatched. Values deserialized from
    /// the wire skip the constructors above, so the table calls this again on
    /// every insert.
    pub fn validate(&self) -> Result<(), MappingError> {
        match self {
            Action::InputSource { input_source_id } if input_source_id.trim().is_empty() => Err(
                MappingError::InvalidAction("input_source_id cannot be empty".into()),
            ),
            Action::Command { command } if command.trim().is_empty() => Err(
                MappingError::InvalidAction("command cannot be empty".into()),
            ),
            _ => Ok(()),
        }
    }

    /// Short kind label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Directional { .. } => "directional",
            Action::Jump { .. } => "jump",
            Action::Independent { .. } => "independent",
            Action::InputSource { .. } => "input_source",
            Action::Command { .. } => "command",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jump_count_is_clamped() {
        assert_eq!(JumpCount::new(150).get(), 99);
        assert_eq!(JumpCount::new(0).get(), 1);
        assert_eq!(JumpCount::new(10).get(), 10);
        assert_eq!(
            Action::jump(JumpDirection::Down, 150),
            Action::Jump {
                direction: JumpDirection::Down,
                count: JumpCount::new(99)
            }
        );
    }

    #[test]
    fn deserialized_jump_count_is_clamped() {
        let action: Action =
            toml::from_str("kind = 'jump'\ndirection = 'up'\ncount = 150").unwrap();
        assert_eq!(action, Action::jump(JumpDirection::Up, 99));

        let action: Action = toml::from_str("kind = 'jump'\ndirection = 'up'\ncount = 0").unwrap();
        assert_eq!(action, Action::jump(JumpDirection::Up, 1));
    }

    #[test]
    fn empty_strings_are_rejected() {
        assert!(matches!(
            Action::command("   "),
            Err(MappingError::InvalidAction(_))
        ));
        assert!(matches!(
            Action::input_source(""),
            Err(MappingError::InvalidAction(_))
        ));
        assert!(Action::command("open -a Calculator").is_ok());
        assert!(Action::input_source("com.apple.keylayout.ABC").is_ok());
    }

    #[test]
    fn wire_format_uses_kind_tag() {
        let action: Action =
            toml::from_str("kind = 'directional'\naction = 'word_forward'").unwrap();
        assert_eq!(action, Action::directional(Directional::WordForward));

        let action: Action =
            toml::from_str("kind = 'input_source'\ninput_source_id = 'com.apple.keylayout.ABC'")
                .unwrap();
        assert_eq!(action.kind(), "input_source");

        let rendered = toml::to_string(&Action::independent(Independent::NextLine)).unwrap();
        assert!(rendered.contains("kind = \"independent\""));
        assert!(rendered.contains("action = \"next_line\""));
    }
}
