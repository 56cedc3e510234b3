//! The action table: `(trigger key, shift held)` -> `Action`.
//!
//! Rules enforced here rather than at the call sites:
//! - at most one action per `(key, with_shift)` pair;
//! - shift chords hold `command` actions only;
//! - an `input_source` can never shadow a reserved key's non-shift chord;
//! - empty identifiers and commands are rejected before the table changes.
//!
//! Resolution order for a keydown: explicit entry for the exact pair, then the
//! built-in default for reserved keys (non-shift only), then nothing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::action::{Action, Directional, Independent, JumpDirection};
use crate::keycode::KeyCode;

/// Default input-source bindings seeded on platforms that can switch sources.
pub const DEFAULT_INPUT_SOURCES: &[(KeyCode, &str)] = &[
    (KeyCode::COMMA, "com.apple.keylayout.ABC"),
    (KeyCode::PERIOD, "com.tencent.inputmethod.wetype.pinyin"),
];

/// Number of arrow taps the shipped jump bindings emit.
const DEFAULT_JUMP_COUNT: u32 = 10;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("reserved-key conflict: {0}")]
    ReservedKeyConflict(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("not found: no mapping for {key} (shift={with_shift})")]
    NotFound { key: KeyCode, with_shift: bool },
}

impl MappingError {
    /// The short reason string reported to the configuration surface.
    pub fn reason(&self) -> &'static str {
        match self {
            MappingError::ReservedKeyConflict(_) => "reserved-key conflict",
            MappingError::InvalidAction(_) => "invalid action",
            MappingError::NotFound { .. } => "not found",
        }
    }
}

/// One row of the table as exchanged with the configuration layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub key: KeyCode,
    #[serde(default)]
    pub with_shift: bool,
    pub action: Action,
}

impl MappingEntry {
    pub fn new(key: KeyCode, with_shift: bool, action: Action) -> Self {
        Self {
            key,
            with_shift,
            action,
        }
    }
}

/// Built-in action of a reserved key, used when the table has no explicit
/// non-shift entry for it.
pub fn builtin_action(key: KeyCode) -> Option<Action> {
    let action = match key {
        KeyCode::H => Action::directional(Directional::Left),
        KeyCode::J => Action::directional(Directional::Down),
        KeyCode::K => Action::directional(Directional::Up),
        KeyCode::L => Action::directional(Directional::Right),
        KeyCode::P => Action::directional(Directional::WordForward),
        KeyCode::Y => Action::directional(Directional::WordBack),
        KeyCode::A => Action::directional(Directional::Home),
        KeyCode::E => Action::directional(Directional::End),
        KeyCode::U => Action::jump(JumpDirection::Up, DEFAULT_JUMP_COUNT),
        KeyCode::D => Action::jump(JumpDirection::Down, DEFAULT_JUMP_COUNT),
        KeyCode::I => Action::independent(Independent::Backspace),
        KeyCode::N => Action::independent(Independent::InsertQuotes),
        KeyCode::O => Action::independent(Independent::NextLine),
        _ => return None,
    };
    Some(action)
}

pub fn is_reserved(key: KeyCode) -> bool {
    builtin_action(key).is_some()
}

const RESERVED_KEYS: [KeyCode; 13] = [
    KeyCode::H,
    KeyCode::J,
    KeyCode::K,
    KeyCode::L,
    KeyCode::P,
    KeyCode::Y,
    KeyCode::A,
    KeyCode::E,
    KeyCode::U,
    KeyCode::D,
    KeyCode::I,
    KeyCode::N,
    KeyCode::O,
];

/// Shipped bindings: every reserved key with its built-in action.
pub fn default_mappings() -> Vec<MappingEntry> {
    RESERVED_KEYS
        .iter()
        .filter_map(|&key| builtin_action(key).map(|action| MappingEntry::new(key, false, action)))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ActionTable {
    entries: HashMap<(KeyCode, bool), Action>,
}

impl ActionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-populated with `default_mappings()`.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        for entry in default_mappings() {
            table.entries.insert((entry.key, entry.with_shift), entry.action);
        }
        table
    }

    /// Builds a table from materialized entries. Later duplicates of a pair
    /// replace earlier ones; the first invalid entry aborts the build.
    pub fn from_entries(
        entries: impl IntoIterator<Item = MappingEntry>,
    ) -> Result<Self, MappingError> {
        let mut table = Self::new();
        for entry in entries {
            table.upsert(entry.key, entry.with_shift, entry.action)?;
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: KeyCode, with_shift: bool) -> Option<&Action> {
        self.entries.get(&(key, with_shift))
    }

    /// All entries, sorted by key then shift so listings are stable.
    pub fn entries(&self) -> Vec<MappingEntry> {
        let mut out: Vec<MappingEntry> = self
            .entries
            .iter()
            .map(|(&(key, with_shift), action)| MappingEntry::new(key, with_shift, action.clone()))
            .collect();
        out.sort_by_key(|e| (e.key, e.with_shift));
        out
    }

    /// Checks `action` against the reserved-key rules for `(key, with_shift)`.
    pub fn check(key: KeyCode, with_shift: bool, action: &Action) -> Result<(), MappingError> {
        action.validate()?;

        if key.is_unknown() {
            return Err(MappingError::InvalidAction("trigger key is unknown".into()));
        }

        if with_shift && !matches!(action, Action::Command { .. }) {
            return Err(MappingError::ReservedKeyConflict(format!(
                "Caps+Shift+{key} is reserved for commands, got {}",
                action.kind()
            )));
        }

        if !with_shift && is_reserved(key) && matches!(action, Action::InputSource { .. }) {
            return Err(MappingError::ReservedKeyConflict(format!(
                "Caps+{key} is a reserved navigation key and cannot switch input sources"
            )));
        }

        Ok(())
    }

    /// Inserts or replaces the action for `(key, with_shift)`.
    ///
    /// Returns `true` when the table changed. The table is untouched on error.
    pub fn upsert(
        &mut self,
        key: KeyCode,
        with_shift: bool,
        action: Action,
    ) -> Result<bool, MappingError> {
        Self::check(key, with_shift, &action)?;
        let previous = self.entries.insert((key, with_shift), action.clone());
        Ok(previous.as_ref() != Some(&action))
    }

    pub fn remove(&mut self, key: KeyCode, with_shift: bool) -> Result<Action, MappingError> {
        self.entries
            .remove(&(key, with_shift))
            .ok_or(MappingError::NotFound { key, with_shift })
    }

    /// Resolves the action for a keydown while the chord is held.
    pub fn resolve(&self, key: KeyCode, shift_held: bool) -> Option<Action> {
        if let Some(action) = self.entries.get(&(key, shift_held)) {
            return Some(action.clone());
        }
        if shift_held {
            return None;
        }
        builtin_action(key)
    }

    /// Inserts the factory input-source bindings for every key that has no
    /// entry at all yet, shifted or not. Returns how many were added.
    pub fn seed_input_sources(&mut self) -> usize {
        let mut added = 0;
        for &(key, source_id) in DEFAULT_INPUT_SOURCES {
            if self.entries.keys().any(|&(mapped, _)| mapped == key) {
                continue;
            }
            self.entries.insert(
                (key, false),
                Action::InputSource {
                    input_source_id: source_id.to_string(),
                },
            );
            added += 1;
        }
        added
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Action {
        Action::input_source("com.apple.keylayout.ABC").unwrap()
    }

    #[test]
    fn defaults_cover_every_reserved_key() {
        let table = ActionTable::with_defaults();
        assert_eq!(table.len(), 13);
        for key in RESERVED_KEYS {
            assert_eq!(table.get(key, false), builtin_action(key).as_ref());
        }
        assert_eq!(
            table.get(KeyCode::U, false),
            Some(&Action::jump(JumpDirection::Up, 10))
        );
    }

    #[test]
    fn upsert_replaces_existing_binding() {
        let mut table = ActionTable::with_defaults();
        let changed = table
            .upsert(KeyCode::A, false, Action::directional(Directional::Right))
            .unwrap();
        assert!(changed);
        assert_eq!(table.len(), 13);
        assert_eq!(
            table.get(KeyCode::A, false),
            Some(&Action::directional(Directional::Right))
        );

        let unchanged = table
            .upsert(KeyCode::A, false, Action::directional(Directional::Right))
            .unwrap();
        assert!(!unchanged);
    }

    #[test]
    fn input_source_on_plain_key_round_trips() {
        let mut table = ActionTable::new();
        table.upsert(KeyCode(188), false, abc()).unwrap();
        let entries = table.entries();
        assert_eq!(entries, vec![MappingEntry::new(KeyCode::COMMA, false, abc())]);
    }

    #[test]
    fn shift_chords_accept_commands_only() {
        let mut table = ActionTable::new();
        let err = table
            .upsert(KeyCode::M, true, Action::directional(Directional::Left))
            .unwrap_err();
        assert_eq!(err.reason(), "reserved-key conflict");

        let err = table.upsert(KeyCode::M, true, abc()).unwrap_err();
        assert_eq!(err.reason(), "reserved-key conflict");
        assert!(table.is_empty());

        table
            .upsert(KeyCode::M, true, Action::command("open -a Calculator").unwrap())
            .unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn reserved_keys_refuse_input_sources() {
        let mut table = ActionTable::with_defaults();
        let err = table.upsert(KeyCode::H, false, abc()).unwrap_err();
        assert!(matches!(err, MappingError::ReservedKeyConflict(_)));
        assert_eq!(
            table.get(KeyCode::H, false),
            Some(&Action::directional(Directional::Left))
        );
    }

    #[test]
    fn invalid_actions_leave_table_unchanged() {
        let mut table = ActionTable::with_defaults();
        let before = table.entries();
        let err = table
            .upsert(
                KeyCode::M,
                true,
                Action::Command {
                    command: "  ".into(),
                },
            )
            .unwrap_err();
        assert_eq!(err.reason(), "invalid action");
        let err = table
            .upsert(
                KeyCode::COMMA,
                false,
                Action::InputSource {
                    input_source_id: String::new(),
                },
            )
            .unwrap_err();
        assert_eq!(err.reason(), "invalid action");
        assert_eq!(table.entries(), before);
    }

    #[test]
    fn remove_missing_entry_is_not_found() {
        let mut table = ActionTable::new();
        let err = table.remove(KeyCode::Q, true).unwrap_err();
        assert_eq!(err.reason(), "not found");
    }

    #[test]
    fn resolution_prefers_explicit_entry_then_builtin() {
        let mut table = ActionTable::new();
        // No explicit entry: reserved key falls back to its built-in action.
        assert_eq!(
            table.resolve(KeyCode::H, false),
            Some(Action::directional(Directional::Left))
        );
        // Unreserved key without an entry resolves to nothing.
        assert_eq!(table.resolve(KeyCode::Q, false), None);

        table
            .upsert(KeyCode::H, false, Action::directional(Directional::Right))
            .unwrap();
        assert_eq!(
            table.resolve(KeyCode::H, false),
            Some(Action::directional(Directional::Right))
        );
    }

    #[test]
    fn shift_never_falls_back_to_non_shift_actions() {
        let mut table = ActionTable::with_defaults();
        table.upsert(KeyCode::COMMA, false, abc()).unwrap();

        for key in RESERVED_KEYS {
            assert_eq!(table.resolve(key, true), None, "Caps+Shift+{key}");
        }
        assert_eq!(table.resolve(KeyCode::COMMA, true), None);

        let cmd = Action::command("echo hi").unwrap();
        table.upsert(KeyCode::H, true, cmd.clone()).unwrap();
        assert_eq!(table.resolve(KeyCode::H, true), Some(cmd));
    }

    #[test]
    fn seeding_skips_keys_with_existing_mappings() {
        let mut table = ActionTable::new();
        table
            .upsert(KeyCode::COMMA, false, Action::command("true").unwrap())
            .unwrap();
        assert_eq!(table.seed_input_sources(), 1);
        assert_eq!(
            table.get(KeyCode::COMMA, false),
            Some(&Action::command("true").unwrap())
        );
        assert!(matches!(
            table.get(KeyCode::PERIOD, false),
            Some(Action::InputSource { .. })
        ));
        // Second pass is a no-op.
        assert_eq!(table.seed_input_sources(), 0);
    }

    #[test]
    fn shift_mapping_alone_blocks_the_seed() {
        let mut table = ActionTable::new();
        table
            .upsert(KeyCode::COMMA, true, Action::command("echo hi").unwrap())
            .unwrap();
        assert_eq!(table.seed_input_sources(), 1);
        assert_eq!(table.get(KeyCode::COMMA, false), None);
        assert!(table.get(KeyCode::COMMA, true).is_some());
    }

    #[test]
    fn from_entries_keeps_last_duplicate() {
        let table = ActionTable::from_entries(vec![
            MappingEntry::new(KeyCode::Q, false, Action::directional(Directional::Left)),
            MappingEntry::new(KeyCode::Q, false, Action::directional(Directional::Up)),
        ])
        .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get(KeyCode::Q, false),
            Some(&Action::directional(Directional::Up))
        );
    }
}
