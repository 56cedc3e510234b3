//! TOML configuration.
//!
//! ```toml
//! chord_key = 129
//! hardware_remap = true
//! seed_input_sources = true
//!
//! [editing.word_forward]
//! key = 39
//! modifiers = { alt = true }
//!
//! [[mapping]]
//! key = 72
//! action = { kind = "directional", action = "left" }
//! ```
//!
//! Every field is optional. Mappings are validated with the same rules as the
//! control surface; the first rejected entry fails the whole load.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dispatch::EditingChords;
use crate::keycode::KeyCode;
use crate::platform;
use crate::table::{ActionTable, MappingEntry, MappingError};

const APP_DIR: &str = "capslayer";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("mapping #{index} (key {key}): {source}")]
    Mapping {
        index: usize,
        key: KeyCode,
        #[source]
        source: MappingError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Key that acts as the chord modifier. Platform default when absent.
    pub chord_key: Option<KeyCode>,
    /// macOS: remap CapsLock onto F18 with `hidutil` while running.
    pub hardware_remap: bool,
    /// Insert the factory input-source bindings where the platform supports them.
    pub seed_input_sources: bool,
    pub editing: EditingChords,
    #[serde(rename = "mapping")]
    pub mappings: Vec<MappingEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chord_key: None,
            hardware_remap: true,
            seed_input_sources: true,
            editing: EditingChords::default(),
            mappings: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        log::info!(
            "config: loaded {} ({} mappings)",
            path.display(),
            config.mappings.len()
        );
        Ok(config)
    }

    /// Loads `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            log::info!("config: {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// `capslayer/config.toml` under the platform config directory:
    /// `~/Library/Application Support` on macOS, `%APPDATA%` on Windows,
    /// `$XDG_CONFIG_HOME` (or `~/.config`) elsewhere.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    pub fn chord_key(&self) -> KeyCode {
        self.chord_key.unwrap_or_else(platform::default_chord_key)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (index, entry) in self.mappings.iter().enumerate() {
            ActionTable::check(entry.key, entry.with_shift, &entry.action).map_err(|source| {
                ConfigError::Mapping {
                    index,
                    key: entry.key,
                    source,
                }
            })?;
        }
        Ok(())
    }

    /// Builds the initial action table: the configured mappings (or the
    /// shipped defaults when there are none), then the input-source seed.
    pub fn action_table(&self, seed_input_sources: bool) -> Result<ActionTable, ConfigError> {
        let mut table = if self.mappings.is_empty() {
            ActionTable::with_defaults()
        } else {
            let mut table = ActionTable::new();
            for (index, entry) in self.mappings.iter().enumerate() {
                table
                    .upsert(entry.key, entry.with_shift, entry.action.clone())
                    .map_err(|source| ConfigError::Mapping {
                        index,
                        key: entry.key,
                        source,
                    })?;
            }
            table
        };

        if seed_input_sources && self.seed_input_sources {
            let added = table.seed_input_sources();
            log::debug!("config: seeded {added} input-source mappings");
        }
        Ok(table)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, Directional};
    use crate::keycode::Modifiers;

    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_is_default() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.chord_key(), platform::default_chord_key());
    }

    #[test]
    fn empty_mapping_list_yields_shipped_defaults() {
        let table = Config::default().action_table(false).unwrap();
        assert_eq!(table.entries(), crate::table::default_mappings());
    }

    #[test]
    fn parses_full_example() {
        let text = r#"
chord_key = 20
hardware_remap = false
seed_input_sources = false

[editing.word_forward]
key = 39
modifiers = { ctrl = true }

[[mapping]]
key = 72
action = { kind = "directional", action = "right" }

[[mapping]]
key = 67
with_shift = true
action = { kind = "command", command = "open -a Calculator" }
"#;
        let config = Config::from_toml_str(text).unwrap();
        assert_eq!(config.chord_key(), KeyCode::CAPS_LOCK);
        assert!(!config.hardware_remap);
        assert_eq!(config.editing.word_forward.modifiers, Modifiers::CTRL);
        assert_eq!(config.mappings.len(), 2);

        let table = config.action_table(true).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.resolve(KeyCode::H, false),
            Some(Action::directional(Directional::Right))
        );
        assert_eq!(
            table.resolve(KeyCode::C, true),
            Some(Action::command("open -a Calculator").unwrap())
        );
    }

    #[test]
    fn rejected_mapping_fails_load() {
        let text = r#"
[[mapping]]
key = 72
action = { kind = "input_source", input_source_id = "com.apple.keylayout.ABC" }
"#;
        let err = Config::from_toml_str(text).unwrap_err();
        match err {
            ConfigError::Mapping { index, key, source } => {
                assert_eq!(index, 0);
                assert_eq!(key, KeyCode::H);
                assert_eq!(source.reason(), "reserved-key conflict");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn shift_mapping_must_be_command() {
        let text = r#"
[[mapping]]
key = 81
with_shift = true
action = { kind = "directional", action = "left" }
"#;
        assert!(matches!(
            Config::from_toml_str(text),
            Err(ConfigError::Mapping { .. })
        ));
    }

    #[test]
    fn syntax_error_is_parse_error() {
        assert!(matches!(
            Config::from_toml_str("chord_key = ["),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn seeding_respects_switch() {
        let mut config = Config::default();
        let seeded = config.action_table(true).unwrap();
        assert!(seeded.get(KeyCode::COMMA, false).is_some());

        config.seed_input_sources = false;
        let plain = config.action_table(true).unwrap();
        assert!(plain.get(KeyCode::COMMA, false).is_none());
    }

    #[test]
    fn configured_shift_command_keeps_its_key_unseeded() {
        let config = Config::from_toml_str(
            r#"
[[mapping]]
key = 188
with_shift = true
action = { kind = "command", command = "echo hi" }
"#,
        )
        .unwrap();
        let table = config.action_table(true).unwrap();
        assert_eq!(table.get(KeyCode::COMMA, false), None);
        assert_eq!(
            table.get(KeyCode::COMMA, true),
            Some(&Action::command("echo hi").unwrap())
        );
        assert!(table.get(KeyCode::PERIOD, false).is_some());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("capslayer-does-not-exist/config.toml");
        assert_eq!(Config::load_or_default(&path).unwrap(), Config::default());
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn default_path_lives_in_platform_config_dir() {
        let expected = dirs::config_dir().map(|dir| dir.join("capslayer").join("config.toml"));
        assert_eq!(Config::default_path(), expected);
    }
}
