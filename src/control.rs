//! Control surface for UI and configuration collaborators.
//!
//! Cheap to clone; every handle talks to the same `Shared` state as the tap
//! thread. Table locks are held only for the map operation itself.

use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use crate::action::Action;
use crate::engine::Shared;
use crate::event_bus::{Origin, StatusUpdate};
use crate::keycode::KeyCode;
use crate::platform::{self, PermissionStatuses};
use crate::service::ServiceHealth;
use crate::table::{MappingEntry, MappingError};

pub const RUNNING: &str = "Running";
pub const PAUSED: &str = "Paused";

#[derive(Clone)]
pub struct Control {
    shared: Arc<Shared>,
}

impl Control {
    pub fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    // -----------------------------------------------------------------------
    // Mappings
    // -----------------------------------------------------------------------

    pub fn get_action_mappings(&self) -> Vec<MappingEntry> {
        self.shared.table().entries()
    }

    pub fn upsert_action_mapping(
        &self,
        key: KeyCode,
        with_shift: bool,
        action: Action,
    ) -> Result<(), MappingError> {
        let kind = action.kind();
        let changed = self.shared.table().upsert(key, with_shift, action)?;
        if changed {
            log::info!("control: mapped Caps+{}{key} -> {kind}", shift_label(with_shift));
        }
        Ok(())
    }

    pub fn remove_action_mapping(&self, key: KeyCode, with_shift: bool) -> Result<(), MappingError> {
        let removed = self.shared.table().remove(key, with_shift)?;
        log::info!(
            "control: unmapped Caps+{}{key} ({})",
            shift_label(with_shift),
            removed.kind()
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pause state
    // -----------------------------------------------------------------------

    /// Returns `"Running"` or `"Paused"`. A resume after the OS revoked input
    /// permission stays `"Paused"` until the grant is back.
    pub fn set_paused(&self, paused: bool) -> String {
        self.shared.set_paused(paused, Origin::User);
        self.get_status()
    }

    /// Flips the pause state, as the tray menu does.
    pub fn toggle_paused(&self) -> String {
        self.set_paused(!self.shared.is_paused())
    }

    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }

    pub fn get_status(&self) -> String {
        if self.shared.is_paused() {
            PAUSED.to_string()
        } else {
            RUNNING.to_string()
        }
    }

    pub fn subscribe(&self) -> Receiver<StatusUpdate> {
        self.shared.bus().subscribe()
    }

    // -----------------------------------------------------------------------
    // Health & permissions
    // -----------------------------------------------------------------------

    pub fn health(&self) -> ServiceHealth {
        self.shared.health()
    }

    pub fn get_permission_statuses(&self) -> PermissionStatuses {
        platform::permission_statuses()
    }

    // -----------------------------------------------------------------------
    // Legacy wrappers
    // -----------------------------------------------------------------------

    /// Binds Caps+Shift+`key` to a shell command.
    pub fn add_shell_mapping(&self, key: KeyCode, command: &str) -> Result<(), MappingError> {
        self.upsert_action_mapping(key, true, Action::command(command)?)
    }

    pub fn remove_shell_mapping(&self, key: KeyCode) -> Result<(), MappingError> {
        self.remove_action_mapping(key, true)
    }

    pub fn get_shell_mappings(&self) -> BTreeMap<KeyCode, String> {
        self.get_action_mappings()
            .into_iter()
            .filter(|entry| entry.with_shift)
            .filter_map(|entry| match entry.action {
                Action::Command { command } => Some((entry.key, command)),
                _ => None,
            })
            .collect()
    }

    pub fn add_input_source_mapping(
        &self,
        key: KeyCode,
        input_source_id: &str,
    ) -> Result<(), MappingError> {
        self.upsert_action_mapping(key, false, Action::input_source(input_source_id)?)
    }

    /// Removes Caps+`key` only when it is bound to an input source; any other
    /// action on that key is left in place.
    pub fn remove_input_source_mapping(&self, key: KeyCode) -> Result<(), MappingError> {
        {
            let mut table = self.shared.table();
            if !matches!(table.get(key, false), Some(Action::InputSource { .. })) {
                return Err(MappingError::NotFound {
                    key,
                    with_shift: false,
                });
            }
            table.remove(key, false)?;
        }
        log::info!("control: unmapped Caps+{key} (input_source)");
        Ok(())
    }

    pub fn get_input_source_mappings(&self) -> BTreeMap<KeyCode, String> {
        self.get_action_mappings()
            .into_iter()
            .filter(|entry| !entry.with_shift)
            .filter_map(|entry| match entry.action {
                Action::InputSource { input_source_id } => Some((entry.key, input_source_id)),
                _ => None,
            })
            .collect()
    }
}

fn shift_label(with_shift: bool) -> &'static str {
    if with_shift {
        "Shift+"
    } else {
        ""
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
