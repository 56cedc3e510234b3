//! Chord key state machine.
//!
//! `Idle -> Down -> DownConsumed -> Idle`. The chord key itself is always
//! swallowed; whether its release toggles the lock state depends on whether
//! any mapped key fired while it was held.
//!
//! Owned and mutated by the event-tap thread only.

use std::collections::HashSet;

use crate::keycode::KeyCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChordPhase {
    Idle,
    /// Chord key held, nothing fired yet.
    Down,
    /// Chord key held and used as a modifier at least once.
    DownConsumed,
}

/// What a chord key-up means for the lock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Pressed and released alone: toggle the hardware lock state once.
    Tap,
    /// Used as a modifier: leave the lock state alone.
    Chorded,
    /// Key-up without a tracked key-down (after a reset or a pause).
    Spurious,
}

#[derive(Debug, Default)]
pub struct ChordState {
    physically_down: bool,
    consumed: bool,
    /// Trigger keys whose key-down was swallowed; their key-ups are swallowed too.
    swallowed: HashSet<KeyCode>,
}

impl ChordState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ChordPhase {
        match (self.physically_down, self.consumed) {
            (false, _) => ChordPhase::Idle,
            (true, false) => ChordPhase::Down,
            (true, true) => ChordPhase::DownConsumed,
        }
    }

    pub fn is_held(&self) -> bool {
        self.physically_down
    }

    /// Chord key-down. Returns `false` for auto-repeat while already held.
    pub fn press(&mut self) -> bool {
        if self.physically_down {
            return false;
        }
        self.physically_down = true;
        self.consumed = false;
        true
    }

    /// Chord key-up. Always ends in `Idle`.
    pub fn release(&mut self) -> Release {
        let outcome = match self.phase() {
            ChordPhase::Idle => Release::Spurious,
            ChordPhase::Down => Release::Tap,
            ChordPhase::DownConsumed => Release::Chorded,
        };
        self.physically_down = false;
        self.consumed = false;
        outcome
    }

    /// Records that `key` fired an action while the chord was held.
    ///
    /// Ignored while idle so `consumed` can never outlive the press.
    pub fn consume(&mut self, key: KeyCode) {
        if !self.physically_down {
            return;
        }
        self.consumed = true;
        self.swallowed.insert(key);
    }

    /// Key-up of a non-chord key: true if its key-down was swallowed.
    pub fn take_swallowed(&mut self, key: KeyCode) -> bool {
        self.swallowed.remove(&key)
    }

    /// Forces `Idle`, e.g. after the OS disabled the tap mid-chord.
    pub fn reset(&mut self) {
        self.physically_down = false;
        self.consumed = false;
        self.swallowed.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
