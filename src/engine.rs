//! The per-event callback body and the state it shares with the control
//! surface.
//!
//! `Engine` is moved onto the tap thread and owns the chord state machine and
//! the dispatcher. `Shared` is the part the rest of the process can reach:
//! the action table, the pause flag, service health and the status stream.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::action::Action;
use crate::chord::{ChordState, Release};
use crate::dispatch::Dispatcher;
use crate::event_bus::{EventBus, Origin, StatusUpdate};
use crate::guard;
use crate::keycode::{KeyCode, KeyState};
use crate::platform::{self, Disposition, EventHandler, InputEvent, TapInterruption};
use crate::service::ServiceHealth;
use crate::table::ActionTable;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct Shared {
    table: Mutex<ActionTable>,
    paused: AtomicBool,
    /// Bumped on every pause change; the engine drops its chord state when it
    /// sees a new value.
    pause_epoch: AtomicU64,
    /// Held across flag, epoch and publish so updates go out in the order the
    /// changes were applied.
    pause_lock: Mutex<()>,
    /// Set when the OS revoked input permission mid-run. A resume re-checks
    /// the grant before clearing it.
    permission_revoked: AtomicBool,
    permission_granted: fn() -> bool,
    health: Mutex<ServiceHealth>,
    bus: EventBus,
}

impl Shared {
    pub fn new(table: ActionTable) -> Arc<Self> {
        Self::with_permission_check(table, platform::input_permission_granted)
    }

    /// Like `new`, with the check used when resuming after a revocation.
    pub fn with_permission_check(table: ActionTable, permission_granted: fn() -> bool) -> Arc<Self> {
        Arc::new(Self {
            table: Mutex::new(table),
            paused: AtomicBool::new(false),
            pause_epoch: AtomicU64::new(0),
            pause_lock: Mutex::new(()),
            permission_revoked: AtomicBool::new(false),
            permission_granted,
            health: Mutex::new(ServiceHealth::Stopped),
            bus: EventBus::new(),
        })
    }

    pub fn table(&self) -> MutexGuard<'_, ActionTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clones the resolved action so the lock is released before dispatch.
    pub fn resolve(&self, key: KeyCode, shift_held: bool) -> Option<Action> {
        self.table().resolve(key, shift_held)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn pause_epoch(&self) -> u64 {
        self.pause_epoch.load(Ordering::SeqCst)
    }

    /// Sets the pause flag. Publishes a status update only when the value
    /// actually changed; returns whether it did.
    ///
    /// After a permission revocation, resuming is refused until the grant is
    /// back; once it is, health returns to `Running`.
    pub fn set_paused(&self, paused: bool, origin: Origin) -> bool {
        let _order = self.pause_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_paused() == paused {
            return false;
        }

        if !paused && self.permission_revoked.load(Ordering::SeqCst) {
            if !(self.permission_granted)() {
                log::warn!("engine: resume refused, input permission is still missing");
                return false;
            }
            self.permission_revoked.store(false, Ordering::SeqCst);
            let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
            if matches!(*health, ServiceHealth::PermissionDenied(_)) {
                *health = ServiceHealth::Running;
            }
            log::info!("engine: input permission granted again");
        }

        self.paused.store(paused, Ordering::SeqCst);
        self.pause_epoch.fetch_add(1, Ordering::SeqCst);
        log::info!(
            "engine: {} ({origin:?})",
            if paused { "paused" } else { "resumed" }
        );
        self.bus.publish(StatusUpdate { paused, origin });
        true
    }

    /// Records a mid-run permission loss and pauses with `Origin::System`.
    pub fn revoke_permission(&self, reason: &str) {
        self.set_health(ServiceHealth::PermissionDenied(reason.to_string()));
        self.permission_revoked.store(true, Ordering::SeqCst);
        self.set_paused(true, Origin::System);
    }

    pub fn health(&self) -> ServiceHealth {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_health(&self, health: ServiceHealth) {
        *self.health.lock().unwrap_or_else(PoisonError::into_inner) = health;
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Counters kept by the tap thread, exposed for tests and debug logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub events: u64,
    /// Events recognised as our own injections and passed through untouched.
    pub synthetic_passed: u64,
    /// Action table lookups.
    pub lookups: u64,
    pub dispatched: u64,
    pub toggles: u64,
}

pub struct Engine {
    shared: Arc<Shared>,
    chord: ChordState,
    dispatcher: Dispatcher,
    chord_key: KeyCode,
    seen_epoch: u64,
    stats: EngineStats,
}

impl Engine {
    pub fn new(shared: Arc<Shared>, dispatcher: Dispatcher, chord_key: KeyCode) -> Self {
        let seen_epoch = shared.pause_epoch();
        Self {
            shared,
            chord: ChordState::new(),
            dispatcher,
            chord_key,
            seen_epoch,
            stats: EngineStats::default(),
        }
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn chord(&self) -> &ChordState {
        &self.chord
    }

    fn on_chord_key(&mut self, state: KeyState) -> Disposition {
        match state {
            KeyState::Down => {
                if self.chord.press() {
                    log::trace!("engine: chord key down");
                }
            }
            KeyState::Up => match self.chord.release() {
                Release::Tap => {
                    self.stats.toggles += 1;
                    if let Err(e) = self.dispatcher.toggle_chord_lock() {
                        log::warn!("engine: failed to toggle lock state: {e}");
                    }
                }
                Release::Chorded => log::trace!("engine: chord released after use"),
                Release::Spurious => log::debug!("engine: chord key-up without key-down"),
            },
            KeyState::FlagsChanged => {}
        }
        Disposition::Swallow
    }

    fn on_trigger_down(&mut self, event: InputEvent) -> Disposition {
        if event.key.is_unknown() {
            return Disposition::Pass;
        }

        self.stats.lookups += 1;
        let Some(action) = self.shared.resolve(event.key, event.modifiers.shift) else {
            return Disposition::Pass;
        };

        self.chord.consume(event.key);
        log::debug!(
            "engine: Caps+{}{} -> {}",
            if event.modifiers.shift { "Shift+" } else { "" },
            event.key,
            action.kind()
        );
        if let Err(e) = self.dispatcher.dispatch(&action, event.modifiers) {
            log::warn!("engine: {} action for {} failed: {e}", action.kind(), event.key);
        }
        self.stats.dispatched += 1;
        Disposition::Swallow
    }
}

impl EventHandler for Engine {
    fn on_event(&mut self, event: InputEvent) -> Disposition {
        self.stats.events += 1;

        if guard::is_synthetic(event.tag) {
            self.stats.synthetic_passed += 1;
            return Disposition::Pass;
        }

        let epoch = self.shared.pause_epoch();
        if epoch != self.seen_epoch {
            self.seen_epoch = epoch;
            self.chord.reset();
        }

        if self.shared.is_paused() {
            return Disposition::Pass;
        }

        if event.key == self.chord_key {
            return self.on_chord_key(event.state);
        }

        // CapsLock still reaching the tap while it is remapped elsewhere.
        if event.key == KeyCode::CAPS_LOCK && event.state == KeyState::FlagsChanged {
            return Disposition::Swallow;
        }

        match event.state {
            KeyState::Down if self.chord.is_held() => self.on_trigger_down(event),
            KeyState::Up if self.chord.take_swallowed(event.key) => Disposition::Swallow,
            _ => Disposition::Pass,
        }
    }

    fn on_interruption(&mut self, reason: TapInterruption) {
        self.chord.reset();
        match reason {
            TapInterruption::Timeout | TapInterruption::UserInput => {
                log::warn!("engine: tap was disabled ({reason:?}) and re-enabled; chord reset");
            }
            TapInterruption::PermissionRevoked => {
                log::error!("engine: input permission revoked; pausing");
                self.shared
                    .revoke_permission("input permission revoked while running");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
