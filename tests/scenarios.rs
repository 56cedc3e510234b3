//! End-to-end chord scenarios: a fake tap feeds events into a running
//! `Service`, a recording executor captures what would be injected.

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use capslayer::action::{Action, JumpDirection};
use capslayer::config::Config;
use capslayer::control::Control;
use capslayer::event_bus::{Origin, StatusUpdate};
use capslayer::guard;
use capslayer::keycode::{KeyCode, KeyState, Modifiers};
use capslayer::platform::{
    ActionExecutor, Disposition, EventHandler, InputCapture, InputEvent, KeyStroke, PlatformError,
    TapInterruption,
};
use capslayer::service::{Service, ServiceHealth};
use capslayer::table::MappingError;

use pretty_assertions::assert_eq;

const CHORD: KeyCode = KeyCode::F18;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Keys(Vec<KeyStroke>),
    Text(String),
    InputSource(String),
    ToggleLock,
    Command(String),
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Call>>>);

impl Recorder {
    fn take(&self) -> Vec<Call> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    fn push(&self, call: Call) -> Result<(), PlatformError> {
        self.0.lock().unwrap().push(call);
        Ok(())
    }
}

impl ActionExecutor for Recorder {
    fn post_keys(&self, strokes: &[KeyStroke], _held: Modifiers) -> Result<(), PlatformError> {
        self.push(Call::Keys(strokes.to_vec()))
    }

    fn type_text(&self, text: &str) -> Result<(), PlatformError> {
        self.push(Call::Text(text.to_owned()))
    }

    fn select_input_source(&self, source_id: &str) -> Result<(), PlatformError> {
        self.push(Call::InputSource(source_id.to_owned()))
    }

    fn toggle_chord_lock(&self) -> Result<(), PlatformError> {
        self.push(Call::ToggleLock)
    }

    fn run_command(&self, command_line: &str) -> Result<(), PlatformError> {
        self.push(Call::Command(command_line.to_owned()))
    }
}

type Slot = Arc<Mutex<Option<Box<dyn EventHandler>>>>;

/// Keeps the handler where the test can call it like the OS callback would.
struct FakeTap(Slot);

impl InputCapture for FakeTap {
    fn start(&mut self, handler: Box<dyn EventHandler>) -> Result<(), PlatformError> {
        *self.0.lock().unwrap() = Some(handler);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        self.0.lock().unwrap().take();
        Ok(())
    }
}

struct Harness {
    service: Service,
    control: Control,
    slot: Slot,
    calls: Recorder,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(Config {
            chord_key: Some(CHORD),
            hardware_remap: false,
            seed_input_sources: false,
            ..Config::default()
        })
    }

    fn with_config(config: Config) -> Self {
        let mut service = Service::new(config).unwrap();
        let slot = Slot::default();
        let calls = Recorder::default();
        service
            .start_with(Box::new(FakeTap(Arc::clone(&slot))), Box::new(calls.clone()))
            .unwrap();
        let control = service.control();
        Self {
            service,
            control,
            slot,
            calls,
        }
    }

    fn send(&self, key: KeyCode, state: KeyState, modifiers: Modifiers, tag: i64) -> Disposition {
        let mut slot = self.slot.lock().unwrap();
        let handler = slot.as_mut().expect("tap not started");
        handler.on_event(InputEvent {
            key,
            state,
            modifiers,
            tag,
        })
    }

    fn down(&self, key: KeyCode) -> Disposition {
        self.send(key, KeyState::Down, Modifiers::NONE, 0)
    }

    fn up(&self, key: KeyCode) -> Disposition {
        self.send(key, KeyState::Up, Modifiers::NONE, 0)
    }

    fn shift_down(&self, key: KeyCode) -> Disposition {
        let shift = Modifiers {
            shift: true,
            ..Modifiers::NONE
        };
        self.send(key, KeyState::Down, shift, 0)
    }

    fn interrupt(&self, reason: TapInterruption) {
        self.slot.lock().unwrap().as_mut().unwrap().on_interruption(reason);
    }
}

fn drain(updates: &Receiver<StatusUpdate>) -> Vec<StatusUpdate> {
    updates.try_iter().collect()
}

#[test]
fn caps_h_moves_left_and_hides_both_keys() {
    let h = Harness::new();

    assert_eq!(h.down(CHORD), Disposition::Swallow);
    assert_eq!(h.down(KeyCode::H), Disposition::Swallow);
    assert_eq!(h.up(KeyCode::H), Disposition::Swallow);
    assert_eq!(h.up(CHORD), Disposition::Swallow);

    assert_eq!(
        h.calls.take(),
        vec![Call::Keys(vec![KeyStroke::plain(KeyCode::LEFT)])]
    );
}

#[test]
fn lone_tap_toggles_lock_once() {
    let h = Harness::new();

    h.down(CHORD);
    // Auto-repeat of the chord key itself.
    h.down(CHORD);
    h.up(CHORD);

    assert_eq!(h.calls.take(), vec![Call::ToggleLock]);
}

#[test]
fn chorded_release_does_not_toggle() {
    let h = Harness::new();

    h.down(CHORD);
    h.down(KeyCode::J);
    h.up(KeyCode::J);
    h.up(CHORD);

    let calls = h.calls.take();
    assert!(!calls.contains(&Call::ToggleLock), "{calls:?}");
    assert_eq!(calls.len(), 1);
}

#[test]
fn unmapped_key_passes_and_release_still_toggles() {
    let h = Harness::new();

    h.down(CHORD);
    assert_eq!(h.down(KeyCode::Q), Disposition::Pass);
    assert_eq!(h.up(KeyCode::Q), Disposition::Pass);
    h.up(CHORD);

    // Nothing was dispatched, so the release counts as a tap.
    assert_eq!(h.calls.take(), vec![Call::ToggleLock]);
}

#[test]
fn configured_mappings_override_builtins() {
    let config = Config::from_toml_str(
        r#"
chord_key = 129
hardware_remap = false
seed_input_sources = false

[[mapping]]
key = 72
action = { kind = "directional", action = "right" }

[[mapping]]
key = 67
with_shift = true
action = { kind = "command", command = "open -a Calculator" }
"#,
    )
    .unwrap();
    let h = Harness::with_config(config);

    h.down(CHORD);
    h.down(KeyCode::H);
    // Reserved keys missing from the config keep their built-in action.
    h.down(KeyCode::J);
    h.shift_down(KeyCode::C);

    assert_eq!(
        h.calls.take(),
        vec![
            Call::Keys(vec![KeyStroke::plain(KeyCode::RIGHT)]),
            Call::Keys(vec![KeyStroke::plain(KeyCode::DOWN)]),
            Call::Command("open -a Calculator".into()),
        ]
    );
}

#[test]
fn keys_without_chord_pass_through() {
    let h = Harness::new();

    assert_eq!(h.down(KeyCode::H), Disposition::Pass);
    assert_eq!(h.up(KeyCode::H), Disposition::Pass);
    assert!(h.calls.take().is_empty());
}

#[test]
fn our_own_injections_bypass_the_engine() {
    let h = Harness::new();

    h.down(CHORD);
    let injected = h.send(KeyCode::H, KeyState::Down, Modifiers::NONE, guard::stamp());
    assert_eq!(injected, Disposition::Pass);
    assert!(h.calls.take().is_empty());

    // Foreign tags are treated as physical input.
    let foreign = h.send(KeyCode::H, KeyState::Down, Modifiers::NONE, 42);
    assert_eq!(foreign, Disposition::Swallow);
}

#[test]
fn jump_count_is_clamped_on_insert() {
    let h = Harness::new();
    h.control
        .upsert_action_mapping(KeyCode::U, false, Action::jump(JumpDirection::Up, 500))
        .unwrap();

    h.down(CHORD);
    h.down(KeyCode::U);

    assert_eq!(
        h.calls.take(),
        vec![Call::Keys(vec![KeyStroke::plain(KeyCode::UP); 99])]
    );
}

#[test]
fn shift_layer_runs_commands_only() {
    let h = Harness::new();
    h.control
        .add_shell_mapping(KeyCode::G, "open -a Safari")
        .unwrap();

    h.down(CHORD);
    assert_eq!(h.shift_down(KeyCode::G), Disposition::Swallow);
    // No shift entry for H: no fallback to the plain binding.
    assert_eq!(h.shift_down(KeyCode::H), Disposition::Pass);

    assert_eq!(h.calls.take(), vec![Call::Command("open -a Safari".into())]);

    let err = h
        .control
        .upsert_action_mapping(KeyCode::G, true, Action::jump(JumpDirection::Down, 3))
        .unwrap_err();
    assert!(matches!(err, MappingError::ReservedKeyConflict(_)));
}

#[test]
fn input_source_binding_on_comma() {
    let h = Harness::new();
    h.control
        .upsert_action_mapping(
            KeyCode::COMMA,
            false,
            Action::input_source("com.apple.keylayout.ABC").unwrap(),
        )
        .unwrap();

    h.down(CHORD);
    h.down(KeyCode(188));

    assert_eq!(
        h.calls.take(),
        vec![Call::InputSource("com.apple.keylayout.ABC".into())]
    );

    let err = h
        .control
        .add_input_source_mapping(KeyCode::H, "com.apple.keylayout.US")
        .unwrap_err();
    assert!(matches!(err, MappingError::ReservedKeyConflict(_)));
}

#[test]
fn insert_quotes_types_then_steps_back() {
    let h = Harness::new();

    h.down(CHORD);
    h.down(KeyCode::N);

    assert_eq!(
        h.calls.take(),
        vec![
            Call::Text("\"\"\"\"\"\"".into()),
            Call::Keys(vec![KeyStroke::plain(KeyCode::LEFT); 3]),
        ]
    );
}

#[test]
fn paused_engine_passes_everything() {
    let h = Harness::new();
    let updates = h.control.subscribe();

    assert_eq!(h.control.set_paused(true), "Paused");
    assert_eq!(h.down(CHORD), Disposition::Pass);
    assert_eq!(h.down(KeyCode::H), Disposition::Pass);
    assert_eq!(h.up(CHORD), Disposition::Pass);
    assert!(h.calls.take().is_empty());

    assert_eq!(h.control.set_paused(false), "Running");
    assert_eq!(
        drain(&updates),
        vec![
            StatusUpdate {
                paused: true,
                origin: Origin::User
            },
            StatusUpdate {
                paused: false,
                origin: Origin::User
            },
        ]
    );
}

#[test]
fn pausing_mid_chord_drops_the_chord() {
    let h = Harness::new();

    h.down(CHORD);
    h.control.set_paused(true);
    h.control.set_paused(false);

    // The held chord was forgotten, so H is ordinary input again.
    assert_eq!(h.down(KeyCode::H), Disposition::Pass);
    assert!(h.calls.take().is_empty());
}

#[test]
fn revoked_permission_pauses_with_system_origin() {
    let h = Harness::new();
    let updates = h.control.subscribe();

    h.interrupt(TapInterruption::PermissionRevoked);

    assert!(h.control.is_paused());
    assert!(matches!(
        h.control.health(),
        ServiceHealth::PermissionDenied(_)
    ));
    assert_eq!(
        drain(&updates),
        vec![StatusUpdate {
            paused: true,
            origin: Origin::System
        }]
    );
}

#[test]
fn timeout_interruption_resets_held_chord() {
    let h = Harness::new();

    h.down(CHORD);
    h.interrupt(TapInterruption::Timeout);

    assert!(!h.control.is_paused());
    assert_eq!(h.down(KeyCode::H), Disposition::Pass);
}

#[test]
fn stop_removes_the_tap() {
    let mut h = Harness::new();
    assert_eq!(h.control.health(), ServiceHealth::Running);

    h.service.stop().unwrap();

    assert!(h.slot.lock().unwrap().is_none());
    assert_eq!(h.control.health(), ServiceHealth::Stopped);
}
