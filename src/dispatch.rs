//! Action dispatcher.
//!
//! Turns a resolved `Action` into exactly one platform effect through the
//! `ActionExecutor`. Runs on the tap thread, so nothing here may block: shell
//! commands are spawned and reaped on a detached thread.

use std::process::{Command, Stdio};
use std::thread;

use serde::{Deserialize, Serialize};

use crate::action::{Action, Directional, Independent, JumpDirection};
use crate::keycode::{KeyCode, Modifiers};
use crate::platform::{ActionExecutor, KeyStroke, PlatformError};

/// Text typed by `insert_quotes`; the caret then moves back into the middle.
const QUOTES: &str = "\"\"\"\"\"\"";
const QUOTES_CARET_BACK: usize = 3;

// ---------------------------------------------------------------------------
// Editing chords
// ---------------------------------------------------------------------------

/// A key plus the modifiers it is pressed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chord {
    pub key: KeyCode,
    #[serde(default)]
    pub modifiers: Modifiers,
}

impl Chord {
    pub const fn new(key: KeyCode, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }

    fn stroke(self) -> KeyStroke {
        KeyStroke::new(self.key, self.modifiers)
    }
}

/// Platform shortcuts behind the text-editing actions.
///
/// Each field can be overridden from the config file; missing fields keep the
/// platform default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditingChords {
    pub word_forward: Chord,
    pub word_back: Chord,
    pub home: Chord,
    pub end: Chord,
    /// Tapped in order.
    pub next_line: Vec<Chord>,
}

impl EditingChords {
    pub fn macos() -> Self {
        Self {
            word_forward: Chord::new(KeyCode::RIGHT, Modifiers::ALT),
            word_back: Chord::new(KeyCode::LEFT, Modifiers::ALT),
            home: Chord::new(KeyCode::LEFT, Modifiers::META),
            end: Chord::new(KeyCode::RIGHT, Modifiers::META),
            next_line: vec![
                Chord::new(KeyCode::RIGHT, Modifiers::META),
                Chord::new(KeyCode::ENTER, Modifiers::NONE),
            ],
        }
    }

    pub fn windows() -> Self {
        Self {
            word_forward: Chord::new(KeyCode::RIGHT, Modifiers::CTRL),
            word_back: Chord::new(KeyCode::LEFT, Modifiers::CTRL),
            home: Chord::new(KeyCode::HOME, Modifiers::NONE),
            end: Chord::new(KeyCode::END, Modifiers::NONE),
            next_line: vec![
                Chord::new(KeyCode::END, Modifiers::NONE),
                Chord::new(KeyCode::ENTER, Modifiers::NONE),
            ],
        }
    }

    pub fn for_current_platform() -> Self {
        if cfg!(target_os = "macos") {
            Self::macos()
        } else {
            Self::windows()
        }
    }
}

impl Default for EditingChords {
    fn default() -> Self {
        Self::for_current_platform()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    executor: Box<dyn ActionExecutor>,
    editing: EditingChords,
}

impl Dispatcher {
    pub fn new(executor: Box<dyn ActionExecutor>, editing: EditingChords) -> Self {
        Self { executor, editing }
    }

    pub fn editing(&self) -> &EditingChords {
        &self.editing
    }

    /// Flips the hardware lock state after a lone chord-key tap.
    pub fn toggle_chord_lock(&self) -> Result<(), PlatformError> {
        self.executor.toggle_chord_lock()
    }

    /// Performs `action`. `held` are the modifiers physically down besides
    /// the chord key.
    pub fn dispatch(&self, action: &Action, held: Modifiers) -> Result<(), PlatformError> {
        match action {
            Action::Directional { action } => {
                let stroke = match action {
                    Directional::Left => KeyStroke::plain(KeyCode::LEFT),
                    Directional::Right => KeyStroke::plain(KeyCode::RIGHT),
                    Directional::Up => KeyStroke::plain(KeyCode::UP),
                    Directional::Down => KeyStroke::plain(KeyCode::DOWN),
                    Directional::WordForward => self.editing.word_forward.stroke(),
                    Directional::WordBack => self.editing.word_back.stroke(),
                    Directional::Home => self.editing.home.stroke(),
                    Directional::End => self.editing.end.stroke(),
                };
                self.executor.post_keys(&[stroke], held)
            }
            Action::Jump { direction, count } => {
                let key = match direction {
                    JumpDirection::Up => KeyCode::UP,
                    JumpDirection::Down => KeyCode::DOWN,
                };
                let strokes = vec![KeyStroke::plain(key); usize::from(count.get())];
                self.executor.post_keys(&strokes, held)
            }
            Action::Independent { action } => match action {
                Independent::Backspace => self
                    .executor
                    .post_keys(&[KeyStroke::plain(KeyCode::BACKSPACE)], held),
                Independent::NextLine => {
                    let strokes: Vec<KeyStroke> =
                        self.editing.next_line.iter().map(|c| c.stroke()).collect();
                    self.executor.post_keys(&strokes, held)
                }
                Independent::InsertQuotes => {
                    self.executor.type_text(QUOTES)?;
                    let back = [KeyStroke::plain(KeyCode::LEFT); QUOTES_CARET_BACK];
                    self.executor.post_keys(&back, Modifiers::NONE)
                }
            },
            Action::InputSource { input_source_id } => {
                self.executor.select_input_source(input_source_id)
            }
            Action::Command { command } => self.executor.run_command(command),
        }
    }
}

// ---------------------------------------------------------------------------
// Shell commands
// ---------------------------------------------------------------------------

#[cfg(not(target_os = "windows"))]
fn shell_command(command_line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command_line);
    cmd
}

#[cfg(target_os = "windows")]
fn shell_command(command_line: &str) -> Command {
    use std::os::windows::process::CommandExt;
    use windows_sys::Win32::System::Threading::CREATE_NO_WINDOW;

    let mut cmd = Command::new("cmd");
    cmd.arg("/C").raw_arg(command_line).creation_flags(CREATE_NO_WINDOW);
    cmd
}

/// Runs `command_line` in the platform shell to completion; only the exit
/// status is logged.
fn run_to_exit(command_line: &str) {
    let child = shell_command(command_line)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    let mut child = match child {
        Ok(child) => child,
        Err(e) => {
            log::warn!("executor: failed to spawn `{command_line}`: {e}");
            return;
        }
    };
    match child.wait() {
        Ok(status) if status.success() => {
            log::debug!("executor: command `{command_line}` exited successfully")
        }
        Ok(status) => log::warn!("executor: command `{command_line}` exited with {status}"),
        Err(e) => log::warn!("executor: failed to wait for `{command_line}`: {e}"),
    }
}

/// Starts `command_line` in the platform shell and returns immediately.
///
/// Fork and exec happen on a fresh thread, never on the caller's.
pub fn spawn_detached(command_line: &str) -> Result<(), PlatformError> {
    let command_line = command_line.to_owned();
    thread::Builder::new()
        .name("command-runner".into())
        .spawn(move || run_to_exit(&command_line))
        .map_err(|e| PlatformError::Other(format!("failed to start command thread: {e}")))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Call {
        Keys(Vec<KeyStroke>, Modifiers),
        Text(String),
        InputSource(String),
        ToggleLock,
        Command(String),
    }

    /// Executor that records every call instead of touching the OS.
    #[derive(Clone, Default)]
    pub(crate) struct Recorder {
        pub(crate) calls: Arc<Mutex<Vec<Call>>>,
    }

    impl Recorder {
        pub(crate) fn take(&self) -> Vec<Call> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }

        fn push(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl ActionExecutor for Recorder {
        fn post_keys(&self, strokes: &[KeyStroke], held: Modifiers) -> Result<(), PlatformError> {
            self.push(Call::Keys(strokes.to_vec(), held));
            Ok(())
        }

        fn type_text(&self, text: &str) -> Result<(), PlatformError> {
            self.push(Call::Text(text.into()));
            Ok(())
        }

        fn select_input_source(&self, source_id: &str) -> Result<(), PlatformError> {
            self.push(Call::InputSource(source_id.into()));
            Ok(())
        }

        fn toggle_chord_lock(&self) -> Result<(), PlatformError> {
            self.push(Call::ToggleLock);
            Ok(())
        }

        fn run_command(&self, command_line: &str) -> Result<(), PlatformError> {
            self.push(Call::Command(command_line.into()));
            Ok(())
        }
    }

    fn dispatcher(editing: EditingChords) -> (Dispatcher, Recorder) {
        let recorder = Recorder::default();
        (
            Dispatcher::new(Box::new(recorder.clone()), editing),
            recorder,
        )
    }

    #[test]
    fn arrows_keep_held_modifiers() {
        let (d, rec) = dispatcher(EditingChords::windows());
        let held = Modifiers {
            alt: true,
            ..Modifiers::NONE
        };
        d.dispatch(&Action::directional(Directional::Left), held)
            .unwrap();
        assert_eq!(
            rec.take(),
            vec![Call::Keys(vec![KeyStroke::plain(KeyCode::LEFT)], held)]
        );
    }

    #[test]
    fn jump_taps_count_times() {
        let (d, rec) = dispatcher(EditingChords::windows());
        d.dispatch(&Action::jump(JumpDirection::Down, 10), Modifiers::NONE)
            .unwrap();
        assert_eq!(
            rec.take(),
            vec![Call::Keys(
                vec![KeyStroke::plain(KeyCode::DOWN); 10],
                Modifiers::NONE
            )]
        );
    }

    #[test]
    fn word_navigation_uses_platform_chords() {
        let (d, rec) = dispatcher(EditingChords::macos());
        d.dispatch(&Action::directional(Directional::WordForward), Modifiers::NONE)
            .unwrap();
        d.dispatch(&Action::directional(Directional::Home), Modifiers::NONE)
            .unwrap();
        assert_eq!(
            rec.take(),
            vec![
                Call::Keys(
                    vec![KeyStroke::new(KeyCode::RIGHT, Modifiers::ALT)],
                    Modifiers::NONE
                ),
                Call::Keys(
                    vec![KeyStroke::new(KeyCode::LEFT, Modifiers::META)],
                    Modifiers::NONE
                ),
            ]
        );

        let (d, rec) = dispatcher(EditingChords::windows());
        d.dispatch(&Action::directional(Directional::WordBack), Modifiers::NONE)
            .unwrap();
        assert_eq!(
            rec.take(),
            vec![Call::Keys(
                vec![KeyStroke::new(KeyCode::LEFT, Modifiers::CTRL)],
                Modifiers::NONE
            )]
        );
    }

    #[test]
    fn next_line_taps_every_chord_in_order() {
        let (d, rec) = dispatcher(EditingChords::windows());
        d.dispatch(&Action::independent(Independent::NextLine), Modifiers::NONE)
            .unwrap();
        assert_eq!(
            rec.take(),
            vec![Call::Keys(
                vec![
                    KeyStroke::plain(KeyCode::END),
                    KeyStroke::plain(KeyCode::ENTER)
                ],
                Modifiers::NONE
            )]
        );
    }

    #[test]
    fn insert_quotes_types_then_moves_caret_back() {
        let (d, rec) = dispatcher(EditingChords::macos());
        d.dispatch(&Action::independent(Independent::InsertQuotes), Modifiers::NONE)
            .unwrap();
        assert_eq!(
            rec.take(),
            vec![
                Call::Text("\"\"\"\"\"\"".into()),
                Call::Keys(vec![KeyStroke::plain(KeyCode::LEFT); 3], Modifiers::NONE),
            ]
        );
    }

    #[test]
    fn input_source_and_command_reach_executor() {
        let (d, rec) = dispatcher(EditingChords::macos());
        d.dispatch(
            &Action::input_source("com.apple.keylayout.ABC").unwrap(),
            Modifiers::NONE,
        )
        .unwrap();
        d.dispatch(&Action::command("open -a Calculator").unwrap(), Modifiers::NONE)
            .unwrap();
        assert_eq!(
            rec.take(),
            vec![
                Call::InputSource("com.apple.keylayout.ABC".into()),
                Call::Command("open -a Calculator".into()),
            ]
        );
    }

    #[test]
    fn editing_overrides_keep_missing_fields() {
        let editing: EditingChords =
            toml::from_str("[home]\nkey = 36\n").unwrap();
        assert_eq!(editing.home, Chord::new(KeyCode::HOME, Modifiers::NONE));
        assert_eq!(
            editing.word_forward,
            EditingChords::for_current_platform().word_forward
        );
    }

    #[cfg(unix)]
    #[test]
    fn spawn_detached_returns_without_waiting() {
        let started = std::time::Instant::now();
        spawn_detached("sleep 2").unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[cfg(unix)]
    #[test]
    fn detached_command_runs_on_its_own_thread() {
        use std::time::{Duration, Instant};

        let marker = std::env::temp_dir().join(format!(
            "capslayer-command-runner-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&marker);

        spawn_detached(&format!("touch '{}'", marker.display())).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !marker.exists() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(marker.exists(), "command never ran");
        let _ = std::fs::remove_file(&marker);
    }

    #[test]
    fn unspawnable_command_is_only_logged() {
        // Errors surface on the runner thread; the caller is never blocked.
        assert!(spawn_detached("capslayer-no-such-program --flag").is_ok());
    }
}
