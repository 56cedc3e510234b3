//! Line-oriented control on stdin for the binary.
//!
//! ```text
//! status | pause | resume | toggle | health | permissions | list
//! map <key> <shift|plain> { kind = "...", ... }
//! unmap <key> <shift|plain>
//! quit
//! ```

use std::io::BufRead;
use std::sync::mpsc::Sender;

use serde::Deserialize;

use crate::action::Action;
use crate::control::Control;
use crate::keycode::KeyCode;

#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Output(String),
    Quit,
}

const HELP: &str = "commands: status, pause, resume, toggle, health, permissions, list, \
                    map <key> <shift|plain> <action>, unmap <key> <shift|plain>, quit";

/// Executes a single console line.
pub fn execute(control: &Control, line: &str) -> Reply {
    let line = line.trim();
    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));

    let out = match command {
        "" => String::new(),
        "status" => control.get_status(),
        "pause" => control.set_paused(true),
        "resume" => control.set_paused(false),
        "toggle" => control.toggle_paused(),
        "health" => control.health().to_string(),
        "permissions" => {
            let p = control.get_permission_statuses();
            format!(
                "platform={} accessibility={} input_monitoring={}",
                p.platform, p.accessibility, p.input_monitoring
            )
        }
        "list" => control
            .get_action_mappings()
            .iter()
            .map(|e| {
                format!(
                    "Caps+{}{} ({}) -> {:?}",
                    if e.with_shift { "Shift+" } else { "" },
                    e.key,
                    e.key.code(),
                    e.action
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        "map" => match parse_map(rest) {
            Ok((key, with_shift, action)) => {
                match control.upsert_action_mapping(key, with_shift, action) {
                    Ok(()) => "ok".into(),
                    Err(e) => format!("error: {e}"),
                }
            }
            Err(e) => format!("error: {e}"),
        },
        "unmap" => match parse_key_shift(rest) {
            Ok((key, with_shift, _)) => match control.remove_action_mapping(key, with_shift) {
                Ok(()) => "ok".into(),
                Err(e) => format!("error: {e}"),
            },
            Err(e) => format!("error: {e}"),
        },
        "quit" | "exit" => return Reply::Quit,
        _ => HELP.into(),
    };
    Reply::Output(out)
}

fn parse_key_shift(args: &str) -> Result<(KeyCode, bool, &str), String> {
    let mut parts = args.trim().splitn(3, char::is_whitespace);
    let key = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or("missing key")?
        .parse::<u16>()
        .map_err(|e| format!("bad key code: {e}"))?;
    let with_shift = match parts.next() {
        Some("shift") => true,
        Some("plain") | None => false,
        Some(other) => return Err(format!("expected shift|plain, got {other}")),
    };
    Ok((KeyCode(key), with_shift, parts.next().unwrap_or("").trim()))
}

/// The action is a TOML inline table: `{ kind = "jump", direction = "up", count = 5 }`.
fn parse_map(args: &str) -> Result<(KeyCode, bool, Action), String> {
    #[derive(Deserialize)]
    struct Line {
        action: Action,
    }

    let (key, with_shift, action) = parse_key_shift(args)?;
    let line: Line =
        toml::from_str(&format!("action = {action}")).map_err(|e| format!("bad action: {e}"))?;
    Ok((key, with_shift, line.action))
}

/// Reads commands until `quit` or end of input. `quit` is forwarded to the
/// main thread; end of input just ends the console and leaves the service
/// running.
pub fn run(control: Control, input: impl BufRead, quit: Sender<()>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::warn!("console: failed to read input: {e}");
                break;
            }
        };
        match execute(&control, &line) {
            Reply::Output(out) if out.is_empty() => {}
            Reply::Output(out) => println!("{out}"),
            Reply::Quit => {
                let _ = quit.send(());
                return;
            }
        }
    }
    log::debug!("console: input closed");
}
