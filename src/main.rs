//! capslayer -- CapsLock chord layer.
//!
//! Entry point, service lifecycle, and signal handling: loads the config,
//! starts the keyboard tap, reads control commands from stdin and keeps the
//! main thread free for the platform.

use std::io;
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;

use clap::Parser;

use capslayer::cli::{self, Cli};
use capslayer::config::Config;
use capslayer::service::Service;
use capslayer::{console, platform};

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("capslayer v{}", env!("CARGO_PKG_VERSION"));

    let config = match cli.config_path() {
        Some(path) => {
            log::info!("config: {}", path.display());
            Config::load_or_default(&path)
        }
        None => {
            log::warn!("config: no config directory found, using defaults");
            Ok(Config::default())
        }
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            log::error!("config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut service = match Service::new(config) {
        Ok(service) => service,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = service.start() {
        log::error!("{e}");
        return ExitCode::FAILURE;
    }

    let control = service.control();
    let updates = control.subscribe();
    let _ = thread::Builder::new()
        .name("status-updates".into())
        .spawn(move || {
            for update in updates {
                log::info!("{}: paused={} ({:?})", update.event_name(), update.paused, update.origin);
            }
        });

    let (quit_tx, quit_rx) = mpsc::channel();
    // Ctrl+C must still run `service.stop()` so the hardware remap is reverted.
    if let Err(e) = cli::install_signal_handler(quit_tx.clone()) {
        log::warn!("signal: handler not installed: {e}");
    }
    // Held here so the main loop ends on `quit` only, not on console EOF.
    let _quit_keepalive = quit_tx.clone();
    let console = thread::Builder::new()
        .name("console".into())
        .spawn(move || console::run(control, io::stdin().lock(), quit_tx));
    if let Err(e) = console {
        log::warn!("console: not started: {e}");
    }

    platform::run_main_loop(quit_rx);

    match service.stop() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
