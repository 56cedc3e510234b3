//! Command-line arguments and process signals for the `capslayer` binary.

use std::path::PathBuf;
use std::sync::mpsc::Sender;

use clap::Parser;

use crate::config::Config;

/// CapsLock chord layer: system-wide keyboard remapping
#[derive(Parser, Debug)]
#[command(name = "capslayer", version, about)]
pub struct Cli {
    /// Config file to load (default: <config dir>/capslayer/config.toml)
    #[arg(value_name = "CONFIG")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// The explicit path, or the platform default when none was given.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Config::default_path)
    }
}

/// Handler body for SIGINT/SIGTERM: asks the main loop to return so the
/// service is stopped and the hardware remap reverted.
pub fn quit_on_signal(quit: Sender<()>) -> impl FnMut() + Send + 'static {
    move || {
        log::info!("signal: shutting down");
        let _ = quit.send(());
    }
}

/// Installs `quit_on_signal` for Ctrl+C and termination requests.
pub fn install_signal_handler(quit: Sender<()>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(quit_on_signal(quit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    use pretty_assertions::assert_eq;

    #[test]
    fn no_arguments_uses_default_path() {
        let cli = Cli::try_parse_from(["capslayer"]).unwrap();
        assert!(cli.config.is_none());
        assert_eq!(cli.config_path(), Config::default_path());
    }

    #[test]
    fn positional_argument_is_the_config_path() {
        let cli = Cli::try_parse_from(["capslayer", "/tmp/layer.toml"]).unwrap();
        assert_eq!(cli.config_path(), Some(PathBuf::from("/tmp/layer.toml")));
    }

    #[test]
    fn stray_arguments_are_rejected() {
        let err = Cli::try_parse_from(["capslayer", "a.toml", "b.toml"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);

        let err = Cli::try_parse_from(["capslayer", "--verbose"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn version_and_help_flags() {
        let err = Cli::try_parse_from(["capslayer", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);

        let err = Cli::try_parse_from(["capslayer", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn signal_handler_asks_the_main_loop_to_quit() {
        let (tx, rx) = mpsc::channel();
        let mut on_signal = quit_on_signal(tx);
        on_signal();
        assert_eq!(rx.try_recv(), Ok(()));
        // A second signal after the loop is gone is harmless.
        drop(rx);
        on_signal();
    }
}
