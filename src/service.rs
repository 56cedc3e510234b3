//! Service lifecycle: hardware remap, tap start/stop, health.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{Config, ConfigError};
use crate::control::Control;
use crate::dispatch::Dispatcher;
use crate::engine::{Engine, Shared};
use crate::platform::macos::remap::HardwareRemap;
use crate::platform::{self, ActionExecutor, InputCapture, PlatformError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ServiceHealth {
    Stopped,
    Running,
    /// Tap running, but part of the setup failed (e.g. the hardware remap).
    Degraded(String),
    PermissionDenied(String),
}

impl fmt::Display for ServiceHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceHealth::Stopped => f.write_str("stopped"),
            ServiceHealth::Running => f.write_str("running"),
            ServiceHealth::Degraded(reason) => write!(f, "degraded: {reason}"),
            ServiceHealth::PermissionDenied(reason) => write!(f, "permission denied: {reason}"),
        }
    }
}

/// Undo handle for a key remap installed below the tap.
pub trait KeyRemap: Send {
    fn revert(&mut self) -> Result<(), PlatformError>;
}

impl KeyRemap for HardwareRemap {
    fn revert(&mut self) -> Result<(), PlatformError> {
        HardwareRemap::revert(self)
    }
}

/// Installs the CapsLock remap when the service starts.
pub type RemapStep = Box<dyn Fn() -> Result<Box<dyn KeyRemap>, PlatformError> + Send>;

fn hidutil_remap() -> Result<Box<dyn KeyRemap>, PlatformError> {
    Ok(Box::new(HardwareRemap::apply()?))
}

pub struct Service {
    config: Config,
    shared: Arc<Shared>,
    capture: Option<Box<dyn InputCapture>>,
    remap: Option<Box<dyn KeyRemap>>,
    /// `None` where the platform delivers CapsLock edges without help.
    remap_step: Option<RemapStep>,
}

impl Service {
    /// Builds the action table from `config`. Nothing is installed until
    /// `start()`.
    pub fn new(config: Config) -> Result<Self, ServiceError> {
        let table = config.action_table(platform::SUPPORTS_INPUT_SOURCES)?;
        log::info!("service: {} mappings loaded", table.len());
        let remap_step: Option<RemapStep> = if cfg!(target_os = "macos") {
            Some(Box::new(hidutil_remap) as RemapStep)
        } else {
            None
        };
        Ok(Self {
            config,
            shared: Shared::new(table),
            capture: None,
            remap: None,
            remap_step,
        })
    }

    /// Replaces the platform remap step. Used when `hardware_remap` is on.
    pub fn with_remap_step(mut self, step: RemapStep) -> Self {
        self.remap_step = Some(step);
        self
    }

    pub fn control(&self) -> Control {
        Control::new(Arc::clone(&self.shared))
    }

    pub fn is_running(&self) -> bool {
        self.capture.is_some()
    }

    /// Starts the tap with the platform backends.
    pub fn start(&mut self) -> Result<(), ServiceError> {
        if self.is_running() {
            return Ok(());
        }
        let executor = platform::create_action_executor()?;
        let capture = platform::create_input_capture()?;
        self.start_with(capture, executor)
    }

    /// Applies the remap step; returns the degraded reason when it failed.
    fn apply_remap(&mut self) -> Option<String> {
        if !self.config.hardware_remap || self.remap.is_some() {
            return None;
        }
        let step = self.remap_step.as_ref()?;
        match step() {
            Ok(remap) => {
                self.remap = Some(remap);
                None
            }
            Err(e) => {
                log::warn!("service: hardware remap failed, CapsLock will not chord: {e}");
                Some(format!("hardware remap failed: {e}"))
            }
        }
    }

    fn revert_remap(&mut self) -> Result<(), PlatformError> {
        match self.remap.take() {
            Some(mut remap) => remap.revert(),
            None => Ok(()),
        }
    }

    /// Starts the tap with explicit backends.
    pub fn start_with(
        &mut self,
        mut capture: Box<dyn InputCapture>,
        executor: Box<dyn ActionExecutor>,
    ) -> Result<(), ServiceError> {
        if self.is_running() {
            return Ok(());
        }

        let degraded = self.apply_remap();
        let dispatcher = Dispatcher::new(executor, self.config.editing.clone());
        let engine = Engine::new(Arc::clone(&self.shared), dispatcher, self.config.chord_key());

        if let Err(e) = capture.start(Box::new(engine)) {
            if let Err(revert) = self.revert_remap() {
                log::warn!("service: {revert}");
            }
            let health = match &e {
                PlatformError::PermissionDenied(reason) => {
                    ServiceHealth::PermissionDenied(reason.clone())
                }
                _ => ServiceHealth::Stopped,
            };
            self.shared.set_health(health);
            log::error!("service: failed to start keyboard tap: {e}");
            return Err(e.into());
        }

        self.capture = Some(capture);
        self.shared.set_health(match degraded {
            Some(reason) => ServiceHealth::Degraded(reason),
            None => ServiceHealth::Running,
        });
        log::info!(
            "service: running (chord key {})",
            self.config.chord_key()
        );
        Ok(())
    }

    /// Removes the tap and reverts the hardware remap. Idempotent.
    pub fn stop(&mut self) -> Result<(), ServiceError> {
        let mut result = Ok(());
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.stop() {
                log::warn!("service: failed to stop keyboard tap: {e}");
                result = Err(e.into());
            }
        }
        if let Err(e) = self.revert_remap() {
            log::warn!("service: {e}");
            result = result.and(Err(e.into()));
        }
        if self.shared.health() != ServiceHealth::Stopped {
            log::info!("service: stopped");
        }
        self.shared.set_health(ServiceHealth::Stopped);
        result
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
