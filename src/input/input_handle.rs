//! Input Handle - lifecycle and API of the input hub
//!
//! Spawns the hub task that owns [`InputState`] and serializes everything that
//! touches it: window events, system-wide pulses, expiry timers and mode
//! switches. Consumers observe the result through a watch channel.
//!

use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::input::events::{CaptureMode, InputEvent, InputSnapshot};
use crate::input::keys::{DisplayMode, KeyCatalog};
use crate::input::listener::WindowListener;
use crate::input::registrar::{
    lock_or_recover, PulseEvent, ShortcutBackend, SystemWideRegistrar,
};
use crate::input::state::{InputState, StateSettings};

/// Configuration of the input hub
///
/// `pulse_release_ms` is how long a system-wide key stays active after its last
/// pulse. `toggle_debounce_ms` is how long a toggle key stays active after a
/// press, whatever the capture path.
#[derive(Clone, Debug)]
pub struct InputSettings {
    pub pulse_release_ms: u64,
    pub toggle_debounce_ms: u64,
    pub single_active: bool,
    pub display_mode: DisplayMode,
    /// Capacity of the command queue between UI thread and hub
    pub command_buffer: usize,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            pulse_release_ms: 100,
            toggle_debounce_ms: 100,
            single_active: false,
            display_mode: DisplayMode::Standard,
            command_buffer: 1000,
        }
    }
}

impl InputSettings {
    fn state_settings(&self) -> StateSettings {
        StateSettings {
            pulse_release: Duration::from_millis(self.pulse_release_ms),
            toggle_debounce: Duration::from_millis(self.toggle_debounce_ms),
            single_active: self.single_active,
            display_mode: self.display_mode,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),
}

// Everything the hub task accepts besides pulses and capture-mode changes
#[derive(Debug)]
pub enum HubCommand {
    Input(InputEvent),
    SetDisplayMode(DisplayMode),
    SetSingleActive(bool),
}

struct InputHub {
    state: InputState,
    commands: mpsc::Receiver<HubCommand>,
    capture: watch::Receiver<CaptureMode>,
    pulses: broadcast::Receiver<PulseEvent>,
    pulses_open: bool,
    snapshots: watch::Sender<InputSnapshot>,
    shutdown: CancellationToken,
}

impl InputHub {
    async fn run(mut self) {
        info!("Input hub running");

        loop {
            let deadline = self.state.next_deadline();
            let expiry = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            // Capture mode is polled before pulses so a pulse fired right after
            // activation is never judged against the old mode.
            let changed = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Input hub shutting down");
                    break;
                }
                result = self.capture.changed() => match result {
                    Ok(()) => {
                        let mode = *self.capture.borrow_and_update();
                        self.state.set_capture_mode(mode)
                    }
                    Err(_) => {
                        info!("Capture control dropped, stopping input hub");
                        break;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("All command senders dropped, stopping input hub");
                        break;
                    }
                },
                pulse = self.pulses.recv(), if self.pulses_open => match pulse {
                    Ok(pulse) => self
                        .state
                        .ingest(InputEvent::pulse(pulse.identifier, pulse.timestamp), Instant::now()),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Input hub lagged behind, {} pulses skipped", skipped);
                        false
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("Pulse channel closed");
                        self.pulses_open = false;
                        false
                    }
                },
                _ = expiry => self.state.expire_due(Instant::now()),
            };

            if changed {
                self.publish();
            }
        }
    }

    fn handle_command(&mut self, command: HubCommand) -> bool {
        match command {
            HubCommand::Input(event) => self.state.ingest(event, Instant::now()),
            HubCommand::SetDisplayMode(mode) => self.state.set_display_mode(mode),
            HubCommand::SetSingleActive(enabled) => self.state.set_single_active(enabled),
        }
    }

    fn publish(&self) {
        let snapshot = self.state.snapshot();
        let notified = self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        if notified {
            debug!("Published input snapshot");
        }
    }
}

/// Cloneable control surface for the UI thread.
///
/// All methods are synchronous; commands are queued with `try_send` and a full
/// queue is logged, never awaited. Capture-mode changes bypass the queue.
#[derive(Clone)]
pub struct InputControl {
    commands: mpsc::Sender<HubCommand>,
    capture: Arc<watch::Sender<CaptureMode>>,
    registrar: Arc<Mutex<SystemWideRegistrar>>,
}

impl InputControl {
    pub fn listener(&self) -> WindowListener {
        WindowListener::new(self.commands.clone())
    }

    /// Activates system-wide capture and makes it authoritative.
    ///
    /// Returns false when the shortcut backend is unavailable, in which case the
    /// window path stays in charge.
    pub fn start_global(&self) -> bool {
        let mut registrar = lock_or_recover(&self.registrar);
        // Switch first, the backend may fire as soon as it is bound
        self.capture.send_replace(CaptureMode::SystemWide);
        let activated = registrar.activate();
        if !activated {
            self.capture.send_replace(CaptureMode::WindowScoped);
        }
        activated
    }

    pub fn stop_global(&self) {
        lock_or_recover(&self.registrar).deactivate();
        self.capture.send_replace(CaptureMode::WindowScoped);
    }

    pub fn is_global_active(&self) -> bool {
        lock_or_recover(&self.registrar).is_active()
    }

    pub fn set_display_mode(&self, mode: DisplayMode) {
        self.send(HubCommand::SetDisplayMode(mode));
    }

    pub fn set_single_active(&self, enabled: bool) {
        self.send(HubCommand::SetSingleActive(enabled));
    }

    fn send(&self, command: HubCommand) {
        if let Err(e) = self.commands.try_send(command) {
            error!("Failed to queue hub command: {}", e);
        }
    }
}

/// Handle for the input hub lifecycle
///
/// # Threading Model
///
/// ```text
/// WindowListener ─[HubCommand]──┐
/// InputControl ───[HubCommand]──┤
/// InputControl ───[CaptureMode]─┼→ InputHub task ─[InputSnapshot]→ watch subscribers
/// Registrar ──────[PulseEvent]──┘        ↑
///                                  expiry timers
/// ```
///
/// The hub is the only owner of the active sets, so timer expiry and event
/// ingestion never interleave.
pub struct InputHandle {
    control: InputControl,
    snapshots: watch::Receiver<InputSnapshot>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl InputHandle {
    /// Spawns the hub task on the current tokio runtime
    ///
    /// # Arguments
    ///
    /// * `settings` - Optional configuration; uses defaults if None
    /// * `catalog` - Keys that have an asset and may become active
    /// * `backend` - Shortcut backend used for system-wide capture
    ///
    /// # Errors
    ///
    /// [`InputError::InitializationError`] when called outside a tokio runtime.
    pub fn spawn(
        settings: Option<InputSettings>,
        catalog: KeyCatalog,
        backend: Box<dyn ShortcutBackend>,
    ) -> Result<Self, InputError> {
        info!("Initializing input hub");
        let settings = settings.unwrap_or_default();
        debug!("Input settings: {:?}", settings);

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| InputError::InitializationError(e.to_string()))?;

        if settings.command_buffer == 0 {
            return Err(InputError::InitializationError(
                "command buffer must not be empty".to_string(),
            ));
        }

        let registrar = SystemWideRegistrar::new(backend);
        let pulses = registrar.subscribe();
        let (command_tx, command_rx) = mpsc::channel(settings.command_buffer);
        let (capture_tx, capture_rx) = watch::channel(CaptureMode::WindowScoped);

        let state = InputState::new(settings.state_settings(), catalog);
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());
        let shutdown = CancellationToken::new();

        let hub = InputHub {
            state,
            commands: command_rx,
            capture: capture_rx,
            pulses,
            pulses_open: true,
            snapshots: snapshot_tx,
            shutdown: shutdown.clone(),
        };
        let task = runtime.spawn(hub.run());
        info!("Input hub spawned");

        Ok(Self {
            control: InputControl {
                commands: command_tx,
                capture: Arc::new(capture_tx),
                registrar: Arc::new(Mutex::new(registrar)),
            },
            snapshots: snapshot_rx,
            shutdown,
            task,
        })
    }

    pub fn control(&self) -> InputControl {
        self.control.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<InputSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> InputSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Unbinds system-wide triggers, stops the hub and waits for it
    pub async fn shutdown(self) -> Result<(), InputError> {
        info!("Shutting down input hub");
        lock_or_recover(&self.control.registrar).deactivate();
        self.shutdown.cancel();
        self.task
            .await
            .map_err(|e| InputError::ChannelError(format!("hub task failed: {}", e)))
    }
}
