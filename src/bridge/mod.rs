//! Consumer bridge: input snapshots → animation parameters
//!
//! Watches the snapshots published by the input hub and turns every change
//! into parameter writes on an [`AnimationEngine`]. The bridge keeps only the
//! previous snapshot for change detection; the input state itself lives in the
//! hub.
//!
//! ```text
//! watch<InputSnapshot> ──► Bridge ──► AnimationEngine::set_parameter_value
//!                            │
//!                       WindowHost (cursor monitor)
//! ```

pub mod engine;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use engine::{AnimationEngine, EngineError, ModelData, ParamValue, ParameterBoard};

use crate::input::{DisplayMode, InputSnapshot, MouseButton};

pub const PARAM_RIGHT_HAND_DOWN: &str = "CatParamRightHandDown";
pub const PARAM_LEFT_HAND_DOWN: &str = "CatParamLeftHandDown";
pub const PARAM_MOUSE_LEFT_DOWN: &str = "ParamMouseLeftDown";
pub const PARAM_MOUSE_RIGHT_DOWN: &str = "ParamMouseRightDown";

pub const PARAM_ANGLE_X: &str = "PARAM_ANGLE_X";
pub const PARAM_ANGLE_Y: &str = "PARAM_ANGLE_Y";
pub const PARAM_EYE_BALL_X: &str = "PARAM_EYE_BALL_X";
pub const PARAM_EYE_BALL_Y: &str = "PARAM_EYE_BALL_Y";
pub const PARAM_BODY_ANGLE_X: &str = "PARAM_BODY_ANGLE_X";
pub const PARAM_TAIL_SWAY_X: &str = "ParamCatTailSwayX";
pub const PARAM_TAIL_SWAY_Y: &str = "ParamCatTailSwayY";
pub const PARAM_EAR_L: &str = "ParamCatEarL";
pub const PARAM_EAR_R: &str = "ParamCatEarR";

// Half-width of the head/eye angle range
const CURSOR_RANGE: f32 = 30.0;

const MODEL_FILE: &str = "cat.model3.json";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

/// Monitor under the cursor, in desktop coordinates
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CursorMonitor {
    pub name: Option<String>,
    pub size: Size,
    pub position: Point,
    pub scale_factor: f32,
    pub cursor_position: Point,
}

/// Window host queried for the monitor under the cursor.
///
/// `None` means the information is unavailable this frame.
pub trait WindowHost: Send + Sync + 'static {
    fn cursor_monitor(&self) -> Option<CursorMonitor>;
}

/// Shared slot the overlay refreshes every frame
#[derive(Debug, Clone, Default)]
pub struct MonitorCell {
    monitor: Arc<RwLock<Option<CursorMonitor>>>,
}

impl MonitorCell {
    pub fn set(&self, monitor: Option<CursorMonitor>) {
        *self.monitor.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = monitor;
    }
}

impl WindowHost for MonitorCell {
    fn cursor_monitor(&self) -> Option<CursorMonitor> {
        self.monitor
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

pub fn model_path(root: &Path, mode: DisplayMode) -> PathBuf {
    root.join(mode.as_str()).join(MODEL_FILE)
}

/// Right paw follows directional keys, left paw everything else
pub fn key_parameters(snapshot: &InputSnapshot) -> [(&'static str, ParamValue); 2] {
    [
        (
            PARAM_RIGHT_HAND_DOWN,
            ParamValue::Bool(snapshot.has_directional_key()),
        ),
        (
            PARAM_LEFT_HAND_DOWN,
            ParamValue::Bool(snapshot.has_non_directional_key()),
        ),
    ]
}

pub fn button_parameters(snapshot: &InputSnapshot) -> [(&'static str, ParamValue); 2] {
    [
        (
            PARAM_MOUSE_LEFT_DOWN,
            ParamValue::Bool(snapshot.is_button_active(MouseButton::Left)),
        ),
        (
            PARAM_MOUSE_RIGHT_DOWN,
            ParamValue::Bool(snapshot.is_button_active(MouseButton::Right)),
        ),
    ]
}

/// Head, eye, body, tail and ear angles for the cursor position.
///
/// The cursor is mapped to -30..=30 on both axes across the monitor. Returns
/// `None` for a monitor without area.
pub fn cursor_parameters(monitor: &CursorMonitor) -> Option<[(&'static str, ParamValue); 9]> {
    if monitor.size.width <= 0.0 || monitor.size.height <= 0.0 {
        return None;
    }

    let ratio_x = (monitor.cursor_position.x - monitor.position.x) / monitor.size.width;
    let ratio_y = (monitor.cursor_position.y - monitor.position.y) / monitor.size.height;
    let x = (ratio_x * CURSOR_RANGE * 2.0 - CURSOR_RANGE).clamp(-CURSOR_RANGE, CURSOR_RANGE);
    let y = (ratio_y * CURSOR_RANGE * 2.0 - CURSOR_RANGE).clamp(-CURSOR_RANGE, CURSOR_RANGE);

    Some([
        (PARAM_ANGLE_X, ParamValue::Number(x)),
        (PARAM_ANGLE_Y, ParamValue::Number(-y)),
        (PARAM_EYE_BALL_X, ParamValue::Number(x)),
        (PARAM_EYE_BALL_Y, ParamValue::Number(-y)),
        (PARAM_BODY_ANGLE_X, ParamValue::Number(x * 0.5)),
        (PARAM_TAIL_SWAY_X, ParamValue::Number(x * 0.5)),
        (PARAM_TAIL_SWAY_Y, ParamValue::Number(-y * 0.5)),
        (PARAM_EAR_L, ParamValue::Number(x.abs() * 0.5)),
        (PARAM_EAR_R, ParamValue::Number(x.abs() * 0.5)),
    ])
}

struct Bridge {
    engine: Box<dyn AnimationEngine>,
    host: Arc<dyn WindowHost>,
    model_root: PathBuf,
    last: Option<InputSnapshot>,
}

impl Bridge {
    fn apply(&mut self, snapshot: &InputSnapshot) {
        let previous = self.last.take();

        let reloaded = match &previous {
            Some(previous) if previous.display_mode == snapshot.display_mode => false,
            _ => {
                self.load_model(snapshot.display_mode);
                true
            }
        };

        let keys_changed = reloaded || previous.as_ref().map_or(true, |p| p.keys != snapshot.keys);
        if keys_changed {
            self.write(key_parameters(snapshot));
        }

        let buttons_changed =
            reloaded || previous.as_ref().map_or(true, |p| p.buttons != snapshot.buttons);
        if buttons_changed {
            self.write(button_parameters(snapshot));
        }

        let cursor_changed =
            reloaded || previous.as_ref().map_or(true, |p| p.cursor != snapshot.cursor);
        if cursor_changed && snapshot.display_mode == DisplayMode::Standard {
            self.follow_cursor();
        }

        self.last = Some(snapshot.clone());
    }

    fn load_model(&mut self, mode: DisplayMode) {
        let path = model_path(&self.model_root, mode);
        match self.engine.load(&path) {
            Ok(model) => info!(
                "Loaded {} model: {} motions, {} expressions",
                mode,
                model.motions.len(),
                model.expressions.len()
            ),
            Err(e) => warn!("Failed to load {} model: {}", mode, e),
        }
    }

    fn follow_cursor(&mut self) {
        let Some(monitor) = self.host.cursor_monitor() else {
            debug!("No monitor info, cursor frame skipped");
            return;
        };
        match cursor_parameters(&monitor) {
            Some(params) => self.write(params),
            None => debug!("Monitor {:?} has no area, cursor frame skipped", monitor.name),
        }
    }

    fn write(&mut self, params: impl IntoIterator<Item = (&'static str, ParamValue)>) {
        for (id, value) in params {
            if let Err(e) = self.engine.set_parameter_value(id, value) {
                warn!("Failed to set {}: {}", id, e);
            }
        }
    }

    async fn run(mut self, mut snapshots: watch::Receiver<InputSnapshot>, shutdown: CancellationToken) {
        info!("Bridge running");
        let initial = snapshots.borrow_and_update().clone();
        self.apply(&initial);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        info!("Snapshot channel closed, stopping bridge");
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    self.apply(&snapshot);
                }
            }
        }

        self.engine.destroy();
        info!("Bridge stopped");
    }
}

/// Handle for the bridge task
pub struct BridgeHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl BridgeHandle {
    pub fn spawn(
        snapshots: watch::Receiver<InputSnapshot>,
        engine: Box<dyn AnimationEngine>,
        host: Arc<dyn WindowHost>,
        model_root: PathBuf,
    ) -> Self {
        info!("Spawning bridge, model root: {}", model_root.display());
        let bridge = Bridge {
            engine,
            host,
            model_root,
            last: None,
        };
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(bridge.run(snapshots, shutdown.clone()));
        Self { shutdown, task }
    }

    /// Stops the bridge and waits until the engine is destroyed
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!("Bridge task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{CursorPosition, KeyId};

    fn monitor(cursor_x: f32, cursor_y: f32) -> CursorMonitor {
        CursorMonitor {
            name: Some("primary".to_string()),
            size: Size {
                width: 1000.0,
                height: 500.0,
            },
            position: Point { x: 0.0, y: 0.0 },
            scale_factor: 1.0,
            cursor_position: Point {
                x: cursor_x,
                y: cursor_y,
            },
        }
    }

    fn bridge(board: &ParameterBoard, host: &MonitorCell) -> Bridge {
        Bridge {
            engine: Box::new(board.clone()),
            host: Arc::new(host.clone()),
            model_root: PathBuf::from("/models"),
            last: None,
        }
    }

    fn value_of(params: &[(&'static str, ParamValue)], id: &str) -> f32 {
        params
            .iter()
            .find(|(name, _)| *name == id)
            .map(|(_, value)| value.as_f32())
            .unwrap()
    }

    #[test]
    fn paws_follow_key_classes() {
        let snapshot = InputSnapshot {
            keys: vec![KeyId::KeyA, KeyId::LeftArrow],
            ..InputSnapshot::default()
        };
        let params = key_parameters(&snapshot);
        assert_eq!(value_of(&params, PARAM_RIGHT_HAND_DOWN), 1.0);
        assert_eq!(value_of(&params, PARAM_LEFT_HAND_DOWN), 1.0);

        let params = key_parameters(&InputSnapshot::default());
        assert_eq!(value_of(&params, PARAM_RIGHT_HAND_DOWN), 0.0);
        assert_eq!(value_of(&params, PARAM_LEFT_HAND_DOWN), 0.0);
    }

    #[test]
    fn cursor_is_mapped_across_the_monitor() {
        let params = cursor_parameters(&monitor(0.0, 0.0)).unwrap();
        assert_eq!(value_of(&params, PARAM_ANGLE_X), -30.0);
        assert_eq!(value_of(&params, PARAM_ANGLE_Y), 30.0);
        assert_eq!(value_of(&params, PARAM_EAR_L), 15.0);

        let params = cursor_parameters(&monitor(500.0, 250.0)).unwrap();
        assert_eq!(value_of(&params, PARAM_ANGLE_X), 0.0);
        assert_eq!(value_of(&params, PARAM_EYE_BALL_Y), 0.0);

        let params = cursor_parameters(&monitor(1000.0, 500.0)).unwrap();
        assert_eq!(value_of(&params, PARAM_BODY_ANGLE_X), 15.0);
        assert_eq!(value_of(&params, PARAM_TAIL_SWAY_Y), -15.0);

        let mut flat = monitor(1.0, 1.0);
        flat.size.height = 0.0;
        assert!(cursor_parameters(&flat).is_none());
    }

    #[test]
    fn snapshot_changes_become_parameter_writes() {
        let board = ParameterBoard::new();
        let host = MonitorCell::default();
        let mut bridge = bridge(&board, &host);

        bridge.apply(&InputSnapshot::default());
        assert_eq!(
            board.model(),
            Some(PathBuf::from("/models/standard/cat.model3.json"))
        );
        assert!(!board.is_on(PARAM_LEFT_HAND_DOWN));

        bridge.apply(&InputSnapshot {
            keys: vec![KeyId::KeyQ],
            buttons: vec![MouseButton::Right],
            ..InputSnapshot::default()
        });
        assert!(board.is_on(PARAM_LEFT_HAND_DOWN));
        assert!(!board.is_on(PARAM_RIGHT_HAND_DOWN));
        assert!(board.is_on(PARAM_MOUSE_RIGHT_DOWN));
        assert!(!board.is_on(PARAM_MOUSE_LEFT_DOWN));
    }

    #[test]
    fn cursor_frames_need_monitor_info_and_standard_mode() {
        let board = ParameterBoard::new();
        let host = MonitorCell::default();
        let mut bridge = bridge(&board, &host);
        bridge.apply(&InputSnapshot::default());

        let moved = InputSnapshot {
            cursor: CursorPosition { x: 5.0, y: 5.0 },
            ..InputSnapshot::default()
        };
        bridge.apply(&moved);
        assert_eq!(board.value(PARAM_ANGLE_X), None);

        host.set(Some(monitor(1000.0, 250.0)));
        bridge.apply(&InputSnapshot {
            cursor: CursorPosition { x: 6.0, y: 5.0 },
            ..InputSnapshot::default()
        });
        assert_eq!(board.number(PARAM_ANGLE_X), 30.0);

        bridge.apply(&InputSnapshot {
            cursor: CursorPosition { x: 7.0, y: 5.0 },
            display_mode: DisplayMode::Keyboard,
            ..InputSnapshot::default()
        });
        assert_eq!(
            board.model(),
            Some(PathBuf::from("/models/keyboard/cat.model3.json"))
        );
        assert_eq!(board.value(PARAM_ANGLE_X), None);
    }

    #[tokio::test]
    async fn shutdown_destroys_engine() {
        let board = ParameterBoard::new();
        let (tx, rx) = watch::channel(InputSnapshot::default());
        let handle = BridgeHandle::spawn(
            rx,
            Box::new(board.clone()),
            Arc::new(MonitorCell::default()),
            PathBuf::from("/models"),
        );

        tx.send_replace(InputSnapshot {
            keys: vec![KeyId::LeftArrow],
            display_mode: DisplayMode::Keyboard,
            ..InputSnapshot::default()
        });
        handle.shutdown().await;

        assert!(board.is_destroyed());
    }
}
