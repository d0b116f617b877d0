//! # Overlay User Interface Module
//!
//! The transparent, undecorated, always-on-top window the pet lives in.
//!
//! ## Why This Module Exists
//!
//! The window is both an input source and the output surface. Every frame it:
//!
//! - forwards its own key, button, cursor and focus events to the input hub
//!   through the [`WindowListener`]
//! - refreshes the [`MonitorCell`] the bridge reads for cursor tracking
//! - draws the pet from the [`ParameterBoard`] and the latest input snapshot
//! - shows the shared context menu and carries out the chosen action
//!
//! ## Integration Strategy
//!
//! The UI thread never blocks on the backend. Hub commands and config saves are
//! queued with `try_send`; snapshots are read from a watch channel.
//!
//! Repaints are requested at ~60fps so pulse expiry shows up without further
//! window events.
//!
//! Window penetration hides the context menu from the mouse, so it is also
//! bound to [`PENETRATION_SHORTCUT`] while the window has keyboard focus, and
//! it is never restored on startup.

pub mod common;
pub mod context_menu;

use eframe::egui::{self, Sense, ViewportCommand};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::bridge::{CursorMonitor, MonitorCell, ParameterBoard, Point, Size};
use crate::input::{InputControl, InputSnapshot, WindowListener};
use crate::menu::{shared_menu, MenuAction};
use crate::persistence::{AppConfig, ConfigAction};

use self::common::{draw_pet, window_size, PetPose};

/// Toggles window penetration; matches the menu accelerator
pub const PENETRATION_SHORTCUT: egui::KeyboardShortcut = egui::KeyboardShortcut::new(
    egui::Modifiers::COMMAND.plus(egui::Modifiers::SHIFT),
    egui::Key::P,
);

/// Everything the overlay needs from the backend
pub struct OverlayParts {
    pub config: AppConfig,
    pub input: InputControl,
    pub snapshots: watch::Receiver<InputSnapshot>,
    pub board: ParameterBoard,
    pub monitor: MonitorCell,
    pub persistence: mpsc::Sender<ConfigAction>,
}

pub struct OverlayApp {
    config: AppConfig,
    input: InputControl,
    listener: WindowListener,
    snapshots: watch::Receiver<InputSnapshot>,
    board: ParameterBoard,
    monitor: MonitorCell,
    persistence: mpsc::Sender<ConfigAction>,
}

impl OverlayApp {
    pub fn new(cc: &eframe::CreationContext<'_>, parts: OverlayParts) -> Self {
        cc.egui_ctx.set_theme(egui::Theme::Dark);
        info!("Overlay window created");
        OverlayApp {
            listener: parts.input.listener(),
            config: parts.config,
            input: parts.input,
            snapshots: parts.snapshots,
            board: parts.board,
            monitor: parts.monitor,
            persistence: parts.persistence,
        }
    }

    fn save_config(&self) {
        if let Err(e) = self
            .persistence
            .try_send(ConfigAction::Save(self.config.clone()))
        {
            error!("Failed to queue config save: {}", e);
        }
    }

    fn handle_action(&mut self, ctx: &egui::Context, action: MenuAction) {
        debug!("Menu action: {:?}", action);
        match action {
            MenuAction::HideWindow => ctx.send_viewport_cmd(ViewportCommand::Minimized(true)),
            MenuAction::Quit => ctx.send_viewport_cmd(ViewportCommand::Close),
            MenuAction::ToggleGlobalListener => {
                if self.input.is_global_active() {
                    self.input.stop_global();
                } else if !self.input.start_global() {
                    warn!("System-wide capture unavailable, keeping window capture");
                }
                self.config.global_listener = self.input.is_global_active();
                self.save_config();
            }
            other => {
                if !other.apply(&mut self.config) {
                    return;
                }
                match other {
                    MenuAction::SetMode(mode) => self.input.set_display_mode(mode),
                    MenuAction::ToggleSingleActive => {
                        self.input.set_single_active(self.config.single_active)
                    }
                    MenuAction::SetScale(_) => ctx.send_viewport_cmd(ViewportCommand::InnerSize(
                        window_size(self.config.scale_factor()),
                    )),
                    MenuAction::TogglePenetrable => {
                        if self.config.penetrable {
                            info!(
                                "Window penetration on, {} turns it off",
                                ctx.format_shortcut(&PENETRATION_SHORTCUT)
                            );
                        }
                        ctx.send_viewport_cmd(ViewportCommand::MousePassthrough(
                            self.config.penetrable,
                        ))
                    }
                    _ => {}
                }
                self.save_config();
            }
        }
    }
}

/// Hands one frame of window input to the backend.
///
/// The monitor goes first so the bridge never maps a new cursor position
/// against last frame's monitor.
fn forward_frame(
    listener: &mut WindowListener,
    monitor: &MonitorCell,
    monitor_info: Option<CursorMonitor>,
    events: &[egui::Event],
    modifiers: egui::Modifiers,
) {
    monitor.set(monitor_info);
    for event in events {
        listener.handle_event(event);
    }
    listener.sync_modifiers(modifiers);
}

/// Monitor info from the viewport; the monitor is assumed to start at the desktop origin
fn cursor_monitor(ctx: &egui::Context) -> Option<CursorMonitor> {
    ctx.input(|i| {
        let viewport = i.viewport();
        let monitor_size = viewport.monitor_size?;
        let outer = viewport.outer_rect?;
        let pointer = i.pointer.latest_pos()?;
        Some(CursorMonitor {
            name: None,
            size: Size {
                width: monitor_size.x,
                height: monitor_size.y,
            },
            position: Point::default(),
            scale_factor: viewport.native_pixels_per_point.unwrap_or(1.0),
            cursor_position: Point {
                x: outer.min.x + pointer.x,
                y: outer.min.y + pointer.y,
            },
        })
    })
}

impl eframe::App for OverlayApp {
    fn clear_color(&self, _visuals: &egui::Visuals) -> [f32; 4] {
        [0.0, 0.0, 0.0, 0.0]
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let (events, modifiers) = ctx.input(|i| (i.events.clone(), i.modifiers));
        forward_frame(
            &mut self.listener,
            &self.monitor,
            cursor_monitor(ctx),
            &events,
            modifiers,
        );
        if ctx.input_mut(|i| i.consume_shortcut(&PENETRATION_SHORTCUT)) {
            self.handle_action(ctx, MenuAction::TogglePenetrable);
        }

        let snapshot = self.snapshots.borrow().clone();
        let pose = PetPose::new(&self.board, &snapshot, self.config.mirror_mode);
        let menu = shared_menu(&self.config, self.input.is_global_active());
        let opacity = self.config.opacity_factor();
        let mut clicked = None;

        egui::CentralPanel::default()
            .frame(egui::Frame::default())
            .show(ctx, |ui| {
                let rect = ui.max_rect();
                let response = ui.interact(rect, ui.id().with("pet"), Sense::click_and_drag());
                if response.drag_started() {
                    ctx.send_viewport_cmd(ViewportCommand::StartDrag);
                }

                draw_pet(ui.painter(), rect, &pose, opacity);

                response.context_menu(|ui| context_menu::render(ui, &menu, &mut clicked));
            });

        if let Some(action) = clicked {
            self.handle_action(ctx, action);
        }

        ctx.request_repaint_after(Duration::from_millis(16));
    }
}
