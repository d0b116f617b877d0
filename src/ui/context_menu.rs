use eframe::egui;

use crate::menu::{MenuAction, MenuItem, MenuItemKind};

/// Renders a menu template into `ui`; the action of a clicked item lands in `clicked`
pub fn render(ui: &mut egui::Ui, items: &[MenuItem], clicked: &mut Option<MenuAction>) {
    for item in items {
        let response = match item.kind {
            MenuItemKind::Separator => {
                ui.separator();
                continue;
            }
            MenuItemKind::Submenu => {
                ui.menu_button(&item.label, |ui| render(ui, &item.submenu, clicked));
                continue;
            }
            MenuItemKind::Checkbox => {
                let mut checked = item.is_checked();
                ui.add_enabled(item.enabled, egui::Checkbox::new(&mut checked, &item.label))
            }
            MenuItemKind::Radio => ui.add_enabled(
                item.enabled,
                egui::RadioButton::new(item.is_checked(), &item.label),
            ),
            MenuItemKind::Normal => {
                let mut button = egui::Button::new(&item.label);
                if let Some(accelerator) = &item.accelerator {
                    button = button.shortcut_text(accelerator);
                }
                ui.add_enabled(item.enabled, button)
            }
        };

        if response.clicked() {
            if let Some(action) = item.action {
                *clicked = Some(action);
                ui.close_menu();
            }
        }
    }
}
