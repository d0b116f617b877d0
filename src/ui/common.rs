//! # Overlay drawing helpers
//!
//! The pet is drawn with plain egui shapes from the values on the
//! [`ParameterBoard`]: paws follow the hand parameters, head and eyes follow the
//! cursor angles. Colors are compile-time constants, faded by the configured
//! opacity at draw time.

use eframe::egui::{self, pos2, vec2, Align2, Color32, FontId, Painter, Pos2, Rect, Shape, Stroke, Vec2};

use crate::bridge::{
    ParameterBoard, PARAM_ANGLE_X, PARAM_ANGLE_Y, PARAM_EYE_BALL_X, PARAM_EYE_BALL_Y,
    PARAM_LEFT_HAND_DOWN, PARAM_MOUSE_LEFT_DOWN, PARAM_MOUSE_RIGHT_DOWN, PARAM_RIGHT_HAND_DOWN,
};
use crate::input::InputSnapshot;

/// Base edge length of the overlay window at 100% scale
pub const BASE_WINDOW_SIZE: f32 = 300.0;

// Range of the angle parameters written by the bridge
const ANGLE_RANGE: f32 = 30.0;

pub struct PetColors;

impl PetColors {
    pub const BODY: Color32 = Color32::from_rgb(250, 250, 250);
    pub const OUTLINE: Color32 = Color32::from_rgb(30, 30, 30);
    pub const PAW_DOWN: Color32 = Color32::from_rgb(255, 180, 190);
    pub const DESK: Color32 = Color32::from_rgb(120, 90, 70);
    pub const KEY_BADGE: Color32 = Color32::from_rgb(50, 200, 20);
    pub const MOUSE_ACTIVE: Color32 = Color32::from_rgb(200, 50, 20);
}

/// Everything the painter needs for one frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PetPose {
    pub left_paw_down: bool,
    pub right_paw_down: bool,
    pub mouse_left: bool,
    pub mouse_right: bool,
    /// Head direction, -1..=1 on both axes, y up
    pub head: Vec2,
    /// Eye direction, -1..=1 on both axes, y up
    pub eyes: Vec2,
    pub keys: Vec<String>,
}

impl PetPose {
    pub fn new(board: &ParameterBoard, snapshot: &InputSnapshot, mirrored: bool) -> Self {
        let mut left_paw_down = board.is_on(PARAM_LEFT_HAND_DOWN);
        let mut right_paw_down = board.is_on(PARAM_RIGHT_HAND_DOWN);
        let mut head = vec2(board.number(PARAM_ANGLE_X), board.number(PARAM_ANGLE_Y)) / ANGLE_RANGE;
        let mut eyes =
            vec2(board.number(PARAM_EYE_BALL_X), board.number(PARAM_EYE_BALL_Y)) / ANGLE_RANGE;

        if mirrored {
            std::mem::swap(&mut left_paw_down, &mut right_paw_down);
            head.x = -head.x;
            eyes.x = -eyes.x;
        }

        Self {
            left_paw_down,
            right_paw_down,
            mouse_left: board.is_on(PARAM_MOUSE_LEFT_DOWN),
            mouse_right: board.is_on(PARAM_MOUSE_RIGHT_DOWN),
            head,
            eyes,
            keys: snapshot.keys.iter().map(|key| key.to_string()).collect(),
        }
    }
}

fn fade(color: Color32, opacity: f32) -> Color32 {
    color.gamma_multiply(opacity)
}

fn ear(painter: &Painter, base: Pos2, tip: Vec2, width: f32, fill: Color32, stroke: Stroke) {
    let points = vec![
        base - vec2(width / 2.0, 0.0),
        base + tip,
        base + vec2(width / 2.0, 0.0),
    ];
    painter.add(Shape::convex_polygon(points, fill, stroke));
}

pub fn draw_pet(painter: &Painter, rect: Rect, pose: &PetPose, opacity: f32) {
    let unit = rect.width().min(rect.height()) / 10.0;
    let center = rect.center();
    let outline = Stroke::new(unit * 0.15, fade(PetColors::OUTLINE, opacity));
    let body = fade(PetColors::BODY, opacity);

    let desk_y = center.y + unit * 2.5;
    painter.line_segment(
        [pos2(rect.left(), desk_y), pos2(rect.right(), desk_y)],
        Stroke::new(unit * 0.3, fade(PetColors::DESK, opacity)),
    );

    painter.circle(center + vec2(0.0, unit), unit * 2.6, body, outline);

    let head_center = center + vec2(pose.head.x * unit * 0.5, -unit * 1.6 - pose.head.y * unit * 0.3);
    ear(painter, head_center + vec2(-unit * 1.1, -unit * 1.2), vec2(-unit * 0.3, -unit * 1.0), unit, body, outline);
    ear(painter, head_center + vec2(unit * 1.1, -unit * 1.2), vec2(unit * 0.3, -unit * 1.0), unit, body, outline);
    painter.circle(head_center, unit * 1.8, body, outline);

    let eye_offset = vec2(pose.eyes.x * unit * 0.25, -pose.eyes.y * unit * 0.25);
    for side in [-1.0, 1.0] {
        painter.circle_filled(
            head_center + vec2(side * unit * 0.7, -unit * 0.2) + eye_offset,
            unit * 0.2,
            outline.color,
        );
    }

    for (side, down, pressed) in [
        (-1.0, pose.left_paw_down, pose.mouse_left),
        (1.0, pose.right_paw_down, pose.mouse_right),
    ] {
        let lift = if down { 0.0 } else { -unit * 0.9 };
        let fill = if down {
            fade(PetColors::PAW_DOWN, opacity)
        } else {
            body
        };
        painter.circle(
            pos2(center.x + side * unit * 2.2, desk_y - unit * 0.4 + lift),
            unit * 0.6,
            fill,
            outline,
        );
        if pressed {
            painter.circle_filled(
                pos2(center.x + side * unit * 3.6, desk_y - unit * 0.3),
                unit * 0.25,
                fade(PetColors::MOUSE_ACTIVE, opacity),
            );
        }
    }

    if !pose.keys.is_empty() {
        painter.text(
            pos2(center.x, rect.bottom() - unit * 0.5),
            Align2::CENTER_BOTTOM,
            pose.keys.join(" "),
            FontId::proportional(unit * 0.7),
            fade(PetColors::KEY_BADGE, opacity),
        );
    }
}

pub fn window_size(scale_factor: f32) -> egui::Vec2 {
    vec2(BASE_WINDOW_SIZE, BASE_WINDOW_SIZE) * scale_factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{AnimationEngine, ParamValue};
    use crate::input::KeyId;

    fn board_with(params: &[(&str, ParamValue)]) -> ParameterBoard {
        let board = ParameterBoard::new();
        let mut engine = board.clone();
        for (id, value) in params {
            engine.set_parameter_value(id, *value).unwrap();
        }
        board
    }

    #[test]
    fn pose_reads_board_values() {
        let board = board_with(&[
            (PARAM_LEFT_HAND_DOWN, ParamValue::Bool(true)),
            (PARAM_ANGLE_X, ParamValue::Number(15.0)),
            (PARAM_MOUSE_RIGHT_DOWN, ParamValue::Bool(true)),
        ]);
        let snapshot = InputSnapshot {
            keys: vec![KeyId::KeyA, KeyId::Space],
            ..InputSnapshot::default()
        };

        let pose = PetPose::new(&board, &snapshot, false);
        assert!(pose.left_paw_down);
        assert!(!pose.right_paw_down);
        assert!(pose.mouse_right);
        assert_eq!(pose.head.x, 0.5);
        assert_eq!(pose.keys, ["KeyA", "Space"]);
    }

    #[test]
    fn mirroring_swaps_paws_and_flips_gaze() {
        let board = board_with(&[
            (PARAM_LEFT_HAND_DOWN, ParamValue::Bool(true)),
            (PARAM_EYE_BALL_X, ParamValue::Number(-30.0)),
        ]);

        let pose = PetPose::new(&board, &InputSnapshot::default(), true);
        assert!(!pose.left_paw_down);
        assert!(pose.right_paw_down);
        assert_eq!(pose.eyes.x, 1.0);
    }

    #[test]
    fn window_follows_scale() {
        assert_eq!(window_size(0.5), vec2(150.0, 150.0));
    }
}
