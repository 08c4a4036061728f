use crate::game_object::GameObject;
use cgmath::{InnerSpace, Vector3};
use std::collections::HashSet;
use std::f32::consts::TAU;
use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Currently held keys, fed from window keyboard events.
#[derive(Debug, Default, Clone)]
pub struct InputState {
    pressed: HashSet<KeyCode>,
}

impl InputState {
    pub fn handle_key_event(&mut self, event: &KeyEvent) {
        if let PhysicalKey::Code(code) = event.physical_key {
            self.set_key(code, event.state == ElementState::Pressed);
        }
    }

    pub fn set_key(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.pressed.insert(key);
        } else {
            self.pressed.remove(&key);
        }
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    /// Drops every held key, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.pressed.clear();
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KeyMappings {
    pub move_left: KeyCode,
    pub move_right: KeyCode,
    pub move_forward: KeyCode,
    pub move_backward: KeyCode,
    pub move_up: KeyCode,
    pub move_down: KeyCode,
    pub look_left: KeyCode,
    pub look_right: KeyCode,
    pub look_up: KeyCode,
    pub look_down: KeyCode,
}

impl Default for KeyMappings {
    fn default() -> Self {
        Self {
            move_left: KeyCode::KeyA,
            move_right: KeyCode::KeyD,
            move_forward: KeyCode::KeyW,
            move_backward: KeyCode::KeyS,
            move_up: KeyCode::KeyE,
            move_down: KeyCode::KeyQ,
            look_left: KeyCode::ArrowLeft,
            look_right: KeyCode::ArrowRight,
            look_up: KeyCode::ArrowUp,
            look_down: KeyCode::ArrowDown,
        }
    }
}

/// Free-fly movement for the viewer object, yaw and pitch only.
#[derive(Debug, Copy, Clone)]
pub struct KeyboardMovementController {
    pub keys: KeyMappings,
    pub move_speed: f32,
    pub look_speed: f32,
}

impl Default for KeyboardMovementController {
    fn default() -> Self {
        Self {
            keys: KeyMappings::default(),
            move_speed: 3.0,
            look_speed: 1.5,
        }
    }
}

impl KeyboardMovementController {
    pub fn move_in_plane_xz(&self, input: &InputState, dt: f32, game_object: &mut GameObject) {
        let axis = |positive: KeyCode, negative: KeyCode| {
            input.is_pressed(positive) as i8 as f32 - input.is_pressed(negative) as i8 as f32
        };

        let rotate = Vector3::new(
            axis(self.keys.look_up, self.keys.look_down),
            axis(self.keys.look_right, self.keys.look_left),
            0.0,
        );
        let transform = &mut game_object.transform;
        if rotate.dot(rotate) > f32::EPSILON {
            transform.rotation += self.look_speed * dt * rotate.normalize();
        }

        // keep the pitch short of straight up/down so the view never flips
        transform.rotation.x = transform.rotation.x.clamp(-1.5, 1.5);
        transform.rotation.y = wrap_angle(transform.rotation.y);

        let yaw = transform.rotation.y;
        let forward = Vector3::new(yaw.sin(), 0.0, yaw.cos());
        let right = Vector3::new(forward.z, 0.0, -forward.x);
        let up = Vector3::new(0.0, -1.0, 0.0);

        let move_dir = forward * axis(self.keys.move_forward, self.keys.move_backward)
            + right * axis(self.keys.move_right, self.keys.move_left)
            + up * axis(self.keys.move_up, self.keys.move_down);

        if move_dir.dot(move_dir) > f32::EPSILON {
            transform.translation += self.move_speed * dt * move_dir.normalize();
        }
    }
}

/// Wraps an angle into `[0, 2π)`.
fn wrap_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    // tiny negative angles round up to exactly TAU
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn wrapped_angle_stays_below_full_turn() {
        for angle in [-1e-8, -f32::EPSILON, -TAU, 0.0, TAU, 3.0 * TAU + 0.5] {
            let wrapped = wrap_angle(angle);
            assert!((0.0..TAU).contains(&wrapped), "{angle} wrapped to {wrapped}");
        }
        assert_relative_eq!(wrap_angle(TAU + 1.0), 1.0, epsilon = 1e-5);
    }

    fn held(keys: &[KeyCode]) -> InputState {
        let mut input = InputState::default();
        keys.iter().for_each(|key| input.set_key(*key, true));
        input
    }

    #[test]
    fn key_release_clears_state() {
        let mut input = held(&[KeyCode::KeyW]);
        assert!(input.is_pressed(KeyCode::KeyW));
        input.set_key(KeyCode::KeyW, false);
        assert!(!input.is_pressed(KeyCode::KeyW));
    }

    #[test]
    fn forward_follows_yaw() {
        let controller = KeyboardMovementController::default();
        let mut viewer = GameObject::create();

        controller.move_in_plane_xz(&held(&[KeyCode::KeyW]), 0.5, &mut viewer);
        assert_relative_eq!(viewer.transform.translation, Vector3::new(0.0, 0.0, 1.5));

        let mut viewer = GameObject::create();
        viewer.transform.rotation.y = std::f32::consts::FRAC_PI_2;
        controller.move_in_plane_xz(&held(&[KeyCode::KeyW]), 0.5, &mut viewer);
        assert_relative_eq!(
            viewer.transform.translation,
            Vector3::new(1.5, 0.0, 0.0),
            epsilon = 1e-6
        );
    }

    #[test]
    fn up_is_negative_y() {
        let controller = KeyboardMovementController::default();
        let mut viewer = GameObject::create();
        controller.move_in_plane_xz(&held(&[KeyCode::KeyE]), 1.0, &mut viewer);
        assert_relative_eq!(viewer.transform.translation, Vector3::new(0.0, -3.0, 0.0));
    }

    #[test]
    fn diagonal_movement_is_normalized() {
        let controller = KeyboardMovementController::default();
        let mut viewer = GameObject::create();
        controller.move_in_plane_xz(&held(&[KeyCode::KeyW, KeyCode::KeyD]), 1.0, &mut viewer);

        assert_relative_eq!(viewer.transform.translation.magnitude(), 3.0, epsilon = 1e-6);
        assert!(viewer.transform.translation.x > 0.0);
        assert!(viewer.transform.translation.z > 0.0);
    }

    #[test]
    fn opposite_keys_cancel() {
        let controller = KeyboardMovementController::default();
        let mut viewer = GameObject::create();
        controller.move_in_plane_xz(&held(&[KeyCode::KeyA, KeyCode::KeyD]), 1.0, &mut viewer);
        assert_eq!(viewer.transform.translation, Vector3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn pitch_is_clamped() {
        let controller = KeyboardMovementController::default();
        let mut viewer = GameObject::create();
        controller.move_in_plane_xz(&held(&[KeyCode::ArrowUp]), 10.0, &mut viewer);
        assert_eq!(viewer.transform.rotation.x, 1.5);

        controller.move_in_plane_xz(&held(&[KeyCode::ArrowDown]), 10.0, &mut viewer);
        assert_eq!(viewer.transform.rotation.x, -1.5);
    }

    #[test]
    fn yaw_wraps_into_full_turn() {
        let controller = KeyboardMovementController::default();
        let mut viewer = GameObject::create();
        controller.move_in_plane_xz(&held(&[KeyCode::ArrowLeft]), 1.0, &mut viewer);

        let yaw = viewer.transform.rotation.y;
        assert!((0.0..TAU).contains(&yaw));
        assert_relative_eq!(yaw, TAU - 1.5, epsilon = 1e-5);
    }
}
