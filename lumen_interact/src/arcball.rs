//! Arcball rotation view controller.
//!
//! Grounded in spec.md §4.11: a centre translation, a translation, a
//! quaternion rotation and the mat4 product of the three, with successive
//! drags composed by quaternion multiplication rather than re-derived from
//! scratch each frame (so small drags accumulate smoothly instead of
//! snapping back through the identity on every mouse-move callback).

use nalgebra::{Matrix4, Translation3, UnitQuaternion, Vector3};

use lumen_input::mouse::MouseEvent;

#[derive(Debug, Clone, Copy)]
pub struct Arcball {
    pub center: Vector3<f32>,
    pub translation: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    drag_start: Option<(Vector3<f32>, UnitQuaternion<f32>)>,
}

impl Arcball {
    pub fn new(center: Vector3<f32>) -> Self {
        Self {
            center,
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            drag_start: None,
        }
    }

    /// Maps a normalized screen coordinate (`x, y` in `[-1, 1]`) to a point
    /// on (or, past the edge, projected toward) the unit sphere used as
    /// the arcball's reference surface.
    pub fn screen_to_sphere(pos: [f32; 2]) -> Vector3<f32> {
        let (x, y) = (pos[0], pos[1]);
        let d2 = x * x + y * y;
        if d2 <= 1.0 {
            Vector3::new(x, y, (1.0 - d2).sqrt())
        } else {
            let n = d2.sqrt();
            Vector3::new(x / n, y / n, 0.0)
        }
    }

    /// Maps a normalized screen coordinate to the quaternion rotating the
    /// sphere's north pole onto that point's arcball projection.
    pub fn screen_to_arcball(pos: [f32; 2]) -> UnitQuaternion<f32> {
        let p = Self::screen_to_sphere(pos);
        UnitQuaternion::rotation_between(&Vector3::z(), &p).unwrap_or_else(UnitQuaternion::identity)
    }

    fn begin_drag(&mut self, pos: [f32; 2]) {
        self.drag_start = Some((Self::screen_to_sphere(pos), self.rotation));
    }

    fn continue_drag(&mut self, pos: [f32; 2]) {
        let Some((start_sphere, start_rotation)) = self.drag_start else {
            self.begin_drag(pos);
            return;
        };
        let cur_sphere = Self::screen_to_sphere(pos);
        let delta = UnitQuaternion::rotation_between(&start_sphere, &cur_sphere)
            .unwrap_or_else(UnitQuaternion::identity);
        self.rotation = delta * start_rotation;
    }

    pub fn handle_mouse_event(&mut self, event: &MouseEvent, to_ndc: impl Fn([f64; 2]) -> [f32; 2]) {
        match *event {
            MouseEvent::DragStart { press_pos, .. } => self.begin_drag(to_ndc(press_pos)),
            MouseEvent::Drag { cur_pos, .. } => self.continue_drag(to_ndc(cur_pos)),
            MouseEvent::DragStop { .. } => self.drag_start = None,
            _ => {}
        }
    }

    pub fn model_matrix(&self) -> Matrix4<f32> {
        Translation3::from(self.translation).to_homogeneous()
            * self.rotation.to_homogeneous()
            * Translation3::from(-self.center).to_homogeneous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_projects_to_positive_z_on_sphere() {
        let p = Arcball::screen_to_sphere([0.0, 0.0]);
        assert!((p.z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn beyond_unit_circle_is_clamped_to_equator() {
        let p = Arcball::screen_to_sphere([2.0, 0.0]);
        assert!((p.z).abs() < 1e-6);
        assert!((p.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn dragging_accumulates_rotation_from_start_not_identity() {
        let mut arc = Arcball::new(Vector3::zeros());
        arc.handle_mouse_event(
            &MouseEvent::DragStart {
                button: lumen_input::mouse::MouseButton::Left,
                press_pos: [0.0, 0.0],
                mods: Default::default(),
            },
            |p| [p[0] as f32, p[1] as f32],
        );
        let initial = arc.rotation;
        arc.handle_mouse_event(
            &MouseEvent::Drag {
                button: lumen_input::mouse::MouseButton::Left,
                press_pos: [0.0, 0.0],
                cur_pos: [0.3, 0.0],
                mods: Default::default(),
            },
            |p| [p[0] as f32, p[1] as f32],
        );
        assert_ne!(arc.rotation, initial);
    }
}
