//! Free-fly camera view controller.
//!
//! Grounded in spec.md §4.11: an eye position that smoothly chases a
//! target, driven by keyboard movement along forward/right/up and mouse
//! delta updating yaw/pitch. `advance` is called once per frame so the eye
//! interpolates toward the target regardless of how often input arrives.

use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};

#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub eye: Point3<f32>,
    pub target: Point3<f32>,
    pub forward: Vector3<f32>,
    pub up: Vector3<f32>,
    pub speed: f32,
    pub yaw: f32,
    pub pitch: f32,
}

impl Camera {
    pub fn new(eye: Point3<f32>, forward: Vector3<f32>, up: Vector3<f32>, speed: f32) -> Self {
        Self {
            eye,
            target: eye,
            forward: forward.normalize(),
            up: up.normalize(),
            speed,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    fn right(&self) -> Vector3<f32> {
        self.forward.cross(&self.up).normalize()
    }

    pub fn move_forward(&mut self, dt: f32) {
        self.target += self.forward * self.speed * dt;
    }

    pub fn move_backward(&mut self, dt: f32) {
        self.target -= self.forward * self.speed * dt;
    }

    pub fn strafe_right(&mut self, dt: f32) {
        self.target += self.right() * self.speed * dt;
    }

    pub fn strafe_left(&mut self, dt: f32) {
        self.target -= self.right() * self.speed * dt;
    }

    pub fn ascend(&mut self, dt: f32) {
        self.target += self.up * self.speed * dt;
    }

    pub fn descend(&mut self, dt: f32) {
        self.target -= self.up * self.speed * dt;
    }

    /// Applies a mouse delta (in normalized screen units) to yaw/pitch and
    /// re-derives the forward vector.
    pub fn look(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.yaw += delta_yaw;
        self.pitch = (self.pitch + delta_pitch).clamp(
            -std::f32::consts::FRAC_PI_2 + 0.01,
            std::f32::consts::FRAC_PI_2 - 0.01,
        );
        let rotation = UnitQuaternion::from_euler_angles(0.0, self.yaw, 0.0)
            * UnitQuaternion::from_euler_angles(self.pitch, 0.0, 0.0);
        self.forward = rotation * Vector3::z();
    }

    /// Interpolates the eye toward the target, to be called once per frame
    /// with the frame's delta time. `factor` controls how aggressively the
    /// eye chases the target (`1.0` = snap instantly, smaller = smoother).
    pub fn advance(&mut self, dt: f32, factor: f32) {
        let t = (factor * dt).clamp(0.0, 1.0);
        self.eye = Point3::from(self.eye.coords.lerp(&self.target.coords, t));
    }

    pub fn view(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.eye, &(self.eye + self.forward), &self.up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_forward_advances_target_along_forward_vector() {
        let mut cam = Camera::new(Point3::origin(), Vector3::z(), Vector3::y(), 1.0);
        cam.move_forward(1.0);
        assert!((cam.target - Point3::origin()).norm() > 0.0);
    }

    #[test]
    fn advance_moves_eye_toward_target_but_not_past_it() {
        let mut cam = Camera::new(Point3::origin(), Vector3::z(), Vector3::y(), 1.0);
        cam.target = Point3::new(10.0, 0.0, 0.0);
        cam.advance(0.1, 1.0);
        assert!(cam.eye.x > 0.0);
        assert!(cam.eye.x <= 10.0);
    }

    #[test]
    fn pitch_is_clamped_away_from_poles() {
        let mut cam = Camera::new(Point3::origin(), Vector3::z(), Vector3::y(), 1.0);
        cam.look(0.0, 100.0);
        assert!(cam.pitch < std::f32::consts::FRAC_PI_2);
    }
}
