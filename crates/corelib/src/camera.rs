use crate::{Mat4, Vec3};

/// Degrees of yaw/pitch per unit of cursor travel.
pub const LOOK_SENSITIVITY: f32 = 0.1;
/// Pitch limit in degrees, keeps the view off the poles.
pub const MAX_PITCH_DEG: f32 = 89.0;
/// Zoom range for the vertical field of view, in degrees.
pub const MIN_FOV_DEG: f32 = 1.0;
pub const MAX_FOV_DEG: f32 = 45.0;

/// Right-handed fly camera. Travel moves eye and target together; only
/// [`Camera::look`] changes the view direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    aspect: f32,
}

impl Camera {
    /// `fov_y` in radians. Clip planes default to the solar-system range.
    pub fn looking_at(eye: Vec3, target: Vec3, fov_y: f32) -> Self {
        Self {
            eye,
            target,
            up: Vec3::Y,
            fov_y,
            near: 0.1,
            far: 25_000.0,
            aspect: 1.0,
        }
    }

    pub fn with_clip(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    pub fn with_aspect(mut self, aspect: f32) -> Self {
        self.set_aspect(aspect);
        self
    }

    #[inline]
    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect.max(1e-6);
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// wgpu-style projection (z in [0,1]).
    #[inline]
    pub fn proj(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    #[inline]
    pub fn proj_view(&self) -> Mat4 {
        self.proj() * self.view()
    }

    /// Move `forward` along the view direction and `right` along the
    /// horizontal side axis.
    pub fn fly(&mut self, forward: f32, right: f32) {
        let dir = (self.target - self.eye).normalize_or_zero();
        let side = dir.cross(self.up).normalize_or_zero();
        let delta = dir * forward + side * right;
        self.eye += delta;
        self.target += delta;
    }

    /// Turn the view by cursor deltas: `dx` right, `dy` up. The target stays
    /// at the same distance from the eye.
    pub fn look(&mut self, dx: f32, dy: f32) {
        let offset = self.target - self.eye;
        let distance = offset.length();
        if distance <= f32::EPSILON {
            return;
        }
        let dir = offset / distance;
        let yaw = dir.z.atan2(dir.x) + (dx * LOOK_SENSITIVITY).to_radians();
        let pitch = (dir.y.clamp(-1.0, 1.0).asin() + (dy * LOOK_SENSITIVITY).to_radians())
            .clamp(-MAX_PITCH_DEG.to_radians(), MAX_PITCH_DEG.to_radians());

        let dir = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos());
        self.target = self.eye + dir * distance;
    }

    /// Scroll zoom: positive `dy` narrows the field of view.
    pub fn zoom(&mut self, dy: f32) {
        let fov = (self.fov_y.to_degrees() - dy).clamp(MIN_FOV_DEG, MAX_FOV_DEG);
        self.fov_y = fov.to_radians();
    }
}
