use serde::{Deserialize, Serialize};

use crate::{Mat4, Vec3};

/// Rotation driven by the frame clock: `angle = rate * t + phase` (radians).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spin {
    pub rate: f32,
    pub phase: f32,
    pub axis: [f32; 3],
}

impl Spin {
    pub const NONE: Self = Self {
        rate: 0.0,
        phase: 0.0,
        axis: [0.0, 1.0, 0.0],
    };

    /// Spin around +Y at `rate` rad/s.
    pub const fn around_y(rate: f32) -> Self {
        Self {
            rate,
            ..Self::NONE
        }
    }

    #[inline]
    pub fn angle(&self, t: f32) -> f32 {
        self.rate * t + self.phase
    }
}

impl Default for Spin {
    fn default() -> Self {
        Self::NONE
    }
}

/// Local transform of an orbiting body relative to its parent.
/// Applied as scale, then spin, then offset, so the offset is swept
/// around the parent by the spin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrbitTransform {
    pub scale: f32,
    pub spin: Spin,
    pub offset: Vec3,
}

impl OrbitTransform {
    #[inline]
    pub const fn identity() -> Self {
        Self {
            scale: 1.0,
            spin: Spin::NONE,
            offset: Vec3::ZERO,
        }
    }

    /// Build matrix = S * R(t) * T (column-major Mat4 per glam).
    pub fn matrix(&self, t: f32) -> Mat4 {
        let axis = Vec3::from(self.spin.axis).try_normalize().unwrap_or(Vec3::Y);
        Mat4::from_scale(Vec3::splat(self.scale))
            * Mat4::from_axis_angle(axis, self.spin.angle(t))
            * Mat4::from_translation(self.offset)
    }
}

impl Default for OrbitTransform {
    fn default() -> Self {
        Self::identity()
    }
}
