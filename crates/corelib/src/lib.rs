//! Core types: math re-exports, orbit transforms, camera, scene composition.

pub use glam::{Mat4, Quat, Vec3, vec3};

pub mod camera;
pub mod error;
pub mod scene;
pub mod transform;

pub use error::{CoreError, CoreResult};
