//! Renderer: draw lists baked from models, the graphics-context seam, and
//! its two implementations (in-memory recording and wgpu).

pub mod bake;
pub mod context;
pub mod gpu;
pub mod list;
pub mod model;
pub mod recording;
pub mod tessellate;

pub use context::{GraphicsContext, ListHandle, MinFilter, ObjectStyle, TextureHandle};
pub use gpu::GpuState;
pub use model::Model;
pub use recording::RecordingContext;
