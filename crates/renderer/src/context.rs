//! The seam between model baking and whatever owns the GPU.

use std::num::NonZeroU32;

use asset::texture::TextureData;
use glam::Mat4;

use crate::list::DrawList;

/// A 2D texture owned by a [`GraphicsContext`]. There is no "zero" handle;
/// absence of a texture is `Option::None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub NonZeroU32);

/// A compiled draw list owned by a [`GraphicsContext`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListHandle(pub u32);

/// Minification filter for uploaded textures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MinFilter {
    Nearest,
    #[default]
    Linear,
}

/// Per-draw overrides applied on top of a compiled list.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ObjectStyle {
    /// Skip lighting for every batch: texture sample only.
    pub emissive: bool,
    /// Flat color replacing materials and textures.
    pub color: Option<[f32; 4]>,
}

/// What the core needs from the graphics backend.
///
/// Textures and lists live as long as the context; handles are plain ids.
pub trait GraphicsContext {
    /// Upload RGBA8 pixels as a 2D texture. Returns `None` when the image
    /// cannot be used (e.g. zero-sized).
    fn upload_texture(&mut self, image: &TextureData, min_filter: MinFilter)
        -> Option<TextureHandle>;

    /// Record `list` into the backend's replayable form.
    fn compile_list(&mut self, list: &DrawList) -> ListHandle;

    /// Replay a compiled list with the current model matrix.
    fn call_list(&mut self, list: ListHandle);

    /// Model matrix applied to subsequent [`call_list`](Self::call_list)s.
    fn set_model_matrix(&mut self, model: Mat4);

    /// Style applied to subsequent [`call_list`](Self::call_list)s.
    fn set_object_style(&mut self, style: ObjectStyle);
}

/// Sequential ids starting at 1, shared by texture-handle allocators.
pub(crate) fn next_texture_handle(count: usize) -> Option<TextureHandle> {
    u32::try_from(count + 1)
        .ok()
        .and_then(NonZeroU32::new)
        .map(TextureHandle)
}
