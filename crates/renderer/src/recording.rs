//! In-memory [`GraphicsContext`]: keeps compiled lists on the CPU and writes
//! every operation to a journal. Used for headless inspection and tests.

use asset::texture::TextureData;
use glam::Mat4;

use crate::{
    context::{
        GraphicsContext, ListHandle, MinFilter, ObjectStyle, TextureHandle, next_texture_handle,
    },
    list::{DrawCommand, DrawList},
};

#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    UploadTexture {
        handle: TextureHandle,
        width: u32,
        height: u32,
        min_filter: MinFilter,
    },
    CompileList {
        handle: ListHandle,
        commands: usize,
    },
    SetModelMatrix(Mat4),
    SetObjectStyle(ObjectStyle),
    /// One command of a replayed list.
    Replay(DrawCommand),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub min_filter: MinFilter,
}

#[derive(Debug, Default)]
pub struct RecordingContext {
    textures: Vec<TextureInfo>,
    lists: Vec<DrawList>,
    journal: Vec<Op>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn journal(&self) -> &[Op] {
        &self.journal
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&TextureInfo> {
        self.textures.get(handle.0.get() as usize - 1)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn list_count(&self) -> usize {
        self.lists.len()
    }
}

impl GraphicsContext for RecordingContext {
    fn upload_texture(
        &mut self,
        image: &TextureData,
        min_filter: MinFilter,
    ) -> Option<TextureHandle> {
        if !image.is_valid() {
            log::warn!("Refusing to upload invalid {}x{} image", image.width, image.height);
            return None;
        }
        let handle = next_texture_handle(self.textures.len())?;
        self.textures.push(TextureInfo {
            width: image.width,
            height: image.height,
            min_filter,
        });
        self.journal.push(Op::UploadTexture {
            handle,
            width: image.width,
            height: image.height,
            min_filter,
        });
        Some(handle)
    }

    fn compile_list(&mut self, list: &DrawList) -> ListHandle {
        let handle = ListHandle(self.lists.len() as u32);
        self.lists.push(list.clone());
        self.journal.push(Op::CompileList {
            handle,
            commands: list.len(),
        });
        handle
    }

    fn call_list(&mut self, list: ListHandle) {
        let Some(compiled) = self.lists.get(list.0 as usize) else {
            log::warn!("call_list on unknown list {:?}", list);
            return;
        };
        self.journal
            .extend(compiled.commands().iter().copied().map(Op::Replay));
    }

    fn set_model_matrix(&mut self, model: Mat4) {
        self.journal.push(Op::SetModelMatrix(model));
    }

    fn set_object_style(&mut self, style: ObjectStyle) {
        self.journal.push(Op::SetObjectStyle(style));
    }
}
