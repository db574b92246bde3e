//! Recorded draw commands: the baked, replayable form of a model.

use crate::context::TextureHandle;

/// One command of a compiled draw list. Mirrors fixed-function state
/// changes: state set by one command persists until overwritten.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrawCommand {
    /// Light colors used for lit polygons.
    SetLight {
        ambient: [f32; 4],
        diffuse: [f32; 4],
        specular: [f32; 4],
    },
    BindTexture(Option<TextureHandle>),
    EnableLighting,
    DisableLighting,
    Normal([f32; 3]),
    TexCoord([f32; 2]),
    BeginPolygon,
    Vertex([f32; 3]),
    EndPolygon,
}

/// Immutable once built; backends compile it once and replay their own form.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawList {
    commands: Vec<DrawCommand>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn polygon_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::BeginPolygon))
            .count()
    }
}

impl FromIterator<DrawCommand> for DrawList {
    fn from_iter<I: IntoIterator<Item = DrawCommand>>(iter: I) -> Self {
        Self {
            commands: iter.into_iter().collect(),
        }
    }
}
