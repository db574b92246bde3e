//! CPU half of list compilation for the wgpu backend: run the fixed-function
//! state machine over a [`DrawList`] and emit triangle-list vertices grouped
//! into batches of identical raster state.

use std::ops::Range;

use asset::mtl::{DEFAULT_AMBIENT, DEFAULT_DIFFUSE, DEFAULT_SPECULAR};
use bytemuck::{Pod, Zeroable};

use crate::{
    context::TextureHandle,
    list::{DrawCommand, DrawList},
};

/// Vertex: position + normal + uv.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Everything besides vertex attributes that affects how a triangle is shaded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterState {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub texture: Option<TextureHandle>,
    pub lit: bool,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            ambient: DEFAULT_AMBIENT,
            diffuse: DEFAULT_DIFFUSE,
            specular: DEFAULT_SPECULAR,
            texture: None,
            lit: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    pub state: RasterState,
    pub vertices: Range<u32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tessellation {
    pub vertices: Vec<GpuVertex>,
    pub batches: Vec<Batch>,
}

impl Tessellation {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Every list starts from [`RasterState::default`], +Z normal and uv (0, 0).
pub fn tessellate(list: &DrawList) -> Tessellation {
    let mut out = Tessellation::default();
    let mut state = RasterState::default();
    let mut normal = [0.0, 0.0, 1.0];
    let mut uv = [0.0, 0.0];
    let mut polygon: Vec<GpuVertex> = Vec::with_capacity(4);
    let mut in_polygon = false;

    for command in list.commands() {
        match *command {
            DrawCommand::SetLight {
                ambient,
                diffuse,
                specular,
            } => {
                state.ambient = ambient;
                state.diffuse = diffuse;
                state.specular = specular;
            }
            DrawCommand::BindTexture(texture) => state.texture = texture,
            DrawCommand::EnableLighting => state.lit = true,
            DrawCommand::DisableLighting => state.lit = false,
            DrawCommand::Normal(n) => normal = n,
            DrawCommand::TexCoord(t) => uv = t,
            DrawCommand::BeginPolygon => {
                polygon.clear();
                in_polygon = true;
            }
            DrawCommand::Vertex(position) => {
                if in_polygon {
                    polygon.push(GpuVertex {
                        position,
                        normal,
                        uv,
                    });
                }
            }
            DrawCommand::EndPolygon => {
                in_polygon = false;
                emit_fan(&mut out, state, &polygon);
            }
        }
    }

    out
}

fn emit_fan(out: &mut Tessellation, state: RasterState, polygon: &[GpuVertex]) {
    if polygon.len() < 3 {
        return;
    }

    let start = out.vertices.len() as u32;
    if out.batches.last().is_none_or(|b| b.state != state) {
        out.batches.push(Batch {
            state,
            vertices: start..start,
        });
    }

    for i in 1..polygon.len() - 1 {
        out.vertices
            .extend_from_slice(&[polygon[0], polygon[i], polygon[i + 1]]);
    }

    if let Some(batch) = out.batches.last_mut() {
        batch.vertices.end = out.vertices.len() as u32;
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::*;

    fn quad() -> Vec<DrawCommand> {
        vec![
            DrawCommand::BeginPolygon,
            DrawCommand::Vertex([0.0, 0.0, 0.0]),
            DrawCommand::Vertex([1.0, 0.0, 0.0]),
            DrawCommand::Vertex([1.0, 1.0, 0.0]),
            DrawCommand::Vertex([0.0, 1.0, 0.0]),
            DrawCommand::EndPolygon,
        ]
    }

    #[test]
    fn quad_becomes_two_fan_triangles() {
        let list: DrawList = quad().into_iter().collect();
        let t = tessellate(&list);
        assert_eq!(t.vertices.len(), 6);
        let positions: Vec<[f32; 3]> = t.vertices.iter().map(|v| v.position).collect();
        assert_eq!(
            positions,
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ]
        );
        assert_eq!(t.batches.len(), 1);
        assert_eq!(t.batches[0].vertices, 0..6);
        assert_eq!(t.batches[0].state, RasterState::default());
    }

    #[test]
    fn state_changes_split_batches() {
        let tex = Some(TextureHandle(NonZeroU32::new(1).unwrap()));
        let mut cmds = vec![DrawCommand::BindTexture(tex), DrawCommand::Normal([0.0, 1.0, 0.0])];
        cmds.extend(quad());
        cmds.extend(quad());
        cmds.push(DrawCommand::DisableLighting);
        cmds.extend(quad());

        let t = tessellate(&cmds.into_iter().collect());
        assert_eq!(t.batches.len(), 2);
        assert_eq!(t.batches[0].vertices, 0..12);
        assert_eq!(t.batches[0].state.texture, tex);
        assert!(t.batches[0].state.lit);
        assert_eq!(t.batches[1].vertices, 12..18);
        assert!(!t.batches[1].state.lit);
        assert!(t.vertices[..12].iter().all(|v| v.normal == [0.0, 1.0, 0.0]));
    }

    #[test]
    fn vertices_capture_current_texcoord() {
        let list: DrawList = [
            DrawCommand::BeginPolygon,
            DrawCommand::TexCoord([0.1, 0.2]),
            DrawCommand::Vertex([0.0; 3]),
            DrawCommand::TexCoord([0.3, 0.4]),
            DrawCommand::Vertex([1.0; 3]),
            DrawCommand::Vertex([2.0; 3]),
            DrawCommand::EndPolygon,
        ]
        .into_iter()
        .collect();
        let t = tessellate(&list);
        let uvs: Vec<[f32; 2]> = t.vertices.iter().map(|v| v.uv).collect();
        assert_eq!(uvs, vec![[0.1, 0.2], [0.3, 0.4], [0.3, 0.4]]);
    }

    #[test]
    fn degenerate_and_stray_vertices_are_ignored() {
        let list: DrawList = [
            DrawCommand::Vertex([5.0; 3]),
            DrawCommand::BeginPolygon,
            DrawCommand::Vertex([0.0; 3]),
            DrawCommand::Vertex([1.0; 3]),
            DrawCommand::EndPolygon,
        ]
        .into_iter()
        .collect();
        assert!(tessellate(&list).is_empty());
        assert!(tessellate(&list).batches.is_empty());
    }
}
