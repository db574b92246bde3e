//! Baking: turn parsed [`ModelData`] into a [`DrawList`].

use asset::{
    mesh::{DrawEntry, Face, ModelData},
    mtl::MaterialDef,
};

use crate::{
    context::TextureHandle,
    list::{DrawCommand, DrawList},
};

/// Material with its texture already uploaded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub texture: Option<TextureHandle>,
}

impl Material {
    pub fn from_def(def: &MaterialDef, texture: Option<TextureHandle>) -> Self {
        Self {
            ambient: def.ambient,
            diffuse: def.diffuse,
            specular: def.specular,
            texture,
        }
    }
}

/// Walk the entries once, in file order.
///
/// Lists start with lighting enabled and no texture bound; replays begin
/// from that state. Polygons with an out-of-range index and switches to
/// unknown materials are skipped.
pub fn bake(data: &ModelData, materials: &[Material]) -> DrawList {
    let mut list = DrawList::new();
    let mut textured = false;
    let mut lit = true;

    for entry in &data.entries {
        match entry {
            DrawEntry::MaterialSwitch(index) => {
                let Some(material) = materials.get(*index) else {
                    log::debug!("Skipping switch to unknown material {}", index);
                    continue;
                };
                list.push(DrawCommand::SetLight {
                    ambient: material.ambient,
                    diffuse: material.diffuse,
                    specular: material.specular,
                });
                list.push(DrawCommand::BindTexture(material.texture));
                textured = material.texture.is_some();
            }
            DrawEntry::Polygon(face) => {
                if !in_range(face, data, textured) {
                    log::debug!("Skipping polygon with out-of-range index: {:?}", face);
                    continue;
                }

                match face.normal {
                    Some(n) => {
                        if !lit {
                            list.push(DrawCommand::EnableLighting);
                            lit = true;
                        }
                        list.push(DrawCommand::Normal(data.normals[n]));
                    }
                    None => {
                        if lit {
                            list.push(DrawCommand::DisableLighting);
                            lit = false;
                        }
                    }
                }

                let texcoords = face.texcoords.as_deref().filter(|_| textured);
                list.push(DrawCommand::BeginPolygon);
                for (i, &v) in face.vertices.iter().enumerate() {
                    if let Some(t) = texcoords {
                        list.push(DrawCommand::TexCoord(data.texcoords[t[i]]));
                    }
                    list.push(DrawCommand::Vertex(data.positions[v]));
                }
                list.push(DrawCommand::EndPolygon);
            }
        }
    }

    list
}

fn in_range(face: &Face, data: &ModelData, textured: bool) -> bool {
    let vertices_ok = face.vertices.iter().all(|&v| v < data.positions.len());
    let normal_ok = face.normal.is_none_or(|n| n < data.normals.len());
    let texcoords_ok = !textured
        || face
            .texcoords
            .as_ref()
            .is_none_or(|t| t.iter().all(|&i| i < data.texcoords.len()));
    vertices_ok && normal_ok && texcoords_ok
}
