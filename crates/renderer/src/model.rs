//! Loaded model: the only thing kept after parsing and baking.

use std::path::{Path, PathBuf};

use anyhow::Result;
use asset::{
    mesh::{ModelData, Placement},
    mtl::MaterialLibrary,
    obj::load_model_from_path,
    texture::ImageDecoder,
};

use crate::{
    bake::{Material, bake},
    context::{GraphicsContext, ListHandle, MinFilter},
};

/// Counts gathered during a load, for logging and inspection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModelStats {
    pub vertices: usize,
    pub texcoords: usize,
    pub normals: usize,
    pub entries: usize,
    pub materials: usize,
    pub textures: usize,
    pub commands: usize,
}

/// A baked model. Owns its list handle; drawing an unloaded model is a no-op.
#[derive(Debug, Default)]
pub struct Model {
    path: PathBuf,
    list: Option<ListHandle>,
    placement: Placement,
    stats: ModelStats,
}

impl Model {
    /// Load and bake `path`. On failure the error is logged and an unloaded
    /// model is returned.
    pub fn load<C, D>(path: impl AsRef<Path>, ctx: &mut C, decoder: &D) -> Self
    where
        C: GraphicsContext + ?Sized,
        D: ImageDecoder + ?Sized,
    {
        let path = path.as_ref();
        match Self::try_load(path, ctx, decoder) {
            Ok(model) => model,
            Err(e) => {
                log::error!("{e:#}");
                Self {
                    path: path.to_path_buf(),
                    ..Self::default()
                }
            }
        }
    }

    /// Like [`Model::load`], but hands the error to the caller.
    pub fn try_load<C, D>(path: impl AsRef<Path>, ctx: &mut C, decoder: &D) -> Result<Self>
    where
        C: GraphicsContext + ?Sized,
        D: ImageDecoder + ?Sized,
    {
        let path = path.as_ref();
        let data = load_model_from_path(path)?;
        Ok(Self::from_data(path, &data, ctx, decoder))
    }

    /// Bake already-parsed data. `data` can be dropped afterwards.
    pub fn from_data<C, D>(path: &Path, data: &ModelData, ctx: &mut C, decoder: &D) -> Self
    where
        C: GraphicsContext + ?Sized,
        D: ImageDecoder + ?Sized,
    {
        let materials = resolve_materials(&data.materials, ctx, decoder);
        let list = bake(data, &materials);
        let handle = ctx.compile_list(&list);
        let placement = data.placement();
        if !data.is_valid() {
            log::warn!("Model {} has no polygons to draw", path.display());
        }

        let stats = ModelStats {
            vertices: data.positions.len(),
            texcoords: data.texcoords.len(),
            normals: data.normals.len(),
            entries: data.entries.len(),
            materials: materials.len(),
            textures: materials.iter().filter(|m| m.texture.is_some()).count(),
            commands: list.len(),
        };

        log::info!(
            "Model: {} (vertices={}, texcoords={}, normals={}, faces={}, materials={})",
            path.display(),
            stats.vertices,
            stats.texcoords,
            stats.normals,
            stats.entries,
            stats.materials
        );
        log::info!(
            "Placement: x={:.3}, y={:.3}, z={:.3}",
            placement.x,
            placement.y,
            placement.z
        );

        Self {
            path: path.to_path_buf(),
            list: Some(handle),
            placement,
            stats,
        }
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.list.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn stats(&self) -> &ModelStats {
        &self.stats
    }

    /// Replay the compiled list.
    pub fn draw<C: GraphicsContext + ?Sized>(&self, ctx: &mut C) {
        if let Some(list) = self.list {
            ctx.call_list(list);
        }
    }
}

/// Decode and upload every `map_Kd`, then release the decoded pixels.
fn resolve_materials<C, D>(library: &MaterialLibrary, ctx: &mut C, decoder: &D) -> Vec<Material>
where
    C: GraphicsContext + ?Sized,
    D: ImageDecoder + ?Sized,
{
    library
        .materials()
        .iter()
        .map(|def| {
            let texture = def.diffuse_map.as_deref().and_then(|path| {
                match decoder.decode(path) {
                    Ok(image) => {
                        let handle = ctx.upload_texture(&image, MinFilter::Linear);
                        decoder.release(image);
                        handle
                    }
                    Err(e) => {
                        log::warn!("Material '{}': {e:#}", def.name);
                        None
                    }
                }
            });
            Material::from_def(def, texture)
        })
        .collect()
}
