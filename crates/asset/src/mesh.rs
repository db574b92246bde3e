//! CPU-side model representation produced by the OBJ loader.
//! Lives only for the duration of one load; baking consumes it.

use crate::mtl::MaterialLibrary;

/// Polygon with 3 or 4 edges. Indices are 0-based into the model pools.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Face {
    pub vertices: Vec<usize>,
    /// Same length as `vertices` when present.
    pub texcoords: Option<Vec<usize>>,
    /// One normal for the whole face.
    pub normal: Option<usize>,
}

impl Face {
    pub fn new(vertices: Vec<usize>, texcoords: Option<Vec<usize>>, normal: Option<usize>) -> Self {
        debug_assert!(
            texcoords
                .as_ref()
                .is_none_or(|t| t.len() == vertices.len())
        );
        Self {
            vertices,
            texcoords,
            normal,
        }
    }

    #[inline]
    pub fn edges(&self) -> usize {
        self.vertices.len()
    }
}

/// One entry of the draw sequence, in file order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrawEntry {
    Polygon(Face),
    /// Index into [`MaterialLibrary::materials`].
    MaterialSwitch(usize),
}

/// Suggested centering offset for a freshly loaded model.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Placement {
    /// Scale applied to the mean absolute extent to get a viewing distance.
    pub const DISTANCE_SCALE: f32 = 15.0;

    /// Negated signed centroid on x/y, and a z pushed back by the
    /// length of the mean absolute-value centroid.
    pub fn from_positions(positions: &[[f32; 3]]) -> Self {
        if positions.is_empty() {
            return Self::default();
        }

        let mut sum = [0.0f32; 2];
        let mut sum_abs = [0.0f32; 3];
        for p in positions {
            sum[0] += p[0];
            sum[1] += p[1];
            for (acc, v) in sum_abs.iter_mut().zip(p) {
                *acc += v.abs();
            }
        }

        let n = positions.len() as f32;
        let [ax, ay, az] = sum_abs.map(|s| s / n);
        Self {
            x: -(sum[0] / n),
            y: -(sum[1] / n),
            z: -(ax * ax + ay * ay + az * az).sqrt() * Self::DISTANCE_SCALE,
        }
    }
}

/// Everything accumulated while parsing one OBJ file.
#[derive(Clone, Debug, Default)]
pub struct ModelData {
    pub positions: Vec<[f32; 3]>,
    pub texcoords: Vec<[f32; 2]>,
    pub normals: Vec<[f32; 3]>,
    pub entries: Vec<DrawEntry>,
    pub materials: MaterialLibrary,
}

impl ModelData {
    pub fn placement(&self) -> Placement {
        Placement::from_positions(&self.positions)
    }

    pub fn polygon_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, DrawEntry::Polygon(_)))
            .count()
    }

    /// Returns `true` if there is at least one polygon to draw.
    pub fn is_valid(&self) -> bool {
        !self.positions.is_empty() && self.polygon_count() > 0
    }
}
