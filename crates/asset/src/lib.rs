//! Asset loading/parsers (meshes, materials, textures).
//! OBJ geometry with the 8 face encodings, MTL libraries, RGBA8 image decoding.

pub mod mesh;
pub mod mtl;
pub mod obj;
pub mod texture;
