//! OBJ parser for the subset used by the planet models:
//! `v`, `vt`, `vn`, `f` (8 face encodings), `mtllib` and `usemtl`.

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result};

use crate::mesh::{DrawEntry, Face, ModelData};

/// Load an OBJ model from a file path. Material libraries are resolved
/// relative to the directory of `path`.
pub fn load_model_from_path(path: impl AsRef<Path>) -> Result<ModelData> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open OBJ file: {}", path.display()))?;
    let path_str = path.to_string_lossy();
    load_model_from_reader(BufReader::new(file), directory_prefix(&path_str))
}

/// Load an OBJ model from a [`BufRead`] implementation.
/// `prefix` is prepended to every `mtllib` and texture file name.
pub fn load_model_from_reader<R: BufRead>(reader: R, prefix: &str) -> Result<ModelData> {
    parse_obj(reader, prefix)
}

/// Convenience helper to parse an OBJ string literal.
pub fn load_model_from_str(contents: &str) -> Result<ModelData> {
    parse_obj(io::Cursor::new(contents), "")
}

/// Everything up to and including the last `/`, or `""`.
pub fn directory_prefix(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..=i],
        None => "",
    }
}

fn parse_obj<R: BufRead>(reader: R, prefix: &str) -> Result<ModelData> {
    let mut data = ModelData::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
        let trimmed = line.trim();
        let bytes = trimmed.as_bytes();

        match (bytes.first(), bytes.get(1)) {
            (Some(b'v'), Some(b' ')) => {
                let [x, y, z] = scan_floats(&trimmed[2..]);
                data.positions.push([x, y, z]);
            }
            (Some(b'v'), Some(b't')) => {
                data.texcoords.push(scan_floats(&trimmed[2..]));
            }
            (Some(b'v'), Some(b'n')) => {
                data.normals.push(scan_floats(&trimmed[2..]));
            }
            (Some(b'f'), _) => {
                // Unhandled encodings are dropped without a diagnostic.
                if let Some(face) = parse_face(trimmed) {
                    data.entries.push(DrawEntry::Polygon(face));
                }
            }
            (Some(b'm'), Some(b't')) => {
                if let Some(name) = trimmed.split_whitespace().nth(1) {
                    let file = format!("{prefix}{name}");
                    log::debug!("Loading material library {}", file);
                    if let Err(e) = data.materials.load_path(&file, prefix) {
                        log::warn!("{e:#}");
                    }
                }
            }
            (Some(b'u'), Some(b's')) => {
                if let Some(index) = trimmed
                    .split_whitespace()
                    .nth(1)
                    .and_then(|name| data.materials.index_of(name))
                {
                    data.entries.push(DrawEntry::MaterialSwitch(index));
                }
            }
            _ => {
                // Comments, blank lines, o/g/s and anything else.
            }
        }
    }

    Ok(data)
}

/// Read up to `N` floats; the first missing or bad value ends the scan and
/// leaves the rest at zero.
fn scan_floats<const N: usize>(fields: &str) -> [f32; N] {
    let mut out = [0.0f32; N];
    for (slot, token) in out.iter_mut().zip(fields.split_whitespace()) {
        match token.parse::<f32>() {
            Ok(v) => *slot = v,
            Err(_) => break,
        }
    }
    out
}

/// The four per-vertex encodings of a face line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaceForm {
    /// `f v v v`
    VertexOnly,
    /// `f v/t v/t v/t`
    VertexTexture,
    /// `f v//n v//n v//n`
    VertexNormal,
    /// `f v/t/n v/t/n v/t/n`
    VertexTextureNormal,
}

/// Decide the encoding and edge count of a trimmed face line from its
/// space and slash counts. Returns `None` for anything but 3 or 4 edges
/// or an unrecognized slash count.
pub fn classify_face(line: &str) -> Option<(FaceForm, usize)> {
    // The final character never counts.
    let body = &line.as_bytes()[..line.len().saturating_sub(1)];
    let edges = body.iter().filter(|&&c| c == b' ').count();
    let slashes = body.iter().filter(|&&c| c == b'/').count();

    let form = if slashes == 0 {
        FaceForm::VertexOnly
    } else if slashes == edges {
        FaceForm::VertexTexture
    } else if slashes == edges * 2 {
        if body.windows(2).any(|w| w == b"//") {
            FaceForm::VertexNormal
        } else {
            FaceForm::VertexTextureNormal
        }
    } else {
        return None;
    };

    matches!(edges, 3 | 4).then_some((form, edges))
}

/// Parse a trimmed `f ...` line into a [`Face`] with 0-based indices.
///
/// Only one normal is kept per face: each vertex group overwrites it, so the
/// last group's normal wins. Existing assets rely on this.
pub fn parse_face(line: &str) -> Option<Face> {
    let (form, edges) = classify_face(line)?;

    let groups: Vec<&str> = line
        .strip_prefix('f')?
        .split_whitespace()
        .take(edges)
        .collect();
    if groups.len() != edges {
        return None;
    }

    let mut vertices = Vec::with_capacity(edges);
    let mut texcoords = Vec::with_capacity(edges);
    let mut normal = None;

    for group in groups {
        match form {
            FaceForm::VertexOnly => {
                vertices.push(index(group)?);
            }
            FaceForm::VertexTexture => {
                let (v, t) = group.split_once('/')?;
                vertices.push(index(v)?);
                texcoords.push(index(t)?);
            }
            FaceForm::VertexNormal => {
                let (v, n) = group.split_once("//")?;
                vertices.push(index(v)?);
                normal = Some(index(n)?);
            }
            FaceForm::VertexTextureNormal => {
                let mut split = group.splitn(3, '/');
                vertices.push(index(split.next()?)?);
                texcoords.push(index(split.next()?)?);
                normal = Some(index(split.next()?)?);
            }
        }
    }

    let texcoords = match form {
        FaceForm::VertexTexture | FaceForm::VertexTextureNormal => Some(texcoords),
        FaceForm::VertexOnly | FaceForm::VertexNormal => None,
    };
    Some(Face::new(vertices, texcoords, normal))
}

/// 1-based literal to 0-based index.
fn index(token: &str) -> Option<usize> {
    let raw = token.parse::<i64>().ok()?;
    if raw < 1 {
        return None;
    }
    usize::try_from(raw - 1).ok()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn polygons(data: &ModelData) -> Vec<&Face> {
        data.entries
            .iter()
            .filter_map(|e| match e {
                DrawEntry::Polygon(f) => Some(f),
                DrawEntry::MaterialSwitch(_) => None,
            })
            .collect()
    }

    #[test]
    fn vertex_only_triangle() {
        let face = parse_face("f 1 2 3").unwrap();
        assert_eq!(face.vertices, vec![0, 1, 2]);
        assert_eq!(face.texcoords, None);
        assert_eq!(face.normal, None);
    }

    #[test]
    fn vertex_texture_triangle() {
        let face = parse_face("f 1/1 2/2 3/3").unwrap();
        assert_eq!(face.edges(), 3);
        assert_eq!(face.texcoords, Some(vec![0, 1, 2]));
        assert_eq!(face.normal, None);
    }

    #[test]
    fn double_slash_keeps_last_normal() {
        let face = parse_face("f 1//1 2//2 3//3").unwrap();
        assert_eq!(face.vertices, vec![0, 1, 2]);
        assert_eq!(face.texcoords, None);
        assert_eq!(face.normal, Some(2));

        let face = parse_face("f 4//9 5//8 6//7").unwrap();
        assert_eq!(face.normal, Some(6));
    }

    #[test]
    fn full_quad() {
        let face = parse_face("f 1/1/1 2/2/2 3/3/3 4/4/4").unwrap();
        assert_eq!(face.edges(), 4);
        assert_eq!(face.vertices, vec![0, 1, 2, 3]);
        assert_eq!(face.texcoords, Some(vec![0, 1, 2, 3]));
        assert_eq!(face.normal, Some(3));
    }

    #[test]
    fn all_eight_encodings_shift_indices_by_one() {
        let cases: [(&str, FaceForm, Vec<usize>, Option<Vec<usize>>, Option<usize>); 8] = [
            ("f 3 5 7", FaceForm::VertexOnly, vec![2, 4, 6], None, None),
            ("f 3 5 7 9", FaceForm::VertexOnly, vec![2, 4, 6, 8], None, None),
            (
                "f 3/2 5/4 7/6",
                FaceForm::VertexTexture,
                vec![2, 4, 6],
                Some(vec![1, 3, 5]),
                None,
            ),
            (
                "f 3/2 5/4 7/6 9/8",
                FaceForm::VertexTexture,
                vec![2, 4, 6, 8],
                Some(vec![1, 3, 5, 7]),
                None,
            ),
            (
                "f 3//11 5//12 7//13",
                FaceForm::VertexNormal,
                vec![2, 4, 6],
                None,
                Some(12),
            ),
            (
                "f 3//11 5//12 7//13 9//14",
                FaceForm::VertexNormal,
                vec![2, 4, 6, 8],
                None,
                Some(13),
            ),
            (
                "f 3/2/11 5/4/12 7/6/13",
                FaceForm::VertexTextureNormal,
                vec![2, 4, 6],
                Some(vec![1, 3, 5]),
                Some(12),
            ),
            (
                "f 3/2/11 5/4/12 7/6/13 9/8/14",
                FaceForm::VertexTextureNormal,
                vec![2, 4, 6, 8],
                Some(vec![1, 3, 5, 7]),
                Some(13),
            ),
        ];

        for (line, form, vertices, texcoords, normal) in cases {
            let (got_form, edges) = classify_face(line).unwrap();
            assert_eq!(got_form, form, "{line}");
            assert_eq!(edges, vertices.len(), "{line}");

            let face = parse_face(line).unwrap();
            assert_eq!(face.vertices, vertices, "{line}");
            assert_eq!(face.texcoords, texcoords, "{line}");
            assert_eq!(face.normal, normal, "{line}");
        }
    }

    #[test]
    fn unhandled_faces_are_dropped() {
        // Pentagon.
        assert!(parse_face("f 1 2 3 4 5").is_none());
        // Two vertices.
        assert!(parse_face("f 1 2").is_none());
        // Slash count matches no encoding.
        assert!(parse_face("f 1/1/1 2/2 3").is_none());
        // Zero is not a valid 1-based index.
        assert!(parse_face("f 0 1 2").is_none());
        // Garbage literal.
        assert!(parse_face("f a b c").is_none());
    }

    #[test]
    fn directives_fill_pools_in_order() {
        let src = "\
# comment
mtllib missing.mtl
o Sphere
v 1.0 2.0 3.0
v -1.0 0.5 0.0
v 0.0 0.0 1.0
vt 0.25 0.75
vn 0.0 0.0 1.0
s off
f 1/1/1 2/1/1 3/1/1
f 1 2 3 4 5
";
        let data = load_model_from_str(src).unwrap();
        assert_eq!(data.positions, vec![[1.0, 2.0, 3.0], [-1.0, 0.5, 0.0], [0.0, 0.0, 1.0]]);
        assert_eq!(data.texcoords, vec![[0.25, 0.75]]);
        assert_eq!(data.normals, vec![[0.0, 0.0, 1.0]]);
        assert_eq!(data.entries.len(), 1);
        assert!(data.materials.is_empty());
    }

    #[test]
    fn indented_and_crlf_lines_are_accepted() {
        let src = "  v 0 0 0\r\n\tv 1 0 0\r\n v 0 1 0\r\n f 1 2 3\r\n";
        let data = load_model_from_str(src).unwrap();
        assert_eq!(data.positions.len(), 3);
        assert_eq!(polygons(&data).len(), 1);
    }

    #[test]
    fn short_vertex_lines_keep_pool_aligned() {
        let data = load_model_from_str("v 1\nv 1 2 x\nvt 0.5\n").unwrap();
        assert_eq!(data.positions, vec![[1.0, 0.0, 0.0], [1.0, 2.0, 0.0]]);
        assert_eq!(data.texcoords, vec![[0.5, 0.0]]);
    }

    #[test]
    fn usemtl_resolves_against_library_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("planet.mtl"),
            "newmtl Rock\nKd 0.5 0.4 0.3\nmap_Kd rock.png\nnewmtl Ice\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("planet.obj"),
            "mtllib planet.mtl\n\
             v 0 0 0\nv 1 0 0\nv 0 1 0\n\
             usemtl Ice\nf 1 2 3\nusemtl Lava\nusemtl Rock\nf 3 2 1\n",
        )
        .unwrap();

        let data = load_model_from_path(dir.path().join("planet.obj")).unwrap();
        assert_eq!(data.materials.len(), 2);
        assert_eq!(
            data.entries,
            vec![
                DrawEntry::MaterialSwitch(1),
                DrawEntry::Polygon(Face::new(vec![0, 1, 2], None, None)),
                DrawEntry::MaterialSwitch(0),
                DrawEntry::Polygon(Face::new(vec![2, 1, 0], None, None)),
            ]
        );

        let rock = data.materials.get(0).unwrap();
        let expected = format!("{}/rock.png", dir.path().display());
        assert_eq!(rock.diffuse_map.as_deref(), Some(Path::new(&expected)));
    }

    #[test]
    fn usemtl_before_mtllib_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("m.mtl"), "newmtl A\n").unwrap();
        fs::write(dir.path().join("m.obj"), "usemtl A\nmtllib m.mtl\nusemtl A\n").unwrap();
        let data = load_model_from_path(dir.path().join("m.obj")).unwrap();
        assert_eq!(data.entries, vec![DrawEntry::MaterialSwitch(0)]);
    }

    #[test]
    fn missing_obj_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_model_from_path(dir.path().join("Ghost.obj")).unwrap_err();
        assert!(err.to_string().contains("Ghost.obj"));
    }

    #[test]
    fn prefix_is_text_before_last_slash() {
        assert_eq!(directory_prefix("resources/Models/Sun/Sun.obj"), "resources/Models/Sun/");
        assert_eq!(directory_prefix("Sun.obj"), "");
        assert_eq!(directory_prefix("/Sun.obj"), "/");
    }
}
