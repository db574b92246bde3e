//! MTL material library parser (newmtl / Ka / Kd / Ks / map_Kd).

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

pub const DEFAULT_AMBIENT: [f32; 4] = [0.2, 0.2, 0.2, 1.0];
pub const DEFAULT_DIFFUSE: [f32; 4] = [0.8, 0.8, 0.8, 1.0];
pub const DEFAULT_SPECULAR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// A material as written in the library, before any texture is uploaded.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDef {
    pub name: String,
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    /// `map_Kd` image path, already joined with the model directory prefix.
    pub diffuse_map: Option<PathBuf>,
}

impl MaterialDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ambient: DEFAULT_AMBIENT,
            diffuse: DEFAULT_DIFFUSE,
            specular: DEFAULT_SPECULAR,
            diffuse_map: None,
        }
    }
}

/// Material pool plus the name table used by `usemtl`.
#[derive(Clone, Debug, Default)]
pub struct MaterialLibrary {
    materials: Vec<MaterialDef>,
    names: HashMap<String, usize>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn materials(&self) -> &[MaterialDef] {
        &self.materials
    }

    pub fn get(&self, index: usize) -> Option<&MaterialDef> {
        self.materials.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    /// Start a new material with default colors; a repeated name re-points
    /// to the newest one.
    pub fn push(&mut self, material: MaterialDef) -> usize {
        let index = self.materials.len();
        self.names.insert(material.name.clone(), index);
        self.materials.push(material);
        index
    }

    /// Parse a library file, appending to this pool.
    /// `prefix` is prepended to every texture path.
    pub fn load_path(&mut self, path: impl AsRef<Path>, prefix: &str) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open MTL file: {}", path.display()))?;
        self.parse_reader(BufReader::new(file), prefix)
            .with_context(|| format!("Failed to read MTL file: {}", path.display()))
    }

    /// Convenience helper to parse an MTL string literal.
    pub fn parse_str(&mut self, contents: &str, prefix: &str) -> Result<()> {
        self.parse_reader(io::Cursor::new(contents), prefix)
    }

    pub fn parse_reader<R: BufRead>(&mut self, reader: R, prefix: &str) -> Result<()> {
        // Directives apply to the most recently started material, if any.
        let mut current: Option<usize> = None;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
            let mut parts = line.split_whitespace();
            let Some(tag) = parts.next() else {
                continue;
            };

            if tag == "newmtl" {
                // A nameless newmtl still ends the previous material.
                current = parts.next().map(|name| self.push(MaterialDef::new(name)));
                continue;
            }

            let Some(material) = current.and_then(|i| self.materials.get_mut(i)) else {
                continue;
            };
            match tag {
                "Ka" => scan_rgb(parts, &mut material.ambient),
                "Kd" => scan_rgb(parts, &mut material.diffuse),
                "Ks" => scan_rgb(parts, &mut material.specular),
                "map_Kd" => {
                    if let Some(file) = parts.next() {
                        material.diffuse_map = Some(PathBuf::from(format!("{prefix}{file}")));
                    }
                }
                _ => {
                    // Ns, Ni, d, illum, other maps: not used.
                }
            }
        }

        Ok(())
    }
}

/// Overwrite r, g, b in order, stopping at the first missing or bad value.
fn scan_rgb<'a>(fields: impl Iterator<Item = &'a str>, color: &mut [f32; 4]) {
    for (slot, token) in color[..3].iter_mut().zip(fields) {
        match token.parse::<f32>() {
            Ok(v) => *slot = v,
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_apply_to_current_material() {
        let mut lib = MaterialLibrary::new();
        lib.parse_str("newmtl M1\nKa 1 0 0\nnewmtl M2\nKd 0 1 0\n", "")
            .unwrap();

        assert_eq!(lib.len(), 2);
        let m1 = lib.get(lib.index_of("M1").unwrap()).unwrap();
        assert_eq!(m1.ambient, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(m1.diffuse, DEFAULT_DIFFUSE);
        assert_eq!(m1.specular, DEFAULT_SPECULAR);

        let m2 = lib.get(lib.index_of("M2").unwrap()).unwrap();
        assert_eq!(m2.diffuse, [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(m2.ambient, DEFAULT_AMBIENT);
    }

    #[test]
    fn names_map_in_insertion_order() {
        let mut lib = MaterialLibrary::new();
        lib.parse_str("newmtl a\nnewmtl b\n", "").unwrap();
        lib.parse_str("newmtl c\n", "").unwrap();
        assert_eq!(lib.index_of("a"), Some(0));
        assert_eq!(lib.index_of("b"), Some(1));
        assert_eq!(lib.index_of("c"), Some(2));
        assert_eq!(lib.index_of("missing"), None);
    }

    #[test]
    fn partial_color_stops_at_first_bad_value() {
        let mut lib = MaterialLibrary::new();
        lib.parse_str("newmtl m\nKs 0.5 oops 0.25\n", "").unwrap();
        assert_eq!(lib.get(0).unwrap().specular, [0.5, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn directives_before_newmtl_are_ignored() {
        let mut lib = MaterialLibrary::new();
        lib.parse_str("Ka 1 1 1\nmap_Kd a.png\nnewmtl m\n", "")
            .unwrap();
        let m = lib.get(0).unwrap();
        assert_eq!(m.ambient, DEFAULT_AMBIENT);
        assert_eq!(m.diffuse_map, None);
    }

    #[test]
    fn diffuse_map_gets_directory_prefix() {
        let mut lib = MaterialLibrary::new();
        lib.parse_str(
            "# exported\n\tnewmtl Earth\n\tmap_Kd earth.png\r\n",
            "resources/Models/Earth/",
        )
        .unwrap();
        assert_eq!(
            lib.get(0).unwrap().diffuse_map.as_deref(),
            Some(Path::new("resources/Models/Earth/earth.png"))
        );
    }

    #[test]
    fn repeated_name_points_to_newest() {
        let mut lib = MaterialLibrary::new();
        lib.parse_str("newmtl m\nKa 1 0 0\nnewmtl m\n", "").unwrap();
        assert_eq!(lib.len(), 2);
        assert_eq!(lib.index_of("m"), Some(1));
    }

    #[test]
    fn nameless_newmtl_closes_previous_material() {
        let mut lib = MaterialLibrary::new();
        lib.parse_str("newmtl a\nKa 1 0 0\nnewmtl\nKa 0 1 0\n", "").unwrap();
        assert_eq!(lib.len(), 1);
        assert_eq!(lib.get(0).unwrap().ambient, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut lib = MaterialLibrary::new();
        let err = lib.load_path(dir.path().join("nope.mtl"), "").unwrap_err();
        assert!(err.to_string().contains("nope.mtl"));
        assert!(lib.is_empty());
    }
}
