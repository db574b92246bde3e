//! Scene composition: bodies arranged in a parent/child hierarchy, each with
//! an orbit transform evaluated once per frame.
//!
//! The description is plain data (RON on disk); [`Scene`] is the validated,
//! index-resolved form the frame loop walks.

use std::{collections::HashMap, f32::consts::FRAC_PI_2, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    Mat4, Vec3,
    camera::Camera,
    error::{CoreError, CoreResult},
    transform::{OrbitTransform, Spin},
};

/// Per-frame timing passed to scene composition.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameContext {
    /// Seconds since the first frame.
    pub elapsed: f32,
    /// Seconds since the previous frame.
    pub delta: f32,
    pub frame: u64,
}

impl FrameContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        self.delta = dt;
        self.elapsed += dt;
        self.frame += 1;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraDesc {
    pub eye: [f32; 3],
    pub target: [f32; 3],
    pub fov_y_deg: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Default for CameraDesc {
    fn default() -> Self {
        Self {
            eye: [3750.0, 1500.0, -1000.0],
            target: [0.0, 0.0, 0.0],
            fov_y_deg: 45.0,
            z_near: 0.1,
            z_far: 25000.0,
        }
    }
}

impl CameraDesc {
    pub fn camera(&self, aspect: f32) -> Camera {
        Camera::looking_at(
            Vec3::from(self.eye),
            Vec3::from(self.target),
            self.fov_y_deg.to_radians(),
        )
        .with_clip(self.z_near, self.z_far)
        .with_aspect(aspect)
    }
}

/// Flat color of the built-in orbit lines.
pub const ORBIT_COLOR: [f32; 4] = [0.5, 0.5, 0.5, 1.0];

fn unit_scale() -> f32 {
    1.0
}

/// One drawable body as written in the scene file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyDesc {
    pub name: String,
    /// OBJ path relative to the assets directory.
    pub model: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default = "unit_scale")]
    pub scale: f32,
    #[serde(default)]
    pub spin: Spin,
    #[serde(default)]
    pub offset: [f32; 3],
    /// Drawn with its texture as is, ignoring lighting.
    #[serde(default)]
    pub emissive: bool,
    /// Flat color that replaces the model's materials.
    #[serde(default)]
    pub color: Option<[f32; 4]>,
}

impl BodyDesc {
    pub fn new(name: &str, model: &str) -> Self {
        Self {
            name: name.to_owned(),
            model: model.to_owned(),
            parent: None,
            scale: 1.0,
            spin: Spin::NONE,
            offset: [0.0; 3],
            emissive: false,
            color: None,
        }
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_owned());
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_spin(mut self, spin: Spin) -> Self {
        self.spin = spin;
        self
    }

    pub fn with_offset(mut self, offset: [f32; 3]) -> Self {
        self.offset = offset;
        self
    }

    pub fn emissive(mut self) -> Self {
        self.emissive = true;
        self
    }

    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = Some(color);
        self
    }

    pub fn transform(&self) -> OrbitTransform {
        OrbitTransform {
            scale: self.scale,
            spin: self.spin,
            offset: Vec3::from(self.offset),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDesc {
    #[serde(default)]
    pub camera: CameraDesc,
    pub bodies: Vec<BodyDesc>,
}

impl SceneDesc {
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&text)
    }

    pub fn from_ron(text: &str) -> CoreResult<Self> {
        Ok(ron::from_str(text)?)
    }

    pub fn to_ron(&self) -> CoreResult<String> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Sun, eight planets, the moon, two rings, a sky sphere and orbit lines.
    pub fn solar_system() -> Self {
        let planet = |name: &str, scale: f32, rate: f32, distance: f32| {
            BodyDesc::new(name, &format!("Models/{name}/{name}.obj"))
                .with_scale(scale)
                .with_spin(Spin::around_y(rate))
                .with_offset([0.0, 0.0, distance])
        };
        let orbit_line = |name: &str, model: &str, scale: f32| {
            BodyDesc::new(name, &format!("Models/{model}/{model}.obj"))
                .with_scale(scale)
                .with_color(ORBIT_COLOR)
        };

        let bodies = vec![
            BodyDesc::new("Background", "Models/Background/Background.obj")
                .with_scale(4000.0)
                .emissive(),
            BodyDesc::new("Sun", "Models/Sun/Sun.obj")
                .with_scale(50.0)
                .emissive(),
            planet("Mercury", 10.0, 4.0, 17.5),
            planet("Venus", 15.0, 1.5, 22.0),
            planet("Earth", 17.0, 1.0, 26.0),
            BodyDesc::new("Moon", "Models/Moon/Moon.obj")
                .with_parent("Earth")
                .with_scale(0.5)
                .with_spin(Spin::around_y(1.0))
                .with_offset([-3.0, 0.0, 8.0]),
            planet("Mars", 13.0, 2.0, 50.0),
            planet("Jupiter", 45.0, 0.25, 30.0),
            planet("Saturn", 42.0, 1.0 / 6.0, 60.0),
            BodyDesc::new("SaturnRing", "Models/Line3/Line3.obj")
                .with_parent("Saturn")
                .with_scale(4.0)
                .with_spin(Spin {
                    rate: 1.0,
                    phase: -60.0,
                    axis: [0.0, 1.0, 0.0],
                }),
            planet("Uranus", 30.0, 0.125, 120.0),
            planet("Neptune", 29.0, 0.1, 180.0),
            BodyDesc::new("NeptuneRing", "Models/Line3/Line3.obj")
                .with_parent("Neptune")
                .with_scale(4.0)
                .with_spin(Spin {
                    rate: 0.0,
                    phase: FRAC_PI_2,
                    axis: [0.0, 0.0, 1.0],
                }),
            orbit_line("OrbitMercury", "Line", 180.0),
            orbit_line("OrbitVenus", "Line", 350.0),
            orbit_line("OrbitEarth", "Line", 450.0),
            orbit_line("OrbitMars", "Line", 655.0),
            orbit_line("OrbitJupiter", "Line2", 1350.0),
            orbit_line("OrbitSaturn", "Line2", 2550.0),
            orbit_line("OrbitUranus", "Line2", 3650.0),
            orbit_line("OrbitNeptune", "Line2", 5300.0),
        ];

        Self {
            camera: CameraDesc::default(),
            bodies,
        }
    }
}

/// Resolved body: parent as an index into [`Scene::bodies`], always lower
/// than the body's own index.
#[derive(Clone, Debug, PartialEq)]
pub struct Body {
    pub name: String,
    pub model: String,
    pub parent: Option<usize>,
    pub transform: OrbitTransform,
    pub emissive: bool,
    pub color: Option<[f32; 4]>,
}

#[derive(Clone, Debug, Default)]
pub struct Scene {
    bodies: Vec<Body>,
}

impl Scene {
    pub fn from_desc(desc: &SceneDesc) -> CoreResult<Self> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut bodies = Vec::with_capacity(desc.bodies.len());

        for (i, b) in desc.bodies.iter().enumerate() {
            let parent = match &b.parent {
                Some(p) => Some(index.get(p.as_str()).copied().ok_or_else(|| {
                    CoreError::UnknownParent {
                        body: b.name.clone(),
                        parent: p.clone(),
                    }
                })?),
                None => None,
            };
            if index.insert(b.name.as_str(), i).is_some() {
                return Err(CoreError::DuplicateBody(b.name.clone()));
            }
            bodies.push(Body {
                name: b.name.clone(),
                model: b.model.clone(),
                parent,
                transform: b.transform(),
                emissive: b.emissive,
                color: b.color,
            });
        }

        log::debug!("Scene resolved with {} bodies", bodies.len());
        Ok(Self { bodies })
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// The smallest emissive body lights the others. A sky sphere is
    /// emissive too, but always larger than the star inside it.
    pub fn light_source(&self) -> Option<usize> {
        self.bodies
            .iter()
            .enumerate()
            .filter(|(_, b)| b.emissive)
            .min_by(|(_, a), (_, b)| a.transform.scale.total_cmp(&b.transform.scale))
            .map(|(i, _)| i)
    }

    /// World matrix of every body, in declaration order. Reuses `out`'s
    /// allocation.
    pub fn world_matrices(&self, frame: &FrameContext, out: &mut Vec<Mat4>) {
        out.clear();
        for body in &self.bodies {
            // Parents precede children, so out[p] is already final.
            let parent = body.parent.map_or(Mat4::IDENTITY, |p| out[p]);
            out.push(parent * body.transform.matrix(frame.elapsed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-3
    }

    #[test]
    fn frame_context_accumulates() {
        let mut frame = FrameContext::new();
        frame.advance(0.5);
        frame.advance(0.25);
        assert!((frame.elapsed - 0.75).abs() < 1e-6);
        assert!((frame.delta - 0.25).abs() < 1e-6);
        assert_eq!(frame.frame, 2);
    }

    #[test]
    fn planet_orbits_parent_at_scaled_distance() {
        let desc = SceneDesc {
            camera: CameraDesc::default(),
            bodies: vec![
                BodyDesc::new("Sun", "sun.obj"),
                BodyDesc::new("Earth", "earth.obj")
                    .with_scale(2.0)
                    .with_spin(Spin::around_y(1.0))
                    .with_offset([0.0, 0.0, 10.0]),
            ],
        };
        let scene = Scene::from_desc(&desc).unwrap();
        let mut out = Vec::new();

        let mut frame = FrameContext::new();
        scene.world_matrices(&frame, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Mat4::IDENTITY);
        assert!(close(out[1].transform_point3(Vec3::ZERO), Vec3::new(0.0, 0.0, 20.0)));

        // A quarter turn around +Y carries +Z to +X.
        frame.advance(std::f32::consts::FRAC_PI_2);
        scene.world_matrices(&frame, &mut out);
        assert!(close(out[1].transform_point3(Vec3::ZERO), Vec3::new(20.0, 0.0, 0.0)));
    }

    #[test]
    fn child_inherits_parent_matrix() {
        let desc = SceneDesc {
            camera: CameraDesc::default(),
            bodies: vec![
                BodyDesc::new("Earth", "e.obj").with_offset([5.0, 0.0, 0.0]),
                BodyDesc::new("Moon", "m.obj")
                    .with_parent("Earth")
                    .with_offset([0.0, 1.0, 0.0]),
            ],
        };
        let scene = Scene::from_desc(&desc).unwrap();
        assert_eq!(scene.bodies()[1].parent, Some(0));

        let mut out = Vec::new();
        scene.world_matrices(&FrameContext::new(), &mut out);
        assert!(close(out[1].transform_point3(Vec3::ZERO), Vec3::new(5.0, 1.0, 0.0)));
    }

    #[test]
    fn parent_must_come_first() {
        let desc = SceneDesc {
            camera: CameraDesc::default(),
            bodies: vec![
                BodyDesc::new("Moon", "m.obj").with_parent("Earth"),
                BodyDesc::new("Earth", "e.obj"),
            ],
        };
        let err = Scene::from_desc(&desc).unwrap_err();
        assert!(matches!(err, CoreError::UnknownParent { .. }));
    }

    #[test]
    fn duplicate_names_rejected() {
        let desc = SceneDesc {
            camera: CameraDesc::default(),
            bodies: vec![BodyDesc::new("A", "a.obj"), BodyDesc::new("A", "b.obj")],
        };
        assert!(matches!(
            Scene::from_desc(&desc),
            Err(CoreError::DuplicateBody(name)) if name == "A"
        ));
    }

    #[test]
    fn solar_system_resolves() {
        let scene = Scene::from_desc(&SceneDesc::solar_system()).unwrap();
        let moon = scene.bodies().iter().find(|b| b.name == "Moon").unwrap();
        let earth = moon.parent.unwrap();
        assert_eq!(scene.bodies()[earth].name, "Earth");
        assert!(scene.bodies().iter().all(|b| b.model.ends_with(".obj")));
    }

    #[test]
    fn solar_system_marks_sun_and_backdrop_emissive() {
        let scene = Scene::from_desc(&SceneDesc::solar_system()).unwrap();
        let emissive: Vec<&str> = scene
            .bodies()
            .iter()
            .filter(|b| b.emissive)
            .map(|b| b.name.as_str())
            .collect();
        assert_eq!(emissive, vec!["Background", "Sun"]);

        let light = scene.light_source().unwrap();
        assert_eq!(scene.bodies()[light].name, "Sun");

        let earth = scene.bodies().iter().find(|b| b.name == "Earth").unwrap();
        assert!(!earth.emissive && earth.color.is_none());
        let orbits: Vec<_> = scene
            .bodies()
            .iter()
            .filter(|b| b.name.starts_with("Orbit"))
            .collect();
        assert_eq!(orbits.len(), 8);
        assert!(orbits.iter().all(|b| b.color == Some(ORBIT_COLOR)));
    }

    #[test]
    fn scene_without_emissive_bodies_has_no_light_source() {
        let desc = SceneDesc {
            camera: CameraDesc::default(),
            bodies: vec![BodyDesc::new("Rock", "r.obj")],
        };
        assert_eq!(Scene::from_desc(&desc).unwrap().light_source(), None);
    }

    #[test]
    fn ron_round_trip() {
        let desc = SceneDesc::solar_system();
        let text = desc.to_ron().unwrap();
        assert_eq!(SceneDesc::from_ron(&text).unwrap(), desc);
    }

    #[test]
    fn ron_defaults_fill_missing_fields() {
        let desc = SceneDesc::from_ron(
            r#"(bodies: [(name: "Sun", model: "Models/Sun/Sun.obj", scale: 50.0)])"#,
        )
        .unwrap();
        assert_eq!(desc.camera, CameraDesc::default());
        let sun = &desc.bodies[0];
        assert_eq!(sun.parent, None);
        assert_eq!(sun.spin, Spin::NONE);
        assert_eq!(sun.offset, [0.0; 3]);
        assert!(!sun.emissive);
        assert_eq!(sun.color, None);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SceneDesc::load(dir.path().join("scene.ron")).unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }

    #[test]
    fn invalid_ron_is_parse_error() {
        assert!(matches!(
            SceneDesc::from_ron("{{not valid}}"),
            Err(CoreError::Parse(_))
        ));
    }
}
