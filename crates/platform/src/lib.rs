//! Platform layer: windowing, event loop and the per-frame scene walk.
//!
//! - Window and GPU are created on `resumed`, then every scene model is
//!   loaded once.
//! - Continuous redraws: each frame advances time, composes world matrices
//!   and replays one compiled list per body.
//! - Resize and surface loss are handled here; the renderer only reacts.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, anyhow};
use asset::texture::ImageFileDecoder;
use corelib::{
    Mat4,
    camera::Camera,
    scene::{FrameContext, Scene, SceneDesc},
};
use renderer::{GpuState, GraphicsContext, Model, ObjectStyle};
use winit::{
    application::ApplicationHandler,
    dpi::{PhysicalPosition, PhysicalSize},
    event::{ElementState, KeyEvent, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

/// Camera travel speed in world units per second.
const CAMERA_SPEED: f32 = 500.0;
/// Longest frame step fed to the scene clock, in seconds.
const MAX_FRAME_STEP: f32 = 0.25;
/// Pixels of touchpad scroll per wheel line.
const PIXELS_PER_LINE: f32 = 20.0;

/// Startup options collected by the entry point.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub backends: wgpu::Backends,
    pub show_fps: bool,
    pub width: u32,
    pub height: u32,
    /// Model paths in the scene are relative to this directory.
    pub assets: PathBuf,
}

/// Run the scene in a window. Returns when the window is closed.
pub fn run_with_renderer(options: RunOptions, desc: SceneDesc) -> Result<()> {
    let scene = Scene::from_desc(&desc)?;
    let event_loop: EventLoop<()> = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(options, desc, scene);
    event_loop
        .run_app(&mut app)
        .map_err(|e| anyhow!("Event loop error: {e:?}"))?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct App {
    options: RunOptions,
    desc: SceneDesc,
    scene: Scene,

    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,

    // One slot per distinct model path; bodies index into it.
    models: Vec<Model>,
    body_models: Vec<usize>,
    matrices: Vec<Mat4>,

    camera: Camera,
    frame: FrameContext,
    last_frame: Instant,
    held: HashSet<KeyCode>,
    // None until the first cursor sample arrives.
    last_cursor: Option<PhysicalPosition<f64>>,
    fps: FpsCounter,

    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(options: RunOptions, desc: SceneDesc, scene: Scene) -> Self {
        let aspect = options.width as f32 / options.height.max(1) as f32;
        let camera = desc.camera.camera(aspect);
        Self {
            options,
            desc,
            scene,
            window: None,
            gpu: None,
            models: Vec::new(),
            body_models: Vec::new(),
            matrices: Vec::new(),
            camera,
            frame: FrameContext::new(),
            last_frame: Instant::now(),
            held: HashSet::new(),
            last_cursor: None,
            fps: FpsCounter::new(),
            fatal: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = Window::default_attributes()
            .with_title("Orrery")
            .with_inner_size(PhysicalSize::new(self.options.width, self.options.height));
        let window = Arc::new(event_loop.create_window(attributes)?);
        log::info!(
            "Window created: {}x{}",
            window.inner_size().width,
            window.inner_size().height
        );

        let mut gpu = pollster::block_on(GpuState::new(window.clone(), self.options.backends))?;
        self.camera.set_aspect(gpu.aspect());
        self.load_models(&mut gpu);

        self.gpu = Some(gpu);
        self.window = Some(window);
        self.last_frame = Instant::now();
        Ok(())
    }

    fn load_models(&mut self, gpu: &mut GpuState) {
        let decoder = ImageFileDecoder;
        let mut by_path: HashMap<&str, usize> = HashMap::new();

        for body in self.scene.bodies() {
            let slot = *by_path.entry(body.model.as_str()).or_insert_with(|| {
                let model = Model::load(self.options.assets.join(&body.model), gpu, &decoder);
                self.models.push(model);
                self.models.len() - 1
            });
            self.body_models.push(slot);
        }

        let loaded = self.models.iter().filter(|m| m.is_loaded()).count();
        log::info!(
            "Scene: {} bodies, {}/{} models loaded",
            self.scene.len(),
            loaded,
            self.models.len()
        );
    }

    fn on_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        match event.state {
            ElementState::Pressed => {
                if code == KeyCode::Escape {
                    log::info!("Escape pressed. Exiting event loop.");
                    event_loop.exit();
                    return;
                }
                self.held.insert(code);
            }
            ElementState::Released => {
                self.held.remove(&code);
            }
        }
    }

    fn on_cursor(&mut self, position: PhysicalPosition<f64>) {
        if let Some((dx, dy)) = cursor_delta(&mut self.last_cursor, position) {
            self.camera.look(dx, dy);
        }
    }

    fn on_wheel(&mut self, delta: MouseScrollDelta) {
        self.camera.zoom(wheel_lines(delta));
    }

    fn move_camera(&mut self, dt: f32) {
        let axis = |pos: KeyCode, neg: KeyCode| {
            self.held.contains(&pos) as i32 as f32 - self.held.contains(&neg) as i32 as f32
        };
        let forward = axis(KeyCode::KeyW, KeyCode::KeyS);
        let right = axis(KeyCode::KeyD, KeyCode::KeyA);
        if forward != 0.0 || right != 0.0 {
            let step = CAMERA_SPEED * dt;
            self.camera.fly(forward * step, right * step);
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32().min(MAX_FRAME_STEP);
        self.last_frame = now;

        self.move_camera(dt);
        self.frame.advance(dt);
        self.scene.world_matrices(&self.frame, &mut self.matrices);

        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        if let Some(light) = self.scene.light_source() {
            gpu.set_light_position(self.matrices[light].w_axis.truncate());
        }
        let bodies = self.scene.bodies().iter().zip(&self.body_models);
        for (matrix, (body, &slot)) in self.matrices.iter().zip(bodies) {
            gpu.set_model_matrix(*matrix);
            gpu.set_object_style(ObjectStyle {
                emissive: body.emissive,
                color: body.color,
            });
            self.models[slot].draw(gpu);
        }

        match gpu.render(self.camera.proj_view()) {
            Ok(()) => {}
            Err(e) if GpuState::is_surface_lost(&e) => {
                log::warn!("Surface lost/outdated: {e:?}. Recreating.");
                gpu.recreate_surface();
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("GPU out of memory. Exiting.");
                event_loop.exit();
            }
            Err(e) => log::warn!("Frame skipped: {e:?}"),
        }

        if self.options.show_fps {
            if let Some(fps) = self.fps.tick(now) {
                log::info!("FPS: {:.1} (t={:.1}s)", fps, self.frame.elapsed);
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        log::info!(
            "Starting scene: {} bodies, camera eye={:?}",
            self.desc.bodies.len(),
            self.desc.camera.eye
        );
        if let Err(e) = self.init(event_loop) {
            log::error!("Initialization failed: {e:#}");
            self.fatal = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested. Exiting event loop.");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                log::info!("Resized: {}x{}", size.width, size.height);
                if let Some(gpu) = self.gpu.as_mut() {
                    gpu.resize(size.width, size.height);
                    self.camera.set_aspect(gpu.aspect());
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.on_key(event_loop, &event),
            WindowEvent::CursorMoved { position, .. } => self.on_cursor(position),
            WindowEvent::CursorLeft { .. } => self.last_cursor = None,
            WindowEvent::MouseWheel { delta, .. } => self.on_wheel(delta),
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

/// Cursor travel since the last sample as (right, up). The first sample only
/// latches the position.
fn cursor_delta(
    last: &mut Option<PhysicalPosition<f64>>,
    position: PhysicalPosition<f64>,
) -> Option<(f32, f32)> {
    let prev = last.replace(position)?;
    Some(((position.x - prev.x) as f32, (prev.y - position.y) as f32))
}

/// Wheel delta in lines, positive away from the user.
fn wheel_lines(delta: MouseScrollDelta) -> f32 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => y,
        MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_LINE,
    }
}

/// Averages frames over one-second windows.
struct FpsCounter {
    window_start: Option<Instant>,
    frames: u32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            window_start: None,
            frames: 0,
        }
    }

    /// Count a frame; returns the average once a second has passed.
    fn tick(&mut self, now: Instant) -> Option<f32> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        let elapsed = (now - start).as_secs_f32();
        if elapsed < 1.0 {
            return None;
        }
        let fps = self.frames as f32 / elapsed;
        self.window_start = Some(now);
        self.frames = 0;
        Some(fps)
    }
}
