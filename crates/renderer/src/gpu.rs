//! wgpu backend: surface + depth, compiled lists as vertex buffers with one
//! material bind group per batch, and a per-frame draw queue.
//! wgpu = 23.x, winit = 0.30.x

use std::num::NonZeroU64;
use std::ops::Range;
use std::sync::Arc;

use anyhow::{Context, Result};
use asset::texture::TextureData;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::{
    AddressMode, BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout,
    BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingResource, BindingType, BlendState,
    Buffer, BufferBinding, BufferBindingType, BufferDescriptor, BufferUsages, ColorTargetState,
    ColorWrites, CommandEncoderDescriptor, DepthBiasState, DepthStencilState, Device,
    DeviceDescriptor, Extent3d, Features, FilterMode, FragmentState, ImageCopyTexture,
    ImageDataLayout, Instance, InstanceDescriptor, Limits, LoadOp, Operations, Origin3d,
    PipelineLayoutDescriptor, PowerPreference, PresentMode, Queue, RenderPassColorAttachment,
    RenderPassDescriptor, RenderPipeline, RenderPipelineDescriptor, Sampler, SamplerBindingType,
    SamplerDescriptor, ShaderModuleDescriptor, ShaderSource, ShaderStages, StoreOp, Surface,
    SurfaceConfiguration, SurfaceError, TextureAspect, TextureDescriptor, TextureDimension,
    TextureFormat, TextureSampleType, TextureUsages, TextureView, TextureViewDescriptor,
    TextureViewDimension, VertexBufferLayout, VertexState, VertexStepMode, util::DeviceExt,
};
use winit::{dpi::PhysicalSize, window::Window};

use crate::{
    context::{
        GraphicsContext, ListHandle, MinFilter, ObjectStyle, TextureHandle, next_texture_handle,
    },
    list::DrawList,
    tessellate::{GpuVertex, RasterState, tessellate},
};

impl GpuVertex {
    pub const LAYOUT: VertexBufferLayout<'static> = VertexBufferLayout {
        array_stride: std::mem::size_of::<GpuVertex>() as u64,
        step_mode: VertexStepMode::Vertex,
        attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2],
    };
}

/// Frame UBO (16-byte aligned).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FrameUniform {
    view_proj: [[f32; 4]; 4],
    light_pos: [f32; 4],
}

/// Per-draw UBO, addressed with a dynamic offset. `flags.x` is 1.0 for
/// emissive draws, `flags.y` is 1.0 when `color` replaces the materials.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ObjectUniform {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 4],
    flags: [f32; 4],
    color: [f32; 4],
}

impl ObjectUniform {
    fn new(model: &Mat4, style: &ObjectStyle) -> Self {
        let flag = |on: bool| if on { 1.0 } else { 0.0 };
        Self {
            model: model.to_cols_array_2d(),
            normal: model.inverse().transpose().to_cols_array_2d(),
            flags: [flag(style.emissive), flag(style.color.is_some()), 0.0, 0.0],
            color: style.color.unwrap_or([1.0; 4]),
        }
    }
}

/// One queued `call_list`.
struct Draw {
    list: ListHandle,
    model: Mat4,
    style: ObjectStyle,
}

/// Per-batch UBO. `flags.x` is 1.0 when lighting is enabled.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct MaterialUniform {
    ambient: [f32; 4],
    diffuse: [f32; 4],
    flags: [f32; 4],
}

impl From<&RasterState> for MaterialUniform {
    fn from(state: &RasterState) -> Self {
        Self {
            ambient: state.ambient,
            diffuse: state.diffuse,
            flags: [if state.lit { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0],
        }
    }
}

const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;
const COLOR_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;
const INITIAL_OBJECTS: u64 = 64;

struct GpuTexture {
    view: TextureView,
    min_filter: MinFilter,
}

struct GpuBatch {
    // Keeps the per-batch UBO alive alongside its bind group.
    _uniform: Buffer,
    bind_group: BindGroup,
    vertices: Range<u32>,
}

struct CompiledList {
    vertex_buf: Option<Buffer>,
    batches: Vec<GpuBatch>,
}

pub struct GpuState {
    // Surface
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,

    // Device/queue
    device: Device,
    queue: Queue,

    pipeline: RenderPipeline,

    // Frame
    frame_buf: Buffer,
    frame_bg: BindGroup,
    light_pos: Vec3,

    // Objects (dynamic offsets)
    object_bgl: BindGroupLayout,
    object_buf: Buffer,
    object_bg: BindGroup,
    object_stride: u64,
    object_capacity: u64,

    // Materials & textures
    material_bgl: BindGroupLayout,
    linear_sampler: Sampler,
    nearest_sampler: Sampler,
    white: GpuTexture,
    textures: Vec<GpuTexture>,

    lists: Vec<CompiledList>,
    model: Mat4,
    style: ObjectStyle,
    draws: Vec<Draw>,

    // Depth
    depth_view: TextureView,

    // Size cache
    width: u32,
    height: u32,
}

impl GpuState {
    /// Create GPU state bound to an Arc<Window>.
    pub async fn new(window: Arc<Window>, backends: wgpu::Backends) -> Result<Self> {
        let PhysicalSize { width, height } = window.inner_size();
        let width = width.max(1);
        let height = height.max(1);

        // Instance & surface
        let instance = Instance::new(InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let surface: Surface<'static> = instance
            .create_surface(window.clone())
            .context("create_surface failed")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("No suitable GPU adapter")?;
        log::info!("Adapter: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("Orrery Device"),
                    required_features: Features::empty(),
                    required_limits: Limits::downlevel_webgl2_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .context("request_device failed")?;

        // Surface format (prefer sRGB)
        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("Surface reports no formats")?;

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: PresentMode::AutoVsync,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let depth_view = create_depth_view(&device, &surface_config);

        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("Model WGSL"),
            source: ShaderSource::Wgsl(include_str!("shaders/model.wgsl").into()),
        });

        // ==== Frame BGL/BG ====
        let frame_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Frame BGL"),
            entries: &[uniform_entry::<FrameUniform>(
                0,
                ShaderStages::VERTEX_FRAGMENT,
                false,
            )],
        });
        let frame_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Frame UBO"),
            contents: bytemuck::bytes_of(&FrameUniform {
                view_proj: Mat4::IDENTITY.to_cols_array_2d(),
                light_pos: [0.0, 0.0, 0.0, 1.0],
            }),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });
        let frame_bg = device.create_bind_group(&BindGroupDescriptor {
            label: Some("Frame BG"),
            layout: &frame_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: frame_buf.as_entire_binding(),
            }],
        });

        // ==== Object BGL/BG ====
        let object_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Object BGL"),
            entries: &[uniform_entry::<ObjectUniform>(
                0,
                ShaderStages::VERTEX_FRAGMENT,
                true,
            )],
        });
        let align = device.limits().min_uniform_buffer_offset_alignment as u64;
        let object_stride = (std::mem::size_of::<ObjectUniform>() as u64).next_multiple_of(align);
        let (object_buf, object_bg) =
            create_object_buffer(&device, &object_bgl, object_stride, INITIAL_OBJECTS);

        // ==== Material BGL ====
        let material_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Material BGL"),
            entries: &[
                uniform_entry::<MaterialUniform>(0, ShaderStages::FRAGMENT, false),
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 2,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let linear_sampler = create_sampler(&device, MinFilter::Linear);
        let nearest_sampler = create_sampler(&device, MinFilter::Nearest);
        let white = create_texture(&device, &queue, &TextureData::solid([255; 4]), MinFilter::Nearest);

        // ==== Pipeline ====
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("Model PipelineLayout"),
            bind_group_layouts: &[&frame_bgl, &object_bgl, &material_bgl],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Model Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[GpuVertex::LAYOUT],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(ColorTargetState {
                    format: surface_format,
                    blend: Some(BlendState::REPLACE),
                    write_mask: ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            // OBJ winding is not reliable and the backdrop is seen from inside.
            primitive: wgpu::PrimitiveState {
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Ok(Self {
            surface,
            surface_config,
            device,
            queue,
            pipeline,
            frame_buf,
            frame_bg,
            light_pos: Vec3::ZERO,
            object_bgl,
            object_buf,
            object_bg,
            object_stride,
            object_capacity: INITIAL_OBJECTS,
            material_bgl,
            linear_sampler,
            nearest_sampler,
            white,
            textures: Vec::new(),
            lists: Vec::new(),
            model: Mat4::IDENTITY,
            style: ObjectStyle::default(),
            draws: Vec::new(),
            depth_view,
            width,
            height,
        })
    }

    #[inline]
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// World-space point light used by lit batches.
    pub fn set_light_position(&mut self, pos: Vec3) {
        self.light_pos = pos;
    }

    /// Resize: reconfigure surface & recreate depth view.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.surface_config.width = self.width;
        self.surface_config.height = self.height;
        self.surface.configure(&self.device, &self.surface_config);
        self.depth_view = create_depth_view(&self.device, &self.surface_config);
    }

    /// Draw everything queued by `call_list` since the last frame. The queue
    /// is emptied even when the surface is unavailable.
    pub fn render(&mut self, view_proj: Mat4) -> Result<(), SurfaceError> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(e) => {
                self.draws.clear();
                return Err(e);
            }
        };
        let view = frame.texture.create_view(&Default::default());

        let frame_uniform = FrameUniform {
            view_proj: view_proj.to_cols_array_2d(),
            light_pos: self.light_pos.extend(1.0).to_array(),
        };
        self.queue
            .write_buffer(&self.frame_buf, 0, bytemuck::bytes_of(&frame_uniform));
        self.write_objects();

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("MainEncoder"),
            });

        {
            let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("MainPass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(wgpu::Color::BLACK),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(Operations {
                        load: LoadOp::Clear(1.0),
                        store: StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            rpass.set_pipeline(&self.pipeline);
            rpass.set_bind_group(0, &self.frame_bg, &[]);

            for (i, draw) in self.draws.iter().enumerate() {
                let Some(list) = self.lists.get(draw.list.0 as usize) else {
                    continue;
                };
                let Some(vertex_buf) = &list.vertex_buf else {
                    continue;
                };
                let offset = (i as u64 * self.object_stride) as u32;
                rpass.set_bind_group(1, &self.object_bg, &[offset]);
                rpass.set_vertex_buffer(0, vertex_buf.slice(..));
                for batch in &list.batches {
                    rpass.set_bind_group(2, &batch.bind_group, &[]);
                    rpass.draw(batch.vertices.clone(), 0..1);
                }
            }
        }

        self.queue.submit(Some(encoder.finish()));
        frame.present();
        self.draws.clear();
        Ok(())
    }

    pub fn is_surface_lost(err: &SurfaceError) -> bool {
        matches!(err, SurfaceError::Lost | SurfaceError::Outdated)
    }

    pub fn recreate_surface(&mut self) {
        self.resize(self.width, self.height);
    }

    /// Upload one model matrix per queued draw, growing the buffer on demand.
    fn write_objects(&mut self) {
        let needed = self.draws.len() as u64;
        if needed > self.object_capacity {
            let capacity = needed.next_power_of_two();
            let (buf, bg) =
                create_object_buffer(&self.device, &self.object_bgl, self.object_stride, capacity);
            self.object_buf = buf;
            self.object_bg = bg;
            self.object_capacity = capacity;
            log::debug!("Object buffer grown to {} slots", capacity);
        }

        for (i, draw) in self.draws.iter().enumerate() {
            let uniform = ObjectUniform::new(&draw.model, &draw.style);
            self.queue.write_buffer(
                &self.object_buf,
                i as u64 * self.object_stride,
                bytemuck::bytes_of(&uniform),
            );
        }
    }

    fn texture_for(&self, handle: Option<TextureHandle>) -> &GpuTexture {
        handle
            .and_then(|h| self.textures.get(h.0.get() as usize - 1))
            .unwrap_or(&self.white)
    }

    fn material_bind_group(&self, state: &RasterState) -> (Buffer, BindGroup) {
        let uniform = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Material UBO"),
                contents: bytemuck::bytes_of(&MaterialUniform::from(state)),
                usage: BufferUsages::UNIFORM,
            });
        let texture = self.texture_for(state.texture);
        let sampler = match texture.min_filter {
            MinFilter::Linear => &self.linear_sampler,
            MinFilter::Nearest => &self.nearest_sampler,
        };
        let bind_group = self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("Material BG"),
            layout: &self.material_bgl,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: uniform.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::TextureView(&texture.view),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: BindingResource::Sampler(sampler),
                },
            ],
        });
        (uniform, bind_group)
    }
}

impl GraphicsContext for GpuState {
    fn upload_texture(
        &mut self,
        image: &TextureData,
        min_filter: MinFilter,
    ) -> Option<TextureHandle> {
        if !image.is_valid() {
            log::warn!("Refusing to upload invalid {}x{} image", image.width, image.height);
            return None;
        }
        let handle = next_texture_handle(self.textures.len())?;
        let texture = create_texture(&self.device, &self.queue, image, min_filter);
        self.textures.push(texture);
        Some(handle)
    }

    fn compile_list(&mut self, list: &DrawList) -> ListHandle {
        let tess = tessellate(list);
        let vertex_buf = (!tess.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Model VB"),
                    contents: bytemuck::cast_slice(&tess.vertices),
                    usage: BufferUsages::VERTEX,
                })
        });
        let batches = tess
            .batches
            .iter()
            .map(|batch| {
                let (uniform, bind_group) = self.material_bind_group(&batch.state);
                GpuBatch {
                    _uniform: uniform,
                    bind_group,
                    vertices: batch.vertices.clone(),
                }
            })
            .collect::<Vec<_>>();
        log::debug!(
            "Compiled list {}: {} triangles in {} batches",
            self.lists.len(),
            tess.vertices.len() / 3,
            batches.len()
        );

        let handle = ListHandle(self.lists.len() as u32);
        self.lists.push(CompiledList {
            vertex_buf,
            batches,
        });
        handle
    }

    fn call_list(&mut self, list: ListHandle) {
        if (list.0 as usize) < self.lists.len() {
            self.draws.push(Draw {
                list,
                model: self.model,
                style: self.style,
            });
        } else {
            log::warn!("call_list on unknown list {:?}", list);
        }
    }

    fn set_model_matrix(&mut self, model: Mat4) {
        self.model = model;
    }

    fn set_object_style(&mut self, style: ObjectStyle) {
        self.style = style;
    }
}

fn uniform_entry<T>(binding: u32, visibility: ShaderStages, dynamic: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: NonZeroU64::new(std::mem::size_of::<T>() as u64),
        },
        count: None,
    }
}

fn create_object_buffer(
    device: &Device,
    layout: &BindGroupLayout,
    stride: u64,
    capacity: u64,
) -> (Buffer, BindGroup) {
    let buf = device.create_buffer(&BufferDescriptor {
        label: Some("Object UBO"),
        size: stride * capacity,
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bg = device.create_bind_group(&BindGroupDescriptor {
        label: Some("Object BG"),
        layout,
        entries: &[BindGroupEntry {
            binding: 0,
            resource: BindingResource::Buffer(BufferBinding {
                buffer: &buf,
                offset: 0,
                size: NonZeroU64::new(std::mem::size_of::<ObjectUniform>() as u64),
            }),
        }],
    });
    (buf, bg)
}

fn create_sampler(device: &Device, min_filter: MinFilter) -> Sampler {
    device.create_sampler(&SamplerDescriptor {
        label: Some("Diffuse Sampler"),
        address_mode_u: AddressMode::Repeat,
        address_mode_v: AddressMode::Repeat,
        address_mode_w: AddressMode::Repeat,
        mag_filter: FilterMode::Linear,
        min_filter: match min_filter {
            MinFilter::Linear => FilterMode::Linear,
            MinFilter::Nearest => FilterMode::Nearest,
        },
        ..Default::default()
    })
}

fn create_texture(
    device: &Device,
    queue: &Queue,
    image: &TextureData,
    min_filter: MinFilter,
) -> GpuTexture {
    let size = Extent3d {
        width: image.width,
        height: image.height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&TextureDescriptor {
        label: Some("Diffuse Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: COLOR_FORMAT,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: Origin3d::ZERO,
            aspect: TextureAspect::All,
        },
        &image.data,
        ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(image.width * image.bytes_per_pixel()),
            rows_per_image: Some(image.height),
        },
        size,
    );
    GpuTexture {
        view: texture.create_view(&TextureViewDescriptor::default()),
        min_filter,
    }
}

/// Create a depth texture view matching the surface config.
fn create_depth_view(device: &Device, sc: &SurfaceConfiguration) -> TextureView {
    let tex = device.create_texture(&TextureDescriptor {
        label: Some("DepthTex"),
        size: Extent3d {
            width: sc.width.max(1),
            height: sc.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    tex.create_view(&TextureViewDescriptor::default())
}
