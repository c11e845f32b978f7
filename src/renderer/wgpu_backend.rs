// renderer/wgpu_backend.rs - GpuBackend over a headless wgpu device
use std::collections::HashMap;
use std::mem;

use glam::UVec2;
use wgpu::util::DeviceExt;

use crate::asset::Mesh;
use crate::error::{RenderError, RenderResult};
use crate::renderer::gpu::{
    CameraPass, DrawCall, GpuBackend, PipelineHandle, PrimitiveHandle, ProgramHandle,
    ProgramSource, TargetDesc, TargetHandle, TextureDesc, TextureHandle,
};
use crate::renderer::pipeline::{layer, LayerBinding, PipelineState};
use crate::renderer::pipeline_builder::PipelineBuilder;
use crate::renderer::uniforms::DrawUniforms;
use crate::renderer::vertex::Vertex;

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const INITIAL_UNIFORM_CAPACITY: u32 = 256;

/// Bind group 1 binding for each layer texture, in [`layer::ALL`] order.
const LAYER_BINDINGS: [u32; 5] = [0, 1, 2, 3, 5];

struct GpuPrimitive {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

struct GpuTarget {
    label: String,
    size: UVec2,
    color: TextureHandle,
    depth: TextureHandle,
}

struct RecordedDraw {
    pipeline: PipelineHandle,
    /// `None` draws the full-screen triangle.
    primitive: Option<PrimitiveHandle>,
    uniforms: DrawUniforms,
    layers: [Option<TextureHandle>; 5],
}

struct RecordedCamera {
    pass: CameraPass,
    draws: Vec<RecordedDraw>,
}

/// Dynamic-offset uniform buffer holding one [`DrawUniforms`] per draw of
/// the camera being encoded.
struct UniformRing {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    stride: u32,
    capacity: u32,
    scratch: Vec<u8>,
}

impl UniformRing {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, capacity: u32) -> Self {
        let alignment = device.limits().min_uniform_buffer_offset_alignment.max(1);
        let stride = align_to(mem::size_of::<DrawUniforms>() as u32, alignment);
        let (buffer, bind_group) = Self::allocate(device, layout, stride, capacity);
        Self {
            buffer,
            bind_group,
            stride,
            capacity,
            scratch: Vec::new(),
        }
    }

    fn allocate(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        stride: u32,
        capacity: u32,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("DrawUniforms"),
            size: u64::from(stride) * u64::from(capacity),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("DrawUniformsBindGroup"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(mem::size_of::<DrawUniforms>() as u64),
                }),
            }],
        });
        (buffer, bind_group)
    }

    /// Uploads `draws` and returns the dynamic offset of each.
    fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        draws: &[RecordedDraw],
    ) -> Vec<u32> {
        let required = draws.len() as u32;
        if required > self.capacity {
            let capacity = required.max(self.capacity * 2);
            log::info!("Growing uniform ring: {} -> {}", self.capacity, capacity);
            let (buffer, bind_group) = Self::allocate(device, layout, self.stride, capacity);
            self.buffer = buffer;
            self.bind_group = bind_group;
            self.capacity = capacity;
        }

        self.scratch.clear();
        self.scratch
            .resize(self.stride as usize * draws.len(), 0);
        let mut offsets = Vec::with_capacity(draws.len());
        for (i, draw) in draws.iter().enumerate() {
            let start = i * self.stride as usize;
            let bytes = bytemuck::bytes_of(&draw.uniforms);
            self.scratch[start..start + bytes.len()].copy_from_slice(bytes);
            offsets.push(start as u32);
        }
        if !self.scratch.is_empty() {
            queue.write_buffer(&self.buffer, 0, &self.scratch);
        }
        offsets
    }
}

/// Renders into offscreen targets on a device without a surface.
///
/// Draws are recorded per camera and encoded into one render pass when the
/// camera ends, so a nested camera's output is ready before the suspended
/// camera's draws reach the GPU.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    uniform_layout: wgpu::BindGroupLayout,
    layer_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    layer_sampler: wgpu::Sampler,
    shadow_sampler: wgpu::Sampler,
    fallback_color: wgpu::TextureView,
    fallback_depth: wgpu::TextureView,
    programs: Vec<wgpu::ShaderModule>,
    pipelines: HashMap<PipelineHandle, wgpu::RenderPipeline>,
    next_pipeline: u32,
    primitives: HashMap<PrimitiveHandle, GpuPrimitive>,
    next_primitive: u32,
    /// Released while a camera still had recorded draws; dropped once the
    /// camera stack is empty.
    retired_primitives: Vec<PrimitiveHandle>,
    textures: Vec<wgpu::TextureView>,
    targets: Vec<GpuTarget>,
    frame: TargetHandle,
    uniforms: UniformRing,
    cameras: Vec<RecordedCamera>,
}

impl WgpuBackend {
    /// Creates a device and a `width` x `height` frame target.
    pub async fn headless(width: u32, height: u32) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| RenderError::NoAdapter(err.to_string()))?;

        log::info!("Using adapter: {:?}", adapter.get_info());
        log::info!("Using backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|err| RenderError::Device(err.to_string()))?;

        Self::from_device(device, queue, width, height)
    }

    /// Blocking variant of [`WgpuBackend::headless`].
    pub fn headless_blocking(width: u32, height: u32) -> RenderResult<Self> {
        pollster::block_on(Self::headless(width, height))
    }

    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("DrawUniformsBindLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(mem::size_of::<DrawUniforms>() as u64),
                },
                count: None,
            }],
        });

        let color_layer = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let layer_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("LayersBindLayout"),
            entries: &[
                color_layer(0),
                color_layer(1),
                color_layer(2),
                color_layer(3),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 6,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("DrawPipelineLayout"),
            bind_group_layouts: &[&uniform_layout, &layer_layout],
            push_constant_ranges: &[],
        });

        let layer_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("LayerSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ShadowSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let white = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("FallbackWhite"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: COLOR_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );
        let fallback_color = white.create_view(&wgpu::TextureViewDescriptor::default());
        let fallback_depth = create_attachment(&device, "FallbackDepth", UVec2::ONE, DEPTH_FORMAT);

        let uniforms = UniformRing::new(&device, &uniform_layout, INITIAL_UNIFORM_CAPACITY);

        let mut backend = Self {
            device,
            queue,
            uniform_layout,
            layer_layout,
            pipeline_layout,
            layer_sampler,
            shadow_sampler,
            fallback_color,
            fallback_depth,
            programs: Vec::new(),
            pipelines: HashMap::new(),
            next_pipeline: 0,
            primitives: HashMap::new(),
            next_primitive: 0,
            retired_primitives: Vec::new(),
            textures: Vec::new(),
            targets: Vec::new(),
            frame: TargetHandle(0),
            uniforms,
            cameras: Vec::new(),
        };
        backend.frame = backend.create_target(&TargetDesc {
            label: "Frame".to_string(),
            width,
            height,
        })?;
        log::info!("Headless frame target {}x{}", width, height);
        Ok(backend)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Where cameras without a target draw.
    pub fn frame(&self) -> TargetHandle {
        self.frame
    }

    pub fn texture_view(&self, texture: TextureHandle) -> Option<&wgpu::TextureView> {
        self.textures.get(texture.index() as usize)
    }

    fn target(&self, target: TargetHandle) -> RenderResult<&GpuTarget> {
        self.targets
            .get(target.index() as usize)
            .ok_or_else(|| RenderError::unknown("target", target.index()))
    }

    fn push_texture(&mut self, view: wgpu::TextureView) -> TextureHandle {
        self.textures.push(view);
        TextureHandle(self.textures.len() as u32 - 1)
    }

    fn current_camera(&mut self, operation: &'static str) -> RenderResult<&mut RecordedCamera> {
        self.cameras
            .last_mut()
            .ok_or(RenderError::NoActiveCamera(operation))
    }

    fn layer_slots(&self, layers: &[LayerBinding]) -> RenderResult<[Option<TextureHandle>; 5]> {
        let mut slots = [None; 5];
        for binding in layers {
            let slot = layer::ALL
                .iter()
                .position(|&index| index == binding.index)
                .ok_or_else(|| RenderError::unknown("layer", binding.index))?;
            if binding.texture.index() as usize >= self.textures.len() {
                return Err(RenderError::unknown("texture", binding.texture.index()));
            }
            slots[slot] = Some(binding.texture);
        }
        Ok(slots)
    }

    fn layer_view<'s>(
        &'s self,
        texture: Option<TextureHandle>,
        fallback: &'s wgpu::TextureView,
    ) -> &'s wgpu::TextureView {
        texture
            .and_then(|t| self.textures.get(t.index() as usize))
            .unwrap_or(fallback)
    }

    fn layer_bind_group(&self,layers: &[Option<TextureHandle>; 5]) -> wgpu::BindGroup {
        let shadow_slot = layer::ALL.len() - 1;
        let mut entries: Vec<wgpu::BindGroupEntry> = LAYER_BINDINGS[..shadow_slot]
            .iter()
            .enumerate()
            .map(|(slot, &binding)| wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(
                    self.layer_view(layers[slot], &self.fallback_color),
                ),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: 4,
            resource: wgpu::BindingResource::Sampler(&self.layer_sampler),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: LAYER_BINDINGS[shadow_slot],
            resource: wgpu::BindingResource::TextureView(
                self.layer_view(layers[shadow_slot], &self.fallback_depth),
            ),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: 6,
            resource: wgpu::BindingResource::Sampler(&self.shadow_sampler),
        });

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("LayersBindGroup"),
            layout: &self.layer_layout,
            entries: &entries,
        })
    }

    fn encode(&mut self, camera: RecordedCamera) -> RenderResult<()> {
        let target_handle = camera.pass.target.unwrap_or(self.frame);
        let target = self.target(target_handle)?;
        let size = target.size;
        let (color, depth) = (target.color, target.depth);

        let offsets = self.uniforms.upload(
            &self.device,
            &self.queue,
            &self.uniform_layout,
            &camera.draws,
        );
        let layer_groups: Vec<wgpu::BindGroup> = camera
            .draws
            .iter()
            .map(|draw| self.layer_bind_group(&draw.layers))
            .collect();

        let color_view = &self.textures[color.index() as usize];
        let depth_view = &self.textures[depth.index() as usize];
        let (color_load, depth_load) = match camera.pass.clear {
            Some(clear) => (
                wgpu::LoadOp::Clear(wgpu::Color {
                    r: f64::from(clear.color[0]),
                    g: f64::from(clear.color[1]),
                    b: f64::from(clear.color[2]),
                    a: f64::from(clear.color[3]),
                }),
                wgpu::LoadOp::Clear(clear.depth),
            ),
            None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(camera.pass.label),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(camera.pass.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let [x, y, w, h] = camera.pass.viewport;
            let x = x.clamp(0.0, size.x as f32);
            let y = y.clamp(0.0, size.y as f32);
            let w = w.clamp(1.0, (size.x as f32 - x).max(1.0));
            let h = h.clamp(1.0, (size.y as f32 - y).max(1.0));
            pass.set_viewport(x, y, w, h, 0.0, 1.0);

            for ((draw, offset), layers) in camera.draws.iter().zip(&offsets).zip(&layer_groups) {
                let Some(pipeline) = self.pipelines.get(&draw.pipeline) else {
                    log::warn!("Skipping draw with released pipeline {:?}", draw.pipeline);
                    continue;
                };
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &self.uniforms.bind_group, &[*offset]);
                pass.set_bind_group(1, layers, &[]);

                match draw.primitive {
                    Some(handle) => {
                        let Some(primitive) = self.primitives.get(&handle) else {
                            continue;
                        };
                        pass.set_vertex_buffer(0, primitive.vertex_buffer.slice(..));
                        pass.set_index_buffer(
                            primitive.index_buffer.slice(..),
                            wgpu::IndexFormat::Uint32,
                        );
                        pass.draw_indexed(0..primitive.index_count, 0, 0..1);
                    }
                    None => pass.draw(0..3, 0..1),
                }
            }
        }

        self.queue.submit(Some(encoder.finish()));
        log::trace!(
            "Encoded camera '{}' with {} draws",
            camera.pass.label,
            camera.draws.len()
        );
        Ok(())
    }
}

impl GpuBackend for WgpuBackend {
    fn compile_program(&mut self, source: &ProgramSource) -> RenderResult<ProgramHandle> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&source.label),
                source: wgpu::ShaderSource::Wgsl(source.wgsl.as_str().into()),
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::ProgramCompilation {
                label: source.label.clone(),
                message: err.to_string(),
            });
        }
        self.programs.push(module);
        Ok(ProgramHandle(self.programs.len() as u32 - 1))
    }

    fn create_pipeline(
        &mut self,
        label: &str,
        state: &PipelineState,
        program: ProgramHandle,
    ) -> RenderResult<PipelineHandle> {
        let shader = self
            .programs
            .get(program.index() as usize)
            .ok_or_else(|| RenderError::unknown("program", program.index()))?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut builder =
            PipelineBuilder::new(&self.device, &self.pipeline_layout, shader, state)
                .with_label(label);
        if !state.fullscreen {
            builder = builder.with_vertex_buffer(Vertex::layout());
        }
        let pipeline = builder.build(COLOR_FORMAT, DEPTH_FORMAT);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::PipelineCreation {
                label: label.to_string(),
                message: err.to_string(),
            });
        }

        let handle = PipelineHandle(self.next_pipeline);
        self.next_pipeline += 1;
        self.pipelines.insert(handle, pipeline);
        Ok(handle)
    }

    fn release_pipeline(&mut self, pipeline: PipelineHandle) {
        if self.pipelines.remove(&pipeline).is_none() {
            log::warn!("Released unknown pipeline {:?}", pipeline);
        }
    }

    fn create_primitive(&mut self, mesh: &Mesh) -> RenderResult<PrimitiveHandle> {
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&mesh.label),
                contents: bytemuck::cast_slice(&mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&mesh.label),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let handle = PrimitiveHandle(self.next_primitive);
        self.next_primitive += 1;
        self.primitives.insert(
            handle,
            GpuPrimitive {
                vertex_buffer,
                index_buffer,
                index_count: mesh.index_count(),
            },
        );
        Ok(handle)
    }

    fn release_primitive(&mut self, primitive: PrimitiveHandle) {
        if !self.primitives.contains_key(&primitive) {
            log::warn!("Released unknown primitive {:?}", primitive);
        } else if self.cameras.is_empty() {
            self.primitives.remove(&primitive);
        } else {
            self.retired_primitives.push(primitive);
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc, pixels: &[u8]) -> RenderResult<TextureHandle> {
        let expected = desc.width as usize * desc.height as usize * 4;
        if pixels.len() != expected || expected == 0 {
            return Err(RenderError::TargetCreation {
                label: desc.label.clone(),
                message: format!("expected {} bytes of RGBA8, got {}", expected, pixels.len()),
            });
        }

        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * desc.width),
                rows_per_image: Some(desc.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(self.push_texture(view))
    }

    fn create_target(&mut self, desc: &TargetDesc) -> RenderResult<TargetHandle> {
        let size = UVec2::new(desc.width, desc.height).max(UVec2::ONE);
        let color = create_attachment(&self.device, &desc.label, size, COLOR_FORMAT);
        let depth = create_attachment(&self.device, &desc.label, size, DEPTH_FORMAT);
        let color = self.push_texture(color);
        let depth = self.push_texture(depth);

        self.targets.push(GpuTarget {
            label: desc.label.clone(),
            size,
            color,
            depth,
        });
        log::debug!("Created target '{}' {}x{}", desc.label, size.x, size.y);
        Ok(TargetHandle(self.targets.len() as u32 - 1))
    }

    fn resize_target(&mut self, target: TargetHandle, width: u32, height: u32) -> RenderResult<()> {
        let size = UVec2::new(width, height).max(UVec2::ONE);
        let (label, color, depth) = {
            let t = self.target(target)?;
            if t.size == size {
                return Ok(());
            }
            (t.label.clone(), t.color, t.depth)
        };
        // Texture handles stay the same so bound layers keep pointing at
        // the target.
        self.textures[color.index() as usize] =
            create_attachment(&self.device, &label, size, COLOR_FORMAT);
        self.textures[depth.index() as usize] =
            create_attachment(&self.device, &label, size, DEPTH_FORMAT);
        if let Some(t) = self.targets.get_mut(target.index() as usize) {
            t.size = size;
        }
        Ok(())
    }

    fn target_size(&self, target: TargetHandle) -> Option<UVec2> {
        self.targets.get(target.index() as usize).map(|t| t.size)
    }

    fn target_color(&self, target: TargetHandle) -> Option<TextureHandle> {
        self.targets.get(target.index() as usize).map(|t| t.color)
    }

    fn target_depth(&self, target: TargetHandle) -> Option<TextureHandle> {
        self.targets.get(target.index() as usize).map(|t| t.depth)
    }

    fn begin_camera(&mut self, camera: &CameraPass) -> RenderResult<()> {
        if let Some(target) = camera.target {
            self.target(target)?;
        }
        if let Some(outer) = self.cameras.last() {
            log::trace!("Suspending camera '{}' for '{}'", outer.pass.label, camera.label);
        }
        self.cameras.push(RecordedCamera {
            pass: camera.clone(),
            draws: Vec::new(),
        });
        Ok(())
    }

    fn end_camera(&mut self) -> RenderResult<()> {
        let camera = self
            .cameras
            .pop()
            .ok_or(RenderError::NoActiveCamera("end_camera"))?;
        let encoded = self.encode(camera);
        if self.cameras.is_empty() {
            for primitive in self.retired_primitives.drain(..) {
                self.primitives.remove(&primitive);
            }
        }
        encoded
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> RenderResult<()> {
        if !self.primitives.contains_key(&call.primitive)
            || self.retired_primitives.contains(&call.primitive)
        {
            return Err(RenderError::unknown("primitive", call.primitive.index()));
        }
        let layers = self.layer_slots(call.layers)?;
        let camera = self.current_camera("draw")?;
        camera.draws.push(RecordedDraw {
            pipeline: call.pipeline,
            primitive: Some(call.primitive),
            uniforms: *call.uniforms,
            layers,
        });
        Ok(())
    }

    fn draw_fullscreen(
        &mut self,
        pipeline: PipelineHandle,
        uniforms: &DrawUniforms,
        layers: &[LayerBinding],
    ) -> RenderResult<()> {
        let layers = self.layer_slots(layers)?;
        let camera = self.current_camera("draw_fullscreen")?;
        camera.draws.push(RecordedDraw {
            pipeline,
            primitive: None,
            uniforms: *uniforms,
            layers,
        });
        Ok(())
    }
}

fn create_attachment(
    device: &wgpu::Device,
    label: &str,
    size: UVec2,
    format: wgpu::TextureFormat,
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: size.x.max(1),
            height: size.y.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_stride_is_aligned() {
        assert_eq!(align_to(mem::size_of::<DrawUniforms>() as u32, 256), 512);
        assert_eq!(align_to(256, 256), 256);
    }

    #[test]
    fn layer_bindings_follow_layer_order() {
        assert_eq!(LAYER_BINDINGS.len(), layer::ALL.len());
        assert_eq!(layer::ALL[4], layer::SHADOW_MAP);
        assert_eq!(LAYER_BINDINGS[4], 5);
    }
}
