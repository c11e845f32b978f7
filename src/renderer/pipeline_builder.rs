// src/renderer/pipeline_builder.rs
use crate::renderer::pipeline::{BlendMode, ColorMask, PipelineState};

/// Turns a [`PipelineState`] plus a composed program into a wgpu render
/// pipeline. Programs always provide `vs_main` and `fs_main`.
pub struct PipelineBuilder<'a> {
    device: &'a wgpu::Device,
    layout: &'a wgpu::PipelineLayout,
    shader: &'a wgpu::ShaderModule,
    state: &'a PipelineState,
    label: Option<&'a str>,
    vertex_buffers: Vec<wgpu::VertexBufferLayout<'a>>,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(
        device: &'a wgpu::Device,
        layout: &'a wgpu::PipelineLayout,
        shader: &'a wgpu::ShaderModule,
        state: &'a PipelineState,
    ) -> Self {
        Self {
            device,
            layout,
            shader,
            state,
            label: None,
            vertex_buffers: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    /// Full-screen programs generate their triangle and take no buffers.
    pub fn with_vertex_buffer(mut self, layout: wgpu::VertexBufferLayout<'a>) -> Self {
        self.vertex_buffers.push(layout);
        self
    }

    pub fn build(
        self,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline {
        let targets = [Some(color_target(self.state, color_format))];
        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: self.label,
                layout: Some(self.layout),
                vertex: wgpu::VertexState {
                    module: self.shader,
                    entry_point: Some("vs_main"),
                    buffers: &self.vertex_buffers,
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: self.shader,
                    entry_point: Some("fs_main"),
                    targets: &targets,
                    compilation_options: Default::default(),
                }),
                // Quads are seen from both sides.
                primitive: wgpu::PrimitiveState {
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(depth_state(self.state, depth_format)),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
    }
}

pub fn color_target(state: &PipelineState, format: wgpu::TextureFormat) -> wgpu::ColorTargetState {
    wgpu::ColorTargetState {
        format,
        blend: Some(blend_state(state.blend)),
        write_mask: write_mask(state.color_mask),
    }
}

/// Every target carries a depth attachment, so pipelines without depth
/// testing still declare one and compare with `Always`.
pub fn depth_state(state: &PipelineState, format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
    let depth_compare = if state.depth_test {
        wgpu::CompareFunction::LessEqual
    } else {
        wgpu::CompareFunction::Always
    };
    wgpu::DepthStencilState {
        format,
        depth_write_enabled: state.depth_write,
        depth_compare,
        stencil: Default::default(),
        bias: Default::default(),
    }
}

pub fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    match mode {
        BlendMode::Replace => wgpu::BlendState::REPLACE,
        BlendMode::PremultipliedOver => wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
    }
}

pub fn write_mask(mask: ColorMask) -> wgpu::ColorWrites {
    match mask {
        ColorMask::All => wgpu::ColorWrites::ALL,
        ColorMask::AlphaOnly => wgpu::ColorWrites::ALPHA,
    }
}
