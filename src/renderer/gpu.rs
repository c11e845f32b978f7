// renderer/gpu.rs - boundary between pass scheduling and the graphics API
use glam::{Mat4, UVec2};

use crate::asset::Mesh;
use crate::error::RenderResult;
use crate::renderer::pipeline::{LayerBinding, PipelineState};
use crate::renderer::uniforms::DrawUniforms;

macro_rules! gpu_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);

            impl $name {
                pub fn index(self) -> u32 {
                    self.0
                }
            }
        )*
    };
}

gpu_handle!(
    /// A compiled shader program.
    ProgramHandle,
    /// Fixed-function state bound to a program.
    PipelineHandle,
    /// Sampled texture, either uploaded or owned by a target.
    TextureHandle,
    /// Offscreen colour + depth attachment pair.
    TargetHandle,
    /// Uploaded vertex/index data.
    PrimitiveHandle,
);

/// Shader source assembled from snippets, ready for the backend.
#[derive(Debug, Clone)]
pub struct ProgramSource {
    pub label: String,
    pub wgsl: String,
}

#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct TargetDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
}

/// Everything a backend needs to start drawing for one camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraPass {
    pub label: &'static str,
    /// `None` draws into the backend's frame.
    pub target: Option<TargetHandle>,
    pub view: Mat4,
    pub projection: Mat4,
    /// x, y, width, height in pixels
    pub viewport: [f32; 4],
    pub clear: Option<ClearValues>,
}

#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub pipeline: PipelineHandle,
    pub primitive: PrimitiveHandle,
    pub uniforms: &'a DrawUniforms,
    pub layers: &'a [LayerBinding],
}

/// The graphics API as seen by the renderer.
///
/// Cameras nest: `begin_camera` while another camera is active suspends it
/// until the matching `end_camera`. Draws always go to the innermost camera.
pub trait GpuBackend {
    fn compile_program(&mut self, source: &ProgramSource) -> RenderResult<ProgramHandle>;

    fn create_pipeline(
        &mut self,
        label: &str,
        state: &PipelineState,
        program: ProgramHandle,
    ) -> RenderResult<PipelineHandle>;

    fn release_pipeline(&mut self, pipeline: PipelineHandle);

    fn create_primitive(&mut self, mesh: &Mesh) -> RenderResult<PrimitiveHandle>;

    /// Buffers may stay alive until recorded draws that use them are submitted.
    fn release_primitive(&mut self, primitive: PrimitiveHandle);

    /// `pixels` is tightly packed RGBA8.
    fn create_texture(&mut self, desc: &TextureDesc, pixels: &[u8]) -> RenderResult<TextureHandle>;

    fn create_target(&mut self, desc: &TargetDesc) -> RenderResult<TargetHandle>;

    fn resize_target(&mut self, target: TargetHandle, width: u32, height: u32) -> RenderResult<()>;

    fn target_size(&self, target: TargetHandle) -> Option<UVec2>;

    fn target_color(&self, target: TargetHandle) -> Option<TextureHandle>;

    fn target_depth(&self, target: TargetHandle) -> Option<TextureHandle>;

    fn begin_camera(&mut self, camera: &CameraPass) -> RenderResult<()>;

    fn end_camera(&mut self) -> RenderResult<()>;

    fn draw(&mut self, call: &DrawCall<'_>) -> RenderResult<()>;

    /// One screen-covering triangle; no primitive needed.
    fn draw_fullscreen(
        &mut self,
        pipeline: PipelineHandle,
        uniforms: &DrawUniforms,
        layers: &[LayerBinding],
    ) -> RenderResult<()>;
}
