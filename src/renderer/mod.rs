pub mod dof;
pub mod gpu;
pub mod journal;
pub mod pass;
pub mod pass_params;
pub mod pipeline;
pub mod pipeline_builder;
pub mod program;
pub mod recording;
#[allow(clippy::module_inception)]
pub mod renderer;
pub mod shadows;
pub mod snippets;
pub mod uniforms;
pub mod vertex;
pub mod wgpu_backend;

pub use dof::DepthOfField;
pub use gpu::{
    CameraPass, ClearValues, DrawCall, GpuBackend, PipelineHandle, PrimitiveHandle, ProgramHandle,
    ProgramSource, TargetDesc, TargetHandle, TextureDesc, TextureHandle,
};
pub use journal::{Journal, JournalEntry};
pub use pass::{CacheSlot, RenderPass};
pub use pass_params::{CacheOutcome, FrameContext, PassParameters};
pub use pipeline::{
    layer, LayerBinding, Pipeline, PipelineCache, PipelineFeatures, PipelineState,
    PipelineTemplate, RenderCache, SharedPipeline,
};
pub use recording::{GpuCommand, RecordingBackend};
pub use renderer::{CameraScope, Renderer, RendererStats};
pub use shadows::ShadowMap;
pub use snippets::{SharedSnippet, Snippet, SnippetLibrary, OPAQUE_THRESHOLD};
pub use uniforms::DrawUniforms;
pub use vertex::Vertex;
pub use wgpu_backend::WgpuBackend;
