// renderer/pipeline.rs - pipeline objects and the per-entity cache
use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;

use crate::error::RenderResult;
use crate::renderer::gpu::{GpuBackend, PipelineHandle, ProgramHandle, TextureHandle};
use crate::renderer::pass::CacheSlot;
use crate::renderer::program::ProgramCache;
use crate::renderer::snippets::SharedSnippet;
use crate::scene::GeometryKind;

/// Fixed texture layer indices.
pub mod layer {
    pub const SHAPE_MASK: u32 = 0;
    pub const COLOR: u32 = 1;
    pub const ALPHA_MASK: u32 = 4;
    pub const NORMAL_MAP: u32 = 7;
    pub const SHADOW_MAP: u32 = 10;

    pub const ALL: [u32; 5] = [SHAPE_MASK, COLOR, ALPHA_MASK, NORMAL_MAP, SHADOW_MAP];
}

bitflags! {
    /// What went into a pipeline; handy for logging and tests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineFeatures: u32 {
        const MASK            = 1 << 0;
        const BLENDED         = 1 << 1;
        const TEXTURED        = 1 << 2;
        const ALPHA_MASK      = 1 << 3;
        const NORMAL_MAP      = 1 << 4;
        const SHADOW_RECEIVER = 1 << 5;
        const SHAPED          = 1 << 6;
        /// A source was still loading; rebuilt once it is ready.
        const NEUTRAL         = 1 << 7;
        const SHARED          = 1 << 8;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// `RGBA = ADD(SRC_COLOR, 0)`
    Replace,
    /// Premultiplied source over destination.
    PremultipliedOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorMask {
    All,
    AlphaOnly,
}

/// Fixed-function state. Together with the program this identifies the GPU
/// pipeline object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend: BlendMode,
    pub color_mask: ColorMask,
    /// Vertices come from the vertex index instead of a primitive.
    pub fullscreen: bool,
}

impl PipelineState {
    pub const OPAQUE: Self = Self {
        depth_test: true,
        depth_write: true,
        blend: BlendMode::Replace,
        color_mask: ColorMask::All,
        fullscreen: false,
    };

    pub const BLENDED: Self = Self {
        depth_test: true,
        depth_write: false,
        blend: BlendMode::PremultipliedOver,
        color_mask: ColorMask::All,
        fullscreen: false,
    };

    pub const MASK: Self = Self {
        depth_test: true,
        depth_write: true,
        blend: BlendMode::Replace,
        color_mask: ColorMask::AlphaOnly,
        fullscreen: false,
    };

    pub const FULLSCREEN: Self = Self {
        depth_test: false,
        depth_write: false,
        blend: BlendMode::Replace,
        color_mask: ColorMask::All,
        fullscreen: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerBinding {
    pub index: u32,
    pub texture: TextureHandle,
}

/// Editable pipeline description; copied and extended per entity.
#[derive(Debug, Clone)]
pub struct PipelineTemplate {
    pub label: String,
    pub state: PipelineState,
    pub snippets: Vec<SharedSnippet>,
    layers: Vec<LayerBinding>,
    pub features: PipelineFeatures,
}

impl PipelineTemplate {
    pub fn new(label: impl Into<String>, state: PipelineState) -> Self {
        Self {
            label: label.into(),
            state,
            snippets: Vec::new(),
            layers: Vec::new(),
            features: PipelineFeatures::empty(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn add_snippet(&mut self, snippet: &SharedSnippet) {
        self.snippets.push(Arc::clone(snippet));
    }

    pub fn has_snippet(&self, snippet: &SharedSnippet) -> bool {
        self.snippets.iter().any(|s| Arc::ptr_eq(s, snippet))
    }

    /// Binds `texture` at `index`, replacing any previous binding there.
    pub fn set_layer(&mut self, index: u32, texture: TextureHandle) {
        match self.layers.binary_search_by_key(&index, |l| l.index) {
            Ok(pos) => self.layers[pos].texture = texture,
            Err(pos) => self.layers.insert(pos, LayerBinding { index, texture }),
        }
    }

    pub fn layer(&self, index: u32) -> Option<TextureHandle> {
        self.layers
            .iter()
            .find(|l| l.index == index)
            .map(|l| l.texture)
    }

    pub fn layers(&self) -> &[LayerBinding] {
        &self.layers
    }

    pub fn layer_indices(&self) -> Vec<u32> {
        self.layers.iter().map(|l| l.index).collect()
    }
}

/// Backend pipeline object shared by every `Pipeline` with the same state and
/// program.
#[derive(Debug)]
pub struct GpuPipeline {
    pub handle: PipelineHandle,
    pub program: ProgramHandle,
}

/// A built pipeline. Identity (`Arc::ptr_eq`) is what cache hits preserve.
#[derive(Debug)]
pub struct Pipeline {
    gpu: Arc<GpuPipeline>,
    template: PipelineTemplate,
}

pub type SharedPipeline = Arc<Pipeline>;

impl Pipeline {
    pub fn handle(&self) -> PipelineHandle {
        self.gpu.handle
    }

    pub fn program(&self) -> ProgramHandle {
        self.gpu.program
    }

    pub fn label(&self) -> &str {
        &self.template.label
    }

    pub fn state(&self) -> &PipelineState {
        &self.template.state
    }

    pub fn features(&self) -> PipelineFeatures {
        self.template.features
    }

    pub fn layers(&self) -> &[LayerBinding] {
        self.template.layers()
    }

    pub fn has_snippet(&self, snippet: &SharedSnippet) -> bool {
        self.template.has_snippet(snippet)
    }

    pub fn snippet_names(&self) -> Vec<&'static str> {
        self.template.snippets.iter().map(|s| s.name).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GpuKey {
    state: PipelineState,
    program: ProgramHandle,
}

/// Turns templates into pipelines, sharing programs and GPU objects.
///
/// GPU objects stay alive while any `Pipeline` refers to them;
/// [`PipelineCache::collect_garbage`] releases the unreferenced ones.
#[derive(Debug, Default)]
pub struct PipelineCache {
    programs: ProgramCache,
    gpu: HashMap<GpuKey, Arc<GpuPipeline>>,
    created: usize,
    released: usize,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn realize<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        template: PipelineTemplate,
    ) -> RenderResult<SharedPipeline> {
        let program = self.programs.get_or_compile(
            backend,
            &template.label,
            &template.snippets,
            &template.layer_indices(),
        )?;

        let key = GpuKey {
            state: template.state,
            program,
        };
        let gpu = match self.gpu.get(&key) {
            Some(existing) => Arc::clone(existing),
            None => {
                let handle = backend.create_pipeline(&template.label, &template.state, program)?;
                log::debug!("Created pipeline {:?} ({})", handle, template.label);
                self.created += 1;
                let gpu = Arc::new(GpuPipeline { handle, program });
                self.gpu.insert(key, Arc::clone(&gpu));
                gpu
            }
        };

        Ok(Arc::new(Pipeline { gpu, template }))
    }

    /// New pipeline identity over the same GPU object and layers.
    pub fn derive(&self, pipeline: &SharedPipeline) -> SharedPipeline {
        Arc::new(Pipeline {
            gpu: Arc::clone(&pipeline.gpu),
            template: pipeline.template.clone(),
        })
    }

    /// Releases GPU pipelines no `Pipeline` refers to any more.
    pub fn collect_garbage<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> usize {
        let before = self.gpu.len();
        self.gpu.retain(|_, gpu| {
            if Arc::strong_count(gpu) == 1 {
                backend.release_pipeline(gpu.handle);
                false
            } else {
                true
            }
        });
        let released = before - self.gpu.len();
        self.released += released;
        released
    }

    pub fn programs(&self) -> &ProgramCache {
        &self.programs
    }

    pub fn live_gpu_pipelines(&self) -> usize {
        self.gpu.len()
    }

    pub fn gpu_pipelines_created(&self) -> usize {
        self.created
    }

    pub fn gpu_pipelines_released(&self) -> usize {
        self.released
    }
}

/// Texture identities and flags a cached pipeline was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisualInputs {
    pub kind: Option<GeometryKind>,
    pub shaped: bool,
    pub receive_shadow: bool,
    pub shape_mask: Option<TextureHandle>,
    pub color: Option<TextureHandle>,
    pub alpha_mask: Option<TextureHandle>,
    pub normal_map: Option<TextureHandle>,
    /// A referenced image source has no texture yet.
    pub pending: bool,
}

/// Entity-owned pipeline storage, one slot per [`CacheSlot`].
#[derive(Debug, Default)]
pub struct RenderCache {
    slots: [Option<SharedPipeline>; 3],
    inputs: Option<VisualInputs>,
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: CacheSlot) -> Option<&SharedPipeline> {
        self.slots[slot.index()].as_ref()
    }

    /// Stores `pipeline`, dropping the previous occupant first.
    pub fn set(&mut self, slot: CacheSlot, pipeline: SharedPipeline) {
        let entry = &mut self.slots[slot.index()];
        drop(entry.take());
        *entry = Some(pipeline);
    }

    /// Empties every slot. Returns how many pipelines were dropped.
    pub fn invalidate(&mut self) -> usize {
        self.inputs = None;
        self.slots
            .iter_mut()
            .filter_map(Option::take)
            .count()
    }

    /// Makes the cache match `inputs`, invalidating on any difference.
    /// Returns true if the cache was reset.
    pub fn sync_inputs(&mut self, inputs: VisualInputs) -> bool {
        if self.inputs == Some(inputs) {
            return false;
        }
        let stale = self.inputs.is_some() || self.slots.iter().any(Option::is_some);
        self.invalidate();
        self.inputs = Some(inputs);
        stale
    }

    pub fn inputs(&self) -> Option<&VisualInputs> {
        self.inputs.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording::RecordingBackend;
    use crate::renderer::snippets::SnippetLibrary;

    fn template(lib: &SnippetLibrary) -> PipelineTemplate {
        let mut t = PipelineTemplate::new("test", PipelineState::OPAQUE);
        t.add_snippet(&lib.cache_position);
        t.add_snippet(&lib.premultiply);
        t
    }

    #[test]
    fn layers_stay_sorted_and_unique() {
        let mut t = PipelineTemplate::new("layers", PipelineState::OPAQUE);
        t.set_layer(layer::NORMAL_MAP, TextureHandle(3));
        t.set_layer(layer::COLOR, TextureHandle(1));
        t.set_layer(layer::NORMAL_MAP, TextureHandle(4));

        assert_eq!(t.layer_indices(), vec![layer::COLOR, layer::NORMAL_MAP]);
        assert_eq!(t.layer(layer::NORMAL_MAP), Some(TextureHandle(4)));
        assert_eq!(t.layer(layer::SHADOW_MAP), None);
    }

    #[test]
    fn equal_templates_share_gpu_objects_but_not_identity() {
        let lib = SnippetLibrary::new();
        let mut gpu = RecordingBackend::new();
        let mut cache = PipelineCache::new();

        let a = cache.realize(&mut gpu, template(&lib)).unwrap();
        let b = cache.realize(&mut gpu, template(&lib)).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.handle(), b.handle());
        assert_eq!(cache.gpu_pipelines_created(), 1);
        assert_eq!(gpu.pipelines_created(), 1);
    }

    #[test]
    fn state_changes_create_new_gpu_objects() {
        let lib = SnippetLibrary::new();
        let mut gpu = RecordingBackend::new();
        let mut cache = PipelineCache::new();

        let opaque = cache.realize(&mut gpu, template(&lib)).unwrap();
        let mut blended = template(&lib);
        blended.state = PipelineState::BLENDED;
        let blended = cache.realize(&mut gpu, blended).unwrap();

        assert_ne!(opaque.handle(), blended.handle());
        assert_eq!(opaque.program(), blended.program());
        assert_eq!(cache.programs().compiled(), 1);
    }

    #[test]
    fn garbage_collection_releases_unreferenced_pipelines() {
        let lib = SnippetLibrary::new();
        let mut gpu = RecordingBackend::new();
        let mut cache = PipelineCache::new();

        let kept = cache.realize(&mut gpu, template(&lib)).unwrap();
        let mut other = template(&lib);
        other.state = PipelineState::MASK;
        let dropped = cache.realize(&mut gpu, other).unwrap();
        drop(dropped);

        assert_eq!(cache.collect_garbage(&mut gpu), 1);
        assert_eq!(cache.live_gpu_pipelines(), 1);
        assert_eq!(gpu.live_pipelines(), 1);

        drop(kept);
        assert_eq!(cache.collect_garbage(&mut gpu), 1);
        assert_eq!(gpu.live_pipelines(), 0);
    }

    #[test]
    fn derived_pipelines_keep_gpu_object_alive() {
        let lib = SnippetLibrary::new();
        let mut gpu = RecordingBackend::new();
        let mut cache = PipelineCache::new();

        let shared = cache.realize(&mut gpu, template(&lib)).unwrap();
        let copy = cache.derive(&shared);
        drop(shared);

        assert_eq!(cache.collect_garbage(&mut gpu), 0);
        assert_eq!(copy.snippet_names(), vec!["cache-position", "premultiply"]);
    }

    #[test]
    fn render_cache_resets_on_changed_inputs() {
        let lib = SnippetLibrary::new();
        let mut gpu = RecordingBackend::new();
        let mut pipelines = PipelineCache::new();
        let mut cache = RenderCache::new();

        let inputs = VisualInputs {
            kind: Some(GeometryKind::Generic),
            ..VisualInputs::default()
        };
        assert!(!cache.sync_inputs(inputs));
        cache.set(
            CacheSlot::ColorUnblended,
            pipelines.realize(&mut gpu, template(&lib)).unwrap(),
        );

        assert!(!cache.sync_inputs(inputs));
        assert!(cache.get(CacheSlot::ColorUnblended).is_some());

        let textured = VisualInputs {
            color: Some(TextureHandle(9)),
            ..inputs
        };
        assert!(cache.sync_inputs(textured));
        assert!(cache.is_empty());
        assert_eq!(cache.inputs(), Some(&textured));
    }
}
