// renderer/program.rs - snippet assembly and program caching
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::error::RenderResult;
use crate::renderer::gpu::{GpuBackend, ProgramHandle, ProgramSource};
use crate::renderer::pipeline::layer;
use crate::renderer::snippets::{SharedSnippet, SnippetHook, OPAQUE_THRESHOLD};

/// Declarations shared by every generated program. Bind group 1 always has
/// the full set of layer textures so one pipeline layout serves all programs.
pub(crate) const PRELUDE: &str = r#"
struct DrawUniforms {
    modelview: mat4x4<f32>,
    projection: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    light_shadow_matrix: mat4x4<f32>,
    light_direction: vec4<f32>,
    light_ambient: vec4<f32>,
    light_diffuse: vec4<f32>,
    light_specular: vec4<f32>,
    material_ambient: vec4<f32>,
    material_diffuse: vec4<f32>,
    material_specular: vec4<f32>,
    base_color: vec4<f32>,
    params: vec4<f32>,
    pointalism: vec4<f32>,
    composite: vec4<f32>,
};

@group(0) @binding(0) var<uniform> u: DrawUniforms;

@group(1) @binding(0) var layer0: texture_2d<f32>;
@group(1) @binding(1) var layer1: texture_2d<f32>;
@group(1) @binding(2) var layer4: texture_2d<f32>;
@group(1) @binding(3) var layer7: texture_2d<f32>;
@group(1) @binding(4) var layer_sampler: sampler;
@group(1) @binding(5) var layer10: texture_depth_2d;
@group(1) @binding(6) var shadow_sampler: sampler;

struct VertexIn {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) tangent: vec4<f32>,
};

struct Varyings {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) eye_direction: vec3<f32>,
    @location(3) light_direction: vec3<f32>,
    @location(4) shadow_coords: vec4<f32>,
    @location(5) dof_blur: f32,
};
"#;

/// Builds the WGSL module for a snippet list and a set of bound layers.
///
/// Only the shape mask and colour layers take part in the base colour; the
/// other layers are read by snippets.
pub fn compose(snippets: &[SharedSnippet], layers: &[u32]) -> String {
    let mut wgsl = String::with_capacity(4096);
    wgsl.push_str(PRELUDE);
    let _ = writeln!(wgsl, "const OPAQUE_THRESHOLD: f32 = {:?};", OPAQUE_THRESHOLD);

    for s in snippets.iter().filter(|s| !s.declarations.is_empty()) {
        let _ = writeln!(wgsl, "// {}{}", s.name, s.declarations);
    }

    wgsl.push_str(
        "\n@vertex\nfn vs_main(vin: VertexIn) -> Varyings {\n    var out: Varyings;\n    var pos = vec4<f32>(vin.position, 1.0);\n    var object_pos = pos;\n    out.uv = vin.uv;\n",
    );
    push_hook(&mut wgsl, snippets, SnippetHook::VertexTransform);
    wgsl.push_str("    out.clip = u.projection * (u.modelview * pos);\n");
    push_hook(&mut wgsl, snippets, SnippetHook::Vertex);
    wgsl.push_str("    return out;\n}\n");

    wgsl.push_str(
        "\n@fragment\nfn fs_main(v: Varyings) -> @location(0) vec4<f32> {\n    var color = u.base_color;\n",
    );
    if layers.contains(&layer::SHAPE_MASK) {
        wgsl.push_str(
            "    color = vec4<f32>(color.rgb, color.a * textureSampleLevel(layer0, layer_sampler, v.uv, 0.0).a);\n",
        );
    }
    if layers.contains(&layer::COLOR) {
        wgsl.push_str("    color = color * textureSampleLevel(layer1, layer_sampler, v.uv, 0.0);\n");
    }
    push_hook(&mut wgsl, snippets, SnippetHook::Fragment);
    wgsl.push_str("    return color;\n}\n");

    wgsl
}

fn push_hook(wgsl: &mut String, snippets: &[SharedSnippet], hook: SnippetHook) {
    for s in snippets.iter().filter(|s| s.hook == hook) {
        let _ = writeln!(wgsl, "    // {}\n    {{\n    {}\n    }}", s.name, s.body.trim_start());
    }
}

/// Snippet addresses in order plus sorted layer indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProgramKey {
    snippets: Vec<usize>,
    layers: Vec<u32>,
}

impl ProgramKey {
    fn new(snippets: &[SharedSnippet], layers: &[u32]) -> Self {
        let mut layers = layers.to_vec();
        layers.sort_unstable();
        layers.dedup();
        Self {
            snippets: snippets
                .iter()
                .map(|s| Arc::as_ptr(s) as *const () as usize)
                .collect(),
            layers,
        }
    }
}

/// Compiled programs keyed by snippet identity.
///
/// Two snippets with identical text but different instances produce two
/// programs.
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: HashMap<ProgramKey, ProgramHandle>,
    compiled: usize,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        label: &str,
        snippets: &[SharedSnippet],
        layers: &[u32],
    ) -> RenderResult<ProgramHandle> {
        let key = ProgramKey::new(snippets, layers);
        if let Some(&program) = self.programs.get(&key) {
            return Ok(program);
        }

        let source = ProgramSource {
            label: label.to_string(),
            wgsl: compose(snippets, &key.layers),
        };
        let program = backend.compile_program(&source)?;
        log::debug!(
            "Compiled program {:?} for {} ({} snippets, layers {:?})",
            program,
            label,
            snippets.len(),
            key.layers
        );

        self.compiled += 1;
        self.programs.insert(key, program);
        Ok(program)
    }

    /// Number of distinct programs compiled so far.
    pub fn compiled(&self) -> usize {
        self.compiled
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}
