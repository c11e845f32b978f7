// renderer/dof.rs - two-buffer depth-of-field and its composite
use glam::UVec2;

use crate::error::{RenderError, RenderResult};
use crate::renderer::gpu::{
    GpuBackend, PipelineHandle, ProgramSource, TargetDesc, TargetHandle, TextureHandle,
};
use crate::renderer::pipeline::{layer, LayerBinding, PipelineState};
use crate::renderer::program::PRELUDE;
use crate::renderer::uniforms::DrawUniforms;

/// Full-screen pass mixing a blurred and a sharp copy of the colour buffer by
/// the per-pixel focus stored in the depth-pass alpha (1 = in focus).
const COMPOSITE_SHADER: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> Varyings {
    var out: Varyings;
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    out.clip = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn fs_main(v: Varyings) -> @location(0) vec4<f32> {
    let sharp = textureSampleLevel(layer0, layer_sampler, v.uv, 0.0);
    let focus = textureSampleLevel(layer1, layer_sampler, v.uv, 0.0).a;
    let spread = u.composite.yz * u.composite.x;
    var blurred = vec4<f32>(0.0);
    for (var y = -1; y <= 1; y++) {
        for (var x = -1; x <= 1; x++) {
            let offset = vec2<f32>(f32(x), f32(y)) * spread;
            blurred += textureSampleLevel(layer0, layer_sampler, v.uv + offset, 0.0);
        }
    }
    blurred = blurred / 9.0;
    return mix(blurred, sharp, focus);
}
"#;

/// Offscreen buffers sized to the camera viewport.
///
/// The depth pass fills `depth_pass` with the blur factor in alpha; the colour
/// passes fill `color_pass`. [`DepthOfField::composite_layers`] binds both for
/// the final draw.
#[derive(Debug)]
pub struct DepthOfField {
    depth_pass: TargetHandle,
    color_pass: TargetHandle,
    size: UVec2,
    composite: PipelineHandle,
}

impl DepthOfField {
    pub fn new<B: GpuBackend + ?Sized>(backend: &mut B, size: UVec2) -> RenderResult<Self> {
        let size = size.max(UVec2::ONE);
        let depth_pass = backend.create_target(&TargetDesc {
            label: "DofDepthPass".to_string(),
            width: size.x,
            height: size.y,
        })?;
        let color_pass = backend.create_target(&TargetDesc {
            label: "DofColorPass".to_string(),
            width: size.x,
            height: size.y,
        })?;

        let program = backend.compile_program(&ProgramSource {
            label: "dof-composite".to_string(),
            wgsl: format!("{PRELUDE}{COMPOSITE_SHADER}"),
        })?;
        let composite =
            backend.create_pipeline("dof-composite", &PipelineState::FULLSCREEN, program)?;

        Ok(Self {
            depth_pass,
            color_pass,
            size,
            composite,
        })
    }

    /// Matches the buffers to the viewport; no-op when already that size.
    pub fn ensure_size<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        size: UVec2,
    ) -> RenderResult<()> {
        let size = size.max(UVec2::ONE);
        if size == self.size {
            return Ok(());
        }
        backend.resize_target(self.depth_pass, size.x, size.y)?;
        backend.resize_target(self.color_pass, size.x, size.y)?;
        log::debug!("Resized depth-of-field buffers to {}x{}", size.x, size.y);
        self.size = size;
        Ok(())
    }

    pub fn depth_pass(&self) -> TargetHandle {
        self.depth_pass
    }

    pub fn color_pass(&self) -> TargetHandle {
        self.color_pass
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn composite_pipeline(&self) -> PipelineHandle {
        self.composite
    }

    pub fn composite_layers<B: GpuBackend + ?Sized>(
        &self,
        backend: &B,
    ) -> RenderResult<[LayerBinding; 2]> {
        let color = target_color(backend, self.color_pass)?;
        let focus = target_color(backend, self.depth_pass)?;
        Ok([
            LayerBinding {
                index: layer::SHAPE_MASK,
                texture: color,
            },
            LayerBinding {
                index: layer::COLOR,
                texture: focus,
            },
        ])
    }

    pub fn composite_uniforms(&self, blur_radius: f32) -> DrawUniforms {
        let mut uniforms = DrawUniforms::new();
        uniforms.set_composite(blur_radius, self.size.x, self.size.y);
        uniforms
    }
}

fn target_color<B: GpuBackend + ?Sized>(
    backend: &B,
    target: TargetHandle,
) -> RenderResult<TextureHandle> {
    backend
        .target_color(target)
        .ok_or_else(|| RenderError::unknown("target", target.index()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording::RecordingBackend;

    #[test]
    fn buffers_follow_viewport_size() {
        let mut gpu = RecordingBackend::new();
        let mut dof = DepthOfField::new(&mut gpu, UVec2::new(64, 32)).unwrap();

        dof.ensure_size(&mut gpu, UVec2::new(64, 32)).unwrap();
        assert_eq!(gpu.target_size(dof.color_pass()), Some(UVec2::new(64, 32)));

        dof.ensure_size(&mut gpu, UVec2::new(128, 0)).unwrap();
        assert_eq!(dof.size(), UVec2::new(128, 1));
        assert_eq!(gpu.target_size(dof.depth_pass()), Some(UVec2::new(128, 1)));
    }

    #[test]
    fn composite_samples_colour_and_focus_buffers() {
        let mut gpu = RecordingBackend::new();
        let dof = DepthOfField::new(&mut gpu, UVec2::new(8, 8)).unwrap();
        let layers = dof.composite_layers(&gpu).unwrap();

        assert_eq!(Some(layers[0].texture), gpu.target_color(dof.color_pass()));
        assert_eq!(Some(layers[1].texture), gpu.target_color(dof.depth_pass()));

        let uniforms = dof.composite_uniforms(2.0);
        assert_eq!(uniforms.composite, [2.0, 0.125, 0.125, 0.0]);
    }
}
