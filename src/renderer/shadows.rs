// renderer/shadows.rs - shadow map target and light-space matrices
use glam::Mat4;

use crate::error::RenderResult;
use crate::renderer::gpu::{GpuBackend, TargetDesc, TargetHandle, TextureHandle};

/// Maps clip space to shadow-map texture space: x and y from [-1, 1] to
/// [0, 1] with y flipped so (0, 0) is the top-left texel. Depth is already in
/// [0, 1] for the left-handed projections used here and passes through.
pub const SHADOW_BIAS: Mat4 = Mat4::from_cols_array(&[
    0.5, 0.0, 0.0, 0.0, //
    0.0, -0.5, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.5, 0.5, 0.0, 1.0,
]);

/// Inverse of `m`, or `None` when it is singular.
///
/// The determinant scales with the cube of a uniform scale, so small but
/// valid transforms are only rejected when the inverse is not finite.
pub fn try_inverse(m: Mat4) -> Option<Mat4> {
    let det = m.determinant();
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let inverse = m.inverse();
    inverse.is_finite().then_some(inverse)
}

/// `bias * projection * inverse(light_world)`, or `None` when the light
/// transform cannot be inverted.
pub fn light_view_projection(light_world: Mat4, light_projection: Mat4) -> Option<Mat4> {
    try_inverse(light_world).map(|view| SHADOW_BIAS * light_projection * view)
}

/// Light-space matrix for one entity. Recomputed for every colour draw since
/// the light or the entity may have moved.
pub fn light_shadow_matrix(
    light_world: Mat4,
    light_projection: Mat4,
    entity_world: Mat4,
) -> Option<Mat4> {
    light_view_projection(light_world, light_projection).map(|m| m * entity_world)
}

/// Square offscreen target the shadow pass draws into. Its depth texture is
/// bound at the shadow-map layer of receiving pipelines.
#[derive(Debug)]
pub struct ShadowMap {
    target: TargetHandle,
    depth: TextureHandle,
    size: u32,
}

impl ShadowMap {
    pub fn new<B: GpuBackend + ?Sized>(backend: &mut B, size: u32) -> RenderResult<Self> {
        let target = backend.create_target(&TargetDesc {
            label: "ShadowMap".to_string(),
            width: size,
            height: size,
        })?;
        let depth = backend.target_depth(target).ok_or_else(|| {
            crate::error::RenderError::TargetCreation {
                label: "ShadowMap".to_string(),
                message: "target has no depth texture".to_string(),
            }
        })?;
        log::info!("Created {}x{} shadow map", size, size);

        Ok(Self {
            target,
            depth,
            size,
        })
    }

    pub fn target(&self) -> TargetHandle {
        self.target
    }

    pub fn depth_texture(&self) -> TextureHandle {
        self.depth
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn viewport(&self) -> [f32; 4] {
        [0.0, 0.0, self.size as f32, self.size as f32]
    }
}
