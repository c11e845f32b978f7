use glam::UVec2;

use crate::renderer::gpu::TextureHandle;

/// A texture-like input that may still be loading.
///
/// Sources start without a texture. Whoever finishes the load calls
/// [`Scene::mark_image_ready`](crate::scene::Scene::mark_image_ready) and then
/// notifies the renderer so that dependent pipelines get rebuilt.
#[derive(Debug, Clone)]
pub struct ImageSource {
    pub label: String,
    texture: Option<TextureHandle>,
    natural_size: UVec2,
}

impl ImageSource {
    pub fn loading(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            texture: None,
            natural_size: UVec2::ZERO,
        }
    }

    pub fn ready(label: impl Into<String>, texture: TextureHandle, natural_size: UVec2) -> Self {
        Self {
            label: label.into(),
            texture: Some(texture),
            natural_size,
        }
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    pub fn is_ready(&self) -> bool {
        self.texture.is_some()
    }

    pub fn natural_size(&self) -> UVec2 {
        self.natural_size
    }

    pub(crate) fn set_ready(&mut self, texture: TextureHandle, natural_size: UVec2) {
        self.texture = Some(texture);
        self.natural_size = natural_size;
    }
}
