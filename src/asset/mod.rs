pub mod cache;
pub mod handle;
pub mod image;
pub mod mesh;

pub use cache::AssetCache;
pub use handle::Handle;
pub use image::ImageSource;
pub use mesh::Mesh;

pub struct Assets {
    pub meshes: AssetCache<Mesh>,
    pub images: AssetCache<ImageSource>,
}

impl Assets {
    pub fn new() -> Self {
        Self {
            meshes: AssetCache::new(),
            images: AssetCache::new(),
        }
    }
}

impl Default for Assets {
    fn default() -> Self {
        Self::new()
    }
}
