pub mod asset;
pub mod error;
pub mod renderer;
pub mod scene;
pub mod settings;

pub use error::{RenderError, RenderResult};
pub use renderer::{GpuBackend, RecordingBackend, RenderPass, Renderer, WgpuBackend};
pub use scene::Scene;
pub use settings::{RenderSettings, SettingsError};

/// Routes `log` output through `env_logger` at `info` level. Safe to call
/// more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
