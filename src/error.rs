use thiserror::Error;

/// Errors that abort a paint.
///
/// Missing image sources and degenerate light transforms are not errors: they
/// fall back to neutral pipelines or shadow-less draws and only get logged.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no suitable graphics adapter: {0}")]
    NoAdapter(String),

    #[error("failed to create device: {0}")]
    Device(String),

    #[error("shader program `{label}` failed to compile: {message}")]
    ProgramCompilation { label: String, message: String },

    #[error("pipeline `{label}` could not be created: {message}")]
    PipelineCreation { label: String, message: String },

    #[error("render target `{label}` could not be created: {message}")]
    TargetCreation { label: String, message: String },

    #[error("unknown {kind} handle {index}")]
    UnknownHandle { kind: &'static str, index: u32 },

    #[error("entity {entity:?} has no {component} component")]
    MissingComponent {
        entity: hecs::Entity,
        component: &'static str,
    },

    #[error("{0} requires an active camera")]
    NoActiveCamera(&'static str),

    #[error("{0} used before the renderer was initialised")]
    NotInitialized(&'static str),
}

pub type RenderResult<T> = Result<T, RenderError>;

impl RenderError {
    pub(crate) fn missing(entity: hecs::Entity, component: &'static str) -> Self {
        Self::MissingComponent { entity, component }
    }

    pub(crate) fn unknown(kind: &'static str, index: u32) -> Self {
        Self::UnknownHandle { kind, index }
    }
}
