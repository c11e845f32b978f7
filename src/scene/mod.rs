// scene/mod.rs

pub mod camera;
pub mod components;
pub mod scene;
pub mod transform;

pub use camera::{Camera, Projection, Viewport};
pub use components::{
    light_direction, Children, Geometry, GeometryKind, Light, Material, Name, Parent,
};
pub use scene::{HierarchyError, Scene};
pub use transform::Transform;
