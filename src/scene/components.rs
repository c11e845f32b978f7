// scene/components.rs
// Plain hecs components consumed by the renderer

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::asset::{Handle, ImageSource, Mesh};

// ============================================================================
// Hierarchy Components
// ============================================================================

/// Parent entity reference
#[derive(Debug, Clone, Copy)]
pub struct Parent(pub hecs::Entity);

/// Children in traversal order
#[derive(Debug, Clone, Default)]
pub struct Children(pub Vec<hecs::Entity>);

/// Name component for debugging
#[derive(Debug, Clone)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// Closed set of drawable geometry kinds.
///
/// The renderer picks its pipeline template by matching on this, so a new
/// kind has to be handled everywhere the match is exhaustive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Geometry {
    /// Rectangle sized to its content. When `shaped` the silhouette comes from
    /// `shape_mask` (texture layer 0) instead of the full quad.
    Shape {
        mesh: Handle<Mesh>,
        size: Vec2,
        shaped: bool,
        shape_mask: Option<Handle<ImageSource>>,
    },
    /// Round-masked quad; its silhouette is a circle.
    Diamond { mesh: Handle<Mesh>, size: f32 },
    /// Image broken into cells that are displaced along z by brightness.
    PointalismGrid {
        mesh: Handle<Mesh>,
        scale: f32,
        z: f32,
        lighter: bool,
        /// Edge of a dot at full size, in grid units (the grid spans 1).
        /// Independent of the mesh's cell count.
        cell_size: f32,
    },
    /// Arbitrary model data drawn as-is.
    Generic { mesh: Handle<Mesh> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Shape,
    Diamond,
    PointalismGrid,
    Generic,
}

impl Geometry {
    pub fn mesh(&self) -> Handle<Mesh> {
        match *self {
            Geometry::Shape { mesh, .. }
            | Geometry::Diamond { mesh, .. }
            | Geometry::PointalismGrid { mesh, .. }
            | Geometry::Generic { mesh } => mesh,
        }
    }

    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Shape { .. } => GeometryKind::Shape,
            Geometry::Diamond { .. } => GeometryKind::Diamond,
            Geometry::PointalismGrid { .. } => GeometryKind::PointalismGrid,
            Geometry::Generic { .. } => GeometryKind::Generic,
        }
    }

    /// Extra object-space transform applied before the entity transform.
    /// Shapes use a unit quad stretched to their size.
    pub fn local_matrix(&self) -> Mat4 {
        match *self {
            Geometry::Shape { size, .. } => Mat4::from_scale(size.extend(1.0)),
            Geometry::Diamond { size, .. } => Mat4::from_scale(Vec3::new(size, size, 1.0)),
            Geometry::PointalismGrid { .. } | Geometry::Generic { .. } => Mat4::IDENTITY,
        }
    }

    /// Geometry whose extent follows the natural size of the colour image.
    /// Returns true if the geometry changed.
    pub fn fit_to_image(&mut self, natural: Vec2) -> bool {
        match self {
            Geometry::Shape { size, .. } if natural.x > 0.0 && natural.y > 0.0 => {
                if *size == natural {
                    false
                } else {
                    *size = natural;
                    true
                }
            }
            _ => false,
        }
    }
}

// ============================================================================
// Material
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub visible: bool,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    pub color_source: Option<Handle<ImageSource>>,
    pub alpha_mask: Option<Handle<ImageSource>>,
    pub normal_map: Option<Handle<ImageSource>>,
    pub alpha_mask_threshold: f32,
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub shininess: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            visible: true,
            cast_shadow: true,
            receive_shadow: true,
            color_source: None,
            alpha_mask: None,
            normal_map: None,
            alpha_mask_threshold: 0.5,
            ambient: Vec4::new(0.23, 0.23, 0.23, 1.0),
            diffuse: Vec4::new(0.75, 0.75, 0.75, 1.0),
            specular: Vec4::new(0.64, 0.64, 0.64, 1.0),
            shininess: 100.0,
        }
    }
}

impl Material {
    pub fn sources(&self) -> impl Iterator<Item = Handle<ImageSource>> {
        [self.color_source, self.alpha_mask, self.normal_map]
            .into_iter()
            .flatten()
    }

    pub fn has_sources(&self) -> bool {
        self.sources().next().is_some()
    }
}

// ============================================================================
// Lighting
// ============================================================================

/// The single shadow-casting light. Its entity transform places it; local +Z
/// is the direction the light shines in.
#[derive(Debug, Clone, Copy)]
pub struct Light {
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    /// Half extent of the square orthographic shadow frustum.
    pub shadow_extent: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            ambient: Vec4::new(0.2, 0.2, 0.2, 1.0),
            diffuse: Vec4::new(0.6, 0.6, 0.6, 1.0),
            specular: Vec4::new(0.4, 0.4, 0.4, 1.0),
            shadow_extent: 50.0,
            near: 1.0,
            far: 500.0,
        }
    }
}

impl Light {
    pub fn projection(&self) -> Mat4 {
        let e = self.shadow_extent;
        Mat4::orthographic_lh(-e, e, -e, e, self.near, self.far)
    }
}

/// Direction towards the light in the space described by `view`.
pub fn light_direction(light_world: Mat4, view: Mat4) -> Vec3 {
    let shines_along = light_world.transform_vector3(Vec3::Z);
    view.transform_vector3(-shines_along).normalize_or_zero()
}
