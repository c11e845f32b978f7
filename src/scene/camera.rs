use glam::{Mat4, Vec4};

use crate::renderer::gpu::TargetHandle;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y_radians: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }

    pub fn aspect(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }
}

/// Camera component. The view matrix is the inverse of the entity's world
/// transform; view space is left-handed with the camera looking down +Z, so
/// larger z means further away.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub projection: Projection,
    pub viewport: Viewport,
    /// Offscreen target to paint into; `None` paints the backend's frame.
    pub target: Option<TargetHandle>,
    pub background: Vec4,
    pub clear: bool,
    /// Distance in front of the camera that stays sharp.
    pub focal_distance: f32,
    /// Distance from the focal plane at which blur is at its maximum.
    pub depth_of_field: f32,
    pub depth_of_field_enabled: bool,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Projection::Perspective {
                fov_y_radians: 60f32.to_radians(),
                near: 0.1,
                far: 1000.0,
            },
            viewport: Viewport::new(1280.0, 720.0),
            target: None,
            background: Vec4::new(0.0, 0.0, 0.0, 1.0),
            clear: true,
            focal_distance: 30.0,
            depth_of_field: 3.0,
            depth_of_field_enabled: false,
        }
    }
}

impl Camera {
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective {
                fov_y_radians,
                near,
                far,
            } => Mat4::perspective_lh(fov_y_radians, self.viewport.aspect(), near, far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_lh(left, right, bottom, top, near, far),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn projection_is_invertible() {
        let cam = Camera::default();
        let proj = cam.projection_matrix();
        let id = proj * proj.inverse();
        assert!(id.abs_diff_eq(Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn perspective_maps_depth_to_unit_range() {
        let cam = Camera::default();
        let proj = cam.projection_matrix();

        let near = proj.project_point3(Vec3::new(0.0, 0.0, 0.1));
        let far = proj.project_point3(Vec3::new(0.0, 0.0, 1000.0));

        assert!((near.z - 0.0).abs() < 1e-4);
        assert!((far.z - 1.0).abs() < 1e-4);
    }

    #[test]
    fn zero_height_viewport_has_unit_aspect() {
        assert_eq!(Viewport::new(10.0, 0.0).aspect(), 1.0);
    }
}
