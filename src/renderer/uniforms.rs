// renderer/uniforms.rs
use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3, Vec4};

/// Per-draw uniform block shared by every program.
///
/// Only vec4/mat4 members so the Rust and WGSL layouts agree without padding
/// fields; the normal matrix is a 3x3 widened to a mat4.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, PartialEq, Debug)]
pub struct DrawUniforms {
    pub modelview: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 4],
    pub light_shadow_matrix: [[f32; 4]; 4],
    /// xyz direction towards the light in view space, w is 1 when the shadow
    /// matrix is valid.
    pub light_direction: [f32; 4],
    pub light_ambient: [f32; 4],
    pub light_diffuse: [f32; 4],
    pub light_specular: [f32; 4],
    pub material_ambient: [f32; 4],
    pub material_diffuse: [f32; 4],
    pub material_specular: [f32; 4],
    pub base_color: [f32; 4],
    /// shininess, alpha-mask threshold, focal distance, depth of field
    pub params: [f32; 4],
    /// scale, z, lighter (0/1), cell size
    pub pointalism: [f32; 4],
    /// blur radius in texels, 1/width, 1/height, unused
    pub composite: [f32; 4],
}

pub const BASE_COLOR: Vec4 = Vec4::new(0.8, 0.8, 0.8, 1.0);

impl DrawUniforms {
    pub fn new() -> Self {
        Self {
            modelview: Mat4::IDENTITY.to_cols_array_2d(),
            projection: Mat4::IDENTITY.to_cols_array_2d(),
            normal_matrix: Mat4::IDENTITY.to_cols_array_2d(),
            light_shadow_matrix: Mat4::IDENTITY.to_cols_array_2d(),
            light_direction: [0.0, 0.0, -1.0, 0.0],
            light_ambient: [0.0; 4],
            light_diffuse: [0.0; 4],
            light_specular: [0.0; 4],
            material_ambient: [1.0; 4],
            material_diffuse: [1.0; 4],
            material_specular: [1.0; 4],
            base_color: BASE_COLOR.to_array(),
            params: [1.0, 0.5, 0.0, 1.0],
            pointalism: [0.0; 4],
            composite: [0.0; 4],
        }
    }

    pub fn set_transforms(&mut self, modelview: Mat4, projection: Mat4) {
        self.modelview = modelview.to_cols_array_2d();
        self.projection = projection.to_cols_array_2d();
        self.normal_matrix = Mat4::from_mat3(normal_matrix(modelview)).to_cols_array_2d();
    }

    /// `None` disables the shadow lookup for this draw.
    pub fn set_shadow(&mut self, light_shadow_matrix: Option<Mat4>) {
        match light_shadow_matrix {
            Some(matrix) => {
                self.light_shadow_matrix = matrix.to_cols_array_2d();
                self.light_direction[3] = 1.0;
            }
            None => {
                self.light_shadow_matrix = Mat4::IDENTITY.to_cols_array_2d();
                self.light_direction[3] = 0.0;
            }
        }
    }

    pub fn shadow_enabled(&self) -> bool {
        self.light_direction[3] > 0.5
    }

    pub fn set_light(&mut self, direction: Vec3, ambient: Vec4, diffuse: Vec4, specular: Vec4) {
        let shadow = self.light_direction[3];
        self.light_direction = direction.extend(shadow).to_array();
        self.light_ambient = ambient.to_array();
        self.light_diffuse = diffuse.to_array();
        self.light_specular = specular.to_array();
    }

    pub fn set_material(&mut self, ambient: Vec4, diffuse: Vec4, specular: Vec4, shininess: f32) {
        self.material_ambient = ambient.to_array();
        self.material_diffuse = diffuse.to_array();
        self.material_specular = specular.to_array();
        self.params[0] = shininess;
    }

    pub fn set_alpha_threshold(&mut self, threshold: f32) {
        self.params[1] = threshold;
    }

    pub fn set_focal_parameters(&mut self, focal_distance: f32, depth_of_field: f32) {
        self.params[2] = focal_distance;
        // Guard the division in the blur snippet.
        self.params[3] = depth_of_field.max(f32::EPSILON);
    }

    pub fn focal_distance(&self) -> f32 {
        self.params[2]
    }

    pub fn depth_of_field(&self) -> f32 {
        self.params[3]
    }

    pub fn set_pointalism(&mut self, scale: f32, z: f32, lighter: bool, cell_size: f32) {
        self.pointalism = [scale, z, if lighter { 1.0 } else { 0.0 }, cell_size];
    }

    pub fn set_composite(&mut self, blur_radius: f32, width: u32, height: u32) {
        self.composite = [
            blur_radius,
            1.0 / width.max(1) as f32,
            1.0 / height.max(1) as f32,
            0.0,
        ];
    }

    pub fn modelview_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.modelview)
    }

    pub fn light_shadow_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.light_shadow_matrix)
    }
}

impl Default for DrawUniforms {
    fn default() -> Self {
        Self::new()
    }
}

/// Inverse transpose of the upper 3x3, identity when it is singular.
pub fn normal_matrix(modelview: Mat4) -> Mat3 {
    let upper = Mat3::from_mat4(modelview);
    let det = upper.determinant();
    if det.abs() <= f32::EPSILON || !det.is_finite() {
        return Mat3::IDENTITY;
    }
    upper.inverse().transpose()
}

/// Blur factor written by the depth-of-field mask: 1 on the focal plane,
/// falling to 0 at `depth_of_field` away from it.
pub fn dof_blur(view_z: f32, focal_distance: f32, depth_of_field: f32) -> f32 {
    1.0 - ((view_z - focal_distance).abs() / depth_of_field.max(f32::EPSILON)).clamp(0.0, 1.0)
}
