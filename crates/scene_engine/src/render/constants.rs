//! Per-draw constant buffer layouts
//!
//! Field order and padding follow std140 so the structs can be copied into
//! uniform buffers byte for byte. Matrices are column-major and uploaded
//! without transposition.

use crate::foundation::math::{to_gpu_matrix, Mat4};

/// Model and view-projection matrices ("MVP", vertex stage)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MvpConstants {
    /// Object-to-world
    pub model: [[f32; 4]; 4],
    /// World-to-clip
    pub view_proj: [[f32; 4]; 4],
}

unsafe impl bytemuck::Pod for MvpConstants {}
unsafe impl bytemuck::Zeroable for MvpConstants {}

impl MvpConstants {
    /// Pack both matrices
    #[must_use]
    pub fn new(model: &Mat4, view_proj: &Mat4) -> Self {
        Self {
            model: to_gpu_matrix(model),
            view_proj: to_gpu_matrix(view_proj),
        }
    }
}

impl Default for MvpConstants {
    fn default() -> Self {
        Self::new(&Mat4::identity(), &Mat4::identity())
    }
}

/// Surface response of a material ("Material", fragment stage)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialData {
    /// Emitted color
    pub emissive: [f32; 4],
    /// Ambient reflectance
    pub ambient: [f32; 4],
    /// Diffuse reflectance
    pub diffuse: [f32; 4],
    /// Specular reflectance
    pub specular: [f32; 4],
    /// Phong exponent
    pub specular_power: f32,
    /// 1.0 to modulate diffuse by the base-color texture
    pub use_texture: f32,
    /// 1.0 to perturb normals with a normal map
    pub use_normal_map: f32,
    /// 1.0 to read specular from a map
    pub use_specular_map: f32,
    /// std140 tail padding
    pub padding: [f32; 2],
}

unsafe impl bytemuck::Pod for MaterialData {}
unsafe impl bytemuck::Zeroable for MaterialData {}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            emissive: [0.0, 0.0, 0.0, 1.0],
            ambient: [0.1, 0.1, 0.1, 1.0],
            diffuse: [1.0, 1.0, 1.0, 1.0],
            specular: [1.0, 1.0, 1.0, 1.0],
            specular_power: 64.0,
            use_texture: 1.0,
            use_normal_map: 0.0,
            use_specular_map: 0.0,
            padding: [0.0; 2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use std::mem::size_of;

    #[test]
    fn test_sizes_are_std140() {
        assert_eq!(size_of::<MvpConstants>(), 128);
        assert_eq!(size_of::<MaterialData>(), 88);
    }

    #[test]
    fn test_translation_lands_in_last_column() {
        let model = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let mvp = MvpConstants::new(&model, &Mat4::identity());

        assert_eq!(mvp.model[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(mvp.view_proj[0], [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_material_defaults() {
        let material = MaterialData::default();
        assert_eq!(material.specular_power, 64.0);
        assert_eq!(material.use_texture, 1.0);
        assert_eq!(material.ambient[0], 0.1);
    }
}
