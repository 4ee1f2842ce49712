//! Math types and helpers for 3D rendering
//!
//! Thin aliases over `nalgebra` plus the projection conventions the Vulkan
//! backend expects (right-handed world, Y-down clip space, depth in `[0, 1]`).

pub use nalgebra::{Matrix3, Matrix4, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Common mathematical constants
pub mod constants {
    /// Pi
    pub const PI: f32 = std::f32::consts::PI;

    /// Half Pi
    pub const HALF_PI: f32 = PI * 0.5;

    /// Quarter Pi
    pub const QUARTER_PI: f32 = PI * 0.25;

    /// Degrees to radians factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Scalar helpers
pub mod utils {
    use super::constants::DEG_TO_RAD;

    /// Convert degrees to radians
    #[must_use]
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * DEG_TO_RAD
    }

    /// Smoothing factor for frame-rate independent exponential approach.
    ///
    /// Returns `1 - e^(-rate * dt)`, the fraction of the remaining distance to
    /// cover this frame.
    #[must_use]
    pub fn exp_smoothing(rate: f32, dt: f32) -> f32 {
        1.0 - (-rate * dt).exp()
    }
}

/// Matrix constructors matching the Vulkan clip-space conventions
pub trait Mat4Ext {
    /// Perspective projection for a view space with X right, Y down, Z forward.
    ///
    /// Depth maps to `[0, 1]`. Combine with [`Mat4Ext::vulkan_coordinate_transform`]
    /// to consume right-handed Y-up view matrices.
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Flips Y and Z to go from right-handed Y-up view space to the
    /// Y-down, Z-forward space [`Mat4Ext::perspective`] expects.
    fn vulkan_coordinate_transform() -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (far - near);
        result[(2, 3)] = -(near * far) / (far - near);
        result[(3, 2)] = 1.0;
        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let right = forward.cross(&up).normalize();
        let camera_up = right.cross(&forward);

        let translation = Mat4::new_translation(&-eye);

        #[rustfmt::skip]
        let rotation = Mat4::new(
            right.x,      right.y,      right.z,      0.0,
            camera_up.x,  camera_up.y,  camera_up.z,  0.0,
            -forward.x,   -forward.y,   -forward.z,   0.0,
            0.0,          0.0,          0.0,          1.0,
        );

        rotation * translation
    }

    fn vulkan_coordinate_transform() -> Mat4 {
        Mat4::from_diagonal(&Vec4::new(1.0, -1.0, -1.0, 1.0))
    }
}

/// Column-major `[[f32; 4]; 4]` as laid out in a std140 `mat4`
#[must_use]
pub fn to_gpu_matrix(matrix: &Mat4) -> [[f32; 4]; 4] {
    (*matrix).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_perspective_depth_range() {
        let near = 0.1;
        let far = 100.0;
        let proj = Mat4::perspective(constants::QUARTER_PI, 1.5, near, far)
            * Mat4::vulkan_coordinate_transform();

        // Right-handed view space looks down -Z
        let at_near = proj * Vec4::new(0.0, 0.0, -near, 1.0);
        let at_far = proj * Vec4::new(0.0, 0.0, -far, 1.0);

        assert_relative_eq!(at_near.z / at_near.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(at_far.z / at_far.w, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_up_maps_to_negative_clip_y() {
        let proj = Mat4::perspective(constants::QUARTER_PI, 1.0, 0.1, 10.0)
            * Mat4::vulkan_coordinate_transform();
        let above = proj * Vec4::new(0.0, 1.0, -5.0, 1.0);
        assert!(above.y / above.w < 0.0);
    }

    #[test]
    fn test_look_at_moves_eye_to_origin() {
        let eye = Vec3::new(3.0, 4.0, 5.0);
        let view = Mat4::look_at(eye, Vec3::zeros(), Vec3::y());
        let transformed = view * Vec4::new(eye.x, eye.y, eye.z, 1.0);
        assert_relative_eq!(transformed.xyz(), Vec3::zeros(), epsilon = 1e-5);

        let target = view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!(target.z < 0.0);
    }

    #[test]
    fn test_exp_smoothing() {
        assert_relative_eq!(utils::exp_smoothing(5.0, 0.0), 0.0);
        assert!(utils::exp_smoothing(5.0, 10.0) > 0.999);
    }

    #[test]
    fn test_gpu_matrix_is_column_major() {
        let m = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let gpu = to_gpu_matrix(&m);
        assert_eq!(gpu[3], [1.0, 2.0, 3.0, 1.0]);
    }
}
