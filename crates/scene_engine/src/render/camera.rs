//! Orbit camera
//!
//! The camera circles a target point on a sphere described by yaw, pitch
//! and radius. Every mutator recomputes the position and matrices right
//! away. Dolly zoom is smoothed: [`Camera::zoom`] moves the target radius
//! and [`Camera::update`] eases the actual radius toward it.
//!
//! World space is right-handed and Y-up; the projection already includes
//! the Vulkan clip-space flip.

use crate::foundation::math::{constants, utils, Mat4, Mat4Ext, Vec3};

/// Closest the pitch may get to straight up or down
const PITCH_MARGIN: f32 = 0.01;

/// Rate of the exponential dolly smoothing, per second
const ZOOM_SMOOTHING_RATE: f32 = 5.0;

/// Narrowest field of view accepted by [`Camera::set_fov`]
const MIN_FOV: f32 = 0.1;

/// Smallest bounding radius [`Camera::frame_model`] frames; keeps the eye off the target
const MIN_FRAMING_RADIUS: f32 = 0.01;

/// Orbit/pan/zoom camera
#[derive(Debug, Clone)]
pub struct Camera {
    fov: f32,
    aspect: f32,
    near: f32,
    far: f32,

    yaw: f32,
    pitch: f32,
    radius: f32,
    target_radius: f32,
    min_radius: f32,
    max_radius: f32,

    position: Vec3,
    target: Vec3,

    view: Mat4,
    projection: Mat4,
}

impl Camera {
    /// Camera 20 units in front of the origin
    ///
    /// `fov` is the vertical field of view in radians.
    #[must_use]
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            fov,
            aspect,
            near,
            far,
            yaw: 0.0,
            pitch: 0.0,
            radius: 20.0,
            target_radius: 20.0,
            min_radius: 1.0,
            max_radius: 100.0,
            position: Vec3::zeros(),
            target: Vec3::zeros(),
            view: Mat4::identity(),
            projection: Mat4::identity(),
        };
        camera.set_projection(fov, aspect, near, far);
        camera.update_position_from_orbit();

        log::info!(
            "Camera at ({:.2}, {:.2}, {:.2}) looking at ({:.2}, {:.2}, {:.2})",
            camera.position.x,
            camera.position.y,
            camera.position.z,
            camera.target.x,
            camera.target.y,
            camera.target.z
        );
        camera
    }

    /// Aim at a model's bounding sphere
    ///
    /// Frames it from the front, 20° above the horizon, at 2.5 radii.
    /// Zoom limits become 1.5 and 20 radii. Degenerate radii are raised to a
    /// small minimum.
    pub fn frame_model(&mut self, center: Vec3, bounding_radius: f32) {
        if bounding_radius.is_nan() || bounding_radius < MIN_FRAMING_RADIUS {
            log::warn!(
                "Bounding radius {} too small to frame, using {}",
                bounding_radius,
                MIN_FRAMING_RADIUS
            );
        }
        let bounding_radius = bounding_radius.max(MIN_FRAMING_RADIUS);

        self.target = center;
        self.target_radius = bounding_radius * 2.5;
        self.min_radius = bounding_radius * 1.5;
        self.max_radius = bounding_radius * 20.0;

        self.yaw = 0.0;
        self.pitch = utils::deg_to_rad(20.0);
        self.radius = self.target_radius;

        self.update_position_from_orbit();
        log::debug!(
            "Camera framed model: radius {:.2} (limits {:.2}..{:.2})",
            self.radius,
            self.min_radius,
            self.max_radius
        );
    }

    /// Ease the radius toward the zoom target and refresh the view
    pub fn update(&mut self, delta_time: f32) {
        let t = utils::exp_smoothing(ZOOM_SMOOTHING_RATE, delta_time);
        self.radius += (self.target_radius - self.radius) * t;
        self.update_position_from_orbit();
    }

    /// Rotate around the target; pitch stays short of the poles
    pub fn orbit(&mut self, delta_yaw: f32, delta_pitch: f32) {
        let limit = constants::HALF_PI - PITCH_MARGIN;
        self.yaw += delta_yaw;
        self.pitch = (self.pitch + delta_pitch).clamp(-limit, limit);
        self.update_position_from_orbit();
    }

    /// Dolly toward (`wheel_delta > 0`) or away from the target
    pub fn zoom(&mut self, wheel_delta: f32) {
        self.target_radius *= 1.0 - wheel_delta * 0.1;
        self.target_radius = self.target_radius.clamp(self.min_radius, self.max_radius);
        self.update_position_from_orbit();
    }

    /// Slide the target in the camera's screen plane, scaled by distance
    pub fn pan(&mut self, delta_x: f32, delta_y: f32) {
        let factor = self.radius * 0.001;
        let up = Vec3::y();
        let forward = (self.target - self.position).normalize();
        let right = forward.cross(&up).normalize();

        self.target += right * (delta_x * factor) - up * (delta_y * factor);
        self.update_position_from_orbit();
    }

    /// Lens zoom; clamped to `[0.1, π/2]`
    pub fn set_fov(&mut self, fov: f32) {
        self.fov = fov.clamp(MIN_FOV, constants::HALF_PI);
        self.rebuild_projection();
    }

    /// Replace every projection parameter
    pub fn set_projection(&mut self, fov: f32, aspect: f32, near: f32, far: f32) {
        self.fov = fov;
        self.aspect = aspect;
        self.near = near;
        self.far = far;
        self.rebuild_projection();
        log::debug!(
            "Projection updated: fov {:.2}, aspect {:.2}, near {:.2}, far {:.2}",
            fov,
            aspect,
            near,
            far
        );
    }

    /// Follow a viewport size change
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
        self.rebuild_projection();
    }

    fn rebuild_projection(&mut self) {
        self.projection = Mat4::perspective(self.fov, self.aspect, self.near, self.far)
            * Mat4::vulkan_coordinate_transform();
    }

    fn update_position_from_orbit(&mut self) {
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let offset = Vec3::new(cos_pitch * sin_yaw, sin_pitch, cos_pitch * cos_yaw) * self.radius;

        self.position = self.target + offset;
        self.view = Mat4::look_at(self.position, self.target, Vec3::y());
    }

    /// World-to-view
    #[must_use]
    pub const fn view(&self) -> &Mat4 {
        &self.view
    }

    /// View-to-clip
    #[must_use]
    pub const fn projection(&self) -> &Mat4 {
        &self.projection
    }

    /// World-to-clip
    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Eye position
    #[must_use]
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    /// Orbit center
    #[must_use]
    pub const fn target(&self) -> Vec3 {
        self.target
    }

    /// Vertical field of view in radians
    #[must_use]
    pub const fn fov(&self) -> f32 {
        self.fov
    }

    /// Current distance to the target
    #[must_use]
    pub const fn radius(&self) -> f32 {
        self.radius
    }

    /// Distance the dolly is easing toward
    #[must_use]
    pub const fn target_radius(&self) -> f32 {
        self.target_radius
    }

    /// Closest allowed distance
    #[must_use]
    pub const fn min_radius(&self) -> f32 {
        self.min_radius
    }

    /// Farthest allowed distance
    #[must_use]
    pub const fn max_radius(&self) -> f32 {
        self.max_radius
    }

    /// Horizontal orbit angle
    #[must_use]
    pub const fn yaw(&self) -> f32 {
        self.yaw
    }

    /// Vertical orbit angle
    #[must_use]
    pub const fn pitch(&self) -> f32 {
        self.pitch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use approx::assert_relative_eq;

    fn camera() -> Camera {
        Camera::new(constants::QUARTER_PI, 16.0 / 9.0, 0.1, 100.0)
    }

    #[test]
    fn test_pitch_never_reaches_poles() {
        let mut camera = camera();
        let deltas = [3.0, 0.5, -10.0, 1.5, 1.5, 1.5, -0.2, 100.0];
        for delta in deltas {
            camera.orbit(0.3, delta);
            assert!(camera.pitch() > -constants::HALF_PI);
            assert!(camera.pitch() < constants::HALF_PI);
        }
    }

    #[test]
    fn test_radius_stays_within_limits() {
        let mut camera = camera();
        camera.frame_model(Vec3::new(1.0, 2.0, 3.0), 4.0);

        for wheel in [5.0, 5.0, 5.0, -20.0, -20.0, -20.0, 0.3, 12.0] {
            camera.zoom(wheel);
            camera.update(0.016);
            for r in [camera.radius(), camera.target_radius()] {
                assert!(r >= camera.min_radius() - 1e-4);
                assert!(r <= camera.max_radius() + 1e-4);
            }
        }

        camera.frame_model(Vec3::zeros(), 0.5);
        assert!(camera.radius() >= camera.min_radius());
        assert!(camera.radius() <= camera.max_radius());
    }

    #[test]
    fn test_frame_model_places_camera() {
        let center = Vec3::new(2.0, -1.0, 4.0);
        let radius = 3.0;
        let mut camera = camera();
        camera.frame_model(center, radius);
        camera.update(0.7);

        assert_relative_eq!(camera.target(), center);
        assert_relative_eq!((camera.position() - center).norm(), radius * 2.5, epsilon = 1e-4);

        // Front of the model (+Z), above it
        let offset = camera.position() - center;
        assert_relative_eq!(offset.x, 0.0, epsilon = 1e-4);
        assert!(offset.y > 0.0);
        assert!(offset.z > 0.0);
        assert_relative_eq!(offset.y / offset.norm(), utils::deg_to_rad(20.0).sin(), epsilon = 1e-5);
    }

    #[test]
    fn test_frame_zero_radius_keeps_view_finite() {
        let mut camera = camera();
        camera.frame_model(Vec3::zeros(), 0.0);
        camera.update(0.016);

        assert!(camera.radius() >= MIN_FRAMING_RADIUS);
        assert!((camera.position() - camera.target()).norm() > 0.0);
        assert!(camera.view().iter().all(|v| v.is_finite()));
        assert!(camera.view_projection().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_update_eases_radius() {
        let mut camera = camera();
        camera.frame_model(Vec3::zeros(), 10.0);
        let start = camera.radius();
        camera.zoom(2.0);
        let goal = camera.target_radius();
        assert!(goal < start);

        camera.update(0.1);
        assert!(camera.radius() < start);
        assert!(camera.radius() > goal);

        camera.update(10.0);
        assert_relative_eq!(camera.radius(), goal, epsilon = 1e-3);
    }

    #[test]
    fn test_set_fov_clamps() {
        let mut camera = camera();
        camera.set_fov(0.0);
        assert_relative_eq!(camera.fov(), MIN_FOV);
        camera.set_fov(4.0);
        assert_relative_eq!(camera.fov(), constants::HALF_PI);
    }

    #[test]
    fn test_target_projects_to_screen_center() {
        let mut camera = camera();
        camera.frame_model(Vec3::new(5.0, 1.0, -2.0), 2.0);
        camera.orbit(0.7, -0.3);
        camera.pan(40.0, -25.0);

        let t = camera.target();
        let clip = camera.view_projection() * Vec4::new(t.x, t.y, t.z, 1.0);
        assert_relative_eq!(clip.x / clip.w, 0.0, epsilon = 1e-4);
        assert_relative_eq!(clip.y / clip.w, 0.0, epsilon = 1e-4);
        assert!(clip.z / clip.w > 0.0 && clip.z / clip.w < 1.0);
    }

    #[test]
    fn test_pan_moves_target_sideways() {
        let mut camera = camera();
        camera.frame_model(Vec3::zeros(), 1.0);
        let before = camera.position();
        camera.pan(100.0, 0.0);

        // Looking down -Z from +Z, screen right is +X
        assert!(camera.target().x > 0.0);
        assert_relative_eq!(camera.target().y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(camera.position() - before, camera.target(), epsilon = 1e-5);
    }
}
