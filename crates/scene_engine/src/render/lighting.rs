//! Scene lights packed into one constant buffer ("Lights", fragment stage)

use crate::foundation::math::Vec3;
use crate::gpu::ConstantBuffer;

/// Fixed capacity of the light array
pub const MAX_LIGHTS: usize = 16;

/// Light types, numbered as the fragment shader expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LightType {
    /// Parallel rays along `direction` (sun, moon)
    Directional = 0,
    /// Omnidirectional from `position`, fading out at `range`
    Point = 1,
    /// Cone from `position` along `direction`
    Spot = 2,
}

/// Parameters of one light, as passed to [`Lighting::set_light`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightDesc {
    /// Light type
    pub light_type: LightType,
    /// World-space position (point and spot)
    pub position: Vec3,
    /// World-space direction (directional and spot)
    pub direction: Vec3,
    /// Reach of point and spot lights
    pub range: f32,
    /// Spot inner cone angle in radians
    pub inner_angle: f32,
    /// Spot outer cone angle in radians
    pub outer_angle: f32,
    /// Linear RGB color
    pub color: Vec3,
    /// Brightness multiplier
    pub intensity: f32,
}

impl LightDesc {
    /// Directional light
    #[must_use]
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            light_type: LightType::Directional,
            position: Vec3::zeros(),
            direction,
            range: 0.0,
            inner_angle: 0.0,
            outer_angle: 0.0,
            color,
            intensity,
        }
    }

    /// Point light
    #[must_use]
    pub fn point(position: Vec3, range: f32, color: Vec3, intensity: f32) -> Self {
        Self {
            light_type: LightType::Point,
            position,
            direction: Vec3::zeros(),
            range,
            inner_angle: 0.0,
            outer_angle: 0.0,
            color,
            intensity,
        }
    }

    /// Spot light
    #[must_use]
    pub fn spot(
        position: Vec3,
        direction: Vec3,
        range: f32,
        inner_angle: f32,
        outer_angle: f32,
        color: Vec3,
        intensity: f32,
    ) -> Self {
        Self {
            light_type: LightType::Spot,
            position,
            direction,
            range,
            inner_angle,
            outer_angle,
            color,
            intensity,
        }
    }
}

/// One light in std140 layout (80 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// Position, `w = 1`
    pub position: [f32; 4],
    /// Direction, `w = 0`
    pub direction: [f32; 4],
    /// Color, `w = 1`
    pub color: [f32; 4],
    /// Reach of point and spot lights
    pub range: f32,
    /// Spot inner cone angle
    pub inner_angle: f32,
    /// Spot outer cone angle
    pub outer_angle: f32,
    /// Brightness multiplier
    pub intensity: f32,
    /// [`LightType`] discriminant
    pub light_type: i32,
    /// 1.0 when set, 0.0 otherwise
    pub enabled: f32,
    /// std140 padding
    pub padding: [f32; 2],
}

unsafe impl bytemuck::Pod for Light {}
unsafe impl bytemuck::Zeroable for Light {}

impl Default for Light {
    fn default() -> Self {
        Self {
            position: [0.0; 4],
            direction: [0.0; 4],
            color: [0.0; 4],
            range: 0.0,
            inner_angle: 0.0,
            outer_angle: 0.0,
            intensity: 1.0,
            light_type: LightType::Directional as i32,
            enabled: 0.0,
            padding: [0.0; 2],
        }
    }
}

impl From<&LightDesc> for Light {
    fn from(desc: &LightDesc) -> Self {
        let p = desc.position;
        let d = desc.direction;
        let c = desc.color;
        Self {
            position: [p.x, p.y, p.z, 1.0],
            direction: [d.x, d.y, d.z, 0.0],
            color: [c.x, c.y, c.z, 1.0],
            range: desc.range,
            inner_angle: desc.inner_angle,
            outer_angle: desc.outer_angle,
            intensity: desc.intensity,
            light_type: desc.light_type as i32,
            enabled: 1.0,
            padding: [0.0; 2],
        }
    }
}

/// Contents of the "Lights" constant buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightBufferData {
    /// Camera position for specular terms, `w = 1`
    pub eye_position: [f32; 4],
    /// Ambient term added to every fragment
    pub global_ambient: [f32; 4],
    /// Light slots
    pub lights: [Light; MAX_LIGHTS],
    /// One past the highest slot ever written
    pub num_lights: u32,
    /// 1.0 for Blinn-Phong, 0.0 for Phong
    pub use_blinn_phong: f32,
    /// std140 padding
    pub padding: [f32; 2],
}

unsafe impl bytemuck::Pod for LightBufferData {}
unsafe impl bytemuck::Zeroable for LightBufferData {}

/// CPU-side light set, copied into a constant buffer every frame
#[derive(Debug, Clone)]
pub struct Lighting {
    data: LightBufferData,
}

impl Default for Lighting {
    fn default() -> Self {
        Self::new()
    }
}

impl Lighting {
    /// No lights, ambient 0.1, Blinn-Phong on
    #[must_use]
    pub fn new() -> Self {
        log::debug!("Lighting created ({} slots)", MAX_LIGHTS);
        Self {
            data: LightBufferData {
                eye_position: [0.0, 0.0, 5.0, 1.0],
                global_ambient: [0.1, 0.1, 0.1, 1.0],
                lights: [Light::default(); MAX_LIGHTS],
                num_lights: 0,
                use_blinn_phong: 1.0,
                padding: [0.0; 2],
            },
        }
    }

    /// Write slot `index`
    ///
    /// Indices at or beyond [`MAX_LIGHTS`] are ignored. The light count
    /// becomes `index + 1` when `index` is the highest slot written so far,
    /// so lower unwritten slots stay counted but disabled.
    pub fn set_light(&mut self, index: usize, desc: &LightDesc) {
        let Some(slot) = self.data.lights.get_mut(index) else {
            log::warn!("Light index {} ignored (capacity {})", index, MAX_LIGHTS);
            return;
        };
        *slot = Light::from(desc);

        let count = index as u32 + 1;
        if count > self.data.num_lights {
            self.data.num_lights = count;
        }
    }

    /// Camera position used for specular highlights
    pub fn set_eye_position(&mut self, eye: Vec3) {
        self.data.eye_position = [eye.x, eye.y, eye.z, 1.0];
    }

    /// Ambient color added to every fragment
    pub fn set_global_ambient(&mut self, ambient: Vec3) {
        self.data.global_ambient = [ambient.x, ambient.y, ambient.z, 1.0];
    }

    /// Switch between Blinn-Phong and Phong specular
    pub fn set_blinn_phong(&mut self, enabled: bool) {
        self.data.use_blinn_phong = if enabled { 1.0 } else { 0.0 };
    }

    /// Number of slots the shader iterates over
    #[must_use]
    pub const fn num_lights(&self) -> u32 {
        self.data.num_lights
    }

    /// Slot `index`, if in range
    #[must_use]
    pub fn light(&self, index: usize) -> Option<&Light> {
        self.data.lights.get(index)
    }

    /// Packed buffer contents
    #[must_use]
    pub const fn data(&self) -> &LightBufferData {
        &self.data
    }

    /// Copy the whole light set into `buffer`
    pub fn update_gpu(&self, buffer: &ConstantBuffer<LightBufferData>) {
        buffer.update(&self.data);
        log::trace!("Lights uploaded ({} active slots)", self.data.num_lights);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    fn sun() -> LightDesc {
        LightDesc::directional(Vec3::new(0.5, 1.0, -0.5), Vec3::new(1.0, 1.0, 1.0), 1.0)
    }

    #[test]
    fn test_layout_sizes() {
        assert_eq!(size_of::<Light>(), 80);
        assert_eq!(offset_of!(LightBufferData, lights), 32);
        assert_eq!(offset_of!(LightBufferData, num_lights), 32 + 80 * MAX_LIGHTS);
        assert_eq!(size_of::<LightBufferData>() % 16, 0);
    }

    #[test]
    fn test_count_is_highest_index_written() {
        let mut lighting = Lighting::new();
        lighting.set_light(5, &sun());

        assert_eq!(lighting.num_lights(), 6);
        for i in 0..5 {
            assert_eq!(lighting.light(i).map(|l| l.enabled), Some(0.0));
        }
        assert_eq!(lighting.light(5).map(|l| l.enabled), Some(1.0));

        lighting.set_light(2, &sun());
        assert_eq!(lighting.num_lights(), 6);
    }

    #[test]
    fn test_out_of_range_index_is_ignored() {
        let mut lighting = Lighting::new();
        lighting.set_light(1, &sun());
        let before = *lighting.data();

        lighting.set_light(MAX_LIGHTS, &sun());
        lighting.set_light(MAX_LIGHTS + 40, &sun());

        assert_eq!(*lighting.data(), before);
        assert_eq!(lighting.num_lights(), 2);
    }

    #[test]
    fn test_fields_survive_buffer_packing() {
        let desc = LightDesc::spot(
            Vec3::new(-1.0, 5.0, 0.25),
            Vec3::new(0.0, -1.0, 0.0),
            20.0,
            0.3,
            0.6,
            Vec3::new(1.0, 0.9, 0.8),
            1.5,
        );
        let mut lighting = Lighting::new();
        lighting.set_light(3, &desc);

        let bytes = bytemuck::bytes_of(lighting.data());
        let offset = offset_of!(LightBufferData, lights) + 3 * size_of::<Light>();
        let light: Light = bytemuck::pod_read_unaligned(&bytes[offset..offset + size_of::<Light>()]);

        assert_eq!(light.position[..3], [-1.0, 5.0, 0.25]);
        assert_eq!(light.direction[..3], [0.0, -1.0, 0.0]);
        assert_eq!(light.color[..3], [1.0, 0.9, 0.8]);
        assert_eq!(light.intensity.to_bits(), 1.5_f32.to_bits());
        assert_eq!(light.range.to_bits(), 20.0_f32.to_bits());
        assert_eq!(light.inner_angle.to_bits(), 0.3_f32.to_bits());
        assert_eq!(light.outer_angle.to_bits(), 0.6_f32.to_bits());
        assert_eq!(light.light_type, LightType::Spot as i32);
    }

    #[test]
    fn test_scene_scalars() {
        let mut lighting = Lighting::new();
        lighting.set_eye_position(Vec3::new(1.0, 2.0, 3.0));
        lighting.set_global_ambient(Vec3::new(0.2, 0.2, 0.3));
        lighting.set_blinn_phong(false);

        let data = lighting.data();
        assert_eq!(data.eye_position, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(data.global_ambient, [0.2, 0.2, 0.3, 1.0]);
        assert_eq!(data.use_blinn_phong, 0.0);
    }
}
