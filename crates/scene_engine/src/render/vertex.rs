//! Interleaved vertex format shared by model and grid pipelines

use ash::vk;

use crate::assets::ImportedMesh;
use crate::gpu::VertexLayout;

/// One vertex as laid out in GPU vertex buffers
///
/// `#[repr(C)]` with only `f32` fields, so there is no padding and the
/// stride is exactly 52 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    /// Object-space position, `w = 1`
    pub position: [f32; 4],
    /// Unit normal
    pub normal: [f32; 3],
    /// Unit tangent with bitangent handedness in `w`
    pub tangent: [f32; 4],
    /// Texture coordinates, top-left origin
    pub tex_coord: [f32; 2],
}

unsafe impl bytemuck::Pod for Vertex {}
unsafe impl bytemuck::Zeroable for Vertex {}

impl Vertex {
    /// Input layout at binding 0: locations 0-3 are position, normal, tangent, UV
    #[must_use]
    pub fn layout() -> VertexLayout {
        let attribute = |location, format, offset| vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset,
        };

        VertexLayout {
            stride: std::mem::size_of::<Self>() as u32,
            attributes: vec![
                attribute(0, vk::Format::R32G32B32A32_SFLOAT, 0),
                attribute(1, vk::Format::R32G32B32_SFLOAT, 16),
                attribute(2, vk::Format::R32G32B32A32_SFLOAT, 28),
                attribute(3, vk::Format::R32G32_SFLOAT, 44),
            ],
        }
    }

    /// Interleave the attributes of a post-processed mesh
    #[must_use]
    pub fn from_imported(mesh: &ImportedMesh) -> Vec<Self> {
        mesh.positions
            .iter()
            .enumerate()
            .map(|(i, p)| Self {
                position: [p[0], p[1], p[2], 1.0],
                normal: mesh.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
                tangent: mesh
                    .tangents
                    .get(i)
                    .copied()
                    .unwrap_or(crate::assets::postprocess::FALLBACK_TANGENT),
                tex_coord: mesh.tex_coords.get(i).copied().unwrap_or_default(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_layout_matches_struct() {
        let layout = Vertex::layout();

        assert_eq!(size_of::<Vertex>(), 52);
        assert_eq!(layout.stride, 52);
        assert_eq!(layout.attributes[0].offset as usize, offset_of!(Vertex, position));
        assert_eq!(layout.attributes[1].offset as usize, offset_of!(Vertex, normal));
        assert_eq!(layout.attributes[2].offset as usize, offset_of!(Vertex, tangent));
        assert_eq!(layout.attributes[3].offset as usize, offset_of!(Vertex, tex_coord));
    }

    #[test]
    fn test_from_imported_sets_w() {
        let mesh = ImportedMesh {
            positions: vec![[1.0, 2.0, 3.0]],
            normals: vec![[0.0, 0.0, 1.0]],
            tangents: vec![[1.0, 0.0, 0.0, -1.0]],
            tex_coords: vec![[0.25, 0.75]],
            indices: vec![0, 0, 0],
            ..Default::default()
        };
        let vertices = Vertex::from_imported(&mesh);

        assert_eq!(vertices.len(), 1);
        assert_eq!(vertices[0].position, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(vertices[0].tangent[3], -1.0);
        assert_eq!(vertices[0].tex_coord, [0.25, 0.75]);
        assert_eq!(bytemuck::cast_slice::<Vertex, u8>(&vertices).len(), 52);
    }
}
