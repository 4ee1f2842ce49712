//! Ground grid: a large flat quad shaded procedurally by its own pipeline

use ash::vk;

use super::bindings;
use super::constants::MvpConstants;
use super::material::MaterialBinding;
use super::mesh::Mesh;
use super::vertex::Vertex;
use crate::config::RendererConfig;
use crate::foundation::math::{Mat4, Vec3};
use crate::gpu::{
    BindingLayout, CommandList, ConstantBuffer, CullMode, FrameBuffered, GraphicsContext,
    Pipeline, PipelineDesc, ShaderModule, ShaderStage, VulkanResult, DEPTH_FORMAT,
};

/// Half the side length of the quad
pub const GRID_HALF_EXTENT: f32 = 100.0;

/// Two triangles over the four corners
pub const GRID_INDICES: [u32; 6] = [0, 1, 2, 2, 1, 3];

/// Fragment-stage parameters ("GridParams")
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GridParams {
    /// Eye position
    pub camera_pos: [f32; 3],
    /// Distance at which grid lines have faded out
    pub fade_distance: f32,
}

unsafe impl bytemuck::Pod for GridParams {}
unsafe impl bytemuck::Zeroable for GridParams {}

/// The four corners of the y = 0 plane, facing up
#[must_use]
pub fn grid_vertices() -> [Vertex; 4] {
    let e = GRID_HALF_EXTENT;
    let corner = |x: f32, z: f32, u: f32, v: f32| Vertex {
        position: [x, 0.0, z, 1.0],
        normal: [0.0, 1.0, 0.0],
        tangent: [1.0, 0.0, 0.0, 1.0],
        tex_coord: [u, v],
    };
    [
        corner(-e, -e, 0.0, 0.0),
        corner(-e, e, 0.0, 1.0),
        corner(e, -e, 1.0, 0.0),
        corner(e, e, 1.0, 1.0),
    ]
}

/// Resources the grid shaders see
#[must_use]
pub fn grid_binding_layout() -> BindingLayout {
    BindingLayout::new()
        .constant_buffer(bindings::MVP, 0, ShaderStage::Vertex)
        .constant_buffer(bindings::GRID_PARAMS, 1, ShaderStage::Fragment)
}

/// Grid mesh, pipeline and per-frame constants
pub struct Grid {
    mesh: Mesh,
    pipeline: Pipeline,
    mvp: FrameBuffered<ConstantBuffer<MvpConstants>>,
    params: FrameBuffered<ConstantBuffer<GridParams>>,
}

impl Grid {
    /// Build the grid for `frame_count` frames in flight
    ///
    /// Shaders are read from `grid.vert.spv` and `grid.frag.spv` in the
    /// configured shader directory.
    pub fn new(
        context: &GraphicsContext,
        renderer: &RendererConfig,
        color_format: vk::Format,
        frame_count: usize,
    ) -> VulkanResult<Self> {
        let mesh = Mesh::new(
            context,
            "grid",
            &grid_vertices(),
            &GRID_INDICES,
            MaterialBinding::Untextured,
        )?;

        let vertex_shader =
            ShaderModule::from_file(&context.device, renderer.shader_path("grid.vert.spv"))?;
        let fragment_shader =
            ShaderModule::from_file(&context.device, renderer.shader_path("grid.frag.spv"))?;

        // Visible from below as well
        let pipeline = Pipeline::new(
            context,
            &PipelineDesc {
                vertex_shader: &vertex_shader,
                fragment_shader: &fragment_shader,
                vertex_layout: Vertex::layout(),
                bindings: grid_binding_layout(),
                texture_table_layout: vk::DescriptorSetLayout::null(),
                color_format,
                depth_format: DEPTH_FORMAT,
                cull_mode: CullMode::None,
            },
        )?;

        let mvp = FrameBuffered::try_new(frame_count, |_| {
            ConstantBuffer::new(context, &MvpConstants::default())
        })?;
        let params = FrameBuffered::try_new(frame_count, |_| {
            ConstantBuffer::new(context, &GridParams::default())
        })?;

        log::info!("Grid created ({} frame slots)", frame_count);
        Ok(Self {
            mesh,
            pipeline,
            mvp,
            params,
        })
    }

    /// Write the frame's view-projection; the grid itself sits at the origin
    pub fn update_mvp(&self, frame: usize, view_proj: &Mat4) {
        self.mvp
            .get(frame)
            .update(&MvpConstants::new(&Mat4::identity(), view_proj));
    }

    /// Write the frame's fade parameters
    pub fn update_grid_params(&self, frame: usize, camera_pos: Vec3, fade_distance: f32) {
        self.params.get(frame).update(&GridParams {
            camera_pos: camera_pos.into(),
            fade_distance,
        });
    }

    /// Bind the grid pipeline and draw; leaves the grid pipeline bound
    pub fn draw(&self, list: &mut CommandList, frame: usize) -> VulkanResult<()> {
        list.bind_pipeline(&self.pipeline);
        list.bind_constant_buffer(&self.pipeline, bindings::MVP, self.mvp.get(frame))?;
        list.bind_constant_buffer(&self.pipeline, bindings::GRID_PARAMS, self.params.get(frame))?;
        self.mesh.draw(list, &self.pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::ResolvedBinding;

    #[test]
    fn test_quad_faces_up() {
        let v = grid_vertices();
        for tri in GRID_INDICES.chunks(3) {
            let p = |i: u32| {
                let p = v[i as usize].position;
                Vec3::new(p[0], p[1], p[2])
            };
            let normal = (p(tri[1]) - p(tri[0])).cross(&(p(tri[2]) - p(tri[0])));
            // Counter-clockwise seen from above
            assert!(normal.y > 0.0);
        }
        assert!(v.iter().all(|v| v.position[1] == 0.0));
    }

    #[test]
    fn test_binding_layout_resolves() {
        let layout = grid_binding_layout();
        assert!(layout.validate().is_ok());
        assert!(!layout.has_texture_tables());

        let resolved = layout.resolve().unwrap();
        assert_eq!(
            resolved.get(bindings::MVP),
            Some(&ResolvedBinding::ConstantBuffer { binding: 0 })
        );
        assert_eq!(
            resolved.get(bindings::GRID_PARAMS),
            Some(&ResolvedBinding::ConstantBuffer { binding: 1 })
        );
    }

    #[test]
    fn test_params_are_one_vec4() {
        assert_eq!(std::mem::size_of::<GridParams>(), 16);
    }
}
