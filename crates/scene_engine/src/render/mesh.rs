//! GPU mesh: immutable vertex and index buffers plus a material binding

use super::material::MaterialBinding;
use super::vertex::Vertex;
use crate::gpu::{
    CommandList, GraphicsContext, IndexBuffer, Pipeline, VertexBuffer, VulkanError, VulkanResult,
};

/// One drawable triangle list
pub struct Mesh {
    name: String,
    vertices: VertexBuffer,
    indices: IndexBuffer,
    material: MaterialBinding,
}

impl Mesh {
    /// Upload `vertices` and `indices`
    pub fn new(
        context: &GraphicsContext,
        name: &str,
        vertices: &[Vertex],
        indices: &[u32],
        material: MaterialBinding,
    ) -> VulkanResult<Self> {
        if indices.is_empty() || indices.len() % 3 != 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Mesh '{}' has {} indices", name, indices.len()),
            });
        }

        let mesh = Self {
            name: name.to_string(),
            vertices: VertexBuffer::new(context, vertices)?,
            indices: IndexBuffer::new(context, indices)?,
            material,
        };
        log::debug!(
            "Mesh '{}' uploaded: {} vertices, {} indices",
            mesh.name,
            vertices.len(),
            indices.len()
        );
        Ok(mesh)
    }

    /// Bind the material (if any) and buffers, then issue one indexed draw
    ///
    /// `pipeline` must already be bound on `list`.
    pub fn draw(&self, list: &mut CommandList, pipeline: &Pipeline) -> VulkanResult<()> {
        if let MaterialBinding::Textured(material) = &self.material {
            material.bind(list, pipeline)?;
        }
        list.bind_vertex_buffer(&self.vertices);
        list.bind_index_buffer(&self.indices);
        list.draw_indexed(self.indices.index_count());
        Ok(())
    }

    /// Name from the source file
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Material state
    #[must_use]
    pub const fn material(&self) -> &MaterialBinding {
        &self.material
    }

    /// Number of indices drawn
    #[must_use]
    pub const fn index_count(&self) -> u32 {
        self.indices.index_count()
    }
}
