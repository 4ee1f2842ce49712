//! Materials: what a mesh binds before it draws

use std::rc::Rc;

use super::bindings;
use crate::gpu::{CommandList, Pipeline, Texture, VulkanResult};

/// A base-color texture bound to the "BaseColorTexture" table
///
/// The texture is shared: every material created for the same file holds
/// the same [`Texture`].
pub struct Material {
    texture: Rc<Texture>,
}

impl Material {
    /// Wrap a shared texture
    #[must_use]
    pub fn new(texture: Rc<Texture>) -> Self {
        Self { texture }
    }

    /// The texture this material samples
    #[must_use]
    pub fn texture(&self) -> &Rc<Texture> {
        &self.texture
    }

    /// Bind the texture's heap slot to `pipeline`'s base-color table
    pub fn bind(&self, list: &mut CommandList, pipeline: &Pipeline) -> VulkanResult<()> {
        list.bind_texture_table(
            pipeline,
            bindings::BASE_COLOR_TEXTURE,
            self.texture.descriptor_set(),
        )
    }
}

/// Material state of a mesh
#[derive(Clone, Default)]
pub enum MaterialBinding {
    /// Draws with whatever the pipeline needs and nothing else
    #[default]
    Untextured,
    /// Binds this material first
    Textured(Rc<Material>),
}

impl MaterialBinding {
    /// The material, when textured
    #[must_use]
    pub fn material(&self) -> Option<&Rc<Material>> {
        match self {
            Self::Untextured => None,
            Self::Textured(material) => Some(material),
        }
    }
}
