//! Format-neutral imported scene

/// Triangle mesh as read from a model file
///
/// Attribute vectors are either empty (absent in the source) or have one
/// entry per position. After [`super::postprocess::finalize`] every
/// attribute is present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedMesh {
    /// Mesh name from the source file
    pub name: String,
    /// Object-space positions
    pub positions: Vec<[f32; 3]>,
    /// Unit normals
    pub normals: Vec<[f32; 3]>,
    /// Unit tangents with bitangent handedness in `w`
    pub tangents: Vec<[f32; 4]>,
    /// First UV set
    pub tex_coords: Vec<[f32; 2]>,
    /// Triangle list indices
    pub indices: Vec<u32>,
    /// Index into [`ImportedScene::materials`]
    pub material: Option<usize>,
}

/// Texture references of one source material
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportedMaterial {
    /// Material name
    pub name: String,
    /// Base-color texture path, as written in the file
    pub base_color_texture: Option<String>,
    /// Diffuse texture path, as written in the file
    pub diffuse_texture: Option<String>,
}

impl ImportedMaterial {
    /// Base-color texture, else diffuse; empty paths count as absent
    #[must_use]
    pub fn color_texture(&self) -> Option<&str> {
        self.base_color_texture
            .as_deref()
            .filter(|p| !p.is_empty())
            .or_else(|| self.diffuse_texture.as_deref().filter(|p| !p.is_empty()))
    }
}

/// Node of the scene graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneNode {
    /// Node name
    pub name: String,
    /// Indices into [`ImportedScene::meshes`]
    pub meshes: Vec<usize>,
    /// Child nodes
    pub children: Vec<SceneNode>,
}

/// Complete imported model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedScene {
    /// Root of the node tree
    pub root: SceneNode,
    /// Every mesh in the file
    pub meshes: Vec<ImportedMesh>,
    /// Every material in the file
    pub materials: Vec<ImportedMaterial>,
}

impl ImportedScene {
    /// Mesh indices in draw order: a node's own meshes, then its children, depth first
    #[must_use]
    pub fn meshes_in_walk_order(&self) -> Vec<usize> {
        fn walk(node: &SceneNode, out: &mut Vec<usize>) {
            out.extend_from_slice(&node.meshes);
            for child in &node.children {
                walk(child, out);
            }
        }

        let mut order = Vec::new();
        walk(&self.root, &mut order);
        order
    }

    /// Color texture path referenced by mesh `index`, if any
    #[must_use]
    pub fn mesh_texture(&self, index: usize) -> Option<&str> {
        let material = self.meshes.get(index)?.material?;
        self.materials.get(material)?.color_texture()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, meshes: &[usize], children: Vec<SceneNode>) -> SceneNode {
        SceneNode {
            name: name.to_string(),
            meshes: meshes.to_vec(),
            children,
        }
    }

    #[test]
    fn test_walk_is_pre_order() {
        let scene = ImportedScene {
            root: node(
                "root",
                &[3],
                vec![
                    node("a", &[0], vec![node("a1", &[4], vec![])]),
                    node("b", &[1, 2], vec![]),
                ],
            ),
            ..Default::default()
        };

        assert_eq!(scene.meshes_in_walk_order(), vec![3, 0, 4, 1, 2]);
    }

    #[test]
    fn test_instanced_mesh_visited_per_reference() {
        let scene = ImportedScene {
            root: node("root", &[], vec![node("a", &[0], vec![]), node("b", &[0], vec![])]),
            ..Default::default()
        };
        assert_eq!(scene.meshes_in_walk_order(), vec![0, 0]);
    }

    #[test]
    fn test_color_texture_preference() {
        let both = ImportedMaterial {
            name: "m".into(),
            base_color_texture: Some("base.png".into()),
            diffuse_texture: Some("diffuse.png".into()),
        };
        assert_eq!(both.color_texture(), Some("base.png"));

        let diffuse_only = ImportedMaterial {
            base_color_texture: Some(String::new()),
            diffuse_texture: Some("diffuse.png".into()),
            ..Default::default()
        };
        assert_eq!(diffuse_only.color_texture(), Some("diffuse.png"));

        assert_eq!(ImportedMaterial::default().color_texture(), None);
    }

    #[test]
    fn test_mesh_texture_lookup() {
        let scene = ImportedScene {
            meshes: vec![
                ImportedMesh {
                    material: Some(0),
                    ..Default::default()
                },
                ImportedMesh::default(),
                ImportedMesh {
                    material: Some(7),
                    ..Default::default()
                },
            ],
            materials: vec![ImportedMaterial {
                diffuse_texture: Some("rock.jpg".into()),
                ..Default::default()
            }],
            ..Default::default()
        };

        assert_eq!(scene.mesh_texture(0), Some("rock.jpg"));
        assert_eq!(scene.mesh_texture(1), None);
        assert_eq!(scene.mesh_texture(2), None);
    }
}
