//! Models: imported scenes turned into meshes, materials and textures
//!
//! Loading happens in two stages. [`ModelLayout`] is the CPU side: it walks
//! the imported node tree, builds one [`MeshRecord`] per mesh, resolves and
//! deduplicates texture files and computes the bounding sphere.
//! [`Model::load`] then records every texture upload onto a single command
//! list, submits it once, waits for it, and only then creates the meshes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;

use super::material::{Material, MaterialBinding};
use super::mesh::Mesh;
use super::vertex::Vertex;
use crate::assets::{self, AssetError, ImportedScene};
use crate::foundation::math::Vec3;
use crate::gpu::{
    CommandList, CommandQueue, DescriptorHeap, GraphicsContext, Pipeline, Texture, TextureData,
    VulkanError, VulkanResult,
};

/// Color of the fallback texture
const WHITE: [u8; 4] = [255, 255, 255, 255];

/// Errors raised while loading a model onto the GPU
#[derive(Error, Debug)]
pub enum ModelError {
    /// Import or texture decode failed
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Resource creation or upload failed
    #[error(transparent)]
    Vulkan(#[from] VulkanError),
}

/// Sphere enclosing every vertex of a model, in model space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Center of the axis-aligned bounds
    pub center: Vec3,
    /// Half the diagonal of the axis-aligned bounds
    pub radius: f32,
}

impl BoundingSphere {
    /// Sphere around the axis-aligned box of `points`; zero-sized when empty
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut min = Vec3::repeat(f32::MAX);
        let mut max = Vec3::repeat(f32::MIN);
        let mut any = false;

        for p in points {
            min = min.inf(&p);
            max = max.sup(&p);
            any = true;
        }

        if !any {
            return Self {
                center: Vec3::zeros(),
                radius: 0.0,
            };
        }

        Self {
            center: (min + max) * 0.5,
            radius: ((max - min) * 0.5).norm(),
        }
    }
}

/// Where a model texture comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TextureSource {
    /// An image file, path already resolved
    File(PathBuf),
    /// The shared 1x1 white fallback
    White,
}

/// CPU-side data of one mesh, ready for upload
#[derive(Debug, Clone, PartialEq)]
pub struct MeshRecord {
    /// Mesh name
    pub name: String,
    /// Interleaved vertices
    pub vertices: Vec<Vertex>,
    /// Triangle list
    pub indices: Vec<u32>,
    /// Index into [`ModelLayout::textures`]
    pub texture: usize,
}

/// Everything [`Model::load`] needs, without touching the GPU
#[derive(Debug, Clone, PartialEq)]
pub struct ModelLayout {
    meshes: Vec<MeshRecord>,
    textures: Vec<TextureSource>,
    bounds: BoundingSphere,
}

impl ModelLayout {
    /// Flatten `scene` in walk order and assign each mesh one texture
    ///
    /// Texture paths resolve against `directory`. Meshes without a usable
    /// texture share a single [`TextureSource::White`] entry, created on
    /// first need.
    #[must_use]
    pub fn from_scene(scene: &ImportedScene, directory: &Path) -> Self {
        let mut meshes = Vec::with_capacity(scene.meshes.len());
        let mut textures = Vec::new();
        let mut texture_index: HashMap<TextureSource, usize> = HashMap::new();

        for mesh_index in scene.meshes_in_walk_order() {
            let Some(mesh) = scene.meshes.get(mesh_index) else {
                log::warn!("Scene node references missing mesh {}", mesh_index);
                continue;
            };

            let source = match scene.mesh_texture(mesh_index) {
                Some(relative) => {
                    let path = resolve_texture_path(directory, relative);
                    if path.is_file() {
                        TextureSource::File(path)
                    } else {
                        log::warn!(
                            "Texture {} of mesh '{}' not found, using white",
                            path.display(),
                            mesh.name
                        );
                        TextureSource::White
                    }
                }
                None => TextureSource::White,
            };

            let texture = *texture_index.entry(source).or_insert_with_key(|source| {
                textures.push(source.clone());
                textures.len() - 1
            });

            log::debug!(
                "Mesh '{}': {} vertices, {} triangles, texture #{}",
                mesh.name,
                mesh.positions.len(),
                mesh.indices.len() / 3,
                texture
            );
            meshes.push(MeshRecord {
                name: mesh.name.clone(),
                vertices: Vertex::from_imported(mesh),
                indices: mesh.indices.clone(),
                texture,
            });
        }

        let bounds = BoundingSphere::from_points(
            meshes
                .iter()
                .flat_map(|m| m.vertices.iter())
                .map(|v| Vec3::new(v.position[0], v.position[1], v.position[2])),
        );

        Self {
            meshes,
            textures,
            bounds,
        }
    }

    /// Reject a layout the node walk left without meshes
    ///
    /// A scene can hold meshes that no node references; such a model would
    /// draw nothing and frame a zero-sized bounding sphere.
    pub fn require_meshes(self, path: &Path) -> Result<Self, AssetError> {
        if self.meshes.is_empty() {
            return Err(AssetError::EmptyScene(path.to_path_buf()));
        }
        Ok(self)
    }

    /// Meshes in draw order
    #[must_use]
    pub fn meshes(&self) -> &[MeshRecord] {
        &self.meshes
    }

    /// Distinct textures, indexed by [`MeshRecord::texture`]
    #[must_use]
    pub fn textures(&self) -> &[TextureSource] {
        &self.textures
    }

    /// Bounds over every mesh
    #[must_use]
    pub const fn bounds(&self) -> BoundingSphere {
        self.bounds
    }
}

/// Absolute paths are kept; relative ones are joined to the model's directory
#[must_use]
pub fn resolve_texture_path(directory: &Path, texture: &str) -> PathBuf {
    let path = Path::new(texture);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        directory.join(path)
    }
}

/// A model resident on the GPU
pub struct Model {
    meshes: Vec<Mesh>,
    materials: Vec<Rc<Material>>,
    textures: Vec<Rc<Texture>>,
    bounds: BoundingSphere,
}

impl Model {
    /// Import `path` and upload it
    ///
    /// Texture slots are allocated from `heap`. All uploads go through one
    /// submission on `queue`, which this call waits for before returning.
    pub fn load(
        context: &GraphicsContext,
        queue: &mut CommandQueue,
        heap: &mut DescriptorHeap,
        path: impl AsRef<Path>,
    ) -> Result<Self, ModelError> {
        let path = path.as_ref();
        log::info!("Loading model {}", path.display());

        let scene = assets::load_scene(path)?;
        let directory = path.parent().unwrap_or_else(|| Path::new(""));
        let layout = ModelLayout::from_scene(&scene, directory).require_meshes(path)?;

        let texture_data = layout
            .textures()
            .iter()
            .map(decode_texture)
            .collect::<Result<Vec<_>, _>>()?;

        let mut list = queue.get_command_list()?;
        let mut textures = upload_textures(context, &mut list, heap, &texture_data)?;
        let fence_value = queue.execute_command_list(list)?;
        queue.fence_wait(fence_value)?;
        for texture in &mut textures {
            texture.finish_upload();
        }
        log::info!(
            "{} textures uploaded in one submission (fence {})",
            textures.len(),
            fence_value
        );

        let textures: Vec<Rc<Texture>> = textures.into_iter().map(Rc::new).collect();
        let materials: Vec<Rc<Material>> = textures
            .iter()
            .map(|texture| Rc::new(Material::new(Rc::clone(texture))))
            .collect();

        let meshes = layout
            .meshes()
            .iter()
            .map(|record| {
                let material = MaterialBinding::Textured(Rc::clone(&materials[record.texture]));
                Mesh::new(context, &record.name, &record.vertices, &record.indices, material)
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        let bounds = layout.bounds();
        log::info!(
            "Model ready: {} meshes, bounds center ({:.2}, {:.2}, {:.2}) radius {:.2}",
            meshes.len(),
            bounds.center.x,
            bounds.center.y,
            bounds.center.z,
            bounds.radius
        );

        Ok(Self {
            meshes,
            materials,
            textures,
            bounds,
        })
    }

    /// Draw every mesh with `pipeline`, which must already be bound
    pub fn draw(&self, list: &mut CommandList, pipeline: &Pipeline) -> VulkanResult<()> {
        for mesh in &self.meshes {
            mesh.draw(list, pipeline)?;
        }
        log::trace!("Model drawn ({} meshes)", self.meshes.len());
        Ok(())
    }

    /// Meshes in draw order
    #[must_use]
    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    /// One material per distinct texture
    #[must_use]
    pub fn materials(&self) -> &[Rc<Material>] {
        &self.materials
    }

    /// Distinct textures, fallback included when used
    #[must_use]
    pub fn textures(&self) -> &[Rc<Texture>] {
        &self.textures
    }

    /// Model-space bounding sphere
    #[must_use]
    pub const fn bounds(&self) -> BoundingSphere {
        self.bounds
    }
}

fn decode_texture(source: &TextureSource) -> Result<TextureData, AssetError> {
    match source {
        TextureSource::White => Ok(TextureData::solid_color(WHITE)),
        TextureSource::File(path) => {
            let data = TextureData::from_file(path).map_err(|source| AssetError::Decode {
                path: path.clone(),
                source,
            })?;
            log::debug!(
                "Decoded {} ({}x{}, {} mips)",
                path.display(),
                data.width(),
                data.height(),
                data.levels().len()
            );
            Ok(data)
        }
    }
}

fn upload_textures(
    context: &GraphicsContext,
    list: &mut CommandList,
    heap: &mut DescriptorHeap,
    data: &[TextureData],
) -> VulkanResult<Vec<Texture>> {
    data.iter()
        .map(|data| {
            let slot = heap.allocate()?;
            Texture::new(context, list, heap, slot, data)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{ImportedMaterial, ImportedMesh, SceneNode};
    use approx::assert_relative_eq;

    fn mesh(name: &str, positions: Vec<[f32; 3]>, material: Option<usize>) -> ImportedMesh {
        let count = positions.len();
        ImportedMesh {
            name: name.to_string(),
            normals: vec![[0.0, 1.0, 0.0]; count],
            tangents: vec![[1.0, 0.0, 0.0, 1.0]; count],
            tex_coords: vec![[0.0, 0.0]; count],
            indices: vec![0, 1, 2],
            positions,
            material,
        }
    }

    fn triangle(name: &str, material: Option<usize>) -> ImportedMesh {
        mesh(name, vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], material)
    }

    fn material(texture: &str) -> ImportedMaterial {
        ImportedMaterial {
            name: texture.to_string(),
            diffuse_texture: Some(texture.to_string()),
            ..Default::default()
        }
    }

    fn flat_scene(meshes: Vec<ImportedMesh>, materials: Vec<ImportedMaterial>) -> ImportedScene {
        ImportedScene {
            root: SceneNode {
                name: "root".to_string(),
                meshes: (0..meshes.len()).collect(),
                children: Vec::new(),
            },
            meshes,
            materials,
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("scene_engine_model_{}_{}", std::process::id(), name));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_unit_cube_bounds() {
        let corners = (0..8).map(|i| {
            let c = |bit: i32| if i & bit == 0 { -0.5 } else { 0.5 };
            Vec3::new(c(1), c(2), c(4))
        });
        let bounds = BoundingSphere::from_points(corners);

        assert_relative_eq!(bounds.center, Vec3::zeros());
        assert_relative_eq!(bounds.radius, 3.0_f32.sqrt() / 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_bounds_span_all_meshes() {
        let scene = flat_scene(
            vec![
                mesh("a", vec![[-2.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0]], None),
                mesh("b", vec![[0.0, 0.0, 0.0], [4.0, 0.0, 0.0], [0.0, 0.0, 3.0]], None),
            ],
            Vec::new(),
        );
        let bounds = ModelLayout::from_scene(&scene, Path::new("")).bounds();

        assert_relative_eq!(bounds.center, Vec3::new(1.0, 0.5, 1.5));
        assert_relative_eq!(bounds.radius, Vec3::new(3.0, 0.5, 1.5).norm(), epsilon = 1e-6);
    }

    #[test]
    fn test_empty_bounds() {
        let bounds = BoundingSphere::from_points(std::iter::empty());
        assert_eq!(bounds.radius, 0.0);
    }

    #[test]
    fn test_untextured_meshes_share_one_white_texture() {
        let scene = flat_scene(
            vec![triangle("a", None), triangle("b", None), triangle("c", Some(0))],
            vec![ImportedMaterial::default()],
        );
        let layout = ModelLayout::from_scene(&scene, Path::new("models"));

        assert_eq!(layout.textures(), &[TextureSource::White]);
        assert!(layout.meshes().iter().all(|m| m.texture == 0));
    }

    #[test]
    fn test_textures_dedup_by_resolved_path() {
        let dir = temp_dir("dedup");
        std::fs::write(dir.join("rock.png"), b"not decoded here").unwrap();
        std::fs::write(dir.join("moss.png"), b"not decoded here").unwrap();

        let scene = flat_scene(
            vec![
                triangle("a", Some(0)),
                triangle("b", Some(1)),
                triangle("c", Some(2)),
                triangle("d", None),
            ],
            vec![material("rock.png"), material("moss.png"), material("rock.png")],
        );
        let layout = ModelLayout::from_scene(&scene, &dir);
        std::fs::remove_dir_all(&dir).ok();

        let indices: Vec<usize> = layout.meshes().iter().map(|m| m.texture).collect();
        assert_eq!(indices[0], indices[2]);
        assert_ne!(indices[0], indices[1]);
        assert_eq!(layout.textures().len(), 3);
        assert_eq!(layout.textures()[indices[3]], TextureSource::White);
        assert_eq!(layout.textures()[indices[0]], TextureSource::File(dir.join("rock.png")));
    }

    #[test]
    fn test_missing_texture_falls_back_to_white() {
        let scene = flat_scene(
            vec![triangle("a", Some(0)), triangle("b", None)],
            vec![material("does_not_exist.png")],
        );
        let layout = ModelLayout::from_scene(&scene, Path::new("/nonexistent/dir"));

        assert_eq!(layout.textures(), &[TextureSource::White]);
        assert_eq!(layout.meshes()[0].texture, layout.meshes()[1].texture);
    }

    #[test]
    fn test_meshes_follow_walk_order() {
        let mut scene = flat_scene(
            vec![triangle("first", None), triangle("second", None)],
            Vec::new(),
        );
        scene.root.meshes = vec![1];
        scene.root.children = vec![SceneNode {
            name: "child".to_string(),
            meshes: vec![0],
            children: Vec::new(),
        }];

        let layout = ModelLayout::from_scene(&scene, Path::new(""));
        let names: Vec<&str> = layout.meshes().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["second", "first"]);
    }

    #[test]
    fn test_unreferenced_meshes_are_rejected() {
        let mut scene = flat_scene(vec![triangle("orphan", None)], Vec::new());
        scene.root.meshes.clear();

        let layout = ModelLayout::from_scene(&scene, Path::new(""));
        assert!(layout.meshes().is_empty());
        assert_eq!(layout.bounds().radius, 0.0);

        let path = Path::new("models/orphan.gltf");
        let result = layout.require_meshes(path);
        assert!(matches!(result, Err(AssetError::EmptyScene(p)) if p.as_path() == path));

        let drawable = flat_scene(vec![triangle("a", None)], Vec::new());
        assert!(ModelLayout::from_scene(&drawable, Path::new(""))
            .require_meshes(path)
            .is_ok());
    }

    #[test]
    fn test_resolve_texture_path() {
        let dir = Path::new("assets/models/cat");
        assert_eq!(
            resolve_texture_path(dir, "textures/fur.png"),
            PathBuf::from("assets/models/cat/textures/fur.png")
        );

        let absolute = std::env::temp_dir().join("fur.png");
        let absolute_str = absolute.to_str().unwrap();
        assert_eq!(resolve_texture_path(dir, absolute_str), absolute);
    }

    #[test]
    fn test_undecodable_texture_is_an_error() {
        let dir = temp_dir("decode");
        let path = dir.join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let result = decode_texture(&TextureSource::File(path.clone()));
        std::fs::remove_dir_all(&dir).ok();

        assert!(matches!(result, Err(AssetError::Decode { path: p, .. }) if p == path));
        assert!(decode_texture(&TextureSource::White).is_ok());
    }
}
