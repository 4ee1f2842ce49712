//! glTF 2.0 import through the `gltf` crate
//!
//! Each primitive becomes its own mesh. Node transforms are not applied;
//! meshes are drawn in their local space like every other imported format.

use std::collections::HashMap;
use std::path::Path;

use ::gltf::image::Source;
use ::gltf::mesh::Mode;

use super::scene::{ImportedMaterial, ImportedMesh, ImportedScene, SceneNode};
use super::{AssetError, AssetResult};

/// Load a `.gltf` or `.glb` file and its external buffers
pub fn load(path: &Path) -> AssetResult<ImportedScene> {
    let import_error = |reason: String| AssetError::Import {
        path: path.to_path_buf(),
        reason,
    };

    let gltf = ::gltf::Gltf::open(path).map_err(|e| import_error(e.to_string()))?;
    let base = path.parent();
    let buffers = ::gltf::import_buffers(&gltf.document, base, gltf.blob.clone())
        .map_err(|e| import_error(e.to_string()))?;
    let document = gltf.document;

    let materials = document.materials().map(|m| convert_material(path, &m)).collect();

    let mut meshes = Vec::new();
    // glTF mesh index -> imported primitive indices
    let mut primitives_of: HashMap<usize, Vec<usize>> = HashMap::new();

    for mesh in document.meshes() {
        let mesh_name = mesh
            .name()
            .map_or_else(|| format!("mesh{}", mesh.index()), str::to_string);

        for primitive in mesh.primitives() {
            let name = format!("{mesh_name}/{}", primitive.index());
            match convert_primitive(&primitive, &buffers, name) {
                Some(imported) => {
                    primitives_of.entry(mesh.index()).or_default().push(meshes.len());
                    meshes.push(imported);
                }
                None => log::warn!(
                    "{}: skipping primitive {} of '{}' ({:?})",
                    path.display(),
                    primitive.index(),
                    mesh_name,
                    primitive.mode()
                ),
            }
        }
    }

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| import_error("file defines no scene".to_string()))?;

    let root = SceneNode {
        name: scene.name().unwrap_or("scene").to_string(),
        meshes: Vec::new(),
        children: scene
            .nodes()
            .map(|node| convert_node(&node, &primitives_of))
            .collect(),
    };

    Ok(ImportedScene {
        root,
        meshes,
        materials,
    })
}

fn convert_material(path: &Path, material: &::gltf::Material<'_>) -> ImportedMaterial {
    let name = material.name().unwrap_or_default().to_string();
    let base_color_texture = material
        .pbr_metallic_roughness()
        .base_color_texture()
        .and_then(|info| match info.texture().source().source() {
            Source::Uri { uri, .. } => Some(uri.to_string()),
            Source::View { .. } => {
                log::warn!(
                    "{}: embedded image in material '{}' is not supported",
                    path.display(),
                    name
                );
                None
            }
        });

    ImportedMaterial {
        name,
        base_color_texture,
        diffuse_texture: None,
    }
}

fn convert_primitive(
    primitive: &::gltf::Primitive<'_>,
    buffers: &[::gltf::buffer::Data],
    name: String,
) -> Option<ImportedMesh> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data.0[..]));
    let positions: Vec<[f32; 3]> = reader.read_positions()?.collect();

    let raw_indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };
    let indices = triangulate(primitive.mode(), &raw_indices)?;

    Some(ImportedMesh {
        name,
        normals: reader
            .read_normals()
            .map(Iterator::collect)
            .unwrap_or_default(),
        tangents: reader
            .read_tangents()
            .map(Iterator::collect)
            .unwrap_or_default(),
        tex_coords: reader
            .read_tex_coords(0)
            .map(|uvs| uvs.into_f32().collect())
            .unwrap_or_default(),
        positions,
        indices,
        material: primitive.material().index(),
    })
}

/// Convert strip and fan index streams to a triangle list; other modes are unsupported
fn triangulate(mode: Mode, indices: &[u32]) -> Option<Vec<u32>> {
    match mode {
        Mode::Triangles => Some(indices.to_vec()),
        Mode::TriangleStrip => Some(
            indices
                .windows(3)
                .enumerate()
                .flat_map(|(i, w)| {
                    // Every other triangle is wound the other way
                    if i % 2 == 0 {
                        [w[0], w[1], w[2]]
                    } else {
                        [w[1], w[0], w[2]]
                    }
                })
                .collect(),
        ),
        Mode::TriangleFan => Some(
            indices
                .windows(2)
                .skip(1)
                .flat_map(|w| [indices[0], w[0], w[1]])
                .collect(),
        ),
        _ => None,
    }
}

fn convert_node(node: &::gltf::Node<'_>, primitives_of: &HashMap<usize, Vec<usize>>) -> SceneNode {
    SceneNode {
        name: node
            .name()
            .map_or_else(|| format!("node{}", node.index()), str::to_string),
        meshes: node
            .mesh()
            .and_then(|mesh| primitives_of.get(&mesh.index()).cloned())
            .unwrap_or_default(),
        children: node
            .children()
            .map(|child| convert_node(&child, primitives_of))
            .collect(),
    }
}
