//! Scene import
//!
//! Model files are read into a format-neutral [`ImportedScene`]: a node tree
//! referencing a flat list of triangle meshes plus a material table exposing
//! base-color/diffuse texture paths. Every mesh leaves [`load_scene`] fully
//! post-processed: triangulated, with normals, tangents (handedness in `w`)
//! and top-left-origin UVs.

pub mod gltf_import;
pub mod obj_import;
pub mod postprocess;
pub mod scene;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use postprocess::PostProcess;
pub use scene::{ImportedMaterial, ImportedMesh, ImportedScene, SceneNode};

/// Errors raised while importing a model
#[derive(Error, Debug)]
pub enum AssetError {
    /// File could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Offending file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Importer rejected the file
    #[error("Failed to import {path}: {reason}")]
    Import {
        /// Offending file
        path: PathBuf,
        /// Importer message
        reason: String,
    },

    /// Image file exists but could not be decoded
    #[error("Failed to decode texture {path}: {source}")]
    Decode {
        /// Offending image
        path: PathBuf,
        /// Decoder error
        #[source]
        source: image::ImageError,
    },

    /// Mesh data is inconsistent
    #[error("Mesh '{mesh}' is invalid: {reason}")]
    InvalidMesh {
        /// Mesh name
        mesh: String,
        /// What is wrong with it
        reason: String,
    },

    /// File extension has no importer
    #[error("Unsupported model format: {0}")]
    UnsupportedFormat(PathBuf),

    /// File imported but contained no drawable meshes
    #[error("Scene {0} contains no meshes")]
    EmptyScene(PathBuf),
}

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;

/// Import `path`, choosing the importer from the file extension
pub fn load_scene(path: impl AsRef<Path>) -> AssetResult<ImportedScene> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let (mut scene, options) = match extension.as_deref() {
        Some("obj") => (obj_import::load(path)?, PostProcess::OBJ),
        Some("gltf" | "glb") => (gltf_import::load(path)?, PostProcess::GLTF),
        _ => return Err(AssetError::UnsupportedFormat(path.to_path_buf())),
    };

    for mesh in &mut scene.meshes {
        postprocess::finalize(mesh, options)?;
    }

    if scene.meshes.is_empty() {
        return Err(AssetError::EmptyScene(path.to_path_buf()));
    }

    log::info!(
        "Imported {}: {} meshes, {} materials",
        path.display(),
        scene.meshes.len(),
        scene.materials.len()
    );
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_extension() {
        let result = load_scene("model.fbx");
        assert!(matches!(result, Err(AssetError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_obj_scene_is_post_processed() {
        let dir = std::env::temp_dir().join("scene_engine_load_scene");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("quad.obj");
        std::fs::write(
            &path,
            "o Quad\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\nf 1/1 2/2 3/3 4/4\n",
        )
        .unwrap();

        let scene = load_scene(&path).unwrap();
        let mesh = &scene.meshes[0];

        assert_eq!(mesh.indices.len(), 6);
        assert_eq!(mesh.normals.len(), mesh.positions.len());
        assert_eq!(mesh.tangents.len(), mesh.positions.len());
        // OBJ UVs are flipped to a top-left origin
        let first = mesh
            .positions
            .iter()
            .position(|p| *p == [0.0, 0.0, 0.0])
            .unwrap();
        assert_eq!(mesh.tex_coords[first], [0.0, 1.0]);

        std::fs::remove_dir_all(&dir).ok();
    }
}
