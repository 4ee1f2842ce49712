//! Wavefront OBJ import through `tobj`

use std::path::Path;

use super::scene::{ImportedMaterial, ImportedMesh, ImportedScene, SceneNode};
use super::{AssetError, AssetResult};

/// Load an OBJ file and its MTL library
///
/// Faces are triangulated and attributes re-indexed to a single index
/// buffer. A missing or unreadable material library leaves every mesh
/// untextured.
pub fn load(path: &Path) -> AssetResult<ImportedScene> {
    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };

    let (models, materials) = tobj::load_obj(path, &options).map_err(|e| AssetError::Import {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let materials = match materials {
        Ok(materials) => materials
            .into_iter()
            .map(|m| ImportedMaterial {
                name: m.name,
                base_color_texture: None,
                diffuse_texture: m.diffuse_texture,
            })
            .collect(),
        Err(e) => {
            log::warn!("{}: material library not loaded ({})", path.display(), e);
            Vec::new()
        }
    };

    let mut root = SceneNode {
        name: path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        ..Default::default()
    };
    let mut meshes = Vec::with_capacity(models.len());

    for model in models {
        let mesh = convert_mesh(model);
        if mesh.indices.is_empty() {
            log::warn!("{}: skipping empty object '{}'", path.display(), mesh.name);
            continue;
        }

        root.children.push(SceneNode {
            name: mesh.name.clone(),
            meshes: vec![meshes.len()],
            children: Vec::new(),
        });
        meshes.push(mesh);
    }

    Ok(ImportedScene {
        root,
        meshes,
        materials,
    })
}

fn convert_mesh(model: tobj::Model) -> ImportedMesh {
    let mesh = model.mesh;

    ImportedMesh {
        name: model.name,
        positions: mesh
            .positions
            .chunks_exact(3)
            .map(|p| [p[0], p[1], p[2]])
            .collect(),
        normals: mesh
            .normals
            .chunks_exact(3)
            .map(|n| [n[0], n[1], n[2]])
            .collect(),
        tangents: Vec::new(),
        tex_coords: mesh
            .texcoords
            .chunks_exact(2)
            .map(|t| [t[0], t[1]])
            .collect(),
        indices: mesh.indices,
        material: mesh.material_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("scene_engine_obj_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_objects_become_child_nodes() {
        let dir = scratch_dir("objects");
        let path = dir.join("two.obj");
        std::fs::write(
            &path,
            "mtllib two.mtl\n\
             o First\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n\
             o Second\nv 0 0 1\nv 1 0 1\nv 0 1 1\nusemtl Rock\nf 4 5 6\n",
        )
        .unwrap();
        std::fs::write(dir.join("two.mtl"), "newmtl Rock\nmap_Kd textures/rock.png\n").unwrap();

        let scene = load(&path).unwrap();

        assert_eq!(scene.root.name, "two");
        assert_eq!(scene.root.children.len(), 2);
        assert_eq!(scene.meshes.len(), 2);
        assert_eq!(scene.meshes[0].name, "First");
        assert_eq!(scene.meshes[0].positions.len(), 3);
        assert_eq!(scene.meshes[0].indices, vec![0, 1, 2]);
        assert_eq!(scene.mesh_texture(0), None);
        assert_eq!(scene.mesh_texture(1), Some("textures/rock.png"));
        assert_eq!(scene.meshes_in_walk_order(), vec![0, 1]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_material_library_is_not_fatal() {
        let dir = scratch_dir("no_mtl");
        let path = dir.join("tri.obj");
        std::fs::write(&path, "mtllib missing.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();

        let scene = load(&path).unwrap();
        assert!(scene.materials.is_empty());
        assert_eq!(scene.meshes.len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_file_is_an_import_error() {
        let path = std::env::temp_dir().join("scene_engine_obj_missing/none.obj");
        assert!(matches!(load(&path), Err(AssetError::Import { .. })));
    }
}
