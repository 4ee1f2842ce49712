//! Geometry post-processing applied to every imported mesh

use nalgebra::{Vector2, Vector3};

use super::scene::ImportedMesh;
use super::{AssetError, AssetResult};

/// Tangent used when UVs cannot define one
pub const FALLBACK_TANGENT: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

/// Per-format post-processing options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostProcess {
    /// Replace `v` with `1 - v`
    pub flip_uvs: bool,
}

impl PostProcess {
    /// OBJ stores UVs with a bottom-left origin
    pub const OBJ: Self = Self { flip_uvs: true };
    /// glTF already uses a top-left origin
    pub const GLTF: Self = Self { flip_uvs: false };
}

/// Validate `mesh` and fill in every missing attribute
pub fn finalize(mesh: &mut ImportedMesh, options: PostProcess) -> AssetResult<()> {
    validate(mesh)?;
    let vertex_count = mesh.positions.len();

    if mesh.tex_coords.is_empty() {
        mesh.tex_coords = vec![[0.0, 0.0]; vertex_count];
    } else if options.flip_uvs {
        flip_uvs(&mut mesh.tex_coords);
    }

    if mesh.normals.is_empty() {
        mesh.normals = smooth_normals(&mesh.positions, &mesh.indices);
    }

    if mesh.tangents.is_empty() {
        mesh.tangents = tangents(&mesh.positions, &mesh.normals, &mesh.tex_coords, &mesh.indices);
    }

    Ok(())
}

fn validate(mesh: &ImportedMesh) -> AssetResult<()> {
    let invalid = |reason: String| AssetError::InvalidMesh {
        mesh: mesh.name.clone(),
        reason,
    };
    let vertex_count = mesh.positions.len();

    if vertex_count == 0 || mesh.indices.is_empty() {
        return Err(invalid("no geometry".to_string()));
    }
    if mesh.indices.len() % 3 != 0 {
        return Err(invalid(format!(
            "{} indices do not form whole triangles",
            mesh.indices.len()
        )));
    }
    if let Some(&index) = mesh.indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(invalid(format!(
            "index {index} out of range for {vertex_count} vertices"
        )));
    }

    let attribute_ok = |len: usize| len == 0 || len == vertex_count;
    if !attribute_ok(mesh.normals.len())
        || !attribute_ok(mesh.tangents.len())
        || !attribute_ok(mesh.tex_coords.len())
    {
        return Err(invalid("attribute count differs from position count".to_string()));
    }
    Ok(())
}

/// `v = 1 - v` for every coordinate
pub fn flip_uvs(tex_coords: &mut [[f32; 2]]) {
    for uv in tex_coords {
        uv[1] = 1.0 - uv[1];
    }
}

/// Area-weighted vertex normals
#[must_use]
pub fn smooth_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut accumulated = vec![Vector3::<f32>::zeros(); positions.len()];

    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        let p0 = Vector3::from(positions[a]);
        let p1 = Vector3::from(positions[b]);
        let p2 = Vector3::from(positions[c]);
        // Unnormalized cross product weights by twice the triangle area
        let face = (p1 - p0).cross(&(p2 - p0));
        accumulated[a] += face;
        accumulated[b] += face;
        accumulated[c] += face;
    }

    accumulated
        .into_iter()
        .map(|n| {
            n.try_normalize(f32::EPSILON)
                .unwrap_or_else(Vector3::y)
                .into()
        })
        .collect()
}

/// Per-vertex tangents from UV gradients, orthogonalized against the normal
#[must_use]
pub fn tangents(
    positions: &[[f32; 3]],
    normals: &[[f32; 3]],
    tex_coords: &[[f32; 2]],
    indices: &[u32],
) -> Vec<[f32; 4]> {
    let mut tangent_sums = vec![Vector3::<f32>::zeros(); positions.len()];
    let mut bitangent_sums = vec![Vector3::<f32>::zeros(); positions.len()];

    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        let edge1 = Vector3::from(positions[b]) - Vector3::from(positions[a]);
        let edge2 = Vector3::from(positions[c]) - Vector3::from(positions[a]);
        let duv1 = Vector2::from(tex_coords[b]) - Vector2::from(tex_coords[a]);
        let duv2 = Vector2::from(tex_coords[c]) - Vector2::from(tex_coords[a]);

        let det = duv1.x * duv2.y - duv2.x * duv1.y;
        if det.abs() <= f32::EPSILON {
            continue;
        }
        let r = 1.0 / det;
        let tangent = (edge1 * duv2.y - edge2 * duv1.y) * r;
        let bitangent = (edge2 * duv1.x - edge1 * duv2.x) * r;

        for vertex in [a, b, c] {
            tangent_sums[vertex] += tangent;
            bitangent_sums[vertex] += bitangent;
        }
    }

    normals
        .iter()
        .zip(tangent_sums.iter().zip(&bitangent_sums))
        .map(|(normal, (tangent, bitangent))| {
            let n = Vector3::from(*normal);
            // Gram-Schmidt
            let Some(t) = (tangent - n * n.dot(tangent)).try_normalize(f32::EPSILON) else {
                return FALLBACK_TANGENT;
            };
            let handedness = if n.cross(&t).dot(bitangent) < 0.0 {
                -1.0
            } else {
                1.0
            };
            [t.x, t.y, t.z, handedness]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quad() -> ImportedMesh {
        ImportedMesh {
            name: "quad".into(),
            positions: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            tex_coords: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            indices: vec![0, 1, 2, 0, 2, 3],
            ..Default::default()
        }
    }

    #[test]
    fn test_smooth_normals_of_flat_quad() {
        let mesh = quad();
        let normals = smooth_normals(&mesh.positions, &mesh.indices);

        for n in normals {
            assert_relative_eq!(Vector3::from(n), Vector3::z(), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_smooth_normals_are_area_weighted() {
        // Two triangles share vertex 0: a large one facing +Z, a small one facing +X
        let positions = [
            [0.0, 0.0, 0.0],
            [4.0, 0.0, 0.0],
            [0.0, 4.0, 0.0],
            [0.0, 0.1, 0.0],
            [0.0, 0.0, 0.1],
        ];
        let indices = [0, 1, 2, 0, 3, 4];
        let normals = smooth_normals(&positions, &indices);

        let shared = Vector3::from(normals[0]);
        assert!(shared.z > 0.99);
        assert_relative_eq!(shared.norm(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_unreferenced_vertex_gets_up_normal() {
        let normals = smooth_normals(&[[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [5.0; 3]], &[0, 1, 2]);
        assert_eq!(normals[3], [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_tangents_follow_u_direction() {
        let mut mesh = quad();
        finalize(&mut mesh, PostProcess::GLTF).unwrap();

        for tangent in &mesh.tangents {
            assert_relative_eq!(tangent[0], 1.0, epsilon = 1e-6);
            assert_relative_eq!(tangent[1], 0.0, epsilon = 1e-6);
            // Right-handed: N x T = +Y, which matches the V direction
            assert_relative_eq!(tangent[3], 1.0);
        }
    }

    #[test]
    fn test_mirrored_uvs_flip_handedness() {
        let mut mesh = quad();
        mesh.tex_coords = vec![[1.0, 0.0], [0.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        finalize(&mut mesh, PostProcess::GLTF).unwrap();

        for tangent in &mesh.tangents {
            assert_relative_eq!(tangent[0], -1.0, epsilon = 1e-6);
            assert_relative_eq!(tangent[3], -1.0);
        }

        let mut mesh = quad();
        mesh.tex_coords = vec![[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];
        finalize(&mut mesh, PostProcess::GLTF).unwrap();
        for tangent in &mesh.tangents {
            assert_relative_eq!(tangent[3], -1.0);
        }
    }

    #[test]
    fn test_missing_uvs_use_fallback_tangent() {
        let mut mesh = quad();
        mesh.tex_coords.clear();
        finalize(&mut mesh, PostProcess::OBJ).unwrap();

        assert_eq!(mesh.tex_coords, vec![[0.0, 0.0]; 4]);
        assert!(mesh.tangents.iter().all(|t| *t == FALLBACK_TANGENT));
    }

    #[test]
    fn test_obj_uvs_flipped_once() {
        let mut mesh = quad();
        finalize(&mut mesh, PostProcess::OBJ).unwrap();
        assert_eq!(mesh.tex_coords[0], [0.0, 1.0]);
        assert_eq!(mesh.tex_coords[2], [1.0, 0.0]);
    }

    #[test]
    fn test_provided_attributes_kept() {
        let mut mesh = quad();
        mesh.normals = vec![[0.0, 1.0, 0.0]; 4];
        mesh.tangents = vec![[0.0, 0.0, 1.0, -1.0]; 4];
        finalize(&mut mesh, PostProcess::GLTF).unwrap();

        assert_eq!(mesh.normals[0], [0.0, 1.0, 0.0]);
        assert_eq!(mesh.tangents[0], [0.0, 0.0, 1.0, -1.0]);
    }

    #[test]
    fn test_invalid_meshes_rejected() {
        let mut out_of_range = quad();
        out_of_range.indices[5] = 9;
        assert!(finalize(&mut out_of_range, PostProcess::OBJ).is_err());

        let mut partial = quad();
        partial.indices.pop();
        assert!(finalize(&mut partial, PostProcess::OBJ).is_err());

        let mut mismatched = quad();
        mismatched.normals = vec![[0.0, 0.0, 1.0]; 3];
        assert!(finalize(&mut mismatched, PostProcess::OBJ).is_err());

        assert!(finalize(&mut ImportedMesh::default(), PostProcess::OBJ).is_err());
    }
}
