//! The raw triangle soup a bound is voxelized from.

use glam::{UVec3, Vec3A};
use thiserror::Error;

use crate::math::{Aabb3d, TriangleVertices as _};

/// A mesh used as input for [`Heightfield`](crate::Heightfield) rasterization.
///
/// Triangles whose surface faces up are expected to be wound counter-clockwise when viewed from above,
/// so that `(b - a) × (c - a)` points towards +y.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TriMesh {
    /// The vertices of the mesh in world space.
    /// Follows the convention of a triangle list.
    pub vertices: Vec<Vec3A>,

    /// The indices into [`TriMesh::vertices`], three per triangle.
    pub indices: Vec<UVec3>,
}

impl TriMesh {
    /// Extends the trimesh with the vertices and indices of another trimesh.
    /// The indices of `other` will be offset by the number of vertices in `self`.
    ///
    /// Fails without changing `self` if the combined mesh could not be indexed with `u32`.
    pub fn extend(&mut self, other: TriMesh) -> Result<(), TriMeshError> {
        let next_vertex_index = index_offset(self.vertices.len(), other.vertices.len())?;
        self.vertices.extend(other.vertices);
        self.indices
            .extend(other.indices.iter().map(|i| i + next_vertex_index));
        Ok(())
    }

    /// Computes the AABB of the trimesh.
    /// Returns `None` if the trimesh is empty.
    pub fn compute_aabb(&self) -> Option<Aabb3d> {
        Aabb3d::from_verts(&self.vertices)
    }

    /// The corner positions of the triangle at `index`.
    #[inline]
    pub fn triangle(&self, index: usize) -> Result<[Vec3A; 3], TriMeshError> {
        let indices = *self
            .indices
            .get(index)
            .ok_or(TriMeshError::TriangleOutOfBounds {
                triangle: index,
                triangles: self.indices.len(),
            })?;
        let vertex = |corner: u32| {
            self.vertices
                .get(corner as usize)
                .copied()
                .ok_or(TriMeshError::VertexOutOfBounds {
                    triangle: index,
                    vertex: corner,
                    vertices: self.vertices.len(),
                })
        };
        Ok([vertex(indices.x)?, vertex(indices.y)?, vertex(indices.z)?])
    }

    /// Decides for every triangle whether its slope allows walking on it.
    ///
    /// A triangle is walkable if the angle between its normal and the up vector is at most `threshold_rad`.
    /// Degenerate triangles have no normal and are never walkable.
    ///
    /// # Arguments
    ///
    /// * `threshold_rad` - The threshold angle in radians.
    pub fn walkable_triangles(&self, threshold_rad: f32) -> Result<Vec<bool>, TriMeshError> {
        let threshold_cos = threshold_rad.cos();
        (0..self.indices.len())
            .map(|i| {
                let normal = self.triangle(i)?.normal();
                Ok(normal != Vec3A::ZERO && normal.y >= threshold_cos)
            })
            .collect()
    }
}

/// The offset for indices of `added` vertices appended to `existing` ones.
fn index_offset(existing: usize, added: usize) -> Result<u32, TriMeshError> {
    let total = existing.saturating_add(added);
    if total > u32::MAX as usize {
        return Err(TriMeshError::TooManyVertices { vertices: total });
    }
    Ok(existing as u32)
}

/// Errors that can occur when accessing or combining [`TriMesh`] data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriMeshError {
    /// Happens when a triangle index is out of range.
    #[error("triangle {triangle} is out of bounds, the mesh has {triangles} triangles")]
    TriangleOutOfBounds {
        /// The requested triangle
        triangle: usize,
        /// The number of triangles in the mesh
        triangles: usize,
    },
    /// Happens when a triangle refers to a vertex the mesh does not have.
    #[error("triangle {triangle} refers to vertex {vertex}, but the mesh has {vertices} vertices")]
    VertexOutOfBounds {
        /// The triangle holding the index
        triangle: usize,
        /// The vertex index
        vertex: u32,
        /// The number of vertices in the mesh
        vertices: usize,
    },
    /// Happens when a mesh would hold more vertices than `u32` indices can address.
    #[error("a trimesh cannot hold {vertices} vertices")]
    TooManyVertices {
        /// The vertex count the mesh would have
        vertices: usize,
    },
}
