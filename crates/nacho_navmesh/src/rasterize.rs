//! Contains methods for rasterizing the triangles of a [`TriMesh`] into a [`Heightfield`].

use glam::Vec3A;
use thiserror::Error;

use crate::{
    heightfield::{Heightfield, SpanInsertion, SpanInsertionError},
    math::{Aabb3d, TriangleVertices as _, triangle_intersects_box},
    span::SpanBuilder,
    trimesh::{TriMesh, TriMeshError},
};

impl Heightfield {
    /// Rasterizes the triangles of a [`TriMesh`] into the heightfield and then revokes walkability
    /// from every span an agent cannot stand on.
    ///
    /// # Arguments
    ///
    /// - `trimesh` - The [`TriMesh`] to rasterize.
    /// - `walkable_slope_angle` - The steepest walkable slope. [Units: Radians]
    /// - `agent_height` - Minimum head clearance above a walkable span. [Units: wu]
    /// - `max_ledge_height` - Maximum drop to a neighbouring column. [Units: wu]
    pub fn populate_from_trimesh(
        &mut self,
        trimesh: &TriMesh,
        walkable_slope_angle: f32,
        agent_height: f32,
        max_ledge_height: f32,
    ) -> Result<(), RasterizationError> {
        let walkable = trimesh.walkable_triangles(walkable_slope_angle)?;
        for (i, walkable) in walkable.into_iter().enumerate() {
            self.rasterize_triangle(trimesh.triangle(i)?, walkable)?;
        }
        tracing::debug!(
            triangles = trimesh.indices.len(),
            spans = self.allocated_spans.len(),
            "rasterized trimesh"
        );
        self.filter_unwalkable_spans(agent_height, max_ledge_height);
        Ok(())
    }

    /// Adds a unit span to every cell whose box the triangle touches.
    /// A triangle lying exactly on a slab boundary touches the slabs on both sides.
    ///
    /// Triangles outside the heightfield's AABB contribute nothing.
    pub fn rasterize_triangle(
        &mut self,
        triangle: [Vec3A; 3],
        walkable: bool,
    ) -> Result<(), RasterizationError> {
        if self.slabs == 0 {
            return Ok(());
        }
        let bounds = triangle.aabb();
        if bounds.max.cmplt(self.aabb.min).any() || bounds.min.cmpgt(self.aabb.max).any() {
            return Ok(());
        }
        let min = bounds.min.max(self.aabb.min) - self.aabb.min;
        let max = bounds.max.min(self.aabb.max) - self.aabb.min;

        let (x_start, x_end) = cell_range(min.x / self.cell_size, max.x / self.cell_size, self.width);
        let (z_start, z_end) = cell_range(min.z / self.cell_size, max.z / self.cell_size, self.depth);
        let k_start = ((min.y / self.cell_height).ceil() as i64 - 1).clamp(0, self.slabs as i64 - 1);
        let k_end = ((max.y / self.cell_height).floor() as i64).clamp(0, self.slabs as i64 - 1);

        let cell_extent = Vec3A::new(self.cell_size, self.cell_height, self.cell_size);
        for z in z_start..z_end {
            for x in x_start..x_end {
                for k in k_start..=k_end {
                    let cell_min =
                        self.aabb.min + Vec3A::new(x as f32, k as f32, z as f32) * cell_extent;
                    let cell = Aabb3d {
                        min: cell_min,
                        max: cell_min + cell_extent,
                    };
                    if !triangle_intersects_box(triangle, &cell) {
                        continue;
                    }
                    self.add_span(SpanInsertion {
                        x,
                        z,
                        span: SpanBuilder {
                            min: k as u16,
                            max: k as u16 + 1,
                            walkable,
                            next: None,
                        }
                        .build(),
                    })?;
                }
            }
        }
        Ok(())
    }
}

/// Cells `floor(min)..ceil(max)` clipped to the grid, covering at least one cell.
fn cell_range(min: f32, max: f32, cells: u16) -> (u16, u16) {
    let start = min.floor() as i64;
    let end = (max.ceil() as i64).max(start + 1);
    (
        start.clamp(0, cells as i64) as u16,
        end.clamp(0, cells as i64) as u16,
    )
}

/// Errors that can occur when rasterizing a [`TriMesh`] into a [`Heightfield`].
#[derive(Error, Debug)]
pub enum RasterizationError {
    /// A computed span did not fit into the heightfield.
    #[error(transparent)]
    SpanInsertion(#[from] SpanInsertionError),
    /// The trimesh refers to triangles or vertices it does not have.
    #[error(transparent)]
    TriMesh(#[from] TriMeshError),
}
