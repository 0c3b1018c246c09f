use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::{
    config::NavmeshConfig,
    contours::ContourSet,
    heightfield::{HeightfieldBuilder, HeightfieldBuilderError},
    math::Aabb3d,
    open_heightfield::OpenHeightfield,
    pathfinding::NavGraph,
    poly_mesh::PolygonMesh,
    rasterize::RasterizationError,
    region::RegionBuildError,
    registry::{BoundId, NodeRef, NodeRefError},
    trimesh::TriMesh,
};

/// Everything built for one bound. Replaced as a whole when the bound is rebuilt.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavmeshBundle {
    /// The bound this navmesh was built for.
    pub bound_id: BoundId,
    /// The world space box the navmesh covers.
    pub bounds: Aabb3d,
    /// The walkable space with its regions.
    pub open_heightfield: OpenHeightfield,
    /// The simplified region outlines.
    pub contours: ContourSet,
    /// The convex polygons of the navmesh.
    pub polygon_mesh: PolygonMesh,
    /// The graph the pathfinding runs on.
    pub graph: NavGraph,
    /// One reference per polygon, indexed like [`PolygonMesh::polygons`].
    pub node_refs: Vec<NodeRef>,
}

/// Builds the navmesh of a bound from its geometry.
///
/// The geometry is voxelized, partitioned into regions, outlined and turned into convex polygons, which
/// are then connected into a [`NavGraph`].
pub fn build_navmesh(
    bound_id: BoundId,
    bounds: Aabb3d,
    trimesh: &TriMesh,
    config: &NavmeshConfig,
) -> Result<NavmeshBundle, NavmeshBuildError> {
    build_navmesh_cancellable(bound_id, bounds, trimesh, config, &AtomicBool::new(false))
}

/// Same as [`build_navmesh`], but gives up with [`NavmeshBuildError::Cancelled`] once `cancel` is set.
///
/// The flag is checked between the build stages.
pub fn build_navmesh_cancellable(
    bound_id: BoundId,
    bounds: Aabb3d,
    trimesh: &TriMesh,
    config: &NavmeshConfig,
    cancel: &AtomicBool,
) -> Result<NavmeshBundle, NavmeshBuildError> {
    let check_cancelled = || {
        if cancel.load(Ordering::Relaxed) {
            tracing::debug!(bound = bound_id.0, "navmesh build cancelled");
            Err(NavmeshBuildError::Cancelled)
        } else {
            Ok(())
        }
    };

    if trimesh.indices.is_empty() {
        tracing::warn!(bound = bound_id.0, "bound contains no geometry, the navmesh will be empty");
    }

    let mut heightfield = HeightfieldBuilder {
        aabb: bounds,
        cell_size: config.cell_size,
        cell_height: config.cell_height,
    }
    .build()?;
    heightfield.populate_from_trimesh(
        trimesh,
        config.walkable_slope_angle,
        config.agent_height,
        config.max_ledge_height,
    )?;
    check_cancelled()?;

    let mut open_heightfield =
        OpenHeightfield::from_heightfield(&heightfield, config.agent_height, config.max_ledge_height);
    check_cancelled()?;

    open_heightfield.build_regions(config.traversable_border_size, config.min_spans_for_regions)?;
    check_cancelled()?;

    let contours = open_heightfield
        .build_contours(config.contour_deviation_threshold, config.max_edge_length);
    check_cancelled()?;

    let polygon_mesh = contours
        .clone()
        .into_polygon_mesh(config.max_vertices_per_polygon);
    check_cancelled()?;

    let graph = NavGraph::from_polygon_mesh(&polygon_mesh);
    let node_refs = (0..polygon_mesh.polygons.len())
        .map(|polygon| NodeRef::new(bound_id, polygon))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        bound = bound_id.0,
        regions = open_heightfield.regions.len(),
        contours = contours.contours.len(),
        polygons = polygon_mesh.polygons.len(),
        "built navmesh"
    );
    Ok(NavmeshBundle {
        bound_id,
        bounds,
        open_heightfield,
        contours,
        polygon_mesh,
        graph,
        node_refs,
    })
}

/// Errors that can occur when building a [`NavmeshBundle`].
#[derive(Error, Debug)]
pub enum NavmeshBuildError {
    /// Happens when the bound cannot be voxelized at the configured resolution.
    #[error(transparent)]
    Heightfield(#[from] HeightfieldBuilderError),
    /// Happens when the geometry cannot be rasterized.
    #[error(transparent)]
    Rasterization(#[from] RasterizationError),
    /// Happens when the walkable space cannot be partitioned into regions.
    #[error(transparent)]
    Regions(#[from] RegionBuildError),
    /// Happens when a polygon cannot be referenced.
    #[error(transparent)]
    NodeRef(#[from] NodeRefError),
    /// Happens when the build was cancelled before it finished.
    #[error("navmesh build was cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use glam::{UVec3, Vec3A};

    use crate::config::NavmeshConfigBuilder;

    use super::*;

    fn plane() -> TriMesh {
        TriMesh {
            vertices: vec![
                Vec3A::new(0.0, 0.0, 0.0),
                Vec3A::new(0.0, 0.0, 6.0),
                Vec3A::new(6.0, 0.0, 6.0),
                Vec3A::new(6.0, 0.0, 0.0),
            ],
            indices: vec![UVec3::new(0, 1, 2), UVec3::new(0, 2, 3)],
        }
    }

    fn bounds() -> Aabb3d {
        Aabb3d {
            min: Vec3A::new(0.0, -1.0, 0.0),
            max: Vec3A::new(6.0, 3.0, 6.0),
        }
    }

    fn config() -> NavmeshConfig {
        NavmeshConfigBuilder {
            cell_size: 0.5,
            cell_height: 0.25,
            agent_height: 1.0,
            agent_radius: 0.0,
            max_ledge_height: 0.5,
            min_region_size: 0.5,
            ..Default::default()
        }
        .build()
        .unwrap()
    }

    #[test]
    fn plane_builds_polygons_with_refs() {
        let bundle = build_navmesh(BoundId(3), bounds(), &plane(), &config()).unwrap();
        assert!(!bundle.polygon_mesh.polygons.is_empty());
        assert_eq!(bundle.node_refs.len(), bundle.polygon_mesh.polygons.len());
        for (i, node_ref) in bundle.node_refs.iter().enumerate() {
            assert_eq!(node_ref.bound_id(), BoundId(3));
            assert_eq!(node_ref.polygon_index(), i as u32);
        }
        assert_eq!(bundle.graph.nodes.len(), bundle.polygon_mesh.vertices.len());
    }

    #[test]
    fn empty_geometry_builds_empty_navmesh() {
        let bundle = build_navmesh(BoundId(0), bounds(), &TriMesh::default(), &config()).unwrap();
        assert!(bundle.polygon_mesh.polygons.is_empty());
        assert!(bundle.open_heightfield.spans.is_empty());
    }

    #[test]
    fn cancelled_build_stops() {
        let cancel = AtomicBool::new(true);
        let result = build_navmesh_cancellable(BoundId(0), bounds(), &plane(), &config(), &cancel);
        assert!(matches!(result, Err(NavmeshBuildError::Cancelled)));
    }
}
