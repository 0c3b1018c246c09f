//! Point projection and pathfinding on a built [`NavmeshBundle`].

use glam::Vec3A;
use thiserror::Error;

use crate::{
    main_api::NavmeshBundle,
    registry::{BoundId, NodeRef},
};

/// The dimensions of the agent a query is made for.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentProperties {
    /// The radius of the agent. `[Units: wu]`
    pub radius: f32,
    /// The height of the agent. `[Units: wu]`
    pub height: f32,
}

impl Default for AgentProperties {
    fn default() -> Self {
        Self {
            radius: 0.6,
            height: 2.0,
        }
    }
}

/// The result of projecting a point onto the navmesh.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PointProjection {
    /// The index of the polygon the point was projected onto.
    pub polygon: usize,
    /// The reference of that polygon.
    pub node_ref: NodeRef,
    /// The projected point on the polygon.
    pub position: Vec3A,
}

/// Errors that can occur when querying a navmesh.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Happens when no polygon or bound lies near enough to the point.
    #[error("no navmesh polygon found near {point}")]
    NotFound {
        /// The point that was looked up
        point: Vec3A,
    },
    /// Happens when start and end lie on parts of the navmesh that are not connected.
    #[error("no path found")]
    PathNotFound,
    /// Happens when the bound has no navmesh yet.
    #[error("{bound_id} has no navmesh")]
    UnknownBound {
        /// The bound that was looked up
        bound_id: BoundId,
    },
}

impl NavmeshBundle {
    /// Projects `point` onto the nearest polygon whose closest point lies within `extent` of it on every axis.
    pub fn project_point(&self, point: Vec3A, extent: Vec3A) -> Result<PointProjection, QueryError> {
        let mesh = &self.polygon_mesh;
        let mut best: Option<(f32, usize, Vec3A)> = None;
        for polygon in 0..mesh.polygons.len() {
            let closest = mesh.closest_point_on_polygon(polygon, point);
            if (closest - point).abs().cmpgt(extent).any() {
                continue;
            }
            let distance = closest.distance_squared(point);
            if best.is_none_or(|(best_distance, _, _)| distance < best_distance) {
                best = Some((distance, polygon, closest));
            }
        }

        let (_, polygon, position) = best.ok_or(QueryError::NotFound { point })?;
        let node_ref = self
            .node_refs
            .get(polygon)
            .copied()
            .ok_or(QueryError::NotFound { point })?;
        Ok(PointProjection {
            polygon,
            node_ref,
            position,
        })
    }

    /// Finds a path from `start` to `end` for the given agent.
    ///
    /// The path starts at `start` and ends at `end`, with the navmesh vertices to walk along in between.
    /// If both points lie on the same polygon, the path is a straight line.
    pub fn find_path(
        &self,
        agent: &AgentProperties,
        start: Vec3A,
        end: Vec3A,
    ) -> Result<Vec<Vec3A>, QueryError> {
        let horizontal = agent.radius.max(self.polygon_mesh.cell_size);
        let extent = Vec3A::new(horizontal, agent.height, horizontal);
        let from = self.project_point(start, extent)?;
        let to = self.project_point(end, extent)?;

        if from.polygon == to.polygon {
            return Ok(vec![from.position, to.position]);
        }

        let polygons = &self.polygon_mesh.polygons;
        self.graph
            .find_path(
                from.position,
                &polygons[from.polygon].vertices,
                to.position,
                &polygons[to.polygon].vertices,
            )
            .ok_or_else(|| {
                tracing::trace!(%start, %end, "start and end are not connected");
                QueryError::PathNotFound
            })
    }
}
