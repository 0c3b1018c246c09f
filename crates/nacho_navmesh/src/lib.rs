#![doc = include_str!("../../../readme.md")]

mod config;
mod contours;
mod heightfield;
mod main_api;
pub(crate) mod math;
mod null_region_borders;
mod open_heightfield;
mod open_span;
mod pathfinding;
mod poly_mesh;
mod query;
mod rasterize;
mod region;
mod registry;
mod span;
mod trimesh;
mod watershed;

pub use config::{NavmeshConfig, NavmeshConfigBuilder, NavmeshConfigError};
pub use contours::{Contour, ContourSet, ContourVertex};
pub use heightfield::{Heightfield, HeightfieldBuilder, HeightfieldBuilderError, SpanInsertionError};
pub use main_api::{NavmeshBuildError, NavmeshBundle, build_navmesh, build_navmesh_cancellable};
pub use math::Aabb3d;
pub use open_heightfield::OpenHeightfield;
pub use open_span::{OpenCell, OpenSpan, OpenSpanFlags};
pub use pathfinding::{NavGraph, NavNode};
pub use poly_mesh::{Polygon, PolygonMesh};
pub use query::{AgentProperties, PointProjection, QueryError};
pub use rasterize::RasterizationError;
pub use region::{Region, RegionBuildError, RegionId, RegionIdCounter};
pub use registry::{BoundId, BuildTicket, NavmeshRegistry, NodeRef, NodeRefError, RegistryError};
pub use span::{Span, SpanKey, Spans};
pub use trimesh::{TriMesh, TriMeshError};
