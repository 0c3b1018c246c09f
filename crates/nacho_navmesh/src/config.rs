#[cfg(feature = "bevy_reflect")]
use bevy_reflect::prelude::*;
use thiserror::Error;

/// Specifies a configuration to use when building a navmesh. Usually built using [`NavmeshConfigBuilder`].
///
/// Values in world units (wu) are used as given. Values in voxels (vx) are derived from the builder by
/// dividing through [`Self::cell_size`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "bevy_reflect", derive(Reflect))]
#[cfg_attr(
    all(feature = "serialize", feature = "bevy_reflect"),
    reflect(Serialize, Deserialize)
)]
pub struct NavmeshConfig {
    /// The xz-plane cell size to use for fields. `[Limit: > 0] [Units: wu]`
    pub cell_size: f32,

    /// The y-axis cell size to use for fields. `[Limit: > 0] [Units: wu]`
    pub cell_height: f32,

    /// The maximum slope that is considered walkable. `[Limits: 0 <= value <= 0.5*π] [Units: Radians]`
    pub walkable_slope_angle: f32,

    /// Minimum floor to ceiling height that will still allow the floor area to be considered walkable.
    /// `[Limit: >= 0] [Units: wu]`
    pub agent_height: f32,

    /// The radius of the agent. `[Limit: >= 0] [Units: wu]`
    pub agent_radius: f32,

    /// Maximum ledge height that is considered to still be traversable. `[Limit: >= 0] [Units: wu]`
    pub max_ledge_height: f32,

    /// Spans closer than this to a border never seed a region. `[Units: vx]`
    pub traversable_border_size: u16,

    /// Regions with at most this many spans are merged into a neighbour or removed. `[Units: vx]`
    pub min_spans_for_regions: usize,

    /// The maximum distance a simplified contour's border edges should deviate from the raw contour.
    /// `[Limit: >= 0] [Units: vx]`
    pub contour_deviation_threshold: f32,

    /// The maximum allowed length for contour edges along the border of the mesh. `[Limit: >= 0] [Units: vx]`
    ///
    /// A value of zero disables this feature.
    pub max_edge_length: f32,

    /// The maximum number of vertices allowed for polygons generated during the
    /// contour to polygon conversion process. `[Limit: >= 3]`
    pub max_vertices_per_polygon: usize,
}

/// A builder for [`NavmeshConfig`]. All lengths are given in world units.
/// The default values are chosen to be reasonable for an agent resembling an adult human.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "bevy_reflect", derive(Reflect))]
#[cfg_attr(
    all(feature = "serialize", feature = "bevy_reflect"),
    reflect(Serialize, Deserialize)
)]
pub struct NavmeshConfigBuilder {
    /// The xz-plane cell size to use for fields. `[Limit: > 0] [Units: wu]`.
    ///
    /// This value is usually derived from the agent radius r. A recommended starting value is either r/2 or r/3.
    /// Smaller values increase rasterization resolution and navmesh detail, but generation time grows quickly.
    pub cell_size: f32,
    /// The y-axis cell size to use for fields. `[Limit: > 0] [Units: wu]`
    ///
    /// A good starting point is a bit less than the cell size. Smaller values keep small curbs and steps connected.
    pub cell_height: f32,
    /// The maximum slope that is considered walkable. `[Limits: 0 <= value <= 0.5*π] [Units: Radians]`
    pub walkable_slope_angle: f32,
    /// The height of the agent. `[Limit: >= 0] [Units: wu]`
    ///
    /// It's often a good idea to add a little bit of padding to the height. For example,
    /// an agent that is 1.8 world units tall might want to set this value to 2.0 units.
    pub agent_height: f32,
    /// The radius of the agent. `[Limit: >= 0] [Units: wu]`
    pub agent_radius: f32,
    /// How far up or down the agent can step. `[Limit: >= 0] [Units: wu]`
    pub max_ledge_height: f32,
    /// Regions smaller than this are merged into a neighbour or removed. `[Limit: >= 0] [Units: wu]`
    pub min_region_size: f32,
    /// How far the simplified navmesh outline may deviate from the voxel outline. `[Limit: >= 0] [Units: wu]`
    pub contour_deviation_threshold: f32,
    /// The longest edge allowed along the navmesh border, or zero for no limit. `[Limit: >= 0] [Units: wu]`
    pub max_edge_length: f32,
    /// The maximum number of vertices per polygon. `[Limit: >= 3]`
    pub max_vertices_per_polygon: usize,
}

impl Default for NavmeshConfigBuilder {
    fn default() -> Self {
        Self {
            cell_size: 0.3,
            cell_height: 0.2,
            walkable_slope_angle: 45.0_f32.to_radians(),
            agent_height: 2.0,
            agent_radius: 0.6,
            max_ledge_height: 0.9,
            min_region_size: 2.4,
            contour_deviation_threshold: 0.39,
            max_edge_length: 3.6,
            max_vertices_per_polygon: 5,
        }
    }
}

impl NavmeshConfigBuilder {
    /// Validates the configuration and builds a [`NavmeshConfig`] from it.
    pub fn build(self) -> Result<NavmeshConfig, NavmeshConfigError> {
        if !(self.cell_size > 0.0) {
            return Err(NavmeshConfigError::NonPositiveCellSize {
                cell_size: self.cell_size,
            });
        }
        if !(self.cell_height > 0.0) {
            return Err(NavmeshConfigError::NonPositiveCellHeight {
                cell_height: self.cell_height,
            });
        }
        if !(0.0..=std::f32::consts::FRAC_PI_2).contains(&self.walkable_slope_angle) {
            return Err(NavmeshConfigError::InvalidSlopeAngle {
                angle: self.walkable_slope_angle,
            });
        }
        if self.max_vertices_per_polygon < 3 {
            return Err(NavmeshConfigError::TooFewVerticesPerPolygon {
                count: self.max_vertices_per_polygon,
            });
        }
        for (name, value) in [
            ("agent_height", self.agent_height),
            ("agent_radius", self.agent_radius),
            ("max_ledge_height", self.max_ledge_height),
            ("min_region_size", self.min_region_size),
            ("contour_deviation_threshold", self.contour_deviation_threshold),
            ("max_edge_length", self.max_edge_length),
        ] {
            if !(value >= 0.0) {
                return Err(NavmeshConfigError::NegativeLength { name, value });
            }
        }

        Ok(NavmeshConfig {
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            walkable_slope_angle: self.walkable_slope_angle,
            agent_height: self.agent_height,
            agent_radius: self.agent_radius,
            max_ledge_height: self.max_ledge_height,
            traversable_border_size: (self.agent_radius / self.cell_size).ceil() as u16,
            min_spans_for_regions: (self.min_region_size / self.cell_size).ceil() as usize,
            contour_deviation_threshold: self.contour_deviation_threshold / self.cell_size,
            max_edge_length: self.max_edge_length / self.cell_size,
            max_vertices_per_polygon: self.max_vertices_per_polygon,
        })
    }
}

/// Errors that can occur when validating a [`NavmeshConfigBuilder`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavmeshConfigError {
    /// Happens when the cell size is zero, negative or NaN.
    #[error("cell_size must be positive, got {cell_size}")]
    NonPositiveCellSize {
        /// The rejected cell size
        cell_size: f32,
    },
    /// Happens when the cell height is zero, negative or NaN.
    #[error("cell_height must be positive, got {cell_height}")]
    NonPositiveCellHeight {
        /// The rejected cell height
        cell_height: f32,
    },
    /// Happens when the slope angle is outside of `[0, π/2]`.
    #[error("walkable_slope_angle must be within [0, π/2], got {angle}")]
    InvalidSlopeAngle {
        /// The rejected angle in radians
        angle: f32,
    },
    /// Happens when polygons would have fewer than three vertices.
    #[error("max_vertices_per_polygon must be at least 3, got {count}")]
    TooFewVerticesPerPolygon {
        /// The rejected vertex count
        count: usize,
    },
    /// Happens when a length is negative or NaN.
    #[error("{name} must not be negative, got {value}")]
    NegativeLength {
        /// The name of the rejected field
        name: &'static str,
        /// The rejected value
        value: f32,
    },
}
