use bitflags::bitflags;

use crate::region::RegionId;

/// Provides information on the content of a cell column in an [`OpenHeightfield`](crate::OpenHeightfield).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct OpenCell {
    /// Index to the first span in the column.
    index: u32,
    /// Number of spans in the column.
    count: u16,
}

impl OpenCell {
    /// Index to the first span in the column.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Number of spans in the column.
    #[inline]
    pub fn count(&self) -> u16 {
        self.count
    }

    /// The span indices of the column, lowest first.
    #[inline]
    pub fn index_range(&self) -> std::ops::Range<usize> {
        self.index as usize..self.index as usize + self.count as usize
    }

    pub(crate) fn set_index(&mut self, index: u32) {
        self.index = index;
    }

    pub(crate) fn inc_count(&mut self) {
        self.count += 1;
    }
}

bitflags! {
    /// Bookkeeping flags of an [`OpenSpan`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    pub struct OpenSpanFlags: u8 {
        /// The span was already visited by the null-region border cleanup.
        const NULL_REGION_CHECKED = 1 << 0;
    }
}

/// The walkable space above a solid span.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct OpenSpan {
    /// The floor of the open space, i.e. the top of the solid span below. [Units: slabs]
    pub min: u16,
    /// The ceiling of the open space. `None` if nothing is above. [Units: slabs]
    pub max: Option<u16>,
    /// The column of the span along the x-axis.
    pub x: u16,
    /// The column of the span along the z-axis.
    pub z: u16,
    /// Indices of the linked spans in the four planar directions.
    pub neighbours: [Option<usize>; 4],
    /// Hops to the nearest border span.
    pub edge_distance: u16,
    /// The region the span belongs to, or [`RegionId::NONE`].
    pub region: RegionId,
    /// Hops from the seed of the region during region growth.
    pub distance_to_core: u16,
    /// Bookkeeping flags.
    pub flags: OpenSpanFlags,
    /// Contour tracing bits. Bit `d` is set when the edge in direction `d` borders another region.
    pub neighbour_flags: u8,
}

impl OpenSpan {
    /// The linked span in the given direction.
    #[inline]
    pub fn neighbour(&self, direction: u8) -> Option<usize> {
        self.neighbours[direction as usize & 0x03]
    }

    /// The number of linked planar neighbours.
    #[inline]
    pub fn neighbour_count(&self) -> usize {
        self.neighbours.iter().flatten().count()
    }

    /// The height of the open space in slabs. `None` if unbounded.
    #[inline]
    pub fn height(&self) -> Option<u16> {
        self.max.map(|max| max.saturating_sub(self.min))
    }
}
