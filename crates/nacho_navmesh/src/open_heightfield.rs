//! The walkable-space representation of a [`Heightfield`] and its distance field.

use std::{collections::VecDeque, sync::OnceLock};

use glam::Vec3A;

use crate::{
    heightfield::Heightfield,
    math::{Aabb3d, dir_offset_x, dir_offset_z, rotate_cw},
    open_span::{OpenCell, OpenSpan},
    region::Region,
};

/// The open space above every walkable solid span, linked to its planar neighbours.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct OpenHeightfield {
    /// The width of the field along the x-axis in cell units
    pub width: u16,
    /// The depth of the field along the z-axis in cell units
    pub depth: u16,
    /// The AABB of the field
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane
    pub cell_size: f32,
    /// The size of each cell along the y-axis
    pub cell_height: f32,
    /// The cells in the field [Size: `width * depth`]
    pub cells: Vec<OpenCell>,
    /// All open spans, stored column by column
    pub spans: Vec<OpenSpan>,
    /// The regions found by [`OpenHeightfield::build_regions`](crate::OpenHeightfield::build_regions).
    pub regions: Vec<Region>,
    /// Lazily computed `(min, max)` edge distance.
    #[cfg_attr(feature = "serialize", serde(skip))]
    edge_distance_bounds: OnceLock<(u16, u16)>,
}

impl OpenHeightfield {
    /// Builds the open field from the walkable spans of a heightfield and links every span to the
    /// neighbours an agent can step to.
    ///
    /// For every direction the neighbouring column is scanned upward for the span with the nearest floor
    /// that leaves at least `agent_height` of shared head room and differs in floor height by less than
    /// `max_ledge_height`. The scan stops as soon as the floor offset starts increasing.
    ///
    /// The distance field is built as well.
    pub fn from_heightfield(
        heightfield: &Heightfield,
        agent_height: f32,
        max_ledge_height: f32,
    ) -> Self {
        let mut open_heightfield = Self {
            width: heightfield.width,
            depth: heightfield.depth,
            aabb: heightfield.aabb,
            cell_size: heightfield.cell_size,
            cell_height: heightfield.cell_height,
            cells: vec![
                OpenCell::default();
                heightfield.width as usize * heightfield.depth as usize
            ],
            spans: Vec::new(),
            regions: Vec::new(),
            edge_distance_bounds: OnceLock::new(),
        };

        // Fill in cells and spans
        for z in 0..heightfield.depth {
            for x in 0..heightfield.width {
                let column_index = heightfield.column_index(x, z);
                let cell = &mut open_heightfield.cells[column_index];
                cell.set_index(open_heightfield.spans.len() as u32);
                for (_, span) in heightfield.column_spans(x, z) {
                    if !span.walkable() {
                        continue;
                    }
                    let max = span.next().map(|next| heightfield.span(next).min());
                    open_heightfield.spans.push(OpenSpan {
                        min: span.max(),
                        max,
                        x,
                        z,
                        ..Default::default()
                    });
                    cell.inc_count();
                }
            }
        }

        // Find neighbour connections
        for i in 0..open_heightfield.spans.len() {
            for dir in 0..4 {
                let neighbour = open_heightfield.find_neighbour(i, dir, agent_height, max_ledge_height);
                open_heightfield.spans[i].neighbours[dir as usize] = neighbour;
            }
        }

        open_heightfield.build_distance_field();
        tracing::debug!(
            spans = open_heightfield.spans.len(),
            max_edge_distance = open_heightfield.max_edge_distance(),
            "built open heightfield"
        );
        open_heightfield
    }

    fn find_neighbour(
        &self,
        i: usize,
        dir: u8,
        agent_height: f32,
        max_ledge_height: f32,
    ) -> Option<usize> {
        let span = &self.spans[i];
        let neighbor_x = span.x as i32 + dir_offset_x(dir) as i32;
        let neighbor_z = span.z as i32 + dir_offset_z(dir) as i32;
        if !self.contains(neighbor_x, neighbor_z) {
            return None;
        }
        let cell = self.cell_at(neighbor_x as u16, neighbor_z as u16);

        let mut best: Option<(usize, u16)> = None;
        let mut previous_offset: Option<u16> = None;
        for k in cell.index_range() {
            let neighbor_span = &self.spans[k];
            let offset = neighbor_span.min.abs_diff(span.min);
            if previous_offset.is_some_and(|previous| offset > previous) {
                break;
            }
            previous_offset = Some(offset);

            let floor = span.min.max(neighbor_span.min);
            let has_clearance = match (span.max, neighbor_span.max) {
                (None, None) => true,
                (Some(top), None) | (None, Some(top)) => {
                    top.saturating_sub(floor) as f32 * self.cell_height >= agent_height
                }
                (Some(a), Some(b)) => {
                    a.min(b).saturating_sub(floor) as f32 * self.cell_height >= agent_height
                }
            };
            let is_climbable = (offset as f32 * self.cell_height) < max_ledge_height;
            if !has_clearance || !is_climbable {
                continue;
            }
            if best.is_none_or(|(_, best_offset)| offset < best_offset) {
                best = Some((k, offset));
            }
        }
        best.map(|(k, _)| k)
    }

    /// Computes every span's [`OpenSpan::edge_distance`] as the number of hops to the nearest border span.
    ///
    /// Border spans are spans with fewer than four linked neighbours and get distance 0.
    pub fn build_distance_field(&mut self) {
        let mut queue = VecDeque::new();
        for (i, span) in self.spans.iter_mut().enumerate() {
            if span.neighbour_count() < 4 {
                span.edge_distance = 0;
                queue.push_back(i);
            } else {
                span.edge_distance = u16::MAX;
            }
        }
        while let Some(i) = queue.pop_front() {
            let distance = self.spans[i].edge_distance.saturating_add(1);
            for neighbour in self.spans[i].neighbours.into_iter().flatten() {
                if self.spans[neighbour].edge_distance > distance {
                    self.spans[neighbour].edge_distance = distance;
                    queue.push_back(neighbour);
                }
            }
        }
        // Spans not reachable from any border keep the sentinel, which only happens in closed loops.
        for span in &mut self.spans {
            if span.edge_distance == u16::MAX {
                span.edge_distance = 0;
            }
        }
        self.edge_distance_bounds = OnceLock::new();
    }

    /// The largest edge distance of any span. 0 for an empty field.
    pub fn max_edge_distance(&self) -> u16 {
        self.edge_distance_bounds().1
    }

    /// The smallest edge distance of any span. 0 for an empty field.
    pub fn min_edge_distance(&self) -> u16 {
        self.edge_distance_bounds().0
    }

    fn edge_distance_bounds(&self) -> (u16, u16) {
        *self.edge_distance_bounds.get_or_init(|| {
            self.spans
                .iter()
                .map(|span| span.edge_distance)
                .fold(None, |bounds: Option<(u16, u16)>, distance| {
                    Some(bounds.map_or((distance, distance), |(min, max)| {
                        (min.min(distance), max.max(distance))
                    }))
                })
                .unwrap_or_default()
        })
    }

    /// Returns the eight neighbours of a span.
    ///
    /// Entries 0 to 3 are the axis neighbours. Entry `4 + d` is the diagonal between direction `d` and
    /// `d + 1`, reached through either of the two axis neighbours.
    pub fn detailed_neighbours(&self, i: usize) -> [Option<usize>; 8] {
        let span = &self.spans[i];
        let mut neighbours = [None; 8];
        for dir in 0..4_u8 {
            neighbours[dir as usize] = span.neighbour(dir);
        }
        for dir in 0..4_u8 {
            let next_dir = rotate_cw(dir);
            let via_axis = span
                .neighbour(dir)
                .and_then(|n| self.spans[n].neighbour(next_dir));
            let via_next = span
                .neighbour(next_dir)
                .and_then(|n| self.spans[n].neighbour(dir));
            neighbours[4 + dir as usize] = via_axis.or(via_next);
        }
        neighbours
    }

    /// The linked neighbour of span `i` in direction `dir`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds.
    #[inline]
    pub fn neighbour(&self, i: usize, dir: u8) -> Option<usize> {
        self.spans[i].neighbour(dir)
    }

    /// The world position of the center of the span's floor.
    pub fn span_world_position(&self, i: usize) -> Vec3A {
        let span = &self.spans[i];
        self.aabb.min
            + Vec3A::new(
                (span.x as f32 + 0.5) * self.cell_size,
                span.min as f32 * self.cell_height,
                (span.z as f32 + 0.5) * self.cell_size,
            )
    }

    #[inline]
    pub(crate) fn column_index(&self, x: u16, z: u16) -> usize {
        x as usize + z as usize * self.width as usize
    }

    #[inline]
    pub(crate) fn contains(&self, x: i32, z: i32) -> bool {
        x >= 0 && x < self.width as i32 && z >= 0 && z < self.depth as i32
    }

    /// Returns the cell at the given coordinates. Returns `None` if the coordinates are invalid.
    #[inline]
    pub fn get_cell_at(&self, x: u16, z: u16) -> Option<&OpenCell> {
        if x >= self.width || z >= self.depth {
            return None;
        }
        self.cells.get(self.column_index(x, z))
    }

    /// Returns the cell at the given coordinates. Panics if the coordinates are invalid.
    #[inline]
    pub fn cell_at(&self, x: u16, z: u16) -> &OpenCell {
        &self.cells[self.column_index(x, z)]
    }
}
