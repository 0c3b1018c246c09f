//! The heightfield module contains the types and functions for working with [`Heightfield`]s.
//!
//! A heightfield is a 3D grid of solid [`Span`]s, where each column contains 0, 1, or more spans.

use thiserror::Error;

use crate::{
    math::{Aabb3d, dir_offset_x, dir_offset_z},
    span::{Span, SpanKey, Spans},
};

/// The solid voxel representation of a bound. Build with [`HeightfieldBuilder`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Heightfield {
    /// The width of the heightfield along the x-axis in cell units
    pub width: u16,
    /// The depth of the heightfield along the z-axis in cell units
    pub depth: u16,
    /// The number of height slabs along the y-axis
    pub slabs: u16,
    /// The AABB of the heightfield
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane
    pub cell_size: f32,
    /// The size of each cell along the y-axis
    pub cell_height: f32,
    /// The keys to the lowest span of every column in width*depth order
    pub columns: Vec<Option<SpanKey>>,
    /// All spans in the heightfield
    pub allocated_spans: Spans,
}

impl Heightfield {
    /// Inserts a span into its column, merging it with every span it touches or overlaps.
    ///
    /// The merged span covers the union of the height ranges. Its walkability is taken from
    /// whichever span reaches higher. When both reach equally high, the flags are OR-ed.
    pub(crate) fn add_span(&mut self, insertion: SpanInsertion) -> Result<(), SpanInsertionError> {
        if insertion.x >= self.width || insertion.z >= self.depth {
            return Err(SpanInsertionError::ColumnIndexOutOfBounds {
                x: insertion.x,
                z: insertion.z,
            });
        }
        let column_index = self.column_index(insertion.x, insertion.z);

        let mut new_span = insertion.span;
        let mut previous_span_key = None;
        let mut current_span_key_iter = self.columns[column_index];
        while let Some(current_span_key) = current_span_key_iter {
            let current_span = &self.allocated_spans[current_span_key];
            current_span_key_iter = current_span.next();
            if current_span.min() > new_span.max() {
                // Current span is completely above the new span, break.
                break;
            }
            if current_span.max() < new_span.min() {
                // Current span is completely below the new span. Keep going.
                previous_span_key.replace(current_span_key);
                continue;
            }
            // The new span touches or overlaps an existing span. Merge them.
            if current_span.max() > new_span.max() {
                new_span.set_walkable(current_span.walkable());
            } else if current_span.max() == new_span.max() {
                new_span.set_walkable(new_span.walkable() | current_span.walkable());
            }
            new_span.set_min(new_span.min().min(current_span.min()));
            new_span.set_max(new_span.max().max(current_span.max()));

            // Remove the current span since it's now merged with the new span.
            // Keep going because there might be other spans that also need to be merged.
            let next_key = current_span.next();
            self.allocated_spans.remove(current_span_key);
            if let Some(previous_span_key) = previous_span_key {
                self.span_mut(previous_span_key).set_next(next_key);
            } else {
                self.columns[column_index] = next_key;
            }
        }

        if let Some(previous_span_key) = previous_span_key {
            new_span.set_next(self.span(previous_span_key).next());
            let new_span_key = self.allocated_spans.insert(new_span);
            self.span_mut(previous_span_key).set_next(new_span_key);
        } else {
            // This span should go before the others in the list
            new_span.set_next(self.columns[column_index]);
            let new_span_key = self.allocated_spans.insert(new_span);
            self.columns[column_index] = Some(new_span_key);
        }

        Ok(())
    }

    /// Revokes walkability from spans an agent cannot stand on.
    ///
    /// A span stays walkable only if
    /// - it was rasterized as walkable,
    /// - the gap to the span above it is at least `agent_height`,
    /// - the drop to the nearest span of every neighbouring column is at most `max_ledge_height`.
    ///   Neighbours outside the grid or without spans count as a drop to the bottom of the field.
    ///
    /// # Arguments
    ///
    /// - `agent_height` - Minimum head clearance. [Units: wu]
    /// - `max_ledge_height` - Maximum drop to a neighbouring column. [Units: wu]
    pub fn filter_unwalkable_spans(&mut self, agent_height: f32, max_ledge_height: f32) {
        let mut revoked = Vec::new();
        for z in 0..self.depth {
            for x in 0..self.width {
                for (key, span) in self.column_spans(x, z) {
                    if !span.walkable() {
                        continue;
                    }
                    let clearance_ok = span.next().is_none_or(|next| {
                        let gap = self.span(next).min().saturating_sub(span.max());
                        gap as f32 * self.cell_height >= agent_height
                    });
                    if !clearance_ok || self.is_ledge(x, z, span.max(), max_ledge_height) {
                        revoked.push(key);
                    }
                }
            }
        }
        tracing::debug!(
            revoked = revoked.len(),
            "revoked walkability from obstructed and ledge spans"
        );
        for key in revoked {
            self.span_mut(key).set_walkable(false);
        }
    }

    fn is_ledge(&self, x: u16, z: u16, top: u16, max_ledge_height: f32) -> bool {
        for dir in 0..4 {
            let neighbor_x = x as i32 + dir_offset_x(dir) as i32;
            let neighbor_z = z as i32 + dir_offset_z(dir) as i32;
            let drop = if self.contains(neighbor_x, neighbor_z) {
                self.nearest_top_difference(neighbor_x as u16, neighbor_z as u16, top)
                    .unwrap_or(top)
            } else {
                top
            };
            if drop as f32 * self.cell_height > max_ledge_height {
                return true;
            }
        }
        false
    }

    /// Scans the column upward and returns the smallest `|span.max - top|`,
    /// stopping as soon as the difference stops shrinking.
    fn nearest_top_difference(&self, x: u16, z: u16, top: u16) -> Option<u16> {
        let mut best: Option<u16> = None;
        for (_, span) in self.column_spans(x, z) {
            let difference = span.max().abs_diff(top);
            if best.is_some_and(|best| difference >= best) {
                break;
            }
            best = Some(difference);
        }
        best
    }

    #[inline]
    pub(crate) fn column_index(&self, x: u16, z: u16) -> usize {
        x as usize + z as usize * self.width as usize
    }

    #[inline]
    pub(crate) fn contains(&self, x: i32, z: i32) -> bool {
        x >= 0 && x < self.width as i32 && z >= 0 && z < self.depth as i32
    }

    /// Iterates over the spans of a column from bottom to top.
    /// Yields nothing if the coordinates are out of bounds.
    pub fn column_spans(&self, x: u16, z: u16) -> impl Iterator<Item = (SpanKey, &Span)> {
        let mut span_key_iter = if x < self.width && z < self.depth {
            self.span_key_at(x, z)
        } else {
            None
        };
        std::iter::from_fn(move || {
            let key = span_key_iter?;
            let span = self.span(key);
            span_key_iter = span.next();
            Some((key, span))
        })
    }

    /// Returns the key of the lowest span in the column at the given coordinates.
    /// `None` if either the index is out of bounds or there is no span in the column.
    #[inline]
    pub fn span_key_at(&self, x: u16, z: u16) -> Option<SpanKey> {
        let column_index = self.column_index(x, z);
        let Some(span_key) = self.columns.get(column_index) else {
            // Invalid coordinates
            return None;
        };
        *span_key
    }

    /// Returns the lowest span at the given coordinates.
    /// `None` if either the index is out of bounds or there is no span in the column.
    #[inline]
    pub fn span_at(&self, x: u16, z: u16) -> Option<&Span> {
        let span_key = self.span_key_at(x, z)?;
        Some(self.span(span_key))
    }

    /// Returns a reference to the span with the given key.
    /// # Panics
    /// Panics if the key is not found.
    #[inline]
    pub fn span(&self, key: SpanKey) -> &Span {
        &self.allocated_spans[key]
    }

    /// Returns a mutable reference to the span with the given key.
    /// # Panics
    /// Panics if the key is not found.
    #[inline]
    pub(crate) fn span_mut(&mut self, key: SpanKey) -> &mut Span {
        &mut self.allocated_spans[key]
    }

    /// Whether no column holds any span.
    pub fn is_empty(&self) -> bool {
        self.allocated_spans.is_empty()
    }
}

/// A builder for [`Heightfield`]s.
pub struct HeightfieldBuilder {
    /// The AABB of the heightfield
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane
    pub cell_size: f32,
    /// The size of each cell along the y-axis
    pub cell_height: f32,
}

impl HeightfieldBuilder {
    /// Builds an empty heightfield covering the AABB.
    ///
    /// Every axis is divided into `ceil(extent / cell size)` cells, so the grid covers the whole box.
    pub fn build(self) -> Result<Heightfield, HeightfieldBuilderError> {
        if !(self.cell_size > 0.0 && self.cell_height > 0.0) {
            return Err(HeightfieldBuilderError::InvalidCellSize {
                cell_size: self.cell_size,
                cell_height: self.cell_height,
            });
        }
        let size = self.aabb.size().max(glam::Vec3A::ZERO);
        let width = (size.x / self.cell_size).ceil();
        let depth = (size.z / self.cell_size).ceil();
        let slabs = (size.y / self.cell_height).ceil();
        if width > u16::MAX as f32 || depth > u16::MAX as f32 {
            return Err(HeightfieldBuilderError::ColumnCountTooLarge { width, depth });
        }
        if slabs >= u16::MAX as f32 {
            return Err(HeightfieldBuilderError::SlabCountTooLarge { slabs });
        }
        let column_count = width as usize * depth as usize;
        Ok(Heightfield {
            width: width as u16,
            depth: depth as u16,
            slabs: slabs as u16,
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            columns: vec![None; column_count],
            allocated_spans: Spans::with_min_capacity(column_count),
        })
    }
}

/// Errors that can occur when building a [`Heightfield`] with [`HeightfieldBuilder::build`].
#[derive(Error, Debug)]
pub enum HeightfieldBuilderError {
    /// Happens when the grid does not fit into 16-bit cell coordinates.
    #[error("Column count (width*depth) is too large, got {width}*{depth} but max per axis is {max}", max = u16::MAX)]
    ColumnCountTooLarge {
        /// The width of the heightfield along the x-axis in cell units
        width: f32,
        /// The depth of the heightfield along the z-axis in cell units
        depth: f32,
    },
    /// Happens when the AABB is too tall for 16-bit span heights.
    #[error("Slab count is too large, got {slabs} but max is {max}", max = u16::MAX - 1)]
    SlabCountTooLarge {
        /// The number of height slabs along the y-axis
        slabs: f32,
    },
    /// Happens when a cell dimension is zero, negative or NaN.
    #[error("cell sizes must be positive, got cell_size={cell_size}, cell_height={cell_height}")]
    InvalidCellSize {
        /// The size of each cell on the xz-plane
        cell_size: f32,
        /// The size of each cell along the y-axis
        cell_height: f32,
    },
}

/// Errors that can occur when inserting a span into a [`Heightfield`]
#[derive(Error, Debug)]
pub enum SpanInsertionError {
    /// Happens when the column index is out of bounds.
    #[error("column index out of bounds: x={x}, z={z}")]
    ColumnIndexOutOfBounds {
        /// The x-coordinate of the span
        x: u16,
        /// The z-coordinate of the span
        z: u16,
    },
}

pub(crate) struct SpanInsertion {
    /// The x-coordinate of the span
    pub(crate) x: u16,
    /// The z-coordinate of the span
    pub(crate) z: u16,
    /// The span to insert
    pub(crate) span: Span,
}
