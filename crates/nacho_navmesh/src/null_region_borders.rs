//! Cleanup of region borders around the null region.
//!
//! Walks the outline of every null area and fixes three configurations that break contour tracing
//! and polygon formation later on:
//! - a null area fully enclosed by a single region, which would produce a contour with a hole,
//! - a region wrapping tightly around an outer corner of the null area,
//! - two regions meeting only diagonally across a null corner.

use crate::{
    OpenHeightfield,
    math::{opposite, rotate_ccw, rotate_cw},
    open_span::OpenSpanFlags,
    region::{RegionBuildError, RegionId, RegionIdCounter},
};

impl OpenHeightfield {
    /// Detects and fixes problematic region configurations around null areas.
    ///
    /// Enclosed null areas split their surrounding region in two, using a new id from `region_ids`.
    pub fn clean_null_region_borders(
        &mut self,
        region_ids: &mut RegionIdCounter,
    ) -> Result<(), RegionBuildError> {
        for span in &mut self.spans {
            span.flags.remove(OpenSpanFlags::NULL_REGION_CHECKED);
        }
        for i in 0..self.spans.len() {
            let span = &self.spans[i];
            if !span.region.is_none() || span.flags.contains(OpenSpanFlags::NULL_REGION_CHECKED) {
                continue;
            }
            self.spans[i].flags.insert(OpenSpanFlags::NULL_REGION_CHECKED);
            let Some(edge_direction) = (0..4).find(|&dir| {
                self.neighbour(i, dir)
                    .is_some_and(|n| !self.spans[n].region.is_none())
            }) else {
                continue;
            };
            let Some(working_span) = self.neighbour(i, edge_direction) else {
                continue;
            };
            let border_direction = opposite(edge_direction);
            if self.process_null_region(working_span, border_direction) {
                let new_region = region_ids.next_id()?;
                tracing::trace!(
                    region = self.spans[working_span].region.0,
                    new_region = new_region.0,
                    "splitting region around enclosed null area"
                );
                self.partial_flood_region(working_span, border_direction, new_region);
            }
        }
        Ok(())
    }

    /// Walks clockwise around the null area bordering `start` in `start_direction`, fixing problem corners
    /// on the way.
    ///
    /// Returns whether the null area is enclosed by a single region, which is the case when only one
    /// region was met and the walk turned around more outer than inner corners.
    fn process_null_region(&mut self, start: usize, start_direction: u8) -> bool {
        let border_region = self.spans[start].region;
        let mut span = start;
        let mut dir = start_direction;
        let mut acute_corner_count = 0_usize;
        let mut obtuse_corner_count = 0_usize;
        let mut steps_without_border = 0_usize;
        let mut border_seen_last_loop = false;
        let mut has_single_connection = true;

        let max_steps = self.spans.len().saturating_mul(4).saturating_add(16);
        for _ in 0..max_steps {
            let is_border = match self.neighbour(span, dir) {
                None => true,
                Some(neighbour) => {
                    let neighbour_span = &mut self.spans[neighbour];
                    neighbour_span.flags.insert(OpenSpanFlags::NULL_REGION_CHECKED);
                    if neighbour_span.region.is_none() {
                        true
                    } else {
                        if neighbour_span.region != border_region {
                            has_single_connection = false;
                        }
                        false
                    }
                }
            };

            if is_border {
                if border_seen_last_loop {
                    acute_corner_count += 1;
                } else if steps_without_border > 1 {
                    obtuse_corner_count += 1;
                    if self.process_outer_corner(span, dir) {
                        has_single_connection = false;
                    }
                }
                dir = rotate_cw(dir);
                border_seen_last_loop = true;
                steps_without_border = 0;
            } else {
                let Some(neighbour) = self.neighbour(span, dir) else {
                    return false;
                };
                span = neighbour;
                dir = rotate_ccw(dir);
                border_seen_last_loop = false;
                steps_without_border += 1;
            }

            if span == start && dir == start_direction {
                return has_single_connection && obtuse_corner_count > acute_corner_count;
            }
        }
        tracing::warn!(
            start,
            max_steps,
            "null region border walk did not return to its start, skipping"
        );
        false
    }

    /// Fixes the region assignment around an outer corner of a null area.
    ///
    /// `reference` borders the null area in `border_direction`. The two spans behind it decide the case:
    ///
    /// ```text
    /// back_two  null
    /// back_one  reference
    /// ```
    ///
    /// Returns whether more than one region meets at the corner.
    fn process_outer_corner(&mut self, reference: usize, border_direction: u8) -> bool {
        let Some(back_one) = self.neighbour(reference, rotate_ccw(border_direction)) else {
            return true;
        };
        let Some(back_two) = self.neighbour(back_one, border_direction) else {
            return true;
        };
        let reference_region = self.spans[reference].region;
        let back_one_region = self.spans[back_one].region;
        let back_two_region = self.spans[back_two].region;

        if back_one_region != reference_region && back_two_region == reference_region {
            // Two regions touching only diagonally across the null corner.
            let reference_connections = self.count_axis_neighbours_in(reference, back_one_region);
            let back_two_connections = self.count_axis_neighbours_in(back_two, back_one_region);
            if reference_connections > back_two_connections {
                self.spans[reference].region = back_one_region;
            } else {
                self.spans[back_two].region = back_one_region;
            }
            true
        } else if back_one_region == reference_region && back_two_region == reference_region {
            // A short wrap of one region around the corner.
            let selected = self.select_region_id(
                back_two,
                rotate_cw(border_direction),
                opposite(border_direction),
            );
            if selected == back_two_region {
                let selected = self.select_region_id(
                    reference,
                    border_direction,
                    rotate_ccw(border_direction),
                );
                if selected != reference_region {
                    self.spans[reference].region = selected;
                    return true;
                }
                false
            } else {
                self.spans[back_two].region = selected;
                true
            }
        } else {
            true
        }
    }

    fn count_axis_neighbours_in(&self, i: usize, region: RegionId) -> usize {
        (0..4)
            .filter_map(|dir| self.neighbour(i, dir))
            .filter(|&n| self.spans[n].region == region)
            .count()
    }

    /// Picks the region a span next to a null corner should belong to.
    ///
    /// The candidate is the region opposite the border. The span keeps its region if that candidate
    /// or the region opposite the corner is null or its own.
    /// Otherwise the candidate wins unless the span's own region is more common among its eight neighbours.
    fn select_region_id(&self, i: usize, border_direction: u8, corner_direction: u8) -> RegionId {
        let neighbours = self.detailed_neighbours(i);
        let regions = neighbours.map(|n| n.map_or(RegionId::NONE, |n| self.spans[n].region));
        let region = self.spans[i].region;

        let potential = regions[opposite(border_direction) as usize];
        if potential == region || potential.is_none() {
            return region;
        }
        let across_corner = regions[opposite(corner_direction) as usize];
        if across_corner == region || across_corner.is_none() {
            return region;
        }
        let current_count = regions.iter().filter(|&&r| r == region).count();
        let potential_count = regions.iter().filter(|&&r| r == potential).count();
        if potential_count < current_count {
            region
        } else {
            potential
        }
    }

    /// Moves part of `start`'s region to `new_region`, flooding away from the border.
    ///
    /// The flood tracks how far it went against `border_direction` and may only come back towards the
    /// border as far as the start line, so the split runs alongside the enclosed null area.
    fn partial_flood_region(&mut self, start: usize, border_direction: u8, new_region: RegionId) {
        let anti_border_direction = opposite(border_direction);
        let region = self.spans[start].region;
        self.spans[start].region = new_region;
        self.spans[start].distance_to_core = 0;

        let mut stack = vec![(start, 0_u32)];
        while let Some((i, distance)) = stack.pop() {
            for dir in 0..4 {
                let Some(neighbour) = self.neighbour(i, dir) else {
                    continue;
                };
                if self.spans[neighbour].region != region {
                    continue;
                }
                let neighbour_distance = if dir == border_direction {
                    if distance == 0 {
                        continue;
                    }
                    distance - 1
                } else if dir == anti_border_direction {
                    distance + 1
                } else {
                    distance
                };
                self.spans[neighbour].region = new_region;
                self.spans[neighbour].distance_to_core = 0;
                stack.push((neighbour, neighbour_distance));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3A;

    use crate::{
        heightfield::{HeightfieldBuilder, SpanInsertion},
        math::Aabb3d,
        span::SpanBuilder,
    };

    use super::*;

    /// A field with a walkable span in every column. The character at a position is its region,
    /// `.` is the null region and ` ` is an empty column.
    fn field_with_regions(rows: &[&str]) -> OpenHeightfield {
        let mut heightfield = HeightfieldBuilder {
            aabb: Aabb3d {
                min: Vec3A::ZERO,
                max: Vec3A::new(rows[0].len() as f32, 4.0, rows.len() as f32),
            },
            cell_size: 1.0,
            cell_height: 0.5,
        }
        .build()
        .unwrap();
        for (z, row) in rows.iter().enumerate() {
            for (x, cell) in row.chars().enumerate() {
                if cell == ' ' {
                    continue;
                }
                heightfield
                    .add_span(SpanInsertion {
                        x: x as u16,
                        z: z as u16,
                        span: SpanBuilder {
                            min: 0,
                            max: 1,
                            walkable: true,
                            next: None,
                        }
                        .build(),
                    })
                    .unwrap();
            }
        }
        let mut field = OpenHeightfield::from_heightfield(&heightfield, 1.0, 0.6);
        for span in &mut field.spans {
            let cell = rows[span.z as usize].as_bytes()[span.x as usize];
            span.region = match cell {
                b'.' => RegionId::NONE,
                digit => RegionId((digit - b'0') as u16),
            };
        }
        field
    }

    fn region_at(field: &OpenHeightfield, x: u16, z: u16) -> RegionId {
        field.spans[field.cell_at(x, z).index() as usize].region
    }

    fn ids_after(last: u16) -> RegionIdCounter {
        let mut ids = RegionIdCounter::default();
        for _ in 0..last {
            ids.next_id().unwrap();
        }
        ids
    }

    #[test]
    fn enclosed_null_area_splits_region() {
        let rows = [
            "1111111", //
            "1111111", //
            "11...11", //
            "11...11", //
            "1111111", //
            "1111111", //
        ];
        let mut field = field_with_regions(&rows);
        let mut ids = ids_after(1);
        field.clean_null_region_borders(&mut ids).unwrap();
        assert_eq!(ids.last_id(), RegionId(2));
        field.rebuild_regions();
        assert_eq!(field.regions.len(), 2);
        let ids: Vec<_> = field.regions.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![RegionId(1), RegionId(2)]);
        // The null area itself is untouched.
        assert_eq!(region_at(&field, 3, 2), RegionId::NONE);
    }

    #[test]
    fn null_area_on_outer_edge_is_left_alone() {
        let rows = [
            "1111111", //
            "1111111", //
            "11.....", //
            "11.....", //
            "1111111", //
        ];
        let mut field = field_with_regions(&rows);
        let mut ids = ids_after(1);
        field.clean_null_region_borders(&mut ids).unwrap();
        assert_eq!(ids.last_id(), RegionId(1));
    }

    #[test]
    fn null_area_between_two_regions_is_not_split() {
        let rows = [
            "1111222", //
            "1111222", //
            "11...22", //
            "11...22", //
            "1111222", //
            "1111222", //
        ];
        let mut field = field_with_regions(&rows);
        let mut ids = ids_after(2);
        field.clean_null_region_borders(&mut ids).unwrap();
        assert_eq!(ids.last_id(), RegionId(2));
    }

    #[test]
    fn diagonal_contact_is_resolved() {
        // The reference (1, 1) borders the null span above it. Behind it are (2, 1) and (2, 0).
        let rows = [
            "1.22", //
            "1211", //
            "1111", //
        ];
        let mut field = field_with_regions(&rows);
        let reference = field.cell_at(1, 1).index() as usize;
        assert!(field.process_outer_corner(reference, 3));
        // The reference has three edges into region 1, back-two only one.
        assert_eq!(region_at(&field, 1, 1), RegionId(1));
        assert_eq!(region_at(&field, 2, 0), RegionId(2));
    }

    #[test]
    fn corner_at_grid_edge_counts_as_multi_region() {
        let rows = [
            "11.", //
            "111", //
        ];
        let mut field = field_with_regions(&rows);
        let reference = field.cell_at(2, 1).index() as usize;
        assert!(field.process_outer_corner(reference, 3));
        assert_eq!(region_at(&field, 2, 1), RegionId(1));
    }

    #[test]
    fn select_region_prefers_more_common_neighbour_region() {
        let rows = [
            "222", //
            "212", //
            "111", //
        ];
        let field = field_with_regions(&rows);
        let center = field.cell_at(1, 1).index() as usize;
        // Opposite of the +z border is region 2, which holds five of the eight neighbours.
        assert_eq!(field.select_region_id(center, 1, 0), RegionId(2));

        let rows = [
            "211", //
            "212", //
            "111", //
        ];
        let field = field_with_regions(&rows);
        let center = field.cell_at(1, 1).index() as usize;
        // Opposite of the border is the span's own region.
        assert_eq!(field.select_region_id(center, 1, 0), RegionId(1));

        // Region 1 holds six of the eight neighbours.
        let field = field_with_regions(&["121", "113", "111"]);
        let center = field.cell_at(1, 1).index() as usize;
        assert_eq!(field.select_region_id(center, 1, 0), RegionId(1));
    }

    #[test]
    fn select_region_keeps_own_region_when_either_side_is_own_or_null() {
        // Only the span below the center is region 1. The majority must not matter.
        let field = field_with_regions(&["212", "212", "222"]);
        let center = field.cell_at(1, 1).index() as usize;
        assert_eq!(field.select_region_id(center, 1, 0), RegionId(1));

        // Opposite of the corner is null.
        let field = field_with_regions(&["222", "21.", "222"]);
        let center = field.cell_at(1, 1).index() as usize;
        assert_eq!(field.select_region_id(center, 1, 0), RegionId(1));
    }

    #[test]
    fn short_wrap_moves_back_two_into_neighbouring_region() {
        // The reference (2, 1) borders the null span above it. Behind it are (1, 1) and (1, 2).
        let rows = [
            "1111", //
            "2111", //
            "21..", //
            "22..", //
        ];
        let mut field = field_with_regions(&rows);
        let reference = field.cell_at(2, 1).index() as usize;
        assert!(field.process_outer_corner(reference, 1));
        assert_eq!(region_at(&field, 1, 2), RegionId(2));
        assert_eq!(region_at(&field, 2, 1), RegionId(1));
        assert_eq!(region_at(&field, 1, 1), RegionId(1));
    }

    #[test]
    fn short_wrap_moves_reference_when_back_two_stays() {
        let rows = [
            "1122", //
            "1112", //
            "11.2", //
            "11..", //
        ];
        let mut field = field_with_regions(&rows);
        let reference = field.cell_at(2, 1).index() as usize;
        assert!(field.process_outer_corner(reference, 1));
        assert_eq!(region_at(&field, 2, 1), RegionId(2));
        assert_eq!(region_at(&field, 1, 2), RegionId(1));
    }

    #[test]
    fn short_wrap_inside_one_region_is_single_region() {
        let rows = [
            "111", //
            "111", //
            "11.", //
        ];
        let mut field = field_with_regions(&rows);
        let reference = field.cell_at(2, 1).index() as usize;
        assert!(!field.process_outer_corner(reference, 1));
        assert_eq!(region_at(&field, 2, 1), RegionId(1));
        assert_eq!(region_at(&field, 1, 2), RegionId(1));
    }
}
