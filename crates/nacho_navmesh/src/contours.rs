//! Region outlines traced from an [`OpenHeightfield`] and simplified into contours.

use glam::{U16Vec3, Vec2};

use crate::{
    OpenHeightfield,
    math::{
        Aabb3d, distance_squared_point_segment, rotate_ccw, rotate_cw, segments_intersect_properly,
    },
    region::RegionId,
};

impl OpenHeightfield {
    /// Traces the outline of every region and simplifies it.
    ///
    /// The raw contours match the region outlines exactly. Vertices where the neighbouring region changes
    /// are always kept. Edges that border the null region are refined until no raw vertex deviates from
    /// them by more than `deviation_threshold`, then split until no edge is longer than `max_edge_len`.
    /// Both values are in cell units. Setting `max_edge_len` to zero disables the edge length feature.
    pub fn build_contours(&mut self, deviation_threshold: f32, max_edge_len: f32) -> ContourSet {
        let mut contour_set = ContourSet {
            contours: Vec::new(),
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
        };

        let discarded_islands = self.mark_region_borders();

        let mut raw_vertices = Vec::with_capacity(256);
        let mut simplified = Vec::with_capacity(64);
        for i in 0..self.spans.len() {
            let span = &self.spans[i];
            if span.region.is_none() || span.neighbour_flags == 0 {
                continue;
            }
            let region = span.region;
            let start_direction = span.neighbour_flags.trailing_zeros() as u8;

            raw_vertices.clear();
            simplified.clear();
            if !self.walk_contour(i, start_direction, &mut raw_vertices) {
                continue;
            }

            let is_uniform = simplify_contour(&raw_vertices, &mut simplified);
            let borders_null = |a: usize| {
                is_uniform || raw_vertices[(a + 1) % raw_vertices.len()].neighbour_region.is_none()
            };
            insert_deviating_vertices(&raw_vertices, &mut simplified, deviation_threshold, &borders_null);
            split_long_edges(&raw_vertices, &mut simplified, max_edge_len, &borders_null);
            remove_vertical_segments(&raw_vertices, &mut simplified);
            remove_self_intersections(&raw_vertices, &mut simplified, &borders_null);

            if simplified.len() <= 2 {
                tracing::warn!(
                    region = region.0,
                    raw_vertices = raw_vertices.len(),
                    vertices = simplified.len(),
                    "contour collapsed to a line, skipping"
                );
                continue;
            }
            contour_set.contours.push(Contour {
                region,
                vertices: simplified
                    .iter()
                    .map(|&raw| raw_vertices[raw].position)
                    .collect(),
                raw_vertices: raw_vertices.clone(),
            });
        }

        tracing::debug!(
            contours = contour_set.contours.len(),
            discarded_islands,
            "built contours"
        );
        contour_set
    }

    /// Sets bit `d` of every span's `neighbour_flags` when the edge in direction `d` borders another
    /// region or nothing. Returns the number of island spans, which are reset to no flags.
    fn mark_region_borders(&mut self) -> usize {
        let mut islands = 0;
        for i in 0..self.spans.len() {
            let region = self.spans[i].region;
            if region.is_none() {
                self.spans[i].neighbour_flags = 0;
                continue;
            }
            let mut flags = 0_u8;
            for dir in 0..4 {
                let same_region = self
                    .neighbour(i, dir)
                    .is_some_and(|n| self.spans[n].region == region);
                if !same_region {
                    flags |= 1 << dir;
                }
            }
            if flags == 0xf {
                flags = 0;
                islands += 1;
            }
            self.spans[i].neighbour_flags = flags;
        }
        islands
    }

    /// Walks clockwise along the region border starting at span `start`, emitting a vertex for every
    /// border edge it passes and clearing that edge's flag.
    ///
    /// Returns `false` if the walk broke off.
    fn walk_contour(
        &mut self,
        start: usize,
        start_direction: u8,
        raw_vertices: &mut Vec<ContourVertex>,
    ) -> bool {
        let mut i = start;
        let mut dir = start_direction;
        let max_steps = self.spans.len().saturating_mul(8).saturating_add(16);
        for _ in 0..max_steps {
            let span = &self.spans[i];
            if span.neighbour_flags & (1 << dir) != 0 {
                let (mut x, mut z) = (span.x, span.z);
                match dir {
                    0 => z += 1,
                    1 => {
                        x += 1;
                        z += 1;
                    }
                    2 => x += 1,
                    _ => {}
                }
                let neighbour_region = span
                    .neighbour(dir)
                    .map_or(RegionId::NONE, |n| self.spans[n].region);
                raw_vertices.push(ContourVertex {
                    position: U16Vec3::new(x, self.corner_height(i, dir), z),
                    neighbour_region,
                });
                self.spans[i].neighbour_flags &= !(1 << dir);
                dir = rotate_cw(dir);
            } else {
                let Some(neighbour) = span.neighbour(dir) else {
                    tracing::warn!(
                        span = i,
                        direction = dir,
                        "contour walk lost the region border, skipping"
                    );
                    return false;
                };
                i = neighbour;
                dir = rotate_ccw(dir);
            }
            if i == start && dir == start_direction {
                return true;
            }
        }
        tracing::warn!(
            start,
            max_steps,
            "contour walk did not return to its start, skipping"
        );
        false
    }

    /// The highest floor among the span and the three spans sharing the corner clockwise of `dir`.
    fn corner_height(&self, i: usize, dir: u8) -> u16 {
        let neighbours = self.detailed_neighbours(i);
        [
            neighbours[dir as usize],
            neighbours[rotate_cw(dir) as usize],
            neighbours[4 + dir as usize],
        ]
        .into_iter()
        .flatten()
        .map(|n| self.spans[n].min)
        .fold(self.spans[i].min, u16::max)
    }
}

/// Fills `simplified` with the indices of the mandatory raw vertices.
///
/// Returns `true` if the contour borders a single region all the way around. In that case the lower-left
/// and upper-right vertices are used as a starting point instead.
fn simplify_contour(raw_vertices: &[ContourVertex], simplified: &mut Vec<usize>) -> bool {
    let count = raw_vertices.len();
    let has_connections = raw_vertices
        .iter()
        .any(|vertex| !vertex.neighbour_region.is_none());
    if has_connections {
        for (i, vertex) in raw_vertices.iter().enumerate() {
            if vertex.neighbour_region != raw_vertices[(i + 1) % count].neighbour_region {
                simplified.push(i);
            }
        }
    }
    if !simplified.is_empty() {
        return false;
    }

    let mut lower_left = 0;
    let mut upper_right = 0;
    for (i, vertex) in raw_vertices.iter().enumerate() {
        let position = vertex.position;
        let ll = raw_vertices[lower_left].position;
        if position.x < ll.x || (position.x == ll.x && position.z < ll.z) {
            lower_left = i;
        }
        let ur = raw_vertices[upper_right].position;
        if position.x > ur.x || (position.x == ur.x && position.z > ur.z) {
            upper_right = i;
        }
    }
    simplified.push(lower_left);
    if upper_right != lower_left {
        simplified.push(upper_right);
    }
    if upper_right < lower_left {
        simplified.swap(0, 1);
    }
    true
}

fn planar(vertex: &ContourVertex) -> Vec2 {
    Vec2::new(vertex.position.x as f32, vertex.position.z as f32)
}

/// Inserts the raw vertex furthest from each null-bordering edge until every raw vertex lies within
/// `threshold` of its edge.
fn insert_deviating_vertices(
    raw_vertices: &[ContourVertex],
    simplified: &mut Vec<usize>,
    threshold: f32,
    borders_null: &impl Fn(usize) -> bool,
) {
    let count = raw_vertices.len();
    let threshold_squared = threshold * threshold;
    let mut a = 0;
    while a < simplified.len() {
        let b = (a + 1) % simplified.len();
        let raw_a = simplified[a];
        let raw_b = simplified[b];

        let mut furthest = None;
        if borders_null(raw_a) {
            let start = planar(&raw_vertices[raw_a]);
            let end = planar(&raw_vertices[raw_b]);
            let mut max_deviation = 0.0;
            let mut test = (raw_a + 1) % count;
            while test != raw_b {
                let deviation = distance_squared_point_segment(planar(&raw_vertices[test]), start, end);
                if deviation > max_deviation {
                    max_deviation = deviation;
                    furthest = Some(test);
                }
                test = (test + 1) % count;
            }
            if max_deviation <= threshold_squared {
                furthest = None;
            }
        }

        if let Some(furthest) = furthest {
            simplified.insert(a + 1, furthest);
        } else {
            a += 1;
        }
    }
}

/// Splits null-bordering edges longer than `max_edge_len` at the raw vertex halfway between their ends.
fn split_long_edges(
    raw_vertices: &[ContourVertex],
    simplified: &mut Vec<usize>,
    max_edge_len: f32,
    borders_null: &impl Fn(usize) -> bool,
) {
    if max_edge_len <= 0.0 {
        return;
    }
    let count = raw_vertices.len();
    let max_edge_len_squared = max_edge_len * max_edge_len;
    let mut a = 0;
    while a < simplified.len() {
        let b = (a + 1) % simplified.len();
        let raw_a = simplified[a];
        let raw_b = simplified[b];

        let mut midpoint = None;
        if borders_null(raw_a) {
            let length_squared = planar(&raw_vertices[raw_a]).distance_squared(planar(&raw_vertices[raw_b]));
            if length_squared > max_edge_len_squared {
                let index_distance = if raw_b <= raw_a {
                    raw_b + count - raw_a
                } else {
                    raw_b - raw_a
                };
                let candidate = (raw_a + index_distance / 2) % count;
                if candidate != raw_a && candidate != raw_b {
                    midpoint = Some(candidate);
                }
            }
        }

        if let Some(midpoint) = midpoint {
            simplified.insert(a + 1, midpoint);
        } else {
            a += 1;
        }
    }
}

/// Removes consecutive vertices at the same planar position.
fn remove_vertical_segments(raw_vertices: &[ContourVertex], simplified: &mut Vec<usize>) {
    let same_column = |a: usize, b: usize| {
        let a = raw_vertices[a].position;
        let b = raw_vertices[b].position;
        a.x == b.x && a.z == b.z
    };
    simplified.dedup_by(|current, previous| same_column(*current, *previous));
    while simplified.len() > 1 && same_column(simplified[0], simplified[simplified.len() - 1]) {
        simplified.pop();
    }
}

/// Removes vertices between two null-bordering edges when one of those edges crosses another part of
/// the contour.
fn remove_self_intersections(
    raw_vertices: &[ContourVertex],
    simplified: &mut Vec<usize>,
    borders_null: &impl Fn(usize) -> bool,
) {
    let point = |raw: usize| {
        let position = raw_vertices[raw].position;
        [position.x as i64, position.z as i64]
    };
    loop {
        let count = simplified.len();
        if count < 4 {
            return;
        }
        let crosses = |from: usize, to: usize, skip: [usize; 3]| {
            (0..count).filter(|j| !skip.contains(j)).any(|j| {
                segments_intersect_properly(
                    point(simplified[from]),
                    point(simplified[to]),
                    point(simplified[j]),
                    point(simplified[(j + 1) % count]),
                )
            })
        };
        let intersecting = (0..count).find(|&k| {
            let previous = (k + count - 1) % count;
            let next = (k + 1) % count;
            if !borders_null(simplified[previous]) || !borders_null(simplified[k]) {
                return false;
            }
            let before_previous = (previous + count - 1) % count;
            crosses(previous, k, [before_previous, previous, k])
                || crosses(k, next, [previous, k, next])
        });
        let Some(k) = intersecting else {
            return;
        };
        tracing::trace!(vertex = simplified[k], "removed self-intersecting contour vertex");
        simplified.remove(k);
    }
}

/// A vertex of a raw contour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ContourVertex {
    /// The corner in field space as `(x, height, z)`.
    pub position: U16Vec3,
    /// The region across the border edge this vertex was emitted for.
    pub neighbour_region: RegionId,
}

/// Represents a simple, non-overlapping contour in field space.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Contour {
    /// Region ID of the contour.
    pub region: RegionId,
    /// The vertices of the exact region outline, in walk order.
    pub raw_vertices: Vec<ContourVertex>,
    /// The simplified outline, a subsequence of the raw vertex positions wound clockwise.
    pub vertices: Vec<U16Vec3>,
}

/// Represents a group of related contours.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ContourSet {
    /// An array of the contours in the set.
    pub contours: Vec<Contour>,
    /// The AABB in world space
    pub aabb: Aabb3d,
    /// The size of each cell. (On the xz-plane.)
    pub cell_size: f32,
    /// The height of each cell. (The minimum increment along the y-axis.)
    pub cell_height: f32,
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashSet};

    use glam::Vec3A;

    use crate::{
        heightfield::{HeightfieldBuilder, SpanInsertion},
        span::SpanBuilder,
    };

    use super::*;

    /// A flat field where the character at a position is its region and `.` is the null region.
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
            for x in 0..row.len() {
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
            span.region = match rows[span.z as usize].as_bytes()[span.x as usize] {
                b'.' => RegionId::NONE,
                digit => RegionId((digit - b'0') as u16),
            };
        }
        field
    }

    fn planar_vertices(contour: &Contour) -> BTreeSet<(u16, u16)> {
        contour.vertices.iter().map(|v| (v.x, v.z)).collect()
    }

    #[test]
    fn square_region_becomes_four_corners() {
        let mut field = field_with_regions(&["1111", "1111", "1111", "1111"]);
        let contours = field.build_contours(1.0, 0.0);
        assert_eq!(contours.contours.len(), 1);
        let contour = &contours.contours[0];
        assert_eq!(contour.region, RegionId(1));
        assert_eq!(contour.raw_vertices.len(), 16);
        assert_eq!(
            planar_vertices(contour),
            BTreeSet::from([(0, 0), (0, 4), (4, 0), (4, 4)])
        );
        assert!(contour.vertices.iter().all(|v| v.y == 1));
    }

    #[test]
    fn region_portals_are_kept() {
        let mut field = field_with_regions(&["1122", "1122"]);
        let contours = field.build_contours(0.5, 0.0);
        assert_eq!(contours.contours.len(), 2);
        let first = &contours.contours[0];
        assert_eq!(first.region, RegionId(1));
        assert_eq!(
            first.vertices,
            vec![
                U16Vec3::new(2, 1, 2),
                U16Vec3::new(2, 1, 0),
                U16Vec3::new(0, 1, 0),
                U16Vec3::new(0, 1, 2),
            ]
        );
        let second = &contours.contours[1];
        assert_eq!(second.region, RegionId(2));
        assert_eq!(
            planar_vertices(second),
            BTreeSet::from([(2, 0), (2, 2), (4, 0), (4, 2)])
        );
    }

    #[test]
    fn long_null_edges_are_split() {
        let mut field = field_with_regions(&["11111111", "11111111"]);
        let contours = field.build_contours(100.0, 2.0);
        assert_eq!(contours.contours.len(), 1);
        let vertices = &contours.contours[0].vertices;
        for (i, vertex) in vertices.iter().enumerate() {
            let next = vertices[(i + 1) % vertices.len()];
            let dx = vertex.x as f32 - next.x as f32;
            let dz = vertex.z as f32 - next.z as f32;
            assert!(dx * dx + dz * dz <= 4.0, "edge {vertex} -> {next} is too long");
        }
    }

    #[test]
    fn collapsed_contour_is_skipped() {
        let mut field = field_with_regions(&["11111111", "11111111"]);
        let contours = field.build_contours(100.0, 0.0);
        assert!(contours.contours.is_empty());
    }

    #[test]
    fn island_spans_produce_no_contour() {
        let mut field = field_with_regions(&["...", ".1.", "..."]);
        let contours = field.build_contours(1.0, 0.0);
        assert!(contours.contours.is_empty());
        assert!(field.spans.iter().all(|span| span.neighbour_flags == 0));
    }

    #[test]
    fn simplified_vertices_come_from_the_raw_outline() {
        let mut field = field_with_regions(&[
            "11111", //
            "11.11", //
            "1111.", //
            "11...", //
        ]);
        let contours = field.build_contours(0.5, 3.0);
        for contour in &contours.contours {
            let raw: HashSet<_> = contour.raw_vertices.iter().map(|v| v.position).collect();
            assert!(contour.vertices.iter().all(|v| raw.contains(v)));
            assert!(contour.vertices.len() > 2);
        }
    }

    /// Raw vertices bordering the null region, given as `(x, height, z)`.
    fn raw_outline(points: &[(u16, u16, u16)]) -> Vec<ContourVertex> {
        points
            .iter()
            .map(|&(x, y, z)| ContourVertex {
                position: U16Vec3::new(x, y, z),
                neighbour_region: RegionId::NONE,
            })
            .collect()
    }

    #[test]
    fn deviation_at_threshold_is_not_inserted() {
        // Raw vertex 1 lies exactly one cell off the edge 0 -> 2.
        let raw = raw_outline(&[(0, 0, 0), (2, 0, 1), (4, 0, 0), (4, 0, 4), (0, 0, 4)]);

        let mut simplified = vec![0, 2, 3, 4];
        insert_deviating_vertices(&raw, &mut simplified, 1.0, &|_| true);
        assert_eq!(simplified, vec![0, 2, 3, 4]);

        insert_deviating_vertices(&raw, &mut simplified, 0.9, &|_| true);
        assert_eq!(simplified, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn deviation_along_region_portal_is_ignored() {
        let raw = raw_outline(&[(0, 0, 0), (2, 0, 1), (4, 0, 0), (4, 0, 4), (0, 0, 4)]);
        let mut simplified = vec![0, 2, 3, 4];
        insert_deviating_vertices(&raw, &mut simplified, 0.5, &|vertex| vertex != 0);
        assert_eq!(simplified, vec![0, 2, 3, 4]);
    }

    #[test]
    fn vertical_segments_collapse_to_one_vertex() {
        let raw = raw_outline(&[(0, 1, 0), (0, 3, 0), (4, 1, 0), (4, 1, 4), (0, 2, 0)]);
        let mut simplified = vec![0, 1, 2, 3, 4];
        remove_vertical_segments(&raw, &mut simplified);
        assert_eq!(simplified, vec![0, 2, 3]);
    }

    #[test]
    fn vertical_segment_across_wrap_is_removed() {
        let raw = raw_outline(&[(0, 1, 0), (4, 1, 0), (4, 1, 4), (0, 2, 0)]);
        let mut simplified = vec![0, 1, 2, 3];
        remove_vertical_segments(&raw, &mut simplified);
        assert_eq!(simplified, vec![0, 1, 2]);
    }

    #[test]
    fn crossing_null_edge_drops_its_vertex() {
        // A bow tie: 0 -> 1 crosses 2 -> 3.
        let raw = raw_outline(&[(0, 0, 0), (4, 0, 4), (4, 0, 0), (0, 0, 4)]);
        let mut simplified = vec![0, 1, 2, 3];
        remove_self_intersections(&raw, &mut simplified, &|_| true);
        assert_eq!(simplified, vec![1, 2, 3]);

        // Portal edges are never touched.
        let mut simplified = vec![0, 1, 2, 3];
        remove_self_intersections(&raw, &mut simplified, &|_| false);
        assert_eq!(simplified, vec![0, 1, 2, 3]);
    }

    #[test]
    fn simple_outline_has_no_self_intersections() {
        let raw = raw_outline(&[(0, 0, 0), (0, 0, 4), (4, 0, 4), (4, 0, 0)]);
        let mut simplified = vec![0, 1, 2, 3];
        remove_self_intersections(&raw, &mut simplified, &|_| true);
        assert_eq!(simplified, vec![0, 1, 2, 3]);
    }

    #[test]
    fn corner_height_uses_highest_floor() {
        let mut field = field_with_regions(&["11", "11"]);
        let lifted = field.cell_at(1, 1).index() as usize;
        field.spans[lifted].min = 3;
        let origin = field.cell_at(0, 0).index() as usize;
        // The corner clockwise of +z is shared by all four spans.
        assert_eq!(field.corner_height(origin, 1), 3);
        assert_eq!(field.corner_height(origin, 3), 1);
    }
}
