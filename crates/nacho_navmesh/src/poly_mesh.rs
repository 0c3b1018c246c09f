use std::collections::HashMap;

use glam::{U16Vec3, Vec2, Vec3A};

use crate::{
    contours::{Contour, ContourSet},
    math::{Aabb3d, area2, closest_point_on_segment},
    region::RegionId,
};

/// Represents a polygon mesh suitable for use in building a navigation mesh.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PolygonMesh {
    /// The mesh vertices in field space as `(x, height, z)`. Each position appears once.
    pub vertices: Vec<U16Vec3>,
    /// The convex polygons of the mesh.
    pub polygons: Vec<Polygon>,
    /// The bounding box of the mesh in world space.
    pub aabb: Aabb3d,
    /// The size of each cell. (On the xz-plane.)
    pub cell_size: f32,
    /// The height of each cell. (The minimum increment along the y-axis.)
    pub cell_height: f32,
    /// The maximum number of vertices per polygon
    pub max_vertices_per_polygon: usize,
}

/// A convex polygon, wound clockwise on the xz-plane.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Polygon {
    /// Indices into [`PolygonMesh::vertices`].
    pub vertices: Vec<u32>,
    /// The region the polygon was built from.
    pub region: RegionId,
}

impl ContourSet {
    /// Builds a polygon mesh from the provided contours.
    ///
    /// Every contour is triangulated, then its triangles are merged greedily into convex polygons of at
    /// most `max_vertices_per_polygon` vertices, longest shared edge first.
    pub fn into_polygon_mesh(self, max_vertices_per_polygon: usize) -> PolygonMesh {
        let mut mesh = PolygonMesh {
            vertices: Vec::with_capacity(self.contours.iter().map(|c| c.vertices.len()).sum()),
            polygons: Vec::new(),
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            max_vertices_per_polygon,
        };
        let mut vertex_lookup: HashMap<[u16; 3], u32> = HashMap::new();

        for contour in &self.contours {
            let Some(vertices) = clockwise_vertices(contour) else {
                tracing::warn!(
                    region = contour.region.0,
                    vertices = contour.vertices.len(),
                    "contour has no area, skipping"
                );
                continue;
            };
            let points: Vec<[i64; 2]> = vertices.iter().map(|v| planar(*v)).collect();

            let mut polygons = Vec::with_capacity(vertices.len() - 2);
            for [a, b, c] in triangulate(&points) {
                if area2(points[a], points[b], points[c]) == 0 {
                    continue;
                }
                let indices = [a, b, c].map(|i| mesh.add_vertex(&mut vertex_lookup, vertices[i]));
                if indices[0] == indices[1] || indices[1] == indices[2] || indices[0] == indices[2] {
                    continue;
                }
                polygons.push(Polygon {
                    vertices: indices.to_vec(),
                    region: contour.region,
                });
            }
            if polygons.is_empty() {
                tracing::warn!(
                    region = contour.region.0,
                    vertices = vertices.len(),
                    "contour could not be triangulated, skipping"
                );
                continue;
            }

            if max_vertices_per_polygon > 3 {
                mesh.merge_polygons(&mut polygons);
            }
            mesh.polygons.extend(polygons);
        }

        tracing::debug!(
            vertices = mesh.vertices.len(),
            polygons = mesh.polygons.len(),
            "built polygon mesh"
        );
        mesh
    }
}

/// The simplified contour vertices wound clockwise, or `None` if they enclose no area.
fn clockwise_vertices(contour: &Contour) -> Option<Vec<U16Vec3>> {
    let vertices = &contour.vertices;
    if vertices.len() < 3 {
        return None;
    }
    let doubled_area: i64 = (0..vertices.len())
        .map(|i| {
            let [ax, az] = planar(vertices[i]);
            let [bx, bz] = planar(vertices[(i + 1) % vertices.len()]);
            ax * bz - bx * az
        })
        .sum();
    match doubled_area {
        0 => None,
        area if area > 0 => Some(vertices.iter().rev().copied().collect()),
        _ => Some(vertices.clone()),
    }
}

fn planar(vertex: U16Vec3) -> [i64; 2] {
    [vertex.x as i64, vertex.z as i64]
}

/// Ear clipping of a clockwise polygon. Always returns `points.len() - 2` triangles, wound clockwise.
///
/// Proper ears are strictly convex and contain no other vertex. When none is left the most convex
/// corner is clipped instead, so slightly broken outlines still produce a cover.
fn triangulate(points: &[[i64; 2]]) -> Vec<[usize; 3]> {
    let mut remaining: Vec<usize> = (0..points.len()).collect();
    let mut triangles = Vec::with_capacity(points.len().saturating_sub(2));
    while remaining.len() > 3 {
        let count = remaining.len();
        let corner = |k: usize| {
            [
                remaining[(k + count - 1) % count],
                remaining[k],
                remaining[(k + 1) % count],
            ]
        };
        let is_ear = |k: usize| {
            let [a, b, c] = corner(k);
            if area2(points[a], points[b], points[c]) >= 0 {
                return false;
            }
            !remaining.iter().any(|&other| {
                let p = points[other];
                p != points[a]
                    && p != points[b]
                    && p != points[c]
                    && area2(points[a], points[b], p) <= 0
                    && area2(points[b], points[c], p) <= 0
                    && area2(points[c], points[a], p) <= 0
            })
        };
        let ear = (0..count).find(|&k| is_ear(k)).unwrap_or_else(|| {
            (0..count)
                .min_by_key(|&k| {
                    let [a, b, c] = corner(k);
                    area2(points[a], points[b], points[c])
                })
                .unwrap_or(0)
        });
        triangles.push(corner(ear));
        remaining.remove(ear);
    }
    if let [a, b, c] = remaining[..] {
        triangles.push([a, b, c]);
    }
    triangles
}

impl PolygonMesh {
    fn add_vertex(&mut self, lookup: &mut HashMap<[u16; 3], u32>, vertex: U16Vec3) -> u32 {
        *lookup.entry(vertex.to_array()).or_insert_with(|| {
            self.vertices.push(vertex);
            (self.vertices.len() - 1) as u32
        })
    }

    /// Merges pairs of polygons until no valid merge remains.
    fn merge_polygons(&self, polygons: &mut Vec<Polygon>) {
        loop {
            let mut best: Option<(f32, usize, usize, usize, usize)> = None;
            for a in 0..polygons.len() {
                for b in a + 1..polygons.len() {
                    let Some((edge_length, i, j)) = self.merge_info(&polygons[a], &polygons[b])
                    else {
                        continue;
                    };
                    if best.is_none_or(|(longest, ..)| edge_length > longest) {
                        best = Some((edge_length, a, i, b, j));
                    }
                }
            }
            let Some((_, a, i, b, j)) = best else {
                return;
            };

            let poly_b = polygons.remove(b);
            let poly_a = &mut polygons[a];
            let count_a = poly_a.vertices.len();
            let count_b = poly_b.vertices.len();
            let mut merged = Vec::with_capacity(count_a + count_b - 2);
            merged.extend((0..count_a - 1).map(|k| poly_a.vertices[(i + 1 + k) % count_a]));
            merged.extend((0..count_b - 1).map(|k| poly_b.vertices[(j + 1 + k) % count_b]));
            tracing::trace!(
                vertices = merged.len(),
                region = poly_a.region.0,
                "merged polygons"
            );
            poly_a.vertices = merged;
        }
    }

    /// Checks whether two polygons can be merged into a convex polygon within the vertex limit.
    ///
    /// Returns the squared length of the shared edge and the edge's start index in both polygons.
    fn merge_info(&self, a: &Polygon, b: &Polygon) -> Option<(f32, usize, usize)> {
        let count_a = a.vertices.len();
        let count_b = b.vertices.len();
        if count_a + count_b - 2 > self.max_vertices_per_polygon {
            return None;
        }

        let (i, j) = (0..count_a).find_map(|i| {
            let start = a.vertices[i];
            let end = a.vertices[(i + 1) % count_a];
            (0..count_b)
                .find(|&j| b.vertices[j] == end && b.vertices[(j + 1) % count_b] == start)
                .map(|j| (i, j))
        })?;

        let point = |index: u32| planar(self.vertices[index as usize]);
        // Both vertices of the shared edge must stay convex corners of the merged polygon.
        let previous = a.vertices[(i + count_a - 1) % count_a];
        let next = b.vertices[(j + 2) % count_b];
        if area2(point(previous), point(next), point(a.vertices[i])) <= 0 {
            return None;
        }
        let previous = b.vertices[(j + count_b - 1) % count_b];
        let next = a.vertices[(i + 2) % count_a];
        if area2(point(previous), point(next), point(b.vertices[j])) <= 0 {
            return None;
        }

        let [sx, sz] = point(a.vertices[i]);
        let [ex, ez] = point(a.vertices[(i + 1) % count_a]);
        let (dx, dz) = ((sx - ex) as f32, (sz - ez) as f32);
        Some((dx * dx + dz * dz, i, j))
    }

    /// The world position of a mesh vertex.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn vertex_world_position(&self, index: u32) -> Vec3A {
        let vertex = self.vertices[index as usize];
        self.aabb.min
            + Vec3A::new(
                vertex.x as f32 * self.cell_size,
                vertex.y as f32 * self.cell_height,
                vertex.z as f32 * self.cell_size,
            )
    }

    /// The average world position of a polygon's vertices.
    ///
    /// # Panics
    ///
    /// Panics if `polygon` is out of bounds.
    pub fn polygon_centroid(&self, polygon: usize) -> Vec3A {
        let vertices = &self.polygons[polygon].vertices;
        let sum: Vec3A = vertices
            .iter()
            .map(|&v| self.vertex_world_position(v))
            .sum();
        sum / vertices.len().max(1) as f32
    }

    /// Whether the world point lies inside the polygon or on its border, ignoring height.
    ///
    /// # Panics
    ///
    /// Panics if `polygon` is out of bounds.
    pub fn polygon_contains_xz(&self, polygon: usize, point: Vec3A) -> bool {
        let vertices = &self.polygons[polygon].vertices;
        let tolerance = self.cell_size * self.cell_size * 1e-3;
        (0..vertices.len()).all(|i| {
            let a = self.vertex_world_position(vertices[i]);
            let b = self.vertex_world_position(vertices[(i + 1) % vertices.len()]);
            let cross = (b.x - a.x) * (point.z - a.z) - (point.x - a.x) * (b.z - a.z);
            cross <= tolerance
        })
    }

    /// The point of the polygon closest to `point` on the xz-plane, at the polygon's average height.
    ///
    /// # Panics
    ///
    /// Panics if `polygon` is out of bounds.
    pub fn closest_point_on_polygon(&self, polygon: usize, point: Vec3A) -> Vec3A {
        let height = self.polygon_centroid(polygon).y;
        if self.polygon_contains_xz(polygon, point) {
            return Vec3A::new(point.x, height, point.z);
        }
        let vertices = &self.polygons[polygon].vertices;
        let target = Vec2::new(point.x, point.z);
        let closest = (0..vertices.len())
            .map(|i| {
                let a = self.vertex_world_position(vertices[i]);
                let b = self.vertex_world_position(vertices[(i + 1) % vertices.len()]);
                closest_point_on_segment(target, Vec2::new(a.x, a.z), Vec2::new(b.x, b.z))
            })
            .min_by(|a, b| {
                a.distance_squared(target)
                    .total_cmp(&b.distance_squared(target))
            })
            .unwrap_or(target);
        Vec3A::new(closest.x, height, closest.y)
    }
}
