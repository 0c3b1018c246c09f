//! Builds navmeshes for small hand-made levels and checks the result end to end.

use std::collections::HashMap;

use glam::{UVec3, Vec3A};
use nacho_navmesh::{
    Aabb3d, AgentProperties, BoundId, NavmeshBundle, NavmeshConfig, NavmeshConfigBuilder,
    QueryError, TriMesh, build_navmesh,
};

/// Appends an upward-facing rectangle at height `y`.
fn push_quad(trimesh: &mut TriMesh, min: [f32; 2], max: [f32; 2], y: f32) {
    let base = trimesh.vertices.len() as u32;
    trimesh.vertices.extend([
        Vec3A::new(min[0], y, min[1]),
        Vec3A::new(min[0], y, max[1]),
        Vec3A::new(max[0], y, max[1]),
        Vec3A::new(max[0], y, min[1]),
    ]);
    trimesh.indices.extend([
        UVec3::new(base, base + 1, base + 2),
        UVec3::new(base, base + 2, base + 3),
    ]);
}

fn bounds() -> Aabb3d {
    Aabb3d {
        min: Vec3A::new(0.0, -1.0, 0.0),
        max: Vec3A::new(10.0, 3.0, 10.0),
    }
}

fn builder() -> NavmeshConfigBuilder {
    NavmeshConfigBuilder {
        cell_size: 0.5,
        cell_height: 0.25,
        agent_height: 1.0,
        agent_radius: 0.0,
        max_ledge_height: 0.5,
        min_region_size: 0.5,
        max_edge_length: 0.0,
        max_vertices_per_polygon: 6,
        ..Default::default()
    }
}

fn build(trimesh: &TriMesh, config: &NavmeshConfig) -> NavmeshBundle {
    build_navmesh(BoundId(0), bounds(), trimesh, config).unwrap()
}

fn agent() -> AgentProperties {
    AgentProperties {
        radius: 0.3,
        height: 1.0,
    }
}

fn flat_plane() -> TriMesh {
    let mut trimesh = TriMesh::default();
    push_quad(&mut trimesh, [0.0, 0.0], [10.0, 10.0], 0.0);
    trimesh
}

/// A plane with a low, steep pyramid on a triangular footprint in its middle.
fn plane_with_spike() -> TriMesh {
    let mut trimesh = flat_plane();
    let base = trimesh.vertices.len() as u32;
    trimesh.vertices.extend([
        Vec3A::new(4.0, 0.0, 4.0),
        Vec3A::new(6.0, 0.0, 4.0),
        Vec3A::new(5.0, 0.0, 5.5),
        Vec3A::new(5.0, 0.9, 4.5),
    ]);
    trimesh.indices.extend([
        UVec3::new(base, base + 3, base + 1),
        UVec3::new(base + 1, base + 3, base + 2),
        UVec3::new(base + 2, base + 3, base),
    ]);
    trimesh
}

/// Two plateaus, the right one raised by `step`.
fn step(step: f32) -> TriMesh {
    let mut trimesh = TriMesh::default();
    push_quad(&mut trimesh, [0.0, 0.0], [5.25, 10.0], 0.0);
    push_quad(&mut trimesh, [5.25, 0.0], [10.0, 10.0], step);
    trimesh
}

fn polygon_area_xz(bundle: &NavmeshBundle, polygon: usize) -> f32 {
    let mesh = &bundle.polygon_mesh;
    let vertices = &mesh.polygons[polygon].vertices;
    let doubled: f32 = (0..vertices.len())
        .map(|i| {
            let a = mesh.vertex_world_position(vertices[i]);
            let b = mesh.vertex_world_position(vertices[(i + 1) % vertices.len()]);
            a.x * b.z - b.x * a.z
        })
        .sum();
    doubled.abs() / 2.0
}

#[track_caller]
fn assert_convex_and_capped(bundle: &NavmeshBundle) {
    let mesh = &bundle.polygon_mesh;
    for (index, polygon) in mesh.polygons.iter().enumerate() {
        let count = polygon.vertices.len();
        assert!(count >= 3, "polygon {index} has {count} vertices");
        assert!(
            count <= mesh.max_vertices_per_polygon,
            "polygon {index} has {count} vertices"
        );
        for i in 0..count {
            let a = mesh.vertex_world_position(polygon.vertices[i]);
            let b = mesh.vertex_world_position(polygon.vertices[(i + 1) % count]);
            let c = mesh.vertex_world_position(polygon.vertices[(i + 2) % count]);
            let cross = (b.x - a.x) * (c.z - a.z) - (c.x - a.x) * (b.z - a.z);
            assert!(cross <= 1e-4, "polygon {index} is reflex at vertex {i}");
        }
    }
}

/// The number of groups of polygons connected through shared edges.
fn polygon_components(bundle: &NavmeshBundle) -> usize {
    let polygons = &bundle.polygon_mesh.polygons;
    let mut edges: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
    for (index, polygon) in polygons.iter().enumerate() {
        let count = polygon.vertices.len();
        for i in 0..count {
            let a = polygon.vertices[i];
            let b = polygon.vertices[(i + 1) % count];
            edges.entry((a.min(b), a.max(b))).or_default().push(index);
        }
    }

    let mut component = vec![usize::MAX; polygons.len()];
    let mut components = 0;
    for start in 0..polygons.len() {
        if component[start] != usize::MAX {
            continue;
        }
        component[start] = components;
        let mut stack = vec![start];
        while let Some(index) = stack.pop() {
            let polygon = &polygons[index].vertices;
            for i in 0..polygon.len() {
                let a = polygon[i];
                let b = polygon[(i + 1) % polygon.len()];
                for &other in &edges[&(a.min(b), a.max(b))] {
                    if component[other] == usize::MAX {
                        component[other] = components;
                        stack.push(other);
                    }
                }
            }
        }
        components += 1;
    }
    components
}

#[track_caller]
fn assert_centroids_project_back(bundle: &NavmeshBundle) {
    let extent = Vec3A::splat(0.1);
    for polygon in 0..bundle.polygon_mesh.polygons.len() {
        let centroid = bundle.polygon_mesh.polygon_centroid(polygon);
        let projection = bundle.project_point(centroid, extent).unwrap();
        assert_eq!(projection.polygon, polygon);
        assert_eq!(projection.node_ref, bundle.node_refs[polygon]);
    }
}

#[test]
fn flat_plane_is_one_polygon() {
    let bundle = build(&flat_plane(), &builder().build().unwrap());

    assert_eq!(bundle.open_heightfield.regions.len(), 1);
    assert_eq!(bundle.contours.contours.len(), 1);
    assert_eq!(bundle.contours.contours[0].vertices.len(), 4);
    assert_eq!(bundle.polygon_mesh.polygons.len(), 1);
    assert_convex_and_capped(&bundle);
    assert_centroids_project_back(&bundle);

    // The outermost ring of cells is a ledge towards the void.
    let area: f32 = (0..bundle.polygon_mesh.polygons.len())
        .map(|polygon| polygon_area_xz(&bundle, polygon))
        .sum();
    approx::assert_relative_eq!(area, 81.0, epsilon = 1e-3);

    let start = Vec3A::new(1.0, 0.0, 1.0);
    let end = Vec3A::new(9.0, 0.0, 9.0);
    let path = bundle.find_path(&agent(), start, end).unwrap();
    assert_eq!(path.len(), 2);
    approx::assert_relative_eq!(path[0].x, start.x);
    approx::assert_relative_eq!(path[0].z, start.z);
    approx::assert_relative_eq!(path[1].x, end.x);
    approx::assert_relative_eq!(path[1].z, end.z);
}

#[test]
fn steep_obstacle_leaves_a_hole() {
    let bundle = build(&plane_with_spike(), &builder().build().unwrap());
    // The hole would be lost in a single outline, so its surrounding region is split in two.
    assert_eq!(bundle.open_heightfield.regions.len(), 2);
    assert_eq!(bundle.contours.contours.len(), 2);
    assert_convex_and_capped(&bundle);
    assert_centroids_project_back(&bundle);

    let mesh = &bundle.polygon_mesh;
    let around_hole = (0..mesh.vertices.len() as u32)
        .map(|i| mesh.vertex_world_position(i))
        .filter(|p| (3.0..=7.0).contains(&p.x) && (3.0..=7.0).contains(&p.z))
        .count();
    assert!(around_hole >= 4, "only {around_hole} vertices around the hole");

    for point in [
        Vec3A::new(5.0, 0.0, 4.5),
        Vec3A::new(4.75, 0.0, 4.5),
        Vec3A::new(5.25, 0.0, 4.5),
    ] {
        for polygon in 0..mesh.polygons.len() {
            assert!(
                !mesh.polygon_contains_xz(polygon, point),
                "polygon {polygon} covers the hole at {point}"
            );
        }
    }
    let centre = Vec3A::new(5.0, 0.0, 4.5);
    assert_eq!(
        bundle.project_point(centre, Vec3A::new(0.3, 1.0, 0.3)),
        Err(QueryError::NotFound { point: centre })
    );

    // Walking around the hole still works.
    let path = bundle
        .find_path(
            &agent(),
            Vec3A::new(2.0, 0.0, 5.0),
            Vec3A::new(8.0, 0.0, 5.0),
        )
        .unwrap();
    assert!(path.len() > 2);
    for point in &path {
        assert!(
            !((4.1..=5.9).contains(&point.x) && (4.1..=4.9).contains(&point.z)),
            "path crosses the hole at {point}"
        );
    }
}

/// Builds the step scenario with the given ledge height.
fn build_step(max_ledge_height: f32) -> NavmeshBundle {
    let config = NavmeshConfigBuilder {
        max_ledge_height,
        ..builder()
    }
    .build()
    .unwrap();
    build(&step(0.5), &config)
}

fn walk_up_the_step(bundle: &NavmeshBundle) -> Result<Vec<Vec3A>, QueryError> {
    bundle.find_path(
        &agent(),
        Vec3A::new(2.0, 0.0, 5.0),
        Vec3A::new(8.0, 0.5, 5.0),
    )
}

#[test]
fn step_below_ledge_height_connects_plateaus() {
    // One cell of headroom above the step.
    let bundle = build_step(0.75);
    assert_eq!(bundle.open_heightfield.regions.len(), 1);
    assert_eq!(polygon_components(&bundle), 1);
    assert_convex_and_capped(&bundle);
    assert_centroids_project_back(&bundle);

    let path = walk_up_the_step(&bundle).unwrap();
    assert!(path.len() >= 2);
}

#[test]
fn step_at_ledge_height_is_not_climbable() {
    // Both sides stay walkable, but a step must be strictly lower than the ledge height to link them.
    let bundle = build_step(0.5);
    assert_eq!(bundle.open_heightfield.regions.len(), 2);
    assert_eq!(polygon_components(&bundle), 2);
    assert_convex_and_capped(&bundle);
    let walkable_columns = bundle
        .open_heightfield
        .spans
        .iter()
        .filter(|span| span.z == 10)
        .count();
    assert_eq!(walkable_columns, 18);

    assert_eq!(walk_up_the_step(&bundle), Err(QueryError::PathNotFound));
}

#[test]
fn step_above_ledge_height_splits_plateaus() {
    // One cell short of the step.
    let bundle = build_step(0.25);
    assert_eq!(bundle.open_heightfield.regions.len(), 2);
    assert_eq!(polygon_components(&bundle), 2);
    assert_convex_and_capped(&bundle);
    let heights: Vec<_> = bundle
        .open_heightfield
        .regions
        .iter()
        .map(|region| bundle.open_heightfield.spans[region.spans[0]].min)
        .collect();
    assert_ne!(heights[0], heights[1]);

    assert_eq!(walk_up_the_step(&bundle), Err(QueryError::PathNotFound));
}

#[test]
fn regions_respect_minimum_size() {
    let config = NavmeshConfigBuilder {
        min_region_size: 2.0,
        ..builder()
    }
    .build()
    .unwrap();
    let bundle = build(&step(0.5), &config);
    assert!(!bundle.open_heightfield.regions.is_empty());
    for region in &bundle.open_heightfield.regions {
        assert!(
            region.spans.len() > config.min_spans_for_regions,
            "region {:?} has only {} spans",
            region.id,
            region.spans.len()
        );
    }
}
