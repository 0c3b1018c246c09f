//! The vertex graph of a [`PolygonMesh`] and A* search over it.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, BinaryHeap},
};

use glam::Vec3A;

use crate::poly_mesh::PolygonMesh;

/// A graph with one node per polygon mesh vertex, connected along the polygon edges.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavGraph {
    /// The nodes, indexed like [`PolygonMesh::vertices`].
    pub nodes: Vec<NavNode>,
}

/// A node of a [`NavGraph`].
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavNode {
    /// The world position of the vertex.
    pub position: Vec3A,
    /// The reachable nodes and the cost of moving there.
    pub neighbours: BTreeMap<usize, f32>,
    /// The polygons this vertex belongs to.
    pub polygons: BTreeSet<usize>,
}

impl NavGraph {
    /// Connects every mesh vertex to its previous and next vertex in each polygon containing it.
    ///
    /// Costs are world distances. An edge shared by two polygons keeps the lower cost.
    pub fn from_polygon_mesh(mesh: &PolygonMesh) -> Self {
        let mut nodes: Vec<NavNode> = (0..mesh.vertices.len())
            .map(|i| NavNode {
                position: mesh.vertex_world_position(i as u32),
                ..Default::default()
            })
            .collect();

        for (polygon_index, polygon) in mesh.polygons.iter().enumerate() {
            let count = polygon.vertices.len();
            for k in 0..count {
                let vertex = polygon.vertices[k] as usize;
                let neighbours = [
                    polygon.vertices[(k + count - 1) % count] as usize,
                    polygon.vertices[(k + 1) % count] as usize,
                ];
                nodes[vertex].polygons.insert(polygon_index);
                for neighbour in neighbours {
                    let cost = nodes[vertex].position.distance(nodes[neighbour].position);
                    nodes[vertex]
                        .neighbours
                        .entry(neighbour)
                        .and_modify(|old| *old = old.min(cost))
                        .or_insert(cost);
                }
            }
        }

        tracing::debug!(nodes = nodes.len(), "built navigation graph");
        Self { nodes }
    }

    /// Finds a path from `start` to `goal` through the graph.
    ///
    /// `start` connects to every node in `start_nodes`, and every node in `goal_nodes` connects to
    /// `goal`. Returns the world positions from `start` to `goal`, both included, or `None` if the goal
    /// is unreachable.
    pub fn find_path(
        &self,
        start: Vec3A,
        start_nodes: &[u32],
        goal: Vec3A,
        goal_nodes: &[u32],
    ) -> Option<Vec<Vec3A>> {
        let node_count = self.nodes.len();
        let virtual_start = node_count;
        let virtual_goal = node_count + 1;

        let position = |node: usize| match node {
            n if n == virtual_start => start,
            n if n == virtual_goal => goal,
            n => self.nodes[n].position,
        };
        let heuristic = |node: usize| position(node).distance_squared(goal);
        let goal_cost: BTreeMap<usize, f32> = goal_nodes
            .iter()
            .map(|&n| (n as usize, self.nodes[n as usize].position.distance(goal)))
            .collect();

        let mut g_score = vec![f32::INFINITY; node_count + 2];
        let mut came_from: Vec<Option<usize>> = vec![None; node_count + 2];
        let mut closed = vec![false; node_count + 2];
        g_score[virtual_start] = 0.0;

        let mut open = BinaryHeap::new();
        open.push(OpenEntry {
            node: virtual_start,
            f_score: heuristic(virtual_start),
        });

        while let Some(current) = open.pop() {
            let current = current.node;
            if current == virtual_goal {
                return Some(reconstruct_path(&came_from, virtual_goal, &position));
            }
            if closed[current] {
                continue;
            }
            closed[current] = true;
            let current_g = g_score[current];

            let edges: Vec<(usize, f32)> = if current == virtual_start {
                start_nodes
                    .iter()
                    .map(|&n| (n as usize, start.distance(self.nodes[n as usize].position)))
                    .collect()
            } else {
                self.nodes[current]
                    .neighbours
                    .iter()
                    .map(|(&n, &cost)| (n, cost))
                    .chain(goal_cost.get(&current).map(|&cost| (virtual_goal, cost)))
                    .collect()
            };

            for (neighbour, cost) in edges {
                if closed[neighbour] {
                    continue;
                }
                let tentative_g = current_g + cost;
                if tentative_g < g_score[neighbour] {
                    g_score[neighbour] = tentative_g;
                    came_from[neighbour] = Some(current);
                    open.push(OpenEntry {
                        node: neighbour,
                        f_score: tentative_g + heuristic(neighbour),
                    });
                }
            }
        }
        None
    }
}

fn reconstruct_path(
    came_from: &[Option<usize>],
    goal: usize,
    position: impl Fn(usize) -> Vec3A,
) -> Vec<Vec3A> {
    let mut path = vec![position(goal)];
    let mut current = goal;
    while let Some(previous) = came_from[current] {
        path.push(position(previous));
        current = previous;
    }
    path.reverse();
    path
}

/// Entry in the A* open set (min-heap via reversed ordering).
struct OpenEntry {
    node: usize,
    f_score: f32,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f_score.total_cmp(&other.f_score) == Ordering::Equal && self.node == other.node
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap: smallest f_score is "greatest".
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.node.cmp(&self.node))
    }
}
