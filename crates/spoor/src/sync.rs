//! Synchronization graph: pairwise clock-transform relationships between
//! traces.
//!
//! A directed multigraph over trace identifiers. Each edge carries an opaque
//! transform label (typically an affine time correction computed by an
//! external alignment algorithm from matched-event pairs). Edges are added
//! only in the direction they were computed; callers wanting a symmetric
//! relation add the inverse edge explicitly.
//!
//! # Directionality
//!
//! [`shortest_path`](SyncGraph::shortest_path) respects edge direction,
//! while [`is_connected`](SyncGraph::is_connected) deliberately ignores it:
//! alignment data is often collected in one direction per trace pair, and a
//! corpus counts as synchronizable when some undirected path links every
//! trace. Direction-correct composition is the transform-application
//! layer's job; this asymmetry is intentional and must be preserved.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// A directed transform edge between two trace identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEdge<V, T> {
    /// Trace the transform maps from.
    pub from: V,
    /// Trace the transform maps to.
    pub to: V,
    /// Opaque transform label (e.g. an affine time correction).
    pub transform: T,
}

/// A directed multigraph of clock-transform edges between traces.
///
/// Built incrementally via [`add_edge`](Self::add_edge), then queried
/// read-only.
#[derive(Debug, Clone)]
pub struct SyncGraph<V, T> {
    vertices: Vec<V>,
    vertex_ids: HashMap<V, usize>,
    edges: Vec<SyncEdge<V, T>>,
    edge_endpoints: Vec<(usize, usize)>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl<V, T> Default for SyncGraph<V, T>
where
    V: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, T> SyncGraph<V, T>
where
    V: Clone + Eq + Hash,
{
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            vertex_ids: HashMap::new(),
            edges: Vec::new(),
            edge_endpoints: Vec::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    /// Appends a directed edge carrying a transform label. O(1).
    ///
    /// Vertices are created on first mention. The inverse relation is not
    /// implied; add the inverse edge explicitly if it exists.
    pub fn add_edge(&mut self, from: V, to: V, transform: T) {
        let from_id = self.intern(&from);
        let to_id = self.intern(&to);
        let edge_id = self.edges.len();

        self.edges.push(SyncEdge {
            from,
            to,
            transform,
        });
        self.edge_endpoints.push((from_id, to_id));
        self.outgoing[from_id].push(edge_id);
        self.incoming[to_id].push(edge_id);
    }

    /// Returns the shortest directed path from `start` to `end` as a
    /// sequence of edges.
    ///
    /// Unweighted BFS over hop count: when several shortest paths exist,
    /// the one using the earliest-inserted edge at each step wins. Returns
    /// an empty path for `start == end`, for vertices absent from the
    /// graph, and for an unreachable `end` — use
    /// [`is_reachable`](Self::is_reachable) to distinguish the trivial path
    /// from "no path exists".
    pub fn shortest_path(&self, start: &V, end: &V) -> Vec<&SyncEdge<V, T>> {
        let (Some(&start_id), Some(&end_id)) =
            (self.vertex_ids.get(start), self.vertex_ids.get(end))
        else {
            return Vec::new();
        };
        if start_id == end_id {
            return Vec::new();
        }

        // BFS recording the first edge used to reach each vertex.
        let mut predecessor: Vec<Option<usize>> = vec![None; self.vertices.len()];
        let mut visited = vec![false; self.vertices.len()];
        let mut queue = VecDeque::new();
        visited[start_id] = true;
        queue.push_back(start_id);

        'search: while let Some(vertex) = queue.pop_front() {
            for &edge_id in &self.outgoing[vertex] {
                let (_, target) = self.edge_endpoints[edge_id];
                if !visited[target] {
                    visited[target] = true;
                    predecessor[target] = Some(edge_id);
                    if target == end_id {
                        break 'search;
                    }
                    queue.push_back(target);
                }
            }
        }

        if !visited[end_id] {
            return Vec::new();
        }

        // Walk predecessor edges backward from end to start, then reverse.
        let mut path = Vec::new();
        let mut current = end_id;
        while current != start_id {
            // Every visited vertex other than start has a predecessor edge.
            let Some(edge_id) = predecessor[current] else {
                return Vec::new();
            };
            path.push(&self.edges[edge_id]);
            current = self.edge_endpoints[edge_id].0;
        }
        path.reverse();
        path
    }

    /// Returns true if `end` is reachable from `start` following edge
    /// direction.
    ///
    /// Absent vertices are unreachable; a vertex is trivially reachable
    /// from itself.
    pub fn is_reachable(&self, start: &V, end: &V) -> bool {
        let (Some(&start_id), Some(&end_id)) =
            (self.vertex_ids.get(start), self.vertex_ids.get(end))
        else {
            return false;
        };
        if start_id == end_id {
            return true;
        }

        let mut visited = vec![false; self.vertices.len()];
        let mut queue = VecDeque::new();
        visited[start_id] = true;
        queue.push_back(start_id);

        while let Some(vertex) = queue.pop_front() {
            for &edge_id in &self.outgoing[vertex] {
                let (_, target) = self.edge_endpoints[edge_id];
                if target == end_id {
                    return true;
                }
                if !visited[target] {
                    visited[target] = true;
                    queue.push_back(target);
                }
            }
        }
        false
    }

    /// Returns true if every vertex is reachable from every other when
    /// edges are treated as undirected.
    ///
    /// Weaker than strong connectivity, deliberately: one direction of
    /// alignment data per trace pair is enough for the corpus to count as
    /// synchronizable. Trivially true for an empty or single-vertex graph.
    pub fn is_connected(&self) -> bool {
        if self.vertices.len() <= 1 {
            return true;
        }

        let mut visited = vec![false; self.vertices.len()];
        let mut queue = VecDeque::new();
        visited[0] = true;
        queue.push_back(0);
        let mut seen = 1usize;

        while let Some(vertex) = queue.pop_front() {
            let neighbors = self.outgoing[vertex]
                .iter()
                .map(|&edge_id| self.edge_endpoints[edge_id].1)
                .chain(
                    self.incoming[vertex]
                        .iter()
                        .map(|&edge_id| self.edge_endpoints[edge_id].0),
                );
            for neighbor in neighbors {
                if !visited[neighbor] {
                    visited[neighbor] = true;
                    seen += 1;
                    queue.push_back(neighbor);
                }
            }
        }

        seen == self.vertices.len()
    }

    /// Returns the number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Returns the number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns all vertices in first-mention order.
    pub fn vertices(&self) -> impl Iterator<Item = &V> {
        self.vertices.iter()
    }

    /// Returns all edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &SyncEdge<V, T>> {
        self.edges.iter()
    }

    fn intern(&mut self, vertex: &V) -> usize {
        if let Some(&id) = self.vertex_ids.get(vertex) {
            return id;
        }
        let id = self.vertices.len();
        self.vertices.push(vertex.clone());
        self.vertex_ids.insert(vertex.clone(), id);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }
}
