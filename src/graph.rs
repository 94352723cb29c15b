//! Undirected adjacency graph used for DOF-group and equation connectivity

use std::collections::BTreeSet;

/// Undirected graph over vertices `0..n` with ordered neighbour sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    adjacency: Vec<BTreeSet<usize>>,
}

impl Graph {
    /// Create a graph with `n` isolated vertices
    pub fn new(n: usize) -> Self {
        Self {
            adjacency: vec![BTreeSet::new(); n],
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.adjacency.len()
    }

    pub fn num_edges(&self) -> usize {
        self.adjacency.iter().map(|n| n.len()).sum::<usize>() / 2
    }

    /// Append a vertex and return its index
    pub fn add_vertex(&mut self) -> usize {
        self.adjacency.push(BTreeSet::new());
        self.adjacency.len() - 1
    }

    /// Connect two vertices. Self loops and out-of-range vertices are ignored.
    pub fn add_edge(&mut self, a: usize, b: usize) {
        let n = self.adjacency.len();
        if a == b || a >= n || b >= n {
            return;
        }
        self.adjacency[a].insert(b);
        self.adjacency[b].insert(a);
    }

    /// Connect every pair in `vertices`
    pub fn add_clique(&mut self, vertices: &[usize]) {
        for (i, &a) in vertices.iter().enumerate() {
            for &b in &vertices[i + 1..] {
                self.add_edge(a, b);
            }
        }
    }

    pub fn neighbors(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency[v].iter().copied()
    }

    pub fn degree(&self, v: usize) -> usize {
        self.adjacency[v].len()
    }

    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.adjacency.get(a).map_or(false, |n| n.contains(&b))
    }

    /// Merge another graph's edges into this one, growing it if needed
    pub fn merge(&mut self, other: &Graph) {
        while self.adjacency.len() < other.adjacency.len() {
            self.add_vertex();
        }
        for (v, neighbors) in other.adjacency.iter().enumerate() {
            for &u in neighbors {
                self.add_edge(v, u);
            }
        }
    }

    /// Largest |i - j| over all edges
    pub fn bandwidth(&self) -> usize {
        self.adjacency
            .iter()
            .enumerate()
            .flat_map(|(v, n)| n.iter().map(move |&u| v.abs_diff(u)))
            .max()
            .unwrap_or(0)
    }

    /// Edge list with `a < b`, used when graphs cross a partition boundary
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.adjacency
            .iter()
            .enumerate()
            .flat_map(|(v, n)| n.iter().filter(move |&&u| u > v).map(move |&u| (v, u)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clique_and_bandwidth() {
        let mut g = Graph::new(5);
        g.add_clique(&[0, 2, 4]);
        g.add_edge(1, 1);
        assert_eq!(g.num_edges(), 3);
        assert_eq!(g.degree(1), 0);
        assert!(g.has_edge(4, 0));
        assert_eq!(g.bandwidth(), 4);
    }

    #[test]
    fn test_merge_grows_graph() {
        let mut a = Graph::new(2);
        a.add_edge(0, 1);
        let mut b = Graph::new(4);
        b.add_edge(2, 3);
        a.merge(&b);
        assert_eq!(a.num_vertices(), 4);
        assert_eq!(a.edges(), vec![(0, 1), (2, 3)]);
    }
}
