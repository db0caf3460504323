//! Generic directed graph with deterministic topological ordering.
//!
//! The slicing engine orders dependent cells with this graph: nodes are added
//! in log order, edges point from producers to consumers, and `topo_sort`
//! returns a linearization that respects every edge while breaking ties by
//! insertion order. Nodes are identified by a caller-supplied key extractor so
//! the graph can hold borrowed or owned values without imposing `Eq` on them.

use std::collections::HashMap;

// ============================================================================
// DiGraph
// ============================================================================

/// A directed graph over values of type `T`, keyed by `key_of`.
///
/// Inserting the same key twice (directly or via `add_edge`) reuses the
/// existing node; parallel edges collapse to one.
pub struct DiGraph<T, F>
where
    F: Fn(&T) -> String,
{
    key_of: F,
    nodes: Vec<T>,
    index: HashMap<String, usize>,
    edges: Vec<(usize, usize)>,
}

impl<T, F> DiGraph<T, F>
where
    F: Fn(&T) -> String,
{
    pub fn new(key_of: F) -> Self {
        DiGraph {
            key_of,
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
        }
    }

    /// Adds a node if its key is not already present. Returns its index.
    pub fn add_node(&mut self, node: T) -> usize {
        let key = (self.key_of)(&node);
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.nodes.len();
        self.index.insert(key, i);
        self.nodes.push(node);
        i
    }

    /// Adds a directed edge, inserting either endpoint as needed.
    pub fn add_edge(&mut self, from: T, to: T) {
        let f = self.add_node(from);
        let t = self.add_node(to);
        if !self.edges.contains(&(f, t)) {
            self.edges.push((f, t));
        }
    }

    /// All nodes, in insertion order.
    pub fn nodes(&self) -> &[T] {
        &self.nodes
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Topological order over all nodes.
    ///
    /// Kahn's algorithm, always draining the ready node with the smallest
    /// insertion index, so independent nodes keep their insertion order.
    /// Nodes trapped in a cycle are appended afterwards in insertion order
    /// rather than dropped; callers that never build cycles are unaffected.
    pub fn topo_sort(&self) -> Vec<T>
    where
        T: Clone,
    {
        let n = self.nodes.len();
        let mut indegree = vec![0usize; n];
        for &(_, t) in &self.edges {
            indegree[t] += 1;
        }

        let mut emitted = vec![false; n];
        let mut order = Vec::with_capacity(n);
        loop {
            let next = (0..n).find(|&i| !emitted[i] && indegree[i] == 0);
            let Some(i) = next else { break };
            emitted[i] = true;
            order.push(self.nodes[i].clone());
            for &(f, t) in &self.edges {
                if f == i {
                    indegree[t] -= 1;
                }
            }
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if !emitted[i] {
                order.push(node.clone());
            }
        }
        order
    }
}

// ============================================================================
// Tests
// ============================================================================
