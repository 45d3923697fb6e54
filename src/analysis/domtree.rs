// Copyright (c) 2017-2020 Fabian Schuiki

use hibitset::BitSet;
use petgraph::{
    graph::{DiGraph, NodeIndex},
    Direction,
};
use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicU64, Ordering},
};

/// A block dominator tree.
///
/// Records for every block which other block *has* to be traversed to reach
/// it from the root. Built over the edges of a graph in either direction:
/// following outgoing edges from the entry yields the dominator tree, following
/// incoming edges from the exit yields the postdominator tree.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// The root of the tree.
    root: NodeIndex,
    /// The direction in which edges are followed.
    dir: Direction,
    /// Immediate dominator of every node; the root maps to itself, nodes not
    /// reachable from the root to `None`.
    doms: Vec<Option<NodeIndex>>,
    /// Reachable nodes in post-order.
    post_order: Vec<NodeIndex>,
}

impl DominatorTree {
    /// Compute the dominator tree of a graph.
    ///
    /// This implementation is based on [1].
    ///
    /// [1]: https://www.cs.rice.edu/~keith/Embed/dom.pdf "Cooper, Keith D., Timothy J. Harvey, and Ken Kennedy. 'A simple, fast dominance algorithm.' Software Practice & Experience 4.1-10 (2001): 1-8."
    pub fn new<N, E>(graph: &DiGraph<N, E>, root: NodeIndex, dir: Direction) -> Self {
        let t0 = time::precise_time_ns();
        let post_order = Self::compute_post_order(graph, root, dir);
        let length = post_order.len();
        trace!("[DomTree] post-order {:?}", post_order);

        let undef = std::u32::MAX;
        let mut inv_post_order = vec![undef; graph.node_count()];
        for (i, &bb) in post_order.iter().enumerate() {
            inv_post_order[bb.index()] = i as u32;
        }

        // The root is the last node in post-order.
        let mut doms = vec![undef; length];
        doms[length - 1] = (length - 1) as u32;

        let mut changed = true;
        while changed {
            changed = false;
            for idx in (0..length - 1).rev() {
                let bb = post_order[idx];
                let mut preds = graph
                    .neighbors_directed(bb, dir.opposite())
                    .map(|id| inv_post_order[id.index()])
                    .filter(|&p| p != undef && doms[p as usize] != undef);
                let first = match preds.next() {
                    Some(p) => p,
                    None => continue,
                };
                let new_idom = preds.fold(first, |i1, i2| intersect(&doms, i1, i2));
                debug_assert!(new_idom < length as u32);
                if doms[idx] != new_idom {
                    doms[idx] = new_idom;
                    changed = true;
                }
            }
        }
        trace!("[DomTree] converged {:?}", doms);

        let mut doms_final = vec![None; graph.node_count()];
        for (idx, &bb) in post_order.iter().enumerate() {
            doms_final[bb.index()] = Some(post_order[doms[idx] as usize]);
        }

        let t1 = time::precise_time_ns();
        DOMINATOR_TREE_TIME.fetch_add(t1 - t0, Ordering::Relaxed);

        Self {
            root,
            dir,
            doms: doms_final,
            post_order,
        }
    }

    fn compute_post_order<N, E>(
        graph: &DiGraph<N, E>,
        root: NodeIndex,
        dir: Direction,
    ) -> Vec<NodeIndex> {
        let mut order = Vec::with_capacity(graph.node_count());

        let mut stack = Vec::with_capacity(8);
        let mut discovered = BitSet::with_capacity(graph.node_count() as u32);
        let mut finished = BitSet::with_capacity(graph.node_count() as u32);

        stack.push(root);

        while let Some(&next) = stack.last() {
            if !discovered.add(next.index() as u32) {
                for succ in graph.neighbors_directed(next, dir) {
                    if !discovered.contains(succ.index() as u32) {
                        stack.push(succ);
                    }
                }
            } else {
                stack.pop();
                if !finished.add(next.index() as u32) {
                    order.push(next);
                }
            }
        }

        order
    }

    /// Get the root of the tree.
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Check whether a node is reachable from the root.
    pub fn is_reachable(&self, node: NodeIndex) -> bool {
        self.doms.get(node.index()).map_or(false, Option::is_some)
    }

    /// Get the immediate dominator of a node.
    ///
    /// Returns `None` for the root and for unreachable nodes.
    pub fn immediate_dominator(&self, node: NodeIndex) -> Option<NodeIndex> {
        match self.doms.get(node.index()).cloned().flatten() {
            Some(dom) if node != self.root => Some(dom),
            _ => None,
        }
    }

    /// Check if a node dominates another node.
    ///
    /// Every reachable node dominates itself.
    pub fn dominates(&self, parent: NodeIndex, mut child: NodeIndex) -> bool {
        if !self.is_reachable(child) {
            return false;
        }
        while parent != child {
            match self.immediate_dominator(child) {
                Some(next) => child = next,
                // Arrived at the root of the tree. Did not encounter the
                // suspected parent, so no domination.
                None => return false,
            }
        }
        true
    }

    /// Compute the dominance frontier of every reachable node.
    ///
    /// The frontier of a node is the set of nodes where its dominance ends:
    /// nodes it does not strictly dominate but which have a predecessor it
    /// dominates.
    pub fn dominance_frontiers<N, E>(
        &self,
        graph: &DiGraph<N, E>,
    ) -> HashMap<NodeIndex, HashSet<NodeIndex>> {
        let mut frontiers: HashMap<NodeIndex, HashSet<NodeIndex>> = self
            .post_order
            .iter()
            .map(|&bb| (bb, HashSet::new()))
            .collect();
        for &bb in &self.post_order {
            let preds: Vec<_> = graph
                .neighbors_directed(bb, self.dir.opposite())
                .filter(|&p| self.is_reachable(p))
                .collect();
            if preds.len() < 2 {
                continue;
            }
            let idom = self.doms[bb.index()];
            for pred in preds {
                let mut runner = pred;
                while Some(runner) != idom {
                    let inserted = frontiers.entry(runner).or_default().insert(bb);
                    match self.immediate_dominator(runner) {
                        Some(next) if inserted => runner = next,
                        _ => break,
                    }
                }
            }
        }
        frontiers
    }
}

fn intersect(doms: &[u32], mut finger1: u32, mut finger2: u32) -> u32 {
    while finger1 != finger2 {
        while finger1 < finger2 {
            finger1 = doms[finger1 as usize];
        }
        while finger2 < finger1 {
            finger2 = doms[finger2 as usize];
        }
    }
    finger1
}

/// Total time spent constructing dominator trees.
pub static DOMINATOR_TREE_TIME: AtomicU64 = AtomicU64::new(0);

#[cfg(test)]
mod tests {
    use super::*;

    fn n(i: usize) -> NodeIndex {
        NodeIndex::new(i)
    }

    fn set(nodes: &[usize]) -> HashSet<NodeIndex> {
        nodes.iter().map(|&i| n(i)).collect()
    }

    fn graph(n: usize, edges: &[(u32, u32)]) -> DiGraph<(), ()> {
        let mut g = DiGraph::new();
        for _ in 0..n {
            g.add_node(());
        }
        g.extend_with_edges(edges);
        g
    }

    #[test]
    fn diamond() {
        let g = graph(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let dt = DominatorTree::new(&g, n(0), Direction::Outgoing);
        assert_eq!(dt.immediate_dominator(n(0)), None);
        assert_eq!(dt.immediate_dominator(n(1)), Some(n(0)));
        assert_eq!(dt.immediate_dominator(n(2)), Some(n(0)));
        assert_eq!(dt.immediate_dominator(n(3)), Some(n(0)));
        assert!(dt.dominates(n(0), n(3)));
        assert!(!dt.dominates(n(1), n(3)));
        assert!(dt.dominates(n(3), n(3)));

        let df = dt.dominance_frontiers(&g);
        assert_eq!(df[&n(1)], set(&[3]));
        assert_eq!(df[&n(2)], set(&[3]));
        assert!(df[&n(0)].is_empty());
    }

    #[test]
    fn postdominators_of_diamond() {
        let g = graph(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let pdt = DominatorTree::new(&g, n(3), Direction::Incoming);
        assert_eq!(pdt.immediate_dominator(n(0)), Some(n(3)));
        let pdf = pdt.dominance_frontiers(&g);
        assert_eq!(pdf[&n(1)], set(&[0]));
        assert_eq!(pdf[&n(2)], set(&[0]));
    }

    #[test]
    fn loop_and_unreachable_block() {
        // 0 -> 1 -> 2 -> 1, 1 -> 3; 4 is unreachable and jumps into the loop.
        let g = graph(5, &[(0, 1), (1, 2), (2, 1), (1, 3), (4, 2)]);
        let dt = DominatorTree::new(&g, n(0), Direction::Outgoing);
        assert_eq!(dt.immediate_dominator(n(2)), Some(n(1)));
        assert_eq!(dt.immediate_dominator(n(3)), Some(n(1)));
        assert!(!dt.is_reachable(n(4)));
        assert_eq!(dt.immediate_dominator(n(4)), None);
        assert!(dt.dominates(n(1), n(2)));
        assert!(!dt.dominates(n(0), n(4)));

        let df = dt.dominance_frontiers(&g);
        assert!(df[&n(2)].contains(&n(1)));
        assert!(df[&n(1)].contains(&n(1)));
    }
}
