// Copyright (c) 2017-2021 Fabian Schuiki

use crate::analysis::DominatorTree;
use petgraph::graph::NodeIndex;
use std::collections::HashMap;

/// A memoizing dominance oracle.
///
/// Answers pairwise dominance queries by walking the immediate dominator
/// chain of the queried node, and remembers every answer. Passes that issue
/// many queries against the same tree avoid repeated walks this way.
#[derive(Debug)]
pub struct DominanceChecker<'a> {
    tree: &'a DominatorTree,
    cache: HashMap<(NodeIndex, NodeIndex), bool>,
}

impl<'a> DominanceChecker<'a> {
    /// Create a new checker on top of a dominator tree.
    pub fn new(tree: &'a DominatorTree) -> Self {
        Self {
            tree,
            cache: HashMap::new(),
        }
    }

    /// Check whether `dom` dominates `node`.
    pub fn dominates(&mut self, dom: NodeIndex, node: NodeIndex) -> bool {
        if let Some(&known) = self.cache.get(&(dom, node)) {
            return known;
        }
        let result = self.compute(dom, node);
        self.cache.insert((dom, node), result);
        result
    }

    fn compute(&self, dom: NodeIndex, node: NodeIndex) -> bool {
        if !self.tree.is_reachable(node) {
            return false;
        }
        let root = self.tree.root();
        let mut curr = node;
        while curr != root {
            if curr == dom {
                return true;
            }
            if let Some(&known) = self.cache.get(&(dom, curr)) {
                return known;
            }
            curr = match self.tree.immediate_dominator(curr) {
                Some(next) => next,
                None => return false,
            };
        }
        dom == root
    }

    /// Number of memoized answers.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
