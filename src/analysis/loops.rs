// Copyright (c) 2017-2021 Fabian Schuiki

use crate::{
    analysis::DominanceChecker,
    error::{GsaError, Result},
    ir::{ControlFlowGraph, Operand},
};
use petgraph::{graph::NodeIndex, visit::EdgeRef, Direction};
use std::collections::HashSet;

/// A natural loop, identified by one of its back edges.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopInfo {
    /// The loop header, i.e. the target of the back edge.
    pub entry: String,
    /// The source of the back edge.
    pub latch: String,
    /// The condition deciding whether the loop keeps iterating.
    pub condition: Operand,
    /// All blocks of the loop, including header and latch.
    pub loop_nodes: HashSet<String>,
}

impl LoopInfo {
    /// Check whether a block belongs to the loop.
    pub fn contains(&self, label: &str) -> bool {
        self.loop_nodes.contains(label)
    }
}

/// Detect the natural loops of a control flow graph.
///
/// Every edge `u -> v` where `v` dominates `u` is a back edge and yields one
/// loop with header `v`. Loops are reported in edge order.
pub fn find_loops(cfg: &ControlFlowGraph) -> Result<Vec<LoopInfo>> {
    if cfg.is_empty() {
        return Ok(vec![]);
    }
    let graph = cfg.graph();
    let dt = cfg.domtree()?;
    let mut checker = DominanceChecker::new(&dt);
    let mut loops = vec![];

    for edge in graph.edge_references() {
        let (latch, header) = (edge.source(), edge.target());
        if !checker.dominates(header, latch) {
            continue;
        }
        trace!(
            "Back edge {} -> {}",
            cfg.label(latch),
            cfg.label(header)
        );
        loops.push(LoopInfo {
            entry: cfg.label(header).to_owned(),
            latch: cfg.label(latch).to_owned(),
            condition: loop_condition(cfg, header, latch)?,
            loop_nodes: loop_body(cfg, header, latch),
        });
    }

    Ok(loops)
}

/// Find the condition of a loop on the branch of its header, or failing that
/// on the branch of its latch.
fn loop_condition(cfg: &ControlFlowGraph, header: NodeIndex, latch: NodeIndex) -> Result<Operand> {
    let graph = cfg.graph();
    [header, latch]
        .iter()
        .filter_map(|&bb| graph[bb].get_branch_instruction())
        .filter_map(|inst| inst.as_cond_branch())
        .map(|(cond, _, _)| cond.clone())
        .next()
        .ok_or_else(|| GsaError::MalformedLoop {
            header: cfg.label(header).to_owned(),
            latch: cfg.label(latch).to_owned(),
        })
}

/// Collect the blocks that reach the latch without passing the header.
fn loop_body(cfg: &ControlFlowGraph, header: NodeIndex, latch: NodeIndex) -> HashSet<String> {
    let graph = cfg.graph();
    let mut nodes: HashSet<NodeIndex> = vec![header, latch].into_iter().collect();
    let mut stack = vec![];
    if latch != header {
        stack.push(latch);
    }
    while let Some(node) = stack.pop() {
        for pred in graph.neighbors_directed(node, Direction::Incoming) {
            if nodes.insert(pred) {
                stack.push(pred);
            }
        }
    }
    nodes
        .into_iter()
        .map(|bb| cfg.label(bb).to_owned())
        .collect()
}
