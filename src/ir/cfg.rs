// Copyright (c) 2017-2020 Fabian Schuiki

//! Representation of the control flow in a function.
//!
//! Each function has an associated `ControlFlowGraph` which owns its basic
//! blocks and answers dominance, control dependence, and loop queries.

use crate::{
    analysis::{find_loops, DominanceChecker, DominatorTree, LoopInfo},
    error::{GsaError, Result},
    ir::{BasicBlock, BlockRecord, FunctionRecord, InstData, InstRecord, Operand},
};
use petgraph::{
    algo::tarjan_scc,
    graph::{DiGraph, NodeIndex},
    Direction,
};
use std::{
    collections::{HashMap, HashSet},
    convert::TryFrom,
};

/// The control dependence graph: each controlling block mapped to the blocks
/// it controls.
pub type Cdg = HashMap<String, HashSet<String>>;

/// A control flow graph.
///
/// This is the main container for basic blocks and control flow related
/// information. Node 0 is the entry block. Edges mirror the successor lists of
/// the blocks; parallel edges are not represented.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    /// The name of the function.
    pub name: String,
    /// The parameters of the function.
    pub params: Vec<Operand>,
    /// The return type of the function.
    pub ret_type: String,
    /// Whether the function is only declared. None of the analyses apply to
    /// declarations.
    pub is_declaration: bool,
    /// The basic blocks and their edges.
    graph: DiGraph<BasicBlock, ()>,
    /// Lookup table from block labels to graph nodes.
    block_to_index: HashMap<String, NodeIndex>,
}

impl ControlFlowGraph {
    /// Create a control flow graph from a function record.
    pub fn new(record: FunctionRecord) -> Result<Self> {
        let FunctionRecord {
            name,
            params,
            ret_type,
            blocks,
        } = record;
        let blocks = blocks
            .unwrap_or_default()
            .into_iter()
            .map(|(label, data)| {
                let BlockRecord {
                    preds,
                    succ,
                    instructions,
                } = data;
                let mut bb = BasicBlock::new(label, preds, succ);
                for inst in instructions {
                    bb.insts.push(InstData::try_from(inst)?);
                }
                Ok(bb)
            })
            .collect::<Result<Vec<_>>>()?;
        let mut cfg = Self::from_blocks(name, blocks)?;
        cfg.params = params;
        cfg.ret_type = ret_type;
        Ok(cfg)
    }

    /// Create a control flow graph from a list of blocks.
    ///
    /// The first block is the entry. An empty list yields a declaration.
    pub fn from_blocks(name: impl Into<String>, blocks: Vec<BasicBlock>) -> Result<Self> {
        let mut graph = DiGraph::with_capacity(blocks.len(), blocks.len() * 2);
        let mut block_to_index = HashMap::with_capacity(blocks.len());
        let is_declaration = blocks.is_empty();

        for bb in blocks {
            let label = bb.label.clone();
            let idx = graph.add_node(bb);
            if block_to_index.insert(label.clone(), idx).is_some() {
                return Err(GsaError::MalformedGraph(format!(
                    "block {} defined twice",
                    label
                )));
            }
        }

        let lookup = |from: &str, to: &str, what: &str| {
            block_to_index.get(to).cloned().ok_or_else(|| {
                GsaError::MalformedGraph(format!("{} {} of {} is not a block", what, to, from))
            })
        };
        let mut edges = vec![];
        for src in graph.node_indices() {
            let bb = &graph[src];
            for pred in &bb.preds {
                lookup(&bb.label, pred, "predecessor")?;
            }
            for succ in &bb.succs {
                edges.push((src, lookup(&bb.label, succ, "successor")?));
            }
        }
        for (src, dst) in edges {
            graph.update_edge(src, dst, ());
        }

        Ok(Self {
            name: name.into(),
            params: vec![],
            ret_type: String::new(),
            is_declaration,
            graph,
            block_to_index,
        })
    }

    /// Convert the graph back into a function record.
    pub fn to_record(&self) -> FunctionRecord {
        let blocks = if self.is_declaration {
            None
        } else {
            Some(
                self.blocks()
                    .map(|bb| {
                        let data = BlockRecord {
                            preds: bb.preds.clone(),
                            succ: bb.succs.clone(),
                            instructions: bb.insts.iter().map(InstRecord::from).collect(),
                        };
                        (bb.label.clone(), data)
                    })
                    .collect(),
            )
        };
        FunctionRecord {
            name: self.name.clone(),
            params: self.params.clone(),
            ret_type: self.ret_type.clone(),
            blocks,
        }
    }

    /// Access the underlying graph.
    pub fn graph(&self) -> &DiGraph<BasicBlock, ()> {
        &self.graph
    }

    /// Check whether the graph has no blocks.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of blocks in the graph.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// The entry block's node.
    pub fn entry(&self) -> NodeIndex {
        NodeIndex::new(0)
    }

    /// Get the node of a block.
    pub fn index(&self, label: &str) -> Option<NodeIndex> {
        self.block_to_index.get(label).cloned()
    }

    /// Get the label of a node.
    pub fn label(&self, idx: NodeIndex) -> &str {
        &self.graph[idx].label
    }

    fn lookup(&self, label: &str) -> Result<NodeIndex> {
        self.index(label)
            .ok_or_else(|| GsaError::MalformedGraph(format!("no block labelled {}", label)))
    }

    /// Get the block with a label.
    pub fn get_block(&self, label: &str) -> Result<&BasicBlock> {
        let idx = self.lookup(label)?;
        Ok(&self.graph[idx])
    }

    /// Get the block with a label for modification.
    pub fn get_block_mut(&mut self, label: &str) -> Result<&mut BasicBlock> {
        let idx = self.lookup(label)?;
        Ok(&mut self.graph[idx])
    }

    /// Iterate over all blocks in node order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> + Clone + '_ {
        self.graph.raw_nodes().iter().map(|node| &node.weight)
    }

    /// Iterate over all blocks in node order for modification.
    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut BasicBlock> + '_ {
        self.graph.node_weights_mut()
    }

    /// Labels of the blocks without predecessors.
    pub fn entry_blocks(&self) -> Vec<&str> {
        self.blocks()
            .filter(|bb| bb.preds.is_empty())
            .map(|bb| bb.label.as_str())
            .collect()
    }

    /// Labels of the blocks without successors.
    pub fn exit_blocks(&self) -> Vec<&str> {
        self.blocks()
            .filter(|bb| bb.succs.is_empty())
            .map(|bb| bb.label.as_str())
            .collect()
    }

    /// Check whether the graph has a single entry and a single exit block.
    pub fn is_closed(&self) -> bool {
        self.entry_blocks().len() == 1 && self.exit_blocks().len() == 1
    }

    /// Compute the dominator tree rooted at the entry block.
    pub fn domtree(&self) -> Result<DominatorTree> {
        if self.is_empty() {
            return Err(GsaError::MalformedGraph(format!(
                "{} has no entry block",
                self.name
            )));
        }
        Ok(DominatorTree::new(
            &self.graph,
            self.entry(),
            Direction::Outgoing,
        ))
    }

    /// Compute the immediate dominator of every block but the entry.
    ///
    /// Blocks unreachable from the entry are omitted.
    pub fn immediate_dominators(&self) -> Result<HashMap<String, String>> {
        if self.graph.node_count() < 2 {
            return Ok(HashMap::new());
        }
        let dt = self.domtree()?;
        Ok(self
            .graph
            .node_indices()
            .filter_map(|bb| {
                dt.immediate_dominator(bb)
                    .map(|dom| (self.label(bb).to_owned(), self.label(dom).to_owned()))
            })
            .collect())
    }

    /// Create a memoizing dominance checker over a dominator tree of this
    /// graph.
    pub fn dominance_checker<'a>(&self, dt: &'a DominatorTree) -> DominanceChecker<'a> {
        DominanceChecker::new(dt)
    }

    /// Choose the root of the postdominator tree.
    ///
    /// This is the unique exit block if there is one. Otherwise the block
    /// with the highest index is used, which is only an approximation.
    fn postdom_root(&self) -> NodeIndex {
        let exits: Vec<_> = self
            .graph
            .node_indices()
            .filter(|&bb| {
                self.graph
                    .neighbors_directed(bb, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .collect();
        match exits.as_slice() {
            [exit] => *exit,
            _ => {
                let last = NodeIndex::new(self.graph.node_count() - 1);
                warn!(
                    "{} has {} exit blocks; rooting postdominators at {}",
                    self.name,
                    exits.len(),
                    self.label(last)
                );
                last
            }
        }
    }

    /// Compute the control dependence graph.
    ///
    /// A block controls the blocks in whose postdominance frontier it lies.
    pub fn control_dependency_graph(&self) -> Cdg {
        let mut cdg = Cdg::new();
        if self.is_empty() {
            return cdg;
        }
        let pdt = DominatorTree::new(&self.graph, self.postdom_root(), Direction::Incoming);
        for (controlled, controllers) in pdt.dominance_frontiers(&self.graph) {
            for controller in controllers {
                cdg.entry(self.label(controller).to_owned())
                    .or_default()
                    .insert(self.label(controlled).to_owned());
            }
        }
        cdg
    }

    /// Detect the natural loops of the graph.
    pub fn loops(&self) -> Result<Vec<LoopInfo>> {
        find_loops(self)
    }

    /// Compute the strongly connected components of the graph.
    pub fn strongly_connected_components(&self) -> Vec<Vec<String>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .map(|scc| scc.into_iter().map(|bb| self.label(bb).to_owned()).collect())
            .collect()
    }
}
