// Copyright (c) 2017-2021 Fabian Schuiki

//! Emitting control flow graphs as Graphviz DOT.

use crate::ir::ControlFlowGraph;
use itertools::Itertools;
use petgraph::visit::EdgeRef;
use std::io::{Result, Write};

/// Emit the block structure of a control flow graph in DOT format.
///
/// Nodes are drawn as circles named after their block; the layout runs top to
/// bottom.
pub fn write_dot(mut sink: impl Write, cfg: &ControlFlowGraph) -> Result<()> {
    let graph = cfg.graph();
    writeln!(sink, "digraph \"{}\" {{", escape(&cfg.name))?;
    writeln!(sink, "    rankdir=TB;")?;
    for bb in graph.node_indices() {
        writeln!(
            sink,
            "    {} [label=\"{}\", shape=circle];",
            bb.index(),
            escape(cfg.label(bb))
        )?;
    }
    for edge in graph
        .edge_references()
        .sorted_by_key(|e| (e.source(), e.target()))
    {
        writeln!(sink, "    {} -> {};", edge.source().index(), edge.target().index())?;
    }
    writeln!(sink, "}}")?;
    Ok(())
}

/// Render a control flow graph as a DOT string.
pub fn to_dot(cfg: &ControlFlowGraph) -> Result<String> {
    let mut out = vec![];
    write_dot(&mut out, cfg)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn escape(label: &str) -> String {
    label.replace('"', "\\\"").replace('%', "\\%")
}
