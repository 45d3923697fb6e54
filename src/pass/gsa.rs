// Copyright (c) 2017-2021 Fabian Schuiki

//! Gated-SSA Construction

use crate::{
    analysis::{DominatorTree, LoopInfo},
    error::{GsaError, Result},
    ir::{prelude::*, ETA_SUFFIX, INITIAL_STATE},
    opt::prelude::*,
};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Gated-SSA Construction
///
/// This pass rewrites a function into a form without control flow artifacts:
///
/// - Thread a state token through every `alloca`, `load`, and `store`
/// - Replace phi nodes in loop headers with `mu` nodes
/// - Replace all other phi nodes with `gamma` nodes gated by the branch of
///   their block's immediate dominator
/// - Materialize loop-carried values used after a loop as `eta` nodes in the
///   loop's exit blocks
///
/// The stages run in this order. Any failure leaves the graph partially
/// rewritten; callers must discard it.
pub struct GsaTransform;

impl Pass for GsaTransform {
    fn run_on_cfg(_ctx: &PassContext, cfg: &mut ControlFlowGraph) -> Result<bool> {
        info!("GSA [{}]", cfg.name);
        let scan = Scan::new(cfg);
        trace!(
            "Found {} phi and {} memory instructions",
            scan.phis.len(),
            scan.memory.len()
        );

        let mut modified = thread_memory(cfg, &scan.memory)?;
        let loops = cfg.loops()?;
        modified |= resolve_phis(cfg, scan.phis, &loops)?;
        modified |= place_etas(cfg, &loops)?;
        Ok(modified)
    }
}

/// A phi instruction found during the scan.
#[derive(Debug)]
struct PhiSite {
    block: String,
    index: usize,
    ret_reg: String,
    incoming: Vec<Incoming>,
}

/// The position of a memory instruction found during the scan.
#[derive(Debug)]
struct MemorySite {
    block: String,
    index: usize,
}

/// The instructions of a function that need rewriting, in block order.
struct Scan {
    phis: Vec<PhiSite>,
    memory: Vec<MemorySite>,
}

impl Scan {
    fn new(cfg: &ControlFlowGraph) -> Self {
        let mut phis = vec![];
        let mut memory = vec![];
        for bb in cfg.blocks() {
            for (index, inst) in bb.insts.iter().enumerate() {
                match inst {
                    InstData::Phi { ret_reg, incoming } => phis.push(PhiSite {
                        block: bb.label.clone(),
                        index,
                        ret_reg: ret_reg.clone(),
                        incoming: incoming.clone(),
                    }),
                    InstData::Memory { .. } => memory.push(MemorySite {
                        block: bb.label.clone(),
                        index,
                    }),
                    _ => (),
                }
            }
        }
        Self { phis, memory }
    }
}

/// Rewrite memory instructions into their monadic form.
///
/// Tokens `s0`, `s1`, ... are handed out in scan order, which is block order
/// and not necessarily an execution order.
fn thread_memory(cfg: &mut ControlFlowGraph, sites: &[MemorySite]) -> Result<bool> {
    let mut state = INITIAL_STATE.to_owned();
    for (i, site) in sites.iter().enumerate() {
        let next = format!("s{}", i + 1);
        let bb = cfg.get_block_mut(&site.block)?;
        let inst = bb.insts[site.index].clone().into_monadic(state, next.as_str())?;
        debug!("Threading {} in {}", inst, site.block);
        bb.replace_instruction(site.index, inst);
        state = next;
    }
    Ok(!sites.is_empty())
}

/// Replace every phi with a `mu` or `gamma` node.
fn resolve_phis(
    cfg: &mut ControlFlowGraph,
    phis: Vec<PhiSite>,
    loops: &[LoopInfo],
) -> Result<bool> {
    if phis.is_empty() {
        return Ok(false);
    }

    // Headers with several back edges see the union of their loop bodies.
    let mut headers: HashMap<&str, HashSet<&str>> = HashMap::new();
    for lp in loops {
        headers
            .entry(lp.entry.as_str())
            .or_default()
            .extend(lp.loop_nodes.iter().map(String::as_str));
    }

    let dt = cfg.domtree()?;
    let mut rewrites = Vec::with_capacity(phis.len());
    for phi in phis {
        let inst = match headers.get(phi.block.as_str()) {
            Some(members) => make_mu(&phi, members)?,
            None => make_gamma(cfg, &dt, &phi)?,
        };
        rewrites.push((phi, inst));
    }

    for (phi, inst) in rewrites {
        debug!("Replacing phi {} in {} with {}", phi.ret_reg, phi.block, inst);
        cfg.get_block_mut(&phi.block)?
            .replace_instruction(phi.index, inst);
    }
    Ok(true)
}

/// Split the incoming values of a loop header phi into the value entering the
/// loop and the value carried around it.
fn make_mu(phi: &PhiSite, members: &HashSet<&str>) -> Result<InstData> {
    let (inside, outside): (Vec<_>, Vec<_>) = phi
        .incoming
        .iter()
        .partition(|inc| members.contains(inc.label.as_str()));
    match (inside.as_slice(), outside.as_slice()) {
        ([looped], [initial]) => Ok(InstData::Mu {
            ret_reg: phi.ret_reg.clone(),
            initial_value: initial.value.clone(),
            loop_value: looped.value.clone(),
        }),
        _ => Err(GsaError::UnpartitionableLoopPhi {
            block: phi.block.clone(),
            reg: phi.ret_reg.clone(),
        }),
    }
}

/// Gate a phi by the conditional branch of its block's immediate dominator.
fn make_gamma(cfg: &ControlFlowGraph, dt: &DominatorTree, phi: &PhiSite) -> Result<InstData> {
    let fail = |reason: String| GsaError::UnresolvableGammaCondition {
        block: phi.block.clone(),
        reg: phi.ret_reg.clone(),
        reason,
    };

    let block = cfg
        .index(&phi.block)
        .ok_or_else(|| fail("block is not part of the graph".to_owned()))?;
    let idom = dt
        .immediate_dominator(block)
        .ok_or_else(|| fail("block has no immediate dominator".to_owned()))?;
    let (condition, if_true, if_false) = cfg.graph()[idom]
        .get_branch_instruction()
        .and_then(InstData::as_cond_branch)
        .ok_or_else(|| {
            fail(format!(
                "immediate dominator {} does not end in a conditional branch",
                cfg.label(idom)
            ))
        })?;

    if phi.incoming.len() != 2 {
        return Err(fail(format!(
            "expected 2 incoming values, found {}",
            phi.incoming.len()
        )));
    }
    let mut true_value = None;
    let mut false_value = None;
    for inc in &phi.incoming {
        let slot = if inc.label == if_true {
            &mut true_value
        } else if inc.label == if_false {
            &mut false_value
        } else {
            return Err(fail(format!(
                "incoming block {} is neither {} nor {}",
                inc.label, if_true, if_false
            )));
        };
        *slot = Some(inc.value.clone());
    }

    match (true_value, false_value) {
        (Some(true_value), Some(false_value)) => Ok(InstData::Gamma {
            ret_reg: phi.ret_reg.clone(),
            condition: condition.clone(),
            true_value,
            false_value,
        }),
        _ => Err(fail(format!(
            "incoming blocks do not cover both {} and {}",
            if_true, if_false
        ))),
    }
}

/// Insert `eta` nodes for loop-carried values used in loop exit blocks.
fn place_etas(cfg: &mut ControlFlowGraph, loops: &[LoopInfo]) -> Result<bool> {
    let mut modified = false;
    for lp in loops {
        let carried: Vec<String> = cfg
            .get_block(&lp.entry)?
            .insts
            .iter()
            .filter_map(|inst| match inst {
                InstData::Mu { ret_reg, .. } => Some(ret_reg.clone()),
                _ => None,
            })
            .collect();
        if carried.is_empty() {
            continue;
        }

        for exit in loop_exits(cfg, lp) {
            for reg in &carried {
                let eta_reg = format!("{}{}", reg, ETA_SUFFIX);
                let bb = cfg.get_block_mut(&exit)?;
                if bb.declared_registers().contains(&eta_reg.as_str()) {
                    continue;
                }
                let users = bb.instructions_with_register(reg);
                if users.is_empty() {
                    continue;
                }
                for index in users {
                    bb.replace_register(index, reg, &eta_reg);
                }
                debug!("Materializing {} as {} in {}", reg, eta_reg, exit);
                bb.prepend_instruction(InstData::Eta {
                    ret_reg: eta_reg,
                    condition: lp.condition.clone(),
                    value: Operand::Name(reg.clone()),
                });
                modified = true;
            }
        }
    }
    Ok(modified)
}

/// Collect the blocks outside a loop that a member branches to, in node order.
fn loop_exits(cfg: &ControlFlowGraph, lp: &LoopInfo) -> Vec<String> {
    let graph = cfg.graph();
    let exits: BTreeSet<_> = lp
        .loop_nodes
        .iter()
        .filter_map(|label| cfg.index(label))
        .flat_map(|bb| graph.neighbors_directed(bb, Direction::Outgoing))
        .filter(|&succ| !lp.contains(cfg.label(succ)))
        .collect();
    exits
        .into_iter()
        .map(|bb| cfg.label(bb).to_owned())
        .collect()
}
