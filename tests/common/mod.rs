// Copyright (c) 2017-2021 Fabian Schuiki

//! Small functions shared by the integration tests.

#![allow(dead_code)]

use gsaflow::ir::prelude::*;

/// Create a block with its edges and instructions.
pub fn block(label: &str, preds: &[&str], succs: &[&str], insts: Vec<InstData>) -> BasicBlock {
    let strings = |labels: &[&str]| labels.iter().map(|l| l.to_string()).collect();
    let mut bb = BasicBlock::new(label, strings(preds), strings(succs));
    bb.add_instructions(insts);
    bb
}

/// Create an instruction with named operands.
pub fn op(opcode: &str, fields: Vec<(&str, Operand)>) -> InstData {
    InstData::op(opcode, fields).unwrap()
}

/// `ret_reg = const value`
pub fn constant(ret_reg: &str, value: i64) -> InstData {
    op(
        "const",
        vec![("ret_reg", ret_reg.into()), ("value", Operand::Int(value))],
    )
}

/// `ret value`
pub fn ret(value: &str) -> InstData {
    op("ret", vec![("value", value.into())])
}

/// Scenario A: a diamond merging `x1` and `x2` into `x3`.
pub fn diamond() -> ControlFlowGraph {
    ControlFlowGraph::from_blocks(
        "diamond",
        vec![
            block("B0", &[], &["B1", "B2"], vec![InstData::cond_br("c", "B1", "B2")]),
            block("B1", &["B0"], &["B3"], vec![constant("x1", 1), InstData::br("B3")]),
            block("B2", &["B0"], &["B3"], vec![constant("x2", 2), InstData::br("B3")]),
            block(
                "B3",
                &["B1", "B2"],
                &[],
                vec![
                    InstData::phi(
                        "x3",
                        vec![Incoming::new("x1", "B1"), Incoming::new("x2", "B2")],
                    ),
                    ret("x3"),
                ],
            ),
        ],
    )
    .unwrap()
}

/// Scenario B: a while loop counting `y` up from `y0`, used after the loop.
pub fn while_loop() -> ControlFlowGraph {
    ControlFlowGraph::from_blocks(
        "while_loop",
        vec![
            block("B0", &[], &["B1"], vec![constant("y0", 0), InstData::br("B1")]),
            block(
                "B1",
                &["B0", "B2"],
                &["B2", "B3"],
                vec![
                    InstData::phi(
                        "y",
                        vec![Incoming::new("y0", "B0"), Incoming::new("y2", "B2")],
                    ),
                    InstData::binary("icmp", "cond", "y", 10i64),
                    InstData::cond_br("cond", "B2", "B3"),
                ],
            ),
            block(
                "B2",
                &["B1"],
                &["B1"],
                vec![InstData::binary("add", "y2", "y", 1i64), InstData::br("B1")],
            ),
            block("B3", &["B1"], &[], vec![ret("y")]),
        ],
    )
    .unwrap()
}
