// Copyright (c) 2017-2021 Fabian Schuiki

#[macro_use]
extern crate indoc;

mod common;

use common::*;
use gsaflow::{
    ir::prelude::*,
    module::{FunctionOutcome, Module},
    opt::prelude::*,
    pass::GsaTransform,
    verifier::Verifier,
    GsaError,
};

fn transform(cfg: &mut ControlFlowGraph) -> Result<bool, GsaError> {
    GsaTransform::run_on_cfg(&PassContext::default(), cfg)
}

fn assert_gsa_form(cfg: &ControlFlowGraph) {
    let mut verifier = Verifier::new();
    verifier.verify_cfg(cfg).unwrap();
    if let Err(errs) = verifier.finish() {
        panic!("Verification failed:\n{}", errs);
    }
}

#[test]
fn diamond_becomes_gamma() {
    let mut cfg = diamond();
    assert!(transform(&mut cfg).unwrap());
    assert_eq!(
        cfg.get_block("B3").unwrap().insts[0],
        InstData::Gamma {
            ret_reg: "x3".to_owned(),
            condition: "c".into(),
            true_value: "x1".into(),
            false_value: "x2".into(),
        }
    );
    assert!(cfg.get_block("B3").unwrap().insts[0].opcode().is_gated());
    assert_gsa_form(&cfg);
}

#[test]
fn while_loop_becomes_mu_and_eta() {
    let mut cfg = while_loop();
    assert!(transform(&mut cfg).unwrap());

    let header = cfg.get_block("B1").unwrap();
    assert_eq!(
        header.insts[0],
        InstData::Mu {
            ret_reg: "y".to_owned(),
            initial_value: "y0".into(),
            loop_value: "y2".into(),
        }
    );
    // Uses inside the loop keep the loop-internal register.
    assert_eq!(header.insts[1], InstData::binary("icmp", "cond", "y", 10i64));
    assert_eq!(
        cfg.get_block("B2").unwrap().insts[0],
        InstData::binary("add", "y2", "y", 1i64)
    );

    let exit = cfg.get_block("B3").unwrap();
    assert_eq!(
        exit.insts,
        vec![
            InstData::Eta {
                ret_reg: "y_eta".to_owned(),
                condition: "cond".into(),
                value: "y".into(),
            },
            ret("y_eta"),
        ]
    );
    assert_gsa_form(&cfg);
}

#[test]
fn loop_without_condition_is_malformed() {
    let mut cfg = ControlFlowGraph::from_blocks(
        "forever",
        vec![
            block("B0", &[], &["B1"], vec![InstData::br("B1")]),
            block("B1", &["B0", "B2"], &["B2"], vec![InstData::br("B2")]),
            block("B2", &["B1"], &["B1"], vec![InstData::br("B1")]),
        ],
    )
    .unwrap();
    match transform(&mut cfg) {
        Err(GsaError::MalformedLoop { header, latch }) => {
            assert_eq!(header, "B1");
            assert_eq!(latch, "B2");
        }
        x => panic!("unexpected {:?}", x),
    }
}

#[test]
fn loop_condition_falls_back_to_latch() {
    // do { y2 = y + 1 } while (y2 < 10)
    let mut cfg = ControlFlowGraph::from_blocks(
        "do_while",
        vec![
            block("B0", &[], &["B1"], vec![InstData::br("B1")]),
            block(
                "B1",
                &["B0", "B2"],
                &["B2"],
                vec![
                    InstData::phi(
                        "y",
                        vec![Incoming::new(0i64, "B0"), Incoming::new("y2", "B2")],
                    ),
                    InstData::br("B2"),
                ],
            ),
            block(
                "B2",
                &["B1"],
                &["B1", "B3"],
                vec![
                    InstData::binary("add", "y2", "y", 1i64),
                    InstData::binary("icmp", "cond", "y2", 10i64),
                    InstData::cond_br("cond", "B1", "B3"),
                ],
            ),
            block("B3", &["B2"], &[], vec![ret("y")]),
        ],
    )
    .unwrap();
    let loops = cfg.loops().unwrap();
    assert_eq!(loops.len(), 1);
    assert_eq!(loops[0].condition, Operand::from("cond"));

    transform(&mut cfg).unwrap();
    assert_eq!(
        cfg.get_block("B1").unwrap().insts[0],
        InstData::Mu {
            ret_reg: "y".to_owned(),
            initial_value: Operand::Int(0),
            loop_value: "y2".into(),
        }
    );
    let exit = cfg.get_block("B3").unwrap();
    assert_eq!(exit.insts[0].opcode(), Opcode::Eta);
    assert_eq!(exit.insts[1], ret("y_eta"));
    assert_gsa_form(&cfg);
}

#[test]
fn self_loop_carries_value_out() {
    let mut cfg = ControlFlowGraph::from_blocks(
        "spin",
        vec![
            block("B0", &[], &["B1"], vec![InstData::br("B1")]),
            block(
                "B1",
                &["B0", "B1"],
                &["B1", "B2"],
                vec![
                    InstData::phi(
                        "y",
                        vec![Incoming::new(0i64, "B0"), Incoming::new("y2", "B1")],
                    ),
                    InstData::binary("add", "y2", "y", 1i64),
                    InstData::binary("icmp", "cond", "y2", 10i64),
                    InstData::cond_br("cond", "B1", "B2"),
                ],
            ),
            block("B2", &["B1"], &[], vec![ret("y")]),
        ],
    )
    .unwrap();
    transform(&mut cfg).unwrap();
    assert_eq!(cfg.get_block("B1").unwrap().insts[0].opcode(), Opcode::Mu);
    assert_eq!(cfg.get_block("B2").unwrap().insts[1], ret("y_eta"));
    assert_gsa_form(&cfg);
}

#[test]
fn memory_is_threaded_in_block_order() {
    let mut cfg = ControlFlowGraph::from_blocks(
        "memory",
        vec![
            block(
                "B0",
                &[],
                &["B1"],
                vec![
                    op("alloca", vec![("ret_reg", "p".into()), ("type", "i32".into())]),
                    op(
                        "store",
                        vec![("arg_1", "p".into()), ("stored_value", Operand::Int(1))],
                    ),
                    InstData::br("B1"),
                ],
            ),
            block(
                "B1",
                &["B0"],
                &[],
                vec![
                    op("load", vec![("ret_reg", "v".into()), ("arg_1", "p".into())]),
                    ret("v"),
                ],
            ),
        ],
    )
    .unwrap();
    assert!(transform(&mut cfg).unwrap());

    let states: Vec<_> = cfg
        .blocks()
        .flat_map(|bb| bb.insts.iter())
        .filter_map(|inst| inst.states())
        .collect();
    assert_eq!(states, vec![("s0", "s1"), ("s1", "s2"), ("s2", "s3")]);

    let load = &cfg.get_block("B1").unwrap().insts[0];
    assert_eq!(load.opcode(), Opcode::Load);
    assert_eq!(load.ret_reg(), Some("v"));
    assert_gsa_form(&cfg);
}

#[test]
fn gamma_needs_matching_branch_targets() {
    // if (c) { b } with the merge fed straight from the entry.
    let mut cfg = ControlFlowGraph::from_blocks(
        "triangle",
        vec![
            block("B0", &[], &["B1", "B2"], vec![InstData::cond_br("c", "B1", "B2")]),
            block("B1", &["B0"], &["B2"], vec![InstData::br("B2")]),
            block(
                "B2",
                &["B0", "B1"],
                &[],
                vec![
                    InstData::phi("x", vec![Incoming::new("a", "B0"), Incoming::new("b", "B1")]),
                    ret("x"),
                ],
            ),
        ],
    )
    .unwrap();
    assert!(matches!(
        transform(&mut cfg),
        Err(GsaError::UnresolvableGammaCondition { .. })
    ));
}

#[test]
fn gamma_needs_conditional_dominator() {
    let mut cfg = ControlFlowGraph::from_blocks(
        "straight",
        vec![
            block("B0", &[], &["B1"], vec![InstData::br("B1")]),
            block(
                "B1",
                &["B0"],
                &[],
                vec![InstData::phi("x", vec![Incoming::new("a", "B0")]), ret("x")],
            ),
        ],
    )
    .unwrap();
    match transform(&mut cfg) {
        Err(GsaError::UnresolvableGammaCondition { block, reg, .. }) => {
            assert_eq!(block, "B1");
            assert_eq!(reg, "x");
        }
        x => panic!("unexpected {:?}", x),
    }
}

#[test]
fn header_phi_with_two_latches_is_unpartitionable() {
    let mut cfg = ControlFlowGraph::from_blocks(
        "two_latches",
        vec![
            block("B0", &[], &["B1"], vec![InstData::br("B1")]),
            block(
                "B1",
                &["B0", "B2", "B3"],
                &["B2", "B4"],
                vec![
                    InstData::phi(
                        "v",
                        vec![
                            Incoming::new("v0", "B0"),
                            Incoming::new("v2", "B2"),
                            Incoming::new("v3", "B3"),
                        ],
                    ),
                    InstData::cond_br("c", "B2", "B4"),
                ],
            ),
            block("B2", &["B1"], &["B1", "B3"], vec![InstData::cond_br("d", "B1", "B3")]),
            block("B3", &["B2"], &["B1"], vec![InstData::br("B1")]),
            block("B4", &["B1"], &[], vec![ret("v")]),
        ],
    )
    .unwrap();
    assert_eq!(cfg.loops().unwrap().len(), 2);
    assert!(matches!(
        transform(&mut cfg),
        Err(GsaError::UnpartitionableLoopPhi { .. })
    ));
}

#[test]
fn eta_only_where_referenced() {
    // The loop exits to B3, which ignores `y`; B4 uses it but is not an exit.
    let mut cfg = ControlFlowGraph::from_blocks(
        "late_use",
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
                    InstData::cond_br("cond", "B2", "B3"),
                ],
            ),
            block(
                "B2",
                &["B1"],
                &["B1"],
                vec![InstData::binary("add", "y2", "y", 1i64), InstData::br("B1")],
            ),
            block("B3", &["B1"], &["B4"], vec![InstData::br("B4")]),
            block("B4", &["B3"], &[], vec![ret("y")]),
        ],
    )
    .unwrap();
    transform(&mut cfg).unwrap();
    assert_eq!(cfg.get_block("B3").unwrap().insts, vec![InstData::br("B4")]);
    assert_eq!(cfg.get_block("B4").unwrap().insts, vec![ret("y")]);
}

#[test]
fn transform_json_module() {
    let input = indoc! {r#"
        {
            "functions": [
                {
                    "name": "count",
                    "params": ["%n"],
                    "ret_type": "i32",
                    "blocks": {
                        "%0": {
                            "preds": [],
                            "succ": ["%1"],
                            "instructions": [
                                {"opcode": "alloca", "ret_reg": "%p", "type": "i32"},
                                {"opcode": "store", "arg_1": "%p", "stored_value": 0},
                                {"opcode": "br", "label": "%1"}
                            ]
                        },
                        "%1": {
                            "preds": ["%0", "%2"],
                            "succ": ["%2", "%3"],
                            "instructions": [
                                {"opcode": "phi", "ret_reg": "%i",
                                 "incoming": [{"value": 0, "label": "%0"},
                                              {"value": "%i2", "label": "%2"}]},
                                {"opcode": "icmp", "ret_reg": "%c", "arg_1": "%i", "arg_2": "%n"},
                                {"opcode": "br", "condition": "%c", "if_true": "%2", "if_false": "%3"}
                            ]
                        },
                        "%2": {
                            "preds": ["%1"],
                            "succ": ["%1"],
                            "instructions": [
                                {"opcode": "add", "ret_reg": "%i2", "arg_1": "%i", "arg_2": 1},
                                {"opcode": "br", "label": "%1"}
                            ]
                        },
                        "%3": {
                            "preds": ["%1"],
                            "succ": [],
                            "instructions": [
                                {"opcode": "load", "ret_reg": "%v", "arg_1": "%p"},
                                {"opcode": "ret", "value": "%i"}
                            ]
                        }
                    }
                },
                {"name": "printf", "params": ["%fmt"], "ret_type": "i32"}
            ]
        }
    "#};
    let module = Module::from_json(input).unwrap();
    let outcomes = module.transform(&PassContext { verify: true });
    assert_eq!(outcomes.len(), 2);
    assert!(matches!(&outcomes[1], FunctionOutcome::Declaration(name) if name == "printf"));

    let cfg = outcomes[0].cfg().expect("count transformed");
    assert_eq!(cfg.label(cfg.entry()), "%0");
    assert_eq!(cfg.params, vec![Operand::from("%n")]);
    let exit = cfg.get_block("%3").unwrap();
    assert_eq!(exit.insts[0].opcode(), Opcode::Eta);
    assert_eq!(exit.insts[1].states(), Some(("s2", "s3")));
    assert_eq!(exit.insts[2], op("ret", vec![("value", "%i_eta".into())]));

    // The transformed module reads back without any phi left.
    let record = module.to_record(&outcomes);
    let text = serde_json::to_string(&record).unwrap();
    let again = Module::from_json(&text).unwrap();
    let cfg = ControlFlowGraph::new(again.functions[0].clone()).unwrap();
    assert_gsa_form(&cfg);
    assert!(again.functions[1].blocks.is_none());
}

#[test]
fn failed_functions_do_not_affect_others() {
    let input = indoc! {r#"
        {
            "functions": [
                {
                    "name": "forever",
                    "blocks": {
                        "B0": {"preds": [], "succ": ["B1"], "instructions": [{"opcode": "br", "label": "B1"}]},
                        "B1": {"preds": ["B0", "B1"], "succ": ["B1"], "instructions": [{"opcode": "br", "label": "B1"}]}
                    }
                },
                {
                    "name": "id",
                    "params": ["%x"],
                    "blocks": {
                        "B0": {"preds": [], "succ": [], "instructions": [{"opcode": "ret", "value": "%x"}]}
                    }
                }
            ]
        }
    "#};
    let module = Module::from_json(input).unwrap();
    let outcomes = module.transform(&PassContext::default());
    match &outcomes[0] {
        FunctionOutcome::Failed(err) => {
            assert_eq!(err.function, "forever");
            assert!(matches!(err.source, GsaError::MalformedLoop { .. }));
        }
        x => panic!("unexpected {:?}", x),
    }
    assert!(outcomes[1].cfg().is_some());
    assert_eq!(outcomes[1].name(), "id");
}
