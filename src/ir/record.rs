// Copyright (c) 2017-2021 Fabian Schuiki

//! Records exchanged with the IR extraction front end.
//!
//! A module is a JSON document listing functions; each function maps block
//! labels to their predecessors, successors, and instruction records. The
//! order of the block map is significant: its first block is the entry.

use crate::{
    error::{malformed, GsaError, Result},
    ir::{Incoming, InstData, MemoryOp, Opcode, Operand, Operands},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::convert::TryFrom;

/// The contents of one input file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// The functions defined or declared in the file.
    #[serde(default)]
    pub functions: Vec<FunctionRecord>,
    /// Global variables; passed through to the term builder untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_variables: Option<Value>,
}

/// A single function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionRecord {
    /// The name of the function.
    pub name: String,
    /// The parameters, in order.
    #[serde(default)]
    pub params: Vec<Operand>,
    /// The return type.
    #[serde(default)]
    pub ret_type: String,
    /// The blocks of the function in layout order. Absent for declarations.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ordered_blocks"
    )]
    pub blocks: Option<Vec<(String, BlockRecord)>>,
}

/// A single basic block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Labels of the predecessor blocks.
    #[serde(default)]
    pub preds: Vec<String>,
    /// Labels of the successor blocks.
    #[serde(default)]
    pub succ: Vec<String>,
    /// The instructions of the block, in order.
    #[serde(default)]
    pub instructions: Vec<InstRecord>,
}

/// An opcode-tagged instruction record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstRecord {
    /// The opcode mnemonic.
    pub opcode: String,
    /// The remaining fields, whose shape depends on the opcode.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ModuleRecord {
    /// Parse a module from its JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// (De)serialization of the block map in document order.
mod ordered_blocks {
    use super::BlockRecord;
    use serde::{
        de::{Deserializer, MapAccess, Visitor},
        ser::{SerializeMap, Serializer},
    };
    use std::fmt;

    type Blocks = Option<Vec<(String, BlockRecord)>>;

    pub fn serialize<S: Serializer>(blocks: &Blocks, s: S) -> Result<S::Ok, S::Error> {
        match blocks {
            None => s.serialize_none(),
            Some(blocks) => {
                let mut map = s.serialize_map(Some(blocks.len()))?;
                for (label, block) in blocks {
                    map.serialize_entry(label, block)?;
                }
                map.end()
            }
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Blocks, D::Error> {
        struct BlocksVisitor;

        impl<'de> Visitor<'de> for BlocksVisitor {
            type Value = Blocks;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a map from block labels to blocks")
            }

            fn visit_none<E>(self) -> Result<Blocks, E> {
                Ok(None)
            }

            fn visit_unit<E>(self) -> Result<Blocks, E> {
                Ok(None)
            }

            fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Blocks, D::Error> {
                d.deserialize_map(self)
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Blocks, A::Error> {
                let mut blocks = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((label, block)) = map.next_entry::<String, BlockRecord>()? {
                    blocks.push((label, block));
                }
                Ok(Some(blocks))
            }
        }

        d.deserialize_option(BlocksVisitor)
    }
}

fn take(opcode: &str, fields: &mut Map<String, Value>, key: &str) -> Result<Value> {
    match fields.remove(key) {
        Some(Value::Null) | None => Err(malformed(opcode, format!("missing field `{}`", key))),
        Some(v) => Ok(v),
    }
}

fn take_name(opcode: &str, fields: &mut Map<String, Value>, key: &str) -> Result<String> {
    match take(opcode, fields, key)? {
        Value::String(s) => Ok(s),
        v => Err(malformed(
            opcode,
            format!("field `{}` must be a name, found `{}`", key, v),
        )),
    }
}

fn to_operand(opcode: &str, key: &str, value: Value) -> Result<Operand> {
    serde_json::from_value(value)
        .map_err(|e| malformed(opcode, format!("field `{}`: {}", key, e)))
}

fn take_operand(opcode: &str, fields: &mut Map<String, Value>, key: &str) -> Result<Operand> {
    let value = take(opcode, fields, key)?;
    to_operand(opcode, key, value)
}

fn to_operands(opcode: &str, fields: Map<String, Value>) -> Result<Operands> {
    fields
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let op = to_operand(opcode, &k, v)?;
            Ok((k, op))
        })
        .collect()
}

impl TryFrom<InstRecord> for InstData {
    type Error = GsaError;

    fn try_from(record: InstRecord) -> Result<InstData> {
        let InstRecord { opcode, mut fields } = record;
        let op = &opcode;
        let memory_op = match Opcode::from_name(op) {
            Opcode::Phi => {
                let ret_reg = take_name(op, &mut fields, "ret_reg")?;
                let incoming: Vec<Incoming> =
                    serde_json::from_value(take(op, &mut fields, "incoming")?)
                        .map_err(|e| malformed(op, format!("field `incoming`: {}", e)))?;
                return Ok(InstData::Phi { ret_reg, incoming });
            }
            Opcode::Br if fields.contains_key("condition") => {
                return Ok(InstData::CondBranch {
                    condition: take_operand(op, &mut fields, "condition")?,
                    if_true: take_name(op, &mut fields, "if_true")?,
                    if_false: take_name(op, &mut fields, "if_false")?,
                });
            }
            Opcode::Br => {
                return Ok(InstData::Branch {
                    target: take_name(op, &mut fields, "label")?,
                });
            }
            Opcode::Gamma => {
                return Ok(InstData::Gamma {
                    ret_reg: take_name(op, &mut fields, "ret_reg")?,
                    condition: take_operand(op, &mut fields, "condition")?,
                    true_value: take_operand(op, &mut fields, "true_value")?,
                    false_value: take_operand(op, &mut fields, "false_value")?,
                });
            }
            Opcode::Mu => {
                return Ok(InstData::Mu {
                    ret_reg: take_name(op, &mut fields, "ret_reg")?,
                    initial_value: take_operand(op, &mut fields, "initial_value")?,
                    loop_value: take_operand(op, &mut fields, "loop_value")?,
                });
            }
            Opcode::Eta => {
                return Ok(InstData::Eta {
                    ret_reg: take_name(op, &mut fields, "ret_reg")?,
                    condition: take_operand(op, &mut fields, "condition")?,
                    value: take_operand(op, &mut fields, "value")?,
                });
            }
            Opcode::Other => {
                let fields = to_operands(op, fields)?;
                return Ok(InstData::Other { opcode, fields });
            }
            Opcode::Alloca => MemoryOp::Alloca,
            Opcode::Load => MemoryOp::Load,
            Opcode::Store => MemoryOp::Store,
        };

        // Memory instructions carrying state tokens are already monadic.
        if fields.contains_key("input_state") || fields.contains_key("output_state") {
            let input_state = take_name(op, &mut fields, "input_state")?;
            let output_state = take_name(op, &mut fields, "output_state")?;
            Ok(InstData::Monadic {
                op: memory_op,
                fields: to_operands(op, fields)?,
                input_state,
                output_state,
            })
        } else {
            Ok(InstData::Memory {
                op: memory_op,
                fields: to_operands(op, fields)?,
            })
        }
    }
}

fn operand_value(op: &Operand) -> Value {
    match op {
        Operand::Bool(v) => Value::Bool(*v),
        Operand::Int(v) => Value::from(*v),
        Operand::Float(v) => Value::from(*v),
        Operand::Name(v) => Value::String(v.clone()),
        Operand::List(v) => Value::Array(v.iter().map(operand_value).collect()),
        Operand::Other(v) => v.clone(),
    }
}

impl From<&InstData> for InstRecord {
    fn from(inst: &InstData) -> InstRecord {
        let mut fields = Map::new();
        let mut put = |key: &str, value: Value| {
            fields.insert(key.to_owned(), value);
        };
        match inst {
            InstData::Phi { ret_reg, incoming } => {
                put("ret_reg", Value::String(ret_reg.clone()));
                let incoming = incoming
                    .iter()
                    .map(|i| {
                        let mut edge = Map::new();
                        edge.insert("value".to_owned(), operand_value(&i.value));
                        edge.insert("label".to_owned(), Value::String(i.label.clone()));
                        Value::Object(edge)
                    })
                    .collect();
                put("incoming", Value::Array(incoming));
            }
            InstData::CondBranch {
                condition,
                if_true,
                if_false,
            } => {
                put("condition", operand_value(condition));
                put("if_true", Value::String(if_true.clone()));
                put("if_false", Value::String(if_false.clone()));
            }
            InstData::Branch { target } => put("label", Value::String(target.clone())),
            InstData::Memory { fields: ops, .. } | InstData::Other { fields: ops, .. } => {
                for (k, v) in ops {
                    put(k, operand_value(v));
                }
            }
            InstData::Monadic {
                fields: ops,
                input_state,
                output_state,
                ..
            } => {
                for (k, v) in ops {
                    put(k, operand_value(v));
                }
                put("input_state", Value::String(input_state.clone()));
                put("output_state", Value::String(output_state.clone()));
            }
            InstData::Gamma {
                ret_reg,
                condition,
                true_value,
                false_value,
            } => {
                put("ret_reg", Value::String(ret_reg.clone()));
                put("condition", operand_value(condition));
                put("true_value", operand_value(true_value));
                put("false_value", operand_value(false_value));
            }
            InstData::Mu {
                ret_reg,
                initial_value,
                loop_value,
            } => {
                put("ret_reg", Value::String(ret_reg.clone()));
                put("initial_value", operand_value(initial_value));
                put("loop_value", operand_value(loop_value));
            }
            InstData::Eta {
                ret_reg,
                condition,
                value,
            } => {
                put("ret_reg", Value::String(ret_reg.clone()));
                put("condition", operand_value(condition));
                put("value", operand_value(value));
            }
        }
        InstRecord {
            opcode: inst.name().to_owned(),
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> InstRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parse_instruction_shapes() {
        let phi = InstData::try_from(record(json!({
            "opcode": "phi",
            "ret_reg": "%y",
            "incoming": [{"value": "%y0", "label": "%0"}, {"value": 1, "label": "%2"}]
        })))
        .unwrap();
        assert_eq!(
            phi,
            InstData::phi(
                "%y",
                vec![Incoming::new("%y0", "%0"), Incoming::new(1i64, "%2")]
            )
        );

        let br = InstData::try_from(record(json!({
            "opcode": "br", "condition": "%c", "if_true": "%1", "if_false": "%2"
        })))
        .unwrap();
        assert_eq!(br, InstData::cond_br("%c", "%1", "%2"));

        let jmp = InstData::try_from(record(json!({"opcode": "br", "label": "%3"}))).unwrap();
        assert_eq!(jmp, InstData::br("%3"));

        let store = InstData::try_from(record(json!({
            "opcode": "store", "ret_reg": "%p", "arg_1": 5, "align": null
        })))
        .unwrap();
        assert_eq!(store.opcode(), Opcode::Store);
        assert_eq!(store.states(), None);
        match store {
            InstData::Memory { fields, .. } => assert_eq!(fields.len(), 2),
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn reject_malformed_records() {
        let err = InstData::try_from(record(json!({"opcode": "phi", "ret_reg": "%y"})));
        assert!(err.is_err());
        let err = InstData::try_from(record(json!({"opcode": "br", "label": 3})));
        assert!(err.is_err());
    }

    #[test]
    fn structured_fields_pass_through() {
        let cases = json!([{"value": 1, "label": "%1"}, {"value": 2, "label": "%2"}]);
        let table = json!({"default": "%3", "width": 32});
        let rec = record(json!({
            "opcode": "switch", "condition": "%x", "cases": cases, "table": table
        }));
        let inst = InstData::try_from(rec).unwrap();
        assert_eq!(inst.opcode(), Opcode::Other);
        assert!(inst.has_register("%x"));
        assert!(!inst.has_register("%1"));
        let out = InstRecord::from(&inst);
        assert_eq!(out.fields["table"], table);
        assert_eq!(out.fields["cases"], cases);
        assert_eq!(InstData::try_from(out).unwrap(), inst);
    }

    #[test]
    fn monadic_records_survive_output() {
        let inst = InstData::op(
            "load",
            vec![("ret_reg", Operand::from("%v")), ("arg_1", Operand::from("%p"))],
        )
        .unwrap()
        .into_monadic("s3", "s4")
        .unwrap();
        let rec = InstRecord::from(&inst);
        assert_eq!(rec.opcode, "load");
        assert_eq!(rec.fields["input_state"], json!("s3"));
        assert_eq!(InstData::try_from(rec).unwrap(), inst);
    }

    #[test]
    fn blocks_keep_document_order() {
        let func: FunctionRecord = serde_json::from_str(
            r#"{"name": "f", "params": [], "ret_type": "i32",
                "blocks": {"%z": {"preds": [], "succ": ["%a"], "instructions": []},
                           "%a": {"preds": ["%z"], "succ": [], "instructions": []}}}"#,
        )
        .unwrap();
        let labels: Vec<_> = func
            .blocks
            .as_ref()
            .unwrap()
            .iter()
            .map(|(l, _)| l.as_str())
            .collect();
        assert_eq!(labels, vec!["%z", "%a"]);

        let decl: FunctionRecord =
            serde_json::from_str(r#"{"name": "g", "params": [], "ret_type": "void"}"#).unwrap();
        assert!(decl.blocks.is_none());
    }
}
