// Copyright (c) 2017-2021 Fabian Schuiki

//! Modules collect the functions of one input file.

use crate::{
    error::{FunctionError, Result},
    ir::{ControlFlowGraph, FunctionRecord, ModuleRecord},
    opt::prelude::*,
    pass::GsaTransform,
};
use serde_json::Value;

/// The functions of one input file.
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// The function records, in file order.
    pub functions: Vec<FunctionRecord>,
    /// Global variables, kept opaque.
    pub global_variables: Option<Value>,
}

impl Module {
    /// Create a new empty module.
    pub fn new() -> Self {
        Default::default()
    }

    /// Parse a module from its JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(Self::from_record(ModuleRecord::from_json(text)?))
    }

    /// Create a module from its record.
    pub fn from_record(record: ModuleRecord) -> Self {
        Self {
            functions: record.functions,
            global_variables: record.global_variables,
        }
    }

    /// Add a function to the module.
    pub fn add_function(&mut self, func: FunctionRecord) {
        self.functions.push(func);
    }

    /// Find a function by name.
    pub fn function(&self, name: &str) -> Option<&FunctionRecord> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Rewrite every function into GSA form.
    ///
    /// Functions are transformed in parallel and independently of each
    /// other; one failing function does not affect the rest. The outcomes
    /// are in the order of `functions`.
    pub fn transform(&self, ctx: &PassContext) -> Vec<FunctionOutcome> {
        let outcomes = GsaTransform::run_on_module(ctx, self);
        let failed = outcomes.iter().filter(|o| o.is_failed()).count();
        if failed > 0 {
            warn!(
                "{} of {} functions could not be transformed",
                failed,
                outcomes.len()
            );
        }
        outcomes
    }

    /// Assemble a record of the module after a transformation.
    ///
    /// Transformed functions are replaced by their rewritten graph; all other
    /// functions are passed through as they were read.
    pub fn to_record(&self, outcomes: &[FunctionOutcome]) -> ModuleRecord {
        let functions = self
            .functions
            .iter()
            .zip(outcomes)
            .map(|(func, outcome)| match outcome.cfg() {
                Some(cfg) => cfg.to_record(),
                None => func.clone(),
            })
            .collect();
        ModuleRecord {
            functions,
            global_variables: self.global_variables.clone(),
        }
    }
}

/// The result of transforming one function.
#[derive(Debug)]
pub enum FunctionOutcome {
    /// The function was rewritten into GSA form.
    Transformed(ControlFlowGraph),
    /// The function has no body and was skipped.
    Declaration(String),
    /// The function could not be transformed and must not be compared.
    Failed(FunctionError),
}

impl FunctionOutcome {
    /// The name of the function.
    pub fn name(&self) -> &str {
        match self {
            FunctionOutcome::Transformed(cfg) => &cfg.name,
            FunctionOutcome::Declaration(name) => name,
            FunctionOutcome::Failed(err) => &err.function,
        }
    }

    /// The transformed graph, if the transform succeeded.
    pub fn cfg(&self) -> Option<&ControlFlowGraph> {
        match self {
            FunctionOutcome::Transformed(cfg) => Some(cfg),
            _ => None,
        }
    }

    /// Check whether the transform failed.
    pub fn is_failed(&self) -> bool {
        match self {
            FunctionOutcome::Failed(_) => true,
            _ => false,
        }
    }
}
