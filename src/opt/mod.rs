// Copyright (c) 2017-2021 Fabian Schuiki

//! This module implements the infrastructure to run passes over the functions
//! of a module.

pub mod pass;

/// Re-exports of commonly used pass items.
pub mod prelude {
    pub use super::pass::*;
}
