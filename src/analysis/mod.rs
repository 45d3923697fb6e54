// Copyright (c) 2017-2021 Fabian Schuiki

//! Analysis passes on the IR
//!
//! This module implements dominance and loop analyses on control flow graphs.

mod domcheck;
mod domtree;
mod loops;

pub use self::domcheck::*;
pub use self::domtree::*;
pub use self::loops::*;
