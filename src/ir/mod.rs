// Copyright (c) 2017-2021 Fabian Schuiki

//! Representation of functions as control flow graphs of basic blocks.
//!
//! This module implements the intermediate representation around which the
//! rest of the crate is built: instructions, basic blocks, the control flow
//! graph that owns them, and the external records they are read from.

mod block;
mod cfg;
mod inst;
pub mod prelude;
mod record;

pub use self::block::*;
pub use self::cfg::*;
pub use self::inst::*;
pub use self::record::*;
