// Copyright (c) 2017-2021 Fabian Schuiki

//! Transformation passes on control flow graphs.
//!
//! This module implements the passes that rewrite a function's control flow
//! graph into a form suitable for term rewriting.

pub mod gsa;

pub use gsa::GsaTransform;
