//! Query pipeline: method descriptors in, column-resolved compiled queries
//! out. No string keys survive compilation.

pub mod descriptor;
pub mod operator;
pub(crate) mod compile;
pub(crate) mod compiled;
