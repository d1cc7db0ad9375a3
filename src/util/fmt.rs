//! Human-readable dumps of the intermediate stages of the pipeline.

pub mod tokens;
pub mod tree;
