//! Optimization passes.

pub mod devirtualize;
