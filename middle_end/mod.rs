pub mod analysis;
pub mod optimization;
pub mod ssa;
