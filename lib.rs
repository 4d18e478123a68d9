//! Resolution of indirect call targets over an SSA module.
//!
//! The IR lives in [middle_end::ssa], the analyses in [middle_end::analysis]
//! and the devirtualizing driver in [middle_end::optimization].

pub mod commons;
pub mod error;
pub mod logging;
pub mod middle_end;

pub use error::Error;
