//! Sheet analysis pipeline.
//!
//! Glue between the stages; the algorithms live in `crate::preprocess`,
//! `crate::candidate`, `crate::grid` and `crate::fill`. Grading, quality and
//! timing are layered on top by [`crate::OmrEngine`].

mod result;
mod run;

#[cfg(test)]
mod tests;

pub use result::{Outcome, ProcessingResult, SheetAnalysis};
pub use run::analyze;
