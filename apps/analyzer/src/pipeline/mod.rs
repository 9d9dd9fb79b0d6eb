//! The resume pipeline: normalization, structuring, scoring and the
//! orchestrator that drives them for one job.

pub mod error;
pub mod keyword;
pub mod normalizer;
pub mod orchestrator;
pub mod prompts;
pub mod scorer;
pub mod structurer;
