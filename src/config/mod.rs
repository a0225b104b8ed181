// src/config/mod.rs
pub mod generation;
pub mod taxonomy;

pub use generation::{GenerationMode, GenerationSettings};
pub use taxonomy::{KeywordGroup, Policy, SolutionRecord, Taxonomy, Templates};
