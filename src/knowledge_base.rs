//! Static solution catalog lookup, gated by trigger phrases.
//!
//! Lookup order (first match wins, no scoring across matches):
//! 1) records of the requested category, in catalog order
//! 2) records of every other category, in catalog order; a `greeting` record
//!    only qualifies when the message carries an explicit greeting token
//! 3) nothing

use std::sync::Arc;

use crate::config::{SolutionRecord, Taxonomy};
use crate::decision::Category;

#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    taxonomy: Arc<Taxonomy>,
}

impl KnowledgeBase {
    pub fn new(taxonomy: Arc<Taxonomy>) -> Self {
        Self { taxonomy }
    }

    /// Pure read over the catalog; identical inputs give identical results.
    pub fn search(&self, message: &str, category: Category) -> Option<&SolutionRecord> {
        let lowered = message.trim().to_lowercase();
        let catalog = self.taxonomy.solutions();

        if let Some(hit) = catalog
            .iter()
            .filter(|r| r.category == category)
            .find(|r| r.triggered_by(&lowered))
        {
            return Some(hit);
        }

        let greeting_allowed = self.taxonomy.has_explicit_greeting(&lowered);
        catalog
            .iter()
            .filter(|r| r.category != category)
            .filter(|r| r.category != Category::Greeting || greeting_allowed)
            .find(|r| r.triggered_by(&lowered))
    }
}
