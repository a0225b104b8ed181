// src/config/taxonomy.rs
//! Taxonomy: categories, keyword mapping, greeting tokens, solution catalog,
//! response templates and policy thresholds, all in one immutable value.
//!
//! The built-in copy lives in `config/taxonomy.toml` and is embedded at compile
//! time. `TRIAGE_TAXONOMY_PATH` points the service at a file on disk instead.

use anyhow::{anyhow, bail, ensure, Context, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::decision::Category;

pub const ENV_TAXONOMY_PATH: &str = "TRIAGE_TAXONOMY_PATH";

const BUILTIN_TAXONOMY: &str = include_str!("../../config/taxonomy.toml");

static BUILTIN: Lazy<Result<Arc<Taxonomy>, String>> = Lazy::new(|| {
    Taxonomy::from_toml_str(BUILTIN_TAXONOMY)
        .map(Arc::new)
        .map_err(|e| format!("{e:#}"))
});

/// Keyword terms that vote for one category.
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordGroup {
    pub category: Category,
    pub terms: Vec<String>,
}

/// One canned answer. Read-only after load.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SolutionRecord {
    pub category: Category,
    #[serde(rename = "triggers")]
    pub trigger_phrases: Vec<String>,
    #[serde(rename = "answer")]
    pub answer_text: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(rename = "confidence")]
    pub base_confidence: f32,
}

impl SolutionRecord {
    /// True if any trigger phrase occurs in the (already lower-cased) message.
    pub fn triggered_by(&self, lowered: &str) -> bool {
        self.trigger_phrases.iter().any(|t| lowered.contains(t.as_str()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Templates {
    /// Used when nothing matched and the generation service is unreachable.
    pub fallback: String,
    /// Used when the generation call failed. `{message}` is replaced with the request.
    pub generation_unavailable: String,
    /// Used for degraded decisions after a pipeline fault.
    pub apology: String,
    pub system_prompt: String,
}

impl Templates {
    pub fn render_generation_unavailable(&self, message: &str) -> String {
        self.generation_unavailable.replace("{message}", message)
    }
}

/// Decision thresholds. All fields default, so a `[policy]` table may list only
/// the values it wants to change.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub keyword_divisor: f32,
    pub no_match_confidence: f32,
    pub greeting_confidence: f32,
    pub short_message_chars: usize,
    pub short_message_floor: f32,
    /// A knowledge-base record is adopted verbatim only above this (strict).
    pub kb_accept_threshold: f32,
    pub generated_confidence: f32,
    pub generation_error_confidence: f32,
    pub offline_default_confidence: f32,
    pub escalate_below: f32,
    pub min_message_chars: usize,
    pub escalate_categories: Vec<Category>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            keyword_divisor: 5.0,
            no_match_confidence: 0.1,
            greeting_confidence: 0.9,
            short_message_chars: 10,
            short_message_floor: 0.8,
            kb_accept_threshold: 0.7,
            generated_confidence: 0.6,
            generation_error_confidence: 0.1,
            offline_default_confidence: 0.3,
            escalate_below: 0.3,
            min_message_chars: 3,
            escalate_categories: vec![Category::Other],
        }
    }
}

impl Policy {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.keyword_divisor.is_finite() && self.keyword_divisor > 0.0,
            "policy.keyword_divisor must be > 0 (got {})",
            self.keyword_divisor
        );
        for (name, v) in [
            ("no_match_confidence", self.no_match_confidence),
            ("greeting_confidence", self.greeting_confidence),
            ("short_message_floor", self.short_message_floor),
            ("kb_accept_threshold", self.kb_accept_threshold),
            ("generated_confidence", self.generated_confidence),
            ("generation_error_confidence", self.generation_error_confidence),
            ("offline_default_confidence", self.offline_default_confidence),
            ("escalate_below", self.escalate_below),
        ] {
            ensure_unit(name, v)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Taxonomy {
    /// Tokens that force the classifier's greeting override.
    pub greeting_tokens: Vec<String>,
    /// Tokens that let a `greeting` record answer a message of another
    /// category. Defaults to `greeting_tokens` when omitted.
    #[serde(default)]
    pub explicit_greeting_tokens: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<KeywordGroup>,
    #[serde(default)]
    pub solutions: Vec<SolutionRecord>,
    pub templates: Templates,
    #[serde(default)]
    pub policy: Policy,
}

impl Taxonomy {
    /// The embedded taxonomy, parsed once per process.
    pub fn builtin() -> Result<Arc<Self>> {
        BUILTIN
            .as_ref()
            .map(Arc::clone)
            .map_err(|e| anyhow!("built-in taxonomy is invalid: {e}"))
    }

    /// Resolve the taxonomy for this process:
    /// 1) $TRIAGE_TAXONOMY_PATH (must exist)
    /// 2) the built-in copy
    pub fn load_default() -> Result<Arc<Self>> {
        match std::env::var(ENV_TAXONOMY_PATH) {
            Ok(p) if !p.trim().is_empty() => {
                let path = PathBuf::from(p.trim());
                if !path.exists() {
                    bail!("{ENV_TAXONOMY_PATH} points to non-existent path {}", path.display());
                }
                Self::load_from(&path).map(Arc::new)
            }
            _ => Self::builtin(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading taxonomy from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing taxonomy {}", path.display()))
    }

    /// Parse, normalize and validate.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut tax: Taxonomy = toml::from_str(s)?;
        tax.normalize();
        tax.validate()?;
        Ok(tax)
    }

    /// Keyword groups in definition order.
    pub fn keyword_groups(&self) -> &[KeywordGroup] {
        &self.keywords
    }

    /// Catalog entries in file order.
    pub fn solutions(&self) -> &[SolutionRecord] {
        &self.solutions
    }

    /// True if the lower-cased message contains an explicit greeting token.
    pub fn has_greeting(&self, lowered: &str) -> bool {
        self.greeting_tokens.iter().any(|g| lowered.contains(g.as_str()))
    }

    /// Knowledge-base gate for `greeting` records found outside their category.
    pub fn has_explicit_greeting(&self, lowered: &str) -> bool {
        self.explicit_greeting_tokens
            .iter()
            .any(|g| lowered.contains(g.as_str()))
    }

    fn normalize(&mut self) {
        self.greeting_tokens = clean_terms(std::mem::take(&mut self.greeting_tokens));
        self.explicit_greeting_tokens = if self.explicit_greeting_tokens.is_empty() {
            self.greeting_tokens.clone()
        } else {
            clean_terms(std::mem::take(&mut self.explicit_greeting_tokens))
        };
        for group in &mut self.keywords {
            group.terms = clean_terms(std::mem::take(&mut group.terms));
        }
        for rec in &mut self.solutions {
            rec.trigger_phrases = clean_terms(std::mem::take(&mut rec.trigger_phrases));
            rec.steps.retain(|s| !s.trim().is_empty());
        }
    }

    fn validate(&self) -> Result<()> {
        self.policy.validate()?;
        for rec in &self.solutions {
            ensure_unit(&format!("solution[{}].confidence", rec.category), rec.base_confidence)?;
            ensure!(
                !rec.answer_text.trim().is_empty(),
                "solution for `{}` has an empty answer",
                rec.category
            );
            ensure!(
                !rec.trigger_phrases.is_empty(),
                "solution for `{}` has no trigger phrases",
                rec.category
            );
        }
        for (name, t) in [
            ("fallback", &self.templates.fallback),
            ("generation_unavailable", &self.templates.generation_unavailable),
            ("apology", &self.templates.apology),
            ("system_prompt", &self.templates.system_prompt),
        ] {
            ensure!(!t.trim().is_empty(), "templates.{name} must not be empty");
        }
        Ok(())
    }
}

fn ensure_unit(name: &str, v: f32) -> Result<()> {
    ensure!(
        v.is_finite() && (0.0..=1.0).contains(&v),
        "{name} must be within [0,1] (got {v})"
    );
    Ok(())
}

/// Trim, lower-case, drop empties. Order is kept; later duplicates are dropped.
fn clean_terms(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim().to_lowercase();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}
