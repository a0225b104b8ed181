//! decision.rs: Category labels, provenance tags and the terminal `Decision`.
//!
//! A `Decision` is produced exactly once per message by the orchestrator and is
//! the only thing the transport layer sees. Confidence is always kept in [0,1].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Topic of a support request. Closed label set; configuration that names an
/// unknown label fails to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    PasswordReset,
    AccessIssues,
    Hardware,
    Software,
    Network,
    Greeting,
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::PasswordReset,
        Category::AccessIssues,
        Category::Hardware,
        Category::Software,
        Category::Network,
        Category::Greeting,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::PasswordReset => "password_reset",
            Category::AccessIssues => "access_issues",
            Category::Hardware => "hardware",
            Category::Software => "software",
            Category::Network => "network",
            Category::Greeting => "greeting",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == needle)
            .ok_or_else(|| anyhow::anyhow!("unknown category `{s}`"))
    }
}

/// Where the response text of a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// A solution record or a static fallback template. Never generated text.
    KnowledgeBase,
    /// A completion from the generation service.
    Generated,
    /// Templated notice after a failed generation call or a pipeline fault.
    Error,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::KnowledgeBase => "knowledge_base",
            Provenance::Generated => "generated",
            Provenance::Error => "error",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal output of the pipeline for a single message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub response_text: String,
    /// Absent only for a degraded decision produced after a pipeline fault.
    pub category: Option<Category>,
    /// Always within [0,1] when present.
    pub confidence: Option<f32>,
    pub provenance: Provenance,
    pub needs_human: bool,
    #[serde(default)]
    pub solution_steps: Vec<String>,
}

impl Decision {
    pub fn new(
        response_text: impl Into<String>,
        category: Category,
        confidence: f32,
        provenance: Provenance,
    ) -> Self {
        Self {
            response_text: response_text.into(),
            category: Some(category),
            confidence: Some(clamp01(confidence)),
            provenance,
            needs_human: false,
            solution_steps: Vec::new(),
        }
    }

    /// Decision returned when the pipeline faulted: no category, no confidence,
    /// always escalated.
    pub fn degraded(apology: impl Into<String>) -> Self {
        Self {
            response_text: apology.into(),
            category: None,
            confidence: None,
            provenance: Provenance::Error,
            needs_human: true,
            solution_steps: Vec::new(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.solution_steps = steps;
        self
    }

    pub fn escalated(mut self, needs_human: bool) -> Self {
        self.needs_human = needs_human;
        self
    }

    pub fn is_degraded(&self) -> bool {
        self.category.is_none()
    }
}

pub(crate) fn clamp01(x: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialize_decision_shape() {
        let d = Decision::new("Reset it", Category::PasswordReset, 0.9, Provenance::KnowledgeBase)
            .with_steps(vec!["Open portal".into()])
            .escalated(false);

        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["category"], json!("password_reset"));
        assert_eq!(v["provenance"], json!("knowledge_base"));
        assert_eq!(v["needs_human"], json!(false));
        assert_eq!(v["solution_steps"], json!(["Open portal"]));
        let conf = v["confidence"].as_f64().unwrap();
        assert!((conf - 0.9).abs() < 1e-6, "confidence ~= 0.9, got {conf}");
    }

    #[test]
    fn confidence_is_clamped() {
        let hi = Decision::new("x", Category::Other, 1.7, Provenance::Error);
        let lo = Decision::new("x", Category::Other, -0.2, Provenance::Error);
        assert_eq!(hi.confidence, Some(1.0));
        assert_eq!(lo.confidence, Some(0.0));
    }

    #[test]
    fn degraded_has_no_category_and_escalates() {
        let d = Decision::degraded("sorry");
        assert!(d.is_degraded());
        assert!(d.needs_human);
        assert_eq!(d.confidence, None);
        assert_eq!(d.provenance, Provenance::Error);
    }

    #[test]
    fn category_round_trips_through_str() {
        for c in Category::ALL {
            assert_eq!(c.as_str().parse::<Category>().unwrap(), c);
        }
        assert!("billing".parse::<Category>().is_err());
    }
}
