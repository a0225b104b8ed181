//! Escalation policy: does this decision need a human operator?

use crate::config::Policy;
use crate::decision::Category;

#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    confidence_below: f32,
    min_message_chars: usize,
    categories: Vec<Category>,
}

impl EscalationPolicy {
    pub fn new(confidence_below: f32, min_message_chars: usize, categories: Vec<Category>) -> Self {
        Self {
            confidence_below,
            min_message_chars,
            categories,
        }
    }

    pub fn from_policy(p: &Policy) -> Self {
        Self::new(p.escalate_below, p.min_message_chars, p.escalate_categories.clone())
    }

    /// `message_len` is the character count of the trimmed message.
    /// Monotonic in `confidence`: lowering it can only turn false into true.
    pub fn needs_human(&self, confidence: f32, message_len: usize, category: Category) -> bool {
        confidence < self.confidence_below
            || message_len < self.min_message_chars
            || self.categories.contains(&category)
    }
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::from_policy(&Policy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_rule_escalates_on_its_own() {
        let p = EscalationPolicy::default();
        assert!(!p.needs_human(0.9, 20, Category::Network));
        assert!(p.needs_human(0.29, 20, Category::Network));
        assert!(p.needs_human(0.9, 2, Category::Network));
        assert!(p.needs_human(0.9, 20, Category::Other));
    }

    #[test]
    fn boundary_values_do_not_escalate() {
        let p = EscalationPolicy::default();
        assert!(!p.needs_human(0.3, 3, Category::Hardware));
    }

    #[test]
    fn monotonic_in_confidence() {
        let p = EscalationPolicy::default();
        let mut seen_true = false;
        let mut c = 1.0f32;
        while c >= 0.0 {
            let r = p.needs_human(c, 20, Category::Software);
            if seen_true {
                assert!(r, "flipped back to false at confidence {c}");
            }
            seen_true |= r;
            c -= 0.01;
        }
        assert!(seen_true);
    }

    #[test]
    fn empty_message_always_escalates() {
        let p = EscalationPolicy::default();
        assert!(p.needs_human(1.0, 0, Category::Greeting));
    }
}
