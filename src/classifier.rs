//! Keyword classifier: message → (category, confidence, matched keywords).
//!
//! Scoring is plain lower-cased substring matching against the taxonomy's
//! keyword groups. After scoring, override rules run in the fixed order of
//! [`OVERRIDE_ORDER`]; each rule sees the result of the previous one.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::Taxonomy;
use crate::decision::{clamp01, Category};

/// Post-scoring adjustments, listed in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideRule {
    /// Any greeting token forces `greeting` at the greeting confidence.
    Greeting,
    /// A trimmed message shorter than the threshold has its confidence raised
    /// to the floor. Never lowers it, so it can co-fire with `Greeting`.
    ShortMessage,
}

pub const OVERRIDE_ORDER: [OverrideRule; 2] = [OverrideRule::Greeting, OverrideRule::ShortMessage];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub category: Category,
    pub confidence: f32,
    pub matched_keywords: BTreeSet<String>,
    /// Overrides whose condition held, in the order they were applied.
    pub overrides: Vec<OverrideRule>,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    taxonomy: Arc<Taxonomy>,
}

impl Classifier {
    pub fn new(taxonomy: Arc<Taxonomy>) -> Self {
        Self { taxonomy }
    }

    /// Never fails. Falls back to `other` at the no-match confidence.
    pub fn classify(&self, message: &str) -> Classification {
        let policy = &self.taxonomy.policy;
        let lowered = message.to_lowercase();

        // Per-category counters in group definition order; a category that
        // appears in several groups keeps the slot of its first group.
        let mut counters: Vec<(Category, u32)> = Vec::new();
        let mut matched_keywords = BTreeSet::new();
        for group in self.taxonomy.keyword_groups() {
            let hits = group
                .terms
                .iter()
                .filter(|term| lowered.contains(term.as_str()))
                .inspect(|term| {
                    matched_keywords.insert((*term).clone());
                })
                .count() as u32;

            match counters.iter_mut().find(|(c, _)| *c == group.category) {
                Some((_, n)) => *n += hits,
                None => counters.push((group.category, hits)),
            }
        }

        let total: u32 = counters.iter().map(|(_, n)| n).sum();
        let (mut category, mut confidence) = if total == 0 {
            (Category::Other, policy.no_match_confidence)
        } else {
            // Strict `>` keeps the earlier category on ties.
            let mut best = counters[0];
            for &(c, n) in &counters[1..] {
                if n > best.1 {
                    best = (c, n);
                }
            }
            (best.0, (total as f32 / policy.keyword_divisor).min(1.0))
        };

        let mut overrides = Vec::new();
        for rule in OVERRIDE_ORDER {
            match rule {
                OverrideRule::Greeting => {
                    if self.taxonomy.has_greeting(&lowered) {
                        category = Category::Greeting;
                        confidence = policy.greeting_confidence;
                        overrides.push(rule);
                    }
                }
                OverrideRule::ShortMessage => {
                    if message.trim().chars().count() < policy.short_message_chars {
                        confidence = confidence.max(policy.short_message_floor);
                        overrides.push(rule);
                    }
                }
            }
        }

        Classification {
            category,
            confidence: clamp01(confidence),
            matched_keywords,
            overrides,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(Taxonomy::builtin().unwrap())
    }

    #[test]
    fn password_keyword_scores_password_reset() {
        let c = classifier().classify("забыл пароль");
        // "пароль" also contains the access_issues stem "роль": a 1–1 tie that
        // password_reset wins by being defined first.
        assert_eq!(c.category, Category::PasswordReset);
        assert!((c.confidence - 0.4).abs() < 1e-6, "got {}", c.confidence);
        assert!(c.matched_keywords.contains("пароль"));
        assert!(c.matched_keywords.contains("роль"));
        assert!(c.overrides.is_empty());
    }

    #[test]
    fn confidence_sums_all_categories_and_caps_at_one() {
        // vpn + сеть (network), принтер + печать (hardware), outlook (software)
        let c = classifier().classify("vpn и сеть упали, принтер и печать тоже, outlook молчит");
        assert!((c.confidence - 1.0).abs() < 1e-6);
        assert_eq!(c.matched_keywords.len(), 5);
    }

    #[test]
    fn ties_go_to_first_defined_category() {
        // One hit each for password_reset, access_issues ("роль") and network.
        let c = classifier().classify("пароль для vpn не подходит");
        assert_eq!(c.category, Category::PasswordReset);
    }

    #[test]
    fn higher_count_beats_definition_order() {
        let c = classifier().classify("пароль сбросили, а vpn и интернет пропали");
        // password_reset 2, access_issues 1, network 2 -> tie -> password_reset
        assert_eq!(c.category, Category::PasswordReset);
        let c = classifier().classify("пароль есть, но vpn, интернет и wi-fi не работают");
        assert_eq!(c.category, Category::Network);
    }

    #[test]
    fn no_match_is_other_with_floor_confidence() {
        let c = classifier().classify("xyzzy random gibberish");
        assert_eq!(c.category, Category::Other);
        assert!((c.confidence - 0.1).abs() < 1e-6);
        assert!(c.matched_keywords.is_empty());
    }

    #[test]
    fn greeting_overrides_keywords() {
        let c = classifier().classify("Привет! У меня не работает принтер и сеть");
        assert_eq!(c.category, Category::Greeting);
        assert!((c.confidence - 0.9).abs() < 1e-6);
        assert_eq!(c.overrides, vec![OverrideRule::Greeting]);
    }

    #[test]
    fn polite_opener_does_not_force_greeting() {
        // "добрый" only gates greeting records in the knowledge base.
        let c = classifier().classify("Добрый день, не работает принтер");
        assert_eq!(c.category, Category::Hardware);
        assert!((c.confidence - 0.2).abs() < 1e-6);
        assert!(c.overrides.is_empty());
    }

    #[test]
    fn short_message_raises_but_never_lowers() {
        let c = classifier().classify("vpn");
        assert_eq!(c.category, Category::Network);
        assert!((c.confidence - 0.8).abs() < 1e-6);
        assert_eq!(c.overrides, vec![OverrideRule::ShortMessage]);

        // Greeting (0.9) then short-message floor (0.8): stays 0.9.
        let c = classifier().classify("привет");
        assert!((c.confidence - 0.9).abs() < 1e-6);
        assert_eq!(c.overrides, OVERRIDE_ORDER.to_vec());
    }

    #[test]
    fn short_message_counts_characters_not_bytes() {
        // 8 Cyrillic characters, 16 bytes.
        let c = classifier().classify("  сломался  ");
        assert_eq!(c.category, Category::Other);
        assert!(c.confidence >= 0.8);
    }

    #[test]
    fn empty_message_is_other_and_short() {
        let c = classifier().classify("   ");
        assert_eq!(c.category, Category::Other);
        assert!((c.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn confidence_always_in_unit_range() {
        let cl = classifier();
        for msg in [
            "",
            "a",
            "hello world",
            "пароль логин вход сброс учетная запись доступ access войти",
            "совершенно обычное длинное сообщение без ключевых слов вообще",
        ] {
            let c = cl.classify(msg);
            assert!((0.0..=1.0).contains(&c.confidence), "{msg:?} -> {}", c.confidence);
        }
    }
}
