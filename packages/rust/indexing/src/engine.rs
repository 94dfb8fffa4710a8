//! Decision engine: runs every rule in order and accumulates reasons.

use tracing::trace;

use pagegen_shared::{IndexDecision, IndexingConfig};

use crate::rules::{PageCandidate, Rule};

/// Ordered rule set deciding whether a candidate page is worth indexing.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    rules: Vec<Rule>,
}

impl DecisionEngine {
    /// Compose the engine from an explicit rule list, evaluated in order.
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Standard rule order: service, location, content depth, then local proof if enabled.
    pub fn from_config(config: &IndexingConfig) -> Self {
        let mut rules = vec![
            Rule::service_allow(&config.priority_services),
            Rule::location_allow(&config.allowed_locations),
            Rule::ContentDepth {
                min_words: config.min_word_count,
            },
        ];
        if config.require_local_proof {
            rules.push(Rule::LocalProof);
        }
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Evaluate every rule; a failing rule never stops the rest from running.
    pub fn evaluate(&self, candidate: &PageCandidate<'_>) -> IndexDecision {
        let reasons: Vec<String> = self
            .rules
            .iter()
            .filter_map(|rule| {
                let reason = rule.check(candidate);
                trace!(
                    rule = rule.name(),
                    service = %candidate.service.slug,
                    location = %candidate.location.slug,
                    passed = reason.is_none(),
                    "rule evaluated"
                );
                reason
            })
            .collect();

        IndexDecision::from_reasons(reasons)
    }
}
