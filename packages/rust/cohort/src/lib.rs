//! Cohort (A/B variant) assignment.
//!
//! Assignment is a pure function of its inputs: a previously issued token is
//! returned unchanged, and only a first assignment draws from the injected
//! random source. [`CohortAssigner::assign_for_identity`] offers a token-free,
//! fully deterministic bucket for an IP address or similar identity.

use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use pagegen_shared::{CohortConfig, PagegenError, Result, VariantWeight};

/// Result of an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CohortAssignment {
    /// Variant label; also the token the caller persists.
    pub variant: String,
    /// `true` when newly drawn, i.e. the caller must persist the token.
    pub fresh: bool,
}

/// Weighted table over a fixed, closed set of variants.
#[derive(Debug, Clone)]
pub struct CohortAssigner {
    variants: Vec<VariantWeight>,
    total_weight: u32,
}

impl CohortAssigner {
    /// Build an assigner; labels must be unique and at least one weight non-zero.
    pub fn new(variants: Vec<VariantWeight>) -> Result<Self> {
        let mut total_weight: u32 = 0;
        for (i, v) in variants.iter().enumerate() {
            if v.label.trim().is_empty() {
                return Err(PagegenError::config("cohort variant label must not be empty"));
            }
            if variants[..i]
                .iter()
                .any(|other| other.label.eq_ignore_ascii_case(&v.label))
            {
                return Err(PagegenError::config(format!(
                    "duplicate cohort variant `{}`",
                    v.label
                )));
            }
            total_weight = total_weight.checked_add(v.weight).ok_or_else(|| {
                PagegenError::config("cohort variant weights overflow")
            })?;
        }
        if total_weight == 0 {
            return Err(PagegenError::config(
                "cohort variants need at least one non-zero weight",
            ));
        }

        Ok(Self {
            variants,
            total_weight,
        })
    }

    pub fn from_config(config: &CohortConfig) -> Result<Self> {
        Self::new(config.variants.clone())
    }

    /// Variant labels in table order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(|v| v.label.as_str())
    }

    /// Canonical label named by `token`, if it names a variant.
    pub fn resolve(&self, token: &str) -> Option<&str> {
        let token = token.trim();
        self.variants
            .iter()
            .find(|v| v.label.eq_ignore_ascii_case(token))
            .map(|v| v.label.as_str())
    }

    /// Keep a valid existing token, otherwise draw a variant from `rng`.
    pub fn assign<R: RngCore + ?Sized>(
        &self,
        existing: Option<&str>,
        rng: &mut R,
    ) -> CohortAssignment {
        if let Some(label) = existing.and_then(|t| self.resolve(t)) {
            return CohortAssignment {
                variant: label.to_string(),
                fresh: false,
            };
        }

        if let Some(token) = existing {
            debug!(token, "ignoring unknown cohort token");
        }

        CohortAssignment {
            variant: self.pick(rng.next_u32()).to_string(),
            fresh: true,
        }
    }

    /// Deterministic variant for an identity (e.g. an IP address).
    pub fn assign_for_identity(&self, identity: &str) -> &str {
        let digest = Sha256::digest(identity.trim().as_bytes());
        let roll = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        self.pick(roll)
    }

    /// Map a uniform `u32` onto the weighted table.
    fn pick(&self, roll: u32) -> &str {
        let point = (u64::from(roll) * u64::from(self.total_weight)) >> 32;
        let mut upper: u64 = 0;
        for v in &self.variants {
            upper += u64::from(v.weight);
            if point < upper {
                return &v.label;
            }
        }
        // Unreachable while total_weight > 0: point < total_weight == final upper.
        &self.variants[self.variants.len() - 1].label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    /// Replays a fixed sequence of rolls.
    struct SequenceRng {
        values: Vec<u32>,
        next: usize,
    }

    impl SequenceRng {
        fn new(values: &[u32]) -> Self {
            Self {
                values: values.to_vec(),
                next: 0,
            }
        }
    }

    impl RngCore for SequenceRng {
        fn next_u32(&mut self) -> u32 {
            let v = self.values[self.next % self.values.len()];
            self.next += 1;
            v
        }
        fn next_u64(&mut self) -> u64 {
            u64::from(self.next_u32())
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for b in dest {
                *b = self.next_u32() as u8;
            }
        }
        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    fn assigner() -> CohortAssigner {
        CohortAssigner::from_config(&CohortConfig::default()).unwrap()
    }

    #[test]
    fn valid_tokens_are_stable() {
        let a = assigner();
        let mut rng = SequenceRng::new(&[u32::MAX]);
        for label in ["control", "social-proof", "urgency"] {
            let out = a.assign(Some(label), &mut rng);
            assert_eq!(out.variant, label);
            assert!(!out.fresh);
        }
        assert_eq!(rng.next, 0, "stable tokens must not consume randomness");
    }

    #[test]
    fn tokens_match_case_insensitively() {
        let a = assigner();
        let out = a.assign(Some("  Social-Proof "), &mut SequenceRng::new(&[0]));
        assert_eq!(out.variant, "social-proof");
        assert!(!out.fresh);
    }

    #[test]
    fn unknown_or_missing_token_draws_fresh() {
        let a = assigner();
        let out = a.assign(Some("variant-z"), &mut SequenceRng::new(&[0]));
        assert_eq!(out.variant, "control");
        assert!(out.fresh);

        let out = a.assign(None, &mut SequenceRng::new(&[u32::MAX]));
        assert_eq!(out.variant, "urgency");
        assert!(out.fresh);
    }

    #[test]
    fn weight_boundaries() {
        // Weights 34/33/33: control covers rolls below 0.34 * 2^32.
        let a = assigner();
        let draw = |roll: u32| a.assign(None, &mut SequenceRng::new(&[roll])).variant;

        assert_eq!(draw(0), "control");
        assert_eq!(draw(1_460_288_880), "control");
        assert_eq!(draw(1_460_288_881), "social-proof");
        assert_eq!(draw(2_877_628_088), "social-proof");
        assert_eq!(draw(2_877_628_089), "urgency");
        assert_eq!(draw(u32::MAX), "urgency");
    }

    #[test]
    fn zero_weight_variant_is_never_drawn_but_stays_valid() {
        let a = CohortAssigner::new(vec![
            VariantWeight {
                label: "retired".into(),
                weight: 0,
            },
            VariantWeight {
                label: "live".into(),
                weight: 1,
            },
        ])
        .unwrap();

        for roll in [0, 1 << 31, u32::MAX] {
            assert_eq!(a.assign(None, &mut SequenceRng::new(&[roll])).variant, "live");
        }
        let kept = a.assign(Some("retired"), &mut SequenceRng::new(&[0]));
        assert_eq!(kept.variant, "retired");
        assert!(!kept.fresh);
    }

    #[test]
    fn reassigning_an_assignment_is_stable() {
        let a = assigner();
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let first = a.assign(None, &mut rng);
            let second = a.assign(Some(first.variant.as_str()), &mut rng);
            assert_eq!(second.variant, first.variant);
            assert!(!second.fresh);
        }
    }

    #[test]
    fn draws_follow_weights() {
        let a = assigner();
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..30_000 {
            *counts.entry(a.assign(None, &mut rng).variant).or_default() += 1;
        }
        for (label, expected) in [("control", 0.34), ("social-proof", 0.33), ("urgency", 0.33)] {
            let share = f64::from(counts[label]) / 30_000.0;
            assert!((share - expected).abs() < 0.02, "{label}: {share}");
        }
    }

    #[test]
    fn identity_assignment_is_deterministic() {
        let a = assigner();
        let first = a.assign_for_identity("203.0.113.7");
        assert_eq!(first, a.assign_for_identity("203.0.113.7"));
        assert_eq!(first, a.assign_for_identity(" 203.0.113.7 "));

        let labels: std::collections::HashSet<&str> = (0..300)
            .map(|i| a.assign_for_identity(&format!("198.51.100.{i}")))
            .collect();
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn rejects_bad_variant_sets() {
        assert!(CohortAssigner::new(vec![]).is_err());
        let dup = vec![
            VariantWeight {
                label: "a".into(),
                weight: 1,
            },
            VariantWeight {
                label: "A".into(),
                weight: 1,
            },
        ];
        assert!(CohortAssigner::new(dup).is_err());
    }
}
