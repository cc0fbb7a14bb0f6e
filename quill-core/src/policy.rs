//! Regeneration policy

use crate::config::PolicyConfig;
use crate::state::PolicyDecision;

/// Decides what happens after a quality check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegenerationPolicy {
    max_regenerations: u32,
    score_threshold: f64,
}

impl Default for RegenerationPolicy {
    fn default() -> Self {
        Self::from(&PolicyConfig::default())
    }
}

impl From<&PolicyConfig> for RegenerationPolicy {
    fn from(config: &PolicyConfig) -> Self {
        Self::new(config.max_regenerations, config.score_threshold)
    }
}

impl RegenerationPolicy {
    pub fn new(max_regenerations: u32, score_threshold: f64) -> Self {
        Self {
            max_regenerations,
            score_threshold,
        }
    }

    pub fn max_regenerations(&self) -> u32 {
        self.max_regenerations
    }

    pub fn score_threshold(&self) -> f64 {
        self.score_threshold
    }

    /// Whether another regeneration fits in the budget
    pub fn can_regenerate(&self, regeneration_count: u32) -> bool {
        regeneration_count < self.max_regenerations
    }

    /// Decide from the two gating scores. Absent scores count as 100.
    ///
    /// The budget check comes first: once it is spent the result is always
    /// `HumanReview`, whatever the scores.
    pub fn decide(
        &self,
        brand_score: Option<f64>,
        fact_score: Option<f64>,
        regeneration_count: u32,
    ) -> PolicyDecision {
        if !self.can_regenerate(regeneration_count) {
            return PolicyDecision::HumanReview;
        }

        let failing = |score: Option<f64>| score.unwrap_or(100.0) < self.score_threshold;
        if failing(brand_score) || failing(fact_score) {
            PolicyDecision::Regenerate
        } else {
            PolicyDecision::Complete
        }
    }
}
