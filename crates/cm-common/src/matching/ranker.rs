use std::cmp::Ordering;

use tracing::warn;

use crate::ConsultantProfile;

/// Blend weights for the vector-similarity and semantic-judge scores.
/// Must sum to 1.0; deployments have run both 0.6/0.4 and 0.4/0.6, so the
/// split is configuration rather than a constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankWeights {
    pub vector: f64,
    pub judge: f64,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            vector: 0.6,
            judge: 0.4,
        }
    }
}

impl RankWeights {
    pub fn sum(&self) -> f64 {
        self.vector + self.judge
    }

    pub fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() < 1e-6
    }

    /// Read the split from `RANK_WEIGHT_VECTOR` / `RANK_WEIGHT_JUDGE`.
    /// A split that does not sum to 1.0 is rejected with a warning and the
    /// default split is used instead.
    pub fn from_env() -> Self {
        fn parse_f64(key: &str) -> Option<f64> {
            std::env::var(key).ok().and_then(|raw| raw.parse().ok())
        }

        let defaults = Self::default();
        let candidate = Self {
            vector: parse_f64("RANK_WEIGHT_VECTOR").unwrap_or(defaults.vector),
            judge: parse_f64("RANK_WEIGHT_JUDGE").unwrap_or(defaults.judge),
        };

        if candidate.is_normalized() {
            candidate
        } else {
            warn!(
                vector = candidate.vector,
                judge = candidate.judge,
                "rank weights do not sum to 1.0; using defaults"
            );
            defaults
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankerConfig {
    pub weights: RankWeights,
    /// Inclusive lower bound for a candidate to appear in `all_matches`.
    pub score_threshold: f64,
    /// Size of the `top_matches` view.
    pub top_matches: usize,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            weights: RankWeights::default(),
            score_threshold: 0.2,
            top_matches: 3,
        }
    }
}

impl RankerConfig {
    pub fn from_env() -> Self {
        fn parse_f64(key: &str, default: f64) -> f64 {
            std::env::var(key)
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(default)
        }

        fn parse_usize(key: &str, default: usize) -> usize {
            std::env::var(key)
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(default)
        }

        let defaults = Self::default();
        Self {
            weights: RankWeights::from_env(),
            score_threshold: parse_f64("RANK_SCORE_THRESHOLD", defaults.score_threshold),
            top_matches: parse_usize("RANK_TOP_N", defaults.top_matches),
        }
    }
}

/// A candidate after both scoring stages, before ranking.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub profile: ConsultantProfile,
    pub vector_score: f64,
    pub judge_score: f64,
}

/// A candidate with its blended score and 1-based rank.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub profile: ConsultantProfile,
    pub vector_score: f64,
    pub judge_score: f64,
    pub hybrid_score: f64,
    pub rank: u32,
}

/// Blend, sort, and rank. Ordering is total and reproducible: descending by
/// hybrid score with ties broken by ascending profile id.
pub fn rank_candidates(candidates: Vec<ScoredCandidate>, weights: &RankWeights) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .into_iter()
        .map(|c| {
            let hybrid_score = weights.vector * c.vector_score + weights.judge * c.judge_score;
            RankedCandidate {
                profile: c.profile,
                vector_score: c.vector_score,
                judge_score: c.judge_score,
                hybrid_score,
                rank: 0,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.hybrid_score
            .partial_cmp(&a.hybrid_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.profile.id.cmp(&b.profile.id))
    });

    for (idx, candidate) in ranked.iter_mut().enumerate() {
        candidate.rank = (idx + 1) as u32;
    }

    ranked
}

/// First `n` entries of the ranked order (fewer if the pool is smaller).
pub fn top_matches(ranked: &[RankedCandidate], n: usize) -> Vec<RankedCandidate> {
    ranked.iter().take(n).cloned().collect()
}

/// Every entry at or above the threshold, in rank order. The bound is
/// inclusive: a candidate sitting exactly on it stays in.
pub fn all_matches(ranked: &[RankedCandidate], threshold: f64) -> Vec<RankedCandidate> {
    ranked
        .iter()
        .filter(|c| c.hybrid_score >= threshold)
        .cloned()
        .collect()
}
