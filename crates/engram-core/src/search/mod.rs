//! Scoring and ordering for recall
//!
//! The pipeline is: cosine similarity in [-1, 1], remapped to [0, 1],
//! optionally multiplied by an exponential time-decay factor with a floor,
//! then thresholded and ordered deterministically.
//!
//! Two recalls with identical inputs against an unchanged store return
//! identical ordering: ties break by `updated_at` descending, then id
//! ascending.

use chrono::{DateTime, Utc};

use crate::memory::RecallHit;

// ============================================================================
// SCORING
// ============================================================================

/// Remap raw cosine similarity from [-1, 1] to [0, 1]
#[inline]
pub fn normalize_similarity(cosine: f32) -> f64 {
    (f64::from(cosine) + 1.0) / 2.0
}

/// Exponential decay factor for a memory of the given age.
///
/// `decay = exp(-age_days / half_life_days)`; age at or below zero decays
/// nothing.
#[inline]
pub fn time_decay_factor(age_days: f64, half_life_days: f64) -> f64 {
    if age_days <= 0.0 {
        return 1.0;
    }
    (-age_days / half_life_days).exp()
}

/// Age in fractional days between a reference timestamp and now
#[inline]
pub fn age_days(reference: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = now.signed_duration_since(reference).num_milliseconds();
    millis as f64 / 86_400_000.0
}

/// Final score: normalized similarity, decayed when requested, floored so
/// old-but-relevant memories are not erased by age alone.
#[inline]
pub fn final_score(normalized: f64, decay: Option<f64>, min_score: f64) -> f64 {
    match decay {
        Some(factor) => (normalized * factor).max(min_score),
        None => normalized,
    }
}

// ============================================================================
// ORDERING
// ============================================================================

/// Sort hits by final score descending, ties by `updated_at` descending,
/// then id ascending. Scores are never NaN, so the ordering is total.
pub fn order_hits(hits: &mut [RecallHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.memory.updated_at.cmp(&a.memory.updated_at))
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });
}

// ============================================================================
// TESTS
// ============================================================================
