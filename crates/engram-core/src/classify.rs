//! Heuristic classification and importance scoring
//!
//! Pure functions over content text. Keyword families map whole words
//! (case-insensitive) to memory types; the importance score starts at a
//! neutral base and moves with signal words, length and filler density.
//!
//! The `Classifier` trait lets a learned model replace the heuristics
//! without touching the engine, as long as it returns one of the allowed
//! types.

use std::collections::HashSet;

use crate::memory::{clamp_importance, MemoryType};

// ============================================================================
// KEYWORD FAMILIES
// ============================================================================

const TASK_WORDS: &[&str] = &["task", "todo", "deadline", "meeting", "complete", "action", "finish"];
const PREFERENCE_WORDS: &[&str] = &["prefer", "like", "favorite", "enjoy", "dislike"];
const EMOTION_WORDS: &[&str] = &["feel", "felt", "happy", "sad", "angry", "excited", "love", "hate"];
const PROCEDURE_WORDS: &[&str] = &["step", "procedure", "method", "process"];
const PERSONALITY_WORDS: &[&str] = &["personality", "behavior", "style", "calm", "patient"];
const FACT_WORDS: &[&str] = &["is", "are", "was", "were", "always", "never"];

const HIGH_SIGNAL_WORDS: &[&str] = &["password", "secret", "key", "token", "critical", "urgent"];
const MEDIUM_SIGNAL_WORDS: &[&str] = &["deadline", "remember", "always", "never"];
const FILLER_WORDS: &[&str] = &["okay", "fine", "nice", "weather", "good"];

/// Filler-word density at which the importance penalty kicks in
const FILLER_DENSITY_CUTOFF: f64 = 0.15;

/// Content length past which a small importance bonus applies
const LONG_CONTENT_CHARS: usize = 200;

/// Lowercased whole words of the content
fn words(content: &str) -> Vec<String> {
    content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn contains_any(word_set: &HashSet<&str>, family: &[&str]) -> bool {
    family.iter().any(|w| word_set.contains(w))
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Derive a memory type from content.
///
/// Families are checked from most to least specific; fact words act as the
/// catch-all before falling through to `Thread`.
pub fn classify(content: &str) -> MemoryType {
    let tokens = words(content);
    let word_set: HashSet<&str> = tokens.iter().map(|s| s.as_str()).collect();
    let lowered = content.to_lowercase();

    if contains_any(&word_set, TASK_WORDS) {
        MemoryType::Task
    } else if contains_any(&word_set, PREFERENCE_WORDS) {
        MemoryType::Preference
    } else if contains_any(&word_set, EMOTION_WORDS) {
        MemoryType::Emotion
    } else if contains_any(&word_set, PROCEDURE_WORDS) || lowered.contains("how to") {
        MemoryType::Procedure
    } else if contains_any(&word_set, PERSONALITY_WORDS) {
        MemoryType::Personality
    } else if contains_any(&word_set, FACT_WORDS) {
        MemoryType::Fact
    } else {
        MemoryType::Thread
    }
}

/// Derive an importance score in [0.1, 1.0] from content.
///
/// Base 0.5; high-signal words +0.3, medium-signal words +0.2, long content
/// +0.1, filler density >= 0.15 of tokens -0.2; clamped at the end.
pub fn score_importance(content: &str) -> f32 {
    let tokens = words(content);
    let word_set: HashSet<&str> = tokens.iter().map(|s| s.as_str()).collect();

    let mut score: f32 = 0.5;

    if contains_any(&word_set, HIGH_SIGNAL_WORDS) {
        score += 0.3;
    }
    if contains_any(&word_set, MEDIUM_SIGNAL_WORDS) {
        score += 0.2;
    }
    if content.len() > LONG_CONTENT_CHARS {
        score += 0.1;
    }

    if !tokens.is_empty() {
        let filler: HashSet<&str> = FILLER_WORDS.iter().copied().collect();
        let filler_count = tokens.iter().filter(|w| filler.contains(w.as_str())).count();
        let density = filler_count as f64 / tokens.len() as f64;
        if density >= FILLER_DENSITY_CUTOFF {
            score -= 0.2;
        }
    }

    clamp_importance(score)
}

// ============================================================================
// STRATEGY TRAIT
// ============================================================================

/// Pluggable classification strategy
pub trait Classifier: Send + Sync {
    /// Assign a memory type to content
    fn classify(&self, content: &str) -> MemoryType;

    /// Assign an importance score in [0.1, 1.0] to content
    fn score(&self, content: &str) -> f32;
}

/// Default keyword-based classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl Classifier for HeuristicClassifier {
    fn classify(&self, content: &str) -> MemoryType {
        classify(content)
    }

    fn score(&self, content: &str) -> f32 {
        score_importance(content)
    }
}

// ============================================================================
// TESTS
// ============================================================================
