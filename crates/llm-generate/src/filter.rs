//! Filters applied to the raw logits before sampling.

use partial_sort::PartialSort;

use crate::TokenId;

/// Minimum-length suppression followed by top-K truncation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogitsFilter {
    /// While the sequence is shorter than this, `eos_token_id` is masked out.
    pub min_length: usize,
    /// The end-of-sequence token.
    pub eos_token_id: TokenId,
    /// The top K tokens by score are kept.
    pub top_k: usize,
}
impl LogitsFilter {
    /// Filters `logits` for a sequence that currently holds `current_length` tokens.
    pub fn apply(&self, logits: &[f32], current_length: usize) -> Vec<f32> {
        filter_logits(
            logits,
            current_length,
            self.min_length,
            self.eos_token_id,
            self.top_k,
        )
    }
}

/// Applies [suppress_eos] and then [get_top_k] to a copy of `logits`.
///
/// The input slice is left untouched.
pub fn filter_logits(
    logits: &[f32],
    current_length: usize,
    min_length: usize,
    eos_token_id: TokenId,
    top_k: usize,
) -> Vec<f32> {
    let mut scores = logits.to_vec();
    suppress_eos(&mut scores, current_length, min_length, eos_token_id);
    get_top_k(&scores, top_k)
}

/// Sets the score of `eos_token_id` to negative infinity if `current_length < min_length`,
/// so that the sequence cannot end before it is `min_length` tokens long.
///
/// An `eos_token_id` outside of `scores` is ignored.
pub fn suppress_eos(
    scores: &mut [f32],
    current_length: usize,
    min_length: usize,
    eos_token_id: TokenId,
) {
    if current_length >= min_length {
        return;
    }
    if let Some(score) = scores.get_mut(eos_token_id as usize) {
        *score = f32::NEG_INFINITY;
    }
}

/// Keeps every score that is at least as large as the `top_k`-th largest score, and replaces
/// the rest with negative infinity.
///
/// `top_k` is clamped to `[1, scores.len()]`. All scores tied with the threshold are kept,
/// so more than `top_k` entries can survive.
pub fn get_top_k(scores: &[f32], top_k: usize) -> Vec<f32> {
    let mut filtered = scores.to_vec();
    if scores.is_empty() {
        return filtered;
    }

    let top_k = top_k.clamp(1, scores.len());
    let threshold = {
        let mut sorted = filtered.clone();
        // Sort descending
        sorted.partial_sort(top_k, |a, b| b.total_cmp(a));
        sorted[top_k - 1]
    };

    for score in filtered.iter_mut() {
        if *score < threshold {
            *score = f32::NEG_INFINITY;
        }
    }
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn retained(scores: &[f32]) -> usize {
        scores.iter().filter(|s| s.is_finite()).count()
    }

    #[test]
    fn test_top_k_keeps_the_largest_scores() {
        let scores = [1.0, 5.0, 3.0, -2.0, 4.0];
        let filtered = get_top_k(&scores, 2);
        assert_eq!(
            filtered,
            vec![
                f32::NEG_INFINITY,
                5.0,
                f32::NEG_INFINITY,
                f32::NEG_INFINITY,
                4.0
            ]
        );
    }

    #[test]
    fn test_top_k_keeps_ties_at_the_threshold() {
        let scores = [2.0, 1.0, 2.0, 2.0, 0.5];
        let filtered = get_top_k(&scores, 2);
        assert_eq!(retained(&filtered), 3);
        assert_eq!(filtered[1], f32::NEG_INFINITY);
        assert_eq!(filtered[4], f32::NEG_INFINITY);
    }

    #[test]
    fn test_top_k_is_clamped() {
        let scores = [0.1, 0.3, 0.2];
        assert_eq!(get_top_k(&scores, 100), scores.to_vec());

        let filtered = get_top_k(&scores, 0);
        assert_eq!(retained(&filtered), 1);
        assert_eq!(filtered[1], 0.3);

        assert!(get_top_k(&[], 5).is_empty());
    }

    #[test]
    fn test_top_k_property_over_random_scores() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let len = rng.gen_range(1..64);
            // A small value range forces plenty of ties.
            let scores: Vec<f32> = (0..len).map(|_| rng.gen_range(-4..4) as f32).collect();
            let top_k = rng.gen_range(1..=len);

            let mut sorted = scores.clone();
            sorted.sort_by(|a, b| b.total_cmp(a));
            let threshold = sorted[top_k - 1];

            let filtered = get_top_k(&scores, top_k);
            assert!(retained(&filtered) >= top_k);
            for (&original, &kept) in scores.iter().zip(&filtered) {
                if original >= threshold {
                    assert_eq!(original, kept);
                } else {
                    assert_eq!(kept, f32::NEG_INFINITY);
                }
            }
            if sorted.iter().filter(|&&s| s == threshold).count() == 1 {
                assert_eq!(retained(&filtered), top_k);
            }
        }
    }

    #[test]
    fn test_min_length_suppresses_eos() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let logits: Vec<f32> = (0..16).map(|_| rng.gen_range(-10.0..10.0)).collect();
            let eos = rng.gen_range(0..16);
            let min_length = rng.gen_range(0..10);
            let current_length = rng.gen_range(1..10);

            let filtered = filter_logits(&logits, current_length, min_length, eos, 16);
            if current_length < min_length {
                assert_eq!(filtered[eos as usize], f32::NEG_INFINITY);
            } else {
                assert_eq!(filtered[eos as usize], logits[eos as usize]);
            }
        }
    }

    #[test]
    fn test_suppression_happens_before_truncation() {
        // eos is the best token; once masked, the runner-up should survive top-1.
        let logits = [0.0, 1.0, 3.0];
        let filter = LogitsFilter {
            min_length: 5,
            eos_token_id: 2,
            top_k: 1,
        };
        assert_eq!(
            filter.apply(&logits, 2),
            vec![f32::NEG_INFINITY, 1.0, f32::NEG_INFINITY]
        );
        assert_eq!(
            filter.apply(&logits, 5),
            vec![f32::NEG_INFINITY, f32::NEG_INFINITY, 3.0]
        );
    }

    #[test]
    fn test_filter_does_not_mutate_input() {
        let logits = vec![3.0, 2.0, 1.0];
        let _ = filter_logits(&logits, 0, 1, 0, 1);
        assert_eq!(logits, vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_out_of_range_eos_is_ignored() {
        let mut scores = [1.0, 2.0];
        suppress_eos(&mut scores, 0, 3, 9);
        assert_eq!(scores, [1.0, 2.0]);
    }
}
