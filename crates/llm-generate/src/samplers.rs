//! Defines the samplers used for generation.
//!
//! You can define your own [Sampler] by implementing the trait.

use std::fmt::Debug;

use rand::{
    distributions::{WeightedError, WeightedIndex},
    prelude::Distribution,
};
use thiserror::Error;

use crate::TokenId;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// The logits could not be turned into a probability distribution to sample from.
pub enum InvalidDistributionError {
    #[error("cannot sample from an empty distribution")]
    /// There were no logits at all.
    Empty,
    #[error("every token has zero probability")]
    /// Every logit was negative infinity, so nothing can be sampled.
    AllZero,
    #[error("the distribution contains NaN probabilities")]
    /// At least one probability was NaN.
    NotANumber,
}

/// A sampler for generation.
pub trait Sampler: Debug + Send + Sync {
    /// Given the previous tokens, the filtered logits for the next position, and a source of
    /// randomness, sample from the logits and return the token ID.
    fn sample(
        &self,
        previous_tokens: &[TokenId],
        logits: &[f32],
        rng: &mut dyn rand::RngCore,
    ) -> Result<TokenId, InvalidDistributionError>;
}

/// Draws a token with probability equal to its softmax weight.
///
/// Tokens whose logit is negative infinity (for example, the ones removed by
/// [get_top_k](crate::get_top_k)) can never be drawn.
#[derive(Clone, Copy, Debug, Default)]
pub struct Categorical;
impl Sampler for Categorical {
    fn sample(
        &self,
        _previous_tokens: &[TokenId],
        logits: &[f32],
        rng: &mut dyn rand::RngCore,
    ) -> Result<TokenId, InvalidDistributionError> {
        if logits.iter().any(|l| l.is_nan()) {
            return Err(InvalidDistributionError::NotANumber);
        }
        let probs = softmax(logits);
        check_distribution(&probs)?;

        let dist = WeightedIndex::new(&probs).map_err(|e| match e {
            WeightedError::NoItem => InvalidDistributionError::Empty,
            WeightedError::AllWeightsZero => InvalidDistributionError::AllZero,
            _ => InvalidDistributionError::NotANumber,
        })?;
        Ok(dist.sample(rng) as TokenId)
    }
}

fn check_distribution(probs: &[f32]) -> Result<(), InvalidDistributionError> {
    if probs.is_empty() {
        return Err(InvalidDistributionError::Empty);
    }
    if probs.iter().any(|p| p.is_nan()) {
        return Err(InvalidDistributionError::NotANumber);
    }
    if probs.iter().all(|&p| p == 0.0) {
        return Err(InvalidDistributionError::AllZero);
    }
    Ok(())
}

/// Calculate a numerically stable softmax for a slice.
///
/// The maximum is subtracted before exponentiating, and negative infinity maps to zero.
/// If every logit is negative infinity, the result is all zeros.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    if max_logit == f32::NEG_INFINITY {
        return vec![0.0; logits.len()];
    }

    let max_logit = f64::from(max_logit);
    let exps: Vec<f64> = logits
        .iter()
        .map(|&v| (f64::from(v) - max_logit).exp())
        .collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|v| (v / sum) as f32).collect()
}
