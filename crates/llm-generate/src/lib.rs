//! `llm-generate` runs autoregressive text generation on top of any language model that can
//! map a fixed-shape, padded matrix of token IDs to a tensor of logits.
//!
//! The crate does not load models or build vocabularies. It owns the generation loop:
//! padding the sequence, asking the model for the next-token logits, filtering them with
//! minimum-length suppression and top-K truncation, sampling a token, and deciding when to stop.
//!
//! ```
//! use llm_generate::{generate, FnModel, GenerationParameters, LogitsTensor};
//! use rand::SeedableRng;
//!
//! let vocabulary_size = 8;
//! let mut model = FnModel::new(vocabulary_size, |input: &llm_generate::TokenMatrix| {
//!     let mut logits = vec![0.0; input.sequence_length() * vocabulary_size];
//!     for row in logits.chunks_mut(vocabulary_size) {
//!         row[3] = 100.0;
//!     }
//!     LogitsTensor::new(input.sequence_length(), vocabulary_size, logits)
//! });
//!
//! let parameters = GenerationParameters {
//!     max_sequence_length: 4,
//!     eos_token_id: 7,
//!     ..Default::default()
//! };
//! let mut rng = rand::rngs::StdRng::seed_from_u64(42);
//! let tokens = generate(&mut model, &[1], &parameters, &mut rng).unwrap();
//! assert_eq!(tokens, vec![1, 3, 3, 3]);
//! ```
#![deny(missing_docs)]

use thiserror::Error;

mod bigram;
mod filter;
mod generator;
mod model;
pub mod samplers;
pub mod tokenizer;

pub use bigram::{BigramLoadError, BigramModel};
pub use filter::{filter_logits, get_top_k, suppress_eos, LogitsFilter};
pub use generator::{
    generate, CancellationToken, GenerationFeedback, GenerationOutput, GenerationResponse,
    GenerationStats, SequenceGenerator, StopReason,
};
pub use model::{FnModel, LogitsModel, LogitsTensor, ModelInvocationError, TokenMatrix};
pub use samplers::{softmax, Categorical, InvalidDistributionError, Sampler};
pub use tokenizer::{TokenId, TokenizationError, Tokenizer, TokenizerLoadError, Vocabulary};

/// The number of highest-scoring tokens kept by default during sampling.
pub const DEFAULT_TOP_K: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
/// The parameters that drive a single generation.
pub struct GenerationParameters {
    /// The upper bound on the length of the generated sequence, prompt included.
    /// This is also the width of the padded matrix handed to the model.
    pub max_sequence_length: usize,
    /// The token that ends a generation. It is also used to pad the model input.
    pub eos_token_id: TokenId,
    /// The top K tokens by score are kept during sampling.
    pub top_k: usize,
    /// While the sequence is shorter than this, the end-of-sequence token cannot be sampled.
    pub min_length: usize,
}
impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            max_sequence_length: 128,
            eos_token_id: 0,
            top_k: DEFAULT_TOP_K,
            min_length: 0,
        }
    }
}
impl GenerationParameters {
    /// Checks these parameters against a model with `vocabulary_size` entries.
    pub fn validate(&self, vocabulary_size: usize) -> Result<(), InvalidConfigError> {
        if vocabulary_size == 0 {
            return Err(InvalidConfigError::EmptyVocabulary);
        }
        if self.max_sequence_length == 0 {
            return Err(InvalidConfigError::ZeroMaxSequenceLength);
        }
        if self.eos_token_id as usize >= vocabulary_size {
            return Err(InvalidConfigError::EosOutOfRange {
                eos_token_id: self.eos_token_id,
                vocabulary_size,
            });
        }
        if self.top_k == 0 {
            return Err(InvalidConfigError::ZeroTopK);
        }
        Ok(())
    }

    pub(crate) fn logits_filter(&self) -> LogitsFilter {
        LogitsFilter {
            min_length: self.min_length,
            eos_token_id: self.eos_token_id,
            top_k: self.top_k,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// The [GenerationParameters] cannot be used with the model.
pub enum InvalidConfigError {
    #[error("the model reports an empty vocabulary")]
    /// The model has no vocabulary entries to sample from.
    EmptyVocabulary,
    #[error("the maximum sequence length must be positive")]
    /// `max_sequence_length` was zero.
    ZeroMaxSequenceLength,
    #[error("the end-of-sequence token {eos_token_id} is outside of the vocabulary (size {vocabulary_size})")]
    /// `eos_token_id` does not index into the vocabulary.
    EosOutOfRange {
        /// The configured end-of-sequence token.
        eos_token_id: TokenId,
        /// The size of the model's vocabulary.
        vocabulary_size: usize,
    },
    #[error("top-k must keep at least one token")]
    /// `top_k` was zero.
    ZeroTopK,
}

#[derive(Error, Debug)]
/// Errors encountered during generation.
pub enum GenerationError {
    #[error("invalid generation parameters: {0}")]
    /// The parameters were rejected before the model was invoked.
    InvalidConfig(#[from] InvalidConfigError),
    #[error("the prompt is empty")]
    /// Generation needs at least one prompt token to condition on.
    EmptyPrompt,
    #[error("the prompt has {prompt_length} tokens, but the maximum sequence length is {max_sequence_length}")]
    /// The prompt does not fit in the padded model input.
    PromptTooLong {
        /// The number of tokens in the prompt.
        prompt_length: usize,
        /// The configured maximum sequence length.
        max_sequence_length: usize,
    },
    #[error("the prompt token {token} is outside of the vocabulary (size {vocabulary_size})")]
    /// One of the prompt tokens does not belong to the model's vocabulary.
    InvalidPromptToken {
        /// The offending token.
        token: TokenId,
        /// The size of the model's vocabulary.
        vocabulary_size: usize,
    },
    #[error("the model call failed: {0}")]
    /// The model returned an error, or a tensor of the wrong shape.
    ModelInvocation(#[from] ModelInvocationError),
    #[error("{0}")]
    /// The filtered logits could not be turned into a probability distribution.
    InvalidDistribution(#[from] InvalidDistributionError),
    #[error("generation was cancelled")]
    /// The [CancellationToken] was cancelled before the generation finished.
    Cancelled,
    #[error("the user-specified callback returned an error")]
    /// The user-specified callback returned an error.
    UserCallback(Box<dyn std::error::Error + Send + Sync>),
}
