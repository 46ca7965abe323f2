use std::{
    convert::Infallible,
    error::Error,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use serde::Serialize;

use crate::{
    samplers::{Categorical, Sampler},
    GenerationError, GenerationParameters, LogitsModel, ModelInvocationError, TokenId, TokenMatrix,
};

/// Why a generation stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The sequence reached the maximum sequence length.
    MaxLength,
    /// The end-of-sequence token was sampled.
    EndOfSequence,
    /// The callback asked for the generation to stop.
    Halted,
}

/// Statistics about a finished generation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationStats {
    /// How many times the model was evaluated.
    pub model_calls: usize,
    /// How many tokens were appended to the prompt.
    pub generated_tokens: usize,
    /// How long the generation took.
    pub duration: Duration,
    /// Why the generation stopped.
    pub stop_reason: StopReason,
}

/// The result of [SequenceGenerator::generate].
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationOutput {
    /// The prompt followed by the generated tokens.
    pub tokens: Vec<TokenId>,
    /// Statistics about the generation.
    pub stats: GenerationStats,
}

/// Reported to the callback of [SequenceGenerator::generate_with_callback].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationResponse {
    /// A token was sampled and appended to the sequence.
    InferredToken(TokenId),
    /// The end-of-sequence token was sampled. It is not part of the output.
    EndOfText,
}

/// Returned by the callback of [SequenceGenerator::generate_with_callback].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationFeedback {
    /// Continue generating.
    Continue,
    /// Stop generating and return what has been generated so far.
    Halt,
}

/// Cancels a running generation from another thread.
///
/// The token is checked once per iteration, before the model is evaluated.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);
impl CancellationToken {
    /// Creates a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every generation holding a clone of this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether [Self::cancel] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Drives a [LogitsModel] token by token until the sequence is full or the
/// end-of-sequence token is sampled.
///
/// The generator holds no state between calls: every call owns its own token sequence.
#[derive(Clone, Debug)]
pub struct SequenceGenerator {
    parameters: GenerationParameters,
    sampler: Arc<dyn Sampler>,
    cancellation: Option<CancellationToken>,
}
impl SequenceGenerator {
    /// Creates a generator that samples with [Categorical].
    pub fn new(parameters: GenerationParameters) -> Self {
        Self {
            parameters,
            sampler: Arc::new(Categorical),
            cancellation: None,
        }
    }

    /// Replaces the sampler.
    pub fn with_sampler(mut self, sampler: impl Sampler + 'static) -> Self {
        self.sampler = Arc::new(sampler);
        self
    }

    /// Makes the generation abort with [GenerationError::Cancelled] once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// The parameters this generator was created with.
    pub fn parameters(&self) -> &GenerationParameters {
        &self.parameters
    }

    /// Continues `prompt` until a stop condition is met. See [Self::generate_with_callback].
    pub fn generate(
        &self,
        model: &mut impl LogitsModel,
        prompt: &[TokenId],
        rng: &mut impl rand::Rng,
    ) -> Result<GenerationOutput, GenerationError> {
        self.generate_with_callback::<Infallible>(model, prompt, rng, |_| {
            Ok(GenerationFeedback::Continue)
        })
    }

    /// Continues `prompt` until a stop condition is met, reporting every appended token to
    /// `callback`.
    ///
    /// Each iteration pads the sequence with the end-of-sequence token up to
    /// `max_sequence_length`, evaluates the model once, filters the logits of the last real
    /// token and samples the next token. Once the sequence is `max_sequence_length` tokens
    /// long, the generation stops without evaluating the model again.
    ///
    /// A sampled end-of-sequence token stops the generation and is **not** appended to
    /// the output. The returned tokens are therefore never terminated by the end-of-sequence
    /// token, which can be surprising, but matches the established behaviour of this loop.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn generate_with_callback<E: Error + Send + Sync + 'static>(
        &self,
        model: &mut impl LogitsModel,
        prompt: &[TokenId],
        rng: &mut impl rand::Rng,
        mut callback: impl FnMut(GenerationResponse) -> Result<GenerationFeedback, E>,
    ) -> Result<GenerationOutput, GenerationError> {
        let start = Instant::now();
        let vocabulary_size = model.vocabulary_size();
        self.check_inputs(vocabulary_size, prompt)?;

        let GenerationParameters {
            max_sequence_length,
            eos_token_id,
            ..
        } = self.parameters;
        let filter = self.parameters.logits_filter();
        let expected_shape = [1, max_sequence_length, vocabulary_size];

        let mut tokens = prompt.to_vec();
        let mut model_calls = 0;

        let stop_reason = loop {
            if self
                .cancellation
                .as_ref()
                .map_or(false, CancellationToken::is_cancelled)
            {
                return Err(GenerationError::Cancelled);
            }

            let cur_len = tokens.len();
            if cur_len == max_sequence_length {
                break StopReason::MaxLength;
            }

            let input = TokenMatrix::padded(&tokens, max_sequence_length, eos_token_id);
            let logits = model.evaluate(&input)?;
            model_calls += 1;

            let shape_mismatch = || ModelInvocationError::ShapeMismatch {
                expected: expected_shape,
                actual: logits.shape(),
            };
            if logits.shape() != expected_shape {
                return Err(shape_mismatch().into());
            }
            let last_logits = logits.logits_at(cur_len - 1).ok_or_else(shape_mismatch)?;

            let filtered = filter.apply(last_logits, cur_len);
            let next_token = self.sampler.sample(&tokens, &filtered, rng)?;
            tracing::trace!(cur_len, next_token, "sampled token");

            // cur_len < max_sequence_length
            if next_token == eos_token_id {
                callback(GenerationResponse::EndOfText)
                    .map_err(|e| GenerationError::UserCallback(Box::new(e)))?;
                break StopReason::EndOfSequence;
            }

            tokens.push(next_token);
            match callback(GenerationResponse::InferredToken(next_token))
                .map_err(|e| GenerationError::UserCallback(Box::new(e)))?
            {
                GenerationFeedback::Continue => {}
                GenerationFeedback::Halt => break StopReason::Halted,
            }
        };

        let stats = GenerationStats {
            model_calls,
            generated_tokens: tokens.len() - prompt.len(),
            duration: start.elapsed(),
            stop_reason,
        };
        tracing::debug!(
            ?stop_reason,
            model_calls,
            generated_tokens = stats.generated_tokens,
            "generation finished"
        );

        Ok(GenerationOutput { tokens, stats })
    }

    fn check_inputs(
        &self,
        vocabulary_size: usize,
        prompt: &[TokenId],
    ) -> Result<(), GenerationError> {
        self.parameters.validate(vocabulary_size)?;

        let max_sequence_length = self.parameters.max_sequence_length;
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }
        if prompt.len() > max_sequence_length {
            return Err(GenerationError::PromptTooLong {
                prompt_length: prompt.len(),
                max_sequence_length,
            });
        }
        if let Some(&token) = prompt.iter().find(|&&t| t as usize >= vocabulary_size) {
            return Err(GenerationError::InvalidPromptToken {
                token,
                vocabulary_size,
            });
        }
        Ok(())
    }
}

/// Continues `prompt` with `model` and returns the prompt followed by the generated tokens.
///
/// This is [SequenceGenerator::generate] with the default [Categorical] sampler. The output
/// holds between `prompt.len()` and `parameters.max_sequence_length` tokens. A sampled
/// end-of-sequence token ends the generation without being included.
pub fn generate(
    model: &mut impl LogitsModel,
    prompt: &[TokenId],
    parameters: &GenerationParameters,
    rng: &mut impl rand::Rng,
) -> Result<Vec<TokenId>, GenerationError> {
    SequenceGenerator::new(parameters.clone())
        .generate(model, prompt, rng)
        .map(|output| output.tokens)
}
