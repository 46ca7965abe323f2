//! The interface between the generator and the model that produces logits.

use std::{error::Error, fmt::Debug};

use thiserror::Error;

use crate::TokenId;

#[derive(Error, Debug)]
/// Errors reported by, or about, a call to [LogitsModel::evaluate].
pub enum ModelInvocationError {
    #[error("expected logits of shape {expected:?}, but the model produced {actual:?}")]
    /// The logits tensor did not have the shape `[1, sequence_length, vocabulary_size]`.
    ShapeMismatch {
        /// The expected `[batch, sequence_length, vocabulary_size]`.
        expected: [usize; 3],
        /// The shape that was produced.
        actual: [usize; 3],
    },
    #[error("logits buffer holds {actual} values, but shape {shape:?} needs {expected}")]
    /// A [LogitsTensor] was built from a buffer of the wrong length.
    BufferLength {
        /// The requested `[batch, sequence_length, vocabulary_size]`.
        shape: [usize; 3],
        /// The number of values the shape needs.
        expected: usize,
        /// The number of values that were supplied.
        actual: usize,
    },
    #[error("the model backend failed: {0}")]
    /// The model itself failed (device error, runtime error, ...).
    Backend(#[source] Box<dyn Error + Send + Sync>),
}
impl ModelInvocationError {
    /// Wraps an arbitrary backend error.
    pub fn backend(error: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Backend(error.into())
    }
}

/// A row-major `[1, sequence_length]` matrix of token IDs, as fed to the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenMatrix {
    tokens: Vec<TokenId>,
}
impl TokenMatrix {
    /// Builds the model input for `tokens`, padded with `pad_token` up to `sequence_length`.
    ///
    /// `tokens` must not be longer than `sequence_length`.
    pub fn padded(tokens: &[TokenId], sequence_length: usize, pad_token: TokenId) -> Self {
        debug_assert!(tokens.len() <= sequence_length);
        let mut padded = Vec::with_capacity(sequence_length);
        padded.extend_from_slice(tokens);
        padded.resize(sequence_length, pad_token);
        Self { tokens: padded }
    }

    /// The shape of the matrix, `[batch, sequence_length]`. The batch is always 1.
    pub fn shape(&self) -> [usize; 2] {
        [1, self.tokens.len()]
    }

    /// The number of positions in the (only) row.
    pub fn sequence_length(&self) -> usize {
        self.tokens.len()
    }

    /// The token IDs of the only row.
    pub fn tokens(&self) -> &[TokenId] {
        &self.tokens
    }
}

/// A row-major `[1, sequence_length, vocabulary_size]` tensor of logits.
#[derive(Clone, Debug, PartialEq)]
pub struct LogitsTensor {
    sequence_length: usize,
    vocabulary_size: usize,
    data: Vec<f32>,
}
impl LogitsTensor {
    /// Wraps a flat buffer of `sequence_length * vocabulary_size` logits.
    pub fn new(
        sequence_length: usize,
        vocabulary_size: usize,
        data: Vec<f32>,
    ) -> Result<Self, ModelInvocationError> {
        let expected = sequence_length * vocabulary_size;
        if data.len() != expected {
            return Err(ModelInvocationError::BufferLength {
                shape: [1, sequence_length, vocabulary_size],
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            sequence_length,
            vocabulary_size,
            data,
        })
    }

    /// The shape of the tensor, `[batch, sequence_length, vocabulary_size]`.
    pub fn shape(&self) -> [usize; 3] {
        [1, self.sequence_length, self.vocabulary_size]
    }

    /// The logits for the token following `position`, or `None` if out of bounds.
    pub fn logits_at(&self, position: usize) -> Option<&[f32]> {
        if position >= self.sequence_length {
            return None;
        }
        let start = position * self.vocabulary_size;
        Some(&self.data[start..start + self.vocabulary_size])
    }
}

/// A language model that can be driven by the generator.
///
/// Implementations receive the padded `[1, max_sequence_length]` matrix and must return logits
/// of shape `[1, max_sequence_length, vocabulary_size]`. Only the row for the last real token
/// is read; how the padding is handled internally is up to the implementation.
pub trait LogitsModel {
    /// The number of entries in the model's vocabulary.
    fn vocabulary_size(&self) -> usize;

    /// Evaluates the model over `input`.
    fn evaluate(&mut self, input: &TokenMatrix) -> Result<LogitsTensor, ModelInvocationError>;
}

impl<M: LogitsModel + ?Sized> LogitsModel for &mut M {
    fn vocabulary_size(&self) -> usize {
        (**self).vocabulary_size()
    }

    fn evaluate(&mut self, input: &TokenMatrix) -> Result<LogitsTensor, ModelInvocationError> {
        (**self).evaluate(input)
    }
}

impl<M: LogitsModel + ?Sized> LogitsModel for Box<M> {
    fn vocabulary_size(&self) -> usize {
        (**self).vocabulary_size()
    }

    fn evaluate(&mut self, input: &TokenMatrix) -> Result<LogitsTensor, ModelInvocationError> {
        (**self).evaluate(input)
    }
}

/// Adapts a closure into a [LogitsModel].
pub struct FnModel<F> {
    vocabulary_size: usize,
    call: F,
}
impl<F> FnModel<F>
where
    F: FnMut(&TokenMatrix) -> Result<LogitsTensor, ModelInvocationError>,
{
    /// Creates a model over a vocabulary of `vocabulary_size` entries.
    pub fn new(vocabulary_size: usize, call: F) -> Self {
        Self {
            vocabulary_size,
            call,
        }
    }
}
impl<F> LogitsModel for FnModel<F>
where
    F: FnMut(&TokenMatrix) -> Result<LogitsTensor, ModelInvocationError>,
{
    fn vocabulary_size(&self) -> usize {
        self.vocabulary_size
    }

    fn evaluate(&mut self, input: &TokenMatrix) -> Result<LogitsTensor, ModelInvocationError> {
        (self.call)(input)
    }
}
impl<F> Debug for FnModel<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnModel")
            .field("vocabulary_size", &self.vocabulary_size)
            .finish_non_exhaustive()
    }
}
