//! A [LogitsModel] whose next-token logits depend only on the current token.

use std::{fs::File, io::BufReader, path::Path};

use serde::Deserialize;
use thiserror::Error;

use crate::{LogitsModel, LogitsTensor, ModelInvocationError, TokenMatrix};

#[derive(Error, Debug)]
/// Errors encountered while building a [BigramModel].
pub enum BigramLoadError {
    #[error("non-specific I/O error")]
    /// A non-specific IO error.
    Io(#[from] std::io::Error),
    #[error("the logits table is not valid JSON")]
    /// The file could not be parsed.
    Json(#[from] serde_json::Error),
    #[error("the logits table is empty")]
    /// The table has no rows.
    Empty,
    #[error("row {row} has {len} logits, but the vocabulary has {vocabulary_size} tokens")]
    /// The table is not square.
    NotSquare {
        /// The offending row.
        row: usize,
        /// The number of logits in that row.
        len: usize,
        /// The number of rows in the table.
        vocabulary_size: usize,
    },
}

#[derive(Deserialize)]
struct BigramFile {
    logits: Vec<Vec<f32>>,
}

/// A dense `V x V` table of logits: row `r` holds the scores of the token following `r`.
///
/// Each position of the input is evaluated independently, so padding after the last real
/// token does not change the logits read by the generator.
#[derive(Clone, Debug, PartialEq)]
pub struct BigramModel {
    vocabulary_size: usize,
    table: Vec<f32>,
}
impl BigramModel {
    /// Builds a model from the rows of a square logits table.
    pub fn new(rows: Vec<Vec<f32>>) -> Result<Self, BigramLoadError> {
        let vocabulary_size = rows.len();
        if vocabulary_size == 0 {
            return Err(BigramLoadError::Empty);
        }

        let mut table = Vec::with_capacity(vocabulary_size * vocabulary_size);
        for (row, logits) in rows.into_iter().enumerate() {
            if logits.len() != vocabulary_size {
                return Err(BigramLoadError::NotSquare {
                    row,
                    len: logits.len(),
                    vocabulary_size,
                });
            }
            table.extend(logits);
        }

        Ok(Self {
            vocabulary_size,
            table,
        })
    }

    /// Loads a model from a JSON file of the form `{"logits": [[...], ...]}`.
    pub fn load(path: &Path) -> Result<Self, BigramLoadError> {
        let file: BigramFile = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        tracing::trace!("Read bigram table from {:?}", path);
        Self::new(file.logits)
    }

    fn row(&self, token: usize) -> &[f32] {
        &self.table[token * self.vocabulary_size..(token + 1) * self.vocabulary_size]
    }
}
impl LogitsModel for BigramModel {
    fn vocabulary_size(&self) -> usize {
        self.vocabulary_size
    }

    fn evaluate(&mut self, input: &TokenMatrix) -> Result<LogitsTensor, ModelInvocationError> {
        let mut logits = Vec::with_capacity(input.sequence_length() * self.vocabulary_size);
        for &token in input.tokens() {
            let token = token as usize;
            if token >= self.vocabulary_size {
                return Err(ModelInvocationError::backend(format!(
                    "token {token} is outside of the bigram table"
                )));
            }
            logits.extend_from_slice(self.row(token));
        }
        LogitsTensor::new(input.sequence_length(), self.vocabulary_size, logits)
    }
}
