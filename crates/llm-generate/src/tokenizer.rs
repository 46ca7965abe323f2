//! Turning text into token IDs and back.
//!
//! The generator itself only ever sees token IDs. The [Tokenizer] trait is the seam used by
//! callers to encode prompts and decode generations; [Vocabulary] is a simple word-level
//! implementation backed by a JSON vocabulary file.

use std::{
    collections::HashMap,
    error::Error,
    path::{Path, PathBuf},
};

use thiserror::Error;

/// The identifier of a token in a tokenizer.
pub type TokenId = u32;

#[derive(Error, Debug)]
/// Errors related to tokenization.
pub enum TokenizationError {
    #[error("the word {0:?} is not part of the vocabulary")]
    /// During encoding, a word was found that has no token, and no unknown token was configured.
    UnknownWord(String),
    #[error("the token ID {0} was invalid for this tokenizer")]
    /// One of the tokens provided by the user was invalid, and did not belong to this tokenizer.
    InvalidTokenId(TokenId),
}

#[derive(Error, Debug)]
/// Errors related to loading the tokenizer.
#[error("error loading tokenizer from {path}: {error}")]
pub struct TokenizerLoadError {
    /// The path to the tokenizer.
    pub path: PathBuf,
    /// The error that occurred during loading.
    pub error: Box<dyn Error + Send + Sync>,
}

impl TokenizerLoadError {
    fn new(path: impl Into<PathBuf>, error: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self {
            path: path.into(),
            error: error.into(),
        }
    }
}

/// Converts between text and token IDs.
pub trait Tokenizer {
    /// The number of tokens in the vocabulary.
    fn len(&self) -> usize;

    /// Whether the vocabulary is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts `text` into token IDs.
    fn encode(&self, text: &str) -> Result<Vec<TokenId>, TokenizationError>;

    /// Converts token IDs back into text.
    fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizationError>;
}

/// A word-level vocabulary: every whitespace-separated word is one token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Vocabulary {
    id_to_token: Vec<String>,
    token_to_id: HashMap<String, TokenId>,
    unknown_token_id: Option<TokenId>,
}
impl Vocabulary {
    /// Builds a vocabulary from `(word, id)` pairs.
    ///
    /// The IDs must cover `0..n` exactly once.
    pub fn new(
        entries: impl IntoIterator<Item = (String, TokenId)>,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let token_to_id: HashMap<String, TokenId> = entries.into_iter().collect();

        let mut id_to_token = vec![None; token_to_id.len()];
        for (word, &id) in &token_to_id {
            let slot = id_to_token
                .get_mut(id as usize)
                .ok_or_else(|| {
                    format!("token ID {id} for {word:?} leaves a gap in the vocabulary")
                })?;
            if let Some(existing) = slot.replace(word.clone()) {
                return Err(
                    format!("token ID {id} is used by both {existing:?} and {word:?}").into(),
                );
            }
        }

        Ok(Self {
            // Every slot is filled: there are as many distinct IDs as slots, all in range.
            id_to_token: id_to_token.into_iter().flatten().collect(),
            token_to_id,
            unknown_token_id: None,
        })
    }

    /// Loads a vocabulary from a JSON object mapping words to token IDs, such as
    /// `{"hello": 0, "world": 1}`.
    pub fn load(path: &Path) -> Result<Self, TokenizerLoadError> {
        let file = std::fs::File::open(path).map_err(|e| TokenizerLoadError::new(path, e))?;
        let entries: HashMap<String, TokenId> =
            serde_json::from_reader(std::io::BufReader::new(file))
                .map_err(|e| TokenizerLoadError::new(path, e))?;
        Self::new(entries).map_err(|e| TokenizerLoadError::new(path, e))
    }

    /// Maps words that are not in the vocabulary to `word` instead of failing.
    pub fn with_unknown_token(mut self, word: &str) -> Result<Self, TokenizationError> {
        let id = self
            .id(word)
            .ok_or_else(|| TokenizationError::UnknownWord(word.to_owned()))?;
        self.unknown_token_id = Some(id);
        Ok(self)
    }

    /// The ID of `word`, if it is in the vocabulary.
    pub fn id(&self, word: &str) -> Option<TokenId> {
        self.token_to_id.get(word).copied()
    }

    /// The word for `id`, if it is in the vocabulary.
    pub fn token(&self, id: TokenId) -> Option<&str> {
        self.id_to_token.get(id as usize).map(String::as_str)
    }

    /// The conventional end-of-sequence token: the last entry of the vocabulary.
    ///
    /// Nothing guarantees that a given vocabulary follows this convention, so it is only
    /// a default for callers that have no better source.
    pub fn default_eos_token_id(&self) -> Option<TokenId> {
        self.id_to_token.len().checked_sub(1).map(|id| id as TokenId)
    }
}
impl Tokenizer for Vocabulary {
    fn len(&self) -> usize {
        self.id_to_token.len()
    }

    fn encode(&self, text: &str) -> Result<Vec<TokenId>, TokenizationError> {
        text.split_whitespace()
            .map(|word| {
                self.id(word)
                    .or(self.unknown_token_id)
                    .ok_or_else(|| TokenizationError::UnknownWord(word.to_owned()))
            })
            .collect()
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizationError> {
        let words = tokens
            .iter()
            .map(|&id| self.token(id).ok_or(TokenizationError::InvalidTokenId(id)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(words.join(" "))
    }
}
