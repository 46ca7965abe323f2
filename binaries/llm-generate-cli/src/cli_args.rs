use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{self, WrapErr};
use llm_generate::{
    BigramModel, GenerationParameters, LogitsModel, TokenId, Tokenizer, Vocabulary, DEFAULT_TOP_K,
};
use rand::SeedableRng;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub enum Args {
    #[command()]
    /// Continue a prompt with a model, print the result, and exit.
    Infer(Box<Infer>),

    #[command()]
    /// Dumps the prompt to console and exits, first as a comma-separated list of token IDs
    /// and then as a list of comma-separated string keys and token ID values.
    PromptTokens(Box<PromptTokens>),
}

#[derive(Parser, Debug)]
pub struct Infer {
    #[command(flatten)]
    pub model_load: ModelLoad,

    #[command(flatten)]
    pub prompt_file: PromptFile,

    #[command(flatten)]
    pub generate: Generate,

    /// The prompt to feed the generator.
    ///
    /// If used with `--prompt-file`/`-f`, the prompt from the file will be used
    /// and `{{PROMPT}}` will be replaced with the value of `--prompt`/`-p`.
    #[arg(long, short = 'p', default_value = None)]
    pub prompt: Option<String>,

    /// Hide the prompt in the generation.
    ///
    /// By default, the prompt is printed before the generated words.
    #[arg(long, default_value_t = false)]
    pub hide_prompt: bool,

    /// Output statistics about the generation as JSON on stderr.
    #[arg(long, default_value_t = false)]
    pub stats: bool,
}

#[derive(Parser, Debug)]
pub struct PromptTokens {
    #[command(flatten)]
    pub vocabulary: VocabularyLoad,

    #[command(flatten)]
    pub prompt_file: PromptFile,

    /// The prompt to feed the generator.
    ///
    /// If used with `--prompt-file`/`-f`, the prompt from the file will be used
    /// and `{{PROMPT}}` will be replaced with the value of `--prompt`/`-p`.
    #[arg(long, short = 'p', default_value = None)]
    pub prompt: Option<String>,
}

#[derive(Parser, Debug)]
pub struct Generate {
    /// The maximum length of the sequence, prompt included.
    #[arg(long, short = 'n', default_value_t = 32)]
    pub max_length: usize,

    /// Top-K: The top K words by score are kept during sampling.
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// The end-of-sequence token cannot be sampled while the sequence is shorter than this.
    #[arg(long, default_value_t = 0)]
    pub min_length: usize,

    /// The end-of-sequence token. Defaults to the last entry of the vocabulary.
    #[arg(long, default_value = None)]
    pub eos_token_id: Option<TokenId>,

    /// Specifies the seed to use during sampling. Without a seed, every run samples
    /// differently.
    #[arg(long, default_value = None)]
    pub seed: Option<u64>,
}
impl Generate {
    pub fn rng(&self) -> rand::rngs::StdRng {
        if let Some(seed) = self.seed {
            rand::rngs::StdRng::seed_from_u64(seed)
        } else {
            rand::rngs::StdRng::from_entropy()
        }
    }

    pub fn generation_parameters(
        &self,
        vocabulary: &Vocabulary,
    ) -> eyre::Result<GenerationParameters> {
        let eos_token_id = match self.eos_token_id {
            Some(eos_token_id) => eos_token_id,
            None => vocabulary
                .default_eos_token_id()
                .ok_or_else(|| eyre::eyre!("the vocabulary is empty"))?,
        };
        Ok(GenerationParameters {
            max_sequence_length: self.max_length,
            eos_token_id,
            top_k: self.top_k,
            min_length: self.min_length,
        })
    }
}

#[derive(Parser, Debug)]
pub struct VocabularyLoad {
    /// A JSON file mapping every word of the vocabulary to its token ID.
    #[arg(long = "vocabulary", short = 'v')]
    pub vocabulary_path: PathBuf,

    /// A word of the vocabulary to substitute for unknown words in the prompt.
    #[arg(long, default_value = None)]
    pub unknown_token: Option<String>,
}
impl VocabularyLoad {
    pub fn load(&self) -> eyre::Result<Vocabulary> {
        let vocabulary = Vocabulary::load(&self.vocabulary_path)?;
        tracing::info!(
            "Loaded vocabulary of {} tokens from {:?}",
            vocabulary.len(),
            self.vocabulary_path
        );
        match &self.unknown_token {
            Some(word) => Ok(vocabulary
                .with_unknown_token(word)
                .wrap_err("the unknown token must be part of the vocabulary")?),
            None => Ok(vocabulary),
        }
    }
}

#[derive(Parser, Debug)]
pub struct ModelLoad {
    #[command(flatten)]
    pub vocabulary: VocabularyLoad,

    /// Where to load the bigram logits table from.
    #[arg(long = "model", short = 'm')]
    pub model_path: PathBuf,
}
impl ModelLoad {
    pub fn load(&self) -> eyre::Result<(BigramModel, Vocabulary)> {
        let vocabulary = self.vocabulary.load()?;
        let model = BigramModel::load(&self.model_path)
            .wrap_err_with(|| format!("failed to load model from {:?}", self.model_path))?;

        if model.vocabulary_size() != vocabulary.len() {
            eyre::bail!(
                "the model has {} tokens, but the vocabulary has {}",
                model.vocabulary_size(),
                vocabulary.len()
            );
        }
        Ok((model, vocabulary))
    }
}

#[derive(Parser, Debug)]
pub struct PromptFile {
    /// A file to read the prompt from.
    #[arg(long, short = 'f', default_value = None)]
    pub prompt_file: Option<PathBuf>,
}
impl PromptFile {
    pub fn contents(&self) -> eyre::Result<Option<String>> {
        let Some(path) = &self.prompt_file else {
            return Ok(None);
        };
        let mut prompt = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("could not read prompt file at {path:?}"))?;
        // Strip off a single trailing newline, and a carriage return before it.
        if prompt.ends_with('\n') {
            prompt.pop();
        }
        if prompt.ends_with('\r') {
            prompt.pop();
        }
        Ok(Some(prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOCABULARY: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demo/vocabulary.json");
    const MODEL: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demo/bigram.json");

    fn parse_infer(extra: &[&str]) -> eyre::Result<Box<Infer>> {
        let args = ["llm-generate", "infer", "--vocabulary", VOCABULARY, "--model", MODEL]
            .into_iter()
            .chain(extra.iter().copied());
        match Args::try_parse_from(args)? {
            Args::Infer(infer) => Ok(infer),
            other => eyre::bail!("expected infer, got {other:?}"),
        }
    }

    #[test]
    fn test_infer_defaults() -> eyre::Result<()> {
        let infer = parse_infer(&["-p", "the cat"])?;
        assert_eq!(infer.prompt.as_deref(), Some("the cat"));

        let (_model, vocabulary) = infer.model_load.load()?;
        let parameters = infer.generate.generation_parameters(&vocabulary)?;
        assert_eq!(parameters.eos_token_id, 8);
        assert_eq!(parameters.max_sequence_length, 32);
        assert_eq!(parameters.top_k, DEFAULT_TOP_K);
        assert_eq!(parameters.min_length, 0);
        Ok(())
    }

    #[test]
    fn test_infer_overrides() -> eyre::Result<()> {
        let infer = parse_infer(&[
            "-p",
            "the",
            "-n",
            "6",
            "--top-k",
            "2",
            "--min-length",
            "3",
            "--eos-token-id",
            "7",
            "--seed",
            "11",
        ])?;
        let (_model, vocabulary) = infer.model_load.load()?;
        let parameters = infer.generate.generation_parameters(&vocabulary)?;
        assert_eq!(parameters.eos_token_id, 7);
        assert_eq!(parameters.max_sequence_length, 6);
        assert_eq!(parameters.top_k, 2);
        assert_eq!(parameters.min_length, 3);
        assert_eq!(infer.generate.seed, Some(11));
        Ok(())
    }

    #[test]
    fn test_short_flags() -> eyre::Result<()> {
        let args = ["llm-generate", "infer", "-v", VOCABULARY, "-m", MODEL, "-p", "dog"];
        let Args::Infer(infer) = Args::try_parse_from(args)? else {
            eyre::bail!("expected infer");
        };
        assert_eq!(infer.model_load.vocabulary.vocabulary_path, PathBuf::from(VOCABULARY));
        assert_eq!(infer.model_load.model_path, PathBuf::from(MODEL));

        let args = ["llm-generate", "prompt-tokens", "--vocabulary", VOCABULARY, "-p", "x"];
        assert!(matches!(Args::try_parse_from(args)?, Args::PromptTokens(_)));
        Ok(())
    }

    #[test]
    fn test_path_suffixed_flags_are_rejected() {
        let args = [
            "llm-generate",
            "infer",
            "--vocabulary-path",
            VOCABULARY,
            "--model-path",
            MODEL,
        ];
        assert!(Args::try_parse_from(args).is_err());
    }
}
