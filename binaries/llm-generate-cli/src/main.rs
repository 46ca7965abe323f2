use clap::Parser;
use cli_args::Args;
use color_eyre::eyre;
use is_terminal::IsTerminal;
use llm_generate::{
    GenerationError, GenerationFeedback, GenerationResponse, SequenceGenerator, Tokenizer,
};

mod cli_args;
mod util;

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    color_eyre::install()?;

    let args = Args::parse();
    match args {
        Args::Infer(args) => infer(&args),
        Args::PromptTokens(args) => prompt_tokens(&args),
    }
}

#[tracing::instrument(skip_all)]
fn infer(args: &cli_args::Infer) -> eyre::Result<()> {
    let prompt = load_prompt_file_with_prompt(&args.prompt_file, args.prompt.as_deref())?;
    let (mut model, vocabulary) = args.model_load.load()?;
    let parameters = args.generate.generation_parameters(&vocabulary)?;
    let prompt_tokens = vocabulary.encode(&prompt)?;
    let mut rng = args.generate.rng();

    if !args.hide_prompt {
        util::print_words(&vocabulary.decode(&prompt_tokens)?)?;
    }

    let generator = SequenceGenerator::new(parameters);
    let res = generator.generate_with_callback::<std::io::Error>(
        &mut model,
        &prompt_tokens,
        &mut rng,
        |r| {
            if let GenerationResponse::InferredToken(t) = r {
                match vocabulary.token(t) {
                    Some(word) => util::print_words(word)?,
                    None => tracing::warn!("Sampled token {t} has no word in the vocabulary"),
                }
            }
            Ok(GenerationFeedback::Continue)
        },
    );

    println!();

    match res {
        Ok(output) => {
            if args.stats {
                eprintln!("{}", serde_json::to_string_pretty(&output.stats)?);
            }
            Ok(())
        }
        Err(GenerationError::InvalidDistribution(err)) => {
            tracing::error!("A sampling-related failure occurred: {}", err);
            Err(err.into())
        }
        Err(GenerationError::UserCallback(err)) => {
            Err(eyre::eyre!(err).wrap_err("could not write the generated words"))
        }
        Err(err) => Err(err.into()),
    }
}

fn prompt_tokens(args: &cli_args::PromptTokens) -> eyre::Result<()> {
    let prompt = load_prompt_file_with_prompt(&args.prompt_file, args.prompt.as_deref())?;
    let vocabulary = args.vocabulary.load()?;
    let toks = match vocabulary.encode(&prompt) {
        Ok(toks) => toks,
        Err(e) => {
            tracing::error!("Could not tokenize prompt: {e}");
            std::process::exit(1);
        }
    };
    println!(
        "{}",
        toks.iter()
            .map(|tid| tid.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "{}",
        toks.iter()
            .map(|&tid| format!("{:?}:{tid}", vocabulary.token(tid).unwrap_or_default()))
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(())
}

fn load_prompt_file_with_prompt(
    prompt_file: &cli_args::PromptFile,
    prompt: Option<&str>,
) -> eyre::Result<String> {
    Ok(match (prompt_file.contents()?, prompt) {
        (Some(prompt_file), None) => prompt_file,
        (None, Some(prompt)) => prompt.to_owned(),
        (Some(prompt_file), Some(prompt)) => util::process_prompt(&prompt_file, prompt),
        (None, None) => eyre::bail!("No prompt or prompt file was provided. See --help"),
    })
}
