//! Generates Elasticsearch mapping files for every supported language.
//!
//! Usage:
//!   cargo run --bin make-mappings                         # all languages
//!   cargo run --bin make-mappings -- --lang en --lang he  # subset
//!   cargo run --bin make-mappings -- --phonetic           # with phonetic analysis

use anyhow::Result;
use clap::Parser;
use search_devtools::i18n::Language;
use search_devtools::mappings::{MappingGenerator, ResultsOptions, DEFAULT_OUTPUT_DIR};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "make-mappings",
    about = "Generate per-language Elasticsearch mappings",
    version
)]
struct Cli {
    /// Root directory for the generated files
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Language code to generate (can be repeated; default: all)
    #[arg(short, long = "lang", value_name = "CODE")]
    languages: Vec<String>,

    /// Add Beider-Morse phonetic analysis to the results mappings
    #[arg(long)]
    phonetic: bool,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("search_devtools=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let languages = if cli.languages.is_empty() {
        Language::all()
    } else {
        cli.languages
            .iter()
            .map(|code| Language::from_code(code))
            .collect::<Result<Vec<_>>>()?
    };

    info!(
        "Generating mappings for {} languages into {}",
        languages.len(),
        cli.output_dir.display()
    );

    let generator = MappingGenerator::new(cli.output_dir).with_options(ResultsOptions {
        phonetic: cli.phonetic,
    });
    for path in generator.generate(&languages)? {
        println!("{}", path.display());
    }

    Ok(())
}
