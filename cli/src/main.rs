//! # lexrag
//!
//! Build, update, query and delete category indexes from the command line.
//!
//! Usage:
//!   lexrag build land_law                          # (Re)build from <data_root>/land_law
//!   lexrag update land_law amendments.txt          # Append paragraphs, rebuild
//!   lexrag query land_law "Who may lease land?"    # Ranked chunks
//!   lexrag query land_law --json "..."             # Machine-readable output
//!   lexrag status land_law
//!   lexrag delete land_law

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lexrag_retrieval::corpus::{embed_chunks, read_chunks};
use lexrag_retrieval::{RetrievalConfig, RetrievalPipeline};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "lexrag",
    version,
    about = "Category-scoped retrieval over local text corpora"
)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding persisted indexes (overrides the config file)
    #[arg(long, global = true)]
    persist_root: Option<PathBuf>,

    /// Directory holding one source folder per category (overrides the config file)
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Rebuild a category from its source directory
    Build { category: String },

    /// Append paragraphs from text files to a category and rebuild it
    Update {
        category: String,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Retrieve the chunks most relevant to a question
    Query {
        category: String,

        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a category's index from memory and disk
    Delete { category: String },

    /// Show whether a category is built
    Status { category: String },
}

impl Cli {
    fn load_config(&self) -> Result<RetrievalConfig> {
        let mut config = match &self.config {
            Some(path) => RetrievalConfig::from_toml_file(path)?,
            None => RetrievalConfig::default(),
        };
        if let Some(root) = &self.persist_root {
            config.persist_root = root.clone();
        }
        if let Some(root) = &self.data_root {
            config.data_root = root.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "lexrag=debug" } else { "lexrag=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.load_config()?;
    info!("Using index root {}", config.persist_root.display());
    let pipeline = RetrievalPipeline::from_config(&config)?;
    let store = pipeline.store();

    match cli.command {
        Command::Build { category } => {
            let index = store.rebuild(&category).await?;
            println!("Built '{category}': {} chunks", index.len());
        }
        Command::Update { category, files } => {
            let texts = read_chunks(&files).await?;
            let chunks = embed_chunks(pipeline.embedder().as_ref(), texts)
                .await
                .with_context(|| format!("failed to embed new chunks for '{category}'"))?;
            let added = chunks.len();
            let index = store.update(&category, chunks).await?;
            println!(
                "Updated '{category}': {added} new, {} total chunks",
                index.len()
            );
        }
        Command::Query {
            category,
            question,
            json,
        } => {
            let question = question.join(" ");
            let retrieval = pipeline.retrieve(&category, &question).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&retrieval)?);
            } else {
                for (rank, chunk) in retrieval.chunks.iter().enumerate() {
                    println!("{}. {chunk}", rank + 1);
                }
                if retrieval.chunks.is_empty() {
                    println!("No matching passages in '{category}'.");
                }
            }
        }
        Command::Delete { category } => {
            if store.delete(&category).await? {
                println!("Deleted '{category}'");
            } else {
                println!("'{category}' was not built; nothing to delete");
            }
        }
        Command::Status { category } => match store.load(&category).await? {
            Some(index) => println!(
                "'{category}': {} chunks, dimension {}, stored under {}",
                index.len(),
                index.dim(),
                store.persist_root().join(&category).display()
            ),
            None => println!("'{category}': not built"),
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_query_joins_question_words() {
        let cli = Cli::try_parse_from([
            "lexrag", "query", "land_law", "--json", "Who", "may", "lease", "land?",
        ])
        .unwrap();

        assert_eq!(
            cli.command,
            Command::Query {
                category: "land_law".to_string(),
                question: vec![
                    "Who".to_string(),
                    "may".to_string(),
                    "lease".to_string(),
                    "land?".to_string()
                ],
                json: true,
            }
        );
    }

    #[test]
    fn test_global_overrides() {
        let cli = Cli::try_parse_from([
            "lexrag",
            "status",
            "land_law",
            "--persist-root",
            "/tmp/store",
            "--data-root",
            "/tmp/data",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        let config = cli.load_config().unwrap();
        assert_eq!(config.persist_root, PathBuf::from("/tmp/store"));
        assert_eq!(config.data_root, PathBuf::from("/tmp/data"));
    }

    #[test]
    fn test_update_requires_files() {
        assert!(Cli::try_parse_from(["lexrag", "update", "land_law"]).is_err());
        assert!(Cli::try_parse_from(["lexrag", "query", "land_law"]).is_err());
    }
}
