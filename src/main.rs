use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use rag_workshop::commands::{
    ask, index_documents, list_documents, reset_collection, run_demo, show_status,
};
use rag_workshop::config::{Config, get_config_dir, load_dotenv, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rag-workshop")]
#[command(about = "Compare LLM answers with and without retrieval augmented generation")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the vector database
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Gemini, retrieval and storage settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed documents and store them in the collection
    Index {
        /// File with documents: a JSON array of strings, or one document per line
        #[arg(long)]
        documents: Option<PathBuf>,
        /// Drop the collection before indexing
        #[arg(long)]
        reset: bool,
    },
    /// Answer a question using the retrieved documents
    Ask {
        question: String,
        /// Index this file first: a JSON array of strings, or one document per line
        #[arg(long)]
        documents: Option<PathBuf>,
        /// Also answer without context and show both
        #[arg(long)]
        compare: bool,
        /// Print the full augmented prompt
        #[arg(long)]
        show_prompt: bool,
    },
    /// List the stored documents
    Documents,
    /// Show collection, model and connectivity status
    Status,
    /// Drop the collection
    Reset,
    /// Index the built-in documents and compare answers end to end
    Demo {
        /// Question to ask instead of the built-in one
        question: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    load_dotenv();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&config_dir)?;
        } else {
            run_interactive_config(&config_dir)?;
        }
        return Ok(());
    }

    let config = Config::load(&config_dir)?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Index { documents, reset } => {
            index_documents(&config, documents.as_deref(), reset).await?;
        }
        Commands::Ask {
            question,
            documents,
            compare,
            show_prompt,
        } => {
            ask(
                &config,
                &question,
                documents.as_deref(),
                compare,
                show_prompt,
            )
            .await?;
        }
        Commands::Documents => {
            list_documents(&config).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
        Commands::Reset => {
            reset_collection(&config).await?;
        }
        Commands::Demo { question } => {
            run_demo(&config, question.as_deref()).await?;
        }
    }

    Ok(())
}
