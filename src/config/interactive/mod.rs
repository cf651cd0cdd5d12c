
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;

use super::{Config, ConfigError, GeminiConfig, RetrievalConfig, StorageConfig, StorageMode};
use crate::gemini::GeminiClient;

#[inline]
pub fn run_interactive_config(base_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 RAG Workshop Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(base_dir)?;

    eprintln!("{}", style("Gemini Configuration").bold().yellow());
    eprintln!(
        "The API key is read from the {} environment variable (or a .env file), never from config.toml.",
        style(&config.gemini.api_key_env).cyan()
    );
    eprintln!();
    configure_gemini(&mut config.gemini)?;

    eprintln!();
    eprintln!("{}", style("Retrieval and Storage").bold().yellow());
    configure_retrieval(&mut config.retrieval)?;
    configure_storage(&mut config.storage)?;

    config.indexing.rebuild_on_change = Confirm::new()
        .with_prompt("Rebuild the collection when the documents change?")
        .default(config.indexing.rebuild_on_change)
        .interact()?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    match config.api_key() {
        Ok(api_key) => {
            if test_gemini_connection(&config.gemini, api_key) {
                eprintln!("{}", style("✓ Gemini connection successful!").green());
            } else {
                eprintln!(
                    "{}",
                    style("⚠ Warning: Could not reach Gemini with these settings").yellow()
                );
                eprintln!("You can continue, but check the key and model names before indexing.");
            }
        }
        Err(e) => {
            eprintln!("{} {}", style("⚠ Warning:").yellow(), e);
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(base_dir: &Path) -> Result<()> {
    let config = Config::load(base_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Gemini Settings:").bold().yellow());
    match config.gemini.base_url() {
        Ok(url) => eprintln!("  Base URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Base URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!(
        "  Embedding Model: {}",
        style(&config.gemini.embedding_model).cyan()
    );
    eprintln!(
        "  Generation Model: {}",
        style(&config.gemini.generation_model).cyan()
    );
    eprintln!("  Batch Size: {}", style(config.gemini.batch_size).cyan());
    eprintln!("  Timeout: {}s", style(config.gemini.timeout_seconds).cyan());
    eprintln!(
        "  Retry Attempts: {}",
        style(config.gemini.retry_attempts).cyan()
    );
    let key_state = if config.api_key().is_ok() {
        style("set").green()
    } else {
        style("not set").red()
    };
    eprintln!(
        "  API Key: {} ({})",
        style(&config.gemini.api_key_env).cyan(),
        key_state
    );

    eprintln!();
    eprintln!("{}", style("Retrieval Settings:").bold().yellow());
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());

    eprintln!();
    eprintln!("{}", style("Storage Settings:").bold().yellow());
    eprintln!("  Mode: {}", style(config.storage.mode).cyan());
    eprintln!(
        "  Vector Database: {}",
        style(config.vector_database_path().display()).cyan()
    );
    eprintln!("  Collection: {}", style(&config.storage.collection).cyan());
    eprintln!(
        "  Rebuild On Change: {}",
        style(config.indexing.rebuild_on_change).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(base_dir: &Path) -> Result<Config> {
    Config::load(base_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: base_dir.to_path_buf(),
                ..Config::default()
            })
        },
        |config| {
            if config.config_file_path().exists() {
                eprintln!("{}", style("Found existing configuration.").green());
            }
            Ok(config)
        },
    )
}

fn configure_gemini(gemini: &mut GeminiConfig) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("Gemini API base URL")
        .default(gemini.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = GeminiConfig {
                base_url: input.clone(),
                ..GeminiConfig::default()
            };
            temp_config.base_url()?;
            Ok(())
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(gemini.embedding_model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let generation_model: String = Input::new()
        .with_prompt("Generation model")
        .default(gemini.generation_model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Texts per embedding request")
        .default(gemini.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 100 {
                Err("Batch size must be 100 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    gemini.set_base_url(base_url)?;
    gemini.set_embedding_model(embedding_model)?;
    gemini.set_generation_model(generation_model)?;
    gemini.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_retrieval(retrieval: &mut RetrievalConfig) -> Result<()> {
    let top_k: usize = Input::new()
        .with_prompt("Documents to retrieve per question")
        .default(retrieval.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=50).contains(input) {
                Ok(())
            } else {
                Err("Must be between 1 and 50")
            }
        })
        .interact_text()?;

    retrieval.set_top_k(top_k)?;
    Ok(())
}

fn configure_storage(storage: &mut StorageConfig) -> Result<()> {
    let modes = [StorageMode::Persistent, StorageMode::Memory];
    let default_index = modes
        .iter()
        .position(|&m| m == storage.mode)
        .unwrap_or(0);

    let mode_index = Select::new()
        .with_prompt("Vector storage")
        .default(default_index)
        .items(&["persistent (kept between runs)", "memory (discarded on exit)"])
        .interact()?;
    storage.mode = modes[mode_index];

    let collection: String = Input::new()
        .with_prompt("Collection name")
        .default(storage.collection.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = StorageConfig {
                collection: input.clone(),
                ..StorageConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    storage.set_collection(collection)?;
    Ok(())
}

fn test_gemini_connection(gemini: &GeminiConfig, api_key: String) -> bool {
    let client = match GeminiClient::new(gemini, api_key) {
        Ok(client) => client.with_timeout(std::time::Duration::from_secs(10)),
        Err(_) => return false,
    };

    client.health_check().is_ok()
}
