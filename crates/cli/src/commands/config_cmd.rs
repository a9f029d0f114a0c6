//! `keel config`: configuration file commands.

use anyhow::Context;
use clap::Subcommand;
use keel_config::AppConfig;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write a starter config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration with API keys redacted
    Show,

    /// Print the config file path
    Path,
}

pub fn run(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init { force } => {
            let path = AppConfig::config_path();
            if path.exists() && !force {
                println!("   Config already exists at {} (use --force to overwrite)", path.display());
                return Ok(());
            }
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
            std::fs::write(&path, AppConfig::default_toml())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("   ✅ Wrote {}", path.display());
        }
        ConfigAction::Show => {
            let config = AppConfig::load().context("Failed to load config")?;
            println!("{}", render_redacted(&config)?);
            match config.resolve_model_id(None) {
                Some(model) => println!("# resolved model: {model}"),
                None => println!("# resolved model: none (no default_model and no API key)"),
            }
        }
        ConfigAction::Path => println!("{}", AppConfig::config_path().display()),
    }
    Ok(())
}

fn render_redacted(config: &AppConfig) -> anyhow::Result<String> {
    let mut config = config.clone();
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some("[REDACTED]".into());
        }
    }
    Ok(toml::to_string_pretty(&config)?)
}
