//! Subcommand handlers.

use crate::ConfigAction;
use topograph_core::TopographConfig;

/// Handle `topograph config ...`.
pub fn handle_config(action: &ConfigAction, config: &TopographConfig) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", render_config(config)?);
        }
        ConfigAction::Check => match config.validate() {
            Ok(()) => println!("Configuration is valid."),
            Err(e) => anyhow::bail!("{e}"),
        },
    }
    Ok(())
}

/// Effective configuration as TOML with secrets masked.
pub fn render_config(config: &TopographConfig) -> anyhow::Result<String> {
    config
        .redacted()
        .to_toml()
        .map_err(|e| anyhow::anyhow!("Failed to render configuration: {}", e))
}
