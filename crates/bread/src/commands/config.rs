//! Config command - configuration inspection.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Show which config file is loaded
    Path,
}

#[derive(Debug, Serialize)]
struct PathOutput {
    source: Option<String>,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&ctx.config)?);
        return Ok(());
    }

    match &ctx.config_source {
        Some(path) => println!("# Loaded from {}\n", path.display()),
        None => println!("# No config file loaded (using defaults)\n"),
    }
    print!("{}", ctx.config.to_toml()?);
    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let source = ctx
        .config_source
        .as_ref()
        .map(|p| p.display().to_string());

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&PathOutput { source })?);
    } else {
        println!("{}", source.as_deref().unwrap_or("(defaults)"));
    }
    Ok(())
}
