use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "actual_connector")]
#[command(about = "Run Actual Budget operations from the command line")]
pub struct Cli {
    /// Optional config file path (TOML).
    #[arg(long, global = true)]
    pub config: Option<String>,
    /// Override the server URL (e.g. http://localhost:5006).
    #[arg(long, global = true)]
    pub server_url: Option<String>,
    /// Override the budget sync id (password is never read from CLI).
    #[arg(long, global = true)]
    pub sync_id: Option<String>,
    /// Override the local data directory.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    /// Override the log level.
    #[arg(long, global = true)]
    pub level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute one resource operation and print the result records.
    Run(RunArgs),
    /// Log in to the server without opening a budget.
    TestCredentials,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(long)]
    pub resource: String,
    #[arg(long)]
    pub operation: String,
    /// Operation parameter; the value is parsed as JSON, falling back to a
    /// plain string.
    #[arg(long = "field", value_name = "NAME=VALUE", value_parser = parse_field)]
    pub fields: Vec<(String, Value)>,
    /// Operation parameters as a JSON object.
    #[arg(long)]
    pub params: Option<String>,
    /// Number of input items.
    #[arg(long, default_value_t = 1)]
    pub items: usize,
    /// Emit error records instead of failing the run.
    #[arg(long)]
    pub continue_on_fail: bool,
    /// Use an in-memory budget instead of the server.
    #[arg(long)]
    pub offline: bool,
}

fn parse_field(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing parameter name in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}
