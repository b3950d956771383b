use clap::Parser;
use connector::{MemoryBackend, Node, Parameters};
use serde_json::json;

use crate::{
    cli::{Cli, Command, RunArgs},
    config::AppConfig,
    error::Result,
};

mod cli;
mod config;
mod error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::load(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "actual_connector={level},connector={level},actual_client={level}",
            level = settings.level
        ))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run(args) => run(&settings, args).await,
        Command::TestCredentials => test_credentials(&settings).await,
    }
}

async fn run(settings: &AppConfig, args: RunArgs) -> Result<()> {
    let mut parameters = match &args.params {
        Some(raw) => Parameters::from_json(serde_json::from_str(raw)?)?,
        None => Parameters::new(),
    };
    parameters.insert("resource", args.resource.as_str());
    parameters.insert("operation", args.operation.as_str());
    for (name, value) in args.fields {
        parameters.insert(&name, value);
    }

    let credentials = if args.offline {
        settings.offline_credentials()
    } else {
        settings.credentials()
    };
    let node = Node::builder()
        .credentials(credentials)
        .data_dir(&settings.data_dir)
        .continue_on_fail(args.continue_on_fail)
        .build()?;

    let records = if args.offline {
        tracing::info!("running against an in-memory budget");
        node.execute(&mut MemoryBackend::new(), &parameters, args.items)
            .await?
    } else {
        let mut backend = settings.http_backend()?;
        node.execute(&mut backend, &parameters, args.items).await?
    };

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

async fn test_credentials(settings: &AppConfig) -> Result<()> {
    let credentials = settings.credentials();
    credentials.validate()?;
    actual_client::check_credentials(&credentials).await?;
    let status = json!({ "status": "OK", "message": "Connection successful" });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
