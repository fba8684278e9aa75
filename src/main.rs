use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use xml_binder::catalog::Catalog;
use xml_binder::cli::Cli;
use xml_binder::config::ConfigManager;
use xml_binder::output::Output;
use xml_binder::BindingContextBuilder;

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    let config = ConfigManager::load_config(&cli)
        .await
        .context("Failed to load configuration")?;
    debug!(?config, "effective configuration");

    let catalog = Catalog::load(&cli.catalog)
        .await
        .with_context(|| format!("Failed to load catalog {}", cli.catalog.display()))?;
    let loader = Arc::new(catalog.class_loader().context("Invalid catalog")?);

    let builder = BindingContextBuilder::from_config(Arc::clone(&loader), &config)?;
    for member in catalog.members(&loader)? {
        builder.add(member);
    }

    let report = cli.command.execute(&builder).await?;
    println!("{}", Output::new(cli.format).format(&report)?);
    Ok(())
}
