//! entity-graph CLI entry point.

use clap::Parser;
use std::path::Path;

use entity_graph::cli::{commands, handle_error, Cli, Commands};
use entity_graph::infrastructure::config::ConfigLoader;
use entity_graph::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match ConfigLoader::load_from(Path::new("."), cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };
    if let Some(url) = cli.database.clone() {
        config.database.url = url;
    }

    let _logger = match LoggerImpl::init(&LogConfig::from(&config.logging)) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Load(args) => commands::load::execute(args, &config, cli.json).await,
        Commands::Lookup(args) => commands::lookup::execute(args, &config, cli.json).await,
        Commands::Watch(args) => commands::watch::execute(args, &config, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
