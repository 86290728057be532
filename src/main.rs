use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use rmcp::{transport::stdio, ServiceExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use toolhost::{
    AppConfig, MemorySecretStore, SecretResolver, SecretStoreBackend, Toolbox, ToolhostServer,
    VaultSecretResolver,
};

#[derive(Parser, Debug)]
#[command(
    name = "toolhost",
    about = "MCP server exposing calendar, weather, playback, and document lookup tools"
)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, env = "TOOLHOST_CONFIG", default_value = "toolhost.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The protocol runs over stdout; logs must stay on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    let resolver = build_resolver(&config)?;
    let toolbox = Arc::new(Toolbox::from_config(&config, resolver));
    if toolbox.is_empty() {
        warn!("no tool sections configured; the server will expose no tools");
    }

    info!(tools = toolbox.declarations().len(), "serving MCP over stdio");
    let service = ToolhostServer::new(toolbox)
        .serve(stdio())
        .await
        .context("starting MCP server")?;
    service.waiting().await.context("serving MCP")?;
    Ok(())
}

fn build_resolver(config: &AppConfig) -> anyhow::Result<Arc<dyn SecretResolver>> {
    match config.secret_store.backend {
        SecretStoreBackend::Memory => Ok(Arc::new(MemorySecretStore::from_entries(
            &config.secret_store.secrets,
        ))),
        SecretStoreBackend::Vault => {
            let endpoint = config
                .secret_store
                .endpoint
                .as_deref()
                .context("vault backend requires an endpoint template")?;
            let token = std::env::var(&config.secret_store.token_env).with_context(|| {
                format!(
                    "vault access token expected in ${}",
                    config.secret_store.token_env
                )
            })?;
            let resolver =
                VaultSecretResolver::new(endpoint, &token, config.secret_store.api_version.as_str())
                    .map_err(anyhow::Error::msg)?;
            Ok(Arc::new(resolver))
        }
    }
}
